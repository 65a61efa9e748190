/// User-defined subroutines: `[$[name:p1;@p2]:body]` and their calls.

use crate::core::reader::{BracketPairs, ScopeError, TokenReader};
use crate::core::token::{TokenKind, TokenSeq};

/// A subroutine parameter. Code parameters receive the raw argument
/// tokens instead of their output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub code: bool,
}

impl Param {
    fn from_seq(seq: &TokenSeq) -> Option<Param> {
        let text = seq.raw_text();
        let text = text.trim();
        let (name, code) = match text.strip_prefix('@') {
            Some(rest) => (rest.trim(), true),
            None => (text, false),
        };
        (!name.is_empty()).then(|| Param {
            name: name.to_string(),
            code,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Subroutine {
    pub name: String,
    pub params: Vec<Param>,
    pub body: TokenSeq,
}

impl Subroutine {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Read the `[name:params]:` header of a definition. The reader sits just
/// after `$` (and `?` for a meta definition).
pub fn read_header(reader: &mut TokenReader) -> Result<(String, Vec<Param>), ScopeError> {
    reader.skip_space();
    reader.read_expect(TokenKind::LeftSquare, "'[' opening a subroutine signature")?;
    reader.skip_space();
    let name = reader.read_expect(TokenKind::Text, "subroutine name")?.text;
    reader.skip_space();
    let params = if reader.take(TokenKind::Colon) {
        reader
            .extract_arguments(
                TokenKind::LeftSquare,
                TokenKind::RightSquare,
                TokenKind::Semicolon,
                BracketPairs::ALL,
            )?
            .iter()
            .filter_map(Param::from_seq)
            .collect()
    } else {
        reader.read_expect(TokenKind::RightSquare, "']' closing a subroutine signature")?;
        Vec::new()
    };
    if !reader.take_loose(TokenKind::Colon) {
        reader.read_expect(TokenKind::Colon, "':' before a subroutine body")?;
    }
    Ok((name, params))
}
