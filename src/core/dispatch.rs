/// Token handlers for the run loop, keyed by token kind.

use rustc_hash::FxHashMap;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

use crate::core::error::{NameKind, Result};
use crate::core::frame::{ArgSlot, Continuation};
use crate::core::functions;
use crate::core::interpreter::Interpreter;
use crate::core::lexer::{parse_escape, unescape_constant, EscapeBody};
use crate::core::reader::{BracketPairs, ScopeError, TokenReader};
use crate::core::replacer;
use crate::core::rng::Rng;
use crate::core::subroutine::{read_header, Subroutine};
use crate::core::token::{Token, TokenKind, TokenSeq};
use crate::core::vocabulary::Query;

/// Returns whether the run loop must restart from the top frame.
type TokenHandler = fn(&mut Interpreter<'_>, &Token) -> Result<bool>;

static DISPATCH: LazyLock<FxHashMap<TokenKind, TokenHandler>> = LazyLock::new(|| {
    let mut table: FxHashMap<TokenKind, TokenHandler> = FxHashMap::default();
    table.insert(TokenKind::LeftCurly, do_block);
    table.insert(TokenKind::LeftSquare, do_tag);
    table.insert(TokenKind::LeftParen, do_expression);
    table.insert(TokenKind::LeftAngle, do_query);
    table.insert(TokenKind::Escape, do_escape);
    table.insert(TokenKind::Constant, do_constant);
    for closer in [
        TokenKind::RightCurly,
        TokenKind::RightSquare,
        TokenKind::RightParen,
        TokenKind::RightAngle,
    ] {
        table.insert(closer, do_stray_closer);
    }
    table
});

impl Interpreter<'_> {
    pub(crate) fn dispatch(&mut self, token: Token) -> Result<bool> {
        match DISPATCH.get(&token.kind) {
            Some(handler) => handler(self, &token),
            None => {
                self.print(&token.text)?;
                Ok(false)
            }
        }
    }

    fn reader(&mut self) -> &mut TokenReader {
        &mut self.top_mut().reader
    }
}

fn do_block(interp: &mut Interpreter<'_>, _token: &Token) -> Result<bool> {
    let block = interp.read_block()?;
    interp.enter_block(block)
}

fn do_stray_closer(_interp: &mut Interpreter<'_>, token: &Token) -> Result<bool> {
    Err(ScopeError::Unexpected {
        expected: "text".to_string(),
        found: token.text.clone(),
        position: token.position,
    }
    .into())
}

/// Read `:a;b]` or `]` after a tag or call name.
fn read_args(reader: &mut TokenReader) -> std::result::Result<Vec<TokenSeq>, ScopeError> {
    reader.skip_space();
    if reader.take(TokenKind::Colon) {
        reader.extract_arguments(
            TokenKind::LeftSquare,
            TokenKind::RightSquare,
            TokenKind::Semicolon,
            BracketPairs::ALL,
        )
    } else {
        reader.read_expect(TokenKind::RightSquare, "':' or ']' after a name")?;
        Ok(Vec::new())
    }
}

/// Split arguments into slots. Plain text needs no frame; other evaluated
/// arguments are returned for the caller to run first.
fn prepare_args(
    args: Vec<TokenSeq>,
    is_code: impl Fn(usize) -> bool,
) -> (Vec<ArgSlot>, Vec<TokenSeq>) {
    let mut slots = Vec::with_capacity(args.len());
    let mut evaluated = Vec::new();
    for (i, seq) in args.into_iter().enumerate() {
        if is_code(i) {
            slots.push(ArgSlot::Code(seq));
        } else if seq
            .tokens()
            .iter()
            .all(|t| matches!(t.kind, TokenKind::Text | TokenKind::Whitespace))
        {
            slots.push(ArgSlot::Literal(seq.raw_text()));
        } else {
            slots.push(ArgSlot::Evaluated);
            evaluated.push(seq);
        }
    }
    (slots, evaluated)
}

fn do_tag(interp: &mut Interpreter<'_>, token: &Token) -> Result<bool> {
    let reader = interp.reader();
    reader.skip_space();
    if reader.take(TokenKind::Dollar) {
        return do_subroutine(interp, token);
    }
    if reader.take(TokenKind::Question) {
        return do_metapattern(interp, token);
    }
    if reader.peek_kind() == Some(TokenKind::Regex) {
        return do_replacer(interp);
    }

    let name = reader.read_expect(TokenKind::Text, "tag name")?;
    let args = read_args(reader)?;
    interp.set_position(name.position);

    let def = functions::lookup(&name.text)
        .ok_or_else(|| interp.name_error(NameKind::Tag, &name.text))?;
    let sig = def
        .signature(args.len())
        .ok_or_else(|| interp.arity_error(def.name, args.len()))?;
    let (slots, evaluated) = prepare_args(args, |i| sig.is_code(i));
    interp.schedule(
        Continuation::Tag {
            sig,
            token: name,
            slots,
        },
        evaluated,
    )
}

fn do_subroutine(interp: &mut Interpreter<'_>, token: &Token) -> Result<bool> {
    let reader = interp.reader();
    let meta = reader.take(TokenKind::Question);
    reader.skip_space();

    if meta || reader.peek_kind() == Some(TokenKind::LeftSquare) {
        let (name, params) = read_header(reader)?;
        let body = reader.extract_scope(
            TokenKind::LeftSquare,
            TokenKind::RightSquare,
            BracketPairs::ALL,
        )?;
        if meta {
            interp.defer(Continuation::DefineMeta {
                name,
                params,
                token: token.clone(),
            });
            interp.push_frame(body, true)?;
            return Ok(true);
        }
        debug!(name = %name, params = params.len(), "subroutine defined");
        interp
            .host
            .subroutines
            .insert(name.clone(), Arc::new(Subroutine { name, params, body }));
        return Ok(false);
    }

    let name = reader.read_expect(TokenKind::Text, "subroutine name")?;
    let args = read_args(reader)?;
    interp.set_position(name.position);

    let sub = interp
        .host
        .subroutines
        .get(&name.text)
        .cloned()
        .ok_or_else(|| interp.name_error(NameKind::Subroutine, &name.text))?;
    if sub.arity() != args.len() {
        return Err(interp.arity_error(&sub.name, args.len()));
    }
    let (slots, evaluated) = prepare_args(args, |i| sub.params[i].code);
    interp.schedule(
        Continuation::SubCall {
            sub,
            token: name,
            slots,
        },
        evaluated,
    )
}

fn do_metapattern(interp: &mut Interpreter<'_>, token: &Token) -> Result<bool> {
    let body = interp.reader().extract_scope(
        TokenKind::LeftSquare,
        TokenKind::RightSquare,
        BracketPairs::ALL,
    )?;
    interp.defer(Continuation::Metapattern {
        token: token.clone(),
    });
    interp.push_frame(body, true)?;
    Ok(true)
}

fn do_replacer(interp: &mut Interpreter<'_>) -> Result<bool> {
    let reader = interp.reader();
    let literal = reader.read_expect(TokenKind::Regex, "regex")?;
    reader.skip_space();
    reader.read_expect(TokenKind::Colon, "':' after a regex")?;
    let args = reader.extract_arguments(
        TokenKind::LeftSquare,
        TokenKind::RightSquare,
        TokenKind::Semicolon,
        BracketPairs::ALL,
    )?;
    interp.set_position(literal.position);

    let regex = replacer::compile(&literal.text).map_err(|e| interp.invalid("regex", e))?;
    let [input, body]: [TokenSeq; 2] = args
        .try_into()
        .map_err(|args: Vec<TokenSeq>| interp.arity_error("replacer", args.len()))?;
    interp.defer(Continuation::Replacer {
        regex: Arc::new(regex),
        body,
        token: literal,
    });
    interp.push_frame(input, true)?;
    Ok(true)
}

fn do_expression(interp: &mut Interpreter<'_>, token: &Token) -> Result<bool> {
    let reader = interp.reader();
    let silent = reader.take(TokenKind::At);
    let body = reader.extract_scope(
        TokenKind::LeftParen,
        TokenKind::RightParen,
        BracketPairs::ALL,
    )?;
    interp.defer(Continuation::Expression {
        print: !silent,
        token: token.clone(),
    });
    interp.push_frame(body, true)?;
    Ok(true)
}

fn do_query(interp: &mut Interpreter<'_>, _token: &Token) -> Result<bool> {
    let body = interp.reader().extract_scope(
        TokenKind::LeftAngle,
        TokenKind::RightAngle,
        BracketPairs::ANGLE,
    )?;
    let text = body.raw_text();
    let query = Query::parse(&text).map_err(|e| interp.invalid("query", e.to_string()))?;
    let result = interp
        .host
        .vocabulary
        .query(&mut interp.rng, &query, &mut interp.carrier);
    match result {
        Ok(term) => interp.print(&term)?,
        Err(e) if interp.host.strict_queries => return Err(interp.query_error(e.to_string())),
        Err(e) => {
            warn!(query = %text, error = %e, "vocabulary query failed");
            let sentinel = interp.host.missing_sentinel.to_string();
            interp.print(&sentinel)?;
        }
    }
    Ok(false)
}

const DIGITS: &[u8] = b"0123456789";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const HEX_LOWER: &[u8] = b"0123456789abcdef";
const HEX_UPPER: &[u8] = b"0123456789ABCDEF";

fn pick(rng: &mut Rng, set: &[u8]) -> char {
    set[rng.next_below(set.len())] as char
}

fn escape_char(rng: &mut Rng, code: char) -> char {
    match code {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        's' => ' ',
        'd' => pick(rng, DIGITS),
        'c' => pick(rng, LOWER),
        'C' => pick(rng, UPPER),
        'x' => pick(rng, HEX_LOWER),
        'X' => pick(rng, HEX_UPPER),
        other => other,
    }
}

fn do_escape(interp: &mut Interpreter<'_>, token: &Token) -> Result<bool> {
    let (count, body) = parse_escape(&token.text)
        .ok_or_else(|| interp.invalid(&token.text, "unrecognized escape sequence"))?;
    match body {
        EscapeBody::Code('a') => {
            for _ in 0..count {
                interp.with_output(|out, limit| out.write_article(limit))?;
            }
        }
        EscapeBody::Code(code) => {
            let text: String = (0..count).map(|_| escape_char(&mut interp.rng, code)).collect();
            interp.print(&text)?;
        }
        EscapeBody::Unicode(c) => {
            let text: String = std::iter::repeat(c).take(count).collect();
            interp.print(&text)?;
        }
    }
    Ok(false)
}

fn do_constant(interp: &mut Interpreter<'_>, token: &Token) -> Result<bool> {
    interp.print(&unescape_constant(&token.text))?;
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::token::Pattern;

    fn args_of(code: &str) -> Vec<TokenSeq> {
        let pattern = Pattern::compile("t", code).unwrap();
        let mut reader = TokenReader::new(pattern.sequence());
        reader.take(TokenKind::LeftSquare);
        reader.read_expect(TokenKind::Text, "name").unwrap();
        read_args(&mut reader).unwrap()
    }

    #[test]
    fn plain_arguments_become_literals() {
        let (slots, evaluated) = prepare_args(args_of("[rep:4]"), |_| false);
        assert!(evaluated.is_empty());
        assert!(matches!(&slots[0], ArgSlot::Literal(s) if s == "4"));
    }

    #[test]
    fn nested_constructs_are_evaluated() {
        let (slots, evaluated) = prepare_args(args_of("[rep:{3|4};x]"), |_| false);
        assert_eq!(evaluated.len(), 1);
        assert!(matches!(slots[0], ArgSlot::Evaluated));
        assert!(matches!(slots[1], ArgSlot::Literal(_)));
    }

    #[test]
    fn code_parameters_keep_tokens() {
        let (slots, evaluated) = prepare_args(args_of("[sep:{, }]"), |_| true);
        assert!(evaluated.is_empty());
        assert!(matches!(&slots[0], ArgSlot::Code(seq) if seq.raw_text() == "{, }"));
    }

    #[test]
    fn no_arguments() {
        assert!(args_of("[break]").is_empty());
    }

    #[test]
    fn fixed_escapes_ignore_the_rng() {
        let mut rng = Rng::new(1);
        assert_eq!(escape_char(&mut rng, 'n'), '\n');
        assert_eq!(escape_char(&mut rng, 's'), ' ');
        assert_eq!(escape_char(&mut rng, '{'), '{');
        assert!(escape_char(&mut rng, 'd').is_ascii_digit());
        assert!(escape_char(&mut rng, 'X').is_ascii_hexdigit());
    }
}
