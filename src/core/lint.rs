/// Static checks over a compiled pattern: scope structure, tag names and
/// argument counts, regex and query syntax. Nothing is executed.

use std::fmt;

use crate::core::functions;
use crate::core::reader::{BracketPairs, ScopeError, TokenReader};
use crate::core::replacer;
use crate::core::subroutine::read_header;
use crate::core::token::{Pattern, Position, TokenKind, TokenSeq};
use crate::core::vocabulary::Query;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub position: Option<Position>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        match self.position {
            Some(pos) => write!(f, "{} at {}: {}", label, pos, self.message),
            None => write!(f, "{}: {}", label, self.message),
        }
    }
}

/// Check every construct in `pattern`, descending into blocks, arguments
/// and subroutine bodies. A scope error stops the check of the enclosing
/// sequence.
pub fn check(pattern: &Pattern) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    if let Err(e) = scan(pattern.sequence(), &mut diagnostics) {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            position: e.position(),
            message: e.to_string(),
        });
    }
    diagnostics
}

fn scan(seq: TokenSeq, out: &mut Vec<Diagnostic>) -> Result<(), ScopeError> {
    let mut reader = TokenReader::new(seq);
    while let Some(token) = reader.read() {
        match token.kind {
            TokenKind::LeftCurly => {
                for item in reader.extract_arguments(
                    TokenKind::LeftCurly,
                    TokenKind::RightCurly,
                    TokenKind::Pipe,
                    BracketPairs::ALL,
                )? {
                    scan(item, out)?;
                }
            }
            TokenKind::LeftParen => {
                reader.take(TokenKind::At);
                let body = reader.extract_scope(
                    TokenKind::LeftParen,
                    TokenKind::RightParen,
                    BracketPairs::ALL,
                )?;
                scan(body, out)?;
            }
            TokenKind::LeftAngle => {
                let body = reader.extract_scope(
                    TokenKind::LeftAngle,
                    TokenKind::RightAngle,
                    BracketPairs::ANGLE,
                )?;
                if let Err(e) = Query::parse(&body.raw_text()) {
                    out.push(Diagnostic {
                        severity: Severity::Warning,
                        position: Some(token.position),
                        message: e.to_string(),
                    });
                }
            }
            TokenKind::LeftSquare => scan_tag(&mut reader, token.position, out)?,
            TokenKind::RightCurly
            | TokenKind::RightSquare
            | TokenKind::RightParen
            | TokenKind::RightAngle => {
                return Err(ScopeError::Unexpected {
                    expected: "text".to_string(),
                    found: token.text,
                    position: token.position,
                })
            }
            _ => {}
        }
    }
    Ok(())
}

fn scan_args(reader: &mut TokenReader) -> Result<Vec<TokenSeq>, ScopeError> {
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

fn scan_tag(
    reader: &mut TokenReader,
    position: Position,
    out: &mut Vec<Diagnostic>,
) -> Result<(), ScopeError> {
    reader.skip_space();
    if reader.take(TokenKind::Dollar) {
        let meta = reader.take(TokenKind::Question);
        reader.skip_space();
        if meta || reader.peek_kind() == Some(TokenKind::LeftSquare) {
            read_header(reader)?;
        } else {
            reader.read_expect(TokenKind::Text, "subroutine name")?;
            for arg in scan_args(reader)? {
                scan(arg, out)?;
            }
            return Ok(());
        }
    } else if reader.peek_kind() == Some(TokenKind::Regex) {
        let literal = reader.read_expect(TokenKind::Regex, "regex")?;
        let args = scan_args(reader)?;
        let problem = match replacer::compile(&literal.text) {
            Err(e) => Some(format!("invalid regex: {}", e)),
            Ok(_) if args.len() != 2 => {
                Some(format!("replacer takes 2 arguments, found {}", args.len()))
            }
            Ok(_) => None,
        };
        if let Some(message) = problem {
            out.push(Diagnostic {
                severity: Severity::Error,
                position: Some(literal.position),
                message,
            });
        }
        for arg in args {
            scan(arg, out)?;
        }
        return Ok(());
    } else if !reader.take(TokenKind::Question) {
        let name = reader.read_expect(TokenKind::Text, "tag name")?;
        let args = scan_args(reader)?;
        match functions::lookup(&name.text) {
            None => out.push(Diagnostic {
                severity: Severity::Error,
                position: Some(name.position),
                message: format!("unknown tag '{}'", name.text),
            }),
            Some(def) if def.signature(args.len()).is_none() => out.push(Diagnostic {
                severity: Severity::Error,
                position: Some(name.position),
                message: format!("tag '{}' takes no {} argument form", def.name, args.len()),
            }),
            Some(_) => {}
        }
        for arg in args {
            scan(arg, out)?;
        }
        return Ok(());
    }

    let body = reader.extract_scope(
        TokenKind::LeftSquare,
        TokenKind::RightSquare,
        BracketPairs::ALL,
    )?;
    if body.is_empty() {
        out.push(Diagnostic {
            severity: Severity::Warning,
            position: Some(position),
            message: "empty body".to_string(),
        });
    }
    scan(body, out)
}
