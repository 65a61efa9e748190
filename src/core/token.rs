/// Tokens, source positions, and compiled patterns.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Kinds of tokens produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    /// Literal text with no special meaning.
    Text,
    /// A backslash escape such as `\n` or `\4,x`.
    Escape,
    /// A quoted constant literal: `"..."`.
    Constant,
    /// A regex literal in backticks with an optional `i` suffix.
    Regex,
    /// A run of spaces or tabs inside a line.
    Whitespace,
    LeftSquare,
    RightSquare,
    LeftCurly,
    RightCurly,
    LeftAngle,
    RightAngle,
    LeftParen,
    RightParen,
    Pipe,
    Semicolon,
    Colon,
    DoubleColon,
    At,
    Question,
    Exclamation,
    Dollar,
    Hyphen,
}

impl TokenKind {
    /// The symbol this kind is spelled with, if it is a fixed symbol.
    pub fn symbol(self) -> Option<&'static str> {
        Some(match self {
            TokenKind::LeftSquare => "[",
            TokenKind::RightSquare => "]",
            TokenKind::LeftCurly => "{",
            TokenKind::RightCurly => "}",
            TokenKind::LeftAngle => "<",
            TokenKind::RightAngle => ">",
            TokenKind::LeftParen => "(",
            TokenKind::RightParen => ")",
            TokenKind::Pipe => "|",
            TokenKind::Semicolon => ";",
            TokenKind::Colon => ":",
            TokenKind::DoubleColon => "::",
            TokenKind::At => "@",
            TokenKind::Question => "?",
            TokenKind::Exclamation => "!",
            TokenKind::Dollar => "$",
            TokenKind::Hyphen => "-",
            _ => return None,
        })
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.symbol() {
            Some(sym) => write!(f, "'{}'", sym),
            None => write!(f, "{:?}", self),
        }
    }
}

/// A location in pattern source. Lines and columns are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Position {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Position {
            line,
            column,
            offset,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A single lexed token.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub position: Position,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, position: Position) -> Self {
        Token {
            kind,
            text: text.into(),
            position,
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// The immutable token array of one compiled pattern.
#[derive(Debug)]
pub(crate) struct PatternSource {
    pub(crate) id: u64,
    pub(crate) name: String,
    pub(crate) code: String,
    pub(crate) tokens: Vec<Token>,
}

/// A compiled pattern. Cheap to clone and safe to share across threads.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: Arc<PatternSource>,
}

impl Pattern {
    pub(crate) fn from_tokens(name: &str, code: &str, tokens: Vec<Token>) -> Self {
        Pattern {
            source: Arc::new(PatternSource {
                id: NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed),
                name: name.to_string(),
                code: code.to_string(),
                tokens,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.source.name
    }

    pub fn code(&self) -> &str {
        &self.source.code
    }

    pub fn tokens(&self) -> &[Token] {
        &self.source.tokens
    }

    /// The whole token stream as a sequence.
    pub fn sequence(&self) -> TokenSeq {
        TokenSeq {
            end: self.source.tokens.len(),
            source: Arc::clone(&self.source),
            start: 0,
        }
    }
}

/// A contiguous range of tokens inside a compiled pattern.
#[derive(Debug, Clone)]
pub struct TokenSeq {
    source: Arc<PatternSource>,
    start: usize,
    end: usize,
}

impl TokenSeq {
    pub fn tokens(&self) -> &[Token] {
        &self.source.tokens[self.start..self.end]
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Absolute index of the first token within the pattern.
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn pattern_name(&self) -> &str {
        &self.source.name
    }

    pub fn pattern_code(&self) -> &str {
        &self.source.code
    }

    pub(crate) fn source_id(&self) -> u64 {
        self.source.id
    }

    pub(crate) fn token_at(&self, absolute: usize) -> Option<&Token> {
        if absolute >= self.start && absolute < self.end {
            self.source.tokens.get(absolute)
        } else {
            None
        }
    }

    /// Sub-range by absolute indices, clamped to this sequence.
    pub(crate) fn range(&self, start: usize, end: usize) -> TokenSeq {
        let start = start.clamp(self.start, self.end);
        let end = end.clamp(start, self.end);
        TokenSeq {
            source: Arc::clone(&self.source),
            start,
            end,
        }
    }

    /// Drop leading and trailing whitespace tokens.
    pub fn trimmed(&self) -> TokenSeq {
        let tokens = &self.source.tokens;
        let mut start = self.start;
        let mut end = self.end;
        while start < end && tokens[start].kind == TokenKind::Whitespace {
            start += 1;
        }
        while end > start && tokens[end - 1].kind == TokenKind::Whitespace {
            end -= 1;
        }
        self.range(start, end)
    }

    /// Position of the first token, if any.
    pub fn position(&self) -> Option<Position> {
        self.tokens().first().map(|t| t.position)
    }

    /// Concatenated raw text of the tokens.
    pub fn raw_text(&self) -> String {
        self.tokens().iter().map(|t| t.text.as_str()).collect()
    }
}
