/// Token cursor with delimiter-aware scope extraction.

use thiserror::Error;

use crate::core::token::{Position, Token, TokenKind, TokenSeq};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScopeError {
    #[error("unterminated scope: expected {expected} to close {open} opened at {position}")]
    Unterminated {
        open: TokenKind,
        expected: TokenKind,
        position: Position,
    },
    #[error("mismatched closure at {position}: {open} closed by {found}, expected {expected}")]
    Mismatched {
        open: TokenKind,
        found: TokenKind,
        expected: TokenKind,
        position: Position,
    },
    #[error("expected {expected} at {position}, found '{found}'")]
    Unexpected {
        expected: String,
        found: String,
        position: Position,
    },
    #[error("expected {expected}, but reached the end of the pattern")]
    UnexpectedEnd { expected: String },
}

impl ScopeError {
    pub fn position(&self) -> Option<Position> {
        match self {
            ScopeError::Unterminated { position, .. }
            | ScopeError::Mismatched { position, .. }
            | ScopeError::Unexpected { position, .. } => Some(*position),
            ScopeError::UnexpectedEnd { .. } => None,
        }
    }
}

/// A table of opening delimiters and the closers they require.
#[derive(Debug, Clone, Copy)]
pub struct BracketPairs {
    pairs: &'static [(TokenKind, TokenKind)],
}

impl BracketPairs {
    pub const ALL: BracketPairs = BracketPairs {
        pairs: &[
            (TokenKind::LeftAngle, TokenKind::RightAngle),
            (TokenKind::LeftSquare, TokenKind::RightSquare),
            (TokenKind::LeftParen, TokenKind::RightParen),
            (TokenKind::LeftCurly, TokenKind::RightCurly),
        ],
    };

    pub const ANGLE: BracketPairs = BracketPairs {
        pairs: &[(TokenKind::LeftAngle, TokenKind::RightAngle)],
    };

    pub const NONE: BracketPairs = BracketPairs { pairs: &[] };

    pub fn closing_for(&self, open: TokenKind) -> Option<TokenKind> {
        self.pairs.iter().find(|(o, _)| *o == open).map(|(_, c)| *c)
    }

    pub fn is_opening(&self, kind: TokenKind) -> bool {
        self.pairs.iter().any(|(o, _)| *o == kind)
    }

    pub fn is_closing(&self, kind: TokenKind) -> bool {
        self.pairs.iter().any(|(_, c)| *c == kind)
    }
}

/// Tracks nesting while scanning a scope whose opener was already consumed.
struct Nesting {
    open: TokenKind,
    close: TokenKind,
    pairs: BracketPairs,
    stack: Vec<(TokenKind, Position)>,
}

enum Step {
    Continue,
    /// The scope's own closer was reached at depth zero.
    Closed,
}

impl Nesting {
    fn new(open: TokenKind, close: TokenKind, pairs: BracketPairs) -> Self {
        Nesting {
            open,
            close,
            pairs,
            stack: Vec::new(),
        }
    }

    fn at_top(&self) -> bool {
        self.stack.is_empty()
    }

    fn expected_closer(&self, opener: TokenKind) -> TokenKind {
        if opener == self.open {
            self.close
        } else {
            self.pairs.closing_for(opener).unwrap_or(self.close)
        }
    }

    fn feed(&mut self, token: &Token) -> Result<Step, ScopeError> {
        let kind = token.kind;
        if kind == self.open || self.pairs.is_opening(kind) {
            self.stack.push((kind, token.position));
            return Ok(Step::Continue);
        }
        if kind == self.close || self.pairs.is_closing(kind) {
            match self.stack.pop() {
                None if kind == self.close => return Ok(Step::Closed),
                None => {
                    return Err(ScopeError::Mismatched {
                        open: self.open,
                        found: kind,
                        expected: self.close,
                        position: token.position,
                    })
                }
                Some((opener, _)) => {
                    let expected = self.expected_closer(opener);
                    if expected != kind {
                        return Err(ScopeError::Mismatched {
                            open: opener,
                            found: kind,
                            expected,
                            position: token.position,
                        });
                    }
                }
            }
        }
        Ok(Step::Continue)
    }

    fn unterminated(&self, scope_start: Position) -> ScopeError {
        match self.stack.last() {
            Some((opener, position)) => ScopeError::Unterminated {
                open: *opener,
                expected: self.expected_closer(*opener),
                position: *position,
            },
            None => ScopeError::Unterminated {
                open: self.open,
                expected: self.close,
                position: scope_start,
            },
        }
    }
}

/// A forward-only cursor over a token sequence.
#[derive(Debug, Clone)]
pub struct TokenReader {
    seq: TokenSeq,
    pos: usize,
}

impl TokenReader {
    pub fn new(seq: TokenSeq) -> Self {
        let pos = seq.start();
        TokenReader { seq, pos }
    }

    pub fn sequence(&self) -> &TokenSeq {
        &self.seq
    }

    /// Absolute index of the next token.
    pub fn index(&self) -> usize {
        self.pos
    }

    pub fn is_end(&self) -> bool {
        self.seq.token_at(self.pos).is_none()
    }

    pub fn peek(&self) -> Option<&Token> {
        self.seq.token_at(self.pos)
    }

    pub fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    /// The most recently consumed token.
    pub fn previous(&self) -> Option<&Token> {
        self.pos.checked_sub(1).and_then(|i| self.seq.token_at(i))
    }

    /// Position of the next token, or of the last one at the end.
    pub fn position(&self) -> Position {
        self.peek()
            .or_else(|| self.previous())
            .map(|t| t.position)
            .unwrap_or_default()
    }

    pub fn read(&mut self) -> Option<Token> {
        let token = self.seq.token_at(self.pos)?.clone();
        self.pos += 1;
        Some(token)
    }

    /// Consume the next token, failing at the end of input.
    pub fn read_any(&mut self, expected: &str) -> Result<Token, ScopeError> {
        self.read().ok_or_else(|| ScopeError::UnexpectedEnd {
            expected: expected.to_string(),
        })
    }

    /// Consume a token of the given kind or fail with its position.
    pub fn read_expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, ScopeError> {
        match self.peek() {
            None => Err(ScopeError::UnexpectedEnd {
                expected: expected.to_string(),
            }),
            Some(token) if token.kind == kind => {
                let token = token.clone();
                self.pos += 1;
                Ok(token)
            }
            Some(token) => Err(ScopeError::Unexpected {
                expected: expected.to_string(),
                found: token.text.clone(),
                position: token.position,
            }),
        }
    }

    /// Consume the next token if it has the given kind.
    pub fn take(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Like `take`, skipping whitespace on both sides of the token.
    pub fn take_loose(&mut self, kind: TokenKind) -> bool {
        let saved = self.pos;
        self.skip_space();
        if self.take(kind) {
            self.skip_space();
            true
        } else {
            self.pos = saved;
            false
        }
    }

    /// Consume a run of tokens of one kind. Returns whether any were taken.
    pub fn take_all(&mut self, kind: TokenKind) -> bool {
        let mut any = false;
        while self.take(kind) {
            any = true;
        }
        any
    }

    pub fn skip_space(&mut self) -> bool {
        self.take_all(TokenKind::Whitespace)
    }

    /// Move forward to an absolute index. Never moves backward.
    pub(crate) fn jump(&mut self, index: usize) {
        let end = self.seq.start() + self.seq.len();
        if index > self.pos {
            self.pos = index.min(end);
        }
    }

    /// Consume and return tokens while `pred` holds.
    pub fn read_while(&mut self, pred: impl Fn(&Token) -> bool) -> TokenSeq {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        self.seq.range(start, self.pos)
    }

    /// Read up to the closer matching an already-consumed `open`.
    ///
    /// The closer is consumed but not included. The result is trimmed of
    /// surrounding whitespace.
    pub fn extract_scope(
        &mut self,
        open: TokenKind,
        close: TokenKind,
        pairs: BracketPairs,
    ) -> Result<TokenSeq, ScopeError> {
        let scope_start = self.previous().map(|t| t.position).unwrap_or_default();
        let mut nesting = Nesting::new(open, close, pairs);
        let start = self.pos;
        while let Some(token) = self.seq.token_at(self.pos) {
            match nesting.feed(token)? {
                Step::Closed => {
                    let body = self.seq.range(start, self.pos).trimmed();
                    self.pos += 1;
                    return Ok(body);
                }
                Step::Continue => self.pos += 1,
            }
        }
        Err(nesting.unterminated(scope_start))
    }

    /// Lazily split the scope after an already-consumed `open` at
    /// top-level separators.
    pub fn arguments(
        &mut self,
        open: TokenKind,
        close: TokenKind,
        separator: TokenKind,
        pairs: BracketPairs,
    ) -> Arguments<'_> {
        let scope_start = self.previous().map(|t| t.position).unwrap_or_default();
        Arguments {
            reader: self,
            nesting: Nesting::new(open, close, pairs),
            separator,
            scope_start,
            done: false,
        }
    }

    /// Eager form of [`TokenReader::arguments`].
    pub fn extract_arguments(
        &mut self,
        open: TokenKind,
        close: TokenKind,
        separator: TokenKind,
        pairs: BracketPairs,
    ) -> Result<Vec<TokenSeq>, ScopeError> {
        self.arguments(open, close, separator, pairs).collect()
    }
}

/// Iterator over separator-delimited arguments of one scope.
pub struct Arguments<'r> {
    reader: &'r mut TokenReader,
    nesting: Nesting,
    separator: TokenKind,
    scope_start: Position,
    done: bool,
}

impl Iterator for Arguments<'_> {
    type Item = Result<TokenSeq, ScopeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let reader = &mut *self.reader;
        let start = reader.pos;

        while let Some(token) = reader.seq.token_at(reader.pos) {
            if token.kind == self.separator && self.nesting.at_top() {
                let arg = reader.seq.range(start, reader.pos).trimmed();
                reader.pos += 1;
                return Some(Ok(arg));
            }
            match self.nesting.feed(token) {
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Ok(Step::Closed) => {
                    let arg = reader.seq.range(start, reader.pos).trimmed();
                    reader.pos += 1;
                    self.done = true;
                    return Some(Ok(arg));
                }
                Ok(Step::Continue) => reader.pos += 1,
            }
        }

        self.done = true;
        Some(Err(self.nesting.unterminated(self.scope_start)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::token::Pattern;

    fn reader(code: &str) -> TokenReader {
        TokenReader::new(Pattern::compile("test", code).unwrap().sequence())
    }

    #[test]
    fn arguments_split_only_at_top_level() {
        let mut r = reader("[tag:(a;b);c]");
        assert!(r.take(TokenKind::LeftSquare));
        assert_eq!(r.read().unwrap().text, "tag");
        assert!(r.take(TokenKind::Colon));
        let args = r
            .extract_arguments(
                TokenKind::LeftSquare,
                TokenKind::RightSquare,
                TokenKind::Semicolon,
                BracketPairs::ALL,
            )
            .unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].raw_text(), "(a;b)");
        assert_eq!(args[1].raw_text(), "c");
        assert!(r.is_end());
    }

    #[test]
    fn arguments_are_trimmed() {
        let mut r = reader("[x: a b ;  c ]");
        r.take(TokenKind::LeftSquare);
        r.read();
        r.take(TokenKind::Colon);
        let args = r
            .extract_arguments(
                TokenKind::LeftSquare,
                TokenKind::RightSquare,
                TokenKind::Semicolon,
                BracketPairs::ALL,
            )
            .unwrap();
        assert_eq!(args[0].raw_text(), "a b");
        assert_eq!(args[1].raw_text(), "c");
    }

    #[test]
    fn arguments_are_lazy() {
        let mut r = reader("{a|b|c}");
        r.take(TokenKind::LeftCurly);
        let mut args = r.arguments(
            TokenKind::LeftCurly,
            TokenKind::RightCurly,
            TokenKind::Pipe,
            BracketPairs::ALL,
        );
        assert_eq!(args.next().unwrap().unwrap().raw_text(), "a");
        drop(args);
        // Only the first item and its separator were consumed.
        assert_eq!(r.peek().unwrap().text, "b");
    }

    #[test]
    fn nested_families_nest_independently() {
        let mut r = reader("{a[b{c|d}]|<e>}rest");
        r.take(TokenKind::LeftCurly);
        let items = r
            .extract_arguments(
                TokenKind::LeftCurly,
                TokenKind::RightCurly,
                TokenKind::Pipe,
                BracketPairs::ALL,
            )
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].raw_text(), "a[b{c|d}]");
        assert_eq!(items[1].raw_text(), "<e>");
        assert_eq!(r.read().unwrap().text, "rest");
    }

    #[test]
    fn extract_scope_consumes_closer() {
        let mut r = reader("( 1 + (2) ) tail");
        r.take(TokenKind::LeftParen);
        let body = r
            .extract_scope(TokenKind::LeftParen, TokenKind::RightParen, BracketPairs::ALL)
            .unwrap();
        assert_eq!(body.raw_text(), "1 + (2)");
        assert!(r.take_loose(TokenKind::Text));
    }

    #[test]
    fn unterminated_scope_is_an_error() {
        let mut r = reader("[tag:a;b");
        r.take(TokenKind::LeftSquare);
        r.read();
        r.take(TokenKind::Colon);
        let err = r
            .extract_arguments(
                TokenKind::LeftSquare,
                TokenKind::RightSquare,
                TokenKind::Semicolon,
                BracketPairs::ALL,
            )
            .unwrap_err();
        assert!(matches!(err, ScopeError::Unterminated { .. }));
    }

    #[test]
    fn mismatched_closure_is_an_error() {
        let mut r = reader("{a(b}c)}");
        r.take(TokenKind::LeftCurly);
        let err = r
            .extract_scope(TokenKind::LeftCurly, TokenKind::RightCurly, BracketPairs::ALL)
            .unwrap_err();
        match err {
            ScopeError::Mismatched {
                open,
                found,
                expected,
                ..
            } => {
                assert_eq!(open, TokenKind::LeftParen);
                assert_eq!(found, TokenKind::RightCurly);
                assert_eq!(expected, TokenKind::RightParen);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn take_loose_restores_on_miss() {
        let mut r = reader("a  b");
        assert!(r.take(TokenKind::Text));
        assert!(!r.take_loose(TokenKind::Colon));
        assert_eq!(r.peek_kind(), Some(TokenKind::Whitespace));
    }

    #[test]
    fn read_expect_reports_position() {
        let mut r = reader("a");
        let err = r.read_expect(TokenKind::Colon, "':'").unwrap_err();
        assert_eq!(err.position().map(|p| p.column), Some(1));
    }
}
