/// Pattern lexer: turns source text into a flat token array.
///
/// Line breaks and the indentation around them are not significant, `#`
/// starts a comment that runs to the end of the line, and runs of spaces
/// inside a line become a single whitespace token.

use thiserror::Error;

use crate::core::token::{Pattern, Position, Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    #[error("unterminated constant literal at {0}")]
    UnterminatedLiteral(Position),
    #[error("invalid escape sequence at {0}")]
    InvalidEscape(Position),
    #[error("unterminated regex literal at {0}")]
    UnterminatedRegex(Position),
}

impl Pattern {
    /// Compile pattern source into a reusable token stream.
    pub fn compile(name: &str, code: &str) -> Result<Pattern, LexError> {
        let tokens = tokenize(code)?;
        Ok(Pattern::from_tokens(name, code, tokens))
    }
}

/// Split `code` into tokens.
pub fn tokenize(code: &str) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    let mut line_offset = 0;

    for (line_index, raw_line) in code.split('\n').enumerate() {
        let line_start = line_offset;
        line_offset += raw_line.len() + 1;

        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        let line = strip_comment(line);
        let content = line.trim_start();
        let lead = line.len() - content.len();
        let content = content.trim_end();
        if content.is_empty() {
            continue;
        }

        let mut lexer = LineLexer {
            content,
            chars: content.char_indices().collect(),
            i: 0,
            line: line_index + 1,
            base_column: line[..lead].chars().count() + 1,
            base_offset: line_start + lead,
        };
        lexer.run(&mut tokens)?;
    }

    Ok(tokens)
}

fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut chars = line.char_indices();
    while let Some((idx, c)) = chars.next() {
        match (c, quote) {
            ('\\', None) | ('\\', Some('`')) => {
                chars.next();
            }
            ('"', None) | ('`', None) => quote = Some(c),
            (q, Some(open)) if q == open => quote = None,
            ('#', None) => return &line[..idx],
            _ => {}
        }
    }
    line
}

fn symbol_kind(c: char) -> Option<TokenKind> {
    Some(match c {
        '[' => TokenKind::LeftSquare,
        ']' => TokenKind::RightSquare,
        '{' => TokenKind::LeftCurly,
        '}' => TokenKind::RightCurly,
        '<' => TokenKind::LeftAngle,
        '>' => TokenKind::RightAngle,
        '(' => TokenKind::LeftParen,
        ')' => TokenKind::RightParen,
        '|' => TokenKind::Pipe,
        ';' => TokenKind::Semicolon,
        ':' => TokenKind::Colon,
        '@' => TokenKind::At,
        '?' => TokenKind::Question,
        '!' => TokenKind::Exclamation,
        '$' => TokenKind::Dollar,
        '-' => TokenKind::Hyphen,
        _ => return None,
    })
}

fn is_text_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '\\' | '"' | '`') && symbol_kind(c).is_none()
}

struct LineLexer<'a> {
    content: &'a str,
    chars: Vec<(usize, char)>,
    i: usize,
    line: usize,
    base_column: usize,
    base_offset: usize,
}

impl LineLexer<'_> {
    fn position(&self, i: usize) -> Position {
        let offset = self.chars.get(i).map(|(o, _)| *o).unwrap_or(self.content.len());
        Position::new(self.line, self.base_column + i, self.base_offset + offset)
    }

    fn slice(&self, from: usize, to: usize) -> &str {
        let start = self.chars[from].0;
        let end = self.chars.get(to).map(|(o, _)| *o).unwrap_or(self.content.len());
        &self.content[start..end]
    }

    fn char_at(&self, i: usize) -> Option<char> {
        self.chars.get(i).map(|(_, c)| *c)
    }

    fn run(&mut self, tokens: &mut Vec<Token>) -> Result<(), LexError> {
        while self.i < self.chars.len() {
            let start = self.i;
            let position = self.position(start);
            let c = self.chars[start].1;

            let kind = if c == '\\' {
                self.i = self.scan_escape(start)?;
                TokenKind::Escape
            } else if c == '"' {
                self.i = self.scan_constant(start)?;
                TokenKind::Constant
            } else if c == '`' {
                self.i = self.scan_regex(start)?;
                TokenKind::Regex
            } else if c.is_whitespace() {
                self.i = self.scan_while(start, char::is_whitespace);
                TokenKind::Whitespace
            } else if c == ':' && self.char_at(start + 1) == Some(':') {
                self.i = start + 2;
                TokenKind::DoubleColon
            } else if let Some(kind) = symbol_kind(c) {
                self.i = start + 1;
                kind
            } else {
                self.i = self.scan_while(start, is_text_char);
                TokenKind::Text
            };

            tokens.push(Token::new(kind, self.slice(start, self.i), position));
        }
        Ok(())
    }

    fn scan_while(&self, start: usize, pred: fn(char) -> bool) -> usize {
        let mut j = start;
        while let Some(c) = self.char_at(j) {
            if !pred(c) {
                break;
            }
            j += 1;
        }
        j
    }

    fn scan_escape(&self, start: usize) -> Result<usize, LexError> {
        let err = || LexError::InvalidEscape(self.position(start));

        // Optional repeat count: \4,x
        let digits_end = self.scan_while(start + 1, |c| c.is_ascii_digit());
        let mut j = if digits_end > start + 1 && self.char_at(digits_end) == Some(',') {
            digits_end + 1
        } else {
            start + 1
        };

        match self.char_at(j) {
            Some('u') => {
                for k in 1..=4 {
                    match self.char_at(j + k) {
                        Some(h) if h.is_ascii_hexdigit() => {}
                        _ => return Err(err()),
                    }
                }
                j += 5;
            }
            Some(c) if !c.is_whitespace() => j += 1,
            _ => return Err(err()),
        }
        Ok(j)
    }

    fn scan_constant(&self, start: usize) -> Result<usize, LexError> {
        let mut j = start + 1;
        loop {
            match self.char_at(j) {
                None => return Err(LexError::UnterminatedLiteral(self.position(start))),
                Some('"') if self.char_at(j + 1) == Some('"') => j += 2,
                Some('"') => return Ok(j + 1),
                Some(_) => j += 1,
            }
        }
    }

    fn scan_regex(&self, start: usize) -> Result<usize, LexError> {
        let mut j = start + 1;
        loop {
            match self.char_at(j) {
                None => return Err(LexError::UnterminatedRegex(self.position(start))),
                Some('\\') => j += 2,
                Some('`') if self.char_at(j + 1) == Some('i') => return Ok(j + 2),
                Some('`') => return Ok(j + 1),
                Some(_) => j += 1,
            }
        }
    }
}

/// Body of an escape sequence after the optional repeat count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeBody {
    Code(char),
    Unicode(char),
}

/// Split an escape token into its repeat count and body.
pub fn parse_escape(text: &str) -> Option<(usize, EscapeBody)> {
    let body = text.strip_prefix('\\')?;
    let (count, rest) = match body.split_once(',') {
        Some((digits, rest))
            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) =>
        {
            (digits.parse().ok()?, rest)
        }
        _ => (1, body),
    };

    if let Some(hex) = rest.strip_prefix('u').filter(|h| h.len() == 4) {
        let code = u32::from_str_radix(hex, 16).ok()?;
        return Some((count, EscapeBody::Unicode(char::from_u32(code)?)));
    }

    let mut chars = rest.chars();
    let code = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    Some((count, EscapeBody::Code(code)))
}

/// Strip the quotes from a constant literal and collapse doubled quotes.
pub fn unescape_constant(text: &str) -> String {
    let inner = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text);
    inner.replace("\"\"", "\"")
}

/// Split a regex literal into its pattern and whether it ignores case.
/// An escaped backtick in the body stands for a plain backtick.
pub fn parse_regex_literal(text: &str) -> Option<(String, bool)> {
    let body = text.strip_prefix('`')?;
    let (body, ignore_case) = match body.strip_suffix("`i") {
        Some(body) => (body, true),
        None => (body.strip_suffix('`')?, false),
    };
    Some((body.replace("\\`", "`"), ignore_case))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(code: &str) -> Vec<TokenKind> {
        tokenize(code).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lex_tag_with_arguments() {
        use TokenKind::*;
        assert_eq!(
            kinds("[rep:3]{a|b}"),
            vec![
                LeftSquare, Text, Colon, Text, RightSquare, LeftCurly, Text, Pipe, Text,
                RightCurly
            ]
        );
    }

    #[test]
    fn lex_double_colon() {
        use TokenKind::*;
        assert_eq!(
            kinds("<noun::=a>"),
            vec![LeftAngle, Text, DoubleColon, Text, RightAngle]
        );
    }

    #[test]
    fn line_breaks_and_indentation_dropped() {
        let tokens = tokenize("{\n    a\n    |b\n}").unwrap();
        let text: String = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(text, "{a|b}");
    }

    #[test]
    fn comments_removed() {
        let tokens = tokenize("hello # a comment\nworld").unwrap();
        let text: String = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(text, "helloworld");
    }

    #[test]
    fn hash_inside_literal_is_not_a_comment() {
        let tokens = tokenize("\"#1\"").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Constant);
        assert_eq!(unescape_constant(&tokens[0].text), "#1");
    }

    #[test]
    fn whitespace_runs_collapse_to_one_token() {
        use TokenKind::*;
        assert_eq!(kinds("a   b"), vec![Text, Whitespace, Text]);
    }

    #[test]
    fn escapes() {
        let tokens = tokenize(r"\n\4,x\u0041").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(parse_escape(&tokens[0].text), Some((1, EscapeBody::Code('n'))));
        assert_eq!(parse_escape(&tokens[1].text), Some((4, EscapeBody::Code('x'))));
        assert_eq!(
            parse_escape(&tokens[2].text),
            Some((1, EscapeBody::Unicode('A')))
        );
    }

    #[test]
    fn bad_escape_errors() {
        assert!(matches!(
            tokenize(r"\u00"),
            Err(LexError::InvalidEscape(_))
        ));
    }

    #[test]
    fn unterminated_literal_errors() {
        assert!(matches!(
            tokenize("\"abc"),
            Err(LexError::UnterminatedLiteral(_))
        ));
    }

    #[test]
    fn regex_literals() {
        use TokenKind::*;
        assert_eq!(
            kinds("[`a+`i:x;y]"),
            vec![LeftSquare, Regex, Colon, Text, Semicolon, Text, RightSquare]
        );
        let tokens = tokenize(r"`a\`b#c`").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(
            parse_regex_literal(&tokens[0].text),
            Some(("a`b#c".to_string(), false))
        );
        assert_eq!(parse_regex_literal("`[0-9]`i"), Some(("[0-9]".to_string(), true)));
    }

    #[test]
    fn unterminated_regex_errors() {
        assert!(matches!(
            tokenize("[`abc:x;y]"),
            Err(LexError::UnterminatedRegex(_))
        ));
    }

    #[test]
    fn doubled_quotes_unescape() {
        assert_eq!(unescape_constant("\"say \"\"hi\"\"\""), "say \"hi\"");
    }

    #[test]
    fn positions_track_lines_and_columns() {
        let tokens = tokenize("ab\n  [x]").unwrap();
        let bracket = &tokens[1];
        assert_eq!(bracket.kind, TokenKind::LeftSquare);
        assert_eq!(bracket.position.line, 2);
        assert_eq!(bracket.position.column, 3);
        assert_eq!(bracket.position.offset, 5);
    }
}
