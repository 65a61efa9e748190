/// Regex replacers: ``[`pattern`i:input;replacement]``.
///
/// The input runs first. Each match then runs the replacement body once,
/// in match order, with the match readable through `[match]` and
/// `[group:n]`. The results are spliced back into the input.

use regex::{Regex, RegexBuilder};

use crate::core::lexer::parse_regex_literal;

/// Compile a regex token's text.
pub fn compile(literal: &str) -> Result<Regex, String> {
    let (body, ignore_case) =
        parse_regex_literal(literal).ok_or_else(|| format!("malformed regex literal {}", literal))?;
    RegexBuilder::new(&body)
        .case_insensitive(ignore_case)
        .build()
        .map_err(|e| e.to_string())
}

/// One match of a replacer's regex, detached from the searched text.
#[derive(Debug, Clone, PartialEq)]
pub struct RegexMatch {
    pub start: usize,
    pub end: usize,
    /// Numbered groups; 0 is the whole match.
    groups: Vec<Option<String>>,
    names: Vec<(String, usize)>,
}

impl RegexMatch {
    pub fn text(&self) -> &str {
        self.group_at(0).unwrap_or("")
    }

    fn group_at(&self, index: usize) -> Option<&str> {
        self.groups.get(index).and_then(|g| g.as_deref())
    }

    /// A group by name, or by number when `key` is numeric.
    pub fn group(&self, key: &str) -> Option<&str> {
        let key = key.trim();
        if let Ok(index) = key.parse::<usize>() {
            return self.group_at(index);
        }
        self.names
            .iter()
            .find(|(name, _)| name == key)
            .and_then(|&(_, index)| self.group_at(index))
    }
}

/// Every non-overlapping match of `regex` in `input`, leftmost first.
pub fn find_matches(regex: &Regex, input: &str) -> Vec<RegexMatch> {
    let names: Vec<(String, usize)> = regex
        .capture_names()
        .enumerate()
        .filter_map(|(i, name)| name.map(|n| (n.to_string(), i)))
        .collect();
    regex
        .captures_iter(input)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(RegexMatch {
                start: whole.start(),
                end: whole.end(),
                groups: caps
                    .iter()
                    .map(|g| g.map(|m| m.as_str().to_string()))
                    .collect(),
                names: names.clone(),
            })
        })
        .collect()
}

/// Rebuild `input` with each matched span replaced by its result.
pub fn splice(input: &str, spans: &[(usize, usize)], replacements: &[String]) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for (&(start, end), replacement) in spans.iter().zip(replacements) {
        out.push_str(&input[last..start]);
        out.push_str(replacement);
        last = end;
    }
    out.push_str(&input[last..]);
    out
}
