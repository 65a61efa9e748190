/// Text formatting helpers: case cursors, number formats, and English
/// indefinite-article selection.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Capitalization mode applied to text as it is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Case {
    #[default]
    None,
    Lower,
    Upper,
    /// Capitalize the next letter, then revert to `None`.
    First,
    Word,
    Sentence,
    Title,
}

impl FromStr for Case {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Case::None,
            "lower" => Case::Lower,
            "upper" => Case::Upper,
            "first" | "once" => Case::First,
            "word" => Case::Word,
            "sentence" => Case::Sentence,
            "title" => Case::Title,
            other => return Err(format!("invalid case mode '{}'", other)),
        })
    }
}

const TITLE_MINOR_WORDS: &[&str] = &[
    "a", "an", "the", "and", "but", "or", "nor", "for", "of", "in", "on", "at", "to", "by",
    "up", "as", "via",
];

/// Per-channel formatting state carried between writes.
#[derive(Debug, Clone, Default)]
pub struct CaseCursor {
    case: Case,
    last_char: Option<char>,
    sentence_start: bool,
}

impl CaseCursor {
    pub fn case(&self) -> Case {
        self.case
    }

    pub fn set_case(&mut self, case: Case) {
        self.case = case;
        if case == Case::Sentence {
            self.sentence_start = self
                .last_char
                .map_or(true, |c| matches!(c, '.' | '!' | '?') || c.is_whitespace());
        }
    }

    pub fn last_char(&self) -> Option<char> {
        self.last_char
    }

    /// Format `text` under the current mode and advance the cursor.
    pub fn apply(&mut self, text: &str) -> String {
        let out = match self.case {
            Case::None => text.to_string(),
            Case::Lower => text.to_lowercase(),
            Case::Upper => text.to_uppercase(),
            Case::First => self.apply_first(text),
            Case::Word => self.apply_word(text),
            Case::Sentence => self.apply_sentence(text),
            Case::Title => self.apply_title(text),
        };
        if let Some(c) = text.chars().last() {
            self.last_char = Some(c);
        }
        out
    }

    fn apply_first(&mut self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut done = false;
        for c in text.chars() {
            if !done && c.is_alphabetic() {
                out.extend(c.to_uppercase());
                done = true;
            } else {
                out.push(c);
            }
        }
        if done {
            self.case = Case::None;
        }
        out
    }

    fn apply_word(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut prev = self.last_char;
        for c in text.chars() {
            if c.is_alphabetic() && prev.map_or(true, char::is_whitespace) {
                out.extend(c.to_uppercase());
            } else {
                out.push(c);
            }
            prev = Some(c);
        }
        out
    }

    fn apply_sentence(&mut self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            if matches!(c, '.' | '!' | '?') {
                self.sentence_start = true;
                out.push(c);
            } else if self.sentence_start && c.is_alphabetic() {
                out.extend(c.to_uppercase());
                self.sentence_start = false;
            } else {
                if !c.is_whitespace() && !c.is_alphabetic() && !matches!(c, '"' | '\'' | '(') {
                    self.sentence_start = false;
                }
                out.push(c);
            }
        }
        out
    }

    fn apply_title(&self, text: &str) -> String {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::with_capacity(text.len());
        let mut prev = self.last_char;
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c.is_alphabetic() && !prev.is_some_and(char::is_alphabetic) {
                let end = chars[i..]
                    .iter()
                    .position(|ch| !ch.is_alphabetic())
                    .map_or(chars.len(), |p| i + p);
                let word: String = chars[i..end].iter().collect();
                let first_word = prev.is_none();
                let minor = TITLE_MINOR_WORDS.contains(&word.to_lowercase().as_str());
                if first_word || !minor {
                    out.extend(c.to_uppercase());
                    out.extend(chars[i + 1..end].iter());
                } else {
                    out.push_str(&word);
                }
                prev = chars.get(end - 1).copied();
                i = end;
                continue;
            }
            out.push(c);
            prev = Some(c);
            i += 1;
        }
        out
    }
}

/// Guess a case mode from sample text. Returns `None` when nothing stands
/// out.
pub fn infer_case(sample: &str) -> Option<Case> {
    let words: Vec<&str> = sample
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        return None;
    }

    let is_upper = |w: &&str| w.chars().all(|c| !c.is_lowercase());
    let starts_upper = |w: &&str| w.chars().next().is_some_and(char::is_uppercase);

    if words.iter().all(is_upper) && words.iter().any(|w| w.chars().any(char::is_alphabetic)) {
        Some(Case::Upper)
    } else if words.len() > 1 && words.iter().all(starts_upper) {
        Some(Case::Word)
    } else if starts_upper(&words[0]) {
        Some(Case::First)
    } else {
        None
    }
}

/// How integers are printed by numeric tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NumberFormat {
    #[default]
    Normal,
    Group,
    Roman,
    RomanLower,
    Verbal,
}

impl FromStr for NumberFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "normal" | "none" => NumberFormat::Normal,
            "group" | "grouped" => NumberFormat::Group,
            "roman" | "roman-upper" => NumberFormat::Roman,
            "roman-lower" => NumberFormat::RomanLower,
            "verbal" | "verbal-en" => NumberFormat::Verbal,
            other => return Err(format!("invalid number format '{}'", other)),
        })
    }
}

impl NumberFormat {
    pub fn format(self, n: i64) -> String {
        match self {
            NumberFormat::Normal => n.to_string(),
            NumberFormat::Group => group_digits(n),
            NumberFormat::Roman => to_roman(n).unwrap_or_else(|| n.to_string()),
            NumberFormat::RomanLower => to_roman(n)
                .map(|r| r.to_lowercase())
                .unwrap_or_else(|| n.to_string()),
            NumberFormat::Verbal => to_words(n),
        }
    }
}

fn group_digits(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn to_roman(n: i64) -> Option<String> {
    if !(1..4000).contains(&n) {
        return None;
    }
    const TABLE: &[(i64, &str)] = &[
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut rest = n;
    let mut out = String::new();
    for &(value, symbol) in TABLE {
        while rest >= value {
            out.push_str(symbol);
            rest -= value;
        }
    }
    Some(out)
}

const ONES: [&str; 20] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen",
];
const TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];
const SCALES: [&str; 7] = [
    "",
    "thousand",
    "million",
    "billion",
    "trillion",
    "quadrillion",
    "quintillion",
];

fn words_below_thousand(n: u64) -> String {
    let mut parts = Vec::new();
    let hundreds = n / 100;
    let rest = n % 100;
    if hundreds > 0 {
        parts.push(format!("{} hundred", ONES[hundreds as usize]));
    }
    if rest > 0 {
        if rest < 20 {
            parts.push(ONES[rest as usize].to_string());
        } else if rest % 10 == 0 {
            parts.push(TENS[(rest / 10) as usize].to_string());
        } else {
            parts.push(format!(
                "{}-{}",
                TENS[(rest / 10) as usize],
                ONES[(rest % 10) as usize]
            ));
        }
    }
    parts.join(" ")
}

fn to_words(n: i64) -> String {
    if n == 0 {
        return ONES[0].to_string();
    }
    let mut rest = n.unsigned_abs();
    let mut groups = Vec::new();
    let mut scale = 0;
    while rest > 0 {
        let chunk = rest % 1000;
        if chunk > 0 {
            let words = words_below_thousand(chunk);
            groups.push(if scale == 0 {
                words
            } else {
                format!("{} {}", words, SCALES[scale])
            });
        }
        rest /= 1000;
        scale += 1;
    }
    groups.reverse();
    let joined = groups.join(" ");
    if n < 0 {
        format!("negative {}", joined)
    } else {
        joined
    }
}

/// English a/an selection rules.
pub struct ArticleRules {
    ignore_prefixes: &'static [&'static str],
    allow_prefixes: &'static [&'static str],
    ignore_words: &'static [&'static str],
}

impl ArticleRules {
    pub const ENGLISH: ArticleRules = ArticleRules {
        ignore_prefixes: &["uni", "use", "uri", "urol", "euro", "u.", "one", "uvu"],
        allow_prefixes: &["honest", "honor", "hour", "heir", "8", "11", "18"],
        ignore_words: &["u"],
    };

    /// Whether `word` takes the vowel form ("an").
    pub fn takes_vowel_form(&self, word: &str) -> bool {
        let lower = word.to_lowercase();
        if lower.is_empty() {
            return false;
        }
        if self.allow_prefixes.iter().any(|p| lower.starts_with(p)) {
            return true;
        }
        let starts_vowel = lower
            .chars()
            .next()
            .is_some_and(|c| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'));
        starts_vowel
            && !self.ignore_prefixes.iter().any(|p| lower.starts_with(p))
            && !self.ignore_words.contains(&lower.as_str())
    }

    /// Article for the text that follows it, or `None` while that text has
    /// no word yet.
    pub fn article_for(&self, following: &str) -> Option<&'static str> {
        let word = following.split_whitespace().next()?;
        Some(if self.takes_vowel_form(word) { "an" } else { "a" })
    }
}

/// Re-case `article` to match how the placeholder was printed.
pub fn match_article_case(article: &str, printed: &str) -> String {
    let mut chars = printed.chars();
    match (chars.next(), chars.next()) {
        (Some(first), Some(second)) if first.is_uppercase() && second.is_uppercase() => {
            article.to_uppercase()
        }
        (Some(first), _) if first.is_uppercase() => {
            let mut out = String::with_capacity(article.len());
            let mut ac = article.chars();
            if let Some(c) = ac.next() {
                out.extend(c.to_uppercase());
            }
            out.extend(ac);
            out
        }
        _ => article.to_string(),
    }
}
