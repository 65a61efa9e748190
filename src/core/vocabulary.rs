/// Dictionary queries: the `<name.subtype-class|class::=carrier>` syntax,
/// the `Vocabulary` seam, and an in-memory implementation.

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::core::rng::Rng;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("malformed query '{0}'")]
    Syntax(String),
    #[error("no table named '{0}'")]
    UnknownTable(String),
    #[error("table '{table}' has no subtype '{subtype}'")]
    UnknownSubtype { table: String, subtype: String },
    #[error("no entry in '{0}' satisfies the query")]
    NoMatch(String),
}

/// One alternative inside a class filter group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRule {
    pub class: String,
    /// `!class`: the entry must not have it.
    pub negated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarrierKind {
    /// `=id`: the same entry for every query with this id.
    Match,
    /// `!id`: never the same entry twice for this id.
    Unique,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Carrier {
    pub kind: CarrierKind,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Query {
    pub name: String,
    pub subtype: Option<String>,
    /// Each group must be satisfied by at least one of its rules.
    pub class_filters: Vec<Vec<ClassRule>>,
    /// Only entries whose classes are all named by positive rules.
    pub exclusive: bool,
    pub carriers: Vec<Carrier>,
}

impl Query {
    pub fn parse(text: &str) -> Result<Query, QueryError> {
        let syntax = || QueryError::Syntax(text.to_string());
        let text = text.trim();
        let (head, carrier_text) = match text.split_once("::") {
            Some((h, c)) => (h, Some(c)),
            None => (text, None),
        };

        let mut parts = head.split('-');
        let mut target = parts.next().unwrap_or_default().trim();
        let mut query = Query::default();
        if let Some(stripped) = target.strip_suffix('$') {
            query.exclusive = true;
            target = stripped.trim_end();
        }
        let (name, subtype) = match target.split_once('.') {
            Some((n, s)) => (n.trim(), Some(s.trim())),
            None => (target, None),
        };
        if name.is_empty() || subtype.is_some_and(str::is_empty) {
            return Err(syntax());
        }
        query.name = name.to_string();
        query.subtype = subtype.map(str::to_string);

        for group in parts {
            let mut rules = Vec::new();
            for alt in group.split('|') {
                let alt = alt.trim();
                let (class, negated) = match alt.strip_prefix('!') {
                    Some(rest) => (rest.trim(), true),
                    None => (alt, false),
                };
                if class.is_empty() {
                    return Err(syntax());
                }
                rules.push(ClassRule {
                    class: class.to_string(),
                    negated,
                });
            }
            query.class_filters.push(rules);
        }

        if let Some(carrier_text) = carrier_text {
            for component in carrier_text.split_whitespace() {
                let (kind, id) = if let Some(id) = component.strip_prefix('=') {
                    (CarrierKind::Match, id)
                } else if let Some(id) = component.strip_prefix('!') {
                    (CarrierKind::Unique, id)
                } else {
                    return Err(syntax());
                };
                if id.is_empty() {
                    return Err(syntax());
                }
                query.carriers.push(Carrier {
                    kind,
                    id: id.to_string(),
                });
            }
        }
        Ok(query)
    }

    fn accepts(&self, classes: &[String]) -> bool {
        let has = |c: &str| classes.iter().any(|x| x == c);
        let groups_ok = self
            .class_filters
            .iter()
            .all(|group| group.iter().any(|r| has(&r.class) != r.negated));
        if !groups_ok {
            return false;
        }
        if self.exclusive {
            let named: FxHashSet<&str> = self
                .class_filters
                .iter()
                .flatten()
                .filter(|r| !r.negated)
                .map(|r| r.class.as_str())
                .collect();
            return classes.iter().all(|c| named.contains(c.as_str()));
        }
        true
    }
}

/// Per-run carrier memory handed to the vocabulary on every query.
#[derive(Debug, Default, Clone)]
pub struct CarrierState {
    matches: FxHashMap<(String, String), usize>,
    used: FxHashMap<(String, String), FxHashSet<usize>>,
}

impl CarrierState {
    pub fn matched(&self, table: &str, id: &str) -> Option<usize> {
        self.matches
            .get(&(table.to_string(), id.to_string()))
            .copied()
    }

    pub fn set_match(&mut self, table: &str, id: &str, entry: usize) {
        self.matches
            .insert((table.to_string(), id.to_string()), entry);
    }

    pub fn is_used(&self, table: &str, id: &str, entry: usize) -> bool {
        self.used
            .get(&(table.to_string(), id.to_string()))
            .is_some_and(|set| set.contains(&entry))
    }

    pub fn mark_used(&mut self, table: &str, id: &str, entry: usize) {
        self.used
            .entry((table.to_string(), id.to_string()))
            .or_default()
            .insert(entry);
    }
}

/// Source of dictionary terms.
pub trait Vocabulary: Send + Sync {
    fn query(
        &self,
        rng: &mut Rng,
        query: &Query,
        carrier: &mut CarrierState,
    ) -> Result<String, QueryError>;
}

/// A vocabulary with no tables. Every query fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyVocabulary;

impl Vocabulary for EmptyVocabulary {
    fn query(
        &self,
        _rng: &mut Rng,
        query: &Query,
        _carrier: &mut CarrierState,
    ) -> Result<String, QueryError> {
        Err(QueryError::UnknownTable(query.name.clone()))
    }
}

#[derive(Debug, Clone)]
struct Entry {
    forms: Vec<String>,
    classes: Vec<String>,
}

#[derive(Debug, Clone)]
struct Table {
    subtypes: Vec<String>,
    entries: Vec<Entry>,
}

/// Tables of terms held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryVocabulary {
    tables: FxHashMap<String, Table>,
}

impl MemoryVocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a table. The first subtype is the default form.
    pub fn add_table(&mut self, name: &str, subtypes: &[&str]) {
        self.tables.insert(
            name.to_string(),
            Table {
                subtypes: subtypes.iter().map(|s| s.to_string()).collect(),
                entries: Vec::new(),
            },
        );
    }

    /// Add an entry with one form per subtype. Missing forms fall back to
    /// the first one.
    pub fn add_entry(
        &mut self,
        table: &str,
        forms: &[&str],
        classes: &[&str],
    ) -> Result<(), QueryError> {
        let t = self
            .tables
            .get_mut(table)
            .ok_or_else(|| QueryError::UnknownTable(table.to_string()))?;
        t.entries.push(Entry {
            forms: forms.iter().map(|s| s.to_string()).collect(),
            classes: classes.iter().map(|s| s.to_string()).collect(),
        });
        Ok(())
    }
}

impl Vocabulary for MemoryVocabulary {
    fn query(
        &self,
        rng: &mut Rng,
        query: &Query,
        carrier: &mut CarrierState,
    ) -> Result<String, QueryError> {
        let table = self
            .tables
            .get(&query.name)
            .ok_or_else(|| QueryError::UnknownTable(query.name.clone()))?;

        let form = match &query.subtype {
            None => 0,
            Some(sub) => table
                .subtypes
                .iter()
                .position(|s| s == sub)
                .ok_or_else(|| QueryError::UnknownSubtype {
                    table: query.name.clone(),
                    subtype: sub.clone(),
                })?,
        };

        let matched = query
            .carriers
            .iter()
            .filter(|c| c.kind == CarrierKind::Match)
            .find_map(|c| carrier.matched(&query.name, &c.id));

        let index = match matched {
            Some(index) if index < table.entries.len() => index,
            _ => {
                let candidates: Vec<usize> = (0..table.entries.len())
                    .filter(|&i| query.accepts(&table.entries[i].classes))
                    .filter(|&i| {
                        query
                            .carriers
                            .iter()
                            .filter(|c| c.kind == CarrierKind::Unique)
                            .all(|c| !carrier.is_used(&query.name, &c.id, i))
                    })
                    .collect();
                if candidates.is_empty() {
                    return Err(QueryError::NoMatch(query.name.clone()));
                }
                candidates[rng.next_below(candidates.len())]
            }
        };

        for c in &query.carriers {
            match c.kind {
                CarrierKind::Match => carrier.set_match(&query.name, &c.id, index),
                CarrierKind::Unique => carrier.mark_used(&query.name, &c.id, index),
            }
        }

        let entry = &table.entries[index];
        Ok(entry
            .forms
            .get(form)
            .or_else(|| entry.forms.first())
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn animals() -> MemoryVocabulary {
        let mut vocab = MemoryVocabulary::new();
        vocab.add_table("noun", &["singular", "plural"]);
        vocab.add_entry("noun", &["cat", "cats"], &["animal", "pet"]).unwrap();
        vocab.add_entry("noun", &["wolf", "wolves"], &["animal"]).unwrap();
        vocab.add_entry("noun", &["chair", "chairs"], &["furniture"]).unwrap();
        vocab
    }

    #[test]
    fn parses_full_query() {
        let q = Query::parse("noun.plural-animal|!pet-wild::=a !b").unwrap();
        assert_eq!(q.name, "noun");
        assert_eq!(q.subtype.as_deref(), Some("plural"));
        assert_eq!(q.class_filters.len(), 2);
        assert!(q.class_filters[0][1].negated);
        assert_eq!(q.carriers.len(), 2);
        assert_eq!(q.carriers[1].kind, CarrierKind::Unique);
    }

    #[test]
    fn rejects_malformed_queries() {
        assert!(Query::parse("").is_err());
        assert!(Query::parse("noun.").is_err());
        assert!(Query::parse("noun-").is_err());
        assert!(Query::parse("noun::x").is_err());
    }

    #[test]
    fn class_filter_and_subtype() {
        let vocab = animals();
        let mut rng = Rng::new(1);
        let mut carrier = CarrierState::default();
        let q = Query::parse("noun.plural-furniture").unwrap();
        for _ in 0..5 {
            assert_eq!(vocab.query(&mut rng, &q, &mut carrier).unwrap(), "chairs");
        }
    }

    #[test]
    fn exclusive_requires_only_named_classes() {
        let vocab = animals();
        let mut rng = Rng::new(2);
        let mut carrier = CarrierState::default();
        let q = Query::parse("noun$-animal").unwrap();
        for _ in 0..5 {
            assert_eq!(vocab.query(&mut rng, &q, &mut carrier).unwrap(), "wolf");
        }
    }

    #[test]
    fn match_carrier_repeats_entry() {
        let vocab = animals();
        let mut rng = Rng::new(3);
        let mut carrier = CarrierState::default();
        let first = vocab
            .query(&mut rng, &Query::parse("noun::=x").unwrap(), &mut carrier)
            .unwrap();
        let plural = vocab
            .query(&mut rng, &Query::parse("noun.plural::=x").unwrap(), &mut carrier)
            .unwrap();
        assert!(plural.starts_with(&first[..3]));
    }

    #[test]
    fn unique_carrier_exhausts() {
        let vocab = animals();
        let mut rng = Rng::new(4);
        let mut carrier = CarrierState::default();
        let q = Query::parse("noun::!u").unwrap();
        let mut seen: Vec<String> = (0..3)
            .map(|_| vocab.query(&mut rng, &q, &mut carrier).unwrap())
            .collect();
        seen.sort();
        assert_eq!(seen, vec!["cat", "chair", "wolf"]);
        assert_eq!(
            vocab.query(&mut rng, &q, &mut carrier),
            Err(QueryError::NoMatch("noun".into()))
        );
    }

    #[test]
    fn unknown_table_and_subtype() {
        let vocab = animals();
        let mut rng = Rng::new(5);
        let mut carrier = CarrierState::default();
        assert!(matches!(
            vocab.query(&mut rng, &Query::parse("verb").unwrap(), &mut carrier),
            Err(QueryError::UnknownTable(_))
        ));
        assert!(matches!(
            vocab.query(&mut rng, &Query::parse("noun.past").unwrap(), &mut carrier),
            Err(QueryError::UnknownSubtype { .. })
        ));
    }
}
