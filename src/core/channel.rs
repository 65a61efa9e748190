/// A single output channel: chunked text with splice targets, markers,
/// and indefinite-article cells.
///
/// Text lives in an append-only list of chunks. Creating a target closes
/// the current chunk, so text later sent to the target is spliced at that
/// point instead of at the end of the stream. Chunk indices never move, which
/// keeps targets, markers, and article cells valid as the channel grows.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::core::format::{match_article_case, ArticleRules, Case, CaseCursor};

/// Which channels a write reaches while this channel is on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
    Internal,
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            "internal" => Ok(Visibility::Internal),
            other => Err(format!("invalid channel visibility '{}'", other)),
        }
    }
}

/// A position inside a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub chunk: usize,
    pub offset: usize,
}

#[derive(Debug, Clone)]
struct ArticleCell {
    /// Chunk holding the printed article.
    chunk: usize,
}

/// Text formatted for one channel but not yet committed.
#[derive(Debug, Clone)]
pub struct PendingWrite {
    text: String,
    cursor: CaseCursor,
    article_growth: usize,
}

impl PendingWrite {
    /// Characters committing adds to the channel.
    pub fn cost(&self) -> usize {
        char_len(&self.text) + self.article_growth
    }
}

#[derive(Debug, Clone)]
pub struct Channel {
    name: String,
    visibility: Visibility,
    chunks: Vec<String>,
    current: usize,
    back_targets: FxHashMap<String, usize>,
    forward_targets: FxHashMap<String, String>,
    /// Keyed by the chunk following the article.
    articles: FxHashMap<usize, ArticleCell>,
    markers: FxHashMap<String, Marker>,
    cursor: CaseCursor,
    length: usize,
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn char_slice(s: &str, from: usize, to: usize) -> &str {
    let mut indices = s.char_indices().map(|(i, _)| i).chain(std::iter::once(s.len()));
    let start = indices.clone().nth(from).unwrap_or(s.len());
    let end = indices.nth(to).unwrap_or(s.len());
    if end < start {
        ""
    } else {
        &s[start..end]
    }
}

impl Channel {
    pub fn new(name: &str, visibility: Visibility) -> Self {
        Channel {
            name: name.to_string(),
            visibility,
            chunks: vec![String::new()],
            current: 0,
            back_targets: FxHashMap::default(),
            forward_targets: FxHashMap::default(),
            articles: FxHashMap::default(),
            markers: FxHashMap::default(),
            cursor: CaseCursor::default(),
            length: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn set_visibility(&mut self, visibility: Visibility) {
        self.visibility = visibility;
    }

    /// Total characters across all chunks.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn value(&self) -> String {
        self.chunks.concat()
    }

    pub fn case(&self) -> Case {
        self.cursor.case()
    }

    pub fn set_case(&mut self, case: Case) {
        self.cursor.set_case(case);
    }

    fn push_chunk(&mut self, text: String) -> usize {
        self.length += char_len(&text);
        self.chunks.push(text);
        self.chunks.len() - 1
    }

    /// Format `text` against a copy of the case cursor without touching the
    /// channel.
    pub fn prepare_write(&self, text: &str) -> PendingWrite {
        let mut cursor = self.cursor.clone();
        let text = cursor.apply(text);
        let article_growth = self.article_growth(self.current, &text, false);
        PendingWrite {
            text,
            cursor,
            article_growth,
        }
    }

    /// Append a prepared write at the end of the stream.
    pub fn commit_write(&mut self, pending: PendingWrite) {
        self.cursor = pending.cursor;
        if pending.text.is_empty() {
            return;
        }
        self.length += char_len(&pending.text);
        self.chunks[self.current].push_str(&pending.text);
        self.refresh_article(self.current);
    }

    /// Append formatted text at the end of the stream.
    pub fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let pending = self.prepare_write(text);
        self.commit_write(pending);
    }

    /// Print an article placeholder whose form follows the next word.
    pub fn write_article(&mut self) {
        let printed = self.cursor.apply("a");
        let chunk = self.push_chunk(printed);
        let after = self.push_chunk(String::new());
        self.current = after;
        self.articles.insert(after, ArticleCell { chunk });
    }

    /// The article form owed to the cell before `after` once that chunk
    /// reads `following`.
    fn article_form(&self, after: usize, following: &str) -> Option<(usize, String)> {
        let cell = self.articles.get(&after)?;
        let article = ArticleRules::ENGLISH.article_for(following)?;
        Some((cell.chunk, match_article_case(article, &self.chunks[cell.chunk])))
    }

    /// Characters the article before `chunk` gains if `text` lands there.
    fn article_growth(&self, chunk: usize, text: &str, overwrite: bool) -> usize {
        if !self.articles.contains_key(&chunk) {
            return 0;
        }
        let following = if overwrite {
            text.to_string()
        } else {
            format!("{}{}", self.chunks[chunk], text)
        };
        match self.article_form(chunk, &following) {
            Some((cell, form)) => char_len(&form).saturating_sub(char_len(&self.chunks[cell])),
            None => 0,
        }
    }

    fn refresh_article(&mut self, after: usize) {
        let Some((cell, form)) = self.article_form(after, &self.chunks[after]) else {
            return;
        };
        if self.chunks[cell] != form {
            let old_len = char_len(&self.chunks[cell]);
            self.length = self.length + char_len(&form) - old_len;
            self.chunks[cell] = form;
        }
    }

    /// Characters a target write adds, including article growth.
    pub fn target_cost(&self, name: &str, value: &str, overwrite: bool) -> usize {
        let growth = self
            .back_targets
            .get(name)
            .map_or(0, |&chunk| self.article_growth(chunk, value, overwrite));
        char_len(value) + growth
    }

    /// Open a splice point named `name` at the end of the stream.
    pub fn create_target(&mut self, name: &str) {
        let queued = self.forward_targets.remove(name).unwrap_or_default();
        let target = self.push_chunk(queued);
        self.back_targets.insert(name.to_string(), target);
        self.current = self.push_chunk(String::new());
    }

    /// Write to a target. Targets not yet created queue the text until they
    /// are.
    pub fn write_to_target(&mut self, name: &str, value: &str, overwrite: bool) {
        match self.back_targets.get(name).copied() {
            None => {
                let buffer = self.forward_targets.entry(name.to_string()).or_default();
                if overwrite {
                    buffer.clear();
                }
                buffer.push_str(value);
            }
            Some(chunk) => {
                if overwrite {
                    self.length -= char_len(&self.chunks[chunk]);
                    self.chunks[chunk].clear();
                }
                self.length += char_len(value);
                self.chunks[chunk].push_str(value);
                self.refresh_article(chunk);
            }
        }
    }

    pub fn clear_target(&mut self, name: &str) {
        if let Some(chunk) = self.back_targets.get(name).copied() {
            self.length -= char_len(&self.chunks[chunk]);
            self.chunks[chunk].clear();
        } else if let Some(buffer) = self.forward_targets.get_mut(name) {
            buffer.clear();
        }
    }

    pub fn set_marker(&mut self, name: &str) {
        let marker = Marker {
            chunk: self.current,
            offset: char_len(&self.chunks[self.current]),
        };
        self.markers.insert(name.to_string(), marker);
    }

    pub fn marker(&self, name: &str) -> Option<Marker> {
        self.markers.get(name).copied()
    }

    fn ordered(&self, a: &str, b: &str) -> Option<(Marker, Marker)> {
        let (ma, mb) = (self.marker(a)?, self.marker(b)?);
        if (ma.chunk, ma.offset) <= (mb.chunk, mb.offset) {
            Some((ma, mb))
        } else {
            Some((mb, ma))
        }
    }

    /// Characters between two markers, counted live across every chunk in
    /// between.
    pub fn measure_distance(&self, a: &str, b: &str) -> Option<usize> {
        let (start, end) = self.ordered(a, b)?;
        if start.chunk == end.chunk {
            return Some(end.offset - start.offset);
        }
        let head = char_len(&self.chunks[start.chunk]).saturating_sub(start.offset);
        let middle: usize = self.chunks[start.chunk + 1..end.chunk]
            .iter()
            .map(|c| char_len(c))
            .sum();
        Some(head + middle + end.offset)
    }

    /// Text between two markers.
    pub fn copy_region(&self, a: &str, b: &str) -> Option<String> {
        let (start, end) = self.ordered(a, b)?;
        let first = &self.chunks[start.chunk];
        if start.chunk == end.chunk {
            return Some(char_slice(first, start.offset, end.offset).to_string());
        }
        let mut out = char_slice(first, start.offset, char_len(first)).to_string();
        for chunk in &self.chunks[start.chunk + 1..end.chunk] {
            out.push_str(chunk);
        }
        out.push_str(char_slice(&self.chunks[end.chunk], 0, end.offset));
        Some(out)
    }
}
