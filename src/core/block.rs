/// Blocks of weighted alternatives, the attributes that shape the next
/// block, and the repeater that walks one block instance.

use std::sync::Arc;

use crate::core::token::{TokenKind, TokenSeq};

/// A compiled `{a|b|c}` block.
#[derive(Debug, Clone)]
pub struct Block {
    items: Vec<(f64, TokenSeq)>,
    weight_total: f64,
}

impl Block {
    /// Build from `|`-separated items. An item may start with a numeric
    /// weight in parentheses: `{(3) common|rare}`.
    pub fn from_items(items: Vec<TokenSeq>) -> Block {
        let items: Vec<(f64, TokenSeq)> = items.into_iter().map(split_weight).collect();
        let weight_total = items.iter().map(|(w, _)| *w).sum();
        Block {
            items,
            weight_total,
        }
    }

    pub fn items(&self) -> &[(f64, TokenSeq)] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn weight_total(&self) -> f64 {
        self.weight_total
    }

    pub fn weights(&self) -> impl Iterator<Item = f64> + '_ {
        self.items.iter().map(|(w, _)| *w)
    }

    /// True when every item has weight 1, so a plain uniform draw will do.
    pub fn is_uniform(&self) -> bool {
        self.items.iter().all(|(w, _)| *w == 1.0)
    }
}

fn split_weight(item: TokenSeq) -> (f64, TokenSeq) {
    let tokens = item.tokens();
    if let [open, number, close, ..] = tokens {
        if open.kind == TokenKind::LeftParen
            && number.kind == TokenKind::Text
            && close.kind == TokenKind::RightParen
        {
            if let Ok(weight) = number.text.trim().parse::<f64>() {
                if weight.is_finite() && weight >= 0.0 {
                    let start = item.start() + 3;
                    let end = item.start() + item.len();
                    return (weight, item.range(start, end).trimmed());
                }
            }
        }
    }
    (1.0, item)
}

/// Repetition count for the next block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repetitions {
    Count(usize),
    /// Once per item.
    Each,
}

impl Default for Repetitions {
    fn default() -> Self {
        Repetitions::Count(1)
    }
}

/// What happens to the attributes after a block consumes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Persistence {
    /// Reset to defaults.
    #[default]
    Off,
    /// Keep for every following block.
    On,
    /// Keep for exactly one more block.
    Once,
}

impl std::str::FromStr for Persistence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "no" => Ok(Persistence::Off),
            "on" | "yes" => Ok(Persistence::On),
            "once" => Ok(Persistence::Once),
            other => Err(format!("invalid persistence mode '{}'", other)),
        }
    }
}

/// Attributes queued by tags for the next block.
#[derive(Debug, Clone)]
pub struct BlockAttribs {
    pub reps: Repetitions,
    pub separator: Option<TokenSeq>,
    pub before: Option<TokenSeq>,
    pub after: Option<TokenSeq>,
    /// Name of the bound synchronizer.
    pub sync: Option<String>,
    /// Percent chance that the block runs at all.
    pub chance: u32,
    pub persistence: Persistence,
}

impl Default for BlockAttribs {
    fn default() -> Self {
        BlockAttribs {
            reps: Repetitions::default(),
            separator: None,
            before: None,
            after: None,
            sync: None,
            chance: 100,
            persistence: Persistence::Off,
        }
    }
}

impl BlockAttribs {
    /// Hand the current attributes to a block and leave the queue in the
    /// state the persistence policy asks for.
    pub fn take(&mut self) -> BlockAttribs {
        let taken = self.clone();
        match taken.persistence {
            Persistence::Off => *self = BlockAttribs::default(),
            Persistence::On => {}
            Persistence::Once => self.persistence = Persistence::Off,
        }
        taken
    }
}

/// Iteration state over one block instance.
#[derive(Debug, Clone)]
pub struct Repeater {
    id: u64,
    block: Arc<Block>,
    attribs: BlockAttribs,
    index: usize,
    count: usize,
    suppressed: u32,
    /// Frame the block was entered from.
    base_frame: u64,
}

impl Repeater {
    pub fn new(id: u64, block: Arc<Block>, attribs: BlockAttribs) -> Self {
        let count = match attribs.reps {
            Repetitions::Each => block.len(),
            Repetitions::Count(n) => n,
        };
        Repeater {
            id,
            block,
            attribs,
            index: 0,
            count,
            suppressed: 0,
            base_frame: 0,
        }
    }

    /// Tie the repeater to the frame that entered the block.
    pub fn anchored(mut self, frame: u64) -> Self {
        self.base_frame = frame;
        self
    }

    pub fn base_frame(&self) -> u64 {
        self.base_frame
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn block(&self) -> &Arc<Block> {
        &self.block
    }

    pub fn attribs(&self) -> &BlockAttribs {
        &self.attribs
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Index as seen by pattern code: 0 while a separator runs.
    pub fn visible_index(&self) -> usize {
        if self.is_suppressed() {
            0
        } else {
            self.index
        }
    }

    pub fn is_finished(&self) -> bool {
        self.index >= self.count
    }

    /// Force the repeater to its terminal state.
    pub fn finish(&mut self) {
        self.index = self.count;
    }

    /// Advance to the next repetition. Returns the index just completed.
    pub fn advance(&mut self) -> Option<usize> {
        if self.is_finished() {
            return None;
        }
        let i = self.index;
        self.index += 1;
        Some(i)
    }

    pub fn suppress(&mut self) {
        self.suppressed += 1;
    }

    pub fn restore(&mut self) {
        self.suppressed = self.suppressed.saturating_sub(1);
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed > 0
    }

    fn visible(&self, value: bool) -> bool {
        !self.is_suppressed() && value
    }

    pub fn is_first(&self) -> bool {
        self.visible(self.index == 0)
    }

    pub fn is_last(&self) -> bool {
        self.visible(self.count > 0 && self.index == self.count - 1)
    }

    pub fn is_middle(&self) -> bool {
        self.visible(self.index != 0 && self.index + 1 != self.count)
    }

    /// Odd in 1-based counting: the 1st, 3rd, 5th repetitions.
    pub fn is_odd(&self) -> bool {
        self.visible(self.index % 2 == 0)
    }

    pub fn is_even(&self) -> bool {
        self.visible(self.index % 2 == 1)
    }

    /// True at indices `offset`, `offset + interval`, `offset + 2 * interval`, …
    pub fn is_nth(&self, offset: usize, interval: usize) -> bool {
        self.visible(
            interval > 0 && self.index >= offset && (self.index - offset) % interval == 0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reader::{BracketPairs, TokenReader};
    use crate::core::token::Pattern;

    fn block(code: &str) -> Block {
        let pattern = Pattern::compile("test", code).unwrap();
        let mut reader = TokenReader::new(pattern.sequence());
        reader.take(TokenKind::LeftCurly);
        let items = reader
            .extract_arguments(
                TokenKind::LeftCurly,
                TokenKind::RightCurly,
                TokenKind::Pipe,
                BracketPairs::ALL,
            )
            .unwrap();
        Block::from_items(items)
    }

    fn repeater(count: usize) -> Repeater {
        let attribs = BlockAttribs {
            reps: Repetitions::Count(count),
            ..BlockAttribs::default()
        };
        Repeater::new(1, Arc::new(block("{a|b}")), attribs)
    }

    #[test]
    fn weights_parsed_from_item_prefix() {
        let b = block("{(3) common|rare|(0.5)odd}");
        let weights: Vec<f64> = b.weights().collect();
        assert_eq!(weights, vec![3.0, 1.0, 0.5]);
        assert_eq!(b.weight_total(), 4.5);
        assert_eq!(b.items()[0].1.raw_text(), "common");
        assert!(!b.is_uniform());
    }

    #[test]
    fn non_numeric_parens_are_not_weights() {
        let b = block("{(x) y}");
        assert_eq!(b.items()[0].0, 1.0);
        assert_eq!(b.items()[0].1.raw_text(), "(x) y");
    }

    #[test]
    fn repeater_yields_exactly_count_iterations() {
        let mut rep = repeater(5);
        let mut firsts = 0;
        let mut lasts = 0;
        let mut iterations = 0;
        while !rep.is_finished() {
            if rep.is_first() {
                firsts += 1;
            }
            if rep.is_last() {
                lasts += 1;
            }
            rep.advance();
            iterations += 1;
        }
        assert_eq!(iterations, 5);
        assert_eq!(firsts, 1);
        assert_eq!(lasts, 1);
        assert_eq!(rep.advance(), None);
    }

    #[test]
    fn nth_hits_every_interval() {
        let mut rep = repeater(10);
        let mut hits = Vec::new();
        while !rep.is_finished() {
            if rep.is_nth(0, 3) {
                hits.push(rep.index());
            }
            rep.advance();
        }
        assert_eq!(hits, vec![0, 3, 6, 9]);
    }

    #[test]
    fn nth_with_offset() {
        let mut rep = repeater(8);
        let mut hits = Vec::new();
        while !rep.is_finished() {
            if rep.is_nth(1, 3) {
                hits.push(rep.index());
            }
            rep.advance();
        }
        assert_eq!(hits, vec![1, 4, 7]);
    }

    #[test]
    fn odd_even_are_one_based() {
        let mut rep = repeater(3);
        assert!(rep.is_odd());
        rep.advance();
        assert!(rep.is_even());
        assert!(rep.is_middle());
    }

    #[test]
    fn suppressed_predicates_report_false() {
        let mut rep = repeater(1);
        rep.suppress();
        assert!(!rep.is_first());
        assert!(!rep.is_last());
        rep.restore();
        assert!(rep.is_first());
    }

    #[test]
    fn suppressed_index_reads_zero() {
        let mut rep = repeater(3);
        rep.advance();
        rep.advance();
        rep.suppress();
        assert_eq!(rep.visible_index(), 0);
        assert_eq!(rep.count(), 3);
        rep.restore();
        assert_eq!(rep.visible_index(), 2);
    }

    #[test]
    fn each_repeats_once_per_item() {
        let attribs = BlockAttribs {
            reps: Repetitions::Each,
            ..BlockAttribs::default()
        };
        let rep = Repeater::new(1, Arc::new(block("{a|b|c}")), attribs);
        assert_eq!(rep.count(), 3);
    }

    #[test]
    fn finish_terminates() {
        let mut rep = repeater(4);
        rep.finish();
        assert!(rep.is_finished());
    }

    #[test]
    fn attribs_persistence() {
        let mut queue = BlockAttribs {
            reps: Repetitions::Count(3),
            ..BlockAttribs::default()
        };
        assert_eq!(queue.take().reps, Repetitions::Count(3));
        assert_eq!(queue.reps, Repetitions::Count(1));

        queue.reps = Repetitions::Count(2);
        queue.persistence = Persistence::Once;
        assert_eq!(queue.take().reps, Repetitions::Count(2));
        assert_eq!(queue.take().reps, Repetitions::Count(2));
        assert_eq!(queue.take().reps, Repetitions::Count(1));

        queue.reps = Repetitions::Each;
        queue.persistence = Persistence::On;
        for _ in 0..3 {
            assert_eq!(queue.take().reps, Repetitions::Each);
        }
    }
}
