/// Named synchronizers: independently seeded item selectors that let
/// several blocks agree on which item to pick.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

use crate::core::rng::{hash_key, raw, Rng};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncType {
    /// A fresh random item every time.
    #[default]
    None,
    Forward,
    Reverse,
    /// Shuffled, reshuffled after every full pass.
    Deck,
    /// Shuffled once, the same order every pass.
    Cdeck,
    /// One random item forever.
    Locked,
    /// Ascending, then bouncing back without repeating the ends.
    Ping,
    /// Descending, then bouncing back without repeating the ends.
    Pong,
}

impl FromStr for SyncType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "none" => SyncType::None,
            "forward" | "ordered" => SyncType::Forward,
            "reverse" => SyncType::Reverse,
            "deck" => SyncType::Deck,
            "cdeck" => SyncType::Cdeck,
            "locked" => SyncType::Locked,
            "ping" => SyncType::Ping,
            "pong" => SyncType::Pong,
            other => return Err(format!("invalid synchronizer type '{}'", other)),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Synchronizer {
    kind: SyncType,
    rng: Rng,
    state: Option<Vec<usize>>,
    index: usize,
    bounce: bool,
    pinned: bool,
}

impl Synchronizer {
    pub fn new(kind: SyncType, seed: u64) -> Self {
        Synchronizer {
            kind,
            rng: Rng::new(seed),
            state: None,
            index: 0,
            bounce: false,
            pinned: false,
        }
    }

    pub fn kind(&self) -> SyncType {
        self.kind
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    pub fn set_pinned(&mut self, pinned: bool) {
        self.pinned = pinned;
    }

    pub fn reset(&mut self) {
        self.rng.reset();
        self.restart();
    }

    pub fn reseed(&mut self, seed: &str) {
        self.rng = Rng::new(hash_key(seed));
        self.restart();
    }

    fn restart(&mut self) {
        self.index = 0;
        self.bounce = false;
        if let Some(mut state) = self.state.take() {
            self.fill(&mut state);
            self.state = Some(state);
        }
    }

    /// Choose an item out of `count`. A change of count rebuilds the order.
    pub fn next_item(&mut self, count: usize) -> usize {
        if count == 0 {
            return 0;
        }
        if self.kind == SyncType::None {
            return self.rng.next_below(count);
        }
        match &self.state {
            Some(state) if state.len() == count => {}
            _ => {
                let mut state = vec![0; count];
                self.fill(&mut state);
                self.state = Some(state);
                self.index = 0;
            }
        }
        self.step(false)
    }

    /// Advance the order. `force` steps even while pinned.
    pub fn step(&mut self, force: bool) -> usize {
        let Some(mut state) = self.state.take() else {
            return 0;
        };
        let item = self.step_in(&mut state, force);
        self.state = Some(state);
        item
    }

    fn step_in(&mut self, state: &mut [usize], force: bool) -> usize {
        let len = state.len();
        if len == 0 {
            return 0;
        }
        if self.kind == SyncType::Locked {
            return state[0];
        }
        if self.index >= len {
            match self.kind {
                SyncType::Deck => {
                    self.scramble(state);
                    self.index = 0;
                }
                SyncType::Ping | SyncType::Pong => {
                    self.bounce = !self.bounce;
                    self.index = if len > 1 { 1 } else { 0 };
                }
                _ => self.index = 0,
            }
        }
        let slot = if self.bounce { len - 1 - self.index } else { self.index };
        if !self.pinned || force {
            self.index += 1;
        }
        state[slot]
    }

    fn fill(&mut self, state: &mut [usize]) {
        let len = state.len();
        match self.kind {
            SyncType::Forward | SyncType::Ping | SyncType::None => {
                for (i, slot) in state.iter_mut().enumerate() {
                    *slot = i;
                }
            }
            SyncType::Reverse | SyncType::Pong => {
                for (i, slot) in state.iter_mut().enumerate() {
                    *slot = len - 1 - i;
                }
            }
            SyncType::Locked | SyncType::Deck | SyncType::Cdeck => {
                for (i, slot) in state.iter_mut().enumerate() {
                    *slot = i;
                }
                self.scramble(state);
            }
        }
    }

    fn scramble(&mut self, state: &mut [usize]) {
        let len = state.len();
        match len {
            0 | 1 => {}
            2 => {
                if self.rng.next_below(2) == 0 {
                    state.swap(0, 1);
                }
            }
            _ => {
                for i in 0..len {
                    let s = self.rng.next_below(len);
                    state.swap(i, s);
                }
            }
        }
    }
}

/// All synchronizers of one run, plus pins requested before creation.
#[derive(Debug, Default)]
pub struct SyncManager {
    table: FxHashMap<String, Synchronizer>,
    pin_queue: FxHashSet<String>,
}

impl SyncManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Synchronizer> {
        self.table.get_mut(name)
    }

    /// Create `name` if missing. The seed is derived from the name and the
    /// run's active seed, so creation order does not matter.
    pub fn create(&mut self, name: &str, kind: SyncType, rng: &Rng) {
        if self.table.contains_key(name) {
            return;
        }
        let mut sync = Synchronizer::new(kind, raw(hash_key(name), rng.seed()));
        sync.set_pinned(self.pin_queue.remove(name));
        debug!(name, ?kind, "synchronizer created");
        self.table.insert(name.to_string(), sync);
    }

    pub fn set_pinned(&mut self, name: &str, pinned: bool) {
        match self.table.get_mut(name) {
            Some(sync) => sync.set_pinned(pinned),
            None if pinned => {
                self.pin_queue.insert(name.to_string());
            }
            None => {
                self.pin_queue.remove(name);
            }
        }
    }

    pub fn step(&mut self, name: &str) -> bool {
        self.table.get_mut(name).map(|s| s.step(true)).is_some()
    }

    pub fn reset(&mut self, name: &str) -> bool {
        self.table.get_mut(name).map(Synchronizer::reset).is_some()
    }

    pub fn reseed(&mut self, name: &str, seed: &str) -> bool {
        self.table.get_mut(name).map(|s| s.reseed(seed)).is_some()
    }

    pub fn next_item(&mut self, name: &str, count: usize) -> Option<usize> {
        self.table.get_mut(name).map(|s| s.next_item(count))
    }
}
