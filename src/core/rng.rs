/// Counter-based random number generator with branching.
///
/// Every draw is a pure function of `(seed, generation)`, so a sequence can be
/// replayed by pinning the generation. `branch` pushes a child seed derived
/// from a key; `merge` returns to the parent exactly where it left off.

use rand::RngCore;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Branch {
    seed: u64,
    generation: u64,
}

#[derive(Debug, Clone)]
pub struct Rng {
    branches: Vec<Branch>,
}

/// Mix a seed and generation into one 64-bit value.
pub fn raw(seed: u64, generation: u64) -> u64 {
    let mut z = seed ^ generation.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Stable hash for string keys (branch keys, synchronizer names).
pub fn hash_key(key: &str) -> u64 {
    let mut hasher = FxHasher::default();
    key.hash(&mut hasher);
    hasher.finish()
}

impl Rng {
    pub fn new(seed: u64) -> Self {
        Rng {
            branches: vec![Branch {
                seed,
                generation: 0,
            }],
        }
    }

    fn top(&self) -> &Branch {
        // The root branch is never removed.
        &self.branches[self.branches.len() - 1]
    }

    fn top_mut(&mut self) -> &mut Branch {
        let last = self.branches.len() - 1;
        &mut self.branches[last]
    }

    /// Seed of the active branch.
    pub fn seed(&self) -> u64 {
        self.top().seed
    }

    /// Seed of the root branch.
    pub fn base_seed(&self) -> u64 {
        self.branches[0].seed
    }

    pub fn generation(&self) -> u64 {
        self.top().generation
    }

    pub fn set_generation(&mut self, generation: u64) {
        self.top_mut().generation = generation;
    }

    pub fn depth(&self) -> usize {
        self.branches.len()
    }

    pub fn next_raw(&mut self) -> u64 {
        let top = self.top_mut();
        let value = raw(top.seed, top.generation);
        top.generation = top.generation.wrapping_add(1);
        value
    }

    /// The next raw value without advancing.
    pub fn peek(&self) -> u64 {
        raw(self.seed(), self.generation())
    }

    /// The raw value at an arbitrary generation of the active branch.
    pub fn peek_at(&self, generation: u64) -> u64 {
        raw(self.seed(), generation)
    }

    /// Uniform integer in `[0, max)`. Returns 0 when `max` is 0.
    pub fn next_below(&mut self, max: usize) -> usize {
        let value = self.next_raw() & 0x7FFF_FFFF;
        if max == 0 {
            0
        } else {
            (value % max as u64) as usize
        }
    }

    /// Uniform integer in `[min, max)`. Returns `min` for an empty range.
    pub fn next_range(&mut self, min: i64, max: i64) -> i64 {
        let value = (self.next_raw() & 0x7FFF_FFFF) as i64;
        if max <= min {
            min
        } else {
            min + value % (max - min)
        }
    }

    /// Uniform float in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_raw() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Push a child branch derived from `key` and the active seed.
    pub fn branch(&mut self, key: u64) {
        let seed = raw(key, self.seed());
        self.branches.push(Branch {
            seed,
            generation: 0,
        });
    }

    pub fn branch_str(&mut self, key: &str) {
        self.branch(hash_key(key));
    }

    /// Pop the active branch. The root branch cannot be merged.
    pub fn merge(&mut self) -> bool {
        if self.branches.len() > 1 {
            self.branches.pop();
            true
        } else {
            false
        }
    }

    /// Drop all branches and rewind the root to generation 0.
    pub fn reset(&mut self) {
        self.branches.truncate(1);
        self.branches[0].generation = 0;
    }
}

impl RngCore for Rng {
    fn next_u32(&mut self) -> u32 {
        (self.next_raw() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.next_raw()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_raw().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
