//! Random number generator abstraction for determinism.
//!
//! Matchmaking draws on randomness to shuffle idle agents and to pick a
//! scenario among eligible candidates. In production this wraps a real RNG;
//! tests inject a seeded or scripted implementation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Abstraction over random number generation.
pub trait DeterministicRng: Send + Sync {
    /// Generate a random `u32` in the range `[min, max]` inclusive.
    fn next_u32_range(&mut self, min: u32, max: u32) -> u32;

    /// Generate a random `f64` in `[0.0, 1.0)`.
    fn next_f64(&mut self) -> f64;
}

/// Production RNG backed by `StdRng`.
#[derive(Debug)]
pub struct StdRandom(StdRng);

impl StdRandom {
    /// Seeds from the operating system.
    #[must_use]
    pub fn from_os() -> Self {
        Self(StdRng::from_os_rng())
    }

    /// Seeds from a fixed value, for reproducible runs.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl DeterministicRng for StdRandom {
    fn next_u32_range(&mut self, min: u32, max: u32) -> u32 {
        if min >= max {
            return min;
        }
        self.0.random_range(min..=max)
    }

    fn next_f64(&mut self) -> f64 {
        self.0.random::<f64>()
    }
}

/// Picks an index in `0..len` uniformly. Returns `None` for an empty range.
pub fn pick_index(rng: &mut dyn DeterministicRng, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let max = u32::try_from(len - 1).unwrap_or(u32::MAX);
    let picked = rng.next_u32_range(0, max) as usize;
    Some(picked.min(len - 1))
}

/// Shuffles `items` in place (Fisher-Yates).
pub fn shuffle<T>(rng: &mut dyn DeterministicRng, items: &mut [T]) {
    for i in (1..items.len()).rev() {
        let max = u32::try_from(i).unwrap_or(u32::MAX);
        let j = (rng.next_u32_range(0, max) as usize).min(i);
        items.swap(i, j);
    }
}
