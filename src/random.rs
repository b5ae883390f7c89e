//! Randomness source for trade sizing, direction, shuffling and waits

use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

use crate::wallet::WalletSlot;
use crate::types::Direction;

/// Uniform random draws consumed by the engine
///
/// Kept behind a trait so scenario tests can script the draws.
pub trait Randomness: Send {
    /// Uniform integer in `[min, max]`
    fn uniform_u64(&mut self, min: u64, max: u64) -> u64;

    /// Uniform float in `[min, max]`
    fn uniform_f64(&mut self, min: f64, max: f64) -> f64;

    /// 50/50 buy or sell
    fn direction(&mut self) -> Direction;

    /// Uniform permutation of the slots in place
    fn shuffle(&mut self, slots: &mut [WalletSlot]);
}

/// `StdRng` backed randomness
pub struct StdRandomness {
    rng: StdRng,
}

impl StdRandomness {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Randomness for StdRandomness {
    fn uniform_u64(&mut self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        self.rng.gen_range(min..=max)
    }

    fn uniform_f64(&mut self, min: f64, max: f64) -> f64 {
        if min >= max {
            return min;
        }
        self.rng.gen_range(min..=max)
    }

    fn direction(&mut self) -> Direction {
        if self.rng.gen_bool(0.5) {
            Direction::Buy
        } else {
            Direction::Sell
        }
    }

    fn shuffle(&mut self, slots: &mut [WalletSlot]) {
        // Fisher-Yates
        slots.shuffle(&mut self.rng);
    }
}
