//! Wallet pool for a trading session
//!
//! The pool is owned by the scheduler. Evicted wallets are dropped for the
//! rest of the session and never come back.

use crate::random::Randomness;
use crate::wallet::WalletSlot;

/// The mutable list of trading wallets for one session
#[derive(Debug, Default)]
pub struct WalletPool {
    slots: Vec<WalletSlot>,
    evicted: usize,
}

impl WalletPool {
    pub fn new(slots: Vec<WalletSlot>) -> Self {
        Self { slots, evicted: 0 }
    }

    /// Randomly permute the pool and return the new order
    pub fn shuffle(&mut self, rng: &mut dyn Randomness) -> &[WalletSlot] {
        rng.shuffle(&mut self.slots);
        &self.slots
    }

    /// Remove a wallet for the rest of the session
    ///
    /// Returns the removed slot, or `None` if it was already gone.
    pub fn evict(&mut self, id: usize) -> Option<WalletSlot> {
        let pos = self.slots.iter().position(|s| s.id() == id)?;
        self.evicted += 1;
        Some(self.slots.remove(pos))
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot at `index` in the current order
    pub fn get(&self, index: usize) -> Option<&WalletSlot> {
        self.slots.get(index)
    }

    pub fn contains(&self, id: usize) -> bool {
        self.slots.iter().any(|s| s.id() == id)
    }

    pub fn ids(&self) -> Vec<usize> {
        self.slots.iter().map(WalletSlot::id).collect()
    }

    /// Number of wallets evicted so far this session
    pub fn evicted_count(&self) -> usize {
        self.evicted
    }
}
