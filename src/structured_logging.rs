//! Structured session logging keyed by a per-cycle correlation id

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use uuid::Uuid;

use crate::errors::EngineError;
use crate::types::{CycleOutcome, TradeIntent, TradeMode};

/// Correlation ID tying together every event of one cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Structured logger for session and cycle events
#[derive(Debug, Clone)]
pub struct SessionLogger {
    context_id: CorrelationId,
    cycle: u64,
}

impl SessionLogger {
    /// Logger for session-level events
    pub fn session() -> Self {
        Self {
            context_id: CorrelationId::new(),
            cycle: 0,
        }
    }

    /// Fresh logger for one cycle
    pub fn for_cycle(cycle: u64) -> Self {
        Self {
            context_id: CorrelationId::new(),
            cycle,
        }
    }

    pub fn context_id(&self) -> &CorrelationId {
        &self.context_id
    }

    pub fn log_session_start(&self, mode: TradeMode, lifetime_secs: u64, wallets: usize, capacity: usize) {
        tracing::info!(
            context_id = %self.context_id,
            mode = ?mode,
            lifetime_secs,
            wallets,
            capacity,
            "{}",
            mode.banner()
        );
        tracing::info!(context_id = %self.context_id, "Countdown: {} seconds", lifetime_secs);
    }

    pub fn log_cycle_start(&self, pool_size: usize, capacity: usize) {
        tracing::debug!(
            context_id = %self.context_id,
            cycle = self.cycle,
            pool_size,
            capacity,
            "Cycle started"
        );
    }

    pub fn log_intent(&self, intent: &TradeIntent, fallback: bool) {
        use solana_sdk::signature::Signer;
        tracing::info!(
            context_id = %self.context_id,
            cycle = self.cycle,
            wallet = intent.slot_id,
            owner = %intent.owner.pubkey(),
            direction = %intent.direction,
            amount_in = intent.amount_in,
            min_amount_out = intent.min_amount_out,
            fallback,
            "Trade intent"
        );
    }

    pub fn log_eviction(&self, slot_id: usize, owner: &Pubkey, reason: &str, remaining: usize) {
        tracing::warn!(
            context_id = %self.context_id,
            cycle = self.cycle,
            wallet = slot_id,
            owner = %owner,
            reason = %reason,
            remaining,
            "Wallet evicted"
        );
    }

    /// Exactly one line per cycle outcome
    pub fn log_outcome(&self, outcome: &CycleOutcome, latency_ms: u64) {
        match outcome {
            CycleOutcome::Confirmed {
                bundle_id,
                tx_count,
            } => tracing::info!(
                context_id = %self.context_id,
                cycle = self.cycle,
                bundle_id = bundle_id.as_deref().unwrap_or("-"),
                tx_count,
                latency_ms,
                "Bundle confirmed"
            ),
            CycleOutcome::Unconfirmed { tx_count } => tracing::warn!(
                context_id = %self.context_id,
                cycle = self.cycle,
                tx_count,
                latency_ms,
                "Bundle unconfirmed"
            ),
            CycleOutcome::NoEligibleWallets => tracing::info!(
                context_id = %self.context_id,
                cycle = self.cycle,
                "No eligible wallets this cycle"
            ),
            CycleOutcome::Failed { reason } => tracing::error!(
                context_id = %self.context_id,
                cycle = self.cycle,
                reason = %reason,
                latency_ms,
                "Cycle failed"
            ),
        }
    }

    pub fn log_cycle_error(&self, error: &EngineError) {
        tracing::debug!(
            context_id = %self.context_id,
            cycle = self.cycle,
            category = error.category(),
            fatal = error.is_fatal(),
            "Cycle error detail"
        );
    }

    pub fn log_wait(&self, wait_ms: u64) {
        tracing::info!(
            context_id = %self.context_id,
            cycle = self.cycle,
            wait_ms,
            "Waiting {} seconds for next cycle",
            wait_ms as f64 / 1000.0
        );
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(
            context_id = %self.context_id,
            message = %message,
            "Warning"
        );
    }

    pub fn error(&self, message: &str) {
        tracing::error!(
            context_id = %self.context_id,
            message = %message,
            "Error"
        );
    }
}
