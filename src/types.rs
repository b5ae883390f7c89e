//! Common types used throughout the application

use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey::Pubkey, signature::Keypair};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Exit code when the session time budget runs out
pub const EXIT_TIME_UP: i32 = 2;

/// Exit code when every trading wallet has been evicted
pub const EXIT_POOL_EXHAUSTED: i32 = 3;

/// Exit code for fatal errors
pub const EXIT_FAILURE: i32 = 1;

/// Trading mode for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeMode {
    /// Buy only; unaffordable wallets are evicted without fallback
    Buy,
    /// Pick buy or sell per wallet, falling back to the opposite side once
    Mixed,
}

impl TradeMode {
    /// Human readable banner logged at session start
    pub fn banner(&self) -> &'static str {
        match self {
            TradeMode::Buy => "Keep buying",
            TradeMode::Mixed => "Randomly buying & selling",
        }
    }
}

impl FromStr for TradeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Ok(TradeMode::Buy),
            "mixed" | "balance" => Ok(TradeMode::Mixed),
            other => Err(format!("unknown trade mode '{}'", other)),
        }
    }
}

/// Swap direction relative to the traded token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Spend SOL, receive the token
    Buy,
    /// Spend the token, receive SOL
    Sell,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the pool a quote should pay out in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwapSide {
    /// Native SOL (wrapped) side
    Sol,
    /// The traded token side
    Token,
}

impl Direction {
    /// Output side a swap in this direction pays out in
    pub fn output_side(self) -> SwapSide {
        match self {
            Direction::Buy => SwapSide::Token,
            Direction::Sell => SwapSide::Sol,
        }
    }
}

/// A validated trade for one wallet in one cycle
#[derive(Clone)]
pub struct TradeIntent {
    /// Slot the trade belongs to
    pub slot_id: usize,

    /// Signing identity of the slot
    pub owner: Arc<Keypair>,

    pub direction: Direction,

    /// Input amount in base units (lamports for BUY, token units for SELL)
    pub amount_in: u64,

    /// Guaranteed output in base units
    pub min_amount_out: u64,

    /// Extra accounts the swap instruction needs (tick arrays etc.)
    pub remaining_accounts: Vec<Pubkey>,
}

impl fmt::Debug for TradeIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use solana_sdk::signature::Signer;
        f.debug_struct("TradeIntent")
            .field("slot_id", &self.slot_id)
            .field("owner", &self.owner.pubkey())
            .field("direction", &self.direction)
            .field("amount_in", &self.amount_in)
            .field("min_amount_out", &self.min_amount_out)
            .field("remaining_accounts", &self.remaining_accounts.len())
            .finish()
    }
}

/// Result of a bundle submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOutcome {
    pub confirmed: bool,
    /// Relay reference (bundle id) when one was issued
    pub bundle_id: Option<String>,
}

/// What a single cycle ended with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Confirmed { bundle_id: Option<String>, tx_count: usize },
    Unconfirmed { tx_count: usize },
    NoEligibleWallets,
    Failed { reason: String },
}

impl CycleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Confirmed { .. } => "confirmed",
            CycleOutcome::Unconfirmed { .. } => "unconfirmed",
            CycleOutcome::NoEligibleWallets => "no_wallets",
            CycleOutcome::Failed { .. } => "failed",
        }
    }
}

/// Why a session stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    TimeUp,
    PoolExhausted,
}

impl SessionEnd {
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionEnd::TimeUp => EXIT_TIME_UP,
            SessionEnd::PoolExhausted => EXIT_POOL_EXHAUSTED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_mode_parse() {
        assert_eq!("buy".parse::<TradeMode>().unwrap(), TradeMode::Buy);
        assert_eq!("Mixed".parse::<TradeMode>().unwrap(), TradeMode::Mixed);
        assert!("hodl".parse::<TradeMode>().is_err());
    }

    #[test]
    fn test_direction_helpers() {
        assert_eq!(Direction::Buy.opposite(), Direction::Sell);
        assert_eq!(Direction::Sell.output_side(), SwapSide::Sol);
        assert_eq!(Direction::Buy.to_string(), "BUY");
    }

    #[test]
    fn test_exit_codes_are_distinct_and_nonzero() {
        let codes = [
            SessionEnd::TimeUp.exit_code(),
            SessionEnd::PoolExhausted.exit_code(),
            EXIT_FAILURE,
        ];
        assert!(codes.iter().all(|c| *c != 0));
        assert_ne!(codes[0], codes[1]);
        assert_ne!(codes[0], codes[2]);
    }
}
