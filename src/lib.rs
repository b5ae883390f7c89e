//! Volume Bot - bundled CLMM volume trading for Solana
//!
//! Spreads buy and sell swaps against one Raydium CLMM pool across a pool of
//! funded wallets, submitting each cycle's swaps as one atomic Jito bundle.
//!
//! Collaborators sit behind traits ([`amm::AmmClient`], [`chain::ChainState`],
//! [`relay::BundleRelay`], [`random::Randomness`]) and the
//! [`scheduler::Scheduler`] drives everything else.

pub mod amm;
pub mod bundle;
pub mod chain;
pub mod config;
pub mod decision;
pub mod endpoints;
pub mod errors;
pub mod metrics;
pub mod pool;
pub mod quote;
pub mod random;
pub mod relay;
pub mod scheduler;
pub mod structured_logging;
pub mod test_utils;
pub mod types;
pub mod wallet;

// Re-export commonly used types
pub use config::Config;
pub use errors::{EngineError, EngineResult};
pub use scheduler::{Collaborators, Scheduler, SessionClock};
pub use types::{CycleOutcome, Direction, SessionEnd, TradeIntent, TradeMode};
