//! Error taxonomy for the trading engine
//!
//! Errors are grouped by how the session reacts to them:
//! - per-wallet shortfalls are not errors, they evict through `EvictReason`
//! - per-cycle errors are logged and the cycle becomes a no-op
//! - fatal errors abort the session before or during trading

use thiserror::Error;

/// Errors raised anywhere in the trading engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// The configured pool is not a usable CLMM pool
    #[error("Pool validation failed: {0}")]
    PoolValidation(String),

    /// Chain state (RPC) failure
    #[error("RPC error: {0}")]
    Rpc(String),

    /// AMM quote or swap construction failure
    #[error("AMM error: {0}")]
    Amm(String),

    /// Bundle relay failure other than benign expiry
    #[error("Relay error: {0}")]
    Relay(String),

    /// Wallet loading or signing failure
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// Configuration or validation error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    /// Fatal errors end the session; everything else is absorbed by a cycle
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::PoolValidation(_) => true,
            Self::Configuration(_) => true,

            Self::Rpc(_) => false,
            Self::Amm(_) => false,
            Self::Relay(_) => false,
            Self::Wallet(_) => false,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::PoolValidation(_) => "pool",
            Self::Rpc(_) => "rpc",
            Self::Amm(_) => "amm",
            Self::Relay(_) => "relay",
            Self::Wallet(_) => "wallet",
            Self::Configuration(_) => "config",
        }
    }
}

// Convenience constructors
impl EngineError {
    pub fn rpc(reason: impl std::fmt::Display) -> Self {
        Self::Rpc(reason.to_string())
    }

    pub fn amm(reason: impl std::fmt::Display) -> Self {
        Self::Amm(reason.to_string())
    }

    pub fn relay(reason: impl std::fmt::Display) -> Self {
        Self::Relay(reason.to_string())
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
