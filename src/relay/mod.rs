//! Bundle relay interface
//!
//! A relay lands a bundle atomically: every transaction or none of them.

pub mod jito;

pub use jito::JitoRelay;

use async_trait::async_trait;
use solana_sdk::transaction::VersionedTransaction;

use crate::chain::BlockhashContext;
use crate::errors::EngineResult;
use crate::types::BundleOutcome;

/// All-or-nothing bundle submission
#[async_trait]
pub trait BundleRelay: Send + Sync {
    /// Submit `txs` as one bundle and wait for its terminal outcome
    ///
    /// A bundle whose blockhash expires before landing resolves to
    /// `confirmed = false` rather than an error.
    async fn submit_bundle(
        &self,
        tip_lamports: u64,
        max_bundle_size: usize,
        txs: Vec<VersionedTransaction>,
        blockhash: &BlockhashContext,
    ) -> EngineResult<BundleOutcome>;
}
