//! Chain state reads
//!
//! Balances, token balances and blockhashes the engine needs while deciding
//! trades and submitting bundles.

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey};
use spl_associated_token_account::get_associated_token_address;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::errors::{EngineError, EngineResult};

/// Recent blockhash plus the block height after which it expires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockhashContext {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// Read-only view of the chain
#[async_trait]
pub trait ChainState: Send + Sync {
    async fn latest_blockhash(&self) -> EngineResult<BlockhashContext>;

    /// Lamport balance of an address
    async fn get_balance(&self, address: &Pubkey) -> EngineResult<u64>;

    /// Token balance of `owner` for `mint` in base units; 0 when the owner has no token account
    async fn get_token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> EngineResult<u64>;

    async fn get_token_decimals(&self, mint: &Pubkey) -> EngineResult<u8>;
}

/// [`ChainState`] over a Solana JSON-RPC node
pub struct RpcChainState {
    rpc: Arc<RpcClient>,
    commitment: CommitmentConfig,
}

impl RpcChainState {
    pub fn new(endpoint: &str, timeout: Duration, commitment: CommitmentConfig) -> Self {
        let rpc = RpcClient::new_with_timeout_and_commitment(endpoint.to_string(), timeout, commitment);
        Self {
            rpc: Arc::new(rpc),
            commitment,
        }
    }

    /// Shared client for the other adapters
    pub fn rpc(&self) -> Arc<RpcClient> {
        Arc::clone(&self.rpc)
    }
}

#[async_trait]
impl ChainState for RpcChainState {
    async fn latest_blockhash(&self) -> EngineResult<BlockhashContext> {
        let (blockhash, last_valid_block_height) = self
            .rpc
            .get_latest_blockhash_with_commitment(self.commitment)
            .await
            .map_err(EngineError::rpc)?;
        Ok(BlockhashContext {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn get_balance(&self, address: &Pubkey) -> EngineResult<u64> {
        self.rpc
            .get_balance_with_commitment(address, self.commitment)
            .await
            .map(|r| r.value)
            .map_err(EngineError::rpc)
    }

    async fn get_token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> EngineResult<u64> {
        let ata = get_associated_token_address(owner, mint);

        let account = self
            .rpc
            .get_account_with_commitment(&ata, self.commitment)
            .await
            .map_err(EngineError::rpc)?
            .value;
        if account.is_none() {
            debug!(owner = %owner, ata = %ata, "No token account, balance is zero");
            return Ok(0);
        }

        let balance = self
            .rpc
            .get_token_account_balance_with_commitment(&ata, self.commitment)
            .await
            .map_err(EngineError::rpc)?
            .value;
        balance
            .amount
            .parse::<u64>()
            .map_err(|e| EngineError::rpc(format!("token amount '{}': {}", balance.amount, e)))
    }

    async fn get_token_decimals(&self, mint: &Pubkey) -> EngineResult<u8> {
        self.rpc
            .get_token_supply(mint)
            .await
            .map(|supply| supply.decimals)
            .map_err(EngineError::rpc)
    }
}
