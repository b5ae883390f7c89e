//! Jito block-engine relay
//!
//! The bundle gets one extra transaction on the end: a tip transfer from the
//! fee payer to a random Jito tip account. Landing is detected by polling the
//! tip signature until it confirms or its blockhash expires.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    message::{v0, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::VersionedTransaction,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::BundleRelay;
use crate::chain::BlockhashContext;
use crate::config::MAX_SWAPS_PER_BUNDLE;
use crate::errors::{EngineError, EngineResult};
use crate::types::BundleOutcome;

/// Mainnet tip accounts published by Jito
pub const JITO_TIP_ACCOUNTS: [&str; 8] = [
    "96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5",
    "HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe",
    "Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY",
    "ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49",
    "DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh",
    "ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt",
    "DttWaMuVvTiduZRnguLF7jNxTgiMBZ1hyAumKUiL2KRL",
    "3AVi9Tg9Uo68tJfuvoKvqKNWKkC5wPdSSdeBnizKZ6jT",
];

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct SendBundleResponse {
    result: Option<String>,
    error: Option<JsonRpcError>,
}

/// [`BundleRelay`] over the Jito block-engine JSON-RPC API
pub struct JitoRelay {
    http: reqwest::Client,
    rpc: Arc<RpcClient>,
    fee_payer: Arc<Keypair>,
    block_engine_urls: Vec<String>,
    confirm_poll: Duration,
}

impl JitoRelay {
    pub fn new(
        rpc: Arc<RpcClient>,
        fee_payer: Keypair,
        block_engine_urls: Vec<String>,
        confirm_poll: Duration,
        timeout: Duration,
    ) -> EngineResult<Self> {
        if block_engine_urls.is_empty() {
            return Err(EngineError::config("no block engine configured"));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::config(format!("HTTP client: {}", e)))?;
        Ok(Self {
            http,
            rpc,
            fee_payer: Arc::new(fee_payer),
            block_engine_urls: block_engine_urls
                .into_iter()
                .map(|u| u.trim_end_matches('/').to_string())
                .collect(),
            confirm_poll,
        })
    }

    pub fn fee_payer(&self) -> Pubkey {
        self.fee_payer.pubkey()
    }

    /// Tip transfer to a random tip account, signed by the fee payer
    pub fn build_tip_transaction(
        &self,
        tip_lamports: u64,
        blockhash: &BlockhashContext,
    ) -> EngineResult<VersionedTransaction> {
        let tip_account = random_tip_account()?;
        #[allow(deprecated)]
        let ix = solana_sdk::system_instruction::transfer(
            &self.fee_payer.pubkey(),
            &tip_account,
            tip_lamports,
        );
        let message = v0::Message::try_compile(
            &self.fee_payer.pubkey(),
            &[ix],
            &[],
            blockhash.blockhash,
        )
        .map_err(|e| EngineError::relay(format!("tip message: {}", e)))?;
        VersionedTransaction::try_new(VersionedMessage::V0(message), &[self.fee_payer.as_ref()])
            .map_err(|e| EngineError::Wallet(format!("signing tip transaction: {}", e)))
    }

    /// Send the bundle to each block engine in turn until one accepts it
    async fn send_bundle(&self, encoded: &[String]) -> EngineResult<String> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "sendBundle",
            "params": [encoded],
        });

        let mut last_error = String::from("no block engine tried");
        for endpoint in &self.block_engine_urls {
            let url = format!("{}/api/v1/bundles", endpoint);
            match self.post_bundle(&url, &body).await {
                Ok(bundle_id) => return Ok(bundle_id),
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "Bundle submission failed");
                    last_error = e;
                }
            }
        }
        Err(EngineError::relay(format!(
            "all block engines rejected the bundle: {}",
            last_error
        )))
    }

    async fn post_bundle(&self, url: &str, body: &serde_json::Value) -> Result<String, String> {
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(format!("{}: {}", status, text));
        }

        let parsed: SendBundleResponse = response.json().await.map_err(|e| e.to_string())?;
        match (parsed.result, parsed.error) {
            (Some(bundle_id), _) => Ok(bundle_id),
            (None, Some(err)) => Err(err.message),
            (None, None) => Err("empty sendBundle response".to_string()),
        }
    }

    /// Poll the tip signature until it confirms, fails or its blockhash expires
    async fn await_landing(
        &self,
        tip_signature: &Signature,
        blockhash: &BlockhashContext,
    ) -> EngineResult<bool> {
        loop {
            let statuses = self
                .rpc
                .get_signature_statuses(&[*tip_signature])
                .await
                .map_err(EngineError::rpc)?
                .value;

            if let Some(Some(status)) = statuses.into_iter().next() {
                if let Some(err) = status.err {
                    warn!(signature = %tip_signature, error = %err, "Bundle landed with an error");
                    return Ok(false);
                }
                if status.satisfies_commitment(CommitmentConfig::confirmed()) {
                    return Ok(true);
                }
            }

            let height = self.rpc.get_block_height().await.map_err(EngineError::rpc)?;
            if height > blockhash.last_valid_block_height {
                debug!(
                    height,
                    last_valid = blockhash.last_valid_block_height,
                    "Bundle blockhash expired"
                );
                return Ok(false);
            }

            tokio::time::sleep(self.confirm_poll).await;
        }
    }
}

#[async_trait]
impl BundleRelay for JitoRelay {
    async fn submit_bundle(
        &self,
        tip_lamports: u64,
        max_bundle_size: usize,
        mut txs: Vec<VersionedTransaction>,
        blockhash: &BlockhashContext,
    ) -> EngineResult<BundleOutcome> {
        if txs.is_empty() {
            return Err(EngineError::relay("refusing to submit an empty bundle"));
        }
        let limit = max_bundle_size.min(MAX_SWAPS_PER_BUNDLE);
        if txs.len() > limit {
            return Err(EngineError::relay(format!(
                "bundle holds {} swaps, limit is {}",
                txs.len(),
                limit
            )));
        }

        let tip_tx = self.build_tip_transaction(tip_lamports, blockhash)?;
        let tip_signature = tip_tx.signatures[0];
        txs.push(tip_tx);

        let encoded = encode_bundle(&txs)?;
        let bundle_id = self.send_bundle(&encoded).await?;
        info!(bundle_id = %bundle_id, txs = txs.len(), "Bundle accepted by block engine");

        let confirmed = self.await_landing(&tip_signature, blockhash).await?;
        if confirmed {
            info!("https://explorer.jito.wtf/bundle/{}", bundle_id);
        } else {
            info!(bundle_id = %bundle_id, "BlockheightError");
        }

        Ok(BundleOutcome {
            confirmed,
            bundle_id: Some(bundle_id),
        })
    }
}

/// Base58 wire encoding expected by `sendBundle`
pub fn encode_bundle(txs: &[VersionedTransaction]) -> EngineResult<Vec<String>> {
    txs.iter()
        .map(|tx| {
            bincode::serialize(tx)
                .map(|wire| bs58::encode(wire).into_string())
                .map_err(|e| EngineError::relay(format!("serialize: {}", e)))
        })
        .collect()
}

fn random_tip_account() -> EngineResult<Pubkey> {
    let pick = JITO_TIP_ACCOUNTS[fastrand::usize(..JITO_TIP_ACCOUNTS.len())];
    Pubkey::from_str(pick).map_err(|e| EngineError::relay(format!("tip account {}: {}", pick, e)))
}
