//! Wallet loading and session wallet slots

use serde::Deserialize;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::sync::Arc;

use crate::errors::{EngineError, EngineResult};

/// One session-scoped trading identity
#[derive(Clone)]
pub struct WalletSlot {
    id: usize,
    keypair: Arc<Keypair>,
}

impl WalletSlot {
    pub fn new(id: usize, keypair: Keypair) -> Self {
        Self {
            id,
            keypair: Arc::new(keypair),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Get the public key
    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Get an Arc reference to the keypair (handed to trade intents for signing)
    pub fn keypair_arc(&self) -> Arc<Keypair> {
        Arc::clone(&self.keypair)
    }
}

impl std::fmt::Debug for WalletSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletSlot")
            .field("id", &self.id)
            .field("pubkey", &self.pubkey())
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct WalletEntry {
    #[serde(rename = "secretKey")]
    secret_key: String,
}

/// Load the first `count` wallets from a `[{ "secretKey": "<base58>" }]` file
pub fn load_wallets(path: &str, count: usize) -> EngineResult<Vec<WalletSlot>> {
    let raw = std::fs::read(path)
        .map_err(|e| EngineError::Wallet(format!("Failed to read wallet file {}: {}", path, e)))?;
    parse_wallets(&raw, count)
}

/// Parse wallet slots from the JSON wallet list
pub fn parse_wallets(raw: &[u8], count: usize) -> EngineResult<Vec<WalletSlot>> {
    let entries: Vec<WalletEntry> = serde_json::from_slice(raw)
        .map_err(|e| EngineError::Wallet(format!("Failed to parse wallet JSON: {}", e)))?;

    if entries.len() < count {
        return Err(EngineError::Wallet(format!(
            "wallet file holds {} wallets, {} requested",
            entries.len(),
            count
        )));
    }

    entries
        .iter()
        .take(count)
        .enumerate()
        .map(|(id, entry)| {
            let bytes = bs58::decode(entry.secret_key.trim())
                .into_vec()
                .map_err(|e| EngineError::Wallet(format!("wallet {}: invalid base58: {}", id, e)))?;
            keypair_from_bytes(&bytes).map(|kp| WalletSlot::new(id, kp))
        })
        .collect()
}

/// Load a single keypair file (raw 64 bytes, JSON byte array, or base58 string)
pub fn load_keypair(path: &str) -> EngineResult<Keypair> {
    let keypair_bytes = std::fs::read(path)
        .map_err(|e| EngineError::Wallet(format!("Failed to read keypair file {}: {}", path, e)))?;

    if keypair_bytes.len() == 64 {
        return keypair_from_bytes(&keypair_bytes);
    }

    if let Ok(json) = serde_json::from_slice::<Vec<u8>>(&keypair_bytes) {
        return keypair_from_bytes(&json);
    }

    let text = String::from_utf8_lossy(&keypair_bytes);
    let decoded = bs58::decode(text.trim())
        .into_vec()
        .map_err(|e| EngineError::Wallet(format!("Unrecognised keypair format in {}: {}", path, e)))?;
    keypair_from_bytes(&decoded)
}

fn keypair_from_bytes(bytes: &[u8]) -> EngineResult<Keypair> {
    if bytes.len() != 64 {
        return Err(EngineError::Wallet(format!(
            "Invalid keypair length: expected 64 bytes, got {}",
            bytes.len()
        )));
    }
    if bytes.iter().all(|&b| b == 0) {
        return Err(EngineError::Wallet("Invalid keypair: all-zero key rejected".to_string()));
    }
    Keypair::try_from(bytes).map_err(|e| EngineError::Wallet(format!("Invalid keypair bytes: {}", e)))
}
