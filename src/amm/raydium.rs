//! Raydium CLMM adapter
//!
//! Pool metadata comes from the Raydium v3 API, price state from the pool
//! account itself, and quotes plus swap transactions from the Raydium trade
//! API. Swap transactions are re-signed locally with the wallet's keypair.

use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    epoch_info::EpochInfo, pubkey::Pubkey, transaction::VersionedTransaction,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{
    tick_array_start_index, AmmClient, PoolComputeState, PoolInfo, PoolSnapshot, QuoteContext,
    SwapQuote, TickArrayCache, TokenInfo,
};
use crate::errors::{EngineError, EngineResult};
use crate::types::{Direction, SwapSide, TradeIntent};

// Byte offsets into the Anchor-serialized CLMM PoolState account
const OFFSET_OBSERVATION: usize = 201;
const OFFSET_TICK_SPACING: usize = 235;
const OFFSET_LIQUIDITY: usize = 237;
const OFFSET_SQRT_PRICE: usize = 253;
const OFFSET_TICK_CURRENT: usize = 269;
const POOL_STATE_MIN_LEN: usize = 273;

/// Tick arrays cached on each side of the current one
const TICK_ARRAY_RADIUS: i32 = 3;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(default)]
    msg: Option<String>,
    data: Option<T>,
}

impl<T> ApiResponse<T> {
    fn into_data(self, what: &str) -> EngineResult<T> {
        if !self.success {
            return Err(EngineError::amm(format!(
                "{} request rejected: {}",
                what,
                self.msg.unwrap_or_else(|| "no message".to_string())
            )));
        }
        self.data
            .ok_or_else(|| EngineError::amm(format!("{} response has no data", what)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiMint {
    address: String,
    decimals: u8,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPoolInfo {
    id: String,
    program_id: String,
    mint_a: ApiMint,
    mint_b: ApiMint,
    #[serde(default)]
    fee_rate: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiRoutePlan {
    pool_id: String,
    #[serde(default)]
    remaining_accounts: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiSwapCompute {
    other_amount_threshold: String,
    #[serde(default)]
    route_plan: Vec<ApiRoutePlan>,
}

#[derive(Debug, Deserialize)]
struct ApiSwapTransaction {
    transaction: String,
}

/// Raydium CLMM implementation of [`AmmClient`]
pub struct RaydiumClmm {
    http: reqwest::Client,
    rpc: Arc<RpcClient>,
    api_base: String,
    trade_api_base: String,
    compute_unit_price_micro_lamports: u64,
}

impl RaydiumClmm {
    pub fn new(
        rpc: Arc<RpcClient>,
        api_base: impl Into<String>,
        trade_api_base: impl Into<String>,
        compute_unit_price_micro_lamports: u64,
        timeout: Duration,
    ) -> EngineResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::config(format!("HTTP client: {}", e)))?;
        Ok(Self {
            http,
            rpc,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            trade_api_base: trade_api_base.into().trim_end_matches('/').to_string(),
            compute_unit_price_micro_lamports,
        })
    }

    /// Pool metadata from the Raydium v3 API
    async fn fetch_pool_info(&self, pool_id: &Pubkey) -> EngineResult<PoolInfo> {
        let url = format!("{}/pools/info/ids", self.api_base);
        let response: ApiResponse<Vec<Option<ApiPoolInfo>>> = self
            .http
            .get(&url)
            .query(&[("ids", pool_id.to_string())])
            .send()
            .await
            .map_err(EngineError::amm)?
            .error_for_status()
            .map_err(EngineError::amm)?
            .json()
            .await
            .map_err(EngineError::amm)?;

        let info = response
            .into_data("pool info")?
            .into_iter()
            .flatten()
            .next()
            .ok_or_else(|| EngineError::PoolValidation(format!("pool {} not found", pool_id)))?;

        Ok(PoolInfo {
            id: parse_key("pool id", &info.id)?,
            program_id: parse_key("program id", &info.program_id)?,
            mint_a: TokenInfo {
                mint: parse_key("mintA", &info.mint_a.address)?,
                decimals: info.mint_a.decimals,
            },
            mint_b: TokenInfo {
                mint: parse_key("mintB", &info.mint_b.address)?,
                decimals: info.mint_b.decimals,
            },
            observation_id: None,
            fee_rate: info.fee_rate,
        })
    }

    /// Raw `swap-base-in` compute response, kept as JSON so it can be handed
    /// back to the transaction endpoint unchanged
    async fn compute_raw(
        &self,
        input_mint: &Pubkey,
        output_mint: &Pubkey,
        amount_in: u64,
        slippage: f64,
    ) -> EngineResult<Value> {
        let url = format!("{}/compute/swap-base-in", self.trade_api_base);
        let slippage_bps = (slippage * 10_000.0).round() as u64;
        self.http
            .get(&url)
            .query(&[
                ("inputMint", input_mint.to_string()),
                ("outputMint", output_mint.to_string()),
                ("amount", amount_in.to_string()),
                ("slippageBps", slippage_bps.to_string()),
                ("txVersion", "V0".to_string()),
            ])
            .send()
            .await
            .map_err(EngineError::amm)?
            .error_for_status()
            .map_err(EngineError::amm)?
            .json()
            .await
            .map_err(EngineError::amm)
    }

    fn parse_compute(ctx: &QuoteContext, raw: &Value) -> EngineResult<ApiSwapCompute> {
        let response: ApiResponse<ApiSwapCompute> =
            serde_json::from_value(raw.clone()).map_err(EngineError::amm)?;
        let compute = response.into_data("swap compute")?;

        match compute.route_plan.as_slice() {
            [leg] if leg.pool_id == ctx.pool.id.to_string() => Ok(compute),
            legs => Err(EngineError::amm(format!(
                "route through {:?} does not stay in pool {}",
                legs.iter().map(|l| l.pool_id.as_str()).collect::<Vec<_>>(),
                ctx.pool.id
            ))),
        }
    }
}

#[async_trait]
impl AmmClient for RaydiumClmm {
    async fn fetch_pool(&self, pool_id: &Pubkey) -> EngineResult<PoolSnapshot> {
        let mut pool = self.fetch_pool_info(pool_id).await?;

        let account = self.rpc.get_account(pool_id).await.map_err(EngineError::rpc)?;
        if account.owner != pool.program_id {
            return Err(EngineError::PoolValidation(format!(
                "pool account owned by {}, API reports {}",
                account.owner, pool.program_id
            )));
        }
        let (compute, observation) = decode_pool_state(&account.data)?;
        pool.observation_id = Some(observation);

        let tick_cache =
            TickArrayCache::around(&pool.program_id, &pool.id, &compute, TICK_ARRAY_RADIUS);

        debug!(
            pool = %pool.id,
            tick_current = compute.tick_current,
            tick_arrays = tick_cache.len(),
            "Fetched CLMM pool state"
        );

        Ok(PoolSnapshot {
            pool,
            compute,
            tick_cache,
        })
    }

    async fn fetch_epoch(&self) -> EngineResult<EpochInfo> {
        self.rpc.get_epoch_info().await.map_err(EngineError::rpc)
    }

    async fn compute_swap_quote(
        &self,
        ctx: &QuoteContext,
        amount_in: u64,
        output: SwapSide,
        slippage: f64,
    ) -> EngineResult<SwapQuote> {
        let output_mint = ctx.mint_for(output);
        let input_mint = ctx.mint_for(match output {
            SwapSide::Sol => SwapSide::Token,
            SwapSide::Token => SwapSide::Sol,
        });

        let raw = self
            .compute_raw(&input_mint, &output_mint, amount_in, slippage)
            .await?;
        let compute = Self::parse_compute(ctx, &raw)?;

        let min_amount_out = compute
            .other_amount_threshold
            .parse::<u64>()
            .map_err(|e| EngineError::amm(format!("otherAmountThreshold: {}", e)))?;

        let mut remaining_accounts = compute
            .route_plan
            .first()
            .map(|leg| {
                leg.remaining_accounts
                    .iter()
                    .map(|k| parse_key("remaining account", k))
                    .collect::<EngineResult<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        if remaining_accounts.is_empty() {
            let start = tick_array_start_index(ctx.compute.tick_current, ctx.compute.tick_spacing);
            remaining_accounts = ctx.tick_cache.walk_from(start, ctx.is_zero_for_one(output));
        }

        Ok(SwapQuote {
            min_amount_out,
            remaining_accounts,
        })
    }

    async fn build_swap_transaction(
        &self,
        ctx: &QuoteContext,
        intent: &TradeIntent,
    ) -> EngineResult<VersionedTransaction> {
        use solana_sdk::signature::Signer;

        let output = intent.direction.output_side();
        let input_mint = ctx.mint_for(intent.direction.opposite().output_side());
        let output_mint = ctx.mint_for(output);

        // Slippage is already priced into min_amount_out.
        let mut raw = self
            .compute_raw(&input_mint, &output_mint, intent.amount_in, 0.0)
            .await?;
        Self::parse_compute(ctx, &raw)?;
        if let Some(data) = raw.get_mut("data") {
            data["otherAmountThreshold"] = Value::String(intent.min_amount_out.to_string());
        }

        let body = json!({
            "computeUnitPriceMicroLamports": self.compute_unit_price_micro_lamports.to_string(),
            "swapResponse": raw,
            "txVersion": "V0",
            "wallet": intent.owner.pubkey().to_string(),
            "wrapSol": intent.direction == Direction::Buy,
            "unwrapSol": intent.direction == Direction::Sell,
        });

        let url = format!("{}/transaction/swap-base-in", self.trade_api_base);
        let response: ApiResponse<Vec<ApiSwapTransaction>> = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(EngineError::amm)?
            .error_for_status()
            .map_err(EngineError::amm)?
            .json()
            .await
            .map_err(EngineError::amm)?;

        let encoded = match response.into_data("swap transaction")?.as_slice() {
            [only] => only.transaction.clone(),
            txs => {
                return Err(EngineError::amm(format!(
                    "expected one swap transaction, got {}",
                    txs.len()
                )))
            }
        };

        decode_and_sign(&encoded, intent)
    }
}

/// Decode a base64 transaction from the trade API and sign it for the intent's owner
pub(crate) fn decode_and_sign(
    encoded: &str,
    intent: &TradeIntent,
) -> EngineResult<VersionedTransaction> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| EngineError::amm(format!("transaction base64: {}", e)))?;
    let unsigned: VersionedTransaction =
        bincode::deserialize(&bytes).map_err(|e| EngineError::amm(format!("transaction decode: {}", e)))?;
    VersionedTransaction::try_new(unsigned.message, &[intent.owner.as_ref()])
        .map_err(|e| EngineError::Wallet(format!("signing swap for wallet {}: {}", intent.slot_id, e)))
}

/// Read price state and the observation key out of a pool account
pub fn decode_pool_state(data: &[u8]) -> EngineResult<(PoolComputeState, Pubkey)> {
    if data.len() < POOL_STATE_MIN_LEN {
        return Err(EngineError::PoolValidation(format!(
            "pool account too short: {} bytes",
            data.len()
        )));
    }

    let observation = Pubkey::try_from(&data[OFFSET_OBSERVATION..OFFSET_OBSERVATION + 32])
        .map_err(|e| EngineError::PoolValidation(format!("observation key: {}", e)))?;

    let compute = PoolComputeState {
        tick_spacing: u16::from_le_bytes(le_array(data, OFFSET_TICK_SPACING)),
        liquidity: u128::from_le_bytes(le_array(data, OFFSET_LIQUIDITY)),
        sqrt_price_x64: u128::from_le_bytes(le_array(data, OFFSET_SQRT_PRICE)),
        tick_current: i32::from_le_bytes(le_array(data, OFFSET_TICK_CURRENT)),
    };
    Ok((compute, observation))
}

fn le_array<const N: usize>(data: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&data[offset..offset + N]);
    out
}

fn parse_key(field: &str, value: &str) -> EngineResult<Pubkey> {
    Pubkey::from_str(value).map_err(|e| EngineError::amm(format!("{} '{}': {}", field, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{
        hash::Hash,
        message::{v0, VersionedMessage},
        signature::{Keypair, Signer},
    };
    use std::time::Instant;

    fn pool_account(tick: i32, spacing: u16, observation: &Pubkey) -> Vec<u8> {
        let mut data = vec![0u8; 1544];
        data[OFFSET_OBSERVATION..OFFSET_OBSERVATION + 32].copy_from_slice(observation.as_ref());
        data[OFFSET_TICK_SPACING..OFFSET_TICK_SPACING + 2].copy_from_slice(&spacing.to_le_bytes());
        data[OFFSET_LIQUIDITY..OFFSET_LIQUIDITY + 16].copy_from_slice(&5_000u128.to_le_bytes());
        data[OFFSET_SQRT_PRICE..OFFSET_SQRT_PRICE + 16]
            .copy_from_slice(&(1u128 << 64).to_le_bytes());
        data[OFFSET_TICK_CURRENT..OFFSET_TICK_CURRENT + 4].copy_from_slice(&tick.to_le_bytes());
        data
    }

    fn context(pool_id: Pubkey, token: Pubkey, sol: Pubkey) -> QuoteContext {
        let program = Pubkey::new_unique();
        let compute = PoolComputeState {
            tick_current: -30,
            tick_spacing: 1,
            ..Default::default()
        };
        QuoteContext {
            pool: PoolInfo {
                id: pool_id,
                program_id: program,
                mint_a: TokenInfo { mint: sol, decimals: 9 },
                mint_b: TokenInfo { mint: token, decimals: 6 },
                observation_id: None,
                fee_rate: 0.0025,
            },
            tick_cache: TickArrayCache::around(&program, &pool_id, &compute, 1),
            compute,
            epoch: EpochInfo {
                epoch: 1,
                slot_index: 0,
                slots_in_epoch: 432_000,
                absolute_slot: 432_000,
                block_height: 400_000,
                transaction_count: None,
            },
            token_mint: token,
            token_decimals: 6,
            fetched_at: Instant::now(),
        }
    }

    fn client(base: &str) -> RaydiumClmm {
        let rpc = Arc::new(RpcClient::new("http://127.0.0.1:1".to_string()));
        RaydiumClmm::new(rpc, base, base, 1_000, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_decode_pool_state() {
        let observation = Pubkey::new_unique();
        let data = pool_account(-1234, 60, &observation);
        let (compute, obs) = decode_pool_state(&data).unwrap();

        assert_eq!(obs, observation);
        assert_eq!(compute.tick_current, -1234);
        assert_eq!(compute.tick_spacing, 60);
        assert_eq!(compute.liquidity, 5_000);
        assert_eq!(compute.sqrt_price_x64, 1u128 << 64);

        assert!(matches!(
            decode_pool_state(&data[..100]),
            Err(EngineError::PoolValidation(_))
        ));
    }

    #[test]
    fn test_decode_and_sign_uses_owner() {
        let owner = Arc::new(Keypair::new());
        let message = v0::Message::try_compile(&owner.pubkey(), &[], &[], Hash::new_unique()).unwrap();
        let unsigned = VersionedTransaction {
            signatures: vec![Default::default()],
            message: VersionedMessage::V0(message),
        };
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(bincode::serialize(&unsigned).unwrap());

        let intent = TradeIntent {
            slot_id: 4,
            owner: Arc::clone(&owner),
            direction: Direction::Buy,
            amount_in: 10,
            min_amount_out: 1,
            remaining_accounts: vec![],
        };
        let signed = decode_and_sign(&encoded, &intent).unwrap();
        assert_eq!(signed.message.static_account_keys()[0], owner.pubkey());
        assert!(signed.verify_with_results().iter().all(|ok| *ok));
    }

    #[tokio::test]
    async fn test_fetch_pool_info_parses_api() {
        let mut server = mockito::Server::new_async().await;
        let pool_id = Pubkey::new_unique();
        let program = Pubkey::new_unique();
        let mint_a = Pubkey::new_unique();
        let mint_b = Pubkey::new_unique();
        let body = json!({
            "id": "req",
            "success": true,
            "data": [{
                "type": "Concentrated",
                "programId": program.to_string(),
                "id": pool_id.to_string(),
                "mintA": { "address": mint_a.to_string(), "decimals": 9, "symbol": "WSOL" },
                "mintB": { "address": mint_b.to_string(), "decimals": 6, "symbol": "TKN" },
                "feeRate": 0.0025
            }]
        });
        let mock = server
            .mock("GET", "/pools/info/ids")
            .match_query(mockito::Matcher::UrlEncoded("ids".into(), pool_id.to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let info = client(&server.url()).fetch_pool_info(&pool_id).await.unwrap();
        mock.assert_async().await;
        assert_eq!(info.id, pool_id);
        assert_eq!(info.program_id, program);
        assert_eq!(info.mint_b.mint, mint_b);
        assert_eq!(info.mint_b.decimals, 6);
    }

    #[tokio::test]
    async fn test_fetch_pool_info_missing_pool() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/pools/info/ids")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"id":"req","success":true,"data":[null]}"#)
            .create_async()
            .await;

        let err = client(&server.url())
            .fetch_pool_info(&Pubkey::new_unique())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PoolValidation(_)));
    }

    #[tokio::test]
    async fn test_compute_swap_quote() {
        let mut server = mockito::Server::new_async().await;
        let pool_id = Pubkey::new_unique();
        let token = Pubkey::new_unique();
        let sol = Pubkey::new_unique();
        let tick_array = Pubkey::new_unique();
        let ctx = context(pool_id, token, sol);

        let body = json!({
            "id": "req",
            "success": true,
            "version": "V1",
            "data": {
                "swapType": "BaseIn",
                "inputMint": token.to_string(),
                "inputAmount": "1000000",
                "outputMint": sol.to_string(),
                "outputAmount": "50500",
                "otherAmountThreshold": "50000",
                "slippageBps": 100,
                "routePlan": [{
                    "poolId": pool_id.to_string(),
                    "inputMint": token.to_string(),
                    "outputMint": sol.to_string(),
                    "remainingAccounts": [tick_array.to_string()]
                }]
            }
        });
        server
            .mock("GET", "/compute/swap-base-in")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("inputMint".into(), token.to_string()),
                mockito::Matcher::UrlEncoded("outputMint".into(), sol.to_string()),
                mockito::Matcher::UrlEncoded("amount".into(), "1000000".into()),
                mockito::Matcher::UrlEncoded("slippageBps".into(), "100".into()),
            ]))
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let quote = client(&server.url())
            .compute_swap_quote(&ctx, 1_000_000, SwapSide::Sol, 0.01)
            .await
            .unwrap();
        assert_eq!(quote.min_amount_out, 50_000);
        assert_eq!(quote.remaining_accounts, vec![tick_array]);
    }

    #[tokio::test]
    async fn test_compute_swap_quote_rejects_foreign_route() {
        let mut server = mockito::Server::new_async().await;
        let ctx = context(Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
        let body = json!({
            "success": true,
            "data": {
                "otherAmountThreshold": "1",
                "routePlan": [{ "poolId": Pubkey::new_unique().to_string() }]
            }
        });
        server
            .mock("GET", "/compute/swap-base-in")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let err = client(&server.url())
            .compute_swap_quote(&ctx, 1, SwapSide::Token, 0.01)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Amm(_)));
    }

    #[tokio::test]
    async fn test_compute_swap_quote_falls_back_to_tick_cache() {
        let mut server = mockito::Server::new_async().await;
        let pool_id = Pubkey::new_unique();
        let ctx = context(pool_id, Pubkey::new_unique(), Pubkey::new_unique());
        let body = json!({
            "success": true,
            "data": {
                "otherAmountThreshold": "77",
                "routePlan": [{ "poolId": pool_id.to_string() }]
            }
        });
        server
            .mock("GET", "/compute/swap-base-in")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        // Token output: SOL (mint A) in, token (mint B) out -> price moves down
        let quote = client(&server.url())
            .compute_swap_quote(&ctx, 1, SwapSide::Token, 0.01)
            .await
            .unwrap();
        assert_eq!(quote.min_amount_out, 77);
        let start = tick_array_start_index(-30, 1);
        assert_eq!(quote.remaining_accounts, ctx.tick_cache.walk_from(start, true));
    }
}
