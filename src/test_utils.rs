//! Test Utilities Module
//!
//! In-memory stand-ins for the AMM, the chain and the bundle relay, plus a
//! scripted randomness source, so sessions can be driven deterministically
//! without network access.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use async_trait::async_trait;
use solana_sdk::{
    epoch_info::EpochInfo,
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    message::{v0, VersionedMessage},
    pubkey::Pubkey,
    signature::Signer,
    transaction::VersionedTransaction,
};
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::amm::{
    AmmClient, PoolComputeState, PoolInfo, PoolSnapshot, QuoteContext, SwapQuote, TickArrayCache,
    TokenInfo,
};
use crate::chain::{BlockhashContext, ChainState};
use crate::config::CLMM_PROGRAM_MAINNET;
use crate::errors::{EngineError, EngineResult};
use crate::random::Randomness;
use crate::relay::BundleRelay;
use crate::types::{BundleOutcome, Direction, SwapSide, TradeIntent};
use crate::wallet::WalletSlot;

/// Program id carried by mock swap instructions
pub const MOCK_SWAP_PROGRAM: Pubkey = Pubkey::new_from_array([7u8; 32]);

/// Mainnet CLMM program id
pub fn clmm_program() -> Pubkey {
    Pubkey::from_str(CLMM_PROGRAM_MAINNET).unwrap_or_default()
}

/// Mock AMM with a fixed linear price
///
/// `lamports_per_unit` is the price of one token base unit in lamports.
/// Quotes ignore slippage so expectations stay exact.
pub struct MockAmm {
    pool: Mutex<PoolSnapshot>,
    lamports_per_unit: f64,
    fail_quotes: AtomicBool,
    fetch_count: AtomicUsize,
    quote_count: AtomicUsize,
    built: Mutex<Vec<(usize, Direction)>>,
}

impl MockAmm {
    /// WSOL / `token_mint` pool owned by the mainnet CLMM program
    pub fn new(token_mint: Pubkey, lamports_per_unit: f64) -> Self {
        let program_id = clmm_program();
        let pool_id = Pubkey::new_unique();
        let compute = PoolComputeState {
            liquidity: 1_000_000_000,
            sqrt_price_x64: 1u128 << 64,
            tick_current: 0,
            tick_spacing: 60,
        };
        let snapshot = PoolSnapshot {
            pool: PoolInfo {
                id: pool_id,
                program_id,
                mint_a: TokenInfo {
                    mint: spl_token::native_mint::id(),
                    decimals: 9,
                },
                mint_b: TokenInfo {
                    mint: token_mint,
                    decimals: 6,
                },
                observation_id: None,
                fee_rate: 0.0025,
            },
            tick_cache: TickArrayCache::around(&program_id, &pool_id, &compute, 1),
            compute,
        };
        Self {
            pool: Mutex::new(snapshot),
            lamports_per_unit,
            fail_quotes: AtomicBool::new(false),
            fetch_count: AtomicUsize::new(0),
            quote_count: AtomicUsize::new(0),
            built: Mutex::new(Vec::new()),
        }
    }

    pub async fn pool_id(&self) -> Pubkey {
        self.pool.lock().await.pool.id
    }

    /// Pretend the pool belongs to another program
    pub async fn set_program(&self, program_id: Pubkey) {
        self.pool.lock().await.pool.program_id = program_id;
    }

    pub fn set_fail_quotes(&self, fail: bool) {
        self.fail_quotes.store(fail, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    pub fn quote_count(&self) -> usize {
        self.quote_count.load(Ordering::SeqCst)
    }

    /// `(slot_id, direction)` of every swap built so far, in build order
    pub async fn built(&self) -> Vec<(usize, Direction)> {
        self.built.lock().await.clone()
    }

    /// Output the mock pays for `amount_in`
    pub fn price(&self, amount_in: u64, output: SwapSide) -> u64 {
        match output {
            SwapSide::Sol => (amount_in as f64 * self.lamports_per_unit) as u64,
            SwapSide::Token => (amount_in as f64 / self.lamports_per_unit) as u64,
        }
    }
}

#[async_trait]
impl AmmClient for MockAmm {
    async fn fetch_pool(&self, _pool_id: &Pubkey) -> EngineResult<PoolSnapshot> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.pool.lock().await.clone())
    }

    async fn fetch_epoch(&self) -> EngineResult<EpochInfo> {
        Ok(EpochInfo {
            epoch: 700,
            slot_index: 1_000,
            slots_in_epoch: 432_000,
            absolute_slot: 302_401_000,
            block_height: 280_000_000,
            transaction_count: None,
        })
    }

    async fn compute_swap_quote(
        &self,
        ctx: &QuoteContext,
        amount_in: u64,
        output: SwapSide,
        _slippage: f64,
    ) -> EngineResult<SwapQuote> {
        if self.fail_quotes.load(Ordering::SeqCst) {
            return Err(EngineError::amm("mock quote failure"));
        }
        self.quote_count.fetch_add(1, Ordering::SeqCst);
        Ok(SwapQuote {
            min_amount_out: self.price(amount_in, output),
            remaining_accounts: ctx.tick_cache.walk_from(0, ctx.is_zero_for_one(output)),
        })
    }

    async fn build_swap_transaction(
        &self,
        _ctx: &QuoteContext,
        intent: &TradeIntent,
    ) -> EngineResult<VersionedTransaction> {
        self.built
            .lock()
            .await
            .push((intent.slot_id, intent.direction));
        mock_swap_transaction(intent)
    }
}

/// Swap stand-in: one instruction to [`MOCK_SWAP_PROGRAM`] whose data is
/// `direction (0 buy / 1 sell) | amount_in | min_amount_out`, signed by the owner
pub fn mock_swap_transaction(intent: &TradeIntent) -> EngineResult<VersionedTransaction> {
    let owner = intent.owner.pubkey();
    let mut data = Vec::with_capacity(17);
    data.push(match intent.direction {
        Direction::Buy => 0u8,
        Direction::Sell => 1u8,
    });
    data.extend_from_slice(&intent.amount_in.to_le_bytes());
    data.extend_from_slice(&intent.min_amount_out.to_le_bytes());

    let mut accounts = vec![AccountMeta::new(owner, true)];
    accounts.extend(
        intent
            .remaining_accounts
            .iter()
            .map(|k| AccountMeta::new(*k, false)),
    );
    let ix = Instruction::new_with_bytes(MOCK_SWAP_PROGRAM, &data, accounts);

    let message = v0::Message::try_compile(&owner, &[ix], &[], Hash::default())
        .map_err(|e| EngineError::amm(format!("mock message: {}", e)))?;
    VersionedTransaction::try_new(VersionedMessage::V0(message), &[intent.owner.as_ref()])
        .map_err(|e| EngineError::Wallet(e.to_string()))
}

/// What a mock swap transaction encodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSwap {
    pub payer: Pubkey,
    pub direction: Direction,
    pub amount_in: u64,
    pub min_amount_out: u64,
}

/// Read back a transaction built by [`mock_swap_transaction`]
pub fn decode_mock_swap(tx: &VersionedTransaction) -> Option<DecodedSwap> {
    let keys = tx.message.static_account_keys();
    let ix = tx.message.instructions().first()?;
    if keys.get(usize::from(ix.program_id_index))? != &MOCK_SWAP_PROGRAM || ix.data.len() != 17 {
        return None;
    }
    let direction = match ix.data[0] {
        0 => Direction::Buy,
        1 => Direction::Sell,
        _ => return None,
    };
    Some(DecodedSwap {
        payer: *keys.first()?,
        direction,
        amount_in: u64::from_le_bytes(ix.data[1..9].try_into().ok()?),
        min_amount_out: u64::from_le_bytes(ix.data[9..17].try_into().ok()?),
    })
}

/// In-memory chain state
pub struct MockChain {
    balances: Mutex<HashMap<Pubkey, u64>>,
    token_balances: Mutex<HashMap<Pubkey, u64>>,
    decimals: u8,
    block_height: AtomicU64,
    fail: AtomicBool,
    decimals_calls: AtomicUsize,
}

impl MockChain {
    pub fn new(decimals: u8) -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            token_balances: Mutex::new(HashMap::new()),
            decimals,
            block_height: AtomicU64::new(1_000),
            fail: AtomicBool::new(false),
            decimals_calls: AtomicUsize::new(0),
        }
    }

    pub async fn set_balance(&self, owner: &Pubkey, lamports: u64) {
        self.balances.lock().await.insert(*owner, lamports);
    }

    /// Token balance in base units
    pub async fn set_token_balance(&self, owner: &Pubkey, amount: u64) {
        self.token_balances.lock().await.insert(*owner, amount);
    }

    /// Make every read fail with a transient RPC error
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn decimals_calls(&self) -> usize {
        self.decimals_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> EngineResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::rpc("mock RPC unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainState for MockChain {
    async fn latest_blockhash(&self) -> EngineResult<BlockhashContext> {
        self.check()?;
        let height = self.block_height.fetch_add(1, Ordering::SeqCst);
        Ok(BlockhashContext {
            blockhash: Hash::new_unique(),
            last_valid_block_height: height + 150,
        })
    }

    async fn get_balance(&self, address: &Pubkey) -> EngineResult<u64> {
        self.check()?;
        Ok(self.balances.lock().await.get(address).copied().unwrap_or(0))
    }

    async fn get_token_balance(&self, owner: &Pubkey, _mint: &Pubkey) -> EngineResult<u64> {
        self.check()?;
        Ok(self
            .token_balances
            .lock()
            .await
            .get(owner)
            .copied()
            .unwrap_or(0))
    }

    async fn get_token_decimals(&self, _mint: &Pubkey) -> EngineResult<u8> {
        self.check()?;
        self.decimals_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.decimals)
    }
}

/// Relay that records bundles and reports a configurable outcome
pub struct MockRelay {
    submissions: Mutex<Vec<Vec<VersionedTransaction>>>,
    confirm: AtomicBool,
    fail: AtomicBool,
    delay: Option<Duration>,
}

impl MockRelay {
    /// Relay that confirms every bundle immediately
    pub fn new() -> Self {
        Self {
            submissions: Mutex::new(Vec::new()),
            confirm: AtomicBool::new(true),
            fail: AtomicBool::new(false),
            delay: None,
        }
    }

    /// Relay that takes `delay` to reach a terminal outcome
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn set_confirm(&self, confirm: bool) {
        self.confirm.store(confirm, Ordering::SeqCst);
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn call_count(&self) -> usize {
        self.submissions.lock().await.len()
    }

    pub async fn submissions(&self) -> Vec<Vec<VersionedTransaction>> {
        self.submissions.lock().await.clone()
    }
}

impl Default for MockRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BundleRelay for MockRelay {
    async fn submit_bundle(
        &self,
        _tip_lamports: u64,
        max_bundle_size: usize,
        txs: Vec<VersionedTransaction>,
        _blockhash: &BlockhashContext,
    ) -> EngineResult<BundleOutcome> {
        if txs.len() > max_bundle_size {
            return Err(EngineError::relay(format!(
                "bundle of {} exceeds {}",
                txs.len(),
                max_bundle_size
            )));
        }
        let index = {
            let mut submissions = self.submissions.lock().await;
            submissions.push(txs);
            submissions.len()
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::relay("mock relay unavailable"));
        }
        let confirmed = self.confirm.load(Ordering::SeqCst);
        Ok(BundleOutcome {
            confirmed,
            bundle_id: confirmed.then(|| format!("mock-bundle-{}", index)),
        })
    }
}

/// Randomness that replays scripted draws
///
/// Empty queues fall back to the lower bound (and to BUY for directions).
/// Shuffles leave the order untouched.
#[derive(Debug, Default)]
pub struct ScriptedRandomness {
    u64s: VecDeque<u64>,
    f64s: VecDeque<f64>,
    directions: VecDeque<Direction>,
}

impl ScriptedRandomness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_directions(mut self, directions: impl IntoIterator<Item = Direction>) -> Self {
        self.directions.extend(directions);
        self
    }

    pub fn with_u64s(mut self, values: impl IntoIterator<Item = u64>) -> Self {
        self.u64s.extend(values);
        self
    }

    pub fn with_f64s(mut self, values: impl IntoIterator<Item = f64>) -> Self {
        self.f64s.extend(values);
        self
    }
}

impl Randomness for ScriptedRandomness {
    fn uniform_u64(&mut self, min: u64, max: u64) -> u64 {
        self.u64s.pop_front().unwrap_or(min).clamp(min, max.max(min))
    }

    fn uniform_f64(&mut self, min: f64, max: f64) -> f64 {
        self.f64s.pop_front().unwrap_or(min).clamp(min, max.max(min))
    }

    fn direction(&mut self) -> Direction {
        self.directions.pop_front().unwrap_or(Direction::Buy)
    }

    fn shuffle(&mut self, _slots: &mut [WalletSlot]) {}
}

/// `n` fresh wallet slots with ids `0..n`
pub fn wallet_slots(n: usize) -> Vec<WalletSlot> {
    (0..n)
        .map(|id| WalletSlot::new(id, solana_sdk::signature::Keypair::new()))
        .collect()
}

/// Shared mock collaborators
pub fn mock_collaborators(
    token_mint: Pubkey,
    lamports_per_unit: f64,
    decimals: u8,
) -> (Arc<MockAmm>, Arc<MockChain>, Arc<MockRelay>) {
    (
        Arc::new(MockAmm::new(token_mint, lamports_per_unit)),
        Arc::new(MockChain::new(decimals)),
        Arc::new(MockRelay::new()),
    )
}
