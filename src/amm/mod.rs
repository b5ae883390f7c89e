//! AMM collaborator interface
//!
//! The engine never does tick math itself. Pool metadata, quotes and swap
//! transactions all come from an [`AmmClient`]; the production adapter talks
//! to Raydium's CLMM program and HTTP APIs.
//!
//! ## Key types
//! - [`PoolSnapshot`]: pool metadata, compute state and tick-array cache
//! - [`QuoteContext`]: snapshot plus epoch and token decimals, shared read-only
//! - [`SwapQuote`]: guaranteed output and the extra accounts a swap needs

pub mod raydium;

pub use raydium::RaydiumClmm;

use async_trait::async_trait;
use solana_sdk::{
    epoch_info::EpochInfo, pubkey::Pubkey, transaction::VersionedTransaction,
};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::errors::{EngineError, EngineResult};
use crate::types::{SwapSide, TradeIntent};

/// Ticks stored in one CLMM tick array
pub const TICK_ARRAY_SIZE: i32 = 60;

const TICK_ARRAY_SEED: &[u8] = b"tick_array";

/// Mint and precision of one side of the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenInfo {
    pub mint: Pubkey,
    pub decimals: u8,
}

/// Pool metadata
#[derive(Debug, Clone, PartialEq)]
pub struct PoolInfo {
    pub id: Pubkey,
    pub program_id: Pubkey,
    pub mint_a: TokenInfo,
    pub mint_b: TokenInfo,
    pub observation_id: Option<Pubkey>,
    /// Trade fee as a fraction
    pub fee_rate: f64,
}

/// Price state read from the pool account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolComputeState {
    pub liquidity: u128,
    pub sqrt_price_x64: u128,
    pub tick_current: i32,
    pub tick_spacing: u16,
}

/// Tick-array addresses keyed by start tick index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickArrayCache {
    arrays: BTreeMap<i32, Pubkey>,
}

impl TickArrayCache {
    /// Derive the tick arrays around the current tick
    ///
    /// `radius` arrays are taken on each side of the one holding `tick_current`.
    pub fn around(
        program_id: &Pubkey,
        pool_id: &Pubkey,
        compute: &PoolComputeState,
        radius: i32,
    ) -> Self {
        let span = i32::from(compute.tick_spacing.max(1)) * TICK_ARRAY_SIZE;
        let current = tick_array_start_index(compute.tick_current, compute.tick_spacing);
        let arrays = (-radius..=radius)
            .map(|offset| {
                let start = current + offset * span;
                (start, tick_array_address(program_id, pool_id, start))
            })
            .collect();
        Self { arrays }
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    pub fn get(&self, start_index: i32) -> Option<&Pubkey> {
        self.arrays.get(&start_index)
    }

    /// Arrays a swap starting at `start_index` walks through, in walk order
    ///
    /// Price moves down when selling token A (toward lower ticks), up otherwise.
    pub fn walk_from(&self, start_index: i32, zero_for_one: bool) -> Vec<Pubkey> {
        if zero_for_one {
            self.arrays
                .range(..=start_index)
                .rev()
                .map(|(_, k)| *k)
                .collect()
        } else {
            self.arrays.range(start_index..).map(|(_, k)| *k).collect()
        }
    }
}

/// Start index of the tick array containing `tick`
pub fn tick_array_start_index(tick: i32, tick_spacing: u16) -> i32 {
    let span = i32::from(tick_spacing.max(1)) * TICK_ARRAY_SIZE;
    tick.div_euclid(span) * span
}

/// PDA of a tick array
pub fn tick_array_address(program_id: &Pubkey, pool_id: &Pubkey, start_index: i32) -> Pubkey {
    Pubkey::find_program_address(
        &[TICK_ARRAY_SEED, pool_id.as_ref(), &start_index.to_be_bytes()],
        program_id,
    )
    .0
}

/// Everything `fetch_pool` returns
#[derive(Debug, Clone)]
pub struct PoolSnapshot {
    pub pool: PoolInfo,
    pub compute: PoolComputeState,
    pub tick_cache: TickArrayCache,
}

/// Read-only pool context shared by every wallet and cycle
#[derive(Debug, Clone)]
pub struct QuoteContext {
    pub pool: PoolInfo,
    pub compute: PoolComputeState,
    pub tick_cache: TickArrayCache,
    pub epoch: EpochInfo,
    /// Mint of the traded token
    pub token_mint: Pubkey,
    pub token_decimals: u8,
    pub fetched_at: Instant,
}

impl QuoteContext {
    /// Mint on the SOL side of the pool
    pub fn sol_mint(&self) -> Pubkey {
        if self.pool.mint_a.mint == self.token_mint {
            self.pool.mint_b.mint
        } else {
            self.pool.mint_a.mint
        }
    }

    pub fn mint_for(&self, side: SwapSide) -> Pubkey {
        match side {
            SwapSide::Token => self.token_mint,
            SwapSide::Sol => self.sol_mint(),
        }
    }

    /// True when a swap paying out `output` moves from mint A to mint B
    pub fn is_zero_for_one(&self, output: SwapSide) -> bool {
        self.mint_for(output) == self.pool.mint_b.mint
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

/// Quote for a single swap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapQuote {
    /// Output guaranteed after slippage, in base units
    pub min_amount_out: u64,
    /// Accounts the swap instruction needs beyond the fixed ones
    pub remaining_accounts: Vec<Pubkey>,
}

/// Pool quoting and swap construction
///
/// Calls must be idempotent for identical inputs against the same context.
#[async_trait]
pub trait AmmClient: Send + Sync {
    /// Fetch pool metadata, compute state and tick arrays
    async fn fetch_pool(&self, pool_id: &Pubkey) -> EngineResult<PoolSnapshot>;

    /// Current epoch snapshot used by fee schedules
    async fn fetch_epoch(&self) -> EngineResult<EpochInfo>;

    /// Quote `amount_in` of the opposite side into `output`
    async fn compute_swap_quote(
        &self,
        ctx: &QuoteContext,
        amount_in: u64,
        output: SwapSide,
        slippage: f64,
    ) -> EngineResult<SwapQuote>;

    /// Build the swap transaction for an intent, signed by the intent's owner
    async fn build_swap_transaction(
        &self,
        ctx: &QuoteContext,
        intent: &TradeIntent,
    ) -> EngineResult<VersionedTransaction>;
}

/// Reject pools that are not owned by an accepted CLMM program or do not
/// pair the configured token with SOL
pub fn validate_pool(
    pool: &PoolInfo,
    allowed_programs: &[Pubkey],
    token_mint: &Pubkey,
    sol_mint: &Pubkey,
) -> EngineResult<()> {
    if !allowed_programs.contains(&pool.program_id) {
        return Err(EngineError::PoolValidation(format!(
            "target pool {} is owned by {}, not a CLMM program",
            pool.id, pool.program_id
        )));
    }
    let mints = [pool.mint_a.mint, pool.mint_b.mint];
    if !mints.contains(token_mint) {
        return Err(EngineError::PoolValidation(format!(
            "pool {} does not trade token {}",
            pool.id, token_mint
        )));
    }
    if !mints.contains(sol_mint) {
        return Err(EngineError::PoolValidation(format!(
            "pool {} is not paired with SOL",
            pool.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(program_id: Pubkey, a: Pubkey, b: Pubkey) -> PoolInfo {
        PoolInfo {
            id: Pubkey::new_unique(),
            program_id,
            mint_a: TokenInfo { mint: a, decimals: 9 },
            mint_b: TokenInfo { mint: b, decimals: 6 },
            observation_id: None,
            fee_rate: 0.0025,
        }
    }

    #[test]
    fn test_tick_array_start_index() {
        // spacing 10 -> 600 ticks per array
        assert_eq!(tick_array_start_index(0, 10), 0);
        assert_eq!(tick_array_start_index(599, 10), 0);
        assert_eq!(tick_array_start_index(600, 10), 600);
        assert_eq!(tick_array_start_index(-1, 10), -600);
        assert_eq!(tick_array_start_index(-600, 10), -600);
        assert_eq!(tick_array_start_index(-601, 10), -1200);
    }

    #[test]
    fn test_tick_cache_walk_order() {
        let program = Pubkey::new_unique();
        let pool_id = Pubkey::new_unique();
        let compute = PoolComputeState {
            tick_current: 650,
            tick_spacing: 10,
            ..Default::default()
        };
        let cache = TickArrayCache::around(&program, &pool_id, &compute, 2);
        assert_eq!(cache.len(), 5);

        let down = cache.walk_from(600, true);
        assert_eq!(down.len(), 3);
        assert_eq!(down[0], *cache.get(600).unwrap());
        assert_eq!(down[2], *cache.get(-600).unwrap());

        let up = cache.walk_from(600, false);
        assert_eq!(up.len(), 3);
        assert_eq!(up[2], *cache.get(1800).unwrap());
        assert_eq!(
            *cache.get(0).unwrap(),
            tick_array_address(&program, &pool_id, 0)
        );
    }

    #[test]
    fn test_validate_pool() {
        let clmm = Pubkey::new_unique();
        let token = Pubkey::new_unique();
        let sol = Pubkey::new_unique();

        assert!(validate_pool(&pool(clmm, sol, token), &[clmm], &token, &sol).is_ok());

        let wrong_program = pool(Pubkey::new_unique(), sol, token);
        assert!(matches!(
            validate_pool(&wrong_program, &[clmm], &token, &sol),
            Err(EngineError::PoolValidation(_))
        ));

        let wrong_token = pool(clmm, sol, Pubkey::new_unique());
        assert!(validate_pool(&wrong_token, &[clmm], &token, &sol).is_err());

        let no_sol = pool(clmm, Pubkey::new_unique(), token);
        assert!(validate_pool(&no_sol, &[clmm], &token, &sol).is_err());
    }
}
