//! Quote context and trade sizing
//!
//! [`QuoteContextProvider`] loads the pool context once and hands out shared
//! read-only snapshots. [`QuoteEngine`] turns quotes into integer base-unit
//! amounts and checks affordability.

use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, info, warn};

use crate::amm::{validate_pool, AmmClient, QuoteContext, SwapQuote};
use crate::chain::ChainState;
use crate::errors::{EngineError, EngineResult};
use crate::types::SwapSide;

/// Lazily fetched, shared pool context
pub struct QuoteContextProvider {
    amm: Arc<dyn AmmClient>,
    chain: Arc<dyn ChainState>,
    pool_id: Pubkey,
    token_mint: Pubkey,
    allowed_programs: Vec<Pubkey>,
    max_age: Option<Duration>,
    max_retries: usize,
    cached: Option<Arc<QuoteContext>>,
    token_decimals: Option<u8>,
    /// Set once a context has passed validation
    validated: bool,
}

impl QuoteContextProvider {
    pub fn new(
        amm: Arc<dyn AmmClient>,
        chain: Arc<dyn ChainState>,
        pool_id: Pubkey,
        token_mint: Pubkey,
        allowed_programs: Vec<Pubkey>,
    ) -> Self {
        Self {
            amm,
            chain,
            pool_id,
            token_mint,
            allowed_programs,
            max_age: None,
            max_retries: 3,
            cached: None,
            token_decimals: None,
            validated: false,
        }
    }

    /// Refetch the whole context once it is older than `max_age`
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Current context, fetching it on first use or when stale
    ///
    /// Validation errors are fatal only on the first fetch. Once the pool has
    /// been accepted, a failed refetch is reported as a transient AMM error.
    pub async fn get(&mut self) -> EngineResult<Arc<QuoteContext>> {
        if let Some(ctx) = &self.cached {
            let stale = self.max_age.is_some_and(|max| ctx.age() >= max);
            if !stale {
                return Ok(Arc::clone(ctx));
            }
            debug!(age_ms = ctx.age().as_millis() as u64, "Quote context expired, refetching");
        }

        let ctx = match self.fetch().await {
            Ok(ctx) => Arc::new(ctx),
            Err(e) if self.validated && e.is_fatal() => {
                warn!(error = %e, "Quote context refetch rejected, will retry");
                return Err(EngineError::amm(format!("context refetch: {}", e)));
            }
            Err(e) => return Err(e),
        };
        self.validated = true;
        self.cached = Some(Arc::clone(&ctx));
        Ok(ctx)
    }

    /// Drop the cached context so the next `get` refetches it
    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    async fn fetch(&mut self) -> EngineResult<QuoteContext> {
        let max_retries = self.max_retries;
        let strategy = || {
            // 100ms, 200ms, 400ms ...
            ExponentialBackoff::from_millis(2)
                .factor(50)
                .max_delay(Duration::from_secs(2))
                .map(jitter)
                .take(max_retries)
        };
        let transient = |e: &EngineError| !e.is_fatal();

        let amm = Arc::clone(&self.amm);
        let pool_id = self.pool_id;
        let snapshot = RetryIf::spawn(strategy(), || amm.fetch_pool(&pool_id), transient).await?;

        let sol_mint = spl_token::native_mint::id();
        validate_pool(
            &snapshot.pool,
            &self.allowed_programs,
            &self.token_mint,
            &sol_mint,
        )?;

        let epoch = RetryIf::spawn(strategy(), || amm.fetch_epoch(), transient).await?;

        let token_decimals = match self.token_decimals {
            Some(decimals) => decimals,
            None => {
                let decimals = self.chain.get_token_decimals(&self.token_mint).await?;
                self.token_decimals = Some(decimals);
                decimals
            }
        };

        info!(
            pool = %snapshot.pool.id,
            program = %snapshot.pool.program_id,
            tick_current = snapshot.compute.tick_current,
            epoch = epoch.epoch,
            token_decimals,
            "Quote context loaded"
        );

        Ok(QuoteContext {
            pool: snapshot.pool,
            compute: snapshot.compute,
            tick_cache: snapshot.tick_cache,
            epoch,
            token_mint: self.token_mint,
            token_decimals,
            fetched_at: Instant::now(),
        })
    }
}

/// Quoting and sizing against the shared context
pub struct QuoteEngine {
    amm: Arc<dyn AmmClient>,
    slippage: f64,
}

impl QuoteEngine {
    pub fn new(amm: Arc<dyn AmmClient>, slippage: f64) -> Self {
        Self { amm, slippage }
    }

    /// Quote `amount_in` base units of the opposite side into `output`
    pub async fn quote(
        &self,
        ctx: &QuoteContext,
        amount_in: u64,
        output: SwapSide,
    ) -> EngineResult<SwapQuote> {
        self.amm
            .compute_swap_quote(ctx, amount_in, output, self.slippage)
            .await
    }

    /// Lamports to spend on a buy, from the reverse quote of the wanted tokens
    ///
    /// The slippage margin is applied in floating point and truncated.
    pub fn buy_cost_lamports(&self, reverse_quote: &SwapQuote) -> u64 {
        (reverse_quote.min_amount_out as f64 * (1.0 + self.slippage)) as u64
    }

    /// Whether `balance` covers `cost` plus the fee `buffer`
    pub fn affordable(balance: u64, cost: u64, buffer: u64) -> bool {
        balance >= cost.saturating_add(buffer)
    }

    /// Whole-token amount to base units, truncating
    pub fn to_base_units(ui_amount: f64, decimals: u8) -> u64 {
        (ui_amount * 10f64.powi(i32::from(decimals))) as u64
    }
}
