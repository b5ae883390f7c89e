//! Session scheduler
//!
//! Runs trading cycles one after another until the wallet pool is empty or
//! the session deadline passes. A cycle:
//!
//! 1. reuses (or fetches) the quote context
//! 2. shuffles the pool and walks it up to the current capacity, evicting
//!    wallets that cannot trade
//! 3. assembles and submits one bundle, then waits for its outcome
//! 4. adjusts capacity and sleeps a random wait
//!
//! The deadline is hard: it interrupts a cycle wherever it is, including a
//! pending confirmation.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info};

use crate::amm::AmmClient;
use crate::bundle::BundleAssembler;
use crate::chain::ChainState;
use crate::config::Config;
use crate::decision::{Decision, DecisionEngine};
use crate::errors::{EngineError, EngineResult};
use crate::metrics::{metrics, Timer};
use crate::pool::WalletPool;
use crate::quote::{QuoteContextProvider, QuoteEngine};
use crate::random::Randomness;
use crate::relay::BundleRelay;
use crate::structured_logging::SessionLogger;
use crate::types::{CycleOutcome, SessionEnd, TradeMode};
use crate::wallet::WalletSlot;

/// Fixed session deadline
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    deadline: Instant,
    lifetime: Duration,
}

impl SessionClock {
    pub fn start(lifetime: Duration) -> Self {
        Self {
            deadline: Instant::now() + lifetime,
            lifetime,
        }
    }

    /// Lifetime drawn uniformly from `[min_secs, max_secs]`
    pub fn random(min_secs: u64, max_secs: u64, rng: &mut dyn Randomness) -> Self {
        Self::start(Duration::from_secs(rng.uniform_u64(min_secs, max_secs)))
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Run `on_expire` once the deadline passes, independent of the cycle loop
    pub fn spawn_watchdog<F>(&self, on_expire: F) -> JoinHandle<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let deadline = self.deadline;
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            on_expire();
        })
    }
}

/// Capacity bookkeeping owned by the scheduler
#[derive(Debug, Clone)]
pub struct SessionState {
    max_capacity: usize,
    capacity: usize,
    clock: SessionClock,
}

impl SessionState {
    pub fn new(max_capacity: usize, pool_size: usize, clock: SessionClock) -> Self {
        Self {
            max_capacity,
            capacity: max_capacity.min(pool_size),
            clock,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    /// Shrink to the live pool size; called whenever the pool changes
    pub fn clamp_to_pool(&mut self, pool_size: usize) {
        self.capacity = self.capacity.min(pool_size);
    }

    /// Grow one step toward the maximum, never past the live pool size
    pub fn end_of_cycle(&mut self, pool_size: usize) {
        self.clamp_to_pool(pool_size);
        if self.capacity < self.max_capacity {
            self.capacity = (self.capacity + 1).min(self.max_capacity).min(pool_size);
        }
    }
}

/// Cycle timing and bundle settings
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub mode: TradeMode,
    pub max_bundle_size: usize,
    pub tip_lamports: u64,
    pub min_wait_ms: u64,
    pub max_wait_ms: u64,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            mode: config.trading.mode,
            max_bundle_size: config.bundle.max_bundle_size,
            tip_lamports: config.bundle.tip_lamports,
            min_wait_ms: config.session.min_wait_ms,
            max_wait_ms: config.session.max_wait_ms,
        }
    }
}

/// External services a session talks to
#[derive(Clone)]
pub struct Collaborators {
    pub amm: Arc<dyn AmmClient>,
    pub chain: Arc<dyn ChainState>,
    pub relay: Arc<dyn BundleRelay>,
}

/// Drives the trading session
pub struct Scheduler {
    pool: WalletPool,
    state: SessionState,
    contexts: QuoteContextProvider,
    decisions: DecisionEngine,
    assembler: BundleAssembler,
    chain: Arc<dyn ChainState>,
    relay: Arc<dyn BundleRelay>,
    rng: Box<dyn Randomness>,
    settings: SchedulerSettings,
    cycle: u64,
}

impl Scheduler {
    pub fn new(
        config: &Config,
        wallets: Vec<WalletSlot>,
        collaborators: Collaborators,
        rng: Box<dyn Randomness>,
        clock: SessionClock,
    ) -> EngineResult<Self> {
        let settings = SchedulerSettings::from_config(config);
        let contexts = QuoteContextProvider::new(
            Arc::clone(&collaborators.amm),
            Arc::clone(&collaborators.chain),
            config.pool_id()?,
            config.token_mint()?,
            config.clmm_programs()?,
        )
        .with_max_age(config.pool.context_max_age_secs.map(Duration::from_secs))
        .with_max_retries(config.rpc.max_retries);

        let quotes = QuoteEngine::new(Arc::clone(&collaborators.amm), config.trading.slippage);
        let decisions = DecisionEngine::new(
            quotes,
            Arc::clone(&collaborators.chain),
            config.trading.clone(),
        );

        let pool = WalletPool::new(wallets);
        let state = SessionState::new(settings.max_bundle_size, pool.size(), clock);

        Ok(Self {
            pool,
            state,
            contexts,
            decisions,
            assembler: BundleAssembler::new(collaborators.amm),
            chain: collaborators.chain,
            relay: collaborators.relay,
            rng,
            settings,
            cycle: 0,
        })
    }

    pub fn pool(&self) -> &WalletPool {
        &self.pool
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Run until the deadline passes or the pool is exhausted
    ///
    /// Fatal errors (pool validation, configuration) end the session with `Err`.
    pub async fn run(&mut self) -> EngineResult<SessionEnd> {
        let deadline = self.state.clock().deadline();
        SessionLogger::session().log_session_start(
            self.settings.mode,
            self.state.clock().lifetime().as_secs(),
            self.pool.size(),
            self.state.capacity(),
        );

        tokio::select! {
            biased;
            _ = tokio::time::sleep_until(deadline) => {
                info!("Time's up, ending session");
                Ok(SessionEnd::TimeUp)
            }
            end = self.run_cycles() => end,
        }
    }

    async fn run_cycles(&mut self) -> EngineResult<SessionEnd> {
        loop {
            if self.pool.is_empty() {
                error!("All trading wallets evicted. Please fund the trading wallets");
                return Ok(SessionEnd::PoolExhausted);
            }

            self.run_cycle().await?;

            if self.pool.is_empty() {
                error!("All trading wallets evicted. Please fund the trading wallets");
                return Ok(SessionEnd::PoolExhausted);
            }

            let wait_ms = self
                .rng
                .uniform_u64(self.settings.min_wait_ms, self.settings.max_wait_ms);
            SessionLogger::for_cycle(self.cycle).log_wait(wait_ms);
            tokio::time::sleep(Duration::from_millis(wait_ms)).await;
        }
    }

    /// One full cycle; non-fatal failures become [`CycleOutcome::Failed`]
    pub async fn run_cycle(&mut self) -> EngineResult<CycleOutcome> {
        self.cycle += 1;
        let logger = SessionLogger::for_cycle(self.cycle);
        let timer = Timer::new();

        let outcome = match self.cycle_body(&logger).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_fatal() => {
                logger.error(&e.to_string());
                return Err(e);
            }
            Err(e) => {
                logger.log_cycle_error(&e);
                if matches!(e, EngineError::Amm(_)) {
                    // Pool state may have moved past the cached tick arrays
                    self.contexts.invalidate();
                }
                CycleOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        self.state.end_of_cycle(self.pool.size());

        timer.observe_duration(&metrics().cycle_latency);
        metrics().record_cycle(&outcome);
        metrics().set_session_state(self.state.capacity(), self.pool.size());
        logger.log_outcome(&outcome, (timer.elapsed_secs() * 1000.0) as u64);

        Ok(outcome)
    }

    async fn cycle_body(&mut self, logger: &SessionLogger) -> EngineResult<CycleOutcome> {
        let ctx = self.contexts.get().await?;

        self.state.clamp_to_pool(self.pool.size());
        logger.log_cycle_start(self.pool.size(), self.state.capacity());
        self.pool.shuffle(self.rng.as_mut());

        let mut intents = Vec::with_capacity(self.state.capacity());
        let mut index = 0;
        // Bound re-read every step: evictions shrink both the pool and capacity
        while index < self.state.capacity() && index < self.pool.size() {
            let Some(slot) = self.pool.get(index).cloned() else {
                break;
            };

            match self.decisions.decide(&ctx, &slot, self.rng.as_mut()).await? {
                Decision::Intent { intent, fallback } => {
                    logger.log_intent(&intent, fallback);
                    metrics().record_intent(intent.direction, fallback);
                    intents.push(intent);
                    index += 1;
                }
                Decision::Evict { reason } => {
                    self.pool.evict(slot.id());
                    self.state.clamp_to_pool(self.pool.size());
                    metrics().evictions_total.inc();
                    logger.log_eviction(
                        slot.id(),
                        &slot.pubkey(),
                        &reason.to_string(),
                        self.pool.size(),
                    );
                }
            }
        }

        if intents.is_empty() {
            return Ok(CycleOutcome::NoEligibleWallets);
        }

        let bundle = self
            .assembler
            .assemble(&ctx, &intents, self.state.capacity())
            .await?;
        let tx_count = bundle.len();

        let blockhash = self.chain.latest_blockhash().await?;
        let submitted = self
            .relay
            .submit_bundle(
                self.settings.tip_lamports,
                self.settings.max_bundle_size,
                bundle.transactions,
                &blockhash,
            )
            .await;

        match submitted {
            Ok(outcome) if outcome.confirmed => Ok(CycleOutcome::Confirmed {
                bundle_id: outcome.bundle_id,
                tx_count,
            }),
            Ok(_) => Ok(CycleOutcome::Unconfirmed { tx_count }),
            Err(e) => Err(e),
        }
    }
}
