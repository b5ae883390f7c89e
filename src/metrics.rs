//! Metrics collection and export module

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::time::Instant;

use crate::types::{CycleOutcome, Direction};

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Counters
    pub cycles_total: IntCounter,
    pub bundles_confirmed: IntCounter,
    pub bundles_unconfirmed: IntCounter,
    pub cycles_no_wallets: IntCounter,
    pub cycle_errors: IntCounter,
    pub evictions_total: IntCounter,
    pub intents_buy: IntCounter,
    pub intents_sell: IntCounter,
    pub fallbacks_total: IntCounter,

    // Gauges
    pub bundle_capacity: IntGauge,
    pub wallet_pool_size: IntGauge,

    // Histograms
    pub cycle_latency: Histogram,
    pub bundle_size: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let cycles_total =
            IntCounter::with_opts(Opts::new("cycles_total", "Number of trading cycles run"))?;

        let bundles_confirmed = IntCounter::with_opts(Opts::new(
            "bundles_confirmed",
            "Number of bundles that landed",
        ))?;

        let bundles_unconfirmed = IntCounter::with_opts(Opts::new(
            "bundles_unconfirmed",
            "Number of bundles that expired or failed to land",
        ))?;

        let cycles_no_wallets = IntCounter::with_opts(Opts::new(
            "cycles_no_wallets",
            "Cycles that produced no eligible wallet",
        ))?;

        let cycle_errors = IntCounter::with_opts(Opts::new(
            "cycle_errors",
            "Cycles aborted by a collaborator failure",
        ))?;

        let evictions_total = IntCounter::with_opts(Opts::new(
            "evictions_total",
            "Wallets evicted from the pool",
        ))?;

        let intents_buy =
            IntCounter::with_opts(Opts::new("intents_buy", "Buy intents emitted"))?;

        let intents_sell =
            IntCounter::with_opts(Opts::new("intents_sell", "Sell intents emitted"))?;

        let fallbacks_total = IntCounter::with_opts(Opts::new(
            "fallbacks_total",
            "Intents emitted on the fallback side",
        ))?;

        let bundle_capacity = IntGauge::with_opts(Opts::new(
            "bundle_capacity",
            "Swap transactions allowed in the next bundle",
        ))?;

        let wallet_pool_size =
            IntGauge::with_opts(Opts::new("wallet_pool_size", "Wallets left in the pool"))?;

        let cycle_latency = Histogram::with_opts(
            HistogramOpts::new("cycle_latency_seconds", "Cycle duration including confirmation")
                .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        )?;

        let bundle_size = Histogram::with_opts(
            HistogramOpts::new("bundle_size", "Swap transactions per submitted bundle")
                .buckets(vec![1.0, 2.0, 3.0, 4.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(cycles_total.clone()))?;
        registry.register(Box::new(bundles_confirmed.clone()))?;
        registry.register(Box::new(bundles_unconfirmed.clone()))?;
        registry.register(Box::new(cycles_no_wallets.clone()))?;
        registry.register(Box::new(cycle_errors.clone()))?;
        registry.register(Box::new(evictions_total.clone()))?;
        registry.register(Box::new(intents_buy.clone()))?;
        registry.register(Box::new(intents_sell.clone()))?;
        registry.register(Box::new(fallbacks_total.clone()))?;
        registry.register(Box::new(bundle_capacity.clone()))?;
        registry.register(Box::new(wallet_pool_size.clone()))?;
        registry.register(Box::new(cycle_latency.clone()))?;
        registry.register(Box::new(bundle_size.clone()))?;

        Ok(Self {
            registry,
            cycles_total,
            bundles_confirmed,
            bundles_unconfirmed,
            cycles_no_wallets,
            cycle_errors,
            evictions_total,
            intents_buy,
            intents_sell,
            fallbacks_total,
            bundle_capacity,
            wallet_pool_size,
            cycle_latency,
            bundle_size,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Prometheus text exposition of every registered metric
    pub fn encode_text(&self) -> anyhow::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }

    pub fn record_intent(&self, direction: Direction, fallback: bool) {
        match direction {
            Direction::Buy => self.intents_buy.inc(),
            Direction::Sell => self.intents_sell.inc(),
        }
        if fallback {
            self.fallbacks_total.inc();
        }
    }

    pub fn record_cycle(&self, outcome: &CycleOutcome) {
        self.cycles_total.inc();
        match outcome {
            CycleOutcome::Confirmed { tx_count, .. } => {
                self.bundles_confirmed.inc();
                self.bundle_size.observe(*tx_count as f64);
            }
            CycleOutcome::Unconfirmed { tx_count } => {
                self.bundles_unconfirmed.inc();
                self.bundle_size.observe(*tx_count as f64);
            }
            CycleOutcome::NoEligibleWallets => self.cycles_no_wallets.inc(),
            CycleOutcome::Failed { .. } => self.cycle_errors.inc(),
        }
    }

    pub fn set_session_state(&self, capacity: usize, pool_size: usize) {
        self.bundle_capacity.set(capacity as i64);
        self.wallet_pool_size.set(pool_size as i64);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.elapsed_secs());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
