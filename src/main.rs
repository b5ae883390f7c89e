//! Volume Bot
//!
//! Entry point: loads configuration and wallets, wires the Raydium, RPC and
//! Jito adapters into a [`Scheduler`] and runs one trading session.
//!
//! Exit codes:
//! - `2` the session time budget ran out
//! - `3` every trading wallet was evicted
//! - `1` fatal error (logged)

use anyhow::{Context, Result};
use clap::Parser;
use solana_sdk::commitment_config::CommitmentConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use volume_bot::amm::RaydiumClmm;
use volume_bot::chain::RpcChainState;
use volume_bot::config::Config;
use volume_bot::endpoints;
use volume_bot::random::StdRandomness;
use volume_bot::relay::JitoRelay;
use volume_bot::types::{SessionEnd, TradeMode, EXIT_FAILURE, EXIT_TIME_UP};
use volume_bot::wallet::{load_keypair, load_wallets};
use volume_bot::{Collaborators, Scheduler, SessionClock};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Trading mode override (buy or mixed)
    #[arg(short, long)]
    mode: Option<TradeMode>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Serve metrics on this port (overrides the config file)
    #[arg(long)]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging(args.verbose, args.json_logs) {
        eprintln!("Failed to initialise logging: {}", e);
        std::process::exit(EXIT_FAILURE);
    }

    let code = match run(args).await {
        Ok(end) => end.exit_code(),
        Err(e) => {
            error!("Fatal error: {:#}", e);
            EXIT_FAILURE
        }
    };
    std::process::exit(code);
}

async fn run(args: Args) -> Result<SessionEnd> {
    info!("Starting Volume Bot v{}", env!("CARGO_PKG_VERSION"));

    info!("Loading configuration from: {}", args.config);
    let mut config = Config::from_file_with_env(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config))?;
    if let Some(mode) = args.mode {
        config.trading.mode = mode;
    }
    if let Some(port) = args.metrics_port {
        config.monitoring.enable_metrics = true;
        config.monitoring.metrics_port = port;
    }
    config.validate()?;

    let wallets = load_wallets(&config.wallets.path, config.wallets.number_of_wallets)
        .context("Failed to load trading wallets")?;
    let fee_payer = load_keypair(&config.bundle.fee_payer_keypair_path)
        .context("Failed to load fee payer keypair")?;
    info!("Loaded {} trading wallets", wallets.len());

    if config.monitoring.enable_metrics {
        let port = config.monitoring.metrics_port;
        info!("Starting metrics server on port {}", port);
        tokio::spawn(async move {
            if let Err(e) = endpoints::endpoint_server(port).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let timeout = Duration::from_secs(config.rpc.timeout_secs);
    let chain = Arc::new(RpcChainState::new(
        &config.rpc.endpoint,
        timeout,
        CommitmentConfig::confirmed(),
    ));
    let amm = Arc::new(RaydiumClmm::new(
        chain.rpc(),
        config.pool.api_base.clone(),
        config.pool.trade_api_base.clone(),
        config.trading.compute_unit_price_micro_lamports,
        timeout,
    )?);
    let relay = Arc::new(JitoRelay::new(
        chain.rpc(),
        fee_payer,
        config.bundle.block_engine_urls.clone(),
        Duration::from_millis(config.bundle.confirm_poll_ms),
        timeout,
    )?);
    info!("Bundle tips paid by {}", relay.fee_payer());

    let mut rng = StdRandomness::from_entropy();
    let clock = SessionClock::random(
        config.session.min_lifetime_secs,
        config.session.max_lifetime_secs,
        &mut rng,
    );

    // Hard stop even if the session task is stuck on a network call
    clock.spawn_watchdog(|| {
        info!("Time's up");
        std::process::exit(EXIT_TIME_UP);
    });

    let collaborators = Collaborators { amm, chain, relay };
    let mut scheduler = Scheduler::new(&config, wallets, collaborators, Box::new(rng), clock)?;
    Ok(scheduler.run().await?)
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let env_filter = if verbose {
        "volume_bot=debug,info"
    } else {
        "volume_bot=info,warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| env_filter.into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }

    Ok(())
}
