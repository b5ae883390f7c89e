//! Integration tests for a full trading session
//!
//! Configuration and wallets are loaded from files the way the binary does,
//! then the scheduler runs against in-memory collaborators:
//! - a funded session trades until its time budget runs out
//! - a session of unfunded wallets ends with pool exhaustion
//! - exit codes reflect how the session ended

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

use volume_bot::config::Config;
use volume_bot::random::StdRandomness;
use volume_bot::test_utils::{decode_mock_swap, mock_collaborators};
use volume_bot::types::{Direction, EXIT_POOL_EXHAUSTED, EXIT_TIME_UP};
use volume_bot::wallet::{load_wallets, WalletSlot};
use volume_bot::{Collaborators, Scheduler, SessionClock, SessionEnd};

fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn config_file(token_mint: &Pubkey, wallets_path: &str, mode: &str) -> NamedTempFile {
    write_temp(&format!(
        r#"
[rpc]
endpoint = "http://localhost:8899"

[pool]
pool_id = "{pool}"
token_mint = "{token}"

[trading]
mode = "{mode}"
min_buy_quantity = 10.0
max_buy_quantity = 20.0
min_sell_quantity = 5.0
max_sell_quantity = 15.0

[session]
min_lifetime_secs = 30
max_lifetime_secs = 30
min_wait_ms = 2000
max_wait_ms = 4000

[bundle]
max_bundle_size = 3
fee_payer_keypair_path = "fee_payer.json"

[wallets]
path = "{wallets}"
number_of_wallets = 4
"#,
        pool = Pubkey::new_unique(),
        token = token_mint,
        mode = mode,
        wallets = wallets_path,
    ))
}

fn wallet_file(count: usize) -> NamedTempFile {
    let entries: Vec<_> = (0..count)
        .map(|_| {
            serde_json::json!({
                "secretKey": bs58::encode(Keypair::new().to_bytes()).into_string()
            })
        })
        .collect();
    write_temp(&serde_json::Value::Array(entries).to_string())
}

fn load(mode: &str) -> (Config, Vec<WalletSlot>, Pubkey, Vec<NamedTempFile>) {
    let token = Pubkey::new_unique();
    let wallets_file = wallet_file(5);
    let wallets_path = wallets_file.path().to_str().unwrap().to_string();
    let config_file = config_file(&token, &wallets_path, mode);

    let config = Config::from_file(config_file.path().to_str().unwrap()).unwrap();
    config.validate().unwrap();
    let wallets = load_wallets(&config.wallets.path, config.wallets.number_of_wallets).unwrap();
    (config, wallets, token, vec![wallets_file, config_file])
}

#[tokio::test(start_paused = true)]
async fn test_funded_session_trades_until_time_up() {
    let (config, wallets, token, _files) = load("mixed");
    assert_eq!(wallets.len(), 4);

    let (amm, chain, relay) = mock_collaborators(token, 1.0, 6);
    for slot in &wallets {
        chain.set_balance(&slot.pubkey(), 2_000_000_000).await;
        chain.set_token_balance(&slot.pubkey(), 500_000_000).await;
    }

    let mut rng = StdRandomness::seeded(42);
    let clock = SessionClock::random(
        config.session.min_lifetime_secs,
        config.session.max_lifetime_secs,
        &mut rng,
    );
    assert_eq!(clock.lifetime(), Duration::from_secs(30));

    let collaborators = Collaborators {
        amm: amm.clone(),
        chain: chain.clone(),
        relay: relay.clone(),
    };
    let mut scheduler =
        Scheduler::new(&config, wallets.clone(), collaborators, Box::new(rng), clock).unwrap();

    let started = tokio::time::Instant::now();
    let end = scheduler.run().await.unwrap();

    assert_eq!(end, SessionEnd::TimeUp);
    assert_eq!(end.exit_code(), EXIT_TIME_UP);
    assert_eq!(started.elapsed(), Duration::from_secs(30));
    assert_eq!(scheduler.pool().size(), 4);

    // Waits of 2-4s inside a 30s budget
    let bundles = relay.submissions().await;
    assert!((8..=16).contains(&bundles.len()), "bundles = {}", bundles.len());

    let owners: Vec<Pubkey> = wallets.iter().map(|w| w.pubkey()).collect();
    let mut directions = Vec::new();
    for bundle in &bundles {
        assert!(!bundle.is_empty() && bundle.len() <= 3);
        let mut payers: Vec<Pubkey> = Vec::new();
        for tx in bundle {
            let swap = decode_mock_swap(tx).unwrap();
            assert!(owners.contains(&swap.payer));
            assert!(!payers.contains(&swap.payer), "wallet traded twice in one bundle");
            payers.push(swap.payer);
            directions.push(swap.direction);
        }
    }
    assert!(directions.contains(&Direction::Buy));
    assert!(directions.contains(&Direction::Sell));

    // The quote context is fetched once and shared by every cycle
    assert_eq!(amm.fetch_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unfunded_session_ends_with_pool_exhausted() {
    let (config, wallets, token, _files) = load("buy");
    let (amm, chain, relay) = mock_collaborators(token, 1.0, 6);

    let collaborators = Collaborators {
        amm,
        chain,
        relay: relay.clone(),
    };
    let mut scheduler = Scheduler::new(
        &config,
        wallets,
        collaborators,
        Box::new(StdRandomness::seeded(7)),
        SessionClock::start(Duration::from_secs(30)),
    )
    .unwrap();

    let started = tokio::time::Instant::now();
    let end = scheduler.run().await.unwrap();

    assert_eq!(end, SessionEnd::PoolExhausted);
    assert_eq!(end.exit_code(), EXIT_POOL_EXHAUSTED);
    assert!(started.elapsed() < Duration::from_secs(30));
    assert_eq!(relay.call_count().await, 0);
    assert_eq!(scheduler.pool().evicted_count(), 4);
}

#[test]
fn test_invalid_config_is_rejected() {
    let token = Pubkey::new_unique();
    let file = config_file(&token, "wallets.json", "mixed");
    let mut config = Config::from_file(file.path().to_str().unwrap()).unwrap();

    config.bundle.max_bundle_size = 5;
    assert!(config.validate().is_err());

    config.bundle.max_bundle_size = 3;
    config.trading.min_buy_quantity = 30.0;
    assert!(config.validate().is_err());
}
