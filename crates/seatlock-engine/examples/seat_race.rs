//! Two contexts race for the single trial seat.
//!
//! A laptop manager takes the trial seat, a desktop manager in the same
//! process logs in with the same account and wins it, and the loser hears
//! about it exactly once. The trial then runs out on the desktop and an
//! immediate retry bounces off the reuse cooldown.
//!
//! Run with: cargo run --package seatlock-engine --example seat_race

use std::sync::Arc;
use std::time::Duration;

use seatlock_engine::logging::init_logging;
use seatlock_engine::protocol::SessionEvent;
use seatlock_engine::{
    Config, MemoryRegistry, SessionManager, SessionStore, SignalRelay, StaticVerifier,
};
use tempfile::TempDir;

const TRIAL_ACCOUNT: &str = "trial@seatlock.dev";
const TRIAL_PASSWORD: &str = "trial-pass";

fn demo_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.engine.data_dir = dir.path().to_path_buf();
    config.trial.duration_ms = 4_000;
    config.trial.reuse_cooldown_ms = Some(10_000);
    config.session.poll_interval_ms = 1_000;
    config
}

fn build_manager(
    config: Config,
    hub: &MemoryRegistry,
    relay: &SignalRelay,
) -> anyhow::Result<SessionManager> {
    let store = SessionStore::in_dir(&config.engine.data_dir);
    let verifier = Arc::new(StaticVerifier::new().with_account(TRIAL_ACCOUNT, TRIAL_PASSWORD));
    SessionManager::new(config, Arc::new(hub.connect()), verifier, store, relay.clone())
}

fn describe(event: &SessionEvent) -> String {
    match event {
        SessionEvent::TrialExpired { session_id, .. } => {
            format!("session {} expired", session_id)
        }
        SessionEvent::SessionReplaced { session_id, .. } => {
            format!("session {} was replaced by a newer login", session_id)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let laptop_dir = TempDir::new()?;
    let desktop_dir = TempDir::new()?;

    let config = demo_config(&laptop_dir);
    init_logging(&config)?;

    // One registry and one relay shared by both managers: two co-located
    // contexts arbitrating over the same seat.
    let hub = MemoryRegistry::new();
    let relay = SignalRelay::new();

    let laptop = build_manager(config, &hub, &relay)?;
    let desktop = build_manager(demo_config(&desktop_dir), &hub, &relay)?;

    laptop.start().await?;
    desktop.start().await?;

    // The laptop takes the trial seat.
    let mut laptop_events = laptop.subscribe();
    let record = laptop.login(TRIAL_ACCOUNT, TRIAL_PASSWORD).await?;
    println!("laptop holds the seat as session {}", record.session_id);
    println!("laptop countdown: {}", laptop.remaining_time().await);

    tokio::time::sleep(Duration::from_millis(1_200)).await;
    println!("laptop countdown: {}", laptop.remaining_time().await);

    // The desktop logs in with the same account; the newer login wins.
    let mut desktop_events = desktop.subscribe();
    let record = desktop.login(TRIAL_ACCOUNT, TRIAL_PASSWORD).await?;
    println!("desktop took the seat as session {}", record.session_id);

    let event = laptop_events.recv().await?;
    println!("laptop was told: {}", describe(&event));
    println!("laptop authenticated: {}", laptop.is_authenticated().await);
    println!("desktop countdown: {}", desktop.remaining_time().await);

    // The trial runs out on the desktop, and the seat cools down.
    let event = desktop_events.recv().await?;
    println!("desktop was told: {}", describe(&event));

    match desktop.login(TRIAL_ACCOUNT, TRIAL_PASSWORD).await {
        Ok(_) => println!("unexpected: the trial seat was free again"),
        Err(e) => println!("immediate retry rejected: {}", e),
    }

    laptop.shutdown().await;
    desktop.shutdown().await;
    Ok(())
}
