//! Shared fixtures for the integration tests: a scratch ledger, a pinned clock and a scripted
//! or seeded random source behind one engine.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use num_bigint::BigUint;
use tempfile::TempDir;

use lootline::config::EconomyConfig;
use lootline::economy::{
    BotAuthenticator, CallerContext, ChannelStatus, EconomyEngine, LedgerStore, LedgerStoreBuilder, ManualClock,
    PlayerId, RandomSource, Registration, Wealth,
};

pub struct Harness {
    pub dir: TempDir,
    pub engine: Arc<EconomyEngine>,
    pub store: Arc<LedgerStore>,
    pub clock: Arc<ManualClock>,
    pub status: Arc<ChannelStatus>,
}

/// Noon UTC, so a handful of cooldowns never cross the local day boundary.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap()
}

pub fn harness(rng: impl RandomSource + 'static) -> Harness {
    harness_with(EconomyConfig::default(), rng)
}

pub fn harness_with(config: EconomyConfig, rng: impl RandomSource + 'static) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(
        LedgerStoreBuilder::new(dir.path().join("ledger"))
            .with_territories(config.factions.territories.clone())
            .open()
            .expect("open ledger"),
    );
    let clock = Arc::new(ManualClock::new(start_time()));
    let status = Arc::new(ChannelStatus::new(false));
    let engine = EconomyEngine::builder(config, store.clone())
        .with_live_status(status.clone())
        .with_random(Box::new(rng))
        .with_clock(clock.clone())
        .build();
    Harness {
        dir,
        engine: Arc::new(engine),
        store,
        clock,
        status,
    }
}

pub async fn register(engine: &EconomyEngine, name: &str) -> PlayerId {
    engine
        .register_player(Registration::new(name))
        .await
        .expect("register")
        .id
}

pub const BOT_SECRET: &str = "harness-bot-secret";

pub fn bot(id: PlayerId) -> CallerContext {
    BotAuthenticator::new(Some(BOT_SECRET))
        .authorize(BOT_SECRET, id)
        .expect("bot secret")
}

pub fn coins(n: u64) -> Wealth {
    BigUint::from(n)
}

pub async fn wealth(engine: &EconomyEngine, id: PlayerId) -> Wealth {
    engine.player(id).await.expect("player").wealth().clone()
}

/// Credit `amount` through the bot path so tests can fund players.
pub async fn fund(engine: &EconomyEngine, id: PlayerId, amount: u64) {
    engine
        .grant(&bot(id), coins(amount), "test funding", None)
        .await
        .expect("grant");
}
