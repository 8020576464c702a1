//! # Lootline - Player Economy Transaction Engine
//!
//! Lootline runs the coin economy behind a live stream's chat game: playing for coins, robbing
//! other players, bailing out of jail, opening crates, buying from a rotating shop and converting
//! coins into bonus tokens. Every action is an atomic, idempotent transaction over a sled ledger.
//!
//! ## Features
//!
//! - **Atomic actions**: per-player async locks plus one ledger transaction per action. Wealth is
//!   an unsigned big integer and never goes negative.
//! - **Idempotency**: callers may attach a key; retries with the same key replay the stored outcome.
//! - **Economy mode gate**: web session callers are refused channel-redeemable actions while the
//!   channel is live; the chat bot is always allowed.
//! - **Weighted outcomes**: every random decision is a draw from a weighted table with
//!   multiplicative modifiers (buffs, gear, status, territory).
//! - **Escrow**: crate rewards (and shop items that do not fit) wait in escrow until claimed once.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lootline::config::Config;
//! use lootline::economy::{CallerContext, EconomyEngine, LedgerStoreBuilder, Registration};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("lootline.toml").await?;
//!     let store = LedgerStoreBuilder::new(config.storage.ledger_path())
//!         .with_territories(config.economy.factions.territories.clone())
//!         .open()?;
//!     let engine = EconomyEngine::builder(config.economy.clone(), Arc::new(store)).build();
//!
//!     let player = engine.register_player(Registration::new("vex")).await?;
//!     let receipt = engine.play(&CallerContext::session(player.id), false, None).await?;
//!     println!("{:?} -> {}", receipt.outcome.outcome_kind, receipt.player.wealth);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`economy`] - engine, balance mutator, resolvers and the ledger store
//! - [`config`] - configuration management and validation
//! - [`metrics`] - in-process counters for applied and rejected actions
//! - [`logutil`] - helpers for keeping user-supplied text on one log line
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  EconomyEngine  │ ← gate, metrics, logging
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │ BalanceMutator  │ ← locks, retries, idempotency
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │  LedgerStore    │ ← sled trees, versioned commit
//! └─────────────────┘
//! ```

pub mod config;
pub mod economy;
pub mod logutil;
pub mod metrics;
