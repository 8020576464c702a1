//! Player economy: accounts, the balance mutator, action resolvers and the sled-backed ledger.
//!
//! Every wealth, xp, level or hp change goes through [`mutator::BalanceMutator`], which serializes
//! work per player and commits each action as one ledger transaction. The [`engine::EconomyEngine`]
//! is the entry point callers use.

pub mod actions;
pub mod buffs;
pub mod clock;
pub mod cooldown;
pub mod engine;
pub mod errors;
pub mod escrow;
pub mod gate;
pub mod inventory;
pub mod mutator;
pub mod probability;
pub mod rules;
pub mod shop;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use cooldown::{CooldownLedger, CooldownStatus};
pub use engine::{EconomyEngine, EconomyEngineBuilder, TargetRef};
pub use errors::EconomyError;
pub use gate::{
    authorize, BotAuthenticator, BotCredential, CallerContext, CallerKind, ChannelStatus, DenyReason,
    EconomyModeGate, GateDecision, LiveStatus,
};
pub use mutator::{ActionReceipt, BalanceMutator, PlayerLocks, Txn, DEFAULT_MAX_ATTEMPTS};
pub use probability::{
    effective_weights, resolve, ModifierSet, OutcomeTable, RandomSource, ScriptedRandom,
    SeededRandom, SystemRandom,
};
pub use store::{Changeset, EconomyStore, LedgerStore, LedgerStoreBuilder};
pub use types::*;
