use chrono::Duration;
use num_bigint::BigUint;
use thiserror::Error;

use crate::economy::types::ActionKind;

/// Errors returned by the economy engine and its ledger store.
///
/// Precondition failures (cooldowns, jail, funds, missing records) are ordinary results for the
/// caller. Storage and codec failures abort only the current transaction and are retryable.
#[derive(Debug, Error)]
pub enum EconomyError {
    /// No valid caller identity (bad or missing bot secret).
    #[error("unauthorized caller")]
    Unauthorized,

    /// Web session caller while the broadcast channel is live.
    #[error("economy actions are redeemed through the live channel right now")]
    EconomyModeDenied,

    #[error("{action} is on cooldown for another {}s", .remaining.num_seconds())]
    OnCooldown {
        action: ActionKind,
        remaining: Duration,
    },

    #[error("player is jailed for another {}s", .remaining.num_seconds())]
    Jailed { remaining: Duration },

    #[error("player is not jailed")]
    NotJailed,

    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds {
        needed: BigUint,
        available: BigUint,
    },

    #[error("no tokens available")]
    NoTokens,

    #[error("no unopened crates")]
    NoCratesAvailable,

    #[error("daily conversion cap of {cap} reached")]
    ConversionCapReached { cap: u32 },

    #[error("inventory full ({capacity} items)")]
    InventoryFull { capacity: usize },

    /// Returned when fetching a record that is not present.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("reward already claimed")]
    AlreadyClaimed,

    #[error("reward belongs to another player")]
    NotOwner,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Optimistic version check failed during commit; the unit of work is retried.
    #[error("concurrent modification detected")]
    Conflict,

    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Storage(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when deserializing a record with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl EconomyError {
    /// Stable machine-readable code for callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::EconomyModeDenied => "economy_mode_denied",
            Self::OnCooldown { .. } => "on_cooldown",
            Self::Jailed { .. } => "jailed",
            Self::NotJailed => "not_jailed",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::NoTokens => "no_tokens",
            Self::NoCratesAvailable => "no_crates",
            Self::ConversionCapReached { .. } => "conversion_cap_reached",
            Self::InventoryFull { .. } => "inventory_full",
            Self::NotFound(_) => "not_found",
            Self::AlreadyClaimed => "already_claimed",
            Self::NotOwner => "not_owner",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Conflict
            | Self::Storage(_)
            | Self::Codec(_)
            | Self::Io(_)
            | Self::SchemaMismatch { .. }
            | Self::Internal(_) => "internal",
        }
    }

    /// Whether the caller may safely retry (with the same idempotency key).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Conflict | Self::Storage(_) | Self::Io(_) | Self::Internal(_)
        )
    }

    pub(crate) fn insufficient(needed: &BigUint, available: &BigUint) -> Self {
        Self::InsufficientFunds {
            needed: needed.clone(),
            available: available.clone(),
        }
    }
}
