//! Escrow records: rewards parked until their owner claims them.
//!
//! Deposits and claims are queued on the transaction and land in the ledger with the rest of the
//! commit. A claim is accepted at most once; the ledger re-checks the stored `claimed` flag
//! inside the commit so two racing claims cannot both win.

use chrono::{DateTime, Utc};

use crate::economy::errors::EconomyError;
use crate::economy::types::{EscrowedReward, PlayerId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscrowWrite {
    Deposit(EscrowedReward),
    Claim(EscrowedReward),
}

impl EscrowWrite {
    pub fn record(&self) -> &EscrowedReward {
        match self {
            Self::Deposit(r) | Self::Claim(r) => r,
        }
    }
}

/// Ownership and state checks for a claim, in the order callers see them.
pub fn check_claim(record: &EscrowedReward, player_id: PlayerId) -> Result<(), EconomyError> {
    if record.player_id != player_id {
        return Err(EconomyError::NotOwner);
    }
    if record.claimed {
        return Err(EconomyError::AlreadyClaimed);
    }
    Ok(())
}

/// The record as it is stored once claimed.
pub fn mark_claimed(mut record: EscrowedReward, now: DateTime<Utc>) -> EscrowedReward {
    record.claimed = true;
    record.claimed_at = Some(now);
    record
}
