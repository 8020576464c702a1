//! Per-player cooldown ledger.
//!
//! A ledger is loaded for one player inside the critical section, consulted and changed in
//! memory, and its pending writes are committed together with the balance change. Jail is the
//! `ActionKind::Jail` cooldown.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::economy::errors::EconomyError;
use crate::economy::types::{ActionKind, Cooldown, PlayerId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CooldownStatus {
    Ready,
    OnCooldown(Duration),
}

/// A cooldown change waiting for commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CooldownWrite {
    Set(Cooldown),
    Clear {
        player_id: PlayerId,
        action: ActionKind,
    },
}

#[derive(Debug, Clone)]
pub struct CooldownLedger {
    player_id: PlayerId,
    entries: BTreeMap<ActionKind, DateTime<Utc>>,
    writes: Vec<CooldownWrite>,
}

impl CooldownLedger {
    pub fn load(player_id: PlayerId, cooldowns: Vec<Cooldown>) -> Self {
        let entries = cooldowns
            .into_iter()
            .filter(|c| c.player_id == player_id)
            .map(|c| (c.action, c.expires_at))
            .collect();
        Self {
            player_id,
            entries,
            writes: Vec::new(),
        }
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn check(&self, action: ActionKind, now: DateTime<Utc>) -> CooldownStatus {
        match self.entries.get(&action) {
            Some(expires_at) if *expires_at > now => CooldownStatus::OnCooldown(*expires_at - now),
            _ => CooldownStatus::Ready,
        }
    }

    pub fn ensure_ready(&self, action: ActionKind, now: DateTime<Utc>) -> Result<(), EconomyError> {
        match self.check(action, now) {
            CooldownStatus::Ready => Ok(()),
            CooldownStatus::OnCooldown(remaining) => {
                Err(EconomyError::OnCooldown { action, remaining })
            }
        }
    }

    pub fn jail_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self.check(ActionKind::Jail, now) {
            CooldownStatus::Ready => None,
            CooldownStatus::OnCooldown(remaining) => Some(remaining),
        }
    }

    pub fn ensure_not_jailed(&self, now: DateTime<Utc>) -> Result<(), EconomyError> {
        match self.jail_remaining(now) {
            None => Ok(()),
            Some(remaining) => Err(EconomyError::Jailed { remaining }),
        }
    }

    /// Start (or restart) the timer for `action`. Returns the expiry.
    pub fn set(&mut self, action: ActionKind, duration: Duration, now: DateTime<Utc>) -> DateTime<Utc> {
        let expires_at = now + duration;
        self.entries.insert(action, expires_at);
        self.writes.push(CooldownWrite::Set(Cooldown {
            player_id: self.player_id,
            action,
            expires_at,
        }));
        expires_at
    }

    pub fn clear(&mut self, action: ActionKind) {
        if self.entries.remove(&action).is_some() {
            self.writes.push(CooldownWrite::Clear {
                player_id: self.player_id,
                action,
            });
        }
    }

    pub fn clear_all(&mut self) {
        let actions: Vec<ActionKind> = self.entries.keys().copied().collect();
        for action in actions {
            self.clear(action);
        }
    }

    /// Cooldowns still running at `now`.
    pub fn active(&self, now: DateTime<Utc>) -> Vec<Cooldown> {
        self.entries
            .iter()
            .filter(|(_, expires_at)| **expires_at > now)
            .map(|(action, expires_at)| Cooldown {
                player_id: self.player_id,
                action: *action,
                expires_at: *expires_at,
            })
            .collect()
    }

    pub fn into_writes(self) -> Vec<CooldownWrite> {
        self.writes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_entries_read_as_ready() {
        let now = Utc::now();
        let ledger = CooldownLedger::load(
            PlayerId(1),
            vec![Cooldown {
                player_id: PlayerId(1),
                action: ActionKind::Play,
                expires_at: now,
            }],
        );
        assert_eq!(ledger.check(ActionKind::Play, now), CooldownStatus::Ready);
        assert!(ledger.ensure_ready(ActionKind::Play, now).is_ok());
    }

    #[test]
    fn set_then_check_reports_remaining() {
        let now = Utc::now();
        let mut ledger = CooldownLedger::load(PlayerId(1), Vec::new());
        ledger.set(ActionKind::Rob, Duration::seconds(90), now);
        assert_eq!(
            ledger.check(ActionKind::Rob, now + Duration::seconds(30)),
            CooldownStatus::OnCooldown(Duration::seconds(60))
        );
        match ledger.ensure_ready(ActionKind::Rob, now) {
            Err(EconomyError::OnCooldown { action, remaining }) => {
                assert_eq!(action, ActionKind::Rob);
                assert_eq!(remaining, Duration::seconds(90));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn jail_is_just_a_cooldown() {
        let now = Utc::now();
        let mut ledger = CooldownLedger::load(PlayerId(3), Vec::new());
        assert!(ledger.ensure_not_jailed(now).is_ok());
        ledger.set(ActionKind::Jail, Duration::minutes(10), now);
        assert!(matches!(
            ledger.ensure_not_jailed(now),
            Err(EconomyError::Jailed { .. })
        ));
        ledger.clear(ActionKind::Jail);
        assert!(ledger.jail_remaining(now).is_none());
    }

    #[test]
    fn clear_all_queues_one_write_per_entry() {
        let now = Utc::now();
        let mut ledger = CooldownLedger::load(PlayerId(2), Vec::new());
        ledger.set(ActionKind::Play, Duration::seconds(10), now);
        ledger.set(ActionKind::Jail, Duration::seconds(10), now);
        ledger.clear_all();
        assert!(ledger.active(now).is_empty());
        let writes = ledger.into_writes();
        assert_eq!(writes.len(), 4);
        assert!(matches!(writes[3], CooldownWrite::Clear { .. }));
    }

    #[test]
    fn clearing_a_missing_entry_writes_nothing() {
        let mut ledger = CooldownLedger::load(PlayerId(2), Vec::new());
        ledger.clear(ActionKind::Jail);
        assert!(ledger.into_writes().is_empty());
    }
}
