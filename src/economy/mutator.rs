//! The balance mutator: the only code path that writes wealth, xp, level and hp.
//!
//! A unit of work runs as:
//!
//! 1. take the per-player async locks of every player involved, in ascending id order
//! 2. if an idempotency key was supplied and already recorded, replay the stored outcome
//! 3. load accounts and cooldown ledgers into a [`Txn`]
//! 4. let the resolver mutate the `Txn` in memory
//! 5. commit everything in one ledger transaction guarded by account versions
//!
//! A version conflict at step 5 restarts at step 2. An error at step 4 drops the `Txn` and
//! nothing is written. Dropping the future before step 5 also writes nothing.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use num_bigint::BigInt;
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::config::PlayerConfig;
use crate::economy::clock::Clock;
use crate::economy::buffs;
use crate::economy::cooldown::CooldownLedger;
use crate::economy::errors::EconomyError;
use crate::economy::escrow::{mark_claimed, EscrowWrite};
use crate::economy::rules;
use crate::economy::store::{Changeset, EconomyStore};
use crate::economy::types::{
    ActionKind, EscrowedReward, OutcomeDetails, OutcomeKind, PlayerAccount, PlayerId,
    PlayerSnapshot, Reward, TransactionOutcome, Wealth,
};
use crate::logutil;
use crate::metrics;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Result of a resolver call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionReceipt {
    pub outcome: TransactionOutcome,
    /// Acting player after the transaction (current state when replayed).
    pub player: PlayerSnapshot,
    /// True when an earlier outcome with the same idempotency key was returned instead.
    pub replayed: bool,
}

/// One async mutex per player, created on first use.
#[derive(Default)]
pub struct PlayerLocks {
    table: Mutex<HashMap<PlayerId, Arc<AsyncMutex<()>>>>,
}

impl PlayerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, id: PlayerId) -> Arc<AsyncMutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(|p| p.into_inner());
        table.entry(id).or_default().clone()
    }

    /// Lock every id once, lowest first, so two transactions over the same pair of players
    /// always queue in the same order.
    pub async fn acquire(&self, ids: &[PlayerId]) -> Vec<OwnedMutexGuard<()>> {
        let mut ordered = ids.to_vec();
        ordered.sort_unstable();
        ordered.dedup();
        let mut guards = Vec::with_capacity(ordered.len());
        for id in ordered {
            guards.push(self.handle(id).lock_owned().await);
        }
        guards
    }
}

/// In-memory unit of work handed to resolvers.
pub struct Txn<'a> {
    action: ActionKind,
    actor: PlayerId,
    now: DateTime<Utc>,
    player_config: &'a PlayerConfig,
    accounts: BTreeMap<PlayerId, PlayerAccount>,
    opening_wealth: Wealth,
    ledgers: BTreeMap<PlayerId, CooldownLedger>,
    escrow: Vec<EscrowWrite>,
    outcome: Option<(OutcomeKind, OutcomeDetails, Option<PlayerId>)>,
}

impl<'a> Txn<'a> {
    fn load(
        store: &dyn EconomyStore,
        action: ActionKind,
        actor: PlayerId,
        ids: &[PlayerId],
        now: DateTime<Utc>,
        player_config: &'a PlayerConfig,
    ) -> Result<Self, EconomyError> {
        let mut accounts = BTreeMap::new();
        let mut ledgers = BTreeMap::new();
        for id in ids {
            if accounts.contains_key(id) {
                continue;
            }
            let mut account = store.read_player(*id)?;
            buffs::prune_expired(&mut account, now);
            accounts.insert(*id, account);
            ledgers.insert(*id, CooldownLedger::load(*id, store.read_cooldowns(*id)?));
        }
        let opening_wealth = accounts
            .get(&actor)
            .map(|a| a.wealth().clone())
            .ok_or_else(|| EconomyError::NotFound(format!("player {}", actor)))?;
        Ok(Self {
            action,
            actor,
            now,
            player_config,
            accounts,
            opening_wealth,
            ledgers,
            escrow: Vec::new(),
            outcome: None,
        })
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn actor(&self) -> PlayerId {
        self.actor
    }

    pub fn account(&self, id: PlayerId) -> Result<&PlayerAccount, EconomyError> {
        self.accounts
            .get(&id)
            .ok_or_else(|| EconomyError::Internal(format!("player {} is not part of this transaction", id)))
    }

    /// Non-balance fields (tokens, crates, inventory, buffs, shop) are edited through this.
    pub fn account_mut(&mut self, id: PlayerId) -> Result<&mut PlayerAccount, EconomyError> {
        self.accounts
            .get_mut(&id)
            .ok_or_else(|| EconomyError::Internal(format!("player {} is not part of this transaction", id)))
    }

    pub fn ledger(&mut self, id: PlayerId) -> Result<&mut CooldownLedger, EconomyError> {
        self.ledgers
            .get_mut(&id)
            .ok_or_else(|| EconomyError::Internal(format!("no cooldown ledger for {}", id)))
    }

    pub fn credit(&mut self, id: PlayerId, amount: &Wealth) -> Result<(), EconomyError> {
        let balance = self.account_mut(id)?.balance_mut();
        let updated = balance.wealth() + amount;
        balance.set_wealth(updated);
        Ok(())
    }

    /// Fails with `InsufficientFunds` instead of going below zero.
    pub fn debit(&mut self, id: PlayerId, amount: &Wealth) -> Result<(), EconomyError> {
        let balance = self.account_mut(id)?.balance_mut();
        if balance.wealth() < amount {
            return Err(EconomyError::insufficient(amount, balance.wealth()));
        }
        let updated = balance.wealth() - amount;
        balance.set_wealth(updated);
        Ok(())
    }

    pub fn transfer(&mut self, from: PlayerId, to: PlayerId, amount: &Wealth) -> Result<(), EconomyError> {
        self.debit(from, amount)?;
        self.credit(to, amount)
    }

    /// Adds experience and applies level-ups. A level-up refills hp. Returns levels gained.
    pub fn add_xp(&mut self, id: PlayerId, xp: u64) -> Result<u32, EconomyError> {
        let config = self.player_config;
        let balance = self.account_mut(id)?.balance_mut();
        let total = balance.xp().saturating_add(xp);
        let before = balance.level();
        let after = rules::level_for_xp(config.xp_curve, config.max_level, total).max(before);
        balance.set_progress(total, after);
        if after > before {
            balance.set_hp(rules::max_hp(config, after));
        }
        Ok(after - before)
    }

    /// Returns remaining hp.
    pub fn damage(&mut self, id: PlayerId, amount: u32) -> Result<u32, EconomyError> {
        let balance = self.account_mut(id)?.balance_mut();
        let hp = balance.hp().saturating_sub(amount);
        balance.set_hp(hp);
        Ok(hp)
    }

    pub fn restore_hp(&mut self, id: PlayerId) -> Result<(), EconomyError> {
        let config = self.player_config;
        let balance = self.account_mut(id)?.balance_mut();
        let full = rules::max_hp(config, balance.level());
        balance.set_hp(full);
        Ok(())
    }

    pub fn deposit(&mut self, player_id: PlayerId, reward: Reward) -> Uuid {
        let record = EscrowedReward::new(player_id, reward, self.now);
        let id = record.id;
        self.escrow.push(EscrowWrite::Deposit(record));
        id
    }

    /// Queue an already validated escrow record as claimed.
    pub fn claim(&mut self, record: EscrowedReward) {
        let claimed = mark_claimed(record, self.now);
        self.escrow.push(EscrowWrite::Claim(claimed));
    }

    pub fn record(&mut self, kind: OutcomeKind, details: OutcomeDetails) {
        self.outcome = Some((kind, details, None));
    }

    pub fn record_against(&mut self, target: PlayerId, kind: OutcomeKind, details: OutcomeDetails) {
        self.outcome = Some((kind, details, Some(target)));
    }

    fn finish(self, idempotency_key: Option<&str>) -> Result<(Changeset, PlayerAccount), EconomyError> {
        let Some((kind, details, target)) = self.outcome else {
            return Err(EconomyError::Internal(format!(
                "{} finished without recording an outcome",
                self.action
            )));
        };
        let actor_account = self
            .accounts
            .get(&self.actor)
            .cloned()
            .ok_or_else(|| EconomyError::NotFound(format!("player {}", self.actor)))?;

        let mut outcome = TransactionOutcome::new(self.action, self.actor, kind, details, self.now);
        outcome.target_id = target;
        outcome.amount_delta =
            BigInt::from(actor_account.wealth().clone()) - BigInt::from(self.opening_wealth);
        outcome.idempotency_key = idempotency_key.map(str::to_string);

        let mut changeset = Changeset {
            outcomes: vec![outcome],
            escrow: self.escrow,
            ..Changeset::default()
        };
        for (_, ledger) in self.ledgers {
            changeset.cooldowns.extend(ledger.into_writes());
        }
        for (_, mut account) in self.accounts {
            account.updated_at = self.now;
            changeset.accounts.push(account);
        }
        Ok((changeset, actor_account))
    }
}

pub struct BalanceMutator {
    store: Arc<dyn EconomyStore>,
    clock: Arc<dyn Clock>,
    locks: PlayerLocks,
    player_config: PlayerConfig,
    max_attempts: u32,
}

impl BalanceMutator {
    pub fn new(
        store: Arc<dyn EconomyStore>,
        clock: Arc<dyn Clock>,
        player_config: PlayerConfig,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            clock,
            locks: PlayerLocks::new(),
            player_config,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn locks(&self) -> &PlayerLocks {
        &self.locks
    }

    /// Run `apply` as one atomic unit of work acting for `actor`, with `others` locked as well.
    pub async fn transact<F>(
        &self,
        action: ActionKind,
        actor: PlayerId,
        others: &[PlayerId],
        idempotency_key: Option<&str>,
        mut apply: F,
    ) -> Result<ActionReceipt, EconomyError>
    where
        F: FnMut(&mut Txn<'_>) -> Result<(), EconomyError>,
    {
        let mut ids = Vec::with_capacity(others.len() + 1);
        ids.push(actor);
        ids.extend_from_slice(others);
        let _guards = self.locks.acquire(&ids).await;

        for attempt in 1..=self.max_attempts {
            if let Some(receipt) = self.replay(action, actor, idempotency_key)? {
                return Ok(receipt);
            }

            let now = self.clock.now();
            let mut txn = Txn::load(
                self.store.as_ref(),
                action,
                actor,
                &ids,
                now,
                &self.player_config,
            )?;
            apply(&mut txn)?;
            let (changeset, actor_account) = txn.finish(idempotency_key)?;

            match self.store.commit(changeset) {
                Ok(mut recorded) => {
                    let outcome = recorded.pop().ok_or_else(|| {
                        EconomyError::Internal("commit returned no outcome".to_string())
                    })?;
                    return Ok(ActionReceipt {
                        outcome,
                        player: actor_account.snapshot(),
                        replayed: false,
                    });
                }
                Err(EconomyError::Conflict) => {
                    metrics::inc_commit_retries();
                    log::debug!(
                        "economy: {} for {} hit a version conflict (attempt {}/{})",
                        action,
                        actor,
                        attempt,
                        self.max_attempts
                    );
                }
                Err(e) => return Err(e),
            }
        }

        log::warn!(
            "economy: {} for {} gave up after {} conflicting attempts",
            action,
            actor,
            self.max_attempts
        );
        Err(EconomyError::Conflict)
    }

    fn replay(
        &self,
        action: ActionKind,
        actor: PlayerId,
        idempotency_key: Option<&str>,
    ) -> Result<Option<ActionReceipt>, EconomyError> {
        let Some(key) = idempotency_key else {
            return Ok(None);
        };
        let Some(outcome) = self.store.find_outcome_by_key(key)? else {
            return Ok(None);
        };
        if outcome.action != action || outcome.player_id != actor {
            return Err(EconomyError::InvalidArgument(format!(
                "idempotency key {} was already used for a different request",
                key
            )));
        }
        metrics::inc_idempotent_replays();
        log::info!(
            "economy: replaying {} for {} (key {})",
            action,
            actor,
            logutil::key(key)
        );
        let player = self.store.read_player(actor)?.snapshot();
        Ok(Some(ActionReceipt {
            outcome,
            player,
            replayed: true,
        }))
    }
}
