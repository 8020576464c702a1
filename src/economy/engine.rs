//! Public face of the economy: one async method per action.
//!
//! The engine owns the collaborators (ledger store, live status, random source, clock), runs the
//! economy mode gate before taking any lock, and hands each resolver to the balance mutator.
//! Every call is counted in [`crate::metrics`] and logged with an `economy:` prefix.

use std::sync::{Arc, Mutex};

use num_bigint::BigUint;
use uuid::Uuid;

use crate::config::EconomyConfig;
use crate::economy::actions;
use crate::economy::buffs;
use crate::economy::clock::{Clock, SystemClock};
use crate::economy::cooldown::CooldownLedger;
use crate::economy::errors::EconomyError;
use crate::economy::gate::{CallerContext, ChannelStatus, EconomyModeGate, LiveStatus};
use crate::economy::mutator::{ActionReceipt, BalanceMutator, Txn, DEFAULT_MAX_ATTEMPTS};
use crate::economy::probability::{RandomSource, SystemRandom};
use crate::economy::rules;
use crate::economy::store::EconomyStore;
use crate::economy::types::{
    ActionKind, Balance, Cooldown, EscrowedReward, ExternalLink, PlayerAccount, PlayerId,
    PlayerSnapshot, Registration, TransactionOutcome, Wealth,
};
use crate::logutil;
use crate::metrics;

const MAX_DISPLAY_NAME: usize = 32;

/// How a caller names a rob target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetRef {
    Id(PlayerId),
    External(ExternalLink),
}

pub struct EconomyEngineBuilder {
    config: EconomyConfig,
    store: Arc<dyn EconomyStore>,
    live: Option<Arc<dyn LiveStatus>>,
    rng: Option<Box<dyn RandomSource>>,
    clock: Option<Arc<dyn Clock>>,
    max_attempts: u32,
}

impl EconomyEngineBuilder {
    pub fn new(config: EconomyConfig, store: Arc<dyn EconomyStore>) -> Self {
        Self {
            config,
            store,
            live: None,
            rng: None,
            clock: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_live_status(mut self, live: Arc<dyn LiveStatus>) -> Self {
        self.live = Some(live);
        self
    }

    pub fn with_random(mut self, rng: Box<dyn RandomSource>) -> Self {
        self.rng = Some(rng);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn build(self) -> EconomyEngine {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let live = self
            .live
            .unwrap_or_else(|| Arc::new(ChannelStatus::new(false)));
        let rng = self
            .rng
            .unwrap_or_else(|| Box::new(SystemRandom::new()));
        let mutator = BalanceMutator::new(
            self.store.clone(),
            clock.clone(),
            self.config.player.clone(),
            self.max_attempts,
        );
        EconomyEngine {
            config: self.config,
            store: self.store,
            mutator,
            gate: EconomyModeGate::new(live),
            rng: Mutex::new(rng),
            clock,
        }
    }
}

pub struct EconomyEngine {
    config: EconomyConfig,
    store: Arc<dyn EconomyStore>,
    mutator: BalanceMutator,
    gate: EconomyModeGate,
    rng: Mutex<Box<dyn RandomSource>>,
    clock: Arc<dyn Clock>,
}

impl EconomyEngine {
    pub fn builder(config: EconomyConfig, store: Arc<dyn EconomyStore>) -> EconomyEngineBuilder {
        EconomyEngineBuilder::new(config, store)
    }

    pub fn config(&self) -> &EconomyConfig {
        &self.config
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut dyn RandomSource) -> T) -> T {
        let mut guard = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut **guard)
    }

    /// Weight bonus for a faction that holds at least one uncontested territory.
    fn territory_bonus_pct(&self, faction_id: Option<&str>) -> Result<u32, EconomyError> {
        let Some(faction_id) = faction_id else {
            return Ok(0);
        };
        let controls = self.store.list_territories()?.iter().any(|t| {
            !t.is_contested && t.controlling_faction_id.as_deref() == Some(faction_id)
        });
        Ok(if controls {
            self.config.factions.territory_bonus_pct
        } else {
            0
        })
    }

    fn actor_territory_pct(&self, txn: &Txn<'_>) -> Result<u32, EconomyError> {
        let faction = txn.account(txn.actor())?.faction_id.clone();
        self.territory_bonus_pct(faction.as_deref())
    }

    fn observe(&self, action: ActionKind, player: PlayerId, result: &Result<ActionReceipt, EconomyError>) {
        match result {
            Ok(receipt) if receipt.replayed => {}
            Ok(receipt) => {
                metrics::record_outcome(action.as_str(), receipt.outcome.outcome_kind.as_str());
                log::info!(
                    "economy: {} by {} -> {} (delta {}, wealth {})",
                    action,
                    player,
                    receipt.outcome.outcome_kind.as_str(),
                    receipt.outcome.amount_delta,
                    receipt.player.wealth
                );
            }
            Err(e) => {
                metrics::record_rejection(action.as_str(), e.code());
                if e.is_retryable() {
                    log::warn!("economy: {} by {} failed: {}", action, player, e);
                } else {
                    log::debug!("economy: {} by {} rejected: {}", action, player, e);
                }
            }
        }
    }

    async fn run<F>(
        &self,
        caller: &CallerContext,
        action: ActionKind,
        others: &[PlayerId],
        idempotency_key: Option<&str>,
        apply: F,
    ) -> Result<ActionReceipt, EconomyError>
    where
        F: FnMut(&mut Txn<'_>) -> Result<(), EconomyError>,
    {
        let player = caller.player_id();
        let result = match self.gate.check(caller, action) {
            Ok(()) => {
                self.mutator
                    .transact(action, player, others, idempotency_key, apply)
                    .await
            }
            Err(e) => Err(e),
        };
        self.observe(action, player, &result);
        result
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    pub async fn register_player(&self, registration: Registration) -> Result<PlayerSnapshot, EconomyError> {
        let name = registration.display_name.trim();
        if name.is_empty() || name.chars().count() > MAX_DISPLAY_NAME {
            return Err(EconomyError::InvalidArgument(format!(
                "display name must be 1-{} characters",
                MAX_DISPLAY_NAME
            )));
        }
        let balance = Balance::new(
            Wealth::from(self.config.player.starting_wealth),
            self.config.player.base_hp,
        );
        let account = self
            .store
            .create_player(&registration, balance, self.clock.now())?;
        log::info!(
            "economy: registered {} as {}",
            logutil::name(&account.display_name),
            account.id
        );
        Ok(account.snapshot())
    }

    pub async fn link_external(&self, player: PlayerId, link: ExternalLink) -> Result<(), EconomyError> {
        let _guards = self.mutator.locks().acquire(&[player]).await;
        self.store.link_external(player, link)?;
        Ok(())
    }

    pub async fn resolve_target(&self, target: &TargetRef) -> Result<PlayerId, EconomyError> {
        match target {
            TargetRef::Id(id) => {
                self.store.read_player(*id)?;
                Ok(*id)
            }
            TargetRef::External(link) => self.store.find_by_link(link)?.ok_or_else(|| {
                EconomyError::NotFound(format!("{} user {}", link.platform, link.external_id))
            }),
        }
    }

    /// Account as stored, with buff timers brought up to the current time.
    pub async fn player(&self, id: PlayerId) -> Result<PlayerAccount, EconomyError> {
        let mut account = self.store.read_player(id)?;
        buffs::prune_expired(&mut account, self.clock.now());
        Ok(account)
    }

    // ------------------------------------------------------------------
    // Channel-redeemable actions (gated)
    // ------------------------------------------------------------------

    pub async fn play(
        &self,
        caller: &CallerContext,
        use_token: bool,
        idempotency_key: Option<&str>,
    ) -> Result<ActionReceipt, EconomyError> {
        self.run(caller, ActionKind::Play, &[], idempotency_key, |txn| {
            let territory_pct = self.actor_territory_pct(txn)?;
            self.with_rng(|rng| actions::play(&self.config, txn, rng, use_token, territory_pct))
        })
        .await
    }

    pub async fn rob(
        &self,
        caller: &CallerContext,
        target: &TargetRef,
        idempotency_key: Option<&str>,
    ) -> Result<ActionReceipt, EconomyError> {
        let defender = match self.resolve_target(target).await {
            Ok(id) => id,
            Err(e) => {
                let result = Err(e);
                self.observe(ActionKind::Rob, caller.player_id(), &result);
                return result;
            }
        };
        self.run(caller, ActionKind::Rob, &[defender], idempotency_key, |txn| {
            let territory_pct = self.actor_territory_pct(txn)?;
            self.with_rng(|rng| actions::rob(&self.config, txn, rng, defender, territory_pct))
        })
        .await
    }

    pub async fn bail(
        &self,
        caller: &CallerContext,
        idempotency_key: Option<&str>,
    ) -> Result<ActionReceipt, EconomyError> {
        self.run(caller, ActionKind::Bail, &[], idempotency_key, |txn| {
            actions::bail(&self.config, txn)
        })
        .await
    }

    pub async fn reroll_shop(
        &self,
        caller: &CallerContext,
        idempotency_key: Option<&str>,
    ) -> Result<ActionReceipt, EconomyError> {
        self.run(caller, ActionKind::ShopReroll, &[], idempotency_key, |txn| {
            self.with_rng(|rng| actions::reroll_shop(&self.config, txn, rng))
        })
        .await
    }

    // ------------------------------------------------------------------
    // Other actions
    // ------------------------------------------------------------------

    pub async fn claim_mission(
        &self,
        caller: &CallerContext,
        idempotency_key: Option<&str>,
    ) -> Result<ActionReceipt, EconomyError> {
        self.run(caller, ActionKind::MissionClaim, &[], idempotency_key, |txn| {
            actions::claim_mission(&self.config, txn)
        })
        .await
    }

    pub async fn open_crates(
        &self,
        caller: &CallerContext,
        count: u32,
        idempotency_key: Option<&str>,
    ) -> Result<ActionReceipt, EconomyError> {
        self.run(caller, ActionKind::CrateOpen, &[], idempotency_key, |txn| {
            self.with_rng(|rng| actions::open_crates(&self.config, txn, rng, count))
        })
        .await
    }

    pub async fn convert_tokens(
        &self,
        caller: &CallerContext,
        idempotency_key: Option<&str>,
    ) -> Result<ActionReceipt, EconomyError> {
        self.run(caller, ActionKind::TokenConversion, &[], idempotency_key, |txn| {
            actions::convert_tokens(&self.config, txn)
        })
        .await
    }

    pub async fn purchase(
        &self,
        caller: &CallerContext,
        entry_id: &str,
        idempotency_key: Option<&str>,
    ) -> Result<ActionReceipt, EconomyError> {
        self.run(caller, ActionKind::ShopPurchase, &[], idempotency_key, |txn| {
            self.with_rng(|rng| actions::purchase(&self.config, txn, rng, entry_id))
        })
        .await
    }

    pub async fn purchase_supply(
        &self,
        caller: &CallerContext,
        entry_id: &str,
        idempotency_key: Option<&str>,
    ) -> Result<ActionReceipt, EconomyError> {
        self.run(caller, ActionKind::SupplyPurchase, &[], idempotency_key, |txn| {
            actions::purchase_supply(&self.config, txn, entry_id)
        })
        .await
    }

    pub async fn claim_escrow(
        &self,
        caller: &CallerContext,
        escrow_id: Uuid,
        idempotency_key: Option<&str>,
    ) -> Result<ActionReceipt, EconomyError> {
        self.run(caller, ActionKind::EscrowClaim, &[], idempotency_key, |txn| {
            let record = self.store.read_escrow(escrow_id)?;
            actions::claim_escrow(&self.config, txn, record)
        })
        .await
    }

    pub async fn equip_item(
        &self,
        caller: &CallerContext,
        instance_id: Uuid,
        equipped: bool,
    ) -> Result<ActionReceipt, EconomyError> {
        self.run(caller, ActionKind::Equip, &[], None, |txn| {
            actions::equip(&self.config, txn, instance_id, equipped)
        })
        .await
    }

    /// System credit. Bot callers only.
    pub async fn grant(
        &self,
        caller: &CallerContext,
        amount: BigUint,
        reason: &str,
        idempotency_key: Option<&str>,
    ) -> Result<ActionReceipt, EconomyError> {
        if !matches!(caller, CallerContext::Bot { .. }) {
            let result = Err(EconomyError::Unauthorized);
            self.observe(ActionKind::Grant, caller.player_id(), &result);
            return result;
        }
        self.run(caller, ActionKind::Grant, &[], idempotency_key, |txn| {
            actions::grant(txn, &amount, reason)
        })
        .await
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn pending_escrow(&self, player: PlayerId) -> Result<Vec<EscrowedReward>, EconomyError> {
        self.store.list_pending_escrow(player)
    }

    pub async fn cooldowns(&self, player: PlayerId) -> Result<Vec<Cooldown>, EconomyError> {
        let ledger = CooldownLedger::load(player, self.store.read_cooldowns(player)?);
        Ok(ledger.active(self.clock.now()))
    }

    pub async fn recent_outcomes(
        &self,
        player: PlayerId,
        limit: usize,
    ) -> Result<Vec<TransactionOutcome>, EconomyError> {
        self.store.recent_outcomes(player, limit)
    }

    /// Richest players first; ties go to the higher level, then the older account.
    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<PlayerSnapshot>, EconomyError> {
        let mut players = self.store.list_players()?;
        players.sort_by(|a, b| {
            b.wealth()
                .cmp(a.wealth())
                .then_with(|| b.balance().level().cmp(&a.balance().level()))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(players.iter().take(limit).map(PlayerAccount::snapshot).collect())
    }

    /// Current bail price for `player`, or `None` when not jailed.
    pub async fn bail_quote(&self, player: PlayerId) -> Result<Option<Wealth>, EconomyError> {
        let ledger = CooldownLedger::load(player, self.store.read_cooldowns(player)?);
        if ledger.jail_remaining(self.clock.now()).is_none() {
            return Ok(None);
        }
        let account = self.store.read_player(player)?;
        Ok(Some(rules::bail_cost(account.wealth(), &self.config.bail)))
    }
}
