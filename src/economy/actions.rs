//! Action resolvers.
//!
//! Each resolver runs inside a [`Txn`] that already holds the locks of every player it touches.
//! It checks preconditions, draws outcomes, applies deltas through the `Txn` and records exactly
//! one outcome. Returning an error discards everything the resolver did.
//!
//! Random draws happen in a fixed order per action so scripted sources can pin results:
//!
//! - play: outcome, then payout on a win or the jail roll on a bust
//! - rob: outcome, then steal share on success or the jail roll on failure
//! - crates, per crate: rarity, then the item roll when the tier has items, then the item pick
//!   or the coin amount
//! - reroll: one draw per offer slot

use std::collections::BTreeMap;

use chrono::Duration;
use uuid::Uuid;

use crate::config::{CatalogEntry, EconomyConfig};
use crate::economy::buffs;
use crate::economy::errors::EconomyError;
use crate::economy::escrow;
use crate::economy::inventory;
use crate::economy::mutator::Txn;
use crate::economy::probability::{resolve, ModifierSet, OutcomeTable, RandomSource};
use crate::economy::rules;
use crate::economy::shop;
use crate::economy::types::{
    ActionKind, BatchStop, BuffKind, EscrowedReward, OutcomeDetails, OutcomeKind, PlayerId,
    PlayerShop, Reward, Wealth,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayRoll {
    Win,
    Bust,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobRoll {
    Success,
    Failure,
}

pub fn play_table(config: &EconomyConfig) -> OutcomeTable<PlayRoll> {
    OutcomeTable::new(vec![
        (PlayRoll::Win, config.play.win_weight),
        (PlayRoll::Bust, config.play.bust_weight),
    ])
}

pub fn rob_table(config: &EconomyConfig) -> OutcomeTable<RobRoll> {
    OutcomeTable::new(vec![
        (RobRoll::Success, config.rob.success_weight),
        (RobRoll::Failure, config.rob.failure_weight),
    ])
}

fn ensure_free(txn: &mut Txn<'_>, player: PlayerId, action: ActionKind) -> Result<(), EconomyError> {
    let now = txn.now();
    let ledger = txn.ledger(player)?;
    ledger.ensure_not_jailed(now)?;
    ledger.ensure_ready(action, now)
}

pub fn play(
    config: &EconomyConfig,
    txn: &mut Txn<'_>,
    rng: &mut dyn RandomSource,
    use_token: bool,
    territory_pct: u32,
) -> Result<(), EconomyError> {
    let now = txn.now();
    let actor = txn.actor();
    let play = &config.play;
    ensure_free(txn, actor, ActionKind::Play)?;

    let account = txn.account(actor)?;
    if use_token && account.tokens.tokens == 0 {
        return Err(EconomyError::NoTokens);
    }
    let level = account.balance().level();
    let luck = buffs::active_tier(account, BuffKind::Luck, now) as u32;
    let mut modifiers = ModifierSet::new();
    modifiers.push(PlayRoll::Win, rules::pct_factor(luck * play.luck_per_tier_pct));
    modifiers.push(
        PlayRoll::Win,
        rules::pct_factor(rules::status_bonus_pct(&config.status, account.status_tier)),
    );
    modifiers.push(PlayRoll::Win, rules::pct_factor(territory_pct));

    let roll = resolve(&play_table(config), &modifiers, rng)?;
    if use_token {
        let tokens = &mut txn.account_mut(actor)?.tokens;
        tokens.tokens -= 1;
    }

    let (kind, xp, jailed_until) = match roll {
        PlayRoll::Win => {
            let base = rng
                .next_in_range(play.win_min, play.win_max)
                .saturating_add(play.win_per_level.saturating_mul(level.saturating_sub(1) as u64));
            let mut amount = Wealth::from(base);
            let mut xp = play.win_xp;
            if use_token {
                amount = rules::scale_pct(&amount, play.token_multiplier_pct);
                xp = xp.saturating_add(play.token_xp_bonus);
            }
            txn.credit(actor, &amount)?;
            (OutcomeKind::Win, xp, None)
        }
        PlayRoll::Bust => {
            let loss = rules::scale_bps(txn.account(actor)?.wealth(), play.bust_loss_bps);
            txn.debit(actor, &loss)?;
            let jailed_until = if rng.next_unit() < play.bust_jail_chance {
                Some(txn.ledger(actor)?.set(
                    ActionKind::Jail,
                    Duration::seconds(play.bust_jail_secs),
                    now,
                ))
            } else {
                None
            };
            (OutcomeKind::Bust, play.bust_xp, jailed_until)
        }
    };

    let levels_gained = txn.add_xp(actor, xp)?;
    txn.ledger(actor)?
        .set(ActionKind::Play, Duration::seconds(play.cooldown_secs), now);
    txn.record(
        kind,
        OutcomeDetails::Play {
            used_token: use_token,
            xp_gained: xp,
            levels_gained,
            jailed_until,
        },
    );
    Ok(())
}

pub fn rob(
    config: &EconomyConfig,
    txn: &mut Txn<'_>,
    rng: &mut dyn RandomSource,
    defender: PlayerId,
    territory_pct: u32,
) -> Result<(), EconomyError> {
    let now = txn.now();
    let attacker = txn.actor();
    let rob = &config.rob;
    if attacker == defender {
        return Err(EconomyError::InvalidArgument("cannot rob yourself".to_string()));
    }
    ensure_free(txn, attacker, ActionKind::Rob)?;

    let target = txn.account(defender)?;
    if target.wealth() < &Wealth::from(rob.min_target_wealth) {
        return Err(EconomyError::InvalidArgument(format!(
            "{} has too little to be worth robbing",
            target.display_name
        )));
    }
    let guard = buffs::active_tier(target, BuffKind::Guard, now) as u32;
    let defense = rob
        .base_defense
        .saturating_add(target.equipped_defense())
        .saturating_add(guard.saturating_mul(rob.guard_per_tier));

    let robber = txn.account(attacker)?;
    let offense = rob.base_offense.saturating_add(robber.equipped_attack());
    let stealth = buffs::active_tier(robber, BuffKind::Stealth, now) as u32;
    let attacker_level = robber.balance().level();

    let mut modifiers = ModifierSet::new();
    modifiers.push(RobRoll::Success, rules::rob_odds_factor(offense, defense));
    modifiers.push(RobRoll::Success, rules::pct_factor(stealth * rob.stealth_per_tier_pct));
    modifiers.push(RobRoll::Success, rules::pct_factor(territory_pct));

    let (kind, details) = match resolve(&rob_table(config), &modifiers, rng)? {
        RobRoll::Success => {
            let bps = rng.next_in_range(rob.min_steal_bps as u64, rob.max_steal_bps as u64) as u32;
            let mut amount = rules::scale_bps(txn.account(defender)?.wealth(), bps);
            if let Some(cap) = rob.max_steal {
                amount = amount.min(Wealth::from(cap));
            }
            txn.transfer(defender, attacker, &amount)?;
            txn.add_xp(attacker, rob.success_xp)?;
            (
                OutcomeKind::RobSuccess,
                OutcomeDetails::Rob {
                    amount,
                    hp_lost: 0,
                    jailed_until: None,
                },
            )
        }
        RobRoll::Failure => {
            let fine = rules::scale_bps(txn.account(attacker)?.wealth(), rob.fail_fine_bps);
            txn.transfer(attacker, defender, &fine)?;
            let hp_before = txn.account(attacker)?.balance().hp();
            let hp_after = txn.damage(attacker, rob.fail_hp_damage)?;
            let caught = rng.next_unit() < rob.fail_jail_chance;
            let jailed_until = if caught || hp_after == 0 {
                let secs = rules::rob_jail_secs(rob, attacker_level);
                Some(txn.ledger(attacker)?.set(ActionKind::Jail, Duration::seconds(secs), now))
            } else {
                None
            };
            (
                OutcomeKind::RobFailure,
                OutcomeDetails::Rob {
                    amount: fine,
                    hp_lost: hp_before - hp_after,
                    jailed_until,
                },
            )
        }
    };

    txn.ledger(attacker)?
        .set(ActionKind::Rob, Duration::seconds(rob.cooldown_secs), now);
    txn.record_against(defender, kind, details);
    Ok(())
}

pub fn bail(config: &EconomyConfig, txn: &mut Txn<'_>) -> Result<(), EconomyError> {
    let now = txn.now();
    let actor = txn.actor();
    if txn.ledger(actor)?.jail_remaining(now).is_none() {
        return Err(EconomyError::NotJailed);
    }
    let cost = rules::bail_cost(txn.account(actor)?.wealth(), &config.bail);
    txn.debit(actor, &cost)?;
    txn.ledger(actor)?.clear(ActionKind::Jail);
    txn.restore_hp(actor)?;
    txn.record(OutcomeKind::Bailed, OutcomeDetails::Bail { cost });
    Ok(())
}

pub fn reroll_shop(
    config: &EconomyConfig,
    txn: &mut Txn<'_>,
    rng: &mut dyn RandomSource,
) -> Result<(), EconomyError> {
    let now = txn.now();
    let actor = txn.actor();
    txn.ledger(actor)?.ensure_ready(ActionKind::ShopReroll, now)?;
    let offers = shop::roll_offers(&config.shop.catalog, config.shop.offer_slots, rng)?;
    txn.account_mut(actor)?.shop = PlayerShop {
        offers: offers.clone(),
        rolled_at: Some(now),
    };
    txn.ledger(actor)?.set(
        ActionKind::ShopReroll,
        Duration::seconds(config.shop.reroll_cooldown_secs),
        now,
    );
    txn.record(OutcomeKind::Rerolled, OutcomeDetails::Reroll { offers });
    Ok(())
}

pub fn claim_mission(config: &EconomyConfig, txn: &mut Txn<'_>) -> Result<(), EconomyError> {
    let now = txn.now();
    let actor = txn.actor();
    let mission = &config.mission;
    txn.ledger(actor)?.ensure_ready(ActionKind::MissionClaim, now)?;
    let coins = Wealth::from(mission.reward_coins);
    txn.credit(actor, &coins)?;
    txn.add_xp(actor, mission.reward_xp)?;
    let account = txn.account_mut(actor)?;
    account.crates = account.crates.saturating_add(mission.reward_crates);
    txn.ledger(actor)?.set(
        ActionKind::MissionClaim,
        Duration::seconds(mission.cooldown_secs),
        now,
    );
    txn.record(
        OutcomeKind::MissionClaimed,
        OutcomeDetails::Mission {
            coins,
            xp: mission.reward_xp,
            crates: mission.reward_crates,
        },
    );
    Ok(())
}

/// Open up to `count` crates. Every reward goes to escrow; the batch stops early (and says so)
/// when fewer crates are available than requested.
pub fn open_crates(
    config: &EconomyConfig,
    txn: &mut Txn<'_>,
    rng: &mut dyn RandomSource,
    count: u32,
) -> Result<(), EconomyError> {
    let now = txn.now();
    let actor = txn.actor();
    let crates = &config.crates;
    if count == 0 || count > crates.max_batch {
        return Err(EconomyError::InvalidArgument(format!(
            "crate count must be between 1 and {}",
            crates.max_batch
        )));
    }
    let available = txn.account(actor)?.crates;
    if available == 0 {
        return Err(EconomyError::NoCratesAvailable);
    }
    let opened = count.min(available);
    let stop = (count > available).then_some(BatchStop::InsufficientCrates);

    let table = OutcomeTable::new(
        crates
            .tiers
            .iter()
            .enumerate()
            .map(|(idx, tier)| (idx, tier.weight))
            .collect(),
    );
    let modifiers = ModifierSet::new();
    let mut escrow_ids = Vec::with_capacity(opened as usize);
    let mut by_rarity = BTreeMap::new();
    let mut coins_total = Wealth::default();

    for _ in 0..opened {
        let tier = &crates.tiers[resolve(&table, &modifiers, rng)?];
        let item_drop = !tier.items.is_empty() && rng.next_unit() < tier.item_chance;
        let reward = if item_drop {
            let pick = rng.next_in_range(0, (tier.items.len() - 1) as u64) as usize;
            let loot = &tier.items[pick];
            Reward::Item {
                item: inventory::new_item(
                    &loot.item_id,
                    &loot.name,
                    tier.rarity,
                    loot.attack,
                    loot.defense,
                    now,
                ),
            }
        } else {
            let amount = Wealth::from(rng.next_in_range(tier.coins_min, tier.coins_max));
            coins_total += &amount;
            Reward::Coins { amount }
        };
        escrow_ids.push(txn.deposit(actor, reward));
        *by_rarity.entry(tier.rarity).or_insert(0u32) += 1;
    }

    txn.account_mut(actor)?.crates -= opened;
    txn.record(
        OutcomeKind::CratesOpened,
        OutcomeDetails::Crates {
            requested: count,
            opened,
            escrow_ids,
            by_rarity,
            coins_total,
            stop,
        },
    );
    Ok(())
}

pub fn convert_tokens(config: &EconomyConfig, txn: &mut Txn<'_>) -> Result<(), EconomyError> {
    let tokens = &config.tokens;
    let actor = txn.actor();
    let day = rules::local_day(txn.now(), tokens.day_offset_minutes);
    let done_today = txn.account(actor)?.tokens.conversions_on(day);
    if done_today >= tokens.daily_cap {
        return Err(EconomyError::ConversionCapReached {
            cap: tokens.daily_cap,
        });
    }
    let cost = rules::token_cost(tokens, done_today);
    txn.debit(actor, &cost)?;

    let balance = &mut txn.account_mut(actor)?.tokens;
    balance.tokens = balance.tokens.saturating_add(tokens.tokens_per_conversion);
    balance.conversion_day = Some(day);
    balance.daily_conversion_count = done_today + 1;

    txn.record(
        OutcomeKind::TokensConverted,
        OutcomeDetails::Conversion {
            cost,
            tokens_credited: tokens.tokens_per_conversion,
            conversions_today: done_today + 1,
        },
    );
    Ok(())
}

fn buy(
    config: &EconomyConfig,
    txn: &mut Txn<'_>,
    entry: &CatalogEntry,
) -> Result<(), EconomyError> {
    let actor = txn.actor();
    let price = Wealth::from(entry.price);
    txn.debit(actor, &price)?;
    let delivery = shop::deliver(txn, actor, entry, &config.shop)?;
    txn.record(
        OutcomeKind::Purchased,
        OutcomeDetails::Purchase {
            entry_id: entry.id.clone(),
            price,
            delivery,
        },
    );
    Ok(())
}

/// Buy one of the player's current offers. A shop that was never stocked is rolled first.
pub fn purchase(
    config: &EconomyConfig,
    txn: &mut Txn<'_>,
    rng: &mut dyn RandomSource,
    entry_id: &str,
) -> Result<(), EconomyError> {
    let now = txn.now();
    let actor = txn.actor();
    if txn.account(actor)?.shop.rolled_at.is_none() {
        let offers = shop::roll_offers(&config.shop.catalog, config.shop.offer_slots, rng)?;
        txn.account_mut(actor)?.shop = PlayerShop {
            offers,
            rolled_at: Some(now),
        };
    }
    shop::take_offer(&mut txn.account_mut(actor)?.shop, entry_id)?;
    let entry = config
        .shop
        .catalog_entry(entry_id)
        .ok_or_else(|| EconomyError::NotFound(format!("catalog entry {}", entry_id)))?;
    buy(config, txn, entry)
}

pub fn purchase_supply(
    config: &EconomyConfig,
    txn: &mut Txn<'_>,
    entry_id: &str,
) -> Result<(), EconomyError> {
    let entry = config
        .shop
        .supply_entry(entry_id)
        .ok_or_else(|| EconomyError::NotFound(format!("supply {}", entry_id)))?;
    buy(config, txn, entry)
}

pub fn claim_escrow(
    config: &EconomyConfig,
    txn: &mut Txn<'_>,
    record: EscrowedReward,
) -> Result<(), EconomyError> {
    let actor = txn.actor();
    escrow::check_claim(&record, actor)?;
    match &record.reward {
        Reward::Coins { amount } => txn.credit(actor, amount)?,
        Reward::Tokens { amount } => {
            let tokens = &mut txn.account_mut(actor)?.tokens;
            tokens.tokens = tokens.tokens.saturating_add(*amount);
        }
        Reward::Crates { count } => {
            let account = txn.account_mut(actor)?;
            account.crates = account.crates.saturating_add(*count);
        }
        Reward::Item { item } => {
            let account = txn.account_mut(actor)?;
            inventory::add_item(account, item.clone(), config.shop.inventory_capacity)?;
        }
    }
    let escrow_id = record.id;
    let reward = record.reward.clone();
    txn.claim(record);
    txn.record(
        OutcomeKind::RewardClaimed,
        OutcomeDetails::Claim { escrow_id, reward },
    );
    Ok(())
}

pub fn equip(
    config: &EconomyConfig,
    txn: &mut Txn<'_>,
    instance_id: Uuid,
    equipped: bool,
) -> Result<(), EconomyError> {
    let actor = txn.actor();
    let account = txn.account_mut(actor)?;
    inventory::set_equipped(account, instance_id, equipped, config.shop.max_equipped)?;
    txn.record(
        OutcomeKind::Equipped,
        OutcomeDetails::Equip {
            instance_id,
            equipped,
        },
    );
    Ok(())
}

pub fn grant(txn: &mut Txn<'_>, amount: &Wealth, reason: &str) -> Result<(), EconomyError> {
    let actor = txn.actor();
    txn.credit(actor, amount)?;
    txn.record(
        OutcomeKind::Granted,
        OutcomeDetails::Grant {
            reason: reason.to_string(),
        },
    );
    Ok(())
}
