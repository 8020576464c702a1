//! Pure economy formulas. Everything here is a deterministic function of its inputs; no clocks,
//! no randomness, no storage.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use num_bigint::BigUint;

use crate::config::{BailConfig, PlayerConfig, RobConfig, StatusConfig, TokenConfig};
use crate::economy::types::{StatusTier, Wealth};

const BPS_DENOMINATOR: u32 = 10_000;

/// Experience needed to reach `level`. Level 1 starts at zero.
pub fn xp_for_level(curve: u64, level: u32) -> u64 {
    let n = level.max(1) as u64;
    curve.saturating_mul(n).saturating_mul(n - 1)
}

/// Highest level whose threshold `xp` has reached, capped at `max_level`.
pub fn level_for_xp(curve: u64, max_level: u32, xp: u64) -> u32 {
    let mut level = 1;
    while level < max_level && xp_for_level(curve, level + 1) <= xp {
        level += 1;
    }
    level
}

pub fn max_hp(config: &PlayerConfig, level: u32) -> u32 {
    config
        .base_hp
        .saturating_add(config.hp_per_level.saturating_mul(level.saturating_sub(1)))
}

/// `amount * bps / 10_000`, rounded down.
pub fn scale_bps(amount: &Wealth, bps: u32) -> Wealth {
    amount * bps / BPS_DENOMINATOR
}

/// `amount * pct / 100`, rounded down.
pub fn scale_pct(amount: &Wealth, pct: u32) -> Wealth {
    amount * pct / 100u32
}

/// Bail is a share of current wealth with a floor.
pub fn bail_cost(wealth: &Wealth, config: &BailConfig) -> Wealth {
    let scaled = scale_bps(wealth, config.cost_bps);
    let floor = BigUint::from(config.min_cost);
    if scaled > floor {
        scaled
    } else {
        floor
    }
}

/// Cost of the next conversion after `conversions_today` earlier ones:
/// `base_cost * (num / den) ^ conversions_today`, rounded down.
pub fn token_cost(config: &TokenConfig, conversions_today: u32) -> Wealth {
    let base = BigUint::from(config.base_cost);
    let num = BigUint::from(config.growth_numerator).pow(conversions_today);
    let den = BigUint::from(config.growth_denominator.max(1)).pow(conversions_today);
    base * num / den
}

/// Jail time for a failed robbery grows with the attacker's level up to a ceiling.
pub fn rob_jail_secs(config: &RobConfig, attacker_level: u32) -> i64 {
    let extra = config
        .jail_per_level_secs
        .saturating_mul(attacker_level.saturating_sub(1) as i64);
    config
        .jail_base_secs
        .saturating_add(extra)
        .min(config.jail_max_secs)
}

/// Multiplier on the rob success weight from the offense/defense ratio.
pub fn rob_odds_factor(offense: u32, defense: u32) -> f64 {
    let defense = defense.max(1) as f64;
    (offense as f64 / defense).clamp(0.25, 4.0)
}

/// `1 + pct / 100` as a weight multiplier.
pub fn pct_factor(pct: u32) -> f64 {
    1.0 + pct as f64 / 100.0
}

pub fn status_bonus_pct(config: &StatusConfig, tier: StatusTier) -> u32 {
    match tier {
        StatusTier::Regular => 0,
        StatusTier::Subscriber => config.subscriber_bonus_pct,
        StatusTier::Vip => config.vip_bonus_pct,
    }
}

/// Calendar day at the configured offset from UTC; the conversion counter resets when it changes.
pub fn local_day(now: DateTime<Utc>, offset_minutes: i32) -> NaiveDate {
    match FixedOffset::east_opt(offset_minutes.saturating_mul(60)) {
        Some(offset) => now.with_timezone(&offset).date_naive(),
        None => now.date_naive(),
    }
}
