//! Buff stacking.
//!
//! A purchased buff of higher tier than the running one replaces it with a fresh timer, the same
//! tier extends the running timer, and a lower tier is shelved. A shelved buff does nothing while
//! the stronger one runs; once that expires, the highest shelved tier takes over with its full
//! duration counted from the old expiry.

use chrono::{DateTime, Duration, Utc};

use crate::economy::types::{ActiveBuff, BuffEffect, BuffKind, PlayerAccount, ShelvedBuff};

/// Drop buffs whose timer has run out, promoting shelved buffs in their place.
///
/// Promotion chains: a shelved buff whose whole duration also lies before `now` is used up and the
/// next one is tried, so the shelf only ever holds buffs that still have time to give.
pub fn prune_expired(account: &mut PlayerAccount, now: DateTime<Utc>) {
    let mut idx = 0;
    while idx < account.buffs.len() {
        let kind = account.buffs[idx].kind;
        let mut expired_at = account.buffs[idx].expires_at;
        while expired_at <= now {
            let Some(next) = take_strongest_shelved(account, kind) else {
                break;
            };
            expired_at += Duration::seconds(next.duration_secs.max(0));
            let buff = &mut account.buffs[idx];
            buff.tier = next.tier;
            buff.expires_at = expired_at;
            log::debug!(
                "economy: promoted shelved {:?} tier {} for {} until {}",
                kind,
                next.tier,
                account.id,
                expired_at
            );
        }
        if expired_at <= now {
            account.buffs.remove(idx);
        } else {
            idx += 1;
        }
    }
    // A shelf without a running buff of its kind cannot be promoted later.
    let running: Vec<BuffKind> = account.buffs.iter().map(|b| b.kind).collect();
    account.shelved_buffs.retain(|s| running.contains(&s.kind));
}

fn take_strongest_shelved(account: &mut PlayerAccount, kind: BuffKind) -> Option<ShelvedBuff> {
    let idx = account
        .shelved_buffs
        .iter()
        .enumerate()
        .filter(|(_, s)| s.kind == kind)
        .max_by(|(ia, a), (ib, b)| a.tier.cmp(&b.tier).then(ib.cmp(ia)))
        .map(|(i, _)| i)?;
    Some(account.shelved_buffs.remove(idx))
}

pub fn apply_buff(
    account: &mut PlayerAccount,
    kind: BuffKind,
    tier: u8,
    duration_secs: i64,
    now: DateTime<Utc>,
) -> BuffEffect {
    prune_expired(account, now);
    let duration = Duration::seconds(duration_secs.max(0));

    let Some(idx) = account.buffs.iter().position(|b| b.kind == kind) else {
        let expires_at = now + duration;
        account.buffs.push(ActiveBuff {
            kind,
            tier,
            expires_at,
        });
        return BuffEffect::Activated { expires_at };
    };
    let active = &mut account.buffs[idx];

    if tier > active.tier {
        let from_tier = active.tier;
        active.tier = tier;
        active.expires_at = now + duration;
        BuffEffect::Upgraded {
            from_tier,
            expires_at: active.expires_at,
        }
    } else if tier == active.tier {
        active.expires_at += duration;
        BuffEffect::Extended {
            expires_at: active.expires_at,
        }
    } else {
        let active_tier = active.tier;
        account.shelved_buffs.push(ShelvedBuff {
            kind,
            tier,
            duration_secs,
            purchased_at: now,
        });
        BuffEffect::Shelved { active_tier }
    }
}

/// Tier of the running buff of `kind`, zero when none.
pub fn active_tier(account: &PlayerAccount, kind: BuffKind, now: DateTime<Utc>) -> u8 {
    account.active_buff(kind, now).map(|b| b.tier).unwrap_or(0)
}
