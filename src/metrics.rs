//! In-process counters for economy actions.
//! Applied outcomes are counted per action and outcome kind, rejections per action and error code.
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};

use serde::Serialize;

static COMMIT_RETRIES: AtomicU64 = AtomicU64::new(0);
static IDEMPOTENT_REPLAYS: AtomicU64 = AtomicU64::new(0);

static ACTION_COUNTERS: OnceLock<Mutex<BTreeMap<String, ActionCounter>>> = OnceLock::new();

pub fn inc_commit_retries() {
    COMMIT_RETRIES.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_idempotent_replays() {
    IDEMPOTENT_REPLAYS.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ActionCounter {
    pub applied: u64,
    pub rejected: u64,
    pub by_outcome: BTreeMap<String, u64>,
    pub by_error: BTreeMap<String, u64>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub commit_retries: u64,
    pub idempotent_replays: u64,
    pub actions: BTreeMap<String, ActionCounter>,
}

fn counters() -> MutexGuard<'static, BTreeMap<String, ActionCounter>> {
    ACTION_COUNTERS
        .get_or_init(|| Mutex::new(BTreeMap::new()))
        .lock()
        .unwrap_or_else(|p| p.into_inner())
}

pub fn record_outcome(action: &str, outcome: &str) -> ActionCounter {
    let mut guard = counters();
    let counter = guard.entry(action.to_string()).or_default();
    counter.applied = counter.applied.saturating_add(1);
    let slot = counter.by_outcome.entry(outcome.to_string()).or_default();
    *slot = slot.saturating_add(1);
    counter.clone()
}

pub fn record_rejection(action: &str, code: &str) -> ActionCounter {
    let mut guard = counters();
    let counter = guard.entry(action.to_string()).or_default();
    counter.rejected = counter.rejected.saturating_add(1);
    let slot = counter.by_error.entry(code.to_string()).or_default();
    *slot = slot.saturating_add(1);
    counter.clone()
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        commit_retries: COMMIT_RETRIES.load(Ordering::Relaxed),
        idempotent_replays: IDEMPOTENT_REPLAYS.load(Ordering::Relaxed),
        actions: counters().clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Counters are process-global, so each test uses its own action names.
    #[test]
    fn outcomes_and_rejections_are_tallied_separately() {
        let first = record_outcome("test_play", "win");
        assert_eq!(first.applied, 1);
        record_outcome("test_play", "bust");
        record_outcome("test_play", "win");
        let after = record_rejection("test_play", "on_cooldown");
        assert_eq!(after.applied, 3);
        assert_eq!(after.rejected, 1);
        assert_eq!(after.by_outcome.get("win"), Some(&2));
        assert_eq!(after.by_error.get("on_cooldown"), Some(&1));

        let snap = snapshot();
        assert_eq!(snap.actions.get("test_play"), Some(&after));
    }

    #[test]
    fn global_counters_only_grow() {
        let before = snapshot();
        inc_commit_retries();
        inc_idempotent_replays();
        let after = snapshot();
        assert!(after.commit_retries > before.commit_retries);
        assert!(after.idempotent_replays > before.idempotent_replays);
    }
}
