//! Weighted outcome tables and the random sources that drive them.
//!
//! A table is an ordered list of `(kind, base_weight)` pairs. Modifiers multiply the weight of
//! individual kinds before normalization, then a single uniform draw picks an entry from the
//! cumulative distribution. Every decision in a transaction takes its own draw.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::economy::errors::EconomyError;

/// Uniform random source. Implementations must return values in `[0, 1)`.
pub trait RandomSource: Send {
    fn next_unit(&mut self) -> f64;

    /// Uniform integer in `low..=high`.
    fn next_in_range(&mut self, low: u64, high: u64) -> u64 {
        if high <= low {
            return low;
        }
        let span = (high - low) as f64 + 1.0;
        let offset = (self.next_unit() * span).floor() as u64;
        low + offset.min(high - low)
    }
}

/// Entropy-seeded source for production.
pub struct SystemRandom(StdRng);

impl SystemRandom {
    pub fn new() -> Self {
        Self(StdRng::from_entropy())
    }
}

impl Default for SystemRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for SystemRandom {
    fn next_unit(&mut self) -> f64 {
        self.0.gen::<f64>()
    }
}

/// Reproducible stream for simulations and statistical tests.
pub struct SeededRandom(ChaCha8Rng);

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self(ChaCha8Rng::seed_from_u64(seed))
    }
}

impl RandomSource for SeededRandom {
    fn next_unit(&mut self) -> f64 {
        self.0.gen::<f64>()
    }
}

/// Replays a fixed list of draws, then repeats `fallback` forever.
#[derive(Debug, Clone)]
pub struct ScriptedRandom {
    values: VecDeque<f64>,
    fallback: f64,
}

impl ScriptedRandom {
    pub fn new(values: impl IntoIterator<Item = f64>, fallback: f64) -> Self {
        Self {
            values: values.into_iter().map(clamp_unit).collect(),
            fallback: clamp_unit(fallback),
        }
    }

    pub fn always(value: f64) -> Self {
        Self::new(Vec::new(), value)
    }
}

impl RandomSource for ScriptedRandom {
    fn next_unit(&mut self) -> f64 {
        self.values.pop_front().unwrap_or(self.fallback)
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0 - f64::EPSILON)
    }
}

#[derive(Debug, Clone)]
pub struct OutcomeTable<K> {
    entries: Vec<(K, f64)>,
}

impl<K: Copy + PartialEq> OutcomeTable<K> {
    pub fn new(entries: Vec<(K, f64)>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[(K, f64)] {
        &self.entries
    }
}

/// Multiplicative weight adjustments keyed by outcome kind.
#[derive(Debug, Clone)]
pub struct ModifierSet<K> {
    factors: Vec<(K, f64)>,
}

impl<K: Copy + PartialEq> Default for ModifierSet<K> {
    fn default() -> Self {
        Self {
            factors: Vec::new(),
        }
    }
}

impl<K: Copy + PartialEq> ModifierSet<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scale(mut self, kind: K, factor: f64) -> Self {
        self.factors.push((kind, factor));
        self
    }

    pub fn push(&mut self, kind: K, factor: f64) {
        self.factors.push((kind, factor));
    }

    pub fn factor_for(&self, kind: K) -> f64 {
        self.factors
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, f)| *f)
            .product()
    }
}

/// Normalized probabilities after modifiers. Useful for display and tests.
pub fn effective_weights<K: Copy + PartialEq>(
    table: &OutcomeTable<K>,
    modifiers: &ModifierSet<K>,
) -> Result<Vec<(K, f64)>, EconomyError> {
    let mut weights = Vec::with_capacity(table.entries.len());
    for (kind, base) in &table.entries {
        let w = base * modifiers.factor_for(*kind);
        if !w.is_finite() || w < 0.0 {
            return Err(EconomyError::InvalidArgument(format!(
                "outcome weight must be finite and non-negative, got {}",
                w
            )));
        }
        weights.push((*kind, w));
    }
    let total: f64 = weights.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return Err(EconomyError::InvalidArgument(
            "outcome table has no positive weight".to_string(),
        ));
    }
    Ok(weights.into_iter().map(|(k, w)| (k, w / total)).collect())
}

/// Draw one outcome from `table` after applying `modifiers`.
pub fn resolve<K: Copy + PartialEq>(
    table: &OutcomeTable<K>,
    modifiers: &ModifierSet<K>,
    rng: &mut dyn RandomSource,
) -> Result<K, EconomyError> {
    let weights = effective_weights(table, modifiers)?;
    let roll = rng.next_unit();
    let mut cumulative = 0.0;
    let mut last_positive = None;
    for (kind, p) in &weights {
        if *p <= 0.0 {
            continue;
        }
        cumulative += p;
        last_positive = Some(*kind);
        if roll < cumulative {
            return Ok(*kind);
        }
    }
    // Rounding can leave the cumulative sum a hair under 1.0.
    last_positive.ok_or_else(|| EconomyError::Internal("empty outcome table".to_string()))
}
