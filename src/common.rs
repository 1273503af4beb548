//! Common types: configuration errors and small numeric helpers shared by
//! the odds tables.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Errors returned when constructing configurations or tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Dice need at least two faces.
    InvalidDiceFaceCount(usize),
    /// Each side must roll at least one die.
    InvalidDiceCount { attack: usize, defend: usize },
    /// Each side must commit at least one unit.
    InvalidUnitCount { attack: usize, defend: usize },
    /// The attacker's reserve must be smaller than its committed units.
    ReserveTooLarge { attack_unit_count: usize, stop_until: usize },
    /// Win-chance tables need an edge length above two.
    TableTooSmall(usize),
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::InvalidDiceFaceCount(n) => {
                write!(f, "Dice need at least 2 faces, got {}", n)
            }
            ConfigError::InvalidDiceCount { attack, defend } => write!(
                f,
                "Dice counts must be positive (attack={}, defend={})",
                attack, defend
            ),
            ConfigError::InvalidUnitCount { attack, defend } => write!(
                f,
                "Unit counts must be positive (attack={}, defend={})",
                attack, defend
            ),
            ConfigError::ReserveTooLarge {
                attack_unit_count,
                stop_until,
            } => write!(
                f,
                "Reserve of {} leaves no attackers out of {}",
                stop_until, attack_unit_count
            ),
            ConfigError::TableTooSmall(size) => {
                write!(f, "Win chance table size must exceed 2, got {}", size)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Lock a cache table. A panic while holding the lock leaves only
/// fully inserted entries behind, so a poisoned table is still usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sum of `values`, accumulated in order.
#[inline]
pub fn sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

/// Rescale `values` so they sum to `target`.
///
/// A non-positive target zeroes the slice. When the slice carries no mass
/// the target is spread uniformly.
pub fn normalize_sum(values: &mut [f64], target: f64) {
    if values.is_empty() {
        return;
    }
    if target <= 0.0 {
        values.iter_mut().for_each(|v| *v = 0.0);
        return;
    }
    let total = sum(values);
    if total <= 0.0 {
        let uniform = target / values.len() as f64;
        values.iter_mut().for_each(|v| *v = uniform);
        return;
    }
    let ratio = target / total;
    values.iter_mut().for_each(|v| *v *= ratio);
}

/// Index of the largest value, if any.
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, max)) if v <= max => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Clamp into the open interval (0, 1).
pub fn clamp01_exclusive(value: f64) -> f64 {
    if value >= 1.0 {
        1.0 - f64::EPSILON / 2.0
    } else if value <= 0.0 {
        f64::MIN_POSITIVE
    } else {
        value
    }
}

/// Inverse-CDF selection: the first index with positive mass whose running
/// total reaches `draw`. Falls back to the last index with positive mass.
pub fn select_outcome(chances: &[f64], draw: f64) -> Option<usize> {
    let mut running = 0.0;
    let mut last = None;
    for (i, &chance) in chances.iter().enumerate() {
        if chance <= 0.0 {
            continue;
        }
        running += chance;
        last = Some(i);
        if running >= draw {
            return Some(i);
        }
    }
    last
}
