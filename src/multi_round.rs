//! Loss distributions after many rounds of one round configuration.
//!
//! Round `n` is stored as a window over the `n`-fold convolution of the
//! single-round distribution; outcomes whose cumulative mass at either end
//! stays under [`ODDS_CUTOFF`] are dropped. Past [`MAX_EXACT_ROUNDS`] the
//! distribution is approximated by a Gaussian with the per-round mean and
//! variance.
//!
//! Loss counts are signed throughout: the window arithmetic routinely steps
//! past zero before bounds are applied.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::{Arc, Mutex};

use log::{debug, trace};

use crate::caches::OddsCaches;
use crate::common::lock;
use crate::config::{RoundConfig, MAX_EXACT_ROUNDS, ODDS_CUTOFF};

/// A partial loss distribution: `outcome_chances[i]` belongs to loss
/// `initial_loss` shifted by `i` steps.
///
/// In the results of [`MultiRoundCacheInfo::fixed_attacker_loss`] and
/// [`MultiRoundCacheInfo::fixed_defender_loss`] each step moves the other
/// side's loss by the challenge count. Inside the round table each step is
/// one fewer attacker loss and one more defender loss. The chances need not
/// sum to one.
#[derive(Clone, Debug, PartialEq)]
pub struct MultiRoundLossInfo {
    pub initial_loss: i64,
    pub outcome_chances: Vec<f64>,
}

impl MultiRoundLossInfo {
    pub fn new(initial_loss: i64, outcome_chances: Vec<f64>) -> Self {
        Self {
            initial_loss,
            outcome_chances,
        }
    }

    fn len(&self) -> i64 {
        self.outcome_chances.len() as i64
    }
}

/// Round-indexed loss windows for one round configuration.
#[derive(Debug)]
pub struct MultiRoundCacheInfo {
    round_config: RoundConfig,
    round_chances: Vec<f64>,
    challenge_count: i64,
    // index n: attacker losses after n rounds
    losses: Vec<MultiRoundLossInfo>,
    round_mean: f64,
    round_var: f64,
    log_cutoff: f64,
}

impl MultiRoundCacheInfo {
    /// Start a table from a calculated single-round distribution.
    pub fn new(round_config: RoundConfig, round_chances: &[f64]) -> Self {
        let mut mean = 0.0;
        let mut squares_mean = 0.0;
        for (i, &p) in round_chances.iter().enumerate().skip(1) {
            let i = i as f64;
            mean += i * p;
            squares_mean += i * i * p;
        }
        let var = squares_mean - mean * mean;

        Self {
            round_config,
            round_chances: round_chances.to_vec(),
            challenge_count: round_config.challenge_count() as i64,
            losses: vec![MultiRoundLossInfo::new(0, vec![1.0])],
            round_mean: mean,
            round_var: var,
            log_cutoff: -libm::log(2.0 * ODDS_CUTOFF * ODDS_CUTOFF * PI * var),
        }
    }

    pub fn round_config(&self) -> RoundConfig {
        self.round_config
    }

    /// Expected attacker losses per round.
    pub fn round_mean(&self) -> f64 {
        self.round_mean
    }

    pub fn round_variance(&self) -> f64 {
        self.round_var
    }

    /// Windows computed so far; index `n` holds the losses after `n` rounds.
    pub fn losses(&self) -> &[MultiRoundLossInfo] {
        &self.losses
    }

    fn chance(&self, losses: usize) -> f64 {
        self.round_chances[losses]
    }

    fn next_losses(&self, last: &MultiRoundLossInfo) -> MultiRoundLossInfo {
        let cc = self.challenge_count;
        let prev = &last.outcome_chances;
        let prev_at = |j: i64| -> f64 {
            if j < 0 {
                0.0
            } else {
                prev.get(j as usize).copied().unwrap_or(0.0)
            }
        };

        // fewest attacker losses still above the cutoff
        let mut initial_increase = 0;
        while initial_increase < cc {
            let start_odds: f64 = (0..=initial_increase)
                .map(|i| prev_at(initial_increase - i) * self.chance(i as usize))
                .sum();
            if start_odds > ODDS_CUTOFF {
                break;
            }
            initial_increase += 1;
        }

        // fewest defender losses still above the cutoff
        let mut final_increase = cc;
        let last_index = last.len() - 1;
        while final_increase > 0 {
            let end_odds: f64 = (final_increase..=cc)
                .map(|i| prev_at(last_index + final_increase - i) * self.chance(i as usize))
                .sum();
            if end_odds > ODDS_CUTOFF {
                break;
            }
            final_increase -= 1;
        }

        let len = (last.len() - initial_increase + final_increase).max(0) as usize;
        let mut outcomes = vec![0.0; len];
        for (i, outcome) in outcomes.iter_mut().enumerate() {
            for a in 0..=cc {
                let j = i as i64 - a + initial_increase;
                if j >= last.len() {
                    continue;
                }
                if j < 0 {
                    break;
                }
                *outcome += prev[j as usize] * self.chance(a as usize);
            }
        }

        MultiRoundLossInfo::new(last.initial_loss + initial_increase, outcomes)
    }

    /// Whether round `round` holds an outcome with losses strictly below both
    /// limits.
    fn can_cover_losses(&self, round: usize, attacker_loss: i64, defender_loss: i64) -> bool {
        let round_losses = round as i64 * self.challenge_count;
        if round_losses > attacker_loss + defender_loss - 2 {
            return false;
        }
        let info = &self.losses[round];
        if info.initial_loss >= attacker_loss {
            return false;
        }
        round_losses - info.initial_loss - info.len() + 1 < defender_loss
    }

    /// Round at which the Gaussian odds of `loss` equal the cutoff. `which`
    /// of 1 picks the later crossing, -1 the earlier one.
    fn gaussian_loss_round(&self, loss: i64, is_attacker: bool, which: f64) -> f64 {
        let loss_mean = if is_attacker {
            self.round_mean
        } else {
            self.challenge_count as f64 - self.round_mean
        };
        let loss = loss as f64;
        let mut round = loss / loss_mean;
        let b = 2.0 * loss * loss_mean;
        let scale = 0.5 / (loss_mean * loss_mean);
        for _ in 0..2 {
            let d = (self.log_cutoff - libm::log(round)) * self.round_var;
            round = scale * (b + d + which * libm::sqrt(d * (2.0 * b + d)));
        }
        round
    }

    fn last_relevant_gaussian_round(&self, attacker_loss: i64, defender_loss: i64) -> i64 {
        let round = self
            .gaussian_loss_round(attacker_loss, true, 1.0)
            .min(self.gaussian_loss_round(defender_loss, false, 1.0));
        ((round + 1.0) as i64).min((attacker_loss + defender_loss - 2) / self.challenge_count)
    }

    /// Last round where [`Self::can_cover_losses`] holds, extending the
    /// table as needed up to the exact round limit.
    fn last_relevant_round(&mut self, attacker_loss: i64, defender_loss: i64) -> i64 {
        let mut round = -1;
        while self.can_cover_losses(self.losses.len() - 1, attacker_loss, defender_loss) {
            if self.losses.len() > MAX_EXACT_ROUNDS {
                trace!(
                    "gaussian fallback for losses {}/{} past {} rounds",
                    attacker_loss,
                    defender_loss,
                    MAX_EXACT_ROUNDS
                );
                return self.last_relevant_gaussian_round(attacker_loss, defender_loss);
            }
            round = self.losses.len() as i64 - 1;
            let next = self.next_losses(&self.losses[self.losses.len() - 1]);
            self.losses.push(next);
        }
        if round >= 0 {
            return round;
        }

        let mut bottom = 0;
        let mut top = self.losses.len() - 1;
        while top > bottom + 1 {
            let middle = (top + bottom) / 2;
            if self.can_cover_losses(middle, attacker_loss, defender_loss) {
                bottom = middle;
            } else {
                top = middle;
            }
        }
        bottom as i64
    }

    fn gaussian_density(mean: f64, var: f64) -> impl Fn(f64) -> f64 {
        let scale = libm::pow(2.0 * var * PI, -0.5);
        let exp_scale = -0.5 / var;
        move |x| {
            let deviation = mean - x;
            scale * libm::exp(exp_scale * deviation * deviation)
        }
    }

    /// Defender losses seen when rolling stops at the first round where
    /// attacker losses reach `attacker_loss`. Entry `i` covers a final
    /// attacker loss of `attacker_loss + i`; its chances start at the latest
    /// relevant round and step back one round per index.
    ///
    /// Rolling also stops once defender losses reach `defender_loss`; a round
    /// where both limits are reached together is included.
    pub fn fixed_attacker_loss(&mut self, attacker_loss: i64, defender_loss: i64) -> Vec<MultiRoundLossInfo> {
        let cc = self.challenge_count;
        let last_round = self.last_relevant_round(attacker_loss, defender_loss);
        if last_round < 0 {
            return Vec::new();
        }
        let last_cached = last_round.min(MAX_EXACT_ROUNDS as i64);
        let max_loss_of = |info: &MultiRoundLossInfo| info.initial_loss + info.len() - 1;

        let first_round = if max_loss_of(&self.losses[last_cached as usize]) + cc < attacker_loss {
            if last_round == last_cached {
                return Vec::new();
            }
            let first = self.gaussian_loss_round(attacker_loss - cc - 1, true, -1.0) as i64;
            if first > last_round {
                return Vec::new();
            }
            first.max(0)
        } else {
            let mut bottom = -1;
            let mut first = last_cached;
            while first > bottom + 1 {
                let middle = (first + bottom) / 2;
                if max_loss_of(&self.losses[middle as usize]) + cc < attacker_loss {
                    bottom = middle;
                } else {
                    first = middle;
                }
            }
            first
        };

        let width = (last_round - first_round + 1) as usize;
        let base_initial = (last_round + 1) * cc - attacker_loss;
        let mut result: Vec<MultiRoundLossInfo> = (0..cc)
            .map(|a| MultiRoundLossInfo::new(base_initial - a, vec![0.0; width]))
            .collect();

        for round in first_round..=last_cached {
            let info = &self.losses[round as usize];
            let offset = attacker_loss - info.initial_loss;
            let start = 1i64.max(offset - info.len() + 1);
            let end = cc
                .min(offset)
                .min(defender_loss + offset + info.initial_loss - round * cc - 1);
            for a in start..=end {
                let chance = info.outcome_chances[(offset - a) as usize];
                for i in a..=cc {
                    result[(i - a) as usize].outcome_chances[(last_round - round) as usize] +=
                        self.chance(i as usize) * chance;
                }
            }
        }

        for round in first_round.max(last_cached + 1)..=last_round {
            let density = Self::gaussian_density(
                attacker_loss as f64 - self.round_mean * round as f64,
                self.round_var * round as f64,
            );
            let end = cc.min(defender_loss + attacker_loss - round * cc - 1);
            for a in 1..=end {
                let chance = density(a as f64);
                if chance < ODDS_CUTOFF {
                    continue;
                }
                for i in a..=cc {
                    result[(i - a) as usize].outcome_chances[(last_round - round) as usize] +=
                        self.chance(i as usize) * chance;
                }
            }
        }

        result
    }

    /// Attacker losses seen when rolling stops at the first round where
    /// defender losses reach `defender_loss`. Entry `i` covers a final
    /// defender loss of `defender_loss + i`; its chances start at the
    /// earliest relevant round and step forward one round per index.
    ///
    /// Rolling also stops once attacker losses reach `attacker_loss`; a round
    /// where both limits are reached together is included.
    pub fn fixed_defender_loss(&mut self, attacker_loss: i64, defender_loss: i64) -> Vec<MultiRoundLossInfo> {
        let cc = self.challenge_count;
        let last_round = self.last_relevant_round(attacker_loss, defender_loss);
        if last_round < 0 {
            return Vec::new();
        }
        let last_cached = last_round.min(MAX_EXACT_ROUNDS as i64);

        let max_defender_loss = last_round * cc - self.losses[last_cached as usize].initial_loss;
        let first_round = if max_defender_loss + cc < defender_loss {
            if last_round == last_cached {
                return Vec::new();
            }
            let first = self.gaussian_loss_round(defender_loss - cc - 1, false, -1.0) as i64;
            if first > last_round {
                return Vec::new();
            }
            first.max(0)
        } else {
            let mut bottom = -1;
            let mut first = last_cached;
            while first > bottom + 1 {
                let middle = (first + bottom) / 2;
                let max_loss = middle * cc - self.losses[middle as usize].initial_loss;
                if max_loss + cc < defender_loss {
                    bottom = middle;
                } else {
                    first = middle;
                }
            }
            first
        };

        let width = (last_round - first_round + 1) as usize;
        let base_initial = (first_round + 1) * cc - defender_loss;
        let mut result: Vec<MultiRoundLossInfo> = (0..cc)
            .map(|a| MultiRoundLossInfo::new(base_initial - a, vec![0.0; width]))
            .collect();

        for round in first_round..=last_cached {
            let info = &self.losses[round as usize];
            let offset = (round + 1) * cc - info.initial_loss - defender_loss;
            let start = 0i64
                .max(offset - info.len() + 1)
                .max(offset + info.initial_loss + 1 - attacker_loss);
            let end = (cc - 1).min(offset);
            for a in start..=end {
                let chance = info.outcome_chances[(offset - a) as usize];
                for i in 0..=a {
                    result[(a - i) as usize].outcome_chances[(round - first_round) as usize] +=
                        self.chance(i as usize) * chance;
                }
            }
        }

        for round in first_round.max(last_cached + 1)..=last_round {
            let round_loss = (round + 1) * cc;
            let density = Self::gaussian_density(
                (round_loss - defender_loss) as f64 - self.round_mean * round as f64,
                self.round_var * round as f64,
            );
            let start = 0i64.max(round_loss + 1 - attacker_loss - defender_loss);
            for a in start..cc {
                let chance = density(a as f64);
                if chance < ODDS_CUTOFF {
                    continue;
                }
                for i in 0..=a {
                    result[(a - i) as usize].outcome_chances[(round - first_round) as usize] +=
                        self.chance(i as usize) * chance;
                }
            }
        }

        result
    }
}

/// One growable round table per round configuration.
#[derive(Debug, Default)]
pub struct MultiRoundCache {
    table: Mutex<HashMap<RoundConfig, Arc<Mutex<MultiRoundCacheInfo>>>>,
}

impl MultiRoundCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared table for `round_config`. The table grows while queried, so it
    /// sits behind its own lock.
    pub fn get(&self, caches: &OddsCaches, round_config: RoundConfig) -> Arc<Mutex<MultiRoundCacheInfo>> {
        let mut table = lock(&self.table);
        let info = table.entry(round_config).or_insert_with(|| {
            debug!("multi-round cache miss for {:?}", round_config);
            let round_info = caches.rounds().calculated(round_config);
            Arc::new(Mutex::new(MultiRoundCacheInfo::new(
                round_config,
                round_info.calculate(),
            )))
        });
        Arc::clone(info)
    }

    pub fn len(&self) -> usize {
        lock(&self.table).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.table).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::sum;

    fn info(caches: &OddsCaches) -> Arc<Mutex<MultiRoundCacheInfo>> {
        caches.multi_rounds().get(caches, RoundConfig::default())
    }

    #[test]
    fn moments_of_classic_round() {
        let caches = OddsCaches::new();
        let table = info(&caches);
        let table = lock(&table);
        let expected_mean = (2611.0 + 2.0 * 2275.0) / 7776.0;
        assert!((table.round_mean() - expected_mean).abs() < 1e-12);
        assert!(table.round_variance() > 0.0);
        assert_eq!(table.losses().len(), 1);
    }

    #[test]
    fn windows_keep_nearly_all_mass() {
        let caches = OddsCaches::new();
        let table = info(&caches);
        let mut table = lock(&table);
        table.fixed_defender_loss(200, 200);
        assert!(table.losses().len() > 50);
        for (round, losses) in table.losses().iter().enumerate() {
            let total = sum(&losses.outcome_chances);
            assert!((total - 1.0).abs() < 1e-9, "round {} sums to {}", round, total);
            assert!(losses.initial_loss >= 0);
            assert!(losses.outcome_chances.len() <= 2 * round + 1);
        }
    }

    #[test]
    fn fixed_losses_have_one_entry_per_challenge() {
        let caches = OddsCaches::new();
        let table = info(&caches);
        let mut table = lock(&table);
        let by_defender = table.fixed_defender_loss(20, 20);
        let by_attacker = table.fixed_attacker_loss(20, 20);
        assert_eq!(by_defender.len(), 2);
        assert_eq!(by_attacker.len(), 2);
        for entry in by_defender.iter().chain(by_attacker.iter()) {
            assert!(entry.outcome_chances.iter().all(|c| c.is_finite() && *c >= 0.0));
        }
    }

    #[test]
    fn gaussian_fallback_stays_finite() {
        let caches = OddsCaches::new();
        let table = info(&caches);
        let mut table = lock(&table);
        let entries = table.fixed_defender_loss(4000, 3000);
        assert_eq!(table.losses().len(), MAX_EXACT_ROUNDS + 1);
        let total: f64 = entries.iter().map(|e| sum(&e.outcome_chances)).sum();
        assert!(total.is_finite() && total > 0.0);
    }

    #[test]
    fn cache_shares_one_table_per_config() {
        let caches = OddsCaches::new();
        let a = info(&caches);
        let b = info(&caches);
        assert!(Arc::ptr_eq(&a, &b));
        caches.multi_rounds().clear();
        assert!(caches.multi_rounds().is_empty());
    }
}
