//! Exact whole-battle loss distributions.
//!
//! A battle is resolved round by round: every per-round outcome either ends
//! the battle or leaves a strictly smaller battle, whose distribution is
//! fetched from the [`BattleCache`] and convolved into the parent. Both unit
//! counts shrink on every step, so plain recursion through the cache
//! terminates.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use log::debug;

use crate::caches::OddsCaches;
use crate::common::{lock, sum};
use crate::config::{BattleConfig, RoundConfig};

/// Calculated loss distributions of a battle.
///
/// `attack_loss_chances[i]` is the chance the attacker loses `i` units in
/// total, `defend_loss_chances[j]` the same for the defender. The last entry
/// of each array is the chance that side is wiped out.
#[derive(Clone, Debug, PartialEq)]
pub struct BattleOdds {
    pub(crate) battle_config: BattleConfig,
    pub(crate) round_config: RoundConfig,
    pub(crate) attack_loss_chances: Vec<f64>,
    pub(crate) defend_loss_chances: Vec<f64>,
}

impl BattleOdds {
    pub(crate) fn new(
        battle_config: BattleConfig,
        round_config: RoundConfig,
        attack_loss_chances: Vec<f64>,
        defend_loss_chances: Vec<f64>,
    ) -> Self {
        debug_assert_eq!(attack_loss_chances.len(), battle_config.attack_unit_count() + 1);
        debug_assert_eq!(defend_loss_chances.len(), battle_config.defend_unit_count() + 1);
        Self {
            battle_config,
            round_config,
            attack_loss_chances,
            defend_loss_chances,
        }
    }

    pub fn battle_config(&self) -> BattleConfig {
        self.battle_config
    }

    pub fn round_config(&self) -> RoundConfig {
        self.round_config
    }

    pub fn attack_loss_chances(&self) -> &[f64] {
        &self.attack_loss_chances
    }

    pub fn defend_loss_chances(&self) -> &[f64] {
        &self.defend_loss_chances
    }

    /// Chance the defender is wiped out.
    pub fn attack_win_chance(&self) -> f64 {
        self.defend_loss_chances[self.battle_config.defend_unit_count()]
    }

    /// Chance the attacker is wiped out.
    pub fn defend_win_chance(&self) -> f64 {
        self.attack_loss_chances[self.battle_config.attack_unit_count()]
    }

    /// Chance the attacker retreats to its reserve. Always zero for battles
    /// fought to the end.
    pub fn unresolved_chance(&self) -> f64 {
        if self.battle_config.is_early_stop() {
            (1.0 - self.attack_win_chance() - self.defend_win_chance()).max(0.0)
        } else {
            0.0
        }
    }

    /// Chance of ending with exactly these losses. Only pairs on a terminal
    /// edge have an answer; anything else is `None`.
    pub fn outcome_chance(&self, lost_attack_count: usize, lost_defend_count: usize) -> Option<f64> {
        let battle = &self.battle_config;
        if lost_attack_count == battle.attack_unit_count() - battle.stop_until() {
            self.attack_loss_chances.get(lost_attack_count).copied()
        } else if lost_defend_count == battle.defend_unit_count() {
            self.defend_loss_chances.get(lost_defend_count).copied()
        } else {
            None
        }
    }

    /// Reinterpret a battle fought to the end as `battle_config`, whose
    /// reserve is the difference in attacker units. The wipe-out bucket of
    /// the full battle becomes the retreat and is left unresolved.
    pub(crate) fn with_reserve(&self, battle_config: BattleConfig) -> BattleOdds {
        let mut attack = vec![0.0; battle_config.attack_unit_count() + 1];
        let kept = self.attack_loss_chances.len() - 1;
        attack[..kept].copy_from_slice(&self.attack_loss_chances[..kept]);
        BattleOdds::new(
            battle_config,
            self.round_config,
            attack,
            self.defend_loss_chances.clone(),
        )
    }

    /// Total probability mass on the attacker side plus the unresolved part.
    pub fn attack_total(&self) -> f64 {
        sum(&self.attack_loss_chances) + self.unresolved_chance()
    }

    pub fn defend_total(&self) -> f64 {
        sum(&self.defend_loss_chances)
    }
}

/// Lazily calculated exact battle distribution.
#[derive(Debug)]
pub struct BattleInfo {
    round_config: RoundConfig,
    battle_config: BattleConfig,
    odds: OnceLock<BattleOdds>,
}

impl BattleInfo {
    pub fn new(round_config: RoundConfig, battle_config: BattleConfig) -> Self {
        Self {
            round_config,
            battle_config,
            odds: OnceLock::new(),
        }
    }

    pub fn round_config(&self) -> RoundConfig {
        self.round_config
    }

    pub fn battle_config(&self) -> BattleConfig {
        self.battle_config
    }

    pub fn is_ready(&self) -> bool {
        self.odds.get().is_some()
    }

    pub fn odds(&self) -> Option<&BattleOdds> {
        self.odds.get()
    }

    /// Compute the distribution once, resolving sub-battles through
    /// `caches`.
    pub fn calculate(&self, caches: &OddsCaches) -> &BattleOdds {
        self.odds.get_or_init(|| {
            if self.battle_config.is_early_stop() {
                self.calculate_early_stop(caches)
            } else {
                self.calculate_to_the_end(caches)
            }
        })
    }

    fn calculate_to_the_end(&self, caches: &OddsCaches) -> BattleOdds {
        let attack_units = self.battle_config.attack_unit_count();
        let defend_units = self.battle_config.defend_unit_count();
        let mut attack = vec![0.0; attack_units + 1];
        let mut defend = vec![0.0; defend_units + 1];

        let round = self.round_config.with_battle(&self.battle_config);
        let challenges = round.challenge_count();
        let round_info = caches.rounds().calculated(round);

        for (attack_lost, &chance) in round_info.calculate().iter().enumerate() {
            if chance <= 0.0 {
                continue;
            }
            let defend_lost = challenges - attack_lost;
            let remaining_attack = attack_units.saturating_sub(attack_lost);
            let remaining_defend = defend_units.saturating_sub(defend_lost);

            if remaining_attack == 0 || remaining_defend == 0 {
                attack[attack_units - remaining_attack] += chance;
                defend[defend_units - remaining_defend] += chance;
                continue;
            }

            let next = self
                .battle_config
                .with_new_units(remaining_attack, remaining_defend);
            let sub_info = caches.battles().get(self.round_config, next);
            let sub = sub_info.calculate(caches);

            for (a, &c) in sub.attack_loss_chances.iter().enumerate() {
                attack[attack_lost + a] += chance * c;
            }
            for (d, &c) in sub.defend_loss_chances.iter().enumerate() {
                defend[defend_lost + d] += chance * c;
            }
        }

        BattleOdds::new(self.battle_config, self.round_config, attack, defend)
    }

    fn calculate_early_stop(&self, caches: &OddsCaches) -> BattleOdds {
        let base_info = caches
            .battles()
            .get(self.round_config, self.battle_config.without_stop_until());
        base_info.calculate(caches).with_reserve(self.battle_config)
    }
}

/// Memoizes [`BattleInfo`] by round and battle configuration.
///
/// Early-stop battles are cheap truncations of a cached full battle and are
/// handed out fresh on every request.
#[derive(Debug, Default)]
pub struct BattleCache {
    table: Mutex<HashMap<(RoundConfig, BattleConfig), Arc<BattleInfo>>>,
}

impl BattleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, round_config: RoundConfig, battle_config: BattleConfig) -> Arc<BattleInfo> {
        if battle_config.is_early_stop() {
            return Arc::new(BattleInfo::new(round_config, battle_config));
        }
        let mut table = lock(&self.table);
        Arc::clone(
            table
                .entry((round_config, battle_config))
                .or_insert_with(|| {
                    debug!(
                        "battle cache miss for {}v{}",
                        battle_config.attack_unit_count(),
                        battle_config.defend_unit_count()
                    );
                    Arc::new(BattleInfo::new(round_config, battle_config))
                }),
        )
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

    fn battle(a: usize, d: usize, s: usize) -> BattleConfig {
        BattleConfig::new(a, d, s).unwrap()
    }

    #[test]
    fn one_versus_one_matches_round_odds() {
        let caches = OddsCaches::new();
        let round = RoundConfig::default();
        let info = caches.battles().get(round, battle(1, 1, 0));
        let odds = info.calculate(&caches);
        assert!((odds.attack_win_chance() - 15.0 / 36.0).abs() < 1e-12);
        assert!((odds.defend_win_chance() - 21.0 / 36.0).abs() < 1e-12);
        assert_eq!(odds.unresolved_chance(), 0.0);
    }

    #[test]
    fn distributions_sum_to_one() {
        let caches = OddsCaches::new();
        let round = RoundConfig::default();
        for (a, d) in [(1, 5), (5, 1), (7, 7), (12, 4)] {
            let info = caches.battles().get(round, battle(a, d, 0));
            let odds = info.calculate(&caches);
            assert!((odds.attack_total() - 1.0).abs() < 1e-9, "{}v{}", a, d);
            assert!((odds.defend_total() - 1.0).abs() < 1e-9, "{}v{}", a, d);
        }
    }

    #[test]
    fn early_stop_truncates_base_battle() {
        let caches = OddsCaches::new();
        let round = RoundConfig::default();
        let config = battle(8, 5, 3);
        let info = caches.battles().get(round, config);
        let odds = info.calculate(&caches);
        let base = caches
            .battles()
            .get(round, config.without_stop_until())
            .calculate(&caches)
            .clone();

        assert_eq!(odds.attack_loss_chances().len(), 9);
        assert_eq!(&odds.attack_loss_chances()[..5], &base.attack_loss_chances()[..5]);
        assert!(odds.attack_loss_chances()[5..].iter().all(|&c| c == 0.0));
        assert_eq!(odds.defend_loss_chances(), base.defend_loss_chances());
        assert_eq!(odds.defend_win_chance(), 0.0);
        assert!((odds.unresolved_chance() - base.defend_win_chance()).abs() < 1e-12);
        assert!((odds.attack_total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn early_stop_entries_are_not_cached() {
        let caches = OddsCaches::new();
        let round = RoundConfig::default();
        let first = caches.battles().get(round, battle(6, 3, 2));
        let second = caches.battles().get(round, battle(6, 3, 2));
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(caches.battles().is_empty());

        let full = caches.battles().get(round, battle(6, 3, 0));
        assert!(Arc::ptr_eq(&full, &caches.battles().get(round, battle(6, 3, 0))));
    }

    #[test]
    fn outcome_chance_only_answers_terminal_edges() {
        let caches = OddsCaches::new();
        let info = caches.battles().get(RoundConfig::default(), battle(4, 3, 0));
        let odds = info.calculate(&caches);
        assert_eq!(odds.outcome_chance(4, 1), Some(odds.attack_loss_chances()[4]));
        assert_eq!(odds.outcome_chance(2, 3), Some(odds.attack_win_chance()));
        assert_eq!(odds.outcome_chance(1, 1), None);
    }
}
