//! Client-facing odds queries built on the win-chance table cache.

use crate::caches::OddsCaches;
use crate::config::{BalanceConfig, BattleConfig, RoundConfig};

const MIN_THRESHOLD: f32 = 0.01;
const MAX_THRESHOLD: f32 = 0.99;

/// Chance the attacker wins `battle`. Units held back as reserve do not
/// fight, so the lookup uses the committed attacker count.
pub fn calculate_win_chance(
    caches: &OddsCaches,
    battle: BattleConfig,
    round: RoundConfig,
    balance: Option<BalanceConfig>,
) -> f32 {
    let attackers = battle.attack_unit_count() - battle.stop_until();
    let defenders = battle.defend_unit_count();
    let table = caches.win_chances().get(attackers.max(defenders), round, balance);
    table.calculate(caches)[attackers * table.size() + defenders]
}

/// Smallest attacker count whose win chance against `defenders` reaches
/// `threshold`, found by walking one unit at a time from a linear
/// estimate.
pub fn calculate_ideal_units(
    caches: &OddsCaches,
    defenders: usize,
    threshold: f32,
    round: RoundConfig,
    balance: Option<BalanceConfig>,
) -> usize {
    let threshold = threshold.clamp(MIN_THRESHOLD, MAX_THRESHOLD);
    if defenders == 0 {
        return 1;
    }

    let win_chance = |attackers: usize| {
        calculate_win_chance(
            caches,
            BattleConfig::unchecked(attackers, defenders, 0),
            round,
            balance,
        )
    };

    let estimate = (libm::roundf(threshold * 2.0 * defenders as f32) as usize).max(1);
    let mut ideal = estimate;
    if win_chance(estimate) >= threshold {
        let mut current = estimate;
        loop {
            current -= 1;
            if current == 0 || win_chance(current) < threshold {
                break;
            }
            ideal = current;
        }
    } else {
        let mut current = estimate;
        loop {
            current += 1;
            ideal = current;
            if win_chance(current) >= threshold {
                break;
            }
        }
    }
    ideal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn win_chance_matches_exact_battle() {
        let caches = OddsCaches::new();
        let round = RoundConfig::default();
        let battle = BattleConfig::new(9, 6, 0).unwrap();
        let exact = caches.battles().get(round, battle).calculate(&caches).attack_win_chance();
        let chance = calculate_win_chance(&caches, battle, round, None);
        assert!((chance as f64 - exact).abs() < 1e-4);
    }

    #[test]
    fn reserve_reduces_win_chance() {
        let caches = OddsCaches::new();
        let round = RoundConfig::default();
        let full = calculate_win_chance(&caches, BattleConfig::new(10, 5, 0).unwrap(), round, None);
        let reserved = calculate_win_chance(&caches, BattleConfig::new(10, 5, 4).unwrap(), round, None);
        let committed = calculate_win_chance(&caches, BattleConfig::new(6, 5, 0).unwrap(), round, None);
        assert!(reserved < full);
        assert_eq!(reserved, committed);
    }

    #[test]
    fn ideal_units_cross_threshold() {
        let caches = OddsCaches::new();
        let round = RoundConfig::default();
        for (defenders, threshold) in [(5, 0.8f32), (10, 0.5), (3, 0.95)] {
            let ideal = calculate_ideal_units(&caches, defenders, threshold, round, None);
            let chance = |a: usize| {
                calculate_win_chance(&caches, BattleConfig::new(a, defenders, 0).unwrap(), round, None)
            };
            assert!(chance(ideal) >= threshold, "{} defenders", defenders);
            if ideal > 1 {
                assert!(chance(ideal - 1) < threshold, "{} defenders", defenders);
            }
        }
    }

    #[test]
    fn ideal_units_edge_cases() {
        let caches = OddsCaches::new();
        let round = RoundConfig::default();
        assert_eq!(calculate_ideal_units(&caches, 0, 0.5, round, None), 1);
        assert_eq!(calculate_ideal_units(&caches, 1, 0.0, round, None), 1);
    }
}
