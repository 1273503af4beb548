//! Single win-chance queries for large armies without building a table.

use crate::balance::balance_win_chance;
use crate::caches::OddsCaches;
use crate::common::{lock, sum};
use crate::config::{BalanceConfig, BattleConfig, RoundConfig};

/// Point query over the multi-round and endgame tables.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FastWinChanceInfo {
    round_config: RoundConfig,
    balance_config: Option<BalanceConfig>,
}

impl FastWinChanceInfo {
    pub fn new(round_config: RoundConfig, balance_config: Option<BalanceConfig>) -> Self {
        Self {
            round_config,
            balance_config,
        }
    }

    pub fn round_config(&self) -> RoundConfig {
        self.round_config
    }

    pub fn balance_config(&self) -> Option<BalanceConfig> {
        self.balance_config
    }

    /// Chance `attackers` wipe out `defenders`, balanced if configured.
    /// Both counts must be positive.
    pub fn win_chance(&self, caches: &OddsCaches, attackers: usize, defenders: usize) -> f32 {
        let round = self.round_config;
        let end_info = |a: usize, d: usize| {
            caches
                .fast_ends()
                .get(caches, round, BattleConfig::unchecked(a, d, 0))
        };

        let win_chance = if attackers < round.attack_dice_count() || defenders < round.defend_dice_count() {
            end_info(attackers, defenders).win_chance()
        } else {
            let cc = round.challenge_count() as i64;
            let attacker_target = (attackers - round.attack_dice_count() + 1) as i64;
            let defender_target = (defenders - round.defend_dice_count() + 1) as i64;
            let (by_defender, by_attacker) = {
                let table = caches.multi_rounds().get(caches, round);
                let mut table = lock(&table);
                (
                    table.fixed_defender_loss(attacker_target, defender_target),
                    table.fixed_attacker_loss(attacker_target, defender_target),
                )
            };

            let mut win = 0.0;
            let mut loss = 0.0;

            // defender drops below its dice first, or both at once
            for (i, entry) in by_defender.iter().enumerate() {
                let chances = &entry.outcome_chances;
                let remaining_defenders = round.defend_dice_count() - 1 - i;
                if remaining_defenders == 0 {
                    win += sum(chances);
                    continue;
                }
                let mut remaining_attackers = attackers as i64 - entry.initial_loss;
                let mut rest = chances.iter();
                if remaining_attackers > 0 {
                    // beyond the plateau the attacker always wins
                    let plateau = end_info(remaining_attackers as usize, remaining_defenders)
                        .battle_config()
                        .attack_unit_count() as i64;
                    while remaining_attackers > plateau {
                        let Some(&chance) = rest.next() else {
                            break;
                        };
                        win += chance;
                        remaining_attackers -= cc;
                    }
                }
                for &chance in rest {
                    if remaining_attackers <= 0 {
                        loss += chance;
                    } else {
                        let w = end_info(remaining_attackers as usize, remaining_defenders).win_chance();
                        win += chance * w;
                        loss += chance * (1.0 - w);
                    }
                    remaining_attackers -= cc;
                }
            }

            // attacker drops below its dice strictly first
            for (i, entry) in by_attacker.iter().enumerate() {
                let chances = &entry.outcome_chances;
                let remaining_attackers = round.attack_dice_count() - 1 - i;
                if remaining_attackers == 0 {
                    loss += sum(chances);
                    continue;
                }
                let mut defender_loss = entry.initial_loss;
                let mut k = 0;
                while k < chances.len() {
                    let chance = chances[k];
                    let current = defender_loss;
                    if chance > 0.0 && (0..defender_target).contains(&current) {
                        let end = end_info(remaining_attackers, defenders - current as usize);
                        if !end.use_all_defenders() {
                            break;
                        }
                        win += chance * end.win_chance();
                        loss += chance * (1.0 - end.win_chance());
                    }
                    k += 1;
                    defender_loss -= cc;
                }
                loss += sum(&chances[k..]);
            }

            win / (win + loss)
        };

        match &self.balance_config {
            Some(balance) => balance_win_chance(win_chance as f32, balance),
            None => win_chance as f32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::win_chance::WinChanceInfo;

    #[test]
    fn agrees_with_table() {
        let caches = OddsCaches::new();
        let round = RoundConfig::default();
        let table = WinChanceInfo::new(40, round, None).unwrap();
        table.calculate(&caches);
        let fast = FastWinChanceInfo::new(round, None);
        for (a, d) in [(1, 1), (2, 6), (3, 2), (10, 10), (25, 30), (39, 20)] {
            let expected = table.win_chance(a, d).unwrap();
            let actual = fast.win_chance(&caches, a, d);
            assert!((expected - actual).abs() < 1e-4, "{}v{}: {} vs {}", a, d, expected, actual);
        }
    }

    #[test]
    fn large_armies_are_tractable() {
        let caches = OddsCaches::new();
        let fast = FastWinChanceInfo::new(RoundConfig::default(), None);
        let even = fast.win_chance(&caches, 2000, 2000);
        assert!(even > 0.5 && even <= 1.0);
        let lopsided = fast.win_chance(&caches, 3000, 1000);
        assert!(lopsided > 0.999);
    }

    #[test]
    fn balance_snaps_extremes() {
        let caches = OddsCaches::new();
        let round = RoundConfig::default();
        let balance = BalanceConfig::new(0.05, 1.0, 0.0, 1.0);
        let fast = FastWinChanceInfo::new(round, Some(balance));
        assert_eq!(fast.win_chance(&caches, 1, 8), 0.0);
        assert_eq!(fast.win_chance(&caches, 60, 10), 1.0);
    }
}
