//! Battle distributions for armies far larger than the dice counts.
//!
//! The battle is split at the round where one side first drops below its
//! dice count. The multi-round tables give the losses up to that point and
//! the endgame tables finish the battle from there.

use std::sync::OnceLock;

use crate::battle::BattleOdds;
use crate::caches::OddsCaches;
use crate::common::{lock, normalize_sum, sum};
use crate::config::{BattleConfig, RoundConfig};

/// Lazily calculated large-army battle distribution. Same result shape as
/// [`crate::battle::BattleInfo`], not cached.
#[derive(Debug)]
pub struct FastBattleInfo {
    round_config: RoundConfig,
    battle_config: BattleConfig,
    odds: OnceLock<BattleOdds>,
}

struct Accumulator<'a> {
    caches: &'a OddsCaches,
    round_config: RoundConfig,
    attack_units: usize,
    defend_units: usize,
    attack: Vec<f64>,
    defend: Vec<f64>,
}

impl Accumulator<'_> {
    /// Spread `scale` over the endgame that starts after these losses.
    fn add_end_chances(&mut self, attack_loss: usize, defend_loss: usize, scale: f64) {
        let remaining_attack = self.attack_units - attack_loss;
        let remaining_defend = self.defend_units - defend_loss;
        if remaining_attack == 0 {
            self.defend[defend_loss] += scale;
            return;
        }
        if remaining_defend == 0 {
            self.attack[attack_loss] += scale;
            return;
        }

        let end = self.caches.fast_ends().get(
            self.caches,
            self.round_config,
            BattleConfig::unchecked(remaining_attack, remaining_defend, 0),
        );
        let outcomes = end.outcome_chances();
        let len = outcomes.len();
        if !end.use_all_attackers() {
            for (i, &c) in outcomes.iter().enumerate() {
                self.attack[attack_loss + i] += c * scale;
            }
        } else if !end.use_all_defenders() {
            for i in 0..len {
                self.defend[defend_loss + i] += outcomes[len - 1 - i] * scale;
            }
        } else {
            for i in 0..remaining_attack {
                self.attack[attack_loss + i] += outcomes[i] * scale;
            }
            for i in 0..remaining_defend {
                self.defend[defend_loss + i] += outcomes[len - 1 - i] * scale;
            }
        }
    }
}

fn to_index(loss: i64, limit: usize) -> Option<usize> {
    usize::try_from(loss).ok().filter(|&l| l <= limit)
}

impl FastBattleInfo {
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

    pub fn calculate(&self, caches: &OddsCaches) -> &BattleOdds {
        self.odds.get_or_init(|| {
            if self.battle_config.is_early_stop() {
                let base = FastBattleInfo::new(self.round_config, self.battle_config.without_stop_until());
                return base.calculate(caches).with_reserve(self.battle_config);
            }

            let attack_units = self.battle_config.attack_unit_count();
            let defend_units = self.battle_config.defend_unit_count();
            let mut acc = Accumulator {
                caches,
                round_config: self.round_config,
                attack_units,
                defend_units,
                attack: vec![0.0; attack_units + 1],
                defend: vec![0.0; defend_units + 1],
            };

            if attack_units < self.round_config.attack_dice_count()
                || defend_units < self.round_config.defend_dice_count()
            {
                acc.add_end_chances(0, 0, 1.0);
                acc.defend[defend_units] = sum(&acc.attack[..attack_units]);
                acc.attack[attack_units] = sum(&acc.defend[..defend_units]);
            } else {
                self.accumulate_rounds(&mut acc);
                normalize_outcomes(&mut acc.attack, &mut acc.defend);
            }

            BattleOdds::new(self.battle_config, self.round_config, acc.attack, acc.defend)
        })
    }

    fn accumulate_rounds(&self, acc: &mut Accumulator<'_>) {
        let round = self.round_config;
        let cc = round.challenge_count() as i64;
        let attack_units = acc.attack_units;
        let defend_units = acc.defend_units;
        let attacker_target = (attack_units - round.attack_dice_count() + 1) as i64;
        let defender_target = (defend_units - round.defend_dice_count() + 1) as i64;

        let (by_defender, by_attacker) = {
            let table = acc.caches.multi_rounds().get(acc.caches, round);
            let mut table = lock(&table);
            (
                table.fixed_defender_loss(attacker_target, defender_target),
                table.fixed_attacker_loss(attacker_target, defender_target),
            )
        };

        // defender drops below its dice first, or both at once
        for (i, entry) in by_defender.iter().enumerate() {
            let Some(defend_loss) = to_index(defender_target + i as i64, defend_units) else {
                continue;
            };
            let mut attack_loss = entry.initial_loss;
            for &chance in &entry.outcome_chances {
                let loss = attack_loss;
                attack_loss += cc;
                if chance <= 0.0 {
                    continue;
                }
                let Some(loss) = to_index(loss, attack_units) else {
                    continue;
                };
                if defend_loss == defend_units {
                    acc.attack[loss] += chance;
                } else {
                    acc.add_end_chances(loss, defend_loss, chance);
                }
            }
        }

        // attacker drops below its dice strictly first
        for (i, entry) in by_attacker.iter().enumerate() {
            let Some(attack_loss) = to_index(attacker_target + i as i64, attack_units) else {
                continue;
            };
            let mut defend_loss = entry.initial_loss;
            for &chance in &entry.outcome_chances {
                let loss = defend_loss;
                defend_loss -= cc;
                if chance <= 0.0 || loss >= defender_target {
                    continue;
                }
                let Some(loss) = to_index(loss, defend_units) else {
                    continue;
                };
                if attack_loss == attack_units {
                    acc.defend[loss] += chance;
                } else {
                    acc.add_end_chances(attack_loss, loss, chance);
                }
            }
        }
    }
}

/// Rescale the non-terminal parts so win and loss mass sum to one, then fill
/// in the terminal buckets.
fn normalize_outcomes(attack: &mut [f64], defend: &mut [f64]) {
    let attack_units = attack.len() - 1;
    let defend_units = defend.len() - 1;
    let win = sum(&attack[..attack_units]);
    let loss = sum(&defend[..defend_units]);
    let ratio = 1.0 / (win + loss);
    let win = win * ratio;
    let loss = loss * ratio;
    normalize_sum(&mut attack[..attack_units], win);
    normalize_sum(&mut defend[..defend_units], loss);
    defend[defend_units] = win;
    attack[attack_units] = loss;
}
