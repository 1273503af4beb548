//! Endgame tables for battles where one side is down to its dice count.
//!
//! Once the stronger side has enough units that it can never be brought down
//! to its own dice count with meaningful probability, adding more units only
//! shifts the outcome array. Each table list grows one unit at a time and
//! stops at that plateau, so arbitrarily large requests are answered by the
//! last entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::caches::OddsCaches;
use crate::common::{lock, sum};
use crate::config::{BattleConfig, RoundConfig, ODDS_CUTOFF};
use crate::round::RoundCache;

/// Terminal outcome distribution of an endgame battle.
///
/// `outcome_chances` runs from the attacker's best result to the defender's
/// best result; every step either adds one attacker loss or removes one
/// defender loss. While `use_all_attackers` is set the last entry means the
/// attacker lost everything and no defenders; once cleared, the attacker
/// count here may be below the requested one and every entry is a defender
/// wipe-out starting at zero attacker losses. `use_all_defenders` mirrors
/// this for the defender with the first entry.
#[derive(Clone, Debug)]
pub struct FastBattleEndInfo {
    battle_config: BattleConfig,
    round_config: RoundConfig,
    outcome_chances: Vec<f64>,
    win_chance: f64,
    use_all_attackers: bool,
    use_all_defenders: bool,
}

impl FastBattleEndInfo {
    /// Battle configuration this table was built for. May hold fewer units
    /// than requested once a side has plateaued.
    pub fn battle_config(&self) -> BattleConfig {
        self.battle_config
    }

    pub fn round_config(&self) -> RoundConfig {
        self.round_config
    }

    pub fn outcome_chances(&self) -> &[f64] {
        &self.outcome_chances
    }

    pub fn win_chance(&self) -> f64 {
        self.win_chance
    }

    pub fn use_all_attackers(&self) -> bool {
        self.use_all_attackers
    }

    pub fn use_all_defenders(&self) -> bool {
        self.use_all_defenders
    }

    fn calculate(
        rounds: &RoundCache,
        tables: &mut EndTables,
        round_config: RoundConfig,
        battle_config: BattleConfig,
    ) -> Self {
        let attack_units = battle_config.attack_unit_count();
        let defend_units = battle_config.defend_unit_count();
        let mut outcomes = vec![0.0; attack_units + defend_units];
        let last = outcomes.len() - 1;

        let round = round_config.with_battle(&battle_config);
        let challenges = round.challenge_count();
        let round_info = rounds.calculated(round);

        for (attack_lost, &chance) in round_info.calculate().iter().enumerate() {
            if chance <= 0.0 {
                continue;
            }
            let remaining_attack = attack_units.saturating_sub(attack_lost);
            let remaining_defend = defend_units.saturating_sub(challenges - attack_lost);

            if remaining_attack == 0 {
                outcomes[last] += chance;
            } else if remaining_defend == 0 {
                outcomes[0] += chance;
            } else {
                let next = battle_config.with_new_units(remaining_attack, remaining_defend);
                let sub = get_unlocked(rounds, tables, round, next);
                let offset = if sub.use_all_defenders {
                    0
                } else {
                    remaining_attack + remaining_defend - sub.outcome_chances.len()
                };
                for (a, &c) in sub.outcome_chances.iter().enumerate() {
                    outcomes[attack_lost + a + offset] += chance * c;
                }
            }
        }

        let mut info = Self {
            battle_config,
            round_config,
            outcome_chances: Vec::new(),
            win_chance: 0.0,
            use_all_attackers: true,
            use_all_defenders: true,
        };

        let attack_dice = round.attack_dice_count();
        let defend_dice = round.defend_dice_count();
        if attack_units > defend_units && outcomes[attack_units - attack_dice] < ODDS_CUTOFF {
            // the attacker can no longer be pushed down to its dice count
            outcomes.truncate(attack_units - attack_dice);
            info.win_chance = 1.0;
            info.use_all_attackers = false;
            debug!("attacker plateau at {}v{}", attack_units, defend_units);
        } else if attack_units < defend_units
            && outcomes[attack_units - 1 + defend_dice] < ODDS_CUTOFF
        {
            outcomes.drain(..attack_units + defend_dice);
            info.win_chance = 0.0;
            info.use_all_defenders = false;
            debug!("defender plateau at {}v{}", attack_units, defend_units);
        } else {
            info.win_chance = sum(&outcomes[..attack_units]);
        }
        info.outcome_chances = outcomes;
        info
    }
}

#[derive(Debug, Default)]
struct EndTables {
    // entry i: defenders fixed at the narrowed defend dice, i + 1 attackers
    low_defenders: HashMap<RoundConfig, Vec<Arc<FastBattleEndInfo>>>,
    // entry i: attackers fixed at the narrowed attack dice, i + 1 defenders
    low_attackers: HashMap<RoundConfig, Vec<Arc<FastBattleEndInfo>>>,
}

impl EndTables {
    fn list_mut(&mut self, low_defenders: bool, round: RoundConfig) -> &mut Vec<Arc<FastBattleEndInfo>> {
        let map = if low_defenders {
            &mut self.low_defenders
        } else {
            &mut self.low_attackers
        };
        map.entry(round).or_default()
    }
}

/// Lookup that expects the table lock to be held by the caller, so nested
/// lookups during a calculation do not re-enter the lock.
fn get_unlocked(
    rounds: &RoundCache,
    tables: &mut EndTables,
    round_config: RoundConfig,
    battle_config: BattleConfig,
) -> Arc<FastBattleEndInfo> {
    let round = round_config.with_battle(&battle_config);
    let attack_units = battle_config.attack_unit_count();
    let defend_units = battle_config.defend_unit_count();
    let low_defenders = attack_units > defend_units;
    let target = if low_defenders { attack_units } else { defend_units };

    loop {
        let list = tables.list_mut(low_defenders, round);
        if list.len() >= target {
            return Arc::clone(&list[target - 1]);
        }
        if let Some(last) = list.last() {
            let plateaued = if low_defenders {
                !last.use_all_attackers
            } else {
                !last.use_all_defenders
            };
            if plateaued {
                return Arc::clone(last);
            }
        }

        let count = list.len() + 1;
        let next = if low_defenders {
            battle_config.with_new_units(count, defend_units)
        } else {
            battle_config.with_new_units(attack_units, count)
        };
        let info = FastBattleEndInfo::calculate(rounds, tables, round, next);
        tables.list_mut(low_defenders, round).push(Arc::new(info));
    }
}

/// Per-round-config endgame tables, grown on demand.
#[derive(Debug, Default)]
pub struct FastBattleEndCache {
    tables: Mutex<EndTables>,
}

impl FastBattleEndCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fully calculated endgame table. At most one of the unit counts may
    /// exceed the matching dice count of `round_config`.
    pub fn get(
        &self,
        caches: &OddsCaches,
        round_config: RoundConfig,
        battle_config: BattleConfig,
    ) -> Arc<FastBattleEndInfo> {
        let mut tables = lock(&self.tables);
        get_unlocked(caches.rounds(), &mut tables, round_config, battle_config)
    }

    /// Number of tables across both lists.
    pub fn len(&self) -> usize {
        let tables = lock(&self.tables);
        tables.low_defenders.values().map(Vec::len).sum::<usize>()
            + tables.low_attackers.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut tables = lock(&self.tables);
        tables.low_defenders.clear();
        tables.low_attackers.clear();
    }
}
