//! Battle state machine driven by literal dice or by sampling cached odds.

use log::{debug, trace};

use crate::balance::balanced;
use crate::battle::BattleOdds;
use crate::caches::OddsCaches;
use crate::common::{argmax, clamp01_exclusive, select_outcome};
use crate::config::{BalanceConfig, BattleConfig, RoundConfig, FAST_BLITZ_UNIT_THRESHOLD};
use crate::fast_battle::FastBattleInfo;
use crate::rng::RandomSource;
use crate::round::attack_losses;

/// How a single round is resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RoundMethod {
    DiceRoll,
    OddsBased,
}

/// How a battle is resolved to completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BlitzMethod {
    /// Roll literal dice every round.
    DiceRoll,
    /// Sample every round from its cached round odds.
    OddsBasedRound,
    /// Sample the final outcome once from the whole-battle odds.
    OddsBasedBattle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BattleStatus {
    Unresolved,
    AttackerWin,
    DefenderWin,
}

/// A battle in progress.
///
/// The attacker is done once only its reserve remains, the defender once
/// it has no units left.
pub struct BattleSimulator<'a, R: RandomSource> {
    caches: &'a OddsCaches,
    rng: R,
    round_config: RoundConfig,
    battle_config: BattleConfig,
    balance_config: Option<BalanceConfig>,
    remaining_attack_count: usize,
    remaining_defend_count: usize,
    last_attack_loss_count: usize,
    last_defend_loss_count: usize,
    attack_dice_roll_tally: Vec<usize>,
    defend_dice_roll_tally: Vec<usize>,
    attack_dice_rolls: Vec<usize>,
    defend_dice_rolls: Vec<usize>,
    last_attack_dice_rolls: Vec<usize>,
    last_defend_dice_rolls: Vec<usize>,
    simulated_attack_dice_roll_count: usize,
    simulated_defend_dice_roll_count: usize,
}

impl<'a, R: RandomSource> BattleSimulator<'a, R> {
    /// Battle under the classic round rules with no balancing.
    pub fn new(caches: &'a OddsCaches, battle_config: BattleConfig, rng: R) -> Self {
        Self::with_configs(caches, battle_config, RoundConfig::default(), None, rng)
    }

    pub fn with_configs(
        caches: &'a OddsCaches,
        battle_config: BattleConfig,
        round_config: RoundConfig,
        balance_config: Option<BalanceConfig>,
        rng: R,
    ) -> Self {
        let faces = round_config.dice_face_count();
        Self {
            caches,
            rng,
            round_config,
            battle_config,
            balance_config,
            remaining_attack_count: battle_config.attack_unit_count(),
            remaining_defend_count: battle_config.defend_unit_count(),
            last_attack_loss_count: 0,
            last_defend_loss_count: 0,
            attack_dice_roll_tally: vec![0; faces],
            defend_dice_roll_tally: vec![0; faces],
            attack_dice_rolls: Vec::new(),
            defend_dice_rolls: Vec::new(),
            last_attack_dice_rolls: Vec::with_capacity(round_config.attack_dice_count()),
            last_defend_dice_rolls: Vec::with_capacity(round_config.defend_dice_count()),
            simulated_attack_dice_roll_count: 0,
            simulated_defend_dice_roll_count: 0,
        }
    }

    pub fn round_config(&self) -> RoundConfig {
        self.round_config
    }

    pub fn battle_config(&self) -> BattleConfig {
        self.battle_config
    }

    pub fn balance_config(&self) -> Option<BalanceConfig> {
        self.balance_config
    }

    /// Swap the random source, keeping the battle state.
    pub fn set_rng(&mut self, rng: R) {
        self.rng = rng;
    }

    pub fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }

    pub fn remaining_attack_count(&self) -> usize {
        self.remaining_attack_count
    }

    pub fn remaining_defend_count(&self) -> usize {
        self.remaining_defend_count
    }

    pub fn last_attack_loss_count(&self) -> usize {
        self.last_attack_loss_count
    }

    pub fn last_defend_loss_count(&self) -> usize {
        self.last_defend_loss_count
    }

    pub fn attack_loss_count(&self) -> usize {
        self.battle_config.attack_unit_count() - self.remaining_attack_count
    }

    pub fn defend_loss_count(&self) -> usize {
        self.battle_config.defend_unit_count() - self.remaining_defend_count
    }

    /// How often each face came up for the attacker, indexed from zero.
    pub fn attack_dice_roll_tally(&self) -> &[usize] {
        &self.attack_dice_roll_tally
    }

    pub fn defend_dice_roll_tally(&self) -> &[usize] {
        &self.defend_dice_roll_tally
    }

    /// Every attacker roll in the order it was made.
    pub fn attack_dice_rolls(&self) -> &[usize] {
        &self.attack_dice_rolls
    }

    pub fn defend_dice_rolls(&self) -> &[usize] {
        &self.defend_dice_rolls
    }

    /// Rolls of the most recent dice round, sorted descending. Empty after
    /// an odds-based step.
    pub fn last_attack_dice_rolls(&self) -> &[usize] {
        &self.last_attack_dice_rolls
    }

    pub fn last_defend_dice_rolls(&self) -> &[usize] {
        &self.last_defend_dice_rolls
    }

    /// Dice that odds-based steps stood in for.
    pub fn simulated_attack_dice_roll_count(&self) -> usize {
        self.simulated_attack_dice_roll_count
    }

    pub fn simulated_defend_dice_roll_count(&self) -> usize {
        self.simulated_defend_dice_roll_count
    }

    pub fn is_complete(&self) -> bool {
        self.remaining_attack_count <= self.battle_config.stop_until() || self.remaining_defend_count == 0
    }

    pub fn is_attacker_win(&self) -> bool {
        self.remaining_defend_count == 0
    }

    pub fn status(&self) -> BattleStatus {
        if self.remaining_defend_count == 0 {
            BattleStatus::AttackerWin
        } else if self.remaining_attack_count <= self.battle_config.stop_until() {
            BattleStatus::DefenderWin
        } else {
            BattleStatus::Unresolved
        }
    }

    /// Fight one round. Does nothing once the battle is over.
    pub fn next_round(&mut self, method: RoundMethod) {
        match method {
            RoundMethod::DiceRoll => self.round_dice_roll(),
            RoundMethod::OddsBased => self.round_odds_based(),
        }
    }

    /// Fight until the battle is over.
    pub fn blitz(&mut self, method: BlitzMethod) {
        match method {
            BlitzMethod::DiceRoll => {
                while !self.is_complete() {
                    self.round_dice_roll();
                }
            }
            BlitzMethod::OddsBasedRound => {
                while !self.is_complete() {
                    self.round_odds_based();
                }
            }
            BlitzMethod::OddsBasedBattle => self.blitz_odds_based(),
        }
        debug!(
            "blitz finished with {:?}: attacker lost {}, defender lost {}",
            self.status(),
            self.attack_loss_count(),
            self.defend_loss_count()
        );
    }

    /// Restore the starting troops and forget all rolls. Cached odds are
    /// left alone.
    pub fn reset(&mut self) {
        self.remaining_attack_count = self.battle_config.attack_unit_count();
        self.remaining_defend_count = self.battle_config.defend_unit_count();
        self.last_attack_loss_count = 0;
        self.last_defend_loss_count = 0;
        self.attack_dice_roll_tally.iter_mut().for_each(|t| *t = 0);
        self.defend_dice_roll_tally.iter_mut().for_each(|t| *t = 0);
        self.attack_dice_rolls.clear();
        self.defend_dice_rolls.clear();
        self.last_attack_dice_rolls.clear();
        self.last_defend_dice_rolls.clear();
        self.simulated_attack_dice_roll_count = 0;
        self.simulated_defend_dice_roll_count = 0;
    }

    fn current_round_config(&self) -> RoundConfig {
        let current = self
            .battle_config
            .with_new_units(self.remaining_attack_count, self.remaining_defend_count);
        self.round_config.with_battle(&current)
    }

    fn roll(&mut self) -> usize {
        let faces = self.round_config.dice_face_count() as i32;
        self.rng.next_int(0, faces).max(0) as usize
    }

    fn round_dice_roll(&mut self) {
        if self.is_complete() {
            return;
        }
        let round = self.current_round_config();

        self.last_attack_dice_rolls.clear();
        self.last_defend_dice_rolls.clear();
        for _ in 0..round.attack_dice_count() {
            let face = self.roll();
            self.attack_dice_rolls.push(face);
            self.last_attack_dice_rolls.push(face);
            self.attack_dice_roll_tally[face] += 1;
        }
        for _ in 0..round.defend_dice_count() {
            let face = self.roll();
            self.defend_dice_rolls.push(face);
            self.last_defend_dice_rolls.push(face);
            self.defend_dice_roll_tally[face] += 1;
        }
        self.last_attack_dice_rolls.sort_unstable_by(|a, b| b.cmp(a));
        self.last_defend_dice_rolls.sort_unstable_by(|a, b| b.cmp(a));

        let attack_lost = attack_losses(
            &self.last_attack_dice_rolls,
            &self.last_defend_dice_rolls,
            round.favour_defender_on_draw(),
        );
        let defend_lost = round.challenge_count() - attack_lost;
        trace!(
            "rolled {:?} against {:?}",
            self.last_attack_dice_rolls,
            self.last_defend_dice_rolls
        );
        self.apply_losses(attack_lost, defend_lost);
    }

    fn round_odds_based(&mut self) {
        if self.is_complete() {
            return;
        }
        let round = self.current_round_config();
        let info = self.caches.rounds().calculated(round);
        let draw = self.rng.next_double().clamp(0.0, 1.0);
        let attack_lost = select_outcome(info.calculate(), draw).unwrap_or(0);

        self.simulated_attack_dice_roll_count += round.attack_dice_count();
        self.simulated_defend_dice_roll_count += round.defend_dice_count();
        self.last_attack_dice_rolls.clear();
        self.last_defend_dice_rolls.clear();
        self.apply_losses(attack_lost, round.challenge_count() - attack_lost);
    }

    fn blitz_odds_based(&mut self) {
        if self.is_complete() {
            return;
        }
        let battle = self
            .battle_config
            .with_new_units(self.remaining_attack_count, self.remaining_defend_count)
            .without_stop_until();
        let odds = self.battle_odds(battle);

        let draw = clamp01_exclusive(self.rng.next_double());
        let attack_win = odds.attack_win_chance();
        let attack_units = battle.attack_unit_count();
        let defend_units = battle.defend_unit_count();
        let attack_chances = &odds.attack_loss_chances()[..attack_units];
        let defend_chances = &odds.defend_loss_chances()[..defend_units];

        let (attack_lost, defend_lost) = if draw <= attack_win {
            let lost = select_outcome(attack_chances, draw)
                .or_else(|| argmax(attack_chances))
                .unwrap_or(0);
            (lost, defend_units)
        } else {
            let lost = select_outcome(defend_chances, draw - attack_win)
                .or_else(|| argmax(defend_chances))
                .unwrap_or(0);
            (attack_units, lost)
        };

        self.simulated_attack_dice_roll_count += attack_lost + defend_lost;
        self.simulated_defend_dice_roll_count += attack_lost + defend_lost;
        self.last_attack_dice_rolls.clear();
        self.last_defend_dice_rolls.clear();
        self.apply_losses(attack_lost, defend_lost);
    }

    /// Whole-battle odds, from the large-army path when either side is
    /// beyond the exact table's comfortable range, balanced if configured.
    fn battle_odds(&self, battle: BattleConfig) -> BattleOdds {
        let large = battle.attack_unit_count() > FAST_BLITZ_UNIT_THRESHOLD
            || battle.defend_unit_count() > FAST_BLITZ_UNIT_THRESHOLD;
        let odds = if large {
            FastBattleInfo::new(self.round_config, battle)
                .calculate(self.caches)
                .clone()
        } else {
            self.caches
                .battles()
                .get(self.round_config, battle)
                .calculate(self.caches)
                .clone()
        };
        match self.balance_config {
            Some(balance) => balanced(&odds, balance),
            None => odds,
        }
    }

    fn apply_losses(&mut self, attack_lost: usize, defend_lost: usize) {
        debug_assert!(attack_lost + defend_lost > 0);
        self.last_attack_loss_count = attack_lost;
        self.last_defend_loss_count = defend_lost;
        self.remaining_attack_count = self.remaining_attack_count.saturating_sub(attack_lost);
        self.remaining_defend_count = self.remaining_defend_count.saturating_sub(defend_lost);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::SmallRng, SeedableRng};

    fn simulator(caches: &OddsCaches, a: usize, d: usize, s: usize, seed: u64) -> BattleSimulator<'_, SmallRng> {
        BattleSimulator::new(
            caches,
            BattleConfig::new(a, d, s).unwrap(),
            SmallRng::seed_from_u64(seed),
        )
    }

    #[test]
    fn dice_round_records_rolls() {
        let caches = OddsCaches::new();
        let mut sim = simulator(&caches, 5, 4, 0, 7);
        sim.next_round(RoundMethod::DiceRoll);

        assert_eq!(sim.last_attack_dice_rolls().len(), 3);
        assert_eq!(sim.last_defend_dice_rolls().len(), 2);
        assert!(sim.last_attack_dice_rolls().windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(sim.last_attack_loss_count() + sim.last_defend_loss_count(), 2);
        assert_eq!(sim.attack_dice_roll_tally().iter().sum::<usize>(), 3);
        assert_eq!(sim.defend_dice_roll_tally().iter().sum::<usize>(), 2);
        assert_eq!(sim.attack_loss_count(), sim.last_attack_loss_count());
    }

    #[test]
    fn every_blitz_method_terminates() {
        let caches = OddsCaches::new();
        for method in [BlitzMethod::DiceRoll, BlitzMethod::OddsBasedRound, BlitzMethod::OddsBasedBattle] {
            for seed in 0..20 {
                let mut sim = simulator(&caches, 12, 9, 0, seed);
                sim.blitz(method);
                assert!(sim.is_complete());
                assert_ne!(sim.status(), BattleStatus::Unresolved);
                assert!(sim.remaining_attack_count() == 0 || sim.remaining_defend_count() == 0);
            }
        }
    }

    #[test]
    fn reserve_ends_battle_early() {
        let caches = OddsCaches::new();
        for method in [BlitzMethod::DiceRoll, BlitzMethod::OddsBasedBattle] {
            for seed in 0..20 {
                let mut sim = simulator(&caches, 4, 30, 2, seed);
                sim.blitz(method);
                assert_eq!(sim.status(), BattleStatus::DefenderWin);
                assert_eq!(sim.remaining_attack_count(), 2);
            }
        }
    }

    #[test]
    fn odds_round_counts_simulated_dice() {
        let caches = OddsCaches::new();
        let mut sim = simulator(&caches, 6, 6, 0, 3);
        sim.next_round(RoundMethod::OddsBased);
        assert_eq!(sim.simulated_attack_dice_roll_count(), 3);
        assert_eq!(sim.simulated_defend_dice_roll_count(), 2);
        assert!(sim.last_attack_dice_rolls().is_empty());
        assert!(sim.attack_dice_rolls().is_empty());
    }

    #[test]
    fn finished_battle_ignores_more_rounds() {
        let caches = OddsCaches::new();
        let mut sim = simulator(&caches, 3, 3, 0, 11);
        sim.blitz(BlitzMethod::DiceRoll);
        let (a, d) = (sim.remaining_attack_count(), sim.remaining_defend_count());
        let rolls = sim.attack_dice_rolls().len();
        sim.next_round(RoundMethod::DiceRoll);
        sim.next_round(RoundMethod::OddsBased);
        assert_eq!((a, d), (sim.remaining_attack_count(), sim.remaining_defend_count()));
        assert_eq!(rolls, sim.attack_dice_rolls().len());
    }

    #[test]
    fn reset_restores_start() {
        let caches = OddsCaches::new();
        let mut sim = simulator(&caches, 8, 5, 0, 5);
        sim.blitz(BlitzMethod::DiceRoll);
        sim.reset();
        assert_eq!(sim.status(), BattleStatus::Unresolved);
        assert_eq!(sim.remaining_attack_count(), 8);
        assert_eq!(sim.remaining_defend_count(), 5);
        assert!(sim.attack_dice_rolls().is_empty());
        assert!(sim.attack_dice_roll_tally().iter().all(|&t| t == 0));
        assert_eq!(sim.simulated_attack_dice_roll_count(), 0);
    }

    #[test]
    fn large_battle_uses_fast_path() {
        let caches = OddsCaches::new();
        let mut sim = simulator(&caches, 400, 350, 0, 9);
        sim.blitz(BlitzMethod::OddsBasedBattle);
        assert!(sim.is_complete());
        assert!(caches.battles().is_empty());
        assert!(!caches.multi_rounds().is_empty());
    }

    #[test]
    fn odds_battle_frequency_tracks_win_chance() {
        let caches = OddsCaches::new();
        let config = BattleConfig::new(6, 6, 0).unwrap();
        let expected = caches
            .battles()
            .get(RoundConfig::default(), config)
            .calculate(&caches)
            .attack_win_chance();
        let mut sim = BattleSimulator::new(&caches, config, SmallRng::seed_from_u64(2024));
        let trials = 4000;
        let mut wins = 0;
        for _ in 0..trials {
            sim.reset();
            sim.blitz(BlitzMethod::OddsBasedBattle);
            if sim.is_attacker_win() {
                wins += 1;
            }
        }
        let observed = wins as f64 / trials as f64;
        assert!((observed - expected).abs() < 0.05, "{} vs {}", observed, expected);
    }

    #[test]
    fn balanced_blitz_snaps_hopeless_attack() {
        let caches = OddsCaches::new();
        let balance = BalanceConfig::new(0.05, 1.0, 0.0, 1.0);
        for seed in 0..10 {
            let mut sim = BattleSimulator::with_configs(
                &caches,
                BattleConfig::new(1, 10, 0).unwrap(),
                RoundConfig::default(),
                Some(balance),
                SmallRng::seed_from_u64(seed),
            );
            sim.blitz(BlitzMethod::OddsBasedBattle);
            assert_eq!(sim.status(), BattleStatus::DefenderWin);
        }
    }
}
