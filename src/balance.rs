//! Post-hoc reshaping of battle distributions for game balance.
//!
//! The transforms run in a fixed order: win-chance cutoff, win-chance power,
//! outcome cutoff and outcome power. Each one leaves the attacker array
//! (plus the unresolved part) and the defender array summing to one.

use num_traits::Float;

use crate::battle::BattleOdds;
use crate::common::{normalize_sum, sum};
use crate::config::BalanceConfig;

/// Reshape a single win chance with the cutoff, power and outcome-cutoff
/// transforms. Used for win-chance tables and point queries, which only
/// carry the overall chance.
pub fn balance_win_chance<F: Float>(win_chance: F, config: &BalanceConfig) -> F {
    let convert = |v: f64| F::from(v).unwrap_or_else(F::zero);
    let one = F::one();
    let zero = F::zero();
    let mut w = win_chance;

    let cutoff = convert(config.win_chance_cutoff());
    if cutoff > zero {
        if w < cutoff {
            w = zero;
        } else if w > one - cutoff {
            w = one;
        }
    }

    let power = convert(config.win_chance_power());
    let a = w.powf(power);
    let d = (one - w).powf(power);
    w = a / (a + d);

    let outcome_cutoff = convert(config.outcome_cutoff());
    let mut a = w - outcome_cutoff;
    let mut d = one - w - outcome_cutoff;
    if a < zero {
        d = d - a;
        a = zero;
    }
    if d < zero {
        a = a - d;
        d = zero;
    }
    a / (a + d)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Attack,
    Defend,
}

impl BattleOdds {
    /// Mutable arrays as `(side, other side)`.
    fn sides_mut(&mut self, first: Side) -> (&mut Vec<f64>, &mut Vec<f64>) {
        match first {
            Side::Attack => (&mut self.attack_loss_chances, &mut self.defend_loss_chances),
            Side::Defend => (&mut self.defend_loss_chances, &mut self.attack_loss_chances),
        }
    }

    /// Chance of the outcome competing with an attacker win: the defender
    /// winning, or the attacker retreating when a reserve is kept.
    fn opposing_chance(&self) -> f64 {
        if self.battle_config.is_early_stop() {
            self.unresolved_chance()
        } else {
            self.defend_win_chance()
        }
    }
}

fn split_terminal(values: &mut [f64]) -> (&mut [f64], &mut f64) {
    let (rest, last) = values.split_at_mut(values.len() - 1);
    (rest, &mut last[0])
}

/// Snap a side whose overall chance is at or below the cutoff to certainty.
fn apply_win_chance_cutoff(odds: &mut BattleOdds, cutoff: f64) {
    if cutoff <= 0.0 {
        return;
    }
    let early_stop = odds.battle_config.is_early_stop();

    let mut losing = None;
    if odds.attack_win_chance() <= cutoff {
        losing = Some(Side::Attack);
    }
    if odds.opposing_chance() <= cutoff {
        losing = Some(Side::Defend);
    }
    let Some(losing) = losing else {
        return;
    };

    let (lose, win) = odds.sides_mut(losing);
    let (lose_rest, lose_last) = split_terminal(lose);
    lose_rest.iter_mut().for_each(|v| *v = 0.0);
    *lose_last = if losing == Side::Attack && early_stop { 0.0 } else { 1.0 };

    let (win_rest, win_last) = split_terminal(win);
    *win_last = 0.0;
    normalize_sum(win_rest, 1.0);
}

/// Push the overall chances further toward the likelier side.
fn apply_win_chance_power(odds: &mut BattleOdds, power: f64) {
    if power == 1.0 {
        return;
    }
    let early_stop = odds.battle_config.is_early_stop();
    let attack_win = odds.attack_win_chance();
    let opposing = odds.opposing_chance();

    let (winner, win_target, lose_target) = if attack_win > opposing {
        (Side::Attack, attack_win.powf(power), opposing.powf(power))
    } else {
        (Side::Defend, opposing.powf(power), attack_win.powf(power))
    };
    let ratio = 1.0 / (win_target + lose_target);
    let win_target = win_target * ratio;
    let lose_target = lose_target * ratio;

    let (win, lose) = odds.sides_mut(winner);
    let (win_rest, win_last) = split_terminal(win);
    let (lose_rest, lose_last) = split_terminal(lose);
    normalize_sum(win_rest, win_target);
    normalize_sum(lose_rest, lose_target);

    if early_stop {
        if winner == Side::Attack {
            *lose_last = win_target;
        } else {
            *win_last = lose_target;
        }
    } else {
        *win_last = lose_target;
        *lose_last = win_target;
    }
}

/// Trim `cutoff` mass from both ends of the combined outcome sequence, from
/// the attacker's best result to the defender's best result.
fn apply_outcome_cutoff(odds: &mut BattleOdds, cutoff: f64) {
    if cutoff <= 0.0 {
        return;
    }
    let early_stop = odds.battle_config.is_early_stop();
    let attack_len = odds.attack_loss_chances.len() - 1;
    let defend_len = odds.defend_loss_chances.len() - 1;

    let mut distribution: Vec<f64> = odds.attack_loss_chances[..attack_len]
        .iter()
        .chain(odds.defend_loss_chances[..defend_len].iter().rev())
        .copied()
        .collect();

    trim_front(distribution.iter_mut(), cutoff);
    trim_front(distribution.iter_mut().rev(), cutoff);

    let (attack_part, defend_part) = distribution.split_at(attack_len);
    odds.attack_loss_chances[..attack_len].copy_from_slice(attack_part);
    for (slot, &v) in odds.defend_loss_chances[..defend_len]
        .iter_mut()
        .rev()
        .zip(defend_part)
    {
        *slot = v;
    }

    let attack_target = sum(&odds.attack_loss_chances[..attack_len]);
    let defend_target = sum(&odds.defend_loss_chances[..defend_len]);
    let ratio = 1.0 / (attack_target + defend_target);
    let attack_target = attack_target * ratio;
    let defend_target = defend_target * ratio;
    normalize_sum(&mut odds.attack_loss_chances[..attack_len], attack_target);
    normalize_sum(&mut odds.defend_loss_chances[..defend_len], defend_target);

    if !early_stop {
        odds.attack_loss_chances[attack_len] = defend_target;
    }
    odds.defend_loss_chances[defend_len] = attack_target;
}

fn trim_front<'a>(values: impl Iterator<Item = &'a mut f64>, cutoff: f64) {
    let mut cut = 0.0;
    for v in values {
        cut += *v;
        if cut > cutoff {
            *v = cut - cutoff;
            break;
        }
        *v = 0.0;
    }
}

/// Sharpen individual outcomes without moving the overall chances.
fn apply_outcome_power(odds: &mut BattleOdds, power: f64) {
    if power == 1.0 {
        return;
    }
    let attack_target = odds.attack_win_chance();
    let defend_target = odds.opposing_chance();
    let attack_len = odds.attack_loss_chances.len() - 1;
    let defend_len = odds.defend_loss_chances.len() - 1;

    let attack = &mut odds.attack_loss_chances[..attack_len];
    attack.iter_mut().for_each(|v| *v = v.powf(power));
    normalize_sum(attack, attack_target);

    let defend = &mut odds.defend_loss_chances[..defend_len];
    defend.iter_mut().for_each(|v| *v = v.powf(power));
    normalize_sum(defend, defend_target);
}

/// Battle odds with the balance transforms applied at most once.
#[derive(Clone, Debug)]
pub struct BalancedBattleInfo {
    odds: BattleOdds,
    balance_config: BalanceConfig,
    balance_applied: bool,
}

impl BalancedBattleInfo {
    /// Wrap a copy of calculated odds; the source is left untouched.
    pub fn new(odds: &BattleOdds, balance_config: BalanceConfig) -> Self {
        Self {
            odds: odds.clone(),
            balance_config,
            balance_applied: false,
        }
    }

    pub fn balance_config(&self) -> BalanceConfig {
        self.balance_config
    }

    pub fn is_balance_applied(&self) -> bool {
        self.balance_applied
    }

    pub fn odds(&self) -> &BattleOdds {
        &self.odds
    }

    pub fn into_odds(self) -> BattleOdds {
        self.odds
    }

    /// Run all four transforms. Later calls are no-ops.
    pub fn apply_balance(&mut self) -> &BattleOdds {
        if !self.balance_applied {
            let config = self.balance_config;
            apply_win_chance_cutoff(&mut self.odds, config.win_chance_cutoff());
            apply_win_chance_power(&mut self.odds, config.win_chance_power());
            apply_outcome_cutoff(&mut self.odds, config.outcome_cutoff());
            apply_outcome_power(&mut self.odds, config.outcome_power());
            self.balance_applied = true;
        }
        &self.odds
    }
}

/// Balanced copy of `odds`.
pub fn balanced(odds: &BattleOdds, balance_config: BalanceConfig) -> BattleOdds {
    let mut info = BalancedBattleInfo::new(odds, balance_config);
    info.apply_balance();
    info.into_odds()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BattleConfig, RoundConfig};

    fn odds(attack: Vec<f64>, defend: Vec<f64>, stop_until: usize) -> BattleOdds {
        let battle = BattleConfig::new(attack.len() - 1, defend.len() - 1, stop_until).unwrap();
        BattleOdds::new(battle, RoundConfig::default(), attack, defend)
    }

    #[test]
    fn cutoff_snaps_small_attack_win_to_zero() {
        // attacker wins 3% of the time
        let base = odds(vec![0.02, 0.01, 0.97], vec![0.5, 0.47, 0.03], 0);
        let config = BalanceConfig::new(0.05, 1.0, 0.0, 1.0);
        let result = balanced(&base, config);
        assert_eq!(result.attack_win_chance(), 0.0);
        assert_eq!(result.defend_win_chance(), 1.0);
        assert!((result.defend_total() - 1.0).abs() < 1e-12);
        assert!(result.attack_loss_chances()[..2].iter().all(|&c| c == 0.0));
    }

    #[test]
    fn cutoff_snaps_small_defend_win_to_zero() {
        let base = odds(vec![0.6, 0.38, 0.02], vec![0.01, 0.01, 0.98], 0);
        let result = balanced(&base, BalanceConfig::new(0.05, 1.0, 0.0, 1.0));
        assert_eq!(result.attack_win_chance(), 1.0);
        assert_eq!(result.defend_win_chance(), 0.0);
        assert!((sum(&result.attack_loss_chances()[..2]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn power_favours_likelier_side() {
        let base = odds(vec![0.4, 0.3, 0.3], vec![0.2, 0.1, 0.7], 0);
        let result = balanced(&base, BalanceConfig::new(0.0, 2.0, 0.0, 1.0));
        assert!(result.attack_win_chance() > 0.7);
        assert!((result.attack_total() - 1.0).abs() < 1e-12);
        assert!((result.defend_total() - 1.0).abs() < 1e-12);
        // shape inside each side is kept
        let a = result.attack_loss_chances();
        assert!((a[0] / a[1] - 4.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn outcome_cutoff_trims_both_ends() {
        let base = odds(vec![0.2, 0.4, 0.4], vec![0.1, 0.3, 0.6], 0);
        let result = balanced(&base, BalanceConfig::new(0.0, 1.0, 0.2, 1.0));
        assert_eq!(result.attack_loss_chances()[0], 0.0);
        assert_eq!(result.defend_loss_chances()[0], 0.0);
        assert!((result.attack_win_chance() - 2.0 / 3.0).abs() < 1e-12);
        assert!((result.attack_total() - 1.0).abs() < 1e-12);
        assert!((result.defend_total() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn outcome_power_keeps_win_chance() {
        let base = odds(vec![0.3, 0.2, 0.1, 0.4], vec![0.25, 0.15, 0.6], 0);
        let result = balanced(&base, BalanceConfig::new(0.0, 1.0, 0.0, 2.0));
        assert!((result.attack_win_chance() - 0.6).abs() < 1e-12);
        assert!((sum(&result.attack_loss_chances()[..3]) - 0.6).abs() < 1e-12);
        assert!(result.attack_loss_chances()[0] > 0.3);
    }

    #[test]
    fn early_stop_keeps_unresolved_mass() {
        // 4 committed, reserve 2: attacker can lose at most 2
        let base = odds(vec![0.3, 0.2, 0.0, 0.0, 0.0], vec![0.2, 0.3, 0.5], 2);
        assert!((base.unresolved_chance() - 0.5).abs() < 1e-12);
        let result = balanced(&base, BalanceConfig::default());
        assert_eq!(result.defend_win_chance(), 0.0);
        assert!((result.attack_total() - 1.0).abs() < 1e-9);
        assert!((result.defend_total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn balance_applies_once() {
        let base = odds(vec![0.4, 0.3, 0.3], vec![0.2, 0.1, 0.7], 0);
        let mut info = BalancedBattleInfo::new(&base, BalanceConfig::default());
        let first = info.apply_balance().clone();
        let second = info.apply_balance().clone();
        assert!(info.is_balance_applied());
        assert_eq!(first, second);
    }

    #[test]
    fn scalar_balance_matches_rules() {
        let config = BalanceConfig::new(0.05, 1.0, 0.0, 1.0);
        assert_eq!(balance_win_chance(0.03f32, &config), 0.0);
        assert_eq!(balance_win_chance(0.97f64, &config), 1.0);
        assert!((balance_win_chance(0.5f32, &BalanceConfig::default()) - 0.5).abs() < 1e-6);

        let powered = balance_win_chance(0.7f64, &BalanceConfig::new(0.0, 2.0, 0.0, 1.0));
        assert!((powered - 0.49 / 0.58).abs() < 1e-12);

        let trimmed = balance_win_chance(0.08f64, &BalanceConfig::new(0.0, 1.0, 0.1, 1.0));
        assert_eq!(trimmed, 0.0);
    }
}
