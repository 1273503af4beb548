//! Round, battle and balance configuration plus engine-wide constants.
//!
//! All configuration types are small `Copy` values compared and hashed by
//! field equality, which is what lets them act as cache keys.

use core::hash::{Hash, Hasher};

use bitflags::bitflags;

use crate::common::ConfigError;

/// Probability mass below which tail contributions are dropped.
pub const ODDS_CUTOFF: f64 = 1e-16;

/// Number of rounds computed by exact convolution before the Gaussian
/// approximation takes over.
pub const MAX_EXACT_ROUNDS: usize = 1000;

/// Smallest edge length of a win-chance table.
pub const MIN_WIN_CHANCE_TABLE_SIZE: usize = 64;

/// Unit count above which an odds-based blitz uses the large-army path.
pub const FAST_BLITZ_UNIT_THRESHOLD: usize = 100;

bitflags! {
    /// Situational modifiers applied to one side's dice.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct DiceAugment: u8 {
        const IS_ZOMBIE      = 1 << 0;
        const ON_CAPITAL     = 1 << 1;
        const IS_BEHIND_WALL = 1 << 2;
    }
}

/// Dice rules for a single round of combat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoundConfig {
    dice_face_count: usize,
    attack_dice_count: usize,
    defend_dice_count: usize,
    favour_defender_on_draw: bool,
}

impl RoundConfig {
    /// Checked constructor. Dice need at least two faces and each side at
    /// least one die.
    pub fn new(
        dice_face_count: usize,
        attack_dice_count: usize,
        defend_dice_count: usize,
        favour_defender_on_draw: bool,
    ) -> Result<Self, ConfigError> {
        if dice_face_count < 2 {
            return Err(ConfigError::InvalidDiceFaceCount(dice_face_count));
        }
        if attack_dice_count == 0 || defend_dice_count == 0 {
            return Err(ConfigError::InvalidDiceCount {
                attack: attack_dice_count,
                defend: defend_dice_count,
            });
        }
        Ok(Self {
            dice_face_count,
            attack_dice_count,
            defend_dice_count,
            favour_defender_on_draw,
        })
    }

    pub fn dice_face_count(&self) -> usize {
        self.dice_face_count
    }

    pub fn attack_dice_count(&self) -> usize {
        self.attack_dice_count
    }

    pub fn defend_dice_count(&self) -> usize {
        self.defend_dice_count
    }

    pub fn favour_defender_on_draw(&self) -> bool {
        self.favour_defender_on_draw
    }

    /// Number of dice pairs compared in a round.
    pub fn challenge_count(&self) -> usize {
        self.attack_dice_count.min(self.defend_dice_count)
    }

    /// Narrow the dice counts to the troops actually available in `battle`.
    /// Never increases either count.
    pub fn with_battle(&self, battle: &BattleConfig) -> Self {
        let committed = battle.attack_unit_count() - battle.stop_until();
        Self {
            attack_dice_count: self.attack_dice_count.min(committed),
            defend_dice_count: self.defend_dice_count.min(battle.defend_unit_count()),
            ..*self
        }
    }

    /// Replace both dice counts.
    pub fn with_dice_counts(&self, attack: usize, defend: usize) -> Result<Self, ConfigError> {
        Self::new(self.dice_face_count, attack, defend, self.favour_defender_on_draw)
    }

    /// Cap the attacker's dice. A cap of zero leaves the config unchanged.
    pub fn with_max_attack_dice(&self, max_attack_dice: usize) -> Self {
        let mut config = *self;
        if max_attack_dice > 0 {
            config.attack_dice_count = config.attack_dice_count.min(max_attack_dice);
        }
        config
    }

    /// Apply situational augments for each side.
    pub fn with_augments(&self, attack: DiceAugment, defend: DiceAugment) -> Self {
        let mut config = *self;
        if attack.contains(DiceAugment::IS_ZOMBIE) {
            config.attack_dice_count = config.attack_dice_count.saturating_sub(1).max(1);
        }
        if defend.contains(DiceAugment::ON_CAPITAL) {
            config.defend_dice_count += 1;
        }
        if defend.contains(DiceAugment::IS_BEHIND_WALL) {
            config.defend_dice_count += 1;
        }
        if defend.contains(DiceAugment::IS_ZOMBIE) {
            config.favour_defender_on_draw = false;
        }
        config
    }
}

impl Default for RoundConfig {
    /// Classic rules: six-sided dice, three attacking, two defending, ties
    /// go to the defender.
    fn default() -> Self {
        Self {
            dice_face_count: 6,
            attack_dice_count: 3,
            defend_dice_count: 2,
            favour_defender_on_draw: true,
        }
    }
}

/// Troop counts for a battle.
///
/// `attack_unit_count` excludes the unit that always stays behind.
/// A non-zero `stop_until` makes the attacker retreat once only that many
/// units remain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BattleConfig {
    attack_unit_count: usize,
    defend_unit_count: usize,
    stop_until: usize,
}

impl BattleConfig {
    pub fn new(
        attack_unit_count: usize,
        defend_unit_count: usize,
        stop_until: usize,
    ) -> Result<Self, ConfigError> {
        if attack_unit_count == 0 || defend_unit_count == 0 {
            return Err(ConfigError::InvalidUnitCount {
                attack: attack_unit_count,
                defend: defend_unit_count,
            });
        }
        if attack_unit_count <= stop_until {
            return Err(ConfigError::ReserveTooLarge {
                attack_unit_count,
                stop_until,
            });
        }
        Ok(Self::unchecked(attack_unit_count, defend_unit_count, stop_until))
    }

    /// Internal constructor for configurations derived from a valid one.
    pub(crate) fn unchecked(attack_unit_count: usize, defend_unit_count: usize, stop_until: usize) -> Self {
        debug_assert!(attack_unit_count > 0 && defend_unit_count > 0);
        Self {
            attack_unit_count,
            defend_unit_count,
            stop_until,
        }
    }

    pub fn attack_unit_count(&self) -> usize {
        self.attack_unit_count
    }

    pub fn defend_unit_count(&self) -> usize {
        self.defend_unit_count
    }

    pub fn stop_until(&self) -> usize {
        self.stop_until
    }

    pub fn is_early_stop(&self) -> bool {
        self.stop_until > 0
    }

    /// Same reserve, new troop counts.
    pub fn with_new_units(&self, attack_unit_count: usize, defend_unit_count: usize) -> Self {
        Self::unchecked(attack_unit_count, defend_unit_count, self.stop_until)
    }

    /// The equivalent battle fought to the end with the reserve removed
    /// from the committed troops.
    pub fn without_stop_until(&self) -> Self {
        Self::unchecked(self.attack_unit_count - self.stop_until, self.defend_unit_count, 0)
    }
}

/// Tunables for the post-hoc reshaping of battle distributions.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BalanceConfig {
    win_chance_cutoff: f64,
    win_chance_power: f64,
    outcome_cutoff: f64,
    outcome_power: f64,
}

impl BalanceConfig {
    pub const fn new(
        win_chance_cutoff: f64,
        win_chance_power: f64,
        outcome_cutoff: f64,
        outcome_power: f64,
    ) -> Self {
        Self {
            win_chance_cutoff,
            win_chance_power,
            outcome_cutoff,
            outcome_power,
        }
    }

    pub fn win_chance_cutoff(&self) -> f64 {
        self.win_chance_cutoff
    }

    pub fn win_chance_power(&self) -> f64 {
        self.win_chance_power
    }

    pub fn outcome_cutoff(&self) -> f64 {
        self.outcome_cutoff
    }

    pub fn outcome_power(&self) -> f64 {
        self.outcome_power
    }

    fn bits(&self) -> [u64; 4] {
        [
            self.win_chance_cutoff.to_bits(),
            self.win_chance_power.to_bits(),
            self.outcome_cutoff.to_bits(),
            self.outcome_power.to_bits(),
        ]
    }
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self::new(0.05, 1.3, 0.1, 1.8)
    }
}

impl PartialEq for BalanceConfig {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for BalanceConfig {}

impl Hash for BalanceConfig {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}
