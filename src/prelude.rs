//! Commonly used types and utilities for ease of import.

pub use crate::{
    calculate_ideal_units, calculate_win_chance, BalanceConfig, BattleConfig, BattleOdds,
    BattleSimulator, BattleStatus, BlitzMethod, FastBattleInfo, FastWinChanceInfo, OddsCaches,
    RandomSource, RoundConfig, RoundMethod,
};

#[cfg(feature = "cli")]
pub use crate::init_logging;
