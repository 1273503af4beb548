//! Probability engine for Risk-style dice combat.
//!
//! Loss distributions are built bottom-up: exact single-round odds, exact
//! recursive battle odds for small armies, and an approximation path for
//! large armies that joins multi-round convolutions with endgame tables.
//! Every table lives in an [`OddsCaches`] passed to each query.

mod balance;
mod battle;
mod caches;
mod common;
mod config;
mod fast_battle;
mod fast_battle_end;
mod fast_win_chance;
mod helper;
#[cfg(feature = "cli")]
mod logging;
mod multi_round;
pub mod prelude;
mod rng;
mod round;
mod simulator;
mod win_chance;

pub use balance::{balance_win_chance, balanced, BalancedBattleInfo};
pub use battle::{BattleCache, BattleInfo, BattleOdds};
pub use caches::OddsCaches;
pub use common::*;
pub use config::*;
pub use fast_battle::FastBattleInfo;
pub use fast_battle_end::{FastBattleEndCache, FastBattleEndInfo};
pub use fast_win_chance::FastWinChanceInfo;
pub use helper::{calculate_ideal_units, calculate_win_chance};
#[cfg(feature = "cli")]
pub use logging::init_logging;
pub use multi_round::{MultiRoundCache, MultiRoundCacheInfo, MultiRoundLossInfo};
pub use rng::RandomSource;
pub use round::{RoundCache, RoundInfo};
pub use simulator::{BattleSimulator, BattleStatus, BlitzMethod, RoundMethod};
pub use win_chance::{WinChanceCache, WinChanceInfo};
