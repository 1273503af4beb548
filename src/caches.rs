//! The set of memoization tables every odds query runs against.

use std::sync::OnceLock;

use log::debug;

use crate::battle::BattleCache;
use crate::fast_battle_end::FastBattleEndCache;
use crate::multi_round::MultiRoundCache;
use crate::round::RoundCache;
use crate::win_chance::WinChanceCache;

/// Owns one instance of each cache table. Each table has its own lock, so
/// a shared `&OddsCaches` can be queried from any number of threads.
#[derive(Debug, Default)]
pub struct OddsCaches {
    rounds: RoundCache,
    battles: BattleCache,
    fast_ends: FastBattleEndCache,
    multi_rounds: MultiRoundCache,
    win_chances: WinChanceCache,
}

impl OddsCaches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide instance for callers without their own.
    pub fn shared() -> &'static OddsCaches {
        static SHARED: OnceLock<OddsCaches> = OnceLock::new();
        SHARED.get_or_init(OddsCaches::new)
    }

    pub fn rounds(&self) -> &RoundCache {
        &self.rounds
    }

    pub fn battles(&self) -> &BattleCache {
        &self.battles
    }

    pub fn fast_ends(&self) -> &FastBattleEndCache {
        &self.fast_ends
    }

    pub fn multi_rounds(&self) -> &MultiRoundCache {
        &self.multi_rounds
    }

    pub fn win_chances(&self) -> &WinChanceCache {
        &self.win_chances
    }

    /// Drop every cached entry. Results already handed out stay valid.
    pub fn clear(&self) {
        self.rounds.clear();
        self.battles.clear();
        self.fast_ends.clear();
        self.multi_rounds.clear();
        self.win_chances.clear();
        debug!("odds caches cleared");
    }
}
