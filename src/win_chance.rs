//! Dense win-chance tables built by dynamic programming over unit counts.

use std::sync::{Arc, Mutex, OnceLock};

use log::debug;

use crate::balance::balance_win_chance;
use crate::caches::OddsCaches;
use crate::common::{lock, ConfigError};
use crate::config::{BalanceConfig, BattleConfig, RoundConfig, MIN_WIN_CHANCE_TABLE_SIZE};

/// `size × size` table where entry `(a, d)` is the chance `a` attackers
/// wipe out `d` defenders.
#[derive(Debug)]
pub struct WinChanceInfo {
    size: usize,
    round_config: RoundConfig,
    balance_config: Option<BalanceConfig>,
    win_chances: OnceLock<Vec<f32>>,
}

impl WinChanceInfo {
    pub fn new(
        size: usize,
        round_config: RoundConfig,
        balance_config: Option<BalanceConfig>,
    ) -> Result<Self, ConfigError> {
        if size <= 2 {
            return Err(ConfigError::TableTooSmall(size));
        }
        Ok(Self {
            size,
            round_config,
            balance_config,
            win_chances: OnceLock::new(),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn round_config(&self) -> RoundConfig {
        self.round_config
    }

    pub fn balance_config(&self) -> Option<BalanceConfig> {
        self.balance_config
    }

    pub fn is_ready(&self) -> bool {
        self.win_chances.get().is_some()
    }

    /// Win chance for `attackers` against `defenders`, once calculated.
    pub fn win_chance(&self, attackers: usize, defenders: usize) -> Option<f32> {
        if attackers >= self.size || defenders >= self.size {
            return None;
        }
        self.win_chances
            .get()
            .map(|table| table[attackers * self.size + defenders])
    }

    /// Row-major table, once calculated.
    pub fn win_chances(&self) -> Option<&[f32]> {
        self.win_chances.get().map(Vec::as_slice)
    }

    pub fn calculate(&self, caches: &OddsCaches) -> &[f32] {
        self.win_chances.get_or_init(|| self.build(caches))
    }

    fn build(&self, caches: &OddsCaches) -> Vec<f32> {
        let size = self.size;
        let max_attack = self.round_config.attack_dice_count();
        let max_defend = self.round_config.defend_dice_count();

        // round_chances[a][d]: single-round odds with a and d dice in play
        let mut round_chances = vec![vec![Vec::new(); max_defend + 1]; max_attack + 1];
        for (a, row) in round_chances.iter_mut().enumerate().skip(1) {
            for (d, chances) in row.iter_mut().enumerate().skip(1) {
                let round = self
                    .round_config
                    .with_battle(&BattleConfig::unchecked(a, d, 0));
                let info = caches.rounds().calculated(round);
                *chances = info.calculate().iter().map(|&c| c as f32).collect::<Vec<f32>>();
            }
        }

        let mut table = vec![0.0f32; size * size];
        for a in 0..size {
            for d in 0..size {
                if a == 0 || d == 0 {
                    table[a * size + d] = if a > 0 { 1.0 } else { 0.0 };
                    continue;
                }
                let round_a = a.min(max_attack);
                let round_d = d.min(max_defend);
                let challenges = round_a.min(round_d);
                let chances = &round_chances[round_a][round_d];
                let mut win = 0.0;
                for o in (0..=challenges).take_while(|&o| a > o) {
                    win += chances[o] * table[(a - o) * size + (d - challenges + o)];
                }
                table[a * size + d] = win;
            }
        }

        if let Some(balance) = &self.balance_config {
            table
                .iter_mut()
                .for_each(|w| *w = balance_win_chance(*w, balance));
        }
        debug!("built {}x{} win chance table", size, size);
        table
    }
}

/// Win-chance tables keyed by round and balance configuration. A request
/// beyond an entry's size replaces it with a table at the next power of two.
#[derive(Debug, Default)]
pub struct WinChanceCache {
    entries: Mutex<Vec<Arc<WinChanceInfo>>>,
}

fn next_cache_size(required: usize) -> usize {
    (required + 1).next_power_of_two().max(MIN_WIN_CHANCE_TABLE_SIZE)
}

impl WinChanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table covering at least `required_size` units per side.
    pub fn get(
        &self,
        required_size: usize,
        round_config: RoundConfig,
        balance_config: Option<BalanceConfig>,
    ) -> Arc<WinChanceInfo> {
        let size = next_cache_size(required_size) + 1;
        let fresh = || {
            Arc::new(WinChanceInfo {
                size,
                round_config,
                balance_config,
                win_chances: OnceLock::new(),
            })
        };

        let mut entries = lock(&self.entries);
        let found = entries
            .iter()
            .position(|e| e.round_config == round_config && e.balance_config == balance_config);
        match found {
            Some(i) if required_size < entries[i].size => Arc::clone(&entries[i]),
            Some(i) => {
                debug!(
                    "growing win chance table from {} to {}",
                    entries[i].size, size
                );
                entries.remove(i);
                let info = fresh();
                entries.push(Arc::clone(&info));
                info
            }
            None => {
                let info = fresh();
                entries.push(Arc::clone(&info));
                info
            }
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_tiny_tables() {
        assert_eq!(
            WinChanceInfo::new(2, RoundConfig::default(), None).unwrap_err(),
            ConfigError::TableTooSmall(2)
        );
        assert!(WinChanceInfo::new(3, RoundConfig::default(), None).is_ok());
    }

    #[test]
    fn table_matches_exact_battles() {
        let caches = OddsCaches::new();
        let round = RoundConfig::default();
        let info = WinChanceInfo::new(12, round, None).unwrap();
        info.calculate(&caches);
        for (a, d) in [(1, 1), (3, 2), (5, 7), (11, 11)] {
            let exact = caches
                .battles()
                .get(round, BattleConfig::new(a, d, 0).unwrap());
            let exact = exact.calculate(&caches).attack_win_chance();
            let table = info.win_chance(a, d).unwrap();
            assert!((table as f64 - exact).abs() < 1e-4, "{}v{}", a, d);
        }
        assert_eq!(info.win_chance(0, 4), Some(0.0));
        assert_eq!(info.win_chance(4, 0), Some(1.0));
        assert_eq!(info.win_chance(12, 1), None);
    }

    #[test]
    fn cache_grows_by_powers_of_two() {
        let cache = WinChanceCache::new();
        let round = RoundConfig::default();
        let small = cache.get(10, round, None);
        assert_eq!(small.size(), 65);
        assert!(Arc::ptr_eq(&small, &cache.get(64, round, None)));

        let large = cache.get(65, round, None);
        assert_eq!(large.size(), 129);
        assert_eq!(cache.len(), 1);

        let balanced = cache.get(10, round, Some(BalanceConfig::default()));
        assert!(!Arc::ptr_eq(&balanced, &large));
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
