//! Single-round loss distribution by brute-force enumeration of every dice
//! permutation, and the cache that keeps one table per round configuration.

use std::sync::{Arc, Mutex, OnceLock};

use log::debug;

use crate::common::lock;
use crate::config::RoundConfig;

/// Number of attacker losses when both sides' rolls are already sorted in
/// descending order. Only the first `min(len)` pairs are compared.
pub(crate) fn attack_losses(
    attack_desc: &[usize],
    defend_desc: &[usize],
    favour_defender_on_draw: bool,
) -> usize {
    attack_desc
        .iter()
        .zip(defend_desc.iter())
        .filter(|(a, d)| a < d || (a == d && favour_defender_on_draw))
        .count()
}

/// Chance of the attacker losing `i` units in one round, for
/// `i in 0..=challenge_count`.
#[derive(Debug)]
pub struct RoundInfo {
    config: RoundConfig,
    attack_loss_chances: OnceLock<Vec<f64>>,
}

impl RoundInfo {
    /// Create an uncalculated table for `config`.
    pub fn new(config: RoundConfig) -> Self {
        Self {
            config,
            attack_loss_chances: OnceLock::new(),
        }
    }

    pub fn config(&self) -> RoundConfig {
        self.config
    }

    pub fn is_ready(&self) -> bool {
        self.attack_loss_chances.get().is_some()
    }

    /// Calculated distribution, or `None` before [`RoundInfo::calculate`].
    pub fn attack_loss_chances(&self) -> Option<&[f64]> {
        self.attack_loss_chances.get().map(Vec::as_slice)
    }

    /// Compute the distribution on first call; later calls return the same
    /// slice.
    pub fn calculate(&self) -> &[f64] {
        self.attack_loss_chances
            .get_or_init(|| enumerate_round(&self.config))
    }
}

fn enumerate_round(config: &RoundConfig) -> Vec<f64> {
    let faces = config.dice_face_count();
    let attack_dice = config.attack_dice_count();
    let dice = attack_dice + config.defend_dice_count();
    let favour = config.favour_defender_on_draw();

    // mixed-radix counter over every ordered roll of every die
    let mut rolls = vec![0usize; dice];
    let mut attack_sorted = vec![0usize; attack_dice];
    let mut defend_sorted = vec![0usize; dice - attack_dice];
    let mut tallies = vec![0u64; config.challenge_count() + 1];
    let permutations = faces.pow(dice as u32);

    for _ in 0..permutations {
        attack_sorted.copy_from_slice(&rolls[..attack_dice]);
        defend_sorted.copy_from_slice(&rolls[attack_dice..]);
        attack_sorted.sort_unstable_by(|a, b| b.cmp(a));
        defend_sorted.sort_unstable_by(|a, b| b.cmp(a));

        tallies[attack_losses(&attack_sorted, &defend_sorted, favour)] += 1;

        for roll in rolls.iter_mut() {
            *roll += 1;
            if *roll < faces {
                break;
            }
            *roll = 0;
        }
    }

    debug!(
        "enumerated {} permutations for {:?}",
        permutations, config
    );
    tallies
        .into_iter()
        .map(|t| t as f64 / permutations as f64)
        .collect()
}

#[derive(Debug, Default)]
struct RoundTable {
    last: Option<Arc<RoundInfo>>,
    entries: Vec<Arc<RoundInfo>>,
}

/// Memoizes [`RoundInfo`] by round configuration. The most recently returned
/// entry is checked first since callers tend to repeat the same lookup.
#[derive(Debug, Default)]
pub struct RoundCache {
    table: Mutex<RoundTable>,
}

impl RoundCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing entry for `config` or a fresh uncalculated one.
    pub fn get(&self, config: RoundConfig) -> Arc<RoundInfo> {
        let mut table = lock(&self.table);
        if let Some(last) = table.last.as_ref().filter(|r| r.config == config) {
            return Arc::clone(last);
        }
        let info = match table.entries.iter().find(|r| r.config == config) {
            Some(found) => Arc::clone(found),
            None => {
                debug!("round cache miss for {:?}", config);
                let info = Arc::new(RoundInfo::new(config));
                table.entries.push(Arc::clone(&info));
                info
            }
        };
        table.last = Some(Arc::clone(&info));
        info
    }

    /// Fetch and calculate in one step.
    pub fn calculated(&self, config: RoundConfig) -> Arc<RoundInfo> {
        let info = self.get(config);
        info.calculate();
        info
    }

    pub fn len(&self) -> usize {
        lock(&self.table).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut table = lock(&self.table);
        table.last = None;
        table.entries.clear();
    }
}
