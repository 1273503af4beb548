use proptest::prelude::*;
use risk_dice::{sum, RoundCache, RoundConfig};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn round_chances_sum_to_one(
        faces in 2usize..9,
        attack in 1usize..4,
        defend in 1usize..4,
        favour in any::<bool>(),
    ) {
        let config = RoundConfig::new(faces, attack, defend, favour).unwrap();
        let cache = RoundCache::new();
        let info = cache.calculated(config);
        let chances = info.calculate();
        prop_assert_eq!(chances.len(), config.challenge_count() + 1);
        prop_assert!((sum(chances) - 1.0).abs() < 1e-9);
        prop_assert!(chances.iter().all(|&c| c >= 0.0));
    }
}

#[test]
fn classic_three_versus_two() {
    let cache = RoundCache::new();
    let info = cache.calculated(RoundConfig::default());
    let expected = [0.3717, 0.3358, 0.2926];
    for (c, e) in info.calculate().iter().zip(expected) {
        assert!((c - e).abs() < 1e-3);
    }
}

#[test]
fn ties_to_attacker_improve_odds() {
    let cache = RoundCache::new();
    let fair = RoundConfig::new(6, 1, 1, false).unwrap();
    let chances = cache.calculated(fair).calculate().to_vec();
    assert!((chances[0] - 21.0 / 36.0).abs() < 1e-12);
}

#[test]
fn calculate_is_idempotent() {
    let cache = RoundCache::new();
    let info = cache.get(RoundConfig::default());
    let first = info.calculate().to_vec();
    let second = info.calculate().to_vec();
    assert_eq!(first, second);
}
