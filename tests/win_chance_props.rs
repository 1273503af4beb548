use proptest::prelude::*;
use risk_dice::{
    calculate_win_chance, BalanceConfig, BattleConfig, FastWinChanceInfo, OddsCaches, RoundConfig,
    WinChanceInfo,
};

fn table(size: usize, balance: Option<BalanceConfig>) -> (OddsCaches, WinChanceInfo) {
    let caches = OddsCaches::new();
    let info = WinChanceInfo::new(size, RoundConfig::default(), balance).unwrap();
    info.calculate(&caches);
    (caches, info)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn more_attackers_never_hurt(a in 1usize..39, d in 1usize..40) {
        let (_caches, info) = table(40, None);
        let lower = info.win_chance(a, d).unwrap();
        let higher = info.win_chance(a + 1, d).unwrap();
        prop_assert!(higher + 1e-6 >= lower);
    }

    #[test]
    fn more_defenders_never_help(a in 1usize..40, d in 1usize..39) {
        let (_caches, info) = table(40, None);
        let lower = info.win_chance(a, d + 1).unwrap();
        let higher = info.win_chance(a, d).unwrap();
        prop_assert!(higher + 1e-6 >= lower);
    }

    #[test]
    fn balanced_table_stays_in_unit_interval(a in 0usize..30, d in 0usize..30) {
        let (_caches, info) = table(30, Some(BalanceConfig::default()));
        let w = info.win_chance(a, d).unwrap();
        prop_assert!((0.0..=1.0).contains(&w));
    }
}

#[test]
fn helper_and_fast_query_agree() {
    let caches = OddsCaches::new();
    let round = RoundConfig::default();
    let fast = FastWinChanceInfo::new(round, None);
    for (a, d) in [(8, 8), (30, 20), (50, 60)] {
        let table = calculate_win_chance(&caches, BattleConfig::new(a, d, 0).unwrap(), round, None);
        let point = fast.win_chance(&caches, a, d);
        assert!((table - point).abs() < 1e-3, "{}v{}: {} vs {}", a, d, table, point);
    }
}

#[test]
fn helper_grows_shared_table() {
    let caches = OddsCaches::new();
    let round = RoundConfig::default();
    calculate_win_chance(&caches, BattleConfig::new(10, 10, 0).unwrap(), round, None);
    let small = caches.win_chances().get(10, round, None);
    calculate_win_chance(&caches, BattleConfig::new(100, 10, 0).unwrap(), round, None);
    let large = caches.win_chances().get(100, round, None);
    assert!(large.size() > small.size());
    assert_eq!(caches.win_chances().len(), 1);
}
