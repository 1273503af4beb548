use anyhow::anyhow;
use clap::{Parser, ValueEnum};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use risk_dice::{
    calculate_ideal_units, init_logging, BalanceConfig, BattleConfig, BattleSimulator, BlitzMethod,
    FastBattleInfo, OddsCaches, RoundConfig,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Method {
    Dice,
    Rounds,
    Battle,
}

impl From<Method> for BlitzMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::Dice => BlitzMethod::DiceRoll,
            Method::Rounds => BlitzMethod::OddsBasedRound,
            Method::Battle => BlitzMethod::OddsBasedBattle,
        }
    }
}

#[derive(Parser)]
enum Commands {
    /// Print win, loss and unresolved chances for a battle.
    Odds {
        #[arg(long)]
        attackers: usize,
        #[arg(long)]
        defenders: usize,
        #[arg(long, default_value_t = 0, help = "Units the attacker keeps back")]
        stop_until: usize,
        #[arg(long, help = "Use the large-army approximation")]
        fast: bool,
        #[arg(long, help = "Apply the default balance reshaping")]
        balanced: bool,
    },
    /// Print the attacker count needed to reach a win chance.
    Ideal {
        #[arg(long)]
        defenders: usize,
        #[arg(long, default_value_t = 0.8)]
        threshold: f32,
        #[arg(long)]
        balanced: bool,
    },
    /// Resolve a battle and print the survivors.
    Blitz {
        #[arg(long)]
        attackers: usize,
        #[arg(long)]
        defenders: usize,
        #[arg(long, default_value_t = 0)]
        stop_until: usize,
        #[arg(long, help = "Fix RNG seed for reproducible battles (e.g., --seed 12345)")]
        seed: Option<u64>,
        #[arg(long, value_enum, default_value_t = Method::Battle)]
        method: Method,
        #[arg(long)]
        balanced: bool,
    },
}

fn balance(enabled: bool) -> Option<BalanceConfig> {
    enabled.then(BalanceConfig::default)
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let caches = OddsCaches::shared();
    let round = RoundConfig::default();

    match cli.command {
        Commands::Odds {
            attackers,
            defenders,
            stop_until,
            fast,
            balanced,
        } => {
            let battle = BattleConfig::new(attackers, defenders, stop_until).map_err(|e| anyhow!(e))?;
            let odds = if fast {
                FastBattleInfo::new(round, battle).calculate(caches).clone()
            } else {
                caches.battles().get(round, battle).calculate(caches).clone()
            };
            let odds = match balance(balanced) {
                Some(config) => risk_dice::balanced(&odds, config),
                None => odds,
            };
            println!("attacker wins:  {:.6}", odds.attack_win_chance());
            println!("defender wins:  {:.6}", odds.defend_win_chance());
            if battle.is_early_stop() {
                println!("unresolved:     {:.6}", odds.unresolved_chance());
            }
        }
        Commands::Ideal {
            defenders,
            threshold,
            balanced,
        } => {
            let ideal = calculate_ideal_units(caches, defenders, threshold, round, balance(balanced));
            println!("{} attackers for {:.0}% against {}", ideal, threshold * 100.0, defenders);
        }
        Commands::Blitz {
            attackers,
            defenders,
            stop_until,
            seed,
            method,
            balanced,
        } => {
            let battle = BattleConfig::new(attackers, defenders, stop_until).map_err(|e| anyhow!(e))?;
            let rng = match seed {
                Some(s) => {
                    println!("Using fixed seed: {} (battle will be reproducible)", s);
                    SmallRng::seed_from_u64(s)
                }
                None => {
                    let mut seed_rng = rand::rng();
                    SmallRng::from_rng(&mut seed_rng)
                }
            };
            let mut sim = BattleSimulator::with_configs(caches, battle, round, balance(balanced), rng);
            sim.blitz(method.into());
            println!(
                "{:?}: attacker {} left (lost {}), defender {} left (lost {})",
                sim.status(),
                sim.remaining_attack_count(),
                sim.attack_loss_count(),
                sim.remaining_defend_count(),
                sim.defend_loss_count()
            );
        }
    }
    Ok(())
}
