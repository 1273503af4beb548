use rand::{rngs::SmallRng, SeedableRng};
use risk_dice::{BattleConfig, BattleSimulator, BlitzMethod, OddsCaches};
use serde_json::json;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 4 {
        eprintln!("Usage: {} <attackers> <defenders> <seed>", args[0]);
        std::process::exit(1);
    }
    let attackers: usize = args[1].parse()?;
    let defenders: usize = args[2].parse()?;
    let seed: u64 = args[3].parse()?;

    let battle = BattleConfig::new(attackers, defenders, 0).map_err(|e| anyhow::anyhow!(e))?;
    let caches = OddsCaches::new();

    let mut results = Vec::new();
    for method in [BlitzMethod::DiceRoll, BlitzMethod::OddsBasedRound, BlitzMethod::OddsBasedBattle] {
        let mut sim = BattleSimulator::new(&caches, battle, SmallRng::seed_from_u64(seed));
        sim.blitz(method);
        results.push(json!({
            "method": method,
            "status": sim.status(),
            "attack_losses": sim.attack_loss_count(),
            "defend_losses": sim.defend_loss_count(),
        }));
    }

    let result = json!({
        "attackers": attackers,
        "defenders": defenders,
        "seed": seed,
        "results": results,
    });

    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}
