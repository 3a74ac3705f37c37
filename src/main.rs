//! Command-line bracket simulator.
//!
//! Builds a bracket, plays it out with seed-weighted random results, and
//! prints (or writes) the final snapshot as JSON.

use bracket_engine::config::{default_config_path, load_config_from, load_env_file};
use bracket_engine::logging::init_logging;
use bracket_engine::model::{BracketVariant, Player, SeedingPolicy};
use bracket_engine::service::BracketService;
use pico_args::Arguments;
use std::fs;
use std::path::PathBuf;
use tracing::info;

const HELP: &str = "\
Simulate a double-elimination bracket

USAGE:
  bracket-sim [OPTIONS]

OPTIONS:
  --players N           Number of generated players p1..pN  [default: 8]
  --entrants FILE       JSON array of players ({\"id\": .., \"seed\": ..}) instead of --players
  --variant NAME        double | single-final | single  [default: from config]
  --seeding NAME        ranked | random  [default: from config]
  --seed N              RNG seed for the draw and the results  [default: 1337]
  --config FILE         Engine config JSON  [default: bracket.json]
  --env-file FILE       Load KEY=value lines before reading the config  [default: .env]
  --out FILE            Write the snapshot here instead of stdout

FLAGS:
  -h, --help            Print help information
";

struct Args {
    players: u32,
    entrants: Option<PathBuf>,
    variant: Option<BracketVariant>,
    seeding: Option<SeedingPolicy>,
    seed: u64,
    config: Option<PathBuf>,
    env_file: PathBuf,
    out: Option<PathBuf>,
}

fn parse_args() -> Result<Args, String> {
    let mut pargs = Arguments::from_env();

    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        players: pargs
            .opt_value_from_str("--players")
            .map_err(|e| e.to_string())?
            .unwrap_or(8),
        entrants: pargs.opt_value_from_str("--entrants").map_err(|e| e.to_string())?,
        variant: pargs.opt_value_from_str("--variant").map_err(|e| e.to_string())?,
        seeding: pargs.opt_value_from_str("--seeding").map_err(|e| e.to_string())?,
        seed: pargs
            .opt_value_from_str("--seed")
            .map_err(|e| e.to_string())?
            .unwrap_or(1337),
        config: pargs.opt_value_from_str("--config").map_err(|e| e.to_string())?,
        env_file: pargs
            .opt_value_from_str("--env-file")
            .map_err(|e| e.to_string())?
            .unwrap_or_else(|| PathBuf::from(".env")),
        out: pargs.opt_value_from_str("--out").map_err(|e| e.to_string())?,
    };

    let rest = pargs.finish();
    if !rest.is_empty() {
        return Err(format!("unexpected arguments: {rest:?}"));
    }
    Ok(args)
}

fn load_players(args: &Args) -> Result<Vec<Player>, String> {
    match &args.entrants {
        Some(path) => {
            let data = fs::read_to_string(path)
                .map_err(|e| format!("read entrants {}: {e}", path.display()))?;
            serde_json::from_str(&data).map_err(|e| format!("parse entrants {}: {e}", path.display()))
        }
        None => Ok((1..=args.players)
            .map(|i| Player::seeded(format!("p{i}"), i))
            .collect()),
    }
}

fn run(args: Args) -> Result<(), String> {
    load_env_file(&args.env_file);
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let mut config = load_config_from(&config_path)?;
    if config.random_seed.is_none() {
        config.random_seed = Some(args.seed);
    }
    let _guard = init_logging(&config)?;

    let players = load_players(&args)?;
    let variant = args.variant.unwrap_or(config.default_variant);
    let seeding = args.seeding.unwrap_or(config.default_seeding);
    info!("bracket-sim starting: {} players", players.len());

    let service = BracketService::from_config(&config).map_err(|e| e.to_string())?;
    let record = service
        .create_bracket(&players, variant, seeding)
        .map_err(|e| e.to_string())?;
    let played = service.simulate(record.id, args.seed).map_err(|e| e.to_string())?;
    let snapshot = service.snapshot(record.id).map_err(|e| e.to_string())?;
    info!(
        "{} finished after {played} matches, champion {:?}",
        record.id, snapshot.tournament.champion_id
    );

    let json = serde_json::to_string_pretty(&snapshot).map_err(|e| e.to_string())?;
    match &args.out {
        Some(path) => fs::write(path, json).map_err(|e| format!("write {}: {e}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

fn main() {
    let result = parse_args().and_then(run);
    if let Err(e) = result {
        eprintln!("bracket-sim: {e}");
        std::process::exit(1);
    }
}
