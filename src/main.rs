/// Command-line entry point: ingest event streams into the store, then build
/// forecasts from what was stored.
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use prescience_ledger::{
    config::{self, AppConfig},
    game_data::GameData,
    init_logging,
    log_event::parse_json_lines,
    pipeline,
    store::Store,
};

#[derive(Parser, Debug)]
#[command(name = "prescience-ledger")]
#[command(about = "Replay raid logs and forecast what an Augmentation Evoker's buffs are worth")]
#[command(version)]
struct Args {
    /// Directory holding config.toml, the database and logs
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Simulate every supported encounter in a JSON-lines event file and store it
    Ingest {
        /// Parsed combat log, one event per line
        #[arg(long)]
        events: PathBuf,
    },
    /// Print the forecast for a group as JSON, followed by the packed payload in hex
    Forecast {
        /// Guid of the Augmentation Evoker
        #[arg(long)]
        aug: String,

        /// Group member as guid:name:spec (repeatable)
        #[arg(long = "member", required = true)]
        members: Vec<String>,

        #[arg(long)]
        encounter: u32,

        #[arg(long)]
        difficulty: u32,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = config::load_or_default(&args.config_dir)?;
    let _guard = init_logging(&args.config_dir.join("logs"), &cfg.log_directive)?;

    match args.command {
        Command::Ingest { events } => ingest(&args.config_dir, &cfg, &events),
        Command::Forecast { aug, members, encounter, difficulty } => {
            forecast(&args.config_dir, &cfg, &aug, &members, encounter, difficulty)
        }
    }
}

fn load_game_data(cfg: &AppConfig) -> Result<GameData> {
    match &cfg.game_data_path {
        Some(path) => GameData::load(path),
        None => Ok(GameData::embedded().clone()),
    }
}

fn ingest(config_dir: &std::path::Path, cfg: &AppConfig, events: &std::path::Path) -> Result<()> {
    let raw = std::fs::read_to_string(events)
        .map_err(|e| anyhow::anyhow!("Event file read error ({}): {}", events.display(), e))?;
    let events = parse_json_lines(&raw);
    let game_data = load_game_data(cfg)?;

    let report = pipeline::process(&events, cfg, &game_data);
    let mut store = Store::open(&cfg.db_path_in(config_dir))?;
    let stored = pipeline::store_report(&mut store, &report)?;

    println!(
        "simulated {} encounters ({} player attempts stored), deferred {}, skipped {}, filtered {}",
        report.simulated.len(),
        stored,
        report.deferred.len(),
        report.skipped,
        report.filtered
    );
    if let Some(offset) = report.resume_offset() {
        println!("newer build seen; re-read from byte {} once supported", offset);
    }
    Ok(())
}

fn forecast(
    config_dir: &std::path::Path,
    cfg:        &AppConfig,
    aug:        &str,
    members:    &[String],
    encounter:  u32,
    difficulty: u32,
) -> Result<()> {
    let members = members
        .iter()
        .map(|m| pipeline::parse_member(m))
        .collect::<Result<Vec<_>>>()?;
    let store = Store::open(&cfg.db_path_in(config_dir))?;

    let fc = pipeline::forecast(&store, cfg, aug, &members, encounter, difficulty)?;
    let json = serde_json::to_string_pretty(&fc)
        .map_err(|e| anyhow::anyhow!("Forecast serialize error: {}", e))?;
    println!("{}", json);

    let packed = fc.pack()?;
    let hex: String = packed.iter().map(|b| format!("{:02x}", b)).collect();
    println!("{}", hex);
    Ok(())
}
