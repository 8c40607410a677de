//! Headless battle-testing runner.
//!
//! # Usage
//!
//! ```bash
//! # Resolve a single battle and print the outcome as JSON
//! cargo run -p conquest_headless -- simulate --attacker a.ron --defender b.ron --seed 42
//!
//! # Fight every pairing of a roster
//! cargo run -p conquest_headless -- batch --roster ladder.ron --output results/
//!
//! # Run a spy mission
//! cargo run -p conquest_headless -- spy --attacker a.ron --defender b.ron --mission intel --spies 5
//! ```
//!
//! Outcomes go to stdout as JSON; logs go to stderr.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use conquest_core::engine::Engine;
use conquest_core::espionage::{CasualtyClass, MissionRequest};
use conquest_core::rate_limit::InMemoryHistory;
use conquest_core::ruleset::Ruleset;
use conquest_core::snapshot::parse_unit_type;
use conquest_headless::{
    batch::{run_batch, verify_determinism, BatchConfig},
    scenario::{load_army, Roster, ScenarioError},
};

#[derive(Parser)]
#[command(name = "conquest_headless")]
#[command(about = "Headless battle-testing runner for balance work and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Ruleset file to use instead of the built-in balance
    #[arg(long, global = true)]
    ruleset: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mission {
    Intel,
    Assassinate,
    Infiltrate,
}

#[derive(Clone, Copy, ValueEnum)]
enum TargetClass {
    Citizens,
    Offense,
    Defense,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve one battle between two army files
    Simulate {
        /// Attacking army (.ron or legacy .json)
        #[arg(short, long)]
        attacker: PathBuf,

        /// Defending army (.ron or legacy .json)
        #[arg(short, long)]
        defender: PathBuf,

        /// Turns to fight
        #[arg(short, long, default_value = "50")]
        turns: u32,

        /// Seed (drawn from OS entropy when absent)
        #[arg(long)]
        seed: Option<u64>,

        /// Include the per-round log in the output
        #[arg(long)]
        rounds: bool,
    },

    /// Fight every ordered pairing of a roster
    Batch {
        /// Roster file (the built-in standard roster when absent)
        #[arg(short, long)]
        roster: Option<PathBuf>,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Starting seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Turns per battle (the roster's setting when absent)
        #[arg(short, long)]
        turns: Option<u32>,

        /// Maximum battles to run (0 = all pairings)
        #[arg(long, default_value = "0")]
        max_battles: u32,

        /// Wall-clock budget in seconds (0 = unlimited)
        #[arg(long, default_value = "0")]
        time_budget_secs: u64,

        /// Worker threads (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: u32,
    },

    /// Verify determinism by resolving the same seed many times
    Verify {
        /// Attacking army
        #[arg(short, long)]
        attacker: PathBuf,

        /// Defending army
        #[arg(short, long)]
        defender: PathBuf,

        /// Turns to fight
        #[arg(short, long, default_value = "50")]
        turns: u32,

        /// Seed to verify
        #[arg(long, default_value = "12345")]
        seed: u64,

        /// Number of runs
        #[arg(short, long, default_value = "8")]
        runs: u32,
    },

    /// Print aggregated power for every roster entry
    Power {
        /// Roster file (the built-in standard roster when absent)
        #[arg(short, long)]
        roster: Option<PathBuf>,
    },

    /// Run an espionage mission
    Spy {
        /// Spying army
        #[arg(short, long)]
        attacker: PathBuf,

        /// Target army
        #[arg(short, long)]
        defender: PathBuf,

        /// Mission type
        #[arg(short, long, value_enum)]
        mission: Mission,

        /// Spies to send
        #[arg(short, long)]
        spies: u64,

        /// Assassination target class
        #[arg(long, value_enum, default_value = "defense")]
        class: TargetClass,

        /// Infiltration target unit type
        #[arg(long, default_value = "worker")]
        unit: String,

        /// Infiltration target level
        #[arg(long, default_value = "1")]
        level: u8,

        /// Seed (drawn from OS entropy when absent)
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr, stdout is for JSON output
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    if let Err(e) = run(cli) {
        tracing::error!(error = %e, "Command failed");
        eprintln!("FATAL: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), ScenarioError> {
    let engine = Engine::new(load_ruleset(cli.ruleset.as_deref())?)?;

    match cli.command {
        Commands::Simulate {
            attacker,
            defender,
            turns,
            seed,
            rounds,
        } => cmd_simulate(&engine, &attacker, &defender, turns, seed, rounds),
        Commands::Batch {
            roster,
            output,
            seed,
            turns,
            max_battles,
            time_budget_secs,
            parallel,
        } => {
            let roster = load_roster(&engine, roster.as_deref())?;
            let config = BatchConfig {
                roster: roster.name.clone(),
                seed_start: seed,
                turns,
                max_battles,
                time_budget_secs,
                parallel,
                output_dir: output,
            };
            cmd_batch(&engine, &roster, config)
        }
        Commands::Verify {
            attacker,
            defender,
            turns,
            seed,
            runs,
        } => cmd_verify(&engine, &attacker, &defender, turns, seed, runs),
        Commands::Power { roster } => {
            let roster = load_roster(&engine, roster.as_deref())?;
            cmd_power(&engine, &roster)
        }
        Commands::Spy {
            attacker,
            defender,
            mission,
            spies,
            class,
            unit,
            level,
            seed,
        } => {
            let request = match mission {
                Mission::Intel => MissionRequest::intel(spies),
                Mission::Assassinate => MissionRequest::assassinate(
                    spies,
                    match class {
                        TargetClass::Citizens => CasualtyClass::CitizenWorker,
                        TargetClass::Offense => CasualtyClass::Offense,
                        TargetClass::Defense => CasualtyClass::Defense,
                    },
                ),
                Mission::Infiltrate => MissionRequest::infiltrate(
                    spies,
                    parse_unit_type(&unit).map_err(conquest_core::error::EngineError::from)?,
                    level,
                ),
            };
            cmd_spy(&engine, &attacker, &defender, &request, seed)
        }
    }
}

fn load_ruleset(path: Option<&Path>) -> Result<Ruleset, ScenarioError> {
    match path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading ruleset");
            Ok(Ruleset::load(path)?)
        }
        None => Ok(Ruleset::default()),
    }
}

fn load_roster(engine: &Engine, path: Option<&Path>) -> Result<Roster, ScenarioError> {
    let roster = match path {
        Some(path) => Roster::load(path)?,
        None => Roster::standard(engine.ruleset()),
    };
    roster.validate(engine.ruleset())?;
    Ok(roster)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), ScenarioError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_simulate(
    engine: &Engine,
    attacker: &Path,
    defender: &Path,
    turns: u32,
    seed: Option<u64>,
    rounds: bool,
) -> Result<(), ScenarioError> {
    let attacker = load_army(engine.ruleset(), attacker)?;
    let defender = load_army(engine.ruleset(), defender)?;
    let mut outcome = engine.resolve_battle(&attacker, &defender, turns, seed)?;

    tracing::info!(
        seed = outcome.seed,
        verdict = ?outcome.verdict,
        turns = outcome.turns_resolved,
        pillaged = outcome.gold_pillaged,
        "Battle resolved"
    );
    if !rounds {
        outcome.log.clear();
    }
    print_json(&outcome)
}

fn cmd_batch(engine: &Engine, roster: &Roster, config: BatchConfig) -> Result<(), ScenarioError> {
    let output = config.output_dir.clone();
    std::fs::create_dir_all(&output)?;

    let results = run_batch(engine, roster, config);
    let results_path = output.join("batch_results.json");
    results.save(&results_path)?;

    eprintln!("\n{}", "=".repeat(50));
    eprintln!("BATCH COMPLETE");
    eprintln!("{}", "=".repeat(50));
    eprintln!("Battles fought: {}", results.battles.len());
    if results.skipped > 0 {
        eprintln!("Battles skipped: {}", results.skipped);
    }
    if !results.errors.is_empty() {
        eprintln!("Battles FAILED: {}", results.errors.len());
    }
    eprintln!("Duration: {:.2}s", results.duration_seconds);
    eprintln!(
        "Attacker victories: {}  Defeats: {}  Stalemates: {}",
        results.summary.victories, results.summary.defeats, results.summary.stalemates
    );
    eprintln!("\nWin Rates:");
    for (name, record) in &results.summary.entries {
        eprintln!(
            "  {:<16} overall {:>5.1}%  attack {:>5.1}%  defense {:>5.1}%",
            name,
            record.win_rate() * 100.0,
            record.attack_win_rate() * 100.0,
            record.defense_win_rate() * 100.0
        );
    }
    for error in results.errors.iter().take(10) {
        eprintln!(
            "  {} vs {} (seed {}): {}",
            error.attacker, error.defender, error.seed, error.message
        );
    }
    eprintln!("\nResults saved to: {}", results_path.display());
    Ok(())
}

fn cmd_verify(
    engine: &Engine,
    attacker: &Path,
    defender: &Path,
    turns: u32,
    seed: u64,
    runs: u32,
) -> Result<(), ScenarioError> {
    let attacker = load_army(engine.ruleset(), attacker)?;
    let defender = load_army(engine.ruleset(), defender)?;
    tracing::info!(seed, runs, "Verifying determinism");

    let report = verify_determinism(engine, &attacker, &defender, turns, seed, runs)?;
    if report.is_deterministic() {
        eprintln!("PASS: All {runs} runs produced identical results");
        Ok(())
    } else {
        eprintln!("FAIL: Non-determinism detected!");
        eprintln!("  Hashes: {:x?}", report.hashes);
        std::process::exit(1);
    }
}

fn cmd_power(engine: &Engine, roster: &Roster) -> Result<(), ScenarioError> {
    let figures: Vec<_> = roster
        .entries
        .iter()
        .map(|entry| {
            serde_json::json!({
                "name": entry.name,
                "owner": entry.army.owner,
                "power": engine.aggregate_stats(&entry.army),
            })
        })
        .collect();
    print_json(&figures)
}

fn cmd_spy(
    engine: &Engine,
    attacker: &Path,
    defender: &Path,
    request: &MissionRequest,
    seed: Option<u64>,
) -> Result<(), ScenarioError> {
    let attacker = load_army(engine.ruleset(), attacker)?;
    let defender = load_army(engine.ruleset(), defender)?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs());

    let outcome = engine.resolve_espionage(
        &attacker,
        &defender,
        request,
        seed,
        &InMemoryHistory::new(),
        now,
    )?;
    tracing::info!(
        mission = outcome.mission.name(),
        success = outcome.success,
        spies_lost = outcome.spies_lost,
        killed = outcome.units_killed_total(),
        "Mission resolved"
    );
    print_json(&outcome)
}
