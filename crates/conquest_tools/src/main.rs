//! Conquest engine development tools.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use conquest_core::ruleset::Ruleset;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "conquest-tools")]
#[command(about = "Development tools for the conquest resolution engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a ruleset file
    Validate {
        /// Path to the RON ruleset
        path: PathBuf,
    },
    /// Convert a legacy JSON player record into typed army RON
    Normalize {
        /// Path to the legacy JSON record
        path: PathBuf,

        /// Ruleset to validate against (the built-in balance when absent)
        #[arg(long)]
        ruleset: Option<PathBuf>,

        /// Write the RON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { path } => {
            tracing::info!("Validating ruleset: {}", path.display());
            match conquest_tools::validate::validate_ruleset_file(&path) {
                Ok(summary) => tracing::info!(
                    units = summary.units,
                    items = summary.items,
                    forts = summary.forts,
                    fingerprint = format!("{:016x}", summary.fingerprint),
                    "Validation passed"
                ),
                Err(e) => {
                    tracing::error!("Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Normalize {
            path,
            ruleset,
            output,
        } => {
            if let Err(e) = normalize(&path, ruleset, output) {
                tracing::error!("Normalization failed: {e}");
                std::process::exit(1);
            }
        }
    }
}

fn normalize(
    path: &std::path::Path,
    ruleset: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<(), conquest_tools::ToolError> {
    let ruleset = match ruleset {
        Some(ruleset) => Ruleset::load(ruleset)?,
        None => Ruleset::default(),
    };
    let army = conquest_tools::normalize::normalize_legacy_file(&ruleset, path)?;
    let text = conquest_tools::normalize::to_ron(&army)?;
    match output {
        Some(output) => {
            std::fs::write(&output, text)?;
            tracing::info!("Wrote {}", output.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}
