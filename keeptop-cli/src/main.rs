//! keeptop CLI — replay recorded training metrics through top-N checkpoint retention.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// keeptop: keep the N best checkpoints of a training run
#[derive(Parser, Debug)]
#[command(name = "keeptop", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (reads `.keeptop/config.toml`)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path (replaces workspace and user config)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only print errors
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Replay a JSON-lines metrics log, one object of metric values per epoch
    Replay {
        /// Metrics log file
        #[arg(short, long)]
        log: PathBuf,

        #[command(flatten)]
        overrides: commands::Overrides,
    },
    /// Print the effective configuration as TOML
    Config {
        #[command(flatten)]
        overrides: commands::Overrides,
    },
}

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| cli.workspace.clone());

    match cli.command {
        Commands::Replay { log, overrides } => {
            let config = commands::resolve_config(&workspace, cli.config.as_deref(), &overrides)?;
            let summary = commands::replay(&log, config)?;
            print!("{summary}");
        }
        Commands::Config { overrides } => {
            let config = commands::resolve_config(&workspace, cli.config.as_deref(), &overrides)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}
