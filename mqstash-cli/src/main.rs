//! mqstash - inspect and maintain stored broker messages and push properties

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use mockable::DefaultClock;
use mqstash_storage::sqlite::SqliteStore;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;

use commands::Command;
use config::Config;

const DEFAULT_CONFIG_PATH: &str = "mqstash.toml";

#[derive(Parser, Debug)]
#[command(name = "mqstash")]
#[command(about = "Inspect and maintain stored broker messages and push properties")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the database path from the configuration
    #[arg(short = 'd', long)]
    database: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short = 'v', long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let config = if args.config.exists() {
        Config::from_file(&args.config)?
    } else {
        if args.config.to_str() != Some(DEFAULT_CONFIG_PATH) {
            eprintln!("Config file not found: {}", args.config.display());
            std::process::exit(1);
        }
        // Use defaults if no config file and using default path
        Config::default()
    };

    // Initialize logging, on stderr so command output stays clean
    let log_level = if args.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };

    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let database = args.database.unwrap_or(config.storage.path.clone());
    debug!("Opening store at {}", database.display());
    let store = Arc::new(SqliteStore::new(&database)?);

    let lines = commands::run(
        args.command,
        store,
        Arc::new(DefaultClock),
        (&config.service).into(),
    )
    .await?;

    for line in lines {
        println!("{}", line);
    }

    Ok(())
}
