//! charlie-store CLI - schema migration runner for the Charlie backend.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

use charlie_store::{DbPool, Migrator, StoreConfig, StoreError, BASE};

#[derive(Parser)]
#[command(name = "charlie-store")]
#[command(about = "Schema migrations for the Charlie backend store")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file; falls back to DATABASE_URL when absent
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database URL override (sqlite:... or postgres://...)
    #[arg(long)]
    database_url: Option<String>,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply, revert, or inspect schema revisions
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply pending revisions
    Up {
        /// Stop after this revision instead of going to head
        #[arg(long)]
        to: Option<String>,
    },

    /// Revert revisions; the target revision stays applied
    Down {
        /// Revision to stop at, or "base" to revert everything
        #[arg(long)]
        to: String,
    },

    /// Print the current revision
    Current,

    /// List the revision chain with applied markers
    History,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run() -> Result<(), StoreError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = load_config(&cli)?;
    let pool = DbPool::connect(&config).await?;
    let migrator = Migrator::new(pool)?;

    match cli.command {
        Commands::Migrate { action } => match action {
            MigrateAction::Up { to } => {
                let applied = migrator.up(to.as_deref()).await?;
                if applied.is_empty() {
                    println!("Already up to date");
                } else {
                    for id in &applied {
                        println!("applied   {}", id);
                    }
                    info!(count = applied.len(), "upgrade complete");
                }
            }
            MigrateAction::Down { to } => {
                let reverted = migrator.down(&to).await?;
                if reverted.is_empty() {
                    println!("Nothing to revert");
                } else {
                    for id in &reverted {
                        println!("reverted  {}", id);
                    }
                    info!(count = reverted.len(), "downgrade complete");
                }
            }
            MigrateAction::Current => match migrator.current().await? {
                Some(id) => println!("{}", id),
                None => println!("{}", BASE),
            },
            MigrateAction::History => {
                for status in migrator.history().await? {
                    let marker = if status.applied { "x" } else { " " };
                    println!("[{}] {:<24} {}", marker, status.id, status.label);
                }
            }
        },
    }

    Ok(())
}

/// Config file when given, otherwise environment; a --database-url flag
/// overrides whichever source was used.
fn load_config(cli: &Cli) -> Result<StoreConfig, StoreError> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::from_yaml_file(path)?,
        None if cli.database_url.is_some() => StoreConfig {
            database_url: String::new(),
            encryption_key: None,
            max_connections: 10,
            busy_timeout_ms: 5_000,
        },
        None => StoreConfig::from_env()?,
    };
    if let Some(url) = &cli.database_url {
        config.database_url = url.clone();
    }
    config.validate()?;
    Ok(config)
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
