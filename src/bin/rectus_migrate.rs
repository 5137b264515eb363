use clap::{Parser, Subcommand};
use log::{error, info};
use rectus::logging::LoggingSystem;
use rectus::password::{hash_password, verify_password};
use rectus::{
    load_config, MigrationReport, MigrationRunner, RectusEngine, RectusError, RectusResult,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::task::JoinError;

#[derive(Parser)]
#[command(author, version, about = "Apply and inspect rectus schema migrations", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the engine configuration file (TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the recorded version and whether it is dirty
    Status,
    /// Apply pending migrations
    Up {
        /// Apply at most this many units
        #[arg(long)]
        steps: Option<u32>,
    },
    /// Revert applied migrations
    Down {
        /// Revert at most this many units
        #[arg(long)]
        steps: Option<u32>,
    },
    /// Record a version as clean without running anything
    Force {
        #[arg(required = true)]
        version: u32,
    },
    /// Revert everything then apply everything (refused in production)
    Reset,
    /// Print an argon2 hash of a password
    Hash {
        #[arg(required = true)]
        password: String,
    },
}

fn print_report(action: &str, report: &MigrationReport) {
    if report.is_noop() {
        println!("{}: nothing to do (version {})", action, report.to);
    } else {
        println!("{}: version {} -> {}", action, report.from, report.to);
    }
}

fn handle_hash(password: &str) -> RectusResult<()> {
    let phc = hash_password(password)?;
    if !verify_password(password, &phc)? {
        return Err(RectusError::storage("generated hash does not verify"));
    }
    println!("{}", phc);
    Ok(())
}

fn joined(result: Result<RectusResult<MigrationReport>, JoinError>) -> RectusResult<MigrationReport> {
    result.map_err(|e| RectusError::storage(format!("migration task failed: {}", e)))?
}

/// Opens the engine named by `config` with logging set up.
fn open_runner(config: Option<&Path>) -> RectusResult<Arc<MigrationRunner>> {
    let config = load_config(config)?;
    if let Err(e) = LoggingSystem::init(&config.logging) {
        eprintln!("Failed to initialise logging: {}", e);
    }
    info!(
        "Opening {} ({} environment)",
        config.storage_path.display(),
        config.environment
    );
    let engine = RectusEngine::open(config)?;
    Ok(Arc::clone(engine.migrations()))
}

async fn run(cli: Cli) -> RectusResult<()> {
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Hash { password } => handle_hash(&password)?,
        Commands::Status => {
            let status = open_runner(config)?.status()?;
            println!("version:  {}", status.version);
            println!("dirty:    {}", status.dirty);
            println!("latest:   {}", status.latest);
            println!("pending:  {}", status.pending);
            println!(
                "checksum: {}{}",
                if status.checksum.is_empty() { "-" } else { status.checksum.as_str() },
                if status.checksum_ok { "" } else { " (does not match registered migrations)" }
            );
        }
        Commands::Up { steps } => {
            let runner = open_runner(config)?;
            print_report("up", &joined(runner.spawn_up(steps).await)?)
        }
        Commands::Down { steps } => {
            let runner = open_runner(config)?;
            print_report("down", &joined(runner.spawn_down(steps).await)?)
        }
        Commands::Force { version } => {
            let status = open_runner(config)?.force(version)?;
            println!("forced: version {} (clean)", status.version);
        }
        Commands::Reset => {
            let runner = open_runner(config)?;
            print_report("reset", &joined(runner.spawn_reset().await)?)
        }
    }
    Ok(())
}

/// Exit codes: 0 on success, 2 when the migration state is dirty, 1 for any
/// other failure.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_migration_dirty() => {
            error!("{}", e);
            eprintln!("dirty: {}", e);
            ExitCode::from(2)
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
