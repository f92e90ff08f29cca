use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use lock_session_store_lib::config::{load_config, BackendKind, ConfigOverrides, StoreConfig};
use lock_session_store_lib::{lock_count, open_store, SessionTable};
use std::path::PathBuf;
use std::process::ExitCode;

/// Inspect and maintain persisted lock-manager session state
#[derive(Parser, Debug)]
#[command(name = "lock-state")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.lock-session-store/config.toml if present)
    #[arg(long, env = "LOCK_STATE_CONFIG")]
    config: Option<PathBuf>,

    /// Store backend, overriding the config file
    #[arg(long, value_enum, env = "LOCK_STATE_BACKEND")]
    backend: Option<BackendKind>,

    /// State file or database path, overriding the config file
    #[arg(long, env = "LOCK_STATE_PATH")]
    path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the persisted session table as JSON
    Show,
    /// Check that the persisted table decodes and report its size
    Verify,
    /// Replace the persisted table with an empty one
    Clear,
    /// Copy the persisted table into another store
    Migrate {
        /// Destination backend
        #[arg(long, value_enum)]
        to_backend: BackendKind,
        /// Destination path
        #[arg(long)]
        to_path: PathBuf,
    },
}

fn main() -> ExitCode {
    // Initialize logger
    env_logger::init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(
        cli.config.as_deref(),
        ConfigOverrides {
            backend: cli.backend,
            path: cli.path,
        },
    )?;

    let store = open_store(&config).context("Failed to open session store")?;

    let result = match cli.command {
        Command::Show => {
            let table = store.read().context("Failed to read session state")?;
            println!("{}", serde_json::to_string_pretty(&table)?);
            Ok(())
        }
        Command::Verify => {
            let table = store.read().map_err(|e| {
                anyhow!("Session state failed verification ({:?}): {}", e.kind(), e)
            })?;
            println!(
                "OK: {} sessions, {} locks",
                table.len(),
                lock_count(&table)
            );
            Ok(())
        }
        Command::Clear => {
            store
                .write(&SessionTable::new())
                .context("Failed to clear session state")?;
            log::info!("Cleared session state");
            Ok(())
        }
        Command::Migrate {
            to_backend,
            to_path,
        } => migrate(&*store, &config, to_backend, to_path),
    };

    store.close().context("Failed to close session store")?;
    result
}

fn migrate(
    source: &dyn lock_session_store_lib::SessionStore,
    config: &StoreConfig,
    to_backend: BackendKind,
    to_path: PathBuf,
) -> Result<()> {
    let destination_config = StoreConfig {
        backend: to_backend,
        path: Some(to_path),
        sqlite: config.sqlite.clone(),
    };

    if destination_config.backend == config.backend
        && destination_config.state_path() == config.state_path()
    {
        return Err(anyhow!("Source and destination are the same store"));
    }

    let table = source.read().context("Failed to read source session state")?;
    let destination =
        open_store(&destination_config).context("Failed to open destination store")?;

    destination
        .write(&table)
        .context("Failed to write destination session state")?;
    let written = destination
        .read()
        .context("Failed to read back destination session state")?;
    destination.close()?;

    if written != table {
        return Err(anyhow!("Destination store returned a different table"));
    }

    println!(
        "Migrated {} sessions ({} locks) to {}",
        table.len(),
        lock_count(&table),
        destination_config.state_path().display()
    );
    Ok(())
}
