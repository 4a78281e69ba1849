use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::App;
use crate::config::{AppConfig, ConfigLoader, ConfigPaths, CONFIG_ENV, DATA_ENV};
use crate::storage::{self, CardStore, MemoryKeyValueStore};

pub mod commands;

use self::commands::{DeleteArgs, EditArgs, ListArgs, NewArgs, TuiArgs};

#[derive(Parser, Debug)]
#[command(
    name = "cardtui",
    version,
    about = "Keyboard-first terminal card board"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over CARDTUI_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over CARDTUI_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch the interactive card board (default)
    Tui(TuiArgs),
    /// Create a card from the command line
    New(NewArgs),
    /// Print cards, optionally filtered by search term and category
    List(ListArgs),
    /// Delete a card by id
    Delete(DeleteArgs),
    /// Replace the title or description of a card
    Edit(EditArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogTarget {
    Stderr,
    File,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var(CONFIG_ENV, path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var(DATA_ENV, path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    let command = cli.command.unwrap_or(Commands::Tui(TuiArgs::default()));
    let target = match command {
        Commands::Tui(_) => LogTarget::File,
        _ => LogTarget::Stderr,
    };
    init_tracing(&cli.log_level, target, &paths)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = Arc::new(loader.load_or_init()?);

    match command {
        Commands::Tui(args) => {
            let store = if args.ephemeral {
                ephemeral_store(&config)
            } else {
                storage::init(&paths, &config.storage)?
            };
            let mut app = App::new(config, store)?;
            commands::run_tui(&mut app)
        }
        Commands::New(args) => {
            let mut store = storage::init(&paths, &config.storage)?;
            print!("{}", commands::create_card(&mut store, args)?);
            Ok(())
        }
        Commands::List(args) => {
            let store = storage::init(&paths, &config.storage)?;
            print!("{}", commands::list_cards(&store, &args)?);
            Ok(())
        }
        Commands::Delete(args) => {
            let mut store = storage::init(&paths, &config.storage)?;
            print!("{}", commands::delete_card(&mut store, &args)?);
            Ok(())
        }
        Commands::Edit(args) => {
            let mut store = storage::init(&paths, &config.storage)?;
            print!("{}", commands::edit_card(&mut store, &args)?);
            Ok(())
        }
    }
}

/// In-memory store seeded like a fresh install; nothing outlives the session.
fn ephemeral_store(config: &AppConfig) -> CardStore {
    let backend = match config.storage.capacity() {
        Some(capacity) => MemoryKeyValueStore::with_capacity(capacity),
        None => MemoryKeyValueStore::new(),
    };
    tracing::info!("running with an ephemeral in-memory store");
    if config.storage.seed_defaults {
        CardStore::with_defaults(Box::new(backend), config.storage.storage_key.clone())
    } else {
        CardStore::new(Box::new(backend), config.storage.storage_key.clone())
    }
}

fn init_tracing(level: &str, target: LogTarget, paths: &ConfigPaths) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        match target {
            LogTarget::Stderr => fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init(),
            LogTarget::File => {
                // the alternate screen owns stderr while the board is up
                let log_path = paths.log_file();
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&log_path)
                    .with_context(|| format!("opening log file {}", log_path.display()))?;
                fmt()
                    .with_env_filter(env_filter)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .init();
            }
        }
        Ok(())
    })
    .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_edit_with_field_and_value() {
        let cli = Cli::parse_from(["cardtui", "edit", "3", "--field", "title", "Renamed"]);
        match cli.command {
            Some(Commands::Edit(args)) => {
                assert_eq!(args.id, 3);
                assert_eq!(args.field, crate::storage::EditableField::Title);
                assert_eq!(args.value, "Renamed");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn ephemeral_store_starts_from_starter_cards() {
        let store = ephemeral_store(&AppConfig::default());
        assert_eq!(store.len(), 2);
        assert_eq!(store.next_id(), 3);
    }
}
