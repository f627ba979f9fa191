//! Event log viewer for a file-backed storage partition.
//!
//! Run with: `proctor-log --storage-dir .proctor list`

use std::io::{self, Write};
use std::path::PathBuf;
use std::rc::Rc;

use clap::{Parser, Subcommand};
use proctor_core::audit::{export_snapshot, Classification, LogStore, TestEvent};
use proctor_core::{FileStorage, SessionConfig, SystemClock};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "proctor-log",
    version,
    about = "Inspect, export and clear a session event log"
)]
struct Cli {
    /// Storage partition directory
    #[arg(long, env = "PROCTOR_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List events, newest first
    List,
    /// Print the session summary as JSON
    Summary,
    /// Print the current attempt id
    Attempt,
    /// Write `event-log-<attemptId>.json`
    Export {
        /// Destination directory
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Delete the event log and attempt id
    Clear,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = SessionConfig::from_env()?;
    if let Some(dir) = cli.storage_dir {
        config.storage_dir = dir;
    }

    let storage = FileStorage::new(&config.storage_dir);
    let mut store = LogStore::open_with(storage, config.keys.clone(), Rc::new(SystemClock));
    let mut out = io::stdout().lock();

    match cli.command {
        Command::List => {
            let events = store.events();
            writeln!(out, "All Events ({})", events.len())?;
            if events.is_empty() {
                writeln!(out, "No events recorded.")?;
            }
            for event in events.iter().rev() {
                writeln!(out, "{}", format_row(event))?;
            }
        }
        Command::Summary => {
            serde_json::to_writer_pretty(&mut out, &store.summary())?;
            writeln!(out)?;
        }
        Command::Attempt => match store.stored_attempt_id() {
            Some(id) => writeln!(out, "{id}")?,
            None => writeln!(out, "No attempt recorded.")?,
        },
        Command::Export { out: dir } => {
            let Some(attempt_id) = store.stored_attempt_id() else {
                writeln!(out, "No attempt recorded, nothing to export.")?;
                return Ok(());
            };
            let artifact = export_snapshot(store.events(), &attempt_id)?;
            let path = artifact.write_to(&dir)?;
            info!(path = %path.display(), events = store.events().len(), "exported event log");
            writeln!(out, "{}", path.display())?;
        }
        Command::Clear => {
            store.reset();
            writeln!(out, "Event log cleared.")?;
        }
    }

    Ok(())
}

fn format_row(event: &TestEvent) -> String {
    let marker = match event.event_type().classification() {
        Classification::Violation => "!",
        Classification::Restored => "+",
        Classification::Neutral => " ",
    };
    let meta = event.metadata();
    format!(
        "{marker} {:<20} {} {} {} {}/{}",
        event.event_type().display_name(),
        event.timestamp().format("%b %d %H:%M:%S"),
        event.attempt_id(),
        event.question_id(),
        meta.focus_state,
        meta.browser_state,
    )
}
