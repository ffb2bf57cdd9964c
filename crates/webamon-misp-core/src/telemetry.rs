//! Centralised tracing initialisation for the connector binary.
//!
//! Call [`init_tracing`] once at program start to configure the global
//! subscriber with an `EnvFilter`, stderr output, and an optional per-run
//! log file.
//!
//! Safe to call more than once; subsequent calls are silently ignored
//! (the global subscriber can only be set once per process).

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::NaiveDateTime;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Log file name for a run started at `started`.
pub fn log_file_name(started: NaiveDateTime) -> String {
    format!("webamon_misp_{}.log", started.format("%Y%m%d_%H%M%S"))
}

/// Create `dir` if needed and open a fresh log file for this run.
pub fn create_log_file(dir: &Path, started: NaiveDateTime) -> io::Result<(PathBuf, File)> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(log_file_name(started));
    let file = File::create(&path)?;
    Ok((path, file))
}

/// Initialise the global tracing subscriber.
///
/// * `json` — when `true`, emit newline-delimited JSON log lines.
/// * `level` — default verbosity when `RUST_LOG` is not set.
/// * `log_file` — when set, every line is also written there without ANSI
///   colours.
///
/// Respects the `RUST_LOG` environment variable for fine-grained filtering.
pub fn init_tracing(json: bool, level: Level, log_file: Option<File>) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        let file_layer = log_file.map(|file| {
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .json()
                .with_writer(Mutex::new(file))
        });
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json().with_writer(io::stderr))
            .with(file_layer)
            .try_init()
            .ok();
    } else {
        let file_layer = log_file.map(|file| {
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
        });
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(io::stderr))
            .with(file_layer)
            .try_init()
            .ok();
    }
}
