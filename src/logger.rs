//! Session logger: routes `tracing` output to a single file in the OS data
//! directory.
//!
//! The file is **truncated (overwritten) at each launch**, so it only ever
//! contains output from the most-recent session.
//!
//! Log location:
//!   Windows:  `%APPDATA%\LayerFE\layerfe.log`
//!   Linux:    `~/.local/share/LayerFE/layerfe.log`
//!   macOS:    `~/Library/Application Support/LayerFE/layerfe.log`
//!
//! Library code only uses the `tracing` macros; the binary calls [`init`]
//! once. `RUST_LOG` overrides the default `info` filter.

use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Returns the path to the current session log file.
pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialise the session logger. Call once, before any logging.
///
/// * Creates (or truncates) the log file; if that fails, logs go to stderr.
/// * Installs a panic hook that writes the panic message to the log before
///   running the previous handler.
pub fn init() {
    let path = log_file_path();
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    match open_truncated(&path) {
        Ok(file) => {
            let _ = LOG_PATH.set(path.clone());
            let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
            let _ = tracing_subscriber::registry().with(env_filter()).with(layer).try_init();
            tracing::info!("=== LayerFE session started ===");
            tracing::info!("Log file: {}", path.display());
        }
        Err(e) => {
            // Not fatal: fall back to stderr
            let layer = fmt::layer().with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry().with(env_filter()).with(layer).try_init();
            tracing::warn!("Failed to open log file {}: {e}", path.display());
        }
    }

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("PANIC: {info}");
        prev(info);
    }));
}

fn open_truncated(path: &PathBuf) -> std::io::Result<File> {
    OpenOptions::new().create(true).write(true).truncate(true).open(path)
}

fn log_file_path() -> PathBuf {
    data_dir().join("LayerFE").join("layerfe.log")
}

/// Platform data directory (without the app sub-folder).
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library").join("Application Support");
        }
    }
    // Linux / fallback
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}
