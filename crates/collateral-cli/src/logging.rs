use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "info";
const DEFAULT_LOG_FILE: &str = "./logs/collateral.log";

/// Where log lines go and how much of them to keep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub filter: String,
    pub file: PathBuf,
}

impl LogSettings {
    /// `TRACING_LEVEL` takes any `EnvFilter` directive; `LOG_FILE_PATH` names
    /// the crawl log.
    pub fn from_env() -> Self {
        Self {
            filter: env::var("TRACING_LEVEL").unwrap_or_else(|_| DEFAULT_FILTER.to_string()),
            file: env::var_os("LOG_FILE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
        }
    }
}

/// Directory and file name for the appender. A bare file name logs into the
/// working directory.
fn split_log_path(path: &Path) -> (PathBuf, OsString) {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| OsString::from("collateral.log"));
    (dir.to_path_buf(), name)
}

/// Pretty console output for the operator; the file keeps timestamps and
/// targets so a long crawl can be traced product by product.
pub fn init_logger(settings: &LogSettings) -> WorkerGuard {
    let (log_dir, log_name) = split_log_path(&settings.file);
    let file_appender = tracing_appender::rolling::never(log_dir, log_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .pretty()
                .with_file(false)
                .with_target(false)
                .without_time()
                .with_ansi(true),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_ansi(false),
        )
        .with(EnvFilter::new(&settings.filter))
        .init();

    info!(filter = %settings.filter, "Logging to stdout and {}", settings.file.display());

    guard
}
