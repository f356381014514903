use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,divy_app=debug,divy_network=debug,divy_runtime=info";

/// Environment variable overriding the log directory.
pub const ENV_LOG_DIR: &str = "DIVY_LOG_DIR";

/// Directory rolling log files are written to: `$DIVY_LOG_DIR`, or
/// `~/.divy/logs`.
pub fn logs_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(ENV_LOG_DIR) {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().context("Cannot determine home directory")?;
    Ok(home.join(".divy").join("logs"))
}

/// Initializes the logging system with file + console output under
/// [`logs_dir`]. Returns a guard that must be kept alive for the duration of
/// the app.
pub fn init_logging() -> Result<WorkerGuard> {
    init_logging_in(&logs_dir()?, DEFAULT_FILTER)
}

/// Same as [`init_logging`], writing files to `logs_dir` and falling back to
/// `default_filter` when `RUST_LOG` is unset.
pub fn init_logging_in(logs_dir: &Path, default_filter: &str) -> Result<WorkerGuard> {
    std::fs::create_dir_all(logs_dir)?;

    // File appender: daily rotation
    let file_appender = tracing_appender::rolling::daily(logs_dir, "divy");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .compact(),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    Ok(guard)
}
