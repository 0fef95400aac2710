//! Tracing subscriber setup for host applications.
//!
//! Library code only emits `tracing` events. Hosts that want the engine's
//! output call one of the installers here once at startup; embedders with
//! their own subscriber skip this module entirely.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Installs a console subscriber.
///
/// `RUST_LOG` takes precedence; otherwise the configured `log_level`
/// applies. Fails if a global subscriber is already installed.
pub fn init_logging(config: &Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}

/// Installs a console subscriber plus a daily-rolling log file under
/// `<data_dir>/logs`.
///
/// The returned guard flushes buffered log lines when dropped; keep it
/// alive for the lifetime of the host.
pub fn init_file_logging(config: &Config) -> Result<WorkerGuard> {
    let log_dir = config.engine.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    let appender = tracing_appender::rolling::daily(&log_dir, "seatlock.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;

    Ok(guard)
}

fn env_filter(config: &Config) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.engine.log_level.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // One test owns the process-global subscriber slot: it installs the file
    // variant, then checks that a second install reports failure instead of
    // panicking.
    #[test]
    fn test_file_logging_installs_once() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.engine.data_dir = temp_dir.path().to_path_buf();

        let guard = init_file_logging(&config).unwrap();
        tracing::info!("file logging smoke line");

        assert!(temp_dir.path().join("logs").exists());
        assert!(init_logging(&config).is_err());

        drop(guard);
    }
}
