//! Tracing subscriber setup for the binary.

use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogConfig;

/// Default directory for rolling log files.
pub fn log_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("pagestash").join("logs"))
}

/// Build the filter: `RUST_LOG` wins over the configured level.
pub fn env_filter(config: &LogConfig) -> EnvFilter {
  EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Install the global subscriber.
///
/// Keep the returned guard alive until exit so buffered file output is flushed.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
  let filter = env_filter(config);

  if config.file {
    let dir = log_dir()?;
    std::fs::create_dir_all(&dir)
      .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

    let appender = tracing_appender::rolling::daily(&dir, "pagestash.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    fmt()
      .with_env_filter(filter)
      .with_writer(writer)
      .with_ansi(false)
      .try_init()
      .map_err(|e| eyre!("Failed to install log subscriber: {}", e))?;

    Ok(Some(guard))
  } else {
    fmt()
      .with_env_filter(filter)
      .with_writer(std::io::stderr)
      .try_init()
      .map_err(|e| eyre!("Failed to install log subscriber: {}", e))?;

    Ok(None)
  }
}
