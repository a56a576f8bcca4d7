//! File-based tracing setup. The terminal belongs to the UI, so logs go to
//! a file in the data directory.

use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{self, LogConfig};

/// Environment variable overriding the configured log filter.
const LOG_ENV: &str = "TOOLSHELF_LOG";

/// Install the global subscriber. Keep the guard alive until exit so
/// buffered lines are flushed.
pub fn init(log: &LogConfig) -> Result<WorkerGuard> {
  let path = match &log.file {
    Some(path) => path.clone(),
    None => config::data_dir()?.join("toolshelf.log"),
  };
  let directory = path
    .parent()
    .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
  let file_name = path
    .file_name()
    .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;

  std::fs::create_dir_all(directory)
    .map_err(|e| eyre!("Failed to create log directory: {}", e))?;

  let appender = tracing_appender::rolling::never(directory, file_name);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_env(LOG_ENV)
    .or_else(|_| EnvFilter::try_new(&log.level))
    .map_err(|e| eyre!("Invalid log filter: {}", e))?;

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .try_init()
    .map_err(|e| eyre!("Failed to install tracing subscriber: {}", e))?;

  Ok(guard)
}
