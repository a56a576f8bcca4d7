use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::loading::{LoaderSettings, ProgressSettings};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub catalog: CatalogConfig,
  /// Custom title for header (defaults to the catalog host if not set)
  pub title: Option<String>,
  pub cache: CacheConfig,
  pub loader: LoaderConfig,
  pub log: LogConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
  /// Base URL of the catalog REST API
  pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Persist the query cache between sessions
  pub enabled: bool,
  /// Storage database location (defaults to the data directory)
  pub path: Option<PathBuf>,
  pub slot_key: String,
  /// Entries older than this are never persisted
  pub ttl_hours: i64,
  /// Data older than this is refetched
  pub stale_minutes: i64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
      slot_key: "toolshelf-query-cache".to_string(),
      ttl_hours: 24,
      stale_minutes: 5,
    }
  }
}

impl CacheConfig {
  pub fn stale_time(&self) -> chrono::Duration {
    chrono::Duration::minutes(self.stale_minutes)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
  /// Bar color: a name ("cyan") or hex ("#3b82f6")
  pub color: String,
  /// Bar height in rows
  pub height: u16,
  pub show_percentage: bool,
  /// Milliseconds between automatic progress steps
  pub speed: u64,
  pub increment_steps: Vec<f64>,
  pub debounce_delay_ms: u64,
  pub min_query_count: usize,
  pub count_mutations: bool,
  pub trickle_interval_ms: u64,
  /// Coordinator nudge per trickle interval
  pub trickle_amount: f64,
  /// Progress advance per step once the step sequence is used up
  pub step_trickle_amount: f64,
  pub hide_delay_ms: u64,
}

impl Default for LoaderConfig {
  fn default() -> Self {
    let progress = ProgressSettings::default();
    let loader = LoaderSettings::default();
    Self {
      color: "cyan".to_string(),
      height: 1,
      show_percentage: progress.show_percentage,
      speed: progress.step_interval.as_millis() as u64,
      increment_steps: progress.steps,
      debounce_delay_ms: loader.debounce_delay.as_millis() as u64,
      min_query_count: loader.min_query_count,
      count_mutations: loader.count_mutations,
      trickle_interval_ms: loader.trickle_interval.as_millis() as u64,
      trickle_amount: loader.trickle_amount,
      step_trickle_amount: progress.trickle_amount,
      hide_delay_ms: progress.hide_delay.as_millis() as u64,
    }
  }
}

impl LoaderConfig {
  pub fn progress_settings(&self) -> ProgressSettings {
    ProgressSettings {
      steps: self.increment_steps.clone(),
      step_interval: Duration::from_millis(self.speed),
      trickle_amount: self.step_trickle_amount,
      hide_delay: Duration::from_millis(self.hide_delay_ms),
      show_percentage: self.show_percentage,
    }
  }

  pub fn loader_settings(&self) -> LoaderSettings {
    LoaderSettings {
      min_query_count: self.min_query_count,
      count_mutations: self.count_mutations,
      debounce_delay: Duration::from_millis(self.debounce_delay_ms),
      trickle_interval: Duration::from_millis(self.trickle_interval_ms),
      trickle_amount: self.trickle_amount,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Default filter when TOOLSHELF_LOG is not set
  pub level: String,
  /// Log file location (defaults to the data directory)
  pub file: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      file: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./toolshelf.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/toolshelf/config.yaml
  ///
  /// Without a config file, defaults apply.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("toolshelf.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("toolshelf").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Get the catalog API key from the environment, if any.
  ///
  /// Checks TOOLSHELF_API_KEY.
  pub fn get_api_key() -> Option<String> {
    std::env::var("TOOLSHELF_API_KEY").ok()
  }
}

/// Directory for the storage database and log file.
pub fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("toolshelf"))
}
