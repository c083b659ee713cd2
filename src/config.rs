use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::ResourceMapping;
use crate::cache::{
  CacheSettings, DEFAULT_MAX_PAGE_SIZE, DEFAULT_SWEEP_INTERVAL_MS, DEFAULT_TTL_MS,
};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  /// Per-resource parameter mappings; unlisted resources use the defaults
  #[serde(default)]
  pub resources: HashMap<String, ResourceMapping>,
  /// Write logs here instead of stderr
  pub log_file: Option<PathBuf>,
}

/// Deployment profile, selecting the default network timeout.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
  /// Consolidated reads with a short timeout
  #[default]
  Stable,
  /// Token-authenticated deployments that tolerate slower responses
  AuthAware,
}

impl Profile {
  pub fn default_timeout_ms(&self) -> u64 {
    match self {
      Profile::Stable => 10_000,
      Profile::AuthAware => 30_000,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the backend, e.g. https://daycare.example.com/api
  pub url: String,
  #[serde(default)]
  pub profile: Profile,
  /// Overrides the profile's network timeout
  pub timeout_ms: Option<u64>,
}

impl ApiConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_millis(
      self
        .timeout_ms
        .unwrap_or_else(|| self.profile.default_timeout_ms()),
    )
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// When false every read goes to the network
  pub enabled: bool,
  pub ttl_ms: u64,
  pub sweep_interval_ms: u64,
  pub max_page_size: u32,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      ttl_ms: DEFAULT_TTL_MS as u64,
      sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
      max_page_size: DEFAULT_MAX_PAGE_SIZE,
    }
  }
}

impl CacheConfig {
  pub fn settings(&self) -> CacheSettings {
    CacheSettings {
      ttl: chrono::Duration::milliseconds(i64::try_from(self.ttl_ms).unwrap_or(i64::MAX)),
      sweep_interval: Duration::from_millis(self.sweep_interval_ms),
      max_page_size: self.max_page_size,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./kindercache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/kindercache/config.yaml
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
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/kindercache/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("kindercache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("kindercache").join("config.yaml");
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

  /// Parse and validate a YAML document.
  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    url::Url::parse(&self.api.url).map_err(|e| eyre!("Invalid api.url {:?}: {}", self.api.url, e))?;

    if self.api.timeout_ms == Some(0) {
      return Err(eyre!("api.timeout_ms must be positive"));
    }
    if self.cache.ttl_ms == 0 {
      return Err(eyre!("cache.ttl_ms must be positive"));
    }
    if self.cache.sweep_interval_ms == 0 {
      return Err(eyre!("cache.sweep_interval_ms must be positive"));
    }
    if self.cache.max_page_size == 0 {
      return Err(eyre!("cache.max_page_size must be at least 1"));
    }
    Ok(())
  }

  /// Get the API token from environment variables.
  ///
  /// Checks KINDERCACHE_API_TOKEN first, then KINDERCACHE_TOKEN as fallback.
  /// Requests go out unauthenticated when neither is set.
  pub fn get_api_token() -> Option<String> {
    std::env::var("KINDERCACHE_API_TOKEN")
      .or_else(|_| std::env::var("KINDERCACHE_TOKEN"))
      .ok()
      .filter(|t| !t.trim().is_empty())
  }
}
