use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheStorage, CacheStore, MemoryStorage, NoopStorage, SqliteStorage, TtlPolicy};
use crate::catalog::CatalogSettings;
use crate::photos::ProviderConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub server: ServerConfig,
  #[serde(default)]
  pub provider: ProviderSection,
  #[serde(default)]
  pub loading: LoadingConfig,
  #[serde(default)]
  pub polling: PollingConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  pub url: String,
  /// Per-request timeout
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderSection {
  /// Provider used when none is given on the command line
  pub default: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoadingConfig {
  #[serde(default = "default_page_size")]
  pub page_size: u64,
  #[serde(default = "default_page_delay_ms")]
  pub page_delay_ms: u64,
}

impl Default for LoadingConfig {
  fn default() -> Self {
    Self {
      page_size: default_page_size(),
      page_delay_ms: default_page_delay_ms(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
  #[serde(default = "default_interval_ms")]
  pub interval_ms: u64,
}

impl Default for PollingConfig {
  fn default() -> Self {
    Self {
      interval_ms: default_interval_ms(),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
  /// On-disk cache under the user data directory
  #[default]
  Sqlite,
  Memory,
  /// Caching disabled
  None,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default)]
  pub backend: CacheBackend,
  #[serde(default = "default_collection_ttl_secs")]
  pub collection_ttl_secs: i64,
  #[serde(default = "default_hierarchy_ttl_secs")]
  pub hierarchy_ttl_secs: i64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      backend: CacheBackend::default(),
      collection_ttl_secs: default_collection_ttl_secs(),
      hierarchy_ttl_secs: default_hierarchy_ttl_secs(),
    }
  }
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_page_size() -> u64 {
  30
}

fn default_page_delay_ms() -> u64 {
  150
}

fn default_interval_ms() -> u64 {
  2000
}

fn default_collection_ttl_secs() -> i64 {
  300
}

fn default_hierarchy_ttl_secs() -> i64 {
  1800
}

fn ttl(field: &str, secs: i64) -> Result<chrono::Duration> {
  if secs < 0 {
    return Err(eyre!("{} must not be negative", field));
  }
  chrono::Duration::try_seconds(secs).ok_or_else(|| eyre!("{} is out of range: {}", field, secs))
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./photocat.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/photocat/config.yaml
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
        "No configuration file found. Create one at ~/.config/photocat/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("photocat.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("photocat").join("config.yaml");
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

  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    if config.loading.page_size == 0 {
      return Err(eyre!("loading.page_size must be at least 1"));
    }
    config.ttls()?;
    Ok(config)
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.server.timeout_secs)
  }

  pub fn settings(&self) -> CatalogSettings {
    CatalogSettings {
      page_size: self.loading.page_size,
      page_delay: Duration::from_millis(self.loading.page_delay_ms),
      poll_interval: Duration::from_millis(self.polling.interval_ms),
    }
  }

  pub fn ttls(&self) -> Result<TtlPolicy> {
    Ok(TtlPolicy {
      collection: ttl("cache.collection_ttl_secs", self.cache.collection_ttl_secs)?,
      hierarchy: ttl("cache.hierarchy_ttl_secs", self.cache.hierarchy_ttl_secs)?,
    })
  }

  /// Open the configured cache backend.
  pub fn cache_store(&self) -> Result<CacheStore> {
    let storage: Arc<dyn CacheStorage> = match self.cache.backend {
      CacheBackend::Sqlite => Arc::new(
        SqliteStorage::open().map_err(|e| eyre!("Failed to open cache database: {}", e))?,
      ),
      CacheBackend::Memory => Arc::new(MemoryStorage::new()),
      CacheBackend::None => Arc::new(NoopStorage),
    };
    Ok(CacheStore::shared(storage).with_ttls(self.ttls()?))
  }

  /// Provider settings for a job, with the credential override from the
  /// environment when one is set.
  ///
  /// `explicit` wins over `provider.default`.
  pub fn provider(&self, explicit: Option<&str>) -> Result<ProviderConfig> {
    let id = explicit
      .or(self.provider.default.as_deref())
      .ok_or_else(|| eyre!("No provider given. Pass --provider or set provider.default."))?;

    let config = ProviderConfig::new(id);
    Ok(match Self::get_provider_key() {
      Some(key) => config.with_credential(key),
      None => config,
    })
  }

  /// Get the provider credential override from environment variables.
  ///
  /// Checks PHOTOCAT_PROVIDER_KEY first, then PROVIDER_API_KEY as fallback.
  /// Without either the server's own credentials apply.
  pub fn get_provider_key() -> Option<String> {
    std::env::var("PHOTOCAT_PROVIDER_KEY")
      .or_else(|_| std::env::var("PROVIDER_API_KEY"))
      .ok()
      .filter(|key| !key.trim().is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_gets_defaults() {
    let config = Config::parse("server:\n  url: http://localhost:8000\n").unwrap();
    assert_eq!(config.server.url, "http://localhost:8000");
    assert_eq!(config.timeout(), Duration::from_secs(30));
    assert_eq!(config.cache.backend, CacheBackend::Sqlite);

    let settings = config.settings();
    assert_eq!(settings.page_size, 30);
    assert_eq!(settings.page_delay, Duration::from_millis(150));
    assert_eq!(settings.poll_interval, Duration::from_secs(2));

    let ttls = config.ttls().unwrap();
    assert_eq!(ttls.collection, chrono::Duration::minutes(5));
    assert_eq!(ttls.hierarchy, chrono::Duration::minutes(30));
  }

  #[test]
  fn test_full_config() {
    let yaml = r#"
server:
  url: https://photos.example.com/api
  timeout_secs: 5
provider:
  default: anthropic
loading:
  page_size: 50
  page_delay_ms: 0
polling:
  interval_ms: 500
cache:
  backend: memory
  collection_ttl_secs: 60
"#;
    let config = Config::parse(yaml).unwrap();
    assert_eq!(config.provider.default.as_deref(), Some("anthropic"));
    assert_eq!(config.settings().page_size, 50);
    assert_eq!(config.settings().page_delay, Duration::ZERO);
    assert_eq!(config.settings().poll_interval, Duration::from_millis(500));
    assert_eq!(config.cache.backend, CacheBackend::Memory);
    let ttls = config.ttls().unwrap();
    assert_eq!(ttls.collection, chrono::Duration::seconds(60));
    assert_eq!(ttls.hierarchy, chrono::Duration::minutes(30));
    assert!(config.cache_store().is_ok());
  }

  #[test]
  fn test_zero_page_size_is_rejected() {
    let yaml = "server:\n  url: http://x\nloading:\n  page_size: 0\n";
    assert!(Config::parse(yaml).is_err());
  }

  #[test]
  fn test_out_of_range_ttl_is_a_config_error() {
    let huge = format!(
      "server:\n  url: http://x\ncache:\n  collection_ttl_secs: {}\n",
      i64::MAX
    );
    let err = Config::parse(&huge).unwrap_err();
    assert!(err.to_string().contains("cache.collection_ttl_secs"));

    let negative = "server:\n  url: http://x\ncache:\n  hierarchy_ttl_secs: -5\n";
    assert!(Config::parse(negative).is_err());
  }

  #[test]
  fn test_unknown_backend_is_rejected() {
    let yaml = "server:\n  url: http://x\ncache:\n  backend: redis\n";
    assert!(Config::parse(yaml).is_err());
  }

  #[test]
  fn test_explicit_path_must_exist() {
    let err = Config::load(Some(Path::new("/nonexistent/photocat.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }

  #[test]
  fn test_provider_selection() {
    let config = Config::parse("server:\n  url: http://x\nprovider:\n  default: openai\n").unwrap();
    assert_eq!(config.provider(None).unwrap().provider_id, "openai");
    assert_eq!(
      config.provider(Some("anthropic")).unwrap().provider_id,
      "anthropic"
    );

    let bare = Config::parse("server:\n  url: http://x\n").unwrap();
    assert!(bare.provider(None).is_err());
  }
}
