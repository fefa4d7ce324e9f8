//! Process configuration for caselens
//!
//! Loaded from a TOML file, then overridden by `CASELENS_SECTION__KEY`
//! environment variables, then validated. Run-time search and embedding
//! settings live in the database instead (see `settings`).

use crate::error::{CaselensError, Result};
use crate::index::HnswParams;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

pub const SCHEMA_VERSION: &str = "1.0.0";
const ENV_PREFIX: &str = "CASELENS_";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub search: SearchSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// In-process HNSW + BM25, rebuilt from the database at startup
    #[default]
    Local,
    Weaviate,
}

impl fmt::Display for IndexBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexBackend::Local => f.write_str("local"),
            IndexBackend::Weaviate => f.write_str("weaviate"),
        }
    }
}

impl FromStr for IndexBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(IndexBackend::Local),
            "weaviate" => Ok(IndexBackend::Weaviate),
            other => Err(format!("unknown index backend '{}'", other)),
        }
    }
}

/// Vector index configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub backend: IndexBackend,
    #[serde(default)]
    pub hnsw: HnswParams,
    #[serde(default)]
    pub weaviate: WeaviateConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaviateConfig {
    pub url: String,
    /// Name of the environment variable holding the API key; empty for none
    #[serde(default)]
    pub api_key_env: String,
    #[serde(default = "default_weaviate_timeout")]
    pub request_timeout_secs: u64,
}

fn default_weaviate_timeout() -> u64 {
    30
}

impl Default for WeaviateConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            api_key_env: "WEAVIATE_API_KEY".to_string(),
            request_timeout_secs: default_weaviate_timeout(),
        }
    }
}

impl WeaviateConfig {
    /// API key read from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        if self.api_key_env.is_empty() {
            return None;
        }
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
    }
}

/// Embedding client configuration; provider choice is a run-time setting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub request_timeout_secs: u64,
    /// Dimension of the mock provider
    pub local_dimension: usize,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            local_dimension: 1536,
            batch_size: 32,
        }
    }
}

impl EmbeddingConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Search call configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSection {
    /// Deadline for a whole search call; 0 disables it
    pub request_timeout_secs: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            request_timeout_secs: 60,
        }
    }
}

impl SearchSection {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CaselensError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CaselensError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides()?;
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Load the file if present, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(CaselensError::ConfigNotFound { path }) => {
                tracing::warn!("Config file {:?} not found, using defaults", path);
                let mut config = Self::default();
                config.apply_env_overrides()?;
                ConfigValidator::validate(&config)?;
                Ok(config)
            }
            other => other,
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CaselensError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| CaselensError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply `CASELENS_SECTION__KEY=value` environment overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(std::env::vars())
    }

    /// Apply overrides from `(variable, value)` pairs; unrelated variables are ignored
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix(ENV_PREFIX) {
                self.set_value(config_key, &value)?;
            }
        }
        Ok(())
    }

    fn set_value(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__DATABASE_PATH" => self.storage.database_path = PathBuf::from(value),
            "INDEX__BACKEND" => {
                self.index.backend = value.parse().map_err(|message| {
                    CaselensError::InvalidConfigValue {
                        path: path.to_string(),
                        message,
                    }
                })?;
            }
            "INDEX__WEAVIATE_URL" => self.index.weaviate.url = value.to_string(),
            "INDEX__WEAVIATE_API_KEY_ENV" => self.index.weaviate.api_key_env = value.to_string(),
            "EMBEDDING__REQUEST_TIMEOUT_SECS" => {
                self.embedding.request_timeout_secs = parse_number(path, value)?;
            }
            "EMBEDDING__LOCAL_DIMENSION" => {
                self.embedding.local_dimension = parse_number(path, value)?;
            }
            "SEARCH__REQUEST_TIMEOUT_SECS" => {
                self.search.request_timeout_secs = parse_number(path, value)?;
            }
            "LOGGING__LEVEL" => self.logging.level = value.to_string(),
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            CaselensError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("caselens").join("config.toml"))
    }
}

fn parse_number<T: FromStr>(path: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CaselensError::InvalidConfigValue {
            path: path.to_string(),
            message: format!("Cannot parse '{}' as a number", value),
        })
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                database_path: PathBuf::from("~/.caselens/caselens.db"),
            },
            index: IndexConfig::default(),
            embedding: EmbeddingConfig::default(),
            search: SearchSection::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vars(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.index.backend = IndexBackend::Weaviate;
        config.index.hnsw.m = 24;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.index.backend, IndexBackend::Weaviate);
        assert_eq!(loaded.index.hnsw.m, 24);
        assert_eq!(loaded.storage, config.storage);
    }

    #[test]
    fn test_minimal_file_uses_section_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [_meta]
            schema_version = "1.0.0"

            [storage]
            database_path = "/tmp/caselens.db"
            "#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.index.backend, IndexBackend::Local);
        assert_eq!(config.embedding.local_dimension, 1536);
        assert_eq!(config.search.request_timeout(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("absent.toml");

        assert!(matches!(
            Config::load(&path),
            Err(CaselensError::ConfigNotFound { .. })
        ));
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(vars(&[
                ("CASELENS_INDEX__BACKEND", "weaviate"),
                ("CASELENS_INDEX__WEAVIATE_URL", "http://weaviate:8080"),
                ("CASELENS_SEARCH__REQUEST_TIMEOUT_SECS", "0"),
                ("CASELENS_LOGGING__LEVEL", "debug"),
                ("PATH", "/usr/bin"),
            ]))
            .unwrap();

        assert_eq!(config.index.backend, IndexBackend::Weaviate);
        assert_eq!(config.index.weaviate.url, "http://weaviate:8080");
        assert_eq!(config.search.request_timeout(), None);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_bad_override_is_reported() {
        let mut config = Config::default();
        let result =
            config.apply_overrides(vars(&[("CASELENS_EMBEDDING__LOCAL_DIMENSION", "wide")]));
        assert!(matches!(
            result,
            Err(CaselensError::InvalidConfigValue { .. })
        ));
    }
}
