//! Run-time settings read from the key-value settings source
//!
//! Settings are re-read at the start of every search call. A value that
//! fails to parse, or a source that cannot be read at all, never fails the
//! caller: the built-in default for that field is kept instead.

use crate::store::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const SEARCH_DEFAULT_ALPHA: &str = "search_default_alpha";
pub const SEARCH_DEFAULT_LIMIT: &str = "search_default_limit";
pub const SEARCH_DEFAULT_THRESHOLD: &str = "search_default_threshold";
pub const SEARCH_ENABLE_HYBRID: &str = "search_enable_hybrid";

pub const EMBEDDING_PROVIDER: &str = "embedding_provider";
pub const EMBEDDING_API_KEY: &str = "embedding_api_key";
pub const EMBEDDING_BASE_URL: &str = "embedding_base_url";
pub const EMBEDDING_MODEL: &str = "embedding_model";

const SEARCH_KEYS: [&str; 4] = [
    SEARCH_DEFAULT_ALPHA,
    SEARCH_DEFAULT_LIMIT,
    SEARCH_DEFAULT_THRESHOLD,
    SEARCH_ENABLE_HYBRID,
];

const EMBEDDING_KEYS: [&str; 4] = [
    EMBEDDING_PROVIDER,
    EMBEDDING_API_KEY,
    EMBEDDING_BASE_URL,
    EMBEDDING_MODEL,
];

/// String key-value settings lookup
#[async_trait]
pub trait SettingsSource: Send + Sync {
    /// Fetch the values of the given keys; absent keys are simply missing
    async fn get_by_keys(&self, keys: &[&str]) -> Result<Vec<(String, String)>, StoreError>;
}

/// Process-wide search defaults
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub default_alpha: f32,
    pub default_limit: usize,
    pub default_threshold: f32,
    pub enable_hybrid: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_alpha: 1.0,
            default_limit: 10,
            default_threshold: 0.7,
            enable_hybrid: true,
        }
    }
}

impl SearchConfig {
    /// Read-through load; falls back to defaults if the source is unreadable
    pub async fn load(source: &dyn SettingsSource) -> Self {
        match source.get_by_keys(&SEARCH_KEYS).await {
            Ok(pairs) => Self::from_pairs(&pairs),
            Err(e) => {
                tracing::warn!("Search settings unavailable, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// Overlay parsed values onto the defaults
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut config = Self::default();

        for (key, value) in pairs {
            let value = value.trim();
            match key.as_str() {
                SEARCH_DEFAULT_ALPHA => {
                    if let Some(alpha) = parse_unit_interval(value) {
                        config.default_alpha = alpha;
                    } else {
                        tracing::debug!("Ignoring invalid {} = {:?}", key, value);
                    }
                }
                SEARCH_DEFAULT_LIMIT => match value.parse::<usize>() {
                    Ok(limit) if limit > 0 => config.default_limit = limit,
                    _ => tracing::debug!("Ignoring invalid {} = {:?}", key, value),
                },
                SEARCH_DEFAULT_THRESHOLD => {
                    if let Some(threshold) = parse_unit_interval(value) {
                        config.default_threshold = threshold;
                    } else {
                        tracing::debug!("Ignoring invalid {} = {:?}", key, value);
                    }
                }
                SEARCH_ENABLE_HYBRID => match value.to_ascii_lowercase().parse::<bool>() {
                    Ok(enabled) => config.enable_hybrid = enabled,
                    Err(_) => tracing::debug!("Ignoring invalid {} = {:?}", key, value),
                },
                _ => {}
            }
        }

        config
    }
}

fn parse_unit_interval(value: &str) -> Option<f32> {
    value
        .parse::<f32>()
        .ok()
        .filter(|v| (0.0..=1.0).contains(v))
}

/// Embedding provider selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingSettings {
    pub provider: String,
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            api_key: String::new(),
            base_url: None,
            model: None,
        }
    }
}

impl EmbeddingSettings {
    pub async fn load(source: &dyn SettingsSource) -> Result<Self, StoreError> {
        let pairs = source.get_by_keys(&EMBEDDING_KEYS).await?;
        Ok(Self::from_pairs(&pairs))
    }

    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut settings = Self::default();

        for (key, value) in pairs {
            let value = value.trim();
            match key.as_str() {
                EMBEDDING_PROVIDER if !value.is_empty() => {
                    settings.provider = value.to_ascii_lowercase()
                }
                EMBEDDING_API_KEY => settings.api_key = value.to_string(),
                EMBEDDING_BASE_URL if !value.is_empty() => {
                    settings.base_url = Some(value.trim_end_matches('/').to_string())
                }
                EMBEDDING_MODEL if !value.is_empty() => settings.model = Some(value.to_string()),
                _ => {}
            }
        }

        settings
    }

    /// API key safe for logs
    pub fn masked_api_key(&self) -> String {
        let key = &self.api_key;
        if key.is_empty() {
            "<empty>".to_string()
        } else if key.chars().count() <= 8 {
            "***".to_string()
        } else {
            let chars: Vec<char> = key.chars().collect();
            let head: String = chars[..4].iter().collect();
            let tail: String = chars[chars.len() - 4..].iter().collect();
            format!("{}...{}", head, tail)
        }
    }
}
