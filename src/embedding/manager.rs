//! Holds the active embedding provider behind one swappable reference

use super::{
    EmbeddingError, EmbeddingProvider, FastEmbedProvider, MockEmbeddingProvider,
    OpenAiEmbeddingProvider, VolcanoArkEmbeddingProvider,
};
use crate::settings::{EmbeddingSettings, SettingsSource};
use crate::store::StoreError;
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Failed to load embedding settings: {0}")]
    Settings(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] EmbeddingError),
}

struct ActiveProvider {
    provider: Arc<dyn EmbeddingProvider>,
    settings: EmbeddingSettings,
}

/// Publishes the configured embedding provider
///
/// Reloading builds a new provider and swaps the reference atomically;
/// callers that already loaded the previous provider keep using it.
pub struct EmbeddingManager {
    active: ArcSwapOption<ActiveProvider>,
    request_timeout: Duration,
    mock_dimension: usize,
}

impl EmbeddingManager {
    /// Manager with no provider configured yet
    ///
    /// # Arguments
    /// * `request_timeout` - Timeout handed to HTTP providers
    /// * `mock_dimension` - Dimension of the mock provider used as a fallback
    pub fn new(request_timeout: Duration, mock_dimension: usize) -> Self {
        Self {
            active: ArcSwapOption::empty(),
            request_timeout,
            mock_dimension,
        }
    }

    /// Manager pinned to a given provider
    pub fn with_provider(provider: Arc<dyn EmbeddingProvider>) -> Self {
        let manager = Self::new(super::http::DEFAULT_TIMEOUT, provider.dimension());
        manager.replace(provider, EmbeddingSettings::default());
        manager
    }

    /// Currently active provider, if any
    pub fn current(&self) -> Option<Arc<dyn EmbeddingProvider>> {
        self.active
            .load_full()
            .map(|active| Arc::clone(&active.provider))
    }

    /// Settings the active provider was built from
    pub fn current_settings(&self) -> Option<EmbeddingSettings> {
        self.active.load_full().map(|active| active.settings.clone())
    }

    /// Load settings, build the provider and publish it
    pub async fn initialize(&self, source: &dyn SettingsSource) -> Result<(), ManagerError> {
        let settings = EmbeddingSettings::load(source).await?;

        tracing::info!(
            "Loaded embedding settings: provider={}, model={}, base_url={}, api_key={}",
            settings.provider,
            settings.model.as_deref().unwrap_or("<default>"),
            settings.base_url.as_deref().unwrap_or("<default>"),
            settings.masked_api_key()
        );

        let provider = self.build_provider(&settings)?;
        tracing::info!(
            "Embedding provider ready: {} ({}D)",
            provider.model_name(),
            provider.dimension()
        );

        self.replace(provider, settings);
        Ok(())
    }

    /// Re-read settings and swap in a fresh provider
    pub async fn reload(&self, source: &dyn SettingsSource) -> Result<(), ManagerError> {
        tracing::info!("Reloading embedding provider");
        self.initialize(source).await
    }

    fn replace(&self, provider: Arc<dyn EmbeddingProvider>, settings: EmbeddingSettings) {
        self.active
            .store(Some(Arc::new(ActiveProvider { provider, settings })));
    }

    fn build_provider(
        &self,
        settings: &EmbeddingSettings,
    ) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
        let provider: Arc<dyn EmbeddingProvider> = match settings.provider.as_str() {
            "openai" if !settings.api_key.is_empty() => Arc::new(OpenAiEmbeddingProvider::new(
                settings.api_key.clone(),
                settings.base_url.clone(),
                settings.model.clone(),
                self.request_timeout,
            )?),
            "volcano_ark" | "volcengine" if !settings.api_key.is_empty() => {
                // Ark has no default endpoint model
                match settings.model.as_deref().filter(|m| !m.is_empty()) {
                    Some(model) => {
                        Arc::new(VolcanoArkEmbeddingProvider::new(
                            settings.api_key.clone(),
                            settings.base_url.clone(),
                            model.to_string(),
                            self.request_timeout,
                        )?)
                    }
                    _ => {
                        tracing::warn!(
                            "{} model is not set, falling back to the mock provider",
                            settings.provider
                        );
                        self.mock()
                    }
                }
            }
            "openai" | "volcano_ark" | "volcengine" => {
                tracing::warn!(
                    "{} API key is empty, falling back to the mock provider",
                    settings.provider
                );
                self.mock()
            }
            "fastembed" => {
                let model = settings.model.as_deref().unwrap_or("all-MiniLM-L6-v2");
                Arc::new(FastEmbedProvider::new(model)?)
            }
            "mock" => {
                tracing::warn!("Using the mock embedding provider; not for production data");
                self.mock()
            }
            other => {
                tracing::warn!(
                    "Unknown embedding provider '{}', falling back to the mock provider",
                    other
                );
                self.mock()
            }
        };

        Ok(provider)
    }

    fn mock(&self) -> Arc<dyn EmbeddingProvider> {
        Arc::new(MockEmbeddingProvider::new(self.mock_dimension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct MapSource(Mutex<Vec<(String, String)>>);

    impl MapSource {
        fn new(items: &[(&str, &str)]) -> Self {
            Self(Mutex::new(
                items
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ))
        }

        fn set(&self, key: &str, value: &str) {
            let mut items = self.0.lock().unwrap();
            items.retain(|(k, _)| k != key);
            items.push((key.to_string(), value.to_string()));
        }
    }

    #[async_trait]
    impl SettingsSource for MapSource {
        async fn get_by_keys(&self, keys: &[&str]) -> Result<Vec<(String, String)>, StoreError> {
            let items = self.0.lock().unwrap();
            Ok(items
                .iter()
                .filter(|(k, _)| keys.contains(&k.as_str()))
                .cloned()
                .collect())
        }
    }

    #[test]
    fn test_uninitialized_manager_has_no_provider() {
        let manager = EmbeddingManager::new(Duration::from_secs(1), 8);
        assert!(manager.current().is_none());
    }

    #[tokio::test]
    async fn test_missing_api_key_falls_back_to_mock() {
        let source = MapSource::new(&[("embedding_provider", "openai")]);
        let manager = EmbeddingManager::new(Duration::from_secs(1), 16);
        manager.initialize(&source).await.unwrap();

        let provider = manager.current().unwrap();
        assert_eq!(provider.model_name(), "mock");
        assert_eq!(provider.dimension(), 16);
    }

    #[tokio::test]
    async fn test_ark_without_model_falls_back_to_mock() {
        let source = MapSource::new(&[
            ("embedding_provider", "volcano_ark"),
            ("embedding_api_key", "ark-test-key-123456"),
        ]);
        let manager = EmbeddingManager::new(Duration::from_secs(1), 16);
        manager.initialize(&source).await.unwrap();
        assert_eq!(manager.current().unwrap().model_name(), "mock");

        source.set("embedding_model", "   ");
        manager.reload(&source).await.unwrap();
        assert_eq!(manager.current().unwrap().model_name(), "mock");

        source.set("embedding_model", "ep-20240101-embed");
        manager.reload(&source).await.unwrap();
        assert_eq!(manager.current().unwrap().model_name(), "ep-20240101-embed");
    }

    #[tokio::test]
    async fn test_reload_swaps_without_touching_held_provider() {
        let source = MapSource::new(&[("embedding_provider", "mock")]);
        let manager = EmbeddingManager::new(Duration::from_secs(1), 16);
        manager.initialize(&source).await.unwrap();

        let held = manager.current().unwrap();

        source.set("embedding_provider", "openai");
        source.set("embedding_api_key", "sk-test-key-123456");
        manager.reload(&source).await.unwrap();

        assert_eq!(held.model_name(), "mock");
        let fresh = manager.current().unwrap();
        assert_eq!(fresh.model_name(), "text-embedding-ada-002");
        assert_eq!(
            manager.current_settings().unwrap().provider,
            "openai".to_string()
        );
    }
}
