//! Remote embedding providers over HTTP

use super::{EmbeddingError, EmbeddingProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

fn build_client(timeout: Duration) -> Result<reqwest::Client, EmbeddingError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| EmbeddingError::InitializationError(format!("HTTP client: {}", e)))
}

async fn post_json<B, R>(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    body: &B,
) -> Result<R, EmbeddingError>
where
    B: Serialize + ?Sized,
    R: for<'de> Deserialize<'de>,
{
    let response = client
        .post(url)
        .bearer_auth(api_key)
        .json(body)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                EmbeddingError::GenerationError(format!("Request to {} timed out", url))
            } else {
                EmbeddingError::GenerationError(format!("HTTP request failed: {}", e))
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(EmbeddingError::GenerationError(format!(
            "Embedding API returned status {}: {}",
            status.as_u16(),
            body
        )));
    }

    response
        .json::<R>()
        .await
        .map_err(|e| EmbeddingError::GenerationError(format!("Failed to decode response: {}", e)))
}

/// OpenAI-compatible `/embeddings` endpoint
pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Deserialize)]
struct OpenAiEmbedding {
    embedding: Vec<f32>,
}

impl OpenAiEmbeddingProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";
    pub const DEFAULT_MODEL: &'static str = "text-embedding-ada-002";

    /// Create a provider for the OpenAI embeddings API or a compatible server
    ///
    /// # Arguments
    /// * `api_key` - Bearer token sent with every request
    /// * `base_url` - API root; defaults to `DEFAULT_BASE_URL`
    /// * `model` - Model name; defaults to `DEFAULT_MODEL`
    /// * `timeout` - Per-request timeout
    pub fn new(
        api_key: impl Into<String>,
        base_url: Option<String>,
        model: Option<String>,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let model = model.unwrap_or_else(|| Self::DEFAULT_MODEL.to_string());
        let dimension = match model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        };

        Ok(Self {
            client: build_client(timeout)?,
            api_key: api_key.into(),
            base_url: base_url.unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string()),
            model,
            dimension,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let url = format!("{}/embeddings", self.base_url);
        let request = OpenAiRequest {
            input: text,
            model: &self.model,
        };

        let response: OpenAiResponse =
            post_json(&self.client, &url, &self.api_key, &request).await?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                EmbeddingError::GenerationError("No embedding data returned".to_string())
            })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Volcano Engine Ark multimodal embedding endpoint
pub struct VolcanoArkEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct ArkRequest<'a> {
    model: &'a str,
    input: Vec<ArkInput<'a>>,
}

#[derive(Serialize)]
struct ArkInput<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Deserialize)]
struct ArkResponse {
    data: ArkEmbedding,
}

#[derive(Deserialize)]
struct ArkEmbedding {
    embedding: Vec<f32>,
}

impl VolcanoArkEmbeddingProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://ark.cn-beijing.volces.com";
    pub const DIMENSION: usize = 2048;

    /// Create a provider for a Volcano Ark embedding endpoint
    ///
    /// # Arguments
    /// * `api_key` - Bearer token sent with every request
    /// * `base_url` - API root; defaults to `DEFAULT_BASE_URL`
    /// * `model` - Endpoint model id (must not be empty)
    /// * `timeout` - Per-request timeout
    pub fn new(
        api_key: impl Into<String>,
        base_url: Option<String>,
        model: String,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        if model.is_empty() {
            return Err(EmbeddingError::InitializationError(
                "Volcano Ark requires an endpoint model id".to_string(),
            ));
        }

        Ok(Self {
            client: build_client(timeout)?,
            api_key: api_key.into(),
            base_url: base_url.unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string()),
            model,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for VolcanoArkEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let url = format!("{}/api/v3/embeddings/multimodal", self.base_url);
        let request = ArkRequest {
            model: &self.model,
            input: vec![ArkInput { kind: "text", text }],
        };

        let response: ArkResponse = post_json(&self.client, &url, &self.api_key, &request).await?;

        if response.data.embedding.is_empty() {
            return Err(EmbeddingError::GenerationError(
                "No embedding data returned".to_string(),
            ));
        }

        Ok(response.data.embedding)
    }

    fn dimension(&self) -> usize {
        Self::DIMENSION
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_defaults() {
        let provider = OpenAiEmbeddingProvider::new("key", None, None, DEFAULT_TIMEOUT).unwrap();
        assert_eq!(provider.base_url(), "https://api.openai.com/v1");
        assert_eq!(provider.model_name(), "text-embedding-ada-002");
        assert_eq!(provider.dimension(), 1536);
    }

    #[tokio::test]
    async fn test_openai_embed_with_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let body = serde_json::json!({ "data": [{ "embedding": [0.25, 0.5, 0.75] }] }).to_string();

        let mock = server
            .mock("POST", "/embeddings")
            .match_header("authorization", "Bearer test-key")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "input": "checkout flow",
                "model": "text-embedding-ada-002"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;

        let provider =
            OpenAiEmbeddingProvider::new("test-key", Some(server.url()), None, DEFAULT_TIMEOUT)
                .unwrap();
        let embedding = provider.embed("checkout flow").await.unwrap();

        assert_eq!(embedding, vec![0.25, 0.5, 0.75]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_openai_error_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/embeddings")
            .with_status(401)
            .with_body("invalid api key")
            .create_async()
            .await;

        let provider =
            OpenAiEmbeddingProvider::new("bad-key", Some(server.url()), None, DEFAULT_TIMEOUT)
                .unwrap();
        let err = provider.embed("checkout flow").await.unwrap_err();

        match err {
            EmbeddingError::GenerationError(msg) => assert!(msg.contains("401")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_openai_empty_data_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/embeddings")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data": []}"#)
            .create_async()
            .await;

        let provider =
            OpenAiEmbeddingProvider::new("key", Some(server.url()), None, DEFAULT_TIMEOUT).unwrap();
        assert!(provider.embed("anything").await.is_err());
    }

    #[tokio::test]
    async fn test_ark_embed_with_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v3/embeddings/multimodal")
            .match_header("authorization", "Bearer ark-key")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "ep-embedding",
                "input": [{ "type": "text", "text": "refund request" }]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data": {"embedding": [1.0, 0.0]}}"#)
            .create_async()
            .await;

        let provider = VolcanoArkEmbeddingProvider::new(
            "ark-key",
            Some(server.url()),
            "ep-embedding".to_string(),
            DEFAULT_TIMEOUT,
        )
        .unwrap();

        assert_eq!(provider.embed("refund request").await.unwrap(), vec![1.0, 0.0]);
        assert_eq!(provider.dimension(), 2048);
        mock.assert_async().await;
    }

    #[test]
    fn test_ark_requires_model() {
        let result =
            VolcanoArkEmbeddingProvider::new("key", None, String::new(), DEFAULT_TIMEOUT);
        assert!(matches!(
            result,
            Err(EmbeddingError::InitializationError(_))
        ));
    }
}
