//! Embedding capability trait and concrete providers.

use std::any::type_name;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::Settings;
use crate::types::PipelineError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure classes a provider can signal.
///
/// `RateLimited` is transient and recovered by the embedding client's pacing
/// loop; everything else is fatal for the batch.
#[derive(thiserror::Error, Debug)]
pub enum EmbeddingError {
    #[error("rate limited by embedding endpoint")]
    RateLimited,

    #[error("embedding request failed: {reason}")]
    Failed { reason: String },
}

/// Remote embedding capability: one chunk's content in, one vector out.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, content: &str, deployment_name: &str)
    -> Result<Vec<f32>, EmbeddingError>;

    fn identify(&self) -> &'static str {
        type_name::<Self>()
    }
}

/// Shared reference type alias for embedding providers.
pub type SharedEmbeddingProvider = Arc<dyn EmbeddingProvider>;

/// Azure-OpenAI-style embeddings endpoint reached over HTTPS.
///
/// Requests go to `{endpoint}/openai/deployments/{deployment}/embeddings`
/// with the deployment name supplied per call, authenticated via the
/// `api-key` header.
pub struct AzureOpenAiEmbedder {
    client: reqwest::Client,
    endpoint: Url,
    api_key: String,
    api_version: String,
}

impl AzureOpenAiEmbedder {
    pub fn new(
        endpoint: &str,
        api_key: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Result<Self, PipelineError> {
        let endpoint = Url::parse(endpoint).map_err(|err| PipelineError::InvalidSettings {
            reason: format!("invalid embedding endpoint '{endpoint}': {err}"),
        })?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| PipelineError::InvalidSettings {
                reason: format!("failed to build http client: {err}"),
            })?;
        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
            api_version: api_version.into(),
        })
    }

    /// Builds the embedder from process settings; requires the Azure service
    /// name and API key to be present.
    pub fn from_settings(settings: &Settings) -> Result<Self, PipelineError> {
        let service_name =
            settings
                .service_name
                .as_deref()
                .ok_or_else(|| PipelineError::InvalidSettings {
                    reason: "AZURE_OPENAI_SERVICE_NAME is not set".to_string(),
                })?;
        let api_key = settings
            .api_key
            .as_deref()
            .ok_or_else(|| PipelineError::InvalidSettings {
                reason: "AZURE_OPENAI_API_KEY is not set".to_string(),
            })?;
        Self::new(
            &format!("https://{service_name}.openai.azure.com"),
            api_key,
            settings.api_version.clone(),
        )
    }
}

#[async_trait]
impl EmbeddingProvider for AzureOpenAiEmbedder {
    async fn embed(
        &self,
        content: &str,
        deployment_name: &str,
    ) -> Result<Vec<f32>, EmbeddingError> {
        let url = self
            .endpoint
            .join(&format!("openai/deployments/{deployment_name}/embeddings"))
            .map_err(|err| EmbeddingError::Failed {
                reason: format!("invalid deployment url: {err}"),
            })?;

        let response = self
            .client
            .post(url)
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", &self.api_key)
            .json(&AzureEmbeddingRequest { input: content })
            .send()
            .await
            .map_err(|err| EmbeddingError::Failed {
                reason: err.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(EmbeddingError::RateLimited);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbeddingError::Failed {
                reason: format!("{status}: {body}"),
            });
        }

        let parsed: AzureEmbeddingResponse =
            response.json().await.map_err(|err| EmbeddingError::Failed {
                reason: format!("failed to parse embedding response: {err}"),
            })?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|entry| entry.embedding)
            .ok_or_else(|| EmbeddingError::Failed {
                reason: "response contained no embedding data".to_string(),
            })
    }

    fn identify(&self) -> &'static str {
        "azure-openai"
    }
}

#[derive(Serialize)]
struct AzureEmbeddingRequest<'a> {
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct AzureEmbeddingResponse {
    data: Vec<AzureEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct AzureEmbeddingData {
    embedding: Vec<f32>,
}

/// Deterministic embeddings used for tests and offline runs.
#[derive(Clone, Default)]
pub struct MockEmbeddingProvider;

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self
    }

    fn hash_to_vector(input: &str) -> Vec<f32> {
        let mut hasher = DefaultHasher::new();
        input.hash(&mut hasher);
        let mut state = hasher.finish();
        (0..8)
            .map(|_| {
                state = state.wrapping_mul(0x9E37_79B9_7F4A_7C15).rotate_left(17);
                (state >> 40) as f32 / (1u32 << 24) as f32
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(
        &self,
        content: &str,
        _deployment_name: &str,
    ) -> Result<Vec<f32>, EmbeddingError> {
        Ok(Self::hash_to_vector(content))
    }

    fn identify(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn mock_provider_is_deterministic_and_content_sensitive() {
        let provider = MockEmbeddingProvider::new();
        let first = provider.embed("hello world", "any").await.unwrap();
        let again = provider.embed("hello world", "any").await.unwrap();
        let other = provider.embed("goodbye world", "any").await.unwrap();
        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(first.len(), 8);
    }

    #[tokio::test]
    async fn azure_embedder_parses_successful_response() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/openai/deployments/ada/embeddings")
                    .query_param("api-version", "2023-05-15")
                    .header("api-key", "secret")
                    .json_body(json!({"input": "chunk text"}));
                then.status(200).json_body(json!({
                    "data": [{"embedding": [0.25, -0.5, 1.0], "index": 0}],
                    "model": "ada"
                }));
            })
            .await;

        let embedder = AzureOpenAiEmbedder::new(&server.base_url(), "secret", "2023-05-15").unwrap();
        let vector = embedder.embed("chunk text", "ada").await.unwrap();

        mock.assert_async().await;
        assert_eq!(vector, vec![0.25, -0.5, 1.0]);
    }

    #[tokio::test]
    async fn azure_embedder_maps_429_to_rate_limited() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(429).body("slow down");
            })
            .await;

        let embedder = AzureOpenAiEmbedder::new(&server.base_url(), "secret", "2023-05-15").unwrap();
        let err = embedder.embed("chunk text", "ada").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::RateLimited));
    }

    #[tokio::test]
    async fn azure_embedder_maps_auth_failure_to_fatal() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(401).body("unauthorized");
            })
            .await;

        let embedder = AzureOpenAiEmbedder::new(&server.base_url(), "wrong", "2023-05-15").unwrap();
        let err = embedder.embed("chunk text", "ada").await.unwrap_err();
        match err {
            EmbeddingError::Failed { reason } => {
                assert!(reason.contains("401"), "unexpected reason: {reason}");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn azure_embedder_rejects_empty_data() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).json_body(json!({"data": [], "model": "ada"}));
            })
            .await;

        let embedder = AzureOpenAiEmbedder::new(&server.base_url(), "secret", "2023-05-15").unwrap();
        let err = embedder.embed("chunk text", "ada").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Failed { .. }));
    }

    #[test]
    fn from_settings_requires_credentials() {
        let settings = Settings::default();
        assert!(AzureOpenAiEmbedder::from_settings(&settings).is_err());
    }
}
