//! Orchestrates tokenize → split → assemble → embed for one document.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{field, info_span};

use crate::assembler::{self, AssemblyOutcome};
use crate::client::EmbeddingClient;
use crate::config::Settings;
use crate::embeddings::SharedEmbeddingProvider;
use crate::splitter::{self, SplitParams};
use crate::tokenizer::TokenEncoder;
use crate::types::{ChunkingResult, ChunkingStats, EmbeddingMetadata, PipelineError};

/// One document's chunk-and-embed pass over shared, read-only configuration.
///
/// Independent documents may be processed from concurrent tasks; the service
/// holds no mutable state. Callers needing an overall deadline should wrap
/// [`process`](ChunkEmbedService::process) in `tokio::time::timeout`.
pub struct ChunkEmbedService {
    settings: Settings,
    tokenizer: Arc<dyn TokenEncoder>,
    client: EmbeddingClient,
}

impl ChunkEmbedService {
    pub fn builder() -> ChunkEmbedServiceBuilder {
        ChunkEmbedServiceBuilder::default()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Chunks `request.text`, embeds every surviving chunk, and returns the
    /// merged records.
    ///
    /// Text that trims to nothing short-circuits to an empty result with zero
    /// embedding calls. Zero or absent request overrides fall back to the
    /// process-wide settings.
    pub async fn process(
        &self,
        request: ProcessRequest,
    ) -> Result<ChunkEmbedResponse, PipelineError> {
        let params = SplitParams {
            num_tokens: resolve_override(request.num_tokens, self.settings.num_tokens),
            token_overlap: resolve_override(request.token_overlap, self.settings.token_overlap),
            min_chunk_size: resolve_override(request.min_chunk_size, self.settings.min_chunk_size),
        };
        params.validate()?;

        let deployment = request
            .embedding_deployment_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.settings.embedding_deployment_name)
            .to_string();
        let sleep_interval = request
            .sleep_interval
            .unwrap_or(self.settings.sleep_interval);

        let span = info_span!(
            "chunk_embed",
            document_id = %request.document_id,
            filepath = %request.filepath,
            num_tokens = params.num_tokens,
            windows = field::Empty,
            chunks = field::Empty,
            rate_limit_retries = field::Empty,
            duration_ms = field::Empty,
        );
        let _entered = span.enter();

        let start = Instant::now();

        if request.text.trim().is_empty() {
            let telemetry = ChunkTelemetry {
                embedder: self.client.provider_label().to_string(),
                deployment,
                duration_ms: start.elapsed().as_millis(),
                stats: ChunkingStats::default(),
                rate_limit_retries: 0,
            };
            span.record("windows", 0usize);
            span.record("chunks", 0usize);
            return Ok(ChunkEmbedResponse {
                result: ChunkingResult::empty(),
                telemetry,
            });
        }

        let tokens = self.tokenizer.encode(&request.text)?;
        let windows = splitter::split(&tokens, params)?;
        let AssemblyOutcome { mut result, stats } =
            assembler::assemble(self.tokenizer.as_ref(), &request.filepath, &tokens, windows)?;

        let contents: Vec<String> = result
            .chunks
            .iter()
            .map(|chunk| chunk.content.clone())
            .collect();
        let batch = self
            .client
            .embed_batch(
                &request.document_id,
                &contents,
                &request.fieldname,
                sleep_interval,
                &deployment,
            )
            .await?;

        merge_embeddings(&mut result, batch.metadata)?;

        let duration_ms = start.elapsed().as_millis();
        span.record("windows", stats.total_windows);
        span.record("chunks", stats.total_chunks);
        span.record("rate_limit_retries", batch.rate_limit_retries);
        span.record("duration_ms", field::display(duration_ms));

        Ok(ChunkEmbedResponse {
            result,
            telemetry: ChunkTelemetry {
                embedder: self.client.provider_label().to_string(),
                deployment,
                duration_ms,
                stats,
                rate_limit_retries: batch.rate_limit_retries,
            },
        })
    }
}

/// Zips embedding metadata back into chunk records, position by position.
///
/// Counts must match exactly; a shortfall indicates a logic defect upstream
/// and aborts the call instead of truncating to the shorter side.
pub fn merge_embeddings(
    result: &mut ChunkingResult,
    metadata: Vec<EmbeddingMetadata>,
) -> Result<(), PipelineError> {
    if result.chunks.len() != metadata.len() {
        return Err(PipelineError::ResultCountMismatch {
            chunks: result.chunks.len(),
            embeddings: metadata.len(),
        });
    }
    for (chunk, entry) in result.chunks.iter_mut().zip(metadata) {
        chunk.embedding_metadata = Some(entry);
    }
    Ok(())
}

fn resolve_override(value: Option<usize>, default: usize) -> usize {
    value.filter(|&v| v != 0).unwrap_or(default)
}

/// Per-document processing input consumed by the service.
#[derive(Clone, Debug)]
pub struct ProcessRequest {
    pub document_id: String,
    pub text: String,
    pub filepath: String,
    pub fieldname: String,
    pub num_tokens: Option<usize>,
    pub token_overlap: Option<usize>,
    pub min_chunk_size: Option<usize>,
    pub embedding_deployment_name: Option<String>,
    pub sleep_interval: Option<Duration>,
}

impl ProcessRequest {
    pub fn new(
        document_id: impl Into<String>,
        text: impl Into<String>,
        filepath: impl Into<String>,
        fieldname: impl Into<String>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            text: text.into(),
            filepath: filepath.into(),
            fieldname: fieldname.into(),
            num_tokens: None,
            token_overlap: None,
            min_chunk_size: None,
            embedding_deployment_name: None,
            sleep_interval: None,
        }
    }

    #[must_use]
    pub fn with_num_tokens(mut self, num_tokens: usize) -> Self {
        self.num_tokens = Some(num_tokens);
        self
    }

    #[must_use]
    pub fn with_token_overlap(mut self, token_overlap: usize) -> Self {
        self.token_overlap = Some(token_overlap);
        self
    }

    #[must_use]
    pub fn with_min_chunk_size(mut self, min_chunk_size: usize) -> Self {
        self.min_chunk_size = Some(min_chunk_size);
        self
    }

    #[must_use]
    pub fn with_deployment_name(mut self, name: impl Into<String>) -> Self {
        self.embedding_deployment_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_sleep_interval(mut self, interval: Duration) -> Self {
        self.sleep_interval = Some(interval);
        self
    }
}

/// Chunk records plus run telemetry for one processed document.
#[derive(Clone, Debug)]
pub struct ChunkEmbedResponse {
    pub result: ChunkingResult,
    pub telemetry: ChunkTelemetry,
}

#[derive(Clone, Debug)]
pub struct ChunkTelemetry {
    pub embedder: String,
    pub deployment: String,
    pub duration_ms: u128,
    pub stats: ChunkingStats,
    pub rate_limit_retries: usize,
}

/// Builder for [`ChunkEmbedService`] instances.
#[derive(Default)]
pub struct ChunkEmbedServiceBuilder {
    settings: Option<Settings>,
    tokenizer: Option<Arc<dyn TokenEncoder>>,
    provider: Option<SharedEmbeddingProvider>,
    max_rate_limit_retries: Option<usize>,
}

impl ChunkEmbedServiceBuilder {
    #[must_use]
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    #[must_use]
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn TokenEncoder>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    #[must_use]
    pub fn with_embedding_provider(mut self, provider: SharedEmbeddingProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn with_max_rate_limit_retries(mut self, retries: usize) -> Self {
        self.max_rate_limit_retries = Some(retries);
        self
    }

    /// Builds the service.
    ///
    /// # Panics
    ///
    /// Panics if no embedding provider was supplied, or if no tokenizer was
    /// supplied and the `tiktoken` feature is disabled.
    pub fn build(self) -> ChunkEmbedService {
        let provider = self
            .provider
            .expect("ChunkEmbedServiceBuilder requires an embedding provider");
        let tokenizer = self.tokenizer.unwrap_or_else(default_tokenizer);
        let mut client = EmbeddingClient::new(provider);
        if let Some(retries) = self.max_rate_limit_retries {
            client = client.with_max_rate_limit_retries(retries);
        }
        ChunkEmbedService {
            settings: self.settings.unwrap_or_default(),
            tokenizer,
            client,
        }
    }
}

#[cfg(feature = "tiktoken")]
fn default_tokenizer() -> Arc<dyn TokenEncoder> {
    Arc::new(crate::tokenizer::TiktokenTokenizer::new())
}

#[cfg(not(feature = "tiktoken"))]
fn default_tokenizer() -> Arc<dyn TokenEncoder> {
    panic!("no default tokenizer without the 'tiktoken' feature; supply one via with_tokenizer")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkRecord;

    fn record(content: &str, index: usize) -> ChunkRecord {
        ChunkRecord::new(content.to_string(), "doc.txt".to_string(), None, index)
    }

    fn metadata(n: usize) -> Vec<EmbeddingMetadata> {
        (0..n)
            .map(|i| EmbeddingMetadata {
                fieldname: "content".to_string(),
                embedding: vec![i as f32],
            })
            .collect()
    }

    #[test]
    fn merge_attaches_metadata_in_order() {
        let mut result = ChunkingResult::new(vec![record("a", 0), record("b", 1)]);
        merge_embeddings(&mut result, metadata(2)).unwrap();
        assert_eq!(
            result.chunks[0].embedding_metadata.as_ref().unwrap().embedding,
            vec![0.0]
        );
        assert_eq!(
            result.chunks[1].embedding_metadata.as_ref().unwrap().embedding,
            vec![1.0]
        );
    }

    #[test]
    fn merge_rejects_short_metadata_instead_of_truncating() {
        let mut result = ChunkingResult::new(vec![record("a", 0), record("b", 1), record("c", 2)]);
        let err = merge_embeddings(&mut result, metadata(2)).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ResultCountMismatch {
                chunks: 3,
                embeddings: 2
            }
        ));
        // Nothing was attached on the failed merge.
        assert!(result.chunks.iter().all(|c| c.embedding_metadata.is_none()));
    }

    #[test]
    fn merge_rejects_surplus_metadata() {
        let mut result = ChunkingResult::new(vec![record("a", 0)]);
        assert!(merge_embeddings(&mut result, metadata(2)).is_err());
    }

    #[test]
    fn zero_overrides_fall_back_to_defaults() {
        assert_eq!(resolve_override(None, 2048), 2048);
        assert_eq!(resolve_override(Some(0), 2048), 2048);
        assert_eq!(resolve_override(Some(512), 2048), 512);
    }
}
