//! Sequential embedding of chunk batches with rate-limit pacing.

use std::time::Duration;

use tracing::warn;

use crate::embeddings::{EmbeddingError, SharedEmbeddingProvider};
use crate::types::{EmbeddingMetadata, PipelineError};

/// Upper bound on fixed-delay retries for a single chunk before the batch is
/// abandoned.
pub const DEFAULT_MAX_RATE_LIMIT_RETRIES: usize = 60;

/// Ordered embedding metadata plus pacing counters for telemetry.
#[derive(Clone, Debug, Default)]
pub struct EmbedBatchOutcome {
    pub metadata: Vec<EmbeddingMetadata>,
    pub rate_limit_retries: usize,
}

/// Issues one embedding request per chunk, in order, pausing on rate-limit
/// signals instead of failing.
pub struct EmbeddingClient {
    provider: SharedEmbeddingProvider,
    max_rate_limit_retries: usize,
}

impl EmbeddingClient {
    pub fn new(provider: SharedEmbeddingProvider) -> Self {
        Self {
            provider,
            max_rate_limit_retries: DEFAULT_MAX_RATE_LIMIT_RETRIES,
        }
    }

    #[must_use]
    pub fn with_max_rate_limit_retries(mut self, retries: usize) -> Self {
        self.max_rate_limit_retries = retries;
        self
    }

    /// Label of the underlying provider, for telemetry.
    pub fn provider_label(&self) -> &'static str {
        self.provider.identify()
    }

    /// Embeds every content in order, one-to-one with the input.
    ///
    /// A rate-limit signal pauses the batch for `sleep_interval` and retries
    /// the same chunk, up to the configured bound. Any other provider failure
    /// aborts immediately; partial results are discarded rather than returned
    /// inconsistently.
    pub async fn embed_batch(
        &self,
        document_id: &str,
        contents: &[String],
        fieldname: &str,
        sleep_interval: Duration,
        deployment_name: &str,
    ) -> Result<EmbedBatchOutcome, PipelineError> {
        let mut outcome = EmbedBatchOutcome {
            metadata: Vec::with_capacity(contents.len()),
            rate_limit_retries: 0,
        };

        for (chunk_index, content) in contents.iter().enumerate() {
            let mut attempts = 0usize;
            let embedding = loop {
                match self.provider.embed(content, deployment_name).await {
                    Ok(vector) => break vector,
                    Err(EmbeddingError::RateLimited) => {
                        attempts += 1;
                        if attempts > self.max_rate_limit_retries {
                            return Err(PipelineError::EmbeddingFatal {
                                document_id: document_id.to_string(),
                                chunk_index,
                                reason: format!(
                                    "rate limit persisted after {} retries",
                                    self.max_rate_limit_retries
                                ),
                            });
                        }
                        outcome.rate_limit_retries += 1;
                        warn!(
                            document_id,
                            chunk_index, attempts, "embedding endpoint rate limited, pausing batch"
                        );
                        tokio::time::sleep(sleep_interval).await;
                    }
                    Err(EmbeddingError::Failed { reason }) => {
                        return Err(PipelineError::EmbeddingFatal {
                            document_id: document_id.to_string(),
                            chunk_index,
                            reason,
                        });
                    }
                }
            };
            outcome.metadata.push(EmbeddingMetadata {
                fieldname: fieldname.to_string(),
                embedding,
            });
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::EmbeddingProvider;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Instant;

    /// Returns a vector encoding the content length so ordering is visible in
    /// the output; rate-limits exactly once, on the `trip_at`-th call.
    struct RateLimitOnce {
        calls: AtomicUsize,
        trip_at: usize,
        tripped: AtomicBool,
    }

    impl RateLimitOnce {
        fn new(trip_at: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                trip_at,
                tripped: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for RateLimitOnce {
        async fn embed(
            &self,
            content: &str,
            _deployment_name: &str,
        ) -> Result<Vec<f32>, EmbeddingError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.trip_at && !self.tripped.swap(true, Ordering::SeqCst) {
                return Err(EmbeddingError::RateLimited);
            }
            Ok(vec![content.len() as f32])
        }
    }

    struct AlwaysRateLimited {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for AlwaysRateLimited {
        async fn embed(
            &self,
            _content: &str,
            _deployment_name: &str,
        ) -> Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(EmbeddingError::RateLimited)
        }
    }

    struct AuthFailure {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for AuthFailure {
        async fn embed(
            &self,
            _content: &str,
            _deployment_name: &str,
        ) -> Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(EmbeddingError::Failed {
                reason: "401 unauthorized".to_string(),
            })
        }
    }

    fn contents() -> Vec<String> {
        vec![
            "a".to_string(),
            "bb".to_string(),
            "ccc".to_string(),
            "dddd".to_string(),
            "eeeee".to_string(),
        ]
    }

    #[tokio::test]
    async fn retries_rate_limited_chunk_once_and_preserves_order() {
        let provider = Arc::new(RateLimitOnce::new(3));
        let client = EmbeddingClient::new(provider.clone());
        let sleep_interval = Duration::from_millis(20);

        let started = Instant::now();
        let outcome = client
            .embed_batch("doc-1", &contents(), "content", sleep_interval, "ada")
            .await
            .unwrap();

        assert!(started.elapsed() >= sleep_interval);
        assert_eq!(outcome.rate_limit_retries, 1);
        // 5 chunks plus exactly one retry for the third.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 6);
        assert_eq!(outcome.metadata.len(), 5);
        for (index, metadata) in outcome.metadata.iter().enumerate() {
            assert_eq!(metadata.fieldname, "content");
            assert_eq!(metadata.embedding, vec![(index + 1) as f32]);
        }
    }

    #[tokio::test]
    async fn fatal_failure_aborts_batch_with_offending_index() {
        let provider = Arc::new(AuthFailure {
            calls: AtomicUsize::new(0),
        });
        let client = EmbeddingClient::new(provider.clone());

        let err = client
            .embed_batch("doc-2", &contents(), "content", Duration::from_millis(1), "ada")
            .await
            .unwrap_err();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        match err {
            PipelineError::EmbeddingFatal {
                document_id,
                chunk_index,
                reason,
            } => {
                assert_eq!(document_id, "doc-2");
                assert_eq!(chunk_index, 0);
                assert!(reason.contains("401"));
            }
            other => panic!("expected EmbeddingFatal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhausted_rate_limit_retries_become_fatal() {
        let provider = Arc::new(AlwaysRateLimited {
            calls: AtomicUsize::new(0),
        });
        let client = EmbeddingClient::new(provider.clone()).with_max_rate_limit_retries(2);

        let err = client
            .embed_batch(
                "doc-3",
                &["only".to_string()],
                "content",
                Duration::from_millis(1),
                "ada",
            )
            .await
            .unwrap_err();

        // Initial call plus two retries.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            err,
            PipelineError::EmbeddingFatal { chunk_index: 0, .. }
        ));
    }

    #[tokio::test]
    async fn empty_batch_makes_no_calls() {
        let provider = Arc::new(AuthFailure {
            calls: AtomicUsize::new(0),
        });
        let client = EmbeddingClient::new(provider.clone());

        let outcome = client
            .embed_batch("doc-4", &[], "content", Duration::from_millis(1), "ada")
            .await
            .unwrap();

        assert!(outcome.metadata.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}
