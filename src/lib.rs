//! Token-bounded chunking and embedding pipeline for search indexing.
//!
//! ```text
//! raw text + metadata ──► tokenizer::TokenEncoder ──► Vec<u32>
//!                                                       │
//!             splitter::split ◄─────────────────────────┘
//!                   │ (lazy overlapping windows)
//!                   ▼
//!             assembler::assemble ──► ChunkingResult
//!                                          │
//!      client::EmbeddingClient ◄───────────┘ (one request per chunk,
//!                   │                         rate-limit pacing)
//!                   ▼
//!      embeddings::EmbeddingProvider (remote capability)
//!
//! service::ChunkEmbedService::process wires the stages together and merges
//! the embeddings back into the chunk records for the caller.
//! ```

pub mod assembler;
pub mod client;
pub mod config;
pub mod embeddings;
pub mod service;
pub mod splitter;
pub mod tokenizer;
pub mod types;

pub use assembler::{AssemblyOutcome, assemble, page_number_from_path};
pub use client::{DEFAULT_MAX_RATE_LIMIT_RETRIES, EmbedBatchOutcome, EmbeddingClient};
pub use config::Settings;
pub use embeddings::{
    AzureOpenAiEmbedder, EmbeddingError, EmbeddingProvider, MockEmbeddingProvider,
    SharedEmbeddingProvider,
};
pub use service::{
    ChunkEmbedResponse, ChunkEmbedService, ChunkTelemetry, ProcessRequest, merge_embeddings,
};
pub use splitter::{ChunkWindow, SplitParams, TokenWindows, split};
#[cfg(feature = "tiktoken")]
pub use tokenizer::TiktokenTokenizer;
pub use tokenizer::{TokenEncoder, WhitespaceTokenizer};
pub use types::{ChunkRecord, ChunkingResult, ChunkingStats, EmbeddingMetadata, PipelineError};
