use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bounded, token-aligned piece of a source document, the unit handed to
/// the search indexer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: Uuid,
    pub content: String,
    pub filepath: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_metadata: Option<EmbeddingMetadata>,
}

impl ChunkRecord {
    pub fn new(content: String, filepath: String, page_number: Option<u32>, index: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            content,
            filepath,
            page_number,
            index,
            embedding_metadata: None,
        }
    }
}

/// Field association and vector produced for one chunk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingMetadata {
    pub fieldname: String,
    pub embedding: Vec<f32>,
}

/// Ordered chunk records for one input document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkingResult {
    pub chunks: Vec<ChunkRecord>,
    pub total_chunks: usize,
}

impl ChunkingResult {
    pub fn new(chunks: Vec<ChunkRecord>) -> Self {
        let total_chunks = chunks.len();
        Self {
            chunks,
            total_chunks,
        }
    }

    pub fn empty() -> Self {
        Self {
            chunks: Vec::new(),
            total_chunks: 0,
        }
    }
}

/// Basic runtime stats for diagnostics.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ChunkingStats {
    pub total_windows: usize,
    pub total_chunks: usize,
    pub average_tokens: f32,
}

/// Errors the pipeline surfaces to its caller.
///
/// Each failure class keeps its own variant so the excluded HTTP layer can
/// map them to distinct responses instead of a generic 500.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("tokenization failed: {reason}")]
    Tokenization { reason: String },

    #[error("invalid split configuration: {reason}")]
    SplitConfiguration { reason: String },

    #[error("embedding failed for document '{document_id}' at chunk {chunk_index}: {reason}")]
    EmbeddingFatal {
        document_id: String,
        chunk_index: usize,
        reason: String,
    },

    #[error("chunk/embedding count mismatch: {chunks} chunks, {embeddings} embeddings")]
    ResultCountMismatch { chunks: usize, embeddings: usize },

    #[error("invalid settings: {reason}")]
    InvalidSettings { reason: String },
}
