//! Turns planned token windows into chunk records with position metadata.

use std::sync::OnceLock;

use regex::Regex;

use crate::splitter::ChunkWindow;
use crate::tokenizer::TokenEncoder;
use crate::types::{ChunkRecord, ChunkingResult, ChunkingStats, PipelineError};

/// Chunk records plus the window-level stats gathered while building them.
#[derive(Clone, Debug)]
pub struct AssemblyOutcome {
    pub result: ChunkingResult,
    pub stats: ChunkingStats,
}

/// Extracts a page number from markers embedded in the file path, e.g.
/// `manual-page-12.pdf` or `report_page3.txt`.
pub fn page_number_from_path(filepath: &str) -> Option<u32> {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    let marker =
        MARKER.get_or_init(|| Regex::new(r"(?i)page[-_]?(\d+)").expect("page marker pattern"));
    marker
        .captures(filepath)
        .and_then(|caps| caps.get(1))
        .and_then(|digits| digits.as_str().parse().ok())
}

/// Decodes each window back to text and builds the ordered chunk records.
///
/// Windows whose decoded text trims to nothing are dropped without consuming
/// an index, so surviving records stay contiguous from zero. Tokenizer
/// failures propagate; everything else is total.
pub fn assemble<I>(
    tokenizer: &dyn TokenEncoder,
    filepath: &str,
    tokens: &[u32],
    windows: I,
) -> Result<AssemblyOutcome, PipelineError>
where
    I: IntoIterator<Item = ChunkWindow>,
{
    let page_number = page_number_from_path(filepath);

    let mut chunks = Vec::new();
    let mut total_windows = 0usize;
    let mut token_sum = 0usize;

    for window in windows {
        total_windows += 1;
        let text = tokenizer.decode(&tokens[window.start..window.end])?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        token_sum += window.len();
        chunks.push(ChunkRecord::new(
            trimmed.to_string(),
            filepath.to_string(),
            page_number,
            chunks.len(),
        ));
    }

    let total_chunks = chunks.len();
    let average_tokens = if total_chunks == 0 {
        0.0
    } else {
        token_sum as f32 / total_chunks as f32
    };

    Ok(AssemblyOutcome {
        result: ChunkingResult::new(chunks),
        stats: ChunkingStats {
            total_windows,
            total_chunks,
            average_tokens,
        },
    })
}
