//! Token-window planning over an encoded document.

use crate::types::PipelineError;

/// Half-open token range `[start, end)` plus the overlap carried in from the
/// preceding window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkWindow {
    pub start: usize,
    pub end: usize,
    pub overlap_with_prev: usize,
}

impl ChunkWindow {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Window sizing knobs for one split pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SplitParams {
    pub num_tokens: usize,
    pub token_overlap: usize,
    pub min_chunk_size: usize,
}

impl SplitParams {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.num_tokens == 0 {
            return Err(PipelineError::SplitConfiguration {
                reason: "num_tokens must be greater than zero".to_string(),
            });
        }
        if self.token_overlap >= self.num_tokens {
            return Err(PipelineError::SplitConfiguration {
                reason: format!(
                    "token_overlap {} must be smaller than num_tokens {}",
                    self.token_overlap, self.num_tokens
                ),
            });
        }
        Ok(())
    }

    fn stride(&self) -> usize {
        self.num_tokens - self.token_overlap
    }
}

/// Plans overlapping windows of `params.num_tokens` tokens over `tokens`,
/// advancing by `num_tokens - token_overlap` each step.
///
/// A trailing window shorter than `min_chunk_size` is folded into its
/// predecessor instead of being emitted on its own; when the whole sequence
/// fits in a single window, that window is kept whatever its size. Windows
/// come out lazily in strictly increasing start order.
pub fn split(tokens: &[u32], params: SplitParams) -> Result<TokenWindows, PipelineError> {
    params.validate()?;
    Ok(TokenWindows {
        len: tokens.len(),
        params,
        next_start: 0,
        done: tokens.is_empty(),
    })
}

/// Single-pass window iterator produced by [`split`].
#[derive(Clone, Debug)]
pub struct TokenWindows {
    len: usize,
    params: SplitParams,
    next_start: usize,
    done: bool,
}

impl Iterator for TokenWindows {
    type Item = ChunkWindow;

    fn next(&mut self) -> Option<ChunkWindow> {
        if self.done {
            return None;
        }

        let start = self.next_start;
        let overlap_with_prev = if start == 0 {
            0
        } else {
            self.params.token_overlap
        };

        let full_end = start + self.params.num_tokens;
        if full_end >= self.len {
            self.done = true;
            return Some(ChunkWindow {
                start,
                end: self.len,
                overlap_with_prev,
            });
        }

        // The next step would produce the final window; if that remnant is
        // below the minimum, extend this window to the end instead.
        let next_start = start + self.params.stride();
        let remainder = self.len - next_start;
        if next_start + self.params.num_tokens >= self.len && remainder < self.params.min_chunk_size
        {
            self.done = true;
            return Some(ChunkWindow {
                start,
                end: self.len,
                overlap_with_prev,
            });
        }

        self.next_start = next_start;
        Some(ChunkWindow {
            start,
            end: full_end,
            overlap_with_prev,
        })
    }
}
