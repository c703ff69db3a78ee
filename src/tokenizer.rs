//! Text ↔ token capability used by the splitter and assembler.

use std::collections::HashMap;

use parking_lot::RwLock;
#[cfg(feature = "tiktoken")]
use std::sync::OnceLock;
#[cfg(feature = "tiktoken")]
use tiktoken_rs::CoreBPE;

use crate::types::PipelineError;

/// Stable, deterministic encoder/decoder pair.
///
/// `decode(encode(text))` need not reproduce `text` byte for byte; whitespace
/// normalization loss is acceptable as long as the semantic content survives.
pub trait TokenEncoder: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<u32>, PipelineError>;
    fn decode(&self, tokens: &[u32]) -> Result<String, PipelineError>;
}

/// cl100k_base tokenizer backed by tiktoken.
#[cfg(feature = "tiktoken")]
#[derive(Clone, Copy, Debug, Default)]
pub struct TiktokenTokenizer;

#[cfg(feature = "tiktoken")]
impl TiktokenTokenizer {
    pub fn new() -> Self {
        Self
    }

    fn encoder() -> Result<&'static CoreBPE, PipelineError> {
        static ENCODER: OnceLock<Option<CoreBPE>> = OnceLock::new();
        ENCODER
            .get_or_init(|| tiktoken_rs::cl100k_base().ok())
            .as_ref()
            .ok_or_else(|| PipelineError::Tokenization {
                reason: "cl100k_base encoder failed to initialize".to_string(),
            })
    }
}

#[cfg(feature = "tiktoken")]
impl TokenEncoder for TiktokenTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>, PipelineError> {
        Ok(Self::encoder()?.encode_with_special_tokens(text))
    }

    fn decode(&self, tokens: &[u32]) -> Result<String, PipelineError> {
        Self::encoder()?
            .decode(tokens.to_vec())
            .map_err(|err| PipelineError::Tokenization {
                reason: err.to_string(),
            })
    }
}

/// Whitespace-delimited tokenizer with an interned vocabulary.
///
/// One token per word, assigned in first-seen order. Decoding joins words
/// with single spaces, so round-trips normalize all whitespace. Useful for
/// offline runs and deterministic tests; not a substitute for a real BPE
/// when token counts must line up with the embedding model's own tokenizer.
#[derive(Debug, Default)]
pub struct WhitespaceTokenizer {
    vocab: RwLock<Vocab>,
}

#[derive(Debug, Default)]
struct Vocab {
    words: Vec<String>,
    ids: HashMap<String, u32>,
}

impl WhitespaceTokenizer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenEncoder for WhitespaceTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>, PipelineError> {
        let mut vocab = self.vocab.write();
        Ok(text
            .split_whitespace()
            .map(|word| match vocab.ids.get(word) {
                Some(&id) => id,
                None => {
                    let id = vocab.words.len() as u32;
                    vocab.words.push(word.to_string());
                    vocab.ids.insert(word.to_string(), id);
                    id
                }
            })
            .collect())
    }

    fn decode(&self, tokens: &[u32]) -> Result<String, PipelineError> {
        let vocab = self.vocab.read();
        let mut words = Vec::with_capacity(tokens.len());
        for &token in tokens {
            let word =
                vocab
                    .words
                    .get(token as usize)
                    .ok_or_else(|| PipelineError::Tokenization {
                        reason: format!("unknown token id {token}"),
                    })?;
            words.push(word.as_str());
        }
        Ok(words.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_round_trip_normalizes_spacing() {
        let tokenizer = WhitespaceTokenizer::new();
        let tokens = tokenizer.encode("alpha   beta\n\tgamma").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokenizer.decode(&tokens).unwrap(), "alpha beta gamma");
    }

    #[test]
    fn whitespace_reuses_ids_for_repeated_words() {
        let tokenizer = WhitespaceTokenizer::new();
        let tokens = tokenizer.encode("go go stop go").unwrap();
        assert_eq!(tokens[0], tokens[1]);
        assert_eq!(tokens[0], tokens[3]);
        assert_ne!(tokens[0], tokens[2]);
    }

    #[test]
    fn whitespace_rejects_unknown_ids() {
        let tokenizer = WhitespaceTokenizer::new();
        let err = tokenizer.decode(&[99]).unwrap_err();
        assert!(matches!(err, PipelineError::Tokenization { .. }));
    }

    #[cfg(feature = "tiktoken")]
    #[test]
    fn tiktoken_round_trips_ascii_text() {
        let tokenizer = TiktokenTokenizer::new();
        let text = "hello world, this is a chunking test";
        let tokens = tokenizer.encode(text).unwrap();
        assert!(!tokens.is_empty());
        assert_eq!(tokenizer.decode(&tokens).unwrap(), text);
    }
}
