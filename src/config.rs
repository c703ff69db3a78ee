//! Process-wide configuration resolved once from the environment.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::types::PipelineError;

pub const DEFAULT_NUM_TOKENS: usize = 2048;
pub const DEFAULT_TOKEN_OVERLAP: usize = 0;
pub const DEFAULT_MIN_CHUNK_SIZE: usize = 10;
pub const DEFAULT_SLEEP_INTERVAL_SECONDS: u64 = 1;
pub const DEFAULT_EMBEDDING_DEPLOYMENT: &str = "text-embedding-ada-002";
pub const DEFAULT_API_VERSION: &str = "2023-05-15";

/// Immutable chunking defaults and embedding endpoint credentials.
///
/// Read once at startup and passed by reference into the service; per-call
/// request fields override the chunking knobs, never the credentials.
#[derive(Clone, Debug)]
pub struct Settings {
    pub num_tokens: usize,
    pub token_overlap: usize,
    pub min_chunk_size: usize,
    pub sleep_interval: Duration,
    pub embedding_deployment_name: String,
    pub service_name: Option<String>,
    pub api_key: Option<String>,
    pub api_version: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            num_tokens: DEFAULT_NUM_TOKENS,
            token_overlap: DEFAULT_TOKEN_OVERLAP,
            min_chunk_size: DEFAULT_MIN_CHUNK_SIZE,
            sleep_interval: Duration::from_secs(DEFAULT_SLEEP_INTERVAL_SECONDS),
            embedding_deployment_name: DEFAULT_EMBEDDING_DEPLOYMENT.to_string(),
            service_name: None,
            api_key: None,
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }
}

impl Settings {
    /// Loads settings from the process environment (including any `.env`
    /// file), falling back to defaults for anything unset.
    ///
    /// Environment contract: `NUM_TOKENS`, `TOKEN_OVERLAP`, `MIN_CHUNK_SIZE`,
    /// `AZURE_OPENAI_EMBEDDING_SLEEP_INTERVAL_SECONDS`,
    /// `AZURE_OPENAI_EMBEDDING_DEPLOYMENT`, `AZURE_OPENAI_SERVICE_NAME`,
    /// `AZURE_OPENAI_API_KEY`, `AZURE_OPENAI_API_VERSION`.
    pub fn from_env() -> Result<Self, PipelineError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        Ok(Self {
            num_tokens: parse_var("NUM_TOKENS", defaults.num_tokens)?,
            token_overlap: parse_var("TOKEN_OVERLAP", defaults.token_overlap)?,
            min_chunk_size: parse_var("MIN_CHUNK_SIZE", defaults.min_chunk_size)?,
            sleep_interval: Duration::from_secs(parse_var(
                "AZURE_OPENAI_EMBEDDING_SLEEP_INTERVAL_SECONDS",
                DEFAULT_SLEEP_INTERVAL_SECONDS,
            )?),
            embedding_deployment_name: std::env::var("AZURE_OPENAI_EMBEDDING_DEPLOYMENT")
                .unwrap_or(defaults.embedding_deployment_name),
            service_name: std::env::var("AZURE_OPENAI_SERVICE_NAME").ok(),
            api_key: std::env::var("AZURE_OPENAI_API_KEY").ok(),
            api_version: std::env::var("AZURE_OPENAI_API_VERSION").unwrap_or(defaults.api_version),
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T, PipelineError>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|err| PipelineError::InvalidSettings {
                reason: format!("{name}={raw}: {err}"),
            }),
        Err(_) => Ok(default),
    }
}
