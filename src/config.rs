// src/config.rs
//! Pipeline configuration: every field enumerated, every default
//! documented. Loaded from `config/pipeline.json`; a missing or broken
//! file falls back to full defaults so local runs always boot.

use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.json";

fn default_model() -> String {
    "google/gemini-2.5-flash".to_string()
}
fn default_completion_url() -> String {
    "https://openrouter.ai/api/v1/chat/completions".to_string()
}
fn default_api_key() -> String {
    // "ENV" means: resolve from OPENROUTER_API_KEY at load time.
    "ENV".to_string()
}
fn default_retries() -> u32 {
    2
}
fn default_retry_base_delay_ms() -> u64 {
    500
}
fn default_request_timeout_secs() -> u64 {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Completion model identifier passed through to the provider.
    #[serde(default = "default_model")]
    pub model: String,
    /// Chat-completions endpoint.
    #[serde(default = "default_completion_url")]
    pub completion_url: String,
    /// "ENV" means: read from OPENROUTER_API_KEY.
    #[serde(default = "default_api_key")]
    pub api_key: String,
    /// Extra attempts after the first failed completion call.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Backoff base; attempt N sleeps `base × N` before retrying.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Per-request timeout on the completion transport.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Base URL of the REST key-value store for decision records.
    /// Absent ⇒ in-memory store (local runs, tests).
    #[serde(default)]
    pub database_url: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            completion_url: default_completion_url(),
            api_key: default_api_key(),
            retries: default_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            database_url: None,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file, then resolve the API key and sanitize.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut cfg: PipelineConfig = serde_json::from_str(&data)?;
        cfg.resolve_api_key();
        cfg.sanitize();
        Ok(cfg)
    }

    /// Like `load_from_file`, but a missing or broken file falls back
    /// to defaults (still resolving the key from the environment).
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::load_from_file(path).unwrap_or_else(|_| {
            let mut cfg = Self::default();
            cfg.resolve_api_key();
            cfg
        })
    }

    /// Resolve the "ENV" sentinel against OPENROUTER_API_KEY. A missing
    /// variable leaves the key empty; the provider reports that as
    /// `MissingApiKey` on first use rather than failing boot.
    fn resolve_api_key(&mut self) {
        if self.api_key.trim().eq_ignore_ascii_case("env") {
            self.api_key = env::var("OPENROUTER_API_KEY").unwrap_or_default();
        }
    }

    fn sanitize(&mut self) {
        if self.retries > 10 {
            self.retries = default_retries();
        }
        if self.retry_base_delay_ms == 0 || self.retry_base_delay_ms > 60_000 {
            self.retry_base_delay_ms = default_retry_base_delay_ms();
        }
        if self.request_timeout_secs == 0 || self.request_timeout_secs > 120 {
            self.request_timeout_secs = default_request_timeout_secs();
        }
    }
}
