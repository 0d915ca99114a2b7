//! Completion-service client: provider abstraction + retry wrapper.
//!
//! The pipeline treats "send a prompt, get back a string" as an
//! external capability. The concrete provider (OpenRouter) lives behind
//! a trait so tests and local runs can swap in a mock without touching
//! the orchestrator.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::PipelineConfig;

/// Upstream call failure. The pipeline retries these a fixed number of
/// times before giving up on the stage.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion API key is not configured")]
    MissingApiKey,
    #[error("completion service returned HTTP {0}")]
    Status(u16),
    #[error("completion transport error: {0}")]
    Transport(String),
    #[error("completion payload missing expected text field")]
    MalformedPayload,
}

/// Trait object used by the pipeline and the HTTP handlers.
pub trait CompletionClient: Send + Sync {
    /// Send one prompt and return the raw completion text.
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, CompletionError>> + Send + 'a>>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

/// Convenient alias used by callers.
pub type DynCompletionClient = Arc<dyn CompletionClient>;

/// Factory: build a client according to config and environment.
///
/// * If `COMPLETION_TEST_MODE=mock`, returns a deterministic mock.
/// * Else builds the real OpenRouter provider wrapped with the retry
///   policy from the config.
pub fn build_client_from_config(config: &PipelineConfig) -> DynCompletionClient {
    if std::env::var("COMPLETION_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(RetryingClient::new(
            MockProvider::default(),
            config.retries,
            Duration::from_millis(config.retry_base_delay_ms),
        ));
    }

    let provider = OpenRouterProvider::new(config);
    Arc::new(RetryingClient::new(
        provider,
        config.retries,
        Duration::from_millis(config.retry_base_delay_ms),
    ))
}

// ------------------------------------------------------------
// OpenRouter provider
// ------------------------------------------------------------

/// Chat-completions call against OpenRouter. Requires an API key
/// (resolved by `PipelineConfig`, typically from `OPENROUTER_API_KEY`).
pub struct OpenRouterProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenRouterProvider {
    pub fn new(config: &PipelineConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("decision-helper/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            endpoint: config.completion_url.clone(),
        }
    }
}

impl CompletionClient for OpenRouterProvider {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, CompletionError>> + Send + 'a>> {
        Box::pin(async move {
            if self.api_key.is_empty() {
                return Err(CompletionError::MissingApiKey);
            }

            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                messages: Vec<Msg<'a>>,
            }
            #[derive(Deserialize)]
            struct Resp {
                choices: Vec<Choice>,
            }
            #[derive(Deserialize)]
            struct Choice {
                message: ChoiceMsg,
            }
            #[derive(Deserialize)]
            struct ChoiceMsg {
                content: String,
            }

            let req = Req {
                model: &self.model,
                messages: vec![Msg {
                    role: "user",
                    content: prompt,
                }],
            };

            let resp = self
                .http
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&req)
                .send()
                .await
                .map_err(|e| CompletionError::Transport(e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(CompletionError::Status(status.as_u16()));
            }

            let body: Resp = resp
                .json()
                .await
                .map_err(|_| CompletionError::MalformedPayload)?;
            let content = body
                .choices
                .first()
                .map(|c| c.message.content.trim().to_string())
                .unwrap_or_default();
            if content.is_empty() {
                return Err(CompletionError::MalformedPayload);
            }
            Ok(content)
        })
    }
    fn provider_name(&self) -> &'static str {
        "openrouter"
    }
}

// ------------------------------------------------------------
// Mock provider
// ------------------------------------------------------------

/// Deterministic mock for tests and local runs. Sniffs the stage from
/// the prompt text and answers in the shape that stage expects.
#[derive(Default)]
pub struct MockProvider;

impl CompletionClient for MockProvider {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, CompletionError>> + Send + 'a>> {
        let out = if prompt.contains("Identify the TWO options") {
            "Option A | Option B".to_string()
        } else if prompt.contains("Suggest between 3 and 7 categories") {
            "Cost | Time | Quality".to_string()
        } else if prompt.contains("Rate each option") {
            "Option A: 8,6,7\nOption B: 5,9,4".to_string()
        } else {
            "Both options have strengths, but the scores favor the leader. (mock)".to_string()
        };
        Box::pin(async move { Ok(out) })
    }
    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Retry wrapper
// ------------------------------------------------------------

/// Wraps any provider with the pipeline's retry contract: up to
/// `retries + 1` attempts, sleeping `base_delay × attempt_number`
/// between attempts. All attempts exhausted propagates the last error.
pub struct RetryingClient<C: CompletionClient> {
    inner: C,
    retries: u32,
    base_delay: Duration,
}

impl<C: CompletionClient> RetryingClient<C> {
    pub fn new(inner: C, retries: u32, base_delay: Duration) -> Self {
        Self {
            inner,
            retries,
            base_delay,
        }
    }

    async fn complete_impl(&self, prompt: &str) -> Result<String, CompletionError> {
        let mut last_err = None;
        for attempt in 0..=self.retries {
            counter!("completion_calls_total").increment(1);
            match self.inner.complete(prompt).await {
                Ok(out) => return Ok(out),
                Err(err) => {
                    warn!(
                        provider = self.inner.provider_name(),
                        attempt,
                        error = %err,
                        "completion call failed"
                    );
                    counter!("completion_call_failures_total").increment(1);
                    last_err = Some(err);
                    if attempt < self.retries {
                        counter!("completion_retries_total").increment(1);
                        tokio::time::sleep(self.base_delay * (attempt + 1)).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or(CompletionError::MalformedPayload))
    }
}

impl<C: CompletionClient> CompletionClient for RetryingClient<C> {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, CompletionError>> + Send + 'a>> {
        Box::pin(self.complete_impl(prompt))
    }
    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
}
