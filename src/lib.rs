// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod completion;
pub mod config;
pub mod metrics;
pub mod parse;
pub mod pipeline;
pub mod prompts;
pub mod scoring;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::completion::{CompletionClient, CompletionError, DynCompletionClient};
pub use crate::pipeline::{DecisionRun, PipelineError, RatingMatrix, Stage};
pub use crate::scoring::{fallback_result, FallbackResult, ScoreResult};
pub use crate::store::{DecisionRecord, DecisionStore, DynDecisionStore};
