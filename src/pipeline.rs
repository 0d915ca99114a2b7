//! # Decision Pipeline
//! The four-stage orchestrator: extract options → suggest categories →
//! rate options → finalize. Each stage builds a prompt, awaits the
//! completion client, parses the reply, and hands structured data to
//! the next stage. The orchestrator is the only place with cross-stage
//! state; the builders and parsers stay pure.

use std::collections::HashMap;

use metrics::counter;
use tracing::{info, warn};

use crate::completion::{CompletionError, DynCompletionClient};
use crate::parse;
use crate::prompts;
use crate::scoring::{self, ScoreResult, RATING_SCALE_MAX};
use crate::store::{DecisionRecord, DynDecisionStore};

/// Categories substituted when the suggestion stage yields nothing
/// usable. This stage never blocks progress.
pub const FALLBACK_CATEGORIES: [&str; 4] = ["Cost", "Time", "Quality", "Convenience"];

/// One step of the pipeline, for error reporting and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ExtractOptions,
    ExtractCategories,
    ScoreOptions,
    Finalize,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ExtractOptions => "extract_options",
            Stage::ExtractCategories => "extract_categories",
            Stage::ScoreOptions => "score_options",
            Stage::Finalize => "finalize",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Request rejected before any completion call was made.
    #[error("{0}")]
    InvalidInput(String),
    /// The completion service failed after the full retry budget.
    #[error("completion service unavailable at stage {}", .stage.as_str())]
    Completion {
        stage: Stage,
        #[source]
        source: CompletionError,
    },
    /// The model returned zero usable options. Terminal for the run.
    #[error("Could not extract options. Please rephrase your decision.")]
    ExtractionEmpty,
}

fn stage_counter(stage: Stage) {
    counter!("pipeline_stage_total", "stage" => stage.as_str()).increment(1);
}

// ------------------------------------------------------------
// Stage 1: options
// ------------------------------------------------------------

/// Exactly-two option labels plus the raw completion text.
#[derive(Debug)]
pub struct ExtractedOptions {
    pub options: Vec<String>,
    pub raw: String,
}

/// `AwaitingQuery → OptionsExtracted`. Zero parsed options is a hard
/// failure; more than two keeps the first two (this system is
/// two-option by scope).
pub async fn extract_options(
    client: &DynCompletionClient,
    query: &str,
) -> Result<ExtractedOptions, PipelineError> {
    stage_counter(Stage::ExtractOptions);
    let prompt = prompts::extract_options_prompt(query);
    let raw = client.complete(&prompt).await.map_err(|source| {
        PipelineError::Completion {
            stage: Stage::ExtractOptions,
            source,
        }
    })?;

    let mut options = parse::parse_delimited(&raw);
    if options.is_empty() {
        return Err(PipelineError::ExtractionEmpty);
    }
    options.truncate(2);
    info!(?options, "extracted options");
    Ok(ExtractedOptions { options, raw })
}

// ------------------------------------------------------------
// Stage 2: categories
// ------------------------------------------------------------

pub struct SuggestedCategories {
    pub categories: Vec<String>,
    pub raw: String,
    /// True when the fixed fallback set was substituted.
    pub fallback: bool,
}

/// `OptionsExtracted → CategoriesReady`. Never hard-fails: an empty
/// parse, and even an exhausted completion call, substitute the fixed
/// fallback set so the run keeps moving. The user edits the set
/// client-side before ratings are requested.
pub async fn suggest_categories(
    client: &DynCompletionClient,
    query: &str,
    options: &[String],
) -> SuggestedCategories {
    stage_counter(Stage::ExtractCategories);
    let prompt = prompts::extract_categories_prompt(query, options);
    let raw = match client.complete(&prompt).await {
        Ok(raw) => raw,
        Err(err) => {
            warn!(error = %err, "category suggestion unavailable, using fallback set");
            return fallback_categories();
        }
    };

    let categories = parse::dedup_case_insensitive(parse::parse_delimited(&raw));
    if categories.is_empty() {
        info!("no categories parsed, using fallback set");
        let mut out = fallback_categories();
        out.raw = raw;
        return out;
    }
    info!(?categories, "suggested categories");
    SuggestedCategories {
        categories,
        raw,
        fallback: false,
    }
}

fn fallback_categories() -> SuggestedCategories {
    SuggestedCategories {
        categories: FALLBACK_CATEGORIES.iter().map(|s| s.to_string()).collect(),
        raw: String::new(),
        fallback: true,
    }
}

// ------------------------------------------------------------
// Stage 3: ratings
// ------------------------------------------------------------

/// option → category → rating, on the user-facing 1–5 scale.
pub type RatingMatrix = HashMap<String, HashMap<String, f64>>;

pub struct RatedOptions {
    pub ratings: RatingMatrix,
    pub raw: String,
}

/// Remap the model's native 1–10 rating onto the 1–5 UI scale:
/// `round(raw / 2)` clamped to [1, 5].
pub fn remap_rating(raw: f64) -> f64 {
    (raw / 2.0).round().clamp(1.0, 5.0)
}

/// `CategoriesReady → RatingsReady`. Parses one rating row per option,
/// resolves model labels back to canonical options via the matcher, and
/// fills any unset (option, category) pair with the neutral default 3.
/// Every canonical option always ends up with a complete row.
pub async fn rate_options(
    client: &DynCompletionClient,
    query: &str,
    options: &[String],
    categories: &[String],
) -> Result<RatedOptions, PipelineError> {
    stage_counter(Stage::ScoreOptions);
    let prompt = prompts::score_options_prompt(query, options, categories);
    let raw = client.complete(&prompt).await.map_err(|source| {
        PipelineError::Completion {
            stage: Stage::ScoreOptions,
            source,
        }
    })?;

    let mut ratings = RatingMatrix::new();
    for (label, nums) in parse::parse_rating_lines(&raw) {
        let Some(canonical) = parse::match_option(options, &label) else {
            continue;
        };
        let row: HashMap<String, f64> = categories
            .iter()
            .enumerate()
            .map(|(i, cat)| {
                // A missing number behaves like the model's mid-scale 5,
                // which remaps to the neutral 3.
                let raw_val = nums.get(i).copied().unwrap_or(5.0);
                (cat.clone(), remap_rating(raw_val))
            })
            .collect();
        ratings.insert(canonical.to_string(), row);
    }

    // Neutral default row for any option the model skipped.
    for opt in options {
        ratings.entry(opt.clone()).or_insert_with(|| {
            categories.iter().map(|c| (c.clone(), 3.0)).collect()
        });
    }

    info!(options = options.len(), categories = categories.len(), "rated options");
    Ok(RatedOptions { ratings, raw })
}

// ------------------------------------------------------------
// Stage 4: finalize
// ------------------------------------------------------------

pub struct FinalizeInput<'a> {
    pub uid: &'a str,
    pub query: &'a str,
    pub options: &'a [String],
    pub categories: &'a [String],
    pub weights: &'a HashMap<String, f64>,
    pub ratings: &'a RatingMatrix,
}

pub struct FinalizeOutcome {
    pub scores: ScoreResult,
    pub winner: Option<String>,
    pub explanation: String,
    /// True when the explanation stage degraded to the generic text.
    pub degraded: bool,
    /// False when the write-through failed (logged, never fatal).
    pub saved: bool,
    pub record: DecisionRecord,
}

/// `RatingsReady → Finalized`. Normalizes weights, computes scores via
/// the one canonical scoring function, picks the winner, asks for an
/// explanation, and writes the record through the store.
///
/// Degradation rules: an explanation-stage completion failure yields
/// the generic explanation and the run still succeeds; a persistence
/// failure is logged and flagged but never erases the computed result.
pub async fn finalize(
    client: &DynCompletionClient,
    store: &DynDecisionStore,
    input: FinalizeInput<'_>,
) -> FinalizeOutcome {
    stage_counter(Stage::Finalize);

    let norm_weights = scoring::normalize_weights(input.categories, input.weights);
    let scores = scoring::compute_scores(
        input.options,
        input.categories,
        &norm_weights,
        input.ratings,
        RATING_SCALE_MAX,
    );
    let winner = scoring::pick_winner(input.options, &scores).map(str::to_string);

    let prompt =
        prompts::final_explanation_prompt(input.query, input.options, input.categories, &scores);
    let (explanation, degraded) = match client.complete(&prompt).await {
        Ok(text) => (text, false),
        Err(err) => {
            warn!(error = %err, "explanation unavailable, degrading to generic text");
            counter!("pipeline_explanation_degraded_total").increment(1);
            (scoring::GENERIC_EXPLANATION.to_string(), true)
        }
    };

    let record = DecisionRecord {
        prompt: input.query.to_string(),
        options: input.options.to_vec(),
        categories: input.categories.to_vec(),
        weights: norm_weights,
        scores: scores.clone(),
        result: explanation.clone(),
        timestamp: chrono::Utc::now().timestamp_millis(),
    };

    let saved = match store.put(input.uid, &record).await {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, uid = input.uid, "decision write-through failed");
            counter!("pipeline_persistence_failures_total").increment(1);
            false
        }
    };

    info!(uid = input.uid, winner = ?winner, saved, "decision finalized");
    FinalizeOutcome {
        scores,
        winner,
        explanation,
        degraded,
        saved,
        record,
    }
}

// ------------------------------------------------------------
// Whole-run driver
// ------------------------------------------------------------

/// State of one decision run. The HTTP surface drives the stages one
/// request at a time (the browser holds the state between calls); this
/// driver exists for sequential callers and end-to-end tests, and it
/// documents the legal transitions in one place.
#[derive(Debug)]
pub enum RunState {
    AwaitingQuery,
    OptionsExtracted {
        options: Vec<String>,
    },
    CategoriesReady {
        options: Vec<String>,
        categories: Vec<String>,
    },
    RatingsReady {
        options: Vec<String>,
        categories: Vec<String>,
        ratings: RatingMatrix,
    },
    Finalized,
    Failed {
        stage: Stage,
        reason: String,
    },
}

pub struct DecisionRun {
    pub uid: String,
    pub query: String,
    pub state: RunState,
}

impl DecisionRun {
    pub fn new(uid: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            query: query.into(),
            state: RunState::AwaitingQuery,
        }
    }

    /// Stage 1. Legal only from `AwaitingQuery`.
    pub async fn extract_options(
        &mut self,
        client: &DynCompletionClient,
    ) -> Result<&[String], PipelineError> {
        match self.state {
            RunState::AwaitingQuery => {}
            _ => return Err(PipelineError::InvalidInput("options already extracted".into())),
        }
        match extract_options(client, &self.query).await {
            Ok(out) => {
                self.state = RunState::OptionsExtracted { options: out.options };
                match &self.state {
                    RunState::OptionsExtracted { options } => Ok(options),
                    _ => unreachable!(),
                }
            }
            Err(err) => {
                self.fail(Stage::ExtractOptions, &err);
                Err(err)
            }
        }
    }

    /// Stage 2. Legal only from `OptionsExtracted`.
    pub async fn suggest_categories(
        &mut self,
        client: &DynCompletionClient,
    ) -> Result<&[String], PipelineError> {
        let options = match &self.state {
            RunState::OptionsExtracted { options } => options.clone(),
            _ => return Err(PipelineError::InvalidInput("no confirmed options".into())),
        };
        let out = suggest_categories(client, &self.query, &options).await;
        self.state = RunState::CategoriesReady {
            options,
            categories: out.categories,
        };
        match &self.state {
            RunState::CategoriesReady { categories, .. } => Ok(categories),
            _ => unreachable!(),
        }
    }

    /// User edit hook between stages 2 and 3: replace the category set.
    /// At least one category is required to proceed.
    pub fn set_categories(&mut self, categories: Vec<String>) -> Result<(), PipelineError> {
        if categories.is_empty() {
            return Err(PipelineError::InvalidInput(
                "at least one category is required".into(),
            ));
        }
        match &mut self.state {
            RunState::CategoriesReady { categories: slot, .. } => {
                *slot = categories;
                Ok(())
            }
            _ => Err(PipelineError::InvalidInput("categories not ready".into())),
        }
    }

    /// Stage 3. Legal only from `CategoriesReady`.
    pub async fn rate_options(
        &mut self,
        client: &DynCompletionClient,
    ) -> Result<&RatingMatrix, PipelineError> {
        let (options, categories) = match &self.state {
            RunState::CategoriesReady { options, categories } => {
                (options.clone(), categories.clone())
            }
            _ => return Err(PipelineError::InvalidInput("categories not ready".into())),
        };
        match rate_options(client, &self.query, &options, &categories).await {
            Ok(out) => {
                self.state = RunState::RatingsReady {
                    options,
                    categories,
                    ratings: out.ratings,
                };
                match &self.state {
                    RunState::RatingsReady { ratings, .. } => Ok(ratings),
                    _ => unreachable!(),
                }
            }
            Err(err) => {
                self.fail(Stage::ScoreOptions, &err);
                Err(err)
            }
        }
    }

    /// User edit hook between stages 3 and 4: override one rating.
    pub fn set_rating(&mut self, option: &str, category: &str, value: f64) {
        if let RunState::RatingsReady { ratings, .. } = &mut self.state {
            if let Some(row) = ratings.get_mut(option) {
                row.insert(category.to_string(), value.clamp(1.0, RATING_SCALE_MAX));
            }
        }
    }

    /// Stage 4. Legal only from `RatingsReady`.
    pub async fn finalize(
        &mut self,
        client: &DynCompletionClient,
        store: &DynDecisionStore,
        weights: &HashMap<String, f64>,
    ) -> Result<FinalizeOutcome, PipelineError> {
        let (options, categories, ratings) = match &self.state {
            RunState::RatingsReady {
                options,
                categories,
                ratings,
            } => (options.clone(), categories.clone(), ratings.clone()),
            _ => return Err(PipelineError::InvalidInput("ratings not ready".into())),
        };
        let outcome = finalize(
            client,
            store,
            FinalizeInput {
                uid: &self.uid,
                query: &self.query,
                options: &options,
                categories: &categories,
                weights,
                ratings: &ratings,
            },
        )
        .await;
        self.state = RunState::Finalized;
        Ok(outcome)
    }

    fn fail(&mut self, stage: Stage, err: &PipelineError) {
        self.state = RunState::Failed {
            stage,
            reason: err.to_string(),
        };
    }
}
