//! HTTP surface: one route per pipeline stage, plus record read/delete
//! and health. The browser drives the stages one request at a time and
//! holds the in-between state; every handler is a thin shell over
//! `pipeline`.

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::completion::DynCompletionClient;
use crate::pipeline::{self, FinalizeInput, PipelineError, RatingMatrix};
use crate::store::{DecisionRecord, DynDecisionStore};

#[derive(Clone)]
pub struct AppState {
    pub client: DynCompletionClient,
    pub store: DynDecisionStore,
}

impl AppState {
    pub fn new(client: DynCompletionClient, store: DynDecisionStore) -> Self {
        Self { client, store }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/extract-options", post(extract_options))
        .route("/api/extract-categories", post(extract_categories))
        .route("/api/score-options", post(score_options))
        .route("/api/finalize", post(finalize))
        .route("/api/decision/{uid}", get(get_decision).delete(delete_decision))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

// ------------------------------------------------------------
// Error mapping
// ------------------------------------------------------------

/// JSON error body. Upstream error text never leaks here; completion
/// failures surface as a generic apology.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match &err {
            PipelineError::InvalidInput(msg) => Self::bad_request(msg.clone()),
            PipelineError::ExtractionEmpty => Self::bad_request(err.to_string()),
            PipelineError::Completion { stage, source } => {
                error!(stage = stage.as_str(), error = %source, "stage failed");
                Self {
                    status: StatusCode::BAD_GATEWAY,
                    message: "The assistant is unavailable right now. Please try again."
                        .to_string(),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

fn require<T>(field: Option<T>, msg: &str) -> Result<T, ApiError> {
    field.ok_or_else(|| ApiError::bad_request(msg))
}

fn require_str(field: Option<String>, msg: &str) -> Result<String, ApiError> {
    match field {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(ApiError::bad_request(msg)),
    }
}

// ------------------------------------------------------------
// Handlers
// ------------------------------------------------------------

#[derive(Serialize)]
struct HealthResp {
    status: &'static str,
    timestamp: String,
}

async fn health() -> Json<HealthResp> {
    Json(HealthResp {
        status: "ok",
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Deserialize)]
struct ExtractOptionsReq {
    uid: Option<String>,
    prompt: Option<String>,
}

#[derive(Serialize)]
struct ExtractOptionsResp {
    options: Vec<String>,
    raw: String,
}

async fn extract_options(
    State(state): State<AppState>,
    Json(body): Json<ExtractOptionsReq>,
) -> Result<Json<ExtractOptionsResp>, ApiError> {
    let _uid = require_str(body.uid, "Provide uid and prompt")?;
    let prompt = require_str(body.prompt, "Provide uid and prompt")?;

    let out = pipeline::extract_options(&state.client, &prompt).await?;
    Ok(Json(ExtractOptionsResp {
        options: out.options,
        raw: out.raw,
    }))
}

#[derive(Deserialize)]
struct ExtractCategoriesReq {
    uid: Option<String>,
    prompt: Option<String>,
    options: Option<Vec<String>>,
}

#[derive(Serialize)]
struct ExtractCategoriesResp {
    categories: Vec<String>,
    raw: String,
    fallback: bool,
}

async fn extract_categories(
    State(state): State<AppState>,
    Json(body): Json<ExtractCategoriesReq>,
) -> Result<Json<ExtractCategoriesResp>, ApiError> {
    let _uid = require_str(body.uid, "Provide uid, prompt, and options[]")?;
    let prompt = require_str(body.prompt, "Provide uid, prompt, and options[]")?;
    let options = require(body.options, "Provide uid, prompt, and options[]")?;

    let out = pipeline::suggest_categories(&state.client, &prompt, &options).await;
    Ok(Json(ExtractCategoriesResp {
        categories: out.categories,
        raw: out.raw,
        fallback: out.fallback,
    }))
}

#[derive(Deserialize)]
struct ScoreOptionsReq {
    uid: Option<String>,
    prompt: Option<String>,
    options: Option<Vec<String>>,
    categories: Option<Vec<String>>,
}

#[derive(Serialize)]
struct ScoreOptionsResp {
    ratings: RatingMatrix,
    raw: String,
}

async fn score_options(
    State(state): State<AppState>,
    Json(body): Json<ScoreOptionsReq>,
) -> Result<Json<ScoreOptionsResp>, ApiError> {
    const MSG: &str = "Provide uid, prompt, options[], categories[]";
    let _uid = require_str(body.uid, MSG)?;
    let prompt = require_str(body.prompt, MSG)?;
    let options = require(body.options, MSG)?;
    let categories = require(body.categories, MSG)?;
    if options.is_empty() || categories.is_empty() {
        return Err(ApiError::bad_request(MSG));
    }

    let out = pipeline::rate_options(&state.client, &prompt, &options, &categories).await?;
    Ok(Json(ScoreOptionsResp {
        ratings: out.ratings,
        raw: out.raw,
    }))
}

#[derive(Deserialize)]
struct FinalizeReq {
    uid: Option<String>,
    prompt: Option<String>,
    options: Option<Vec<String>>,
    categories: Option<Vec<String>>,
    weights: Option<HashMap<String, f64>>,
    ratings: Option<RatingMatrix>,
}

#[derive(Serialize)]
struct FinalizeResp {
    scores: HashMap<String, f64>,
    winner: Option<String>,
    explanation: String,
    saved: bool,
}

async fn finalize(
    State(state): State<AppState>,
    Json(body): Json<FinalizeReq>,
) -> Result<Json<FinalizeResp>, ApiError> {
    const MSG: &str = "Provide uid, prompt, options[], categories[], weights{}, ratings{}";
    let uid = require_str(body.uid, MSG)?;
    let prompt = require_str(body.prompt, MSG)?;
    let options = require(body.options, MSG)?;
    let categories = require(body.categories, MSG)?;
    let weights = require(body.weights, MSG)?;
    let ratings = require(body.ratings, MSG)?;
    if options.is_empty() || categories.is_empty() {
        return Err(ApiError::bad_request(MSG));
    }

    let outcome = pipeline::finalize(
        &state.client,
        &state.store,
        FinalizeInput {
            uid: &uid,
            query: &prompt,
            options: &options,
            categories: &categories,
            weights: &weights,
            ratings: &ratings,
        },
    )
    .await;

    Ok(Json(FinalizeResp {
        scores: outcome.scores,
        winner: outcome.winner,
        explanation: outcome.explanation,
        saved: outcome.saved,
    }))
}

async fn get_decision(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<Json<DecisionRecord>, ApiError> {
    match state.store.get(&uid).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(ApiError {
            status: StatusCode::NOT_FOUND,
            message: "No decision found for this user".to_string(),
        }),
        Err(err) => {
            error!(error = %err, %uid, "decision read failed");
            Err(ApiError {
                status: StatusCode::BAD_GATEWAY,
                message: "Decision store unavailable".to_string(),
            })
        }
    }
}

async fn delete_decision(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<StatusCode, ApiError> {
    match state.store.delete(&uid).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(err) => {
            error!(error = %err, %uid, "decision delete failed");
            Err(ApiError {
                status: StatusCode::BAD_GATEWAY,
                message: "Decision store unavailable".to_string(),
            })
        }
    }
}
