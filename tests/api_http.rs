// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /api/health
// - POST /api/extract-options (happy path + validation + empty parse)
// - POST /api/extract-categories (fallback behavior)
// - POST /api/score-options
// - POST /api/finalize (persists, then GET/DELETE /api/decision/{uid})

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value as Json};
use tower::ServiceExt as _; // for `oneshot`

use decision_helper::api::{create_router, AppState};
use decision_helper::completion::{CompletionClient, CompletionError};
use decision_helper::store::{DecisionStore as _, DynDecisionStore, MemoryStore};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

/// Stage-sniffing scripted client: answers each pipeline stage with a
/// canned reply, or fails the stage when the reply is None.
struct ScriptedClient {
    options_reply: Option<&'static str>,
    categories_reply: Option<&'static str>,
    ratings_reply: Option<&'static str>,
    explanation_reply: Option<&'static str>,
}

impl Default for ScriptedClient {
    fn default() -> Self {
        Self {
            options_reply: Some("biking to work | driving to work"),
            categories_reply: Some("cost | time | safety"),
            ratings_reply: Some("biking to work: 9,5,6\ndriving to work: 3,9,7"),
            explanation_reply: Some("Biking comes out ahead on the categories you weighted most."),
        }
    }
}

impl CompletionClient for ScriptedClient {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, CompletionError>> + Send + 'a>> {
        let reply = if prompt.contains("Identify the TWO options") {
            self.options_reply
        } else if prompt.contains("Suggest between 3 and 7 categories") {
            self.categories_reply
        } else if prompt.contains("Rate each option") {
            self.ratings_reply
        } else {
            self.explanation_reply
        };
        Box::pin(async move {
            reply
                .map(str::to_string)
                .ok_or(CompletionError::Status(503))
        })
    }
    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

fn test_router_with(client: ScriptedClient) -> (Router, DynDecisionStore) {
    let store: DynDecisionStore = Arc::new(MemoryStore::new());
    let state = AppState::new(Arc::new(client), store.clone());
    (create_router(state), store)
}

fn test_router() -> Router {
    test_router_with(ScriptedClient::default()).0
}

async fn post_json(app: Router, uri: &str, payload: Json) -> (StatusCode, Json) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    let v: Json = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, v)
}

#[tokio::test]
async fn health_returns_ok_with_timestamp() {
    let app = test_router();

    let req = Request::builder()
        .method("GET")
        .uri("/api/health")
        .body(Body::empty())
        .expect("build GET /api/health");

    let resp = app.oneshot(req).await.expect("oneshot /api/health");
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    let v: Json = serde_json::from_slice(&bytes).expect("parse health json");
    assert_eq!(v["status"], json!("ok"));
    assert!(v["timestamp"].is_string());
}

#[tokio::test]
async fn extract_options_returns_two_options_and_raw() {
    let app = test_router();

    let (status, v) = post_json(
        app,
        "/api/extract-options",
        json!({ "uid": "u1", "prompt": "Should I bike to work or drive?" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let options = v["options"].as_array().expect("options array");
    assert_eq!(options.len(), 2);
    assert_eq!(options[0], json!("biking to work"));
    assert_eq!(options[1], json!("driving to work"));
    assert!(v["raw"].is_string());
}

#[tokio::test]
async fn extract_options_rejects_missing_fields_with_400() {
    let app = test_router();
    let (status, v) = post_json(app, "/api/extract-options", json!({ "uid": "u1" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["error"], json!("Provide uid and prompt"));
}

#[tokio::test]
async fn extract_options_zero_parse_is_400_with_rephrase_message() {
    let (app, _) = test_router_with(ScriptedClient {
        options_reply: Some("   "),
        ..Default::default()
    });
    let (status, v) = post_json(
        app,
        "/api/extract-options",
        json!({ "uid": "u1", "prompt": "hmm" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        v["error"],
        json!("Could not extract options. Please rephrase your decision.")
    );
}

#[tokio::test]
async fn extract_options_upstream_exhaustion_is_502_with_generic_message() {
    let (app, _) = test_router_with(ScriptedClient {
        options_reply: None,
        ..Default::default()
    });
    let (status, v) = post_json(
        app,
        "/api/extract-options",
        json!({ "uid": "u1", "prompt": "bike or drive?" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    // Never the upstream error body.
    let msg = v["error"].as_str().unwrap_or_default();
    assert!(!msg.contains("503"), "raw upstream status must not leak: {msg}");
}

#[tokio::test]
async fn extract_categories_happy_path() {
    let app = test_router();
    let (status, v) = post_json(
        app,
        "/api/extract-categories",
        json!({
            "uid": "u1",
            "prompt": "Should I bike to work or drive?",
            "options": ["biking to work", "driving to work"]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["categories"], json!(["cost", "time", "safety"]));
    assert_eq!(v["fallback"], json!(false));
}

#[tokio::test]
async fn extract_categories_empty_parse_uses_fallback_set() {
    let (app, _) = test_router_with(ScriptedClient {
        categories_reply: Some("|||"),
        ..Default::default()
    });
    let (status, v) = post_json(
        app,
        "/api/extract-categories",
        json!({ "uid": "u1", "prompt": "q", "options": ["a", "b"] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["categories"], json!(["Cost", "Time", "Quality", "Convenience"]));
    assert_eq!(v["fallback"], json!(true));
}

#[tokio::test]
async fn score_options_returns_full_rating_matrix() {
    let app = test_router();
    let (status, v) = post_json(
        app,
        "/api/score-options",
        json!({
            "uid": "u1",
            "prompt": "Should I bike to work or drive?",
            "options": ["biking to work", "driving to work"],
            "categories": ["cost", "time", "safety"]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // 1-10 model output remapped onto 1-5: 9→5, 5→3, 6→3 / 3→2, 9→5, 7→4.
    assert_eq!(v["ratings"]["biking to work"]["cost"], json!(5.0));
    assert_eq!(v["ratings"]["biking to work"]["time"], json!(3.0));
    assert_eq!(v["ratings"]["driving to work"]["cost"], json!(2.0));
    assert_eq!(v["ratings"]["driving to work"]["safety"], json!(4.0));
}

#[tokio::test]
async fn score_options_missing_categories_is_400() {
    let app = test_router();
    let (status, _) = post_json(
        app,
        "/api/score-options",
        json!({ "uid": "u1", "prompt": "q", "options": ["a", "b"] }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn finalize_persists_record_readable_and_deletable() {
    let (app, store) = test_router_with(ScriptedClient::default());

    let (status, v) = post_json(
        app.clone(),
        "/api/finalize",
        json!({
            "uid": "user-9",
            "prompt": "Should I bike to work or drive?",
            "options": ["biking to work", "driving to work"],
            "categories": ["cost", "time", "safety"],
            "weights": { "cost": 5, "time": 3, "safety": 4 },
            "ratings": {
                "biking to work": { "cost": 5, "time": 3, "safety": 3 },
                "driving to work": { "cost": 2, "time": 5, "safety": 4 }
            }
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["winner"], json!("biking to work"));
    assert_eq!(v["saved"], json!(true));
    let bike = v["scores"]["biking to work"].as_f64().unwrap();
    let drive = v["scores"]["driving to work"].as_f64().unwrap();
    assert!(bike > drive, "bike {bike} must beat drive {drive}");

    let rec = store.get("user-9").await.unwrap().expect("persisted record");
    assert_eq!(rec.prompt, "Should I bike to work or drive?");
    let wsum: f64 = rec.weights.values().sum();
    assert!((wsum - 1.0).abs() < 1e-9, "persisted weights are normalized");

    // GET the record over HTTP.
    let req = Request::builder()
        .method("GET")
        .uri("/api/decision/user-9")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // DELETE, then GET should 404.
    let req = Request::builder()
        .method("DELETE")
        .uri("/api/decision/user-9")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let req = Request::builder()
        .method("GET")
        .uri("/api/decision/user-9")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn finalize_degrades_to_generic_explanation_on_completion_failure() {
    let (app, store) = test_router_with(ScriptedClient {
        explanation_reply: None,
        ..Default::default()
    });

    let (status, v) = post_json(
        app,
        "/api/finalize",
        json!({
            "uid": "user-3",
            "prompt": "q",
            "options": ["a", "b"],
            "categories": ["x"],
            "weights": { "x": 1 },
            "ratings": { "a": { "x": 5 }, "b": { "x": 2 } }
        }),
    )
    .await;

    // Degraded success: scores still computed, run not failed.
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["winner"], json!("a"));
    assert_eq!(
        v["explanation"],
        json!("Based on your ratings and priorities, here's how the options compare.")
    );
    assert!(store.get("user-3").await.unwrap().is_some());
}

#[tokio::test]
async fn finalize_missing_weights_is_400() {
    let app = test_router();
    let (status, _) = post_json(
        app,
        "/api/finalize",
        json!({
            "uid": "u",
            "prompt": "q",
            "options": ["a", "b"],
            "categories": ["x"],
            "ratings": { "a": { "x": 5 } }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
