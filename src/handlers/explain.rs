//! # Term Explanation Handlers
//!
//! The cached `{term, context}` contract used by the lecture assistant front end.
//!
//! ## Endpoints:
//! - `POST /explain` - explain one term
//! - `POST /explain-batch` - explain several terms, tolerating per-term failures
//!
//! This contract carries no level field, so every term is explained at `eli5`.

use crate::error::AppError;
use crate::simplifier::{BatchCoordinator, BatchSlot, ExplanationResult, SimplificationLevel};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

const TERM_LEVEL: SimplificationLevel = SimplificationLevel::Eli5;

/// Request body for `POST /explain`.
#[derive(Debug, Deserialize)]
pub struct ExplainRequest {
    #[serde(default)]
    pub term: Option<String>,
    /// Extra lecture context embedded in the prompt. Not part of the cache key.
    #[serde(default)]
    pub context: Option<String>,
}

/// Success body for `POST /explain`, also used for successful batch entries.
#[derive(Debug, Serialize)]
pub struct ExplainResponse {
    pub term: String,
    pub explanation: String,
    pub timestamp: String,
}

impl From<&ExplanationResult> for ExplainResponse {
    fn from(result: &ExplanationResult) -> Self {
        Self {
            term: result.input_text.clone(),
            explanation: result.explanation.clone(),
            timestamp: super::iso_timestamp(result.created_at),
        }
    }
}

/// Request body for `POST /explain-batch`.
#[derive(Debug, Deserialize)]
pub struct ExplainBatchRequest {
    #[serde(default)]
    pub terms: Option<Vec<String>>,
    #[serde(default)]
    pub context: Option<String>,
}

/// One entry of the batch response, index-aligned with the request's `terms`.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum BatchEntry {
    Explained(ExplainResponse),
    Failed {
        term: String,
        explanation: String,
        error: bool,
    },
}

impl From<&BatchSlot> for BatchEntry {
    fn from(slot: &BatchSlot) -> Self {
        match slot {
            BatchSlot::Explained(result) => BatchEntry::Explained(result.into()),
            BatchSlot::Failed { input_text, message } => BatchEntry::Failed {
                term: input_text.clone(),
                explanation: message.to_string(),
                error: true,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExplainBatchResponse {
    pub explanations: Vec<BatchEntry>,
}

/// Explain a single term.
///
/// ## Endpoint: `POST /explain`
///
/// ## Request Body:
/// ```json
/// { "term": "photosynthesis", "context": "biology lecture" }
/// ```
///
/// ## Response:
/// ```json
/// { "term": "photosynthesis", "explanation": "...", "timestamp": "2025-01-01T12:00:00.000Z" }
/// ```
///
/// A repeated term (case and surrounding whitespace ignored) is answered from the cache
/// with the stored result, including the original `term` and `timestamp`.
pub async fn explain_term(
    state: web::Data<AppState>,
    body: web::Json<ExplainRequest>,
) -> Result<HttpResponse, AppError> {
    let request = body.into_inner();

    let term = request
        .term
        .as_deref()
        .filter(|term| !term.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Please provide a term to explain".to_string()))?;

    let result = state
        .simplifier
        .explain(term, request.context.as_deref(), TERM_LEVEL)
        .await?;

    Ok(HttpResponse::Ok().json(ExplainResponse::from(&result)))
}

/// Explain several terms in one call.
///
/// ## Endpoint: `POST /explain-batch`
///
/// Failing terms do not fail the request; their entries look like
/// `{"term": "...", "explanation": "Unable to explain this term right now.", "error": true}`.
/// The call itself only fails for a missing or empty `terms` array, or one longer
/// than `limits.max_batch_items` when that cap is configured.
pub async fn explain_batch(
    state: web::Data<AppState>,
    body: web::Json<ExplainBatchRequest>,
) -> Result<HttpResponse, AppError> {
    let request = body.into_inner();
    let terms = request.terms.unwrap_or_default();

    let outcome = BatchCoordinator::new(&state.simplifier)
        .explain_batch(&terms, request.context.as_deref(), TERM_LEVEL)
        .await?;

    Ok(HttpResponse::Ok().json(ExplainBatchResponse {
        explanations: outcome.results.iter().map(BatchEntry::from).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use crate::handlers::test_support::{init_app, state_with};
    use crate::simplifier::cache::CacheKey;
    use crate::simplifier::testing::StubClient;
    use crate::simplifier::{SimplificationLevel, UpstreamError};
    use actix_web::http::StatusCode;
    use actix_web::test;
    use serde_json::{json, Value};
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_explain_then_cache_hit() {
        let stub = Arc::new(StubClient::new());
        let state = state_with(stub.clone());
        let app = init_app!(state);

        let req = test::TestRequest::post()
            .uri("/explain")
            .set_json(json!({ "term": "Photosynthesis", "context": "biology" }))
            .to_request();
        let first: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(first["term"], "Photosynthesis");
        assert!(first["explanation"].as_str().unwrap().contains("Photosynthesis"));
        assert!(first["timestamp"].is_string());

        let req = test::TestRequest::post()
            .uri("/explain")
            .set_json(json!({ "term": " photosynthesis " }))
            .to_request();
        let second: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(first, second);
        assert_eq!(stub.calls(), 1);
        assert_eq!(state.simplifier.stats().snapshot().explanations_generated, 1);
    }

    #[actix_web::test]
    async fn test_missing_or_blank_term_is_400() {
        let stub = Arc::new(StubClient::new());
        let state = state_with(stub.clone());
        let app = init_app!(state);

        for body in [json!({}), json!({ "term": "" }), json!({ "term": "   " })] {
            let req = test::TestRequest::post().uri("/explain").set_json(body).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["error"], "Please provide a term to explain");
        }
        assert_eq!(stub.calls(), 0);
    }

    #[actix_web::test]
    async fn test_wrong_type_is_400() {
        let state = state_with(Arc::new(StubClient::new()));
        let app = init_app!(state);

        let req = test::TestRequest::post()
            .uri("/explain")
            .set_json(json!({ "term": 42 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().starts_with("Invalid JSON body"));
    }

    #[actix_web::test]
    async fn test_oversized_term_leaves_cache_untouched() {
        let stub = Arc::new(StubClient::new());
        let state = state_with(stub.clone());
        let app = init_app!(state);

        let req = test::TestRequest::post()
            .uri("/explain")
            .set_json(json!({ "term": "x".repeat(10_001) }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.simplifier.cache().len(), 0);
        assert_eq!(stub.calls(), 0);
    }

    #[actix_web::test]
    async fn test_upstream_errors_map_to_status_codes() {
        let stub = Arc::new(
            StubClient::new()
                .failing("locked", UpstreamError::Unauthorized(401))
                .failing("busy", UpstreamError::RateLimited)
                .failing("broken", UpstreamError::GenerationFailed("no content".into()))
                .failing("offline", UpstreamError::TransportFailure("upstream request timed out".into())),
        );
        let state = state_with(stub.clone());
        let app = init_app!(state);

        let cases = [
            ("locked", StatusCode::UNAUTHORIZED),
            ("busy", StatusCode::TOO_MANY_REQUESTS),
            ("broken", StatusCode::INTERNAL_SERVER_ERROR),
            ("offline", StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (term, status) in cases {
            let req = test::TestRequest::post()
                .uri("/explain")
                .set_json(json!({ "term": term }))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), status, "term {}", term);
            let body: Value = test::read_body_json(resp).await;
            assert!(body["error"].is_string());
            assert!(body.get("explanation").is_none());
        }

        assert!(!state
            .simplifier
            .cache()
            .contains(&CacheKey::new("locked", SimplificationLevel::Eli5)));
        assert_eq!(state.simplifier.cache().len(), 0);
    }

    #[actix_web::test]
    async fn test_batch_with_duplicate_and_failure() {
        let stub = Arc::new(StubClient::new().failing("entropy", UpstreamError::GenerationFailed("boom".into())));
        let state = state_with(stub.clone());
        let app = init_app!(state);

        let req = test::TestRequest::post()
            .uri("/explain-batch")
            .set_json(json!({ "terms": ["gravity", "gravity", "entropy"], "context": "physics" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        let explanations = body["explanations"].as_array().unwrap();
        assert_eq!(explanations.len(), 3);
        assert_eq!(explanations[0], explanations[1]);
        assert!(explanations[0].get("error").is_none());
        assert_eq!(
            explanations[2],
            json!({
                "term": "entropy",
                "explanation": "Unable to explain this term right now.",
                "error": true
            })
        );
        assert_eq!(stub.calls(), 2);
    }

    #[actix_web::test]
    async fn test_batch_has_no_default_size_cap() {
        let stub = Arc::new(StubClient::new());
        let state = state_with(stub.clone());
        let app = init_app!(state);

        let terms: Vec<String> = (0..51).map(|i| format!("term {}", i)).collect();
        let req = test::TestRequest::post()
            .uri("/explain-batch")
            .set_json(json!({ "terms": terms }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["explanations"].as_array().unwrap().len(), 51);
        assert_eq!(stub.calls(), 51);
    }

    #[actix_web::test]
    async fn test_batch_rejects_missing_or_empty_terms() {
        let state = state_with(Arc::new(StubClient::new()));
        let app = init_app!(state);

        for body in [json!({}), json!({ "terms": [] })] {
            let req = test::TestRequest::post().uri("/explain-batch").set_json(body).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["error"], "Please provide an array of terms");
        }

        // Not an array
        let req = test::TestRequest::post()
            .uri("/explain-batch")
            .set_json(json!({ "terms": "gravity" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
