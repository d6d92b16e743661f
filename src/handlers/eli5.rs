//! `POST /api/eli5`: the `{text, complexity}` contract used by the text-selection widget.

use crate::error::AppError;
use crate::simplifier::SimplificationLevel;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct Eli5Request {
    #[serde(default)]
    pub text: Option<String>,
    /// One of `eli5`, `eli10`, `eli15`, `summary`. Anything else, including a
    /// non-string value, falls back to `eli5`.
    #[serde(default)]
    pub complexity: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Eli5Response {
    pub success: bool,
    pub explanation: String,
    /// The level actually used, after fallback.
    pub complexity: SimplificationLevel,
    pub original_length: usize,
    pub explanation_length: usize,
}

/// Simplify a passage at the requested level.
///
/// ## Response:
/// ```json
/// { "success": true, "explanation": "...", "complexity": "eli10", "originalLength": 42, "explanationLength": 180 }
/// ```
pub async fn eli5(
    state: web::Data<AppState>,
    body: web::Json<Eli5Request>,
) -> Result<HttpResponse, AppError> {
    let request = body.into_inner();

    let text = request
        .text
        .as_deref()
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Missing or invalid text field".to_string()))?;

    let level = SimplificationLevel::resolve(request.complexity.as_ref().and_then(Value::as_str));
    let result = state.simplifier.explain(text, None, level).await?;

    Ok(HttpResponse::Ok().json(Eli5Response {
        success: true,
        explanation_length: result.explanation_length(),
        explanation: result.explanation,
        complexity: level,
        original_length: text.chars().count(),
    }))
}
