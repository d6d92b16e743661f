pub mod cache;
pub mod eli5;
pub mod explain;

pub use cache::*;
pub use eli5::*;
pub use explain::*;

use crate::error::AppError;
use crate::health;
use actix_web::{web, HttpResponse};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;

/// Register every route. Shared by `main` and the handler tests so both see the same app.
pub fn configure(cfg: &mut web::ServiceConfig, json_limit_bytes: usize) {
    cfg.app_data(json_config(json_limit_bytes))
        .route("/health", web::get().to(health::health_check))
        .route("/explain", web::post().to(explain_term))
        .route("/explain-batch", web::post().to(explain_batch))
        .route("/clear-cache", web::post().to(clear_cache))
        .service(
            web::scope("/api")
                .route("/health", web::get().to(health::health_check))
                .route("/eli5", web::post().to(eli5))
                .route("/v1/metrics", web::get().to(health::detailed_metrics)),
        )
        .default_service(web::to(not_found));
}

/// JSON extractor settings: body size limit, and malformed bodies answered in the
/// same `{error}` shape as every other failure.
pub fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .error_handler(|err, _req| AppError::from(err).into())
}

async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(json!({ "error": "Not found" }))
}

/// Millisecond-precision UTC timestamp, e.g. `2025-01-01T12:00:00.000Z`.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
