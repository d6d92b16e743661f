use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ClearCacheResponse {
    pub message: String,
}

/// `POST /clear-cache`: drop every cached explanation and report how many there were.
pub async fn clear_cache(state: web::Data<AppState>) -> HttpResponse {
    let removed = state.simplifier.clear_cache();

    HttpResponse::Ok().json(ClearCacheResponse {
        message: format!("Cache cleared! {} entries removed.", removed),
    })
}
