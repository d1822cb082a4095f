use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use runbot_core::AppError;

use crate::AppState;

pub mod webhook;

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/github/webhook", post(webhook::webhook))
        .fallback(not_found)
}

async fn health() -> &'static str { "OK" }

async fn not_found() -> AppError { AppError::Status(StatusCode::NOT_FOUND) }
