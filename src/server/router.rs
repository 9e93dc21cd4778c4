use std::any::Any;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use super::cors::cors;
use super::state::AppState;
use crate::error::{error_body, GatewayError};
use crate::proxy::{anthropic, gemini, openai};

/// Build the complete axum Router with all API routes.
pub fn build(state: AppState) -> Router {
    Router::new()
        .route("/v1/messages", post(anthropic::handle))
        .route("/v1/chat/completions", post(openai::handle))
        .route("/v1/models/*tail", post(gemini::handle))
        .route("/health", get(health))
        .fallback(not_found)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(cors))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(error_body("not found", "invalid_request_error")),
    )
        .into_response()
}

fn panic_response(_panic: Box<dyn Any + Send + 'static>) -> Response {
    GatewayError::Internal {
        reason: "request handler panicked".into(),
    }
    .into_response()
}
