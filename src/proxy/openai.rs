use axum::body::Body;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use serde_json::Value;

use super::{forward, stream_flag, ProtocolAdapter};
use crate::config::BackendKind;
use crate::server::state::AppState;

/// OpenAI Chat Completions and compatible backends.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiAdapter;

impl ProtocolAdapter for OpenAiAdapter {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn route(&self) -> &'static str {
        "/v1/chat/completions"
    }

    fn default_backend(&self) -> BackendKind {
        BackendKind::OpenAi
    }

    // The system prompt travels inside `messages`; `system` is accepted for
    // compatible backends that take it at top level.
    fn content_fields(&self) -> &'static [&'static str] {
        &["system", "messages"]
    }

    fn upstream_path(&self) -> String {
        "/chat/completions".to_string()
    }

    fn wants_stream(&self, body: &Value) -> bool {
        stream_flag(body)
    }
}

/// `POST /v1/chat/completions`
pub async fn handle(State(state): State<AppState>, headers: HeaderMap, body: Body) -> Response {
    forward(state, OpenAiAdapter, headers, body).await
}
