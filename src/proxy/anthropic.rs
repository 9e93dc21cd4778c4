use axum::body::Body;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use serde_json::Value;

use super::{forward, stream_flag, ProtocolAdapter};
use crate::config::BackendKind;
use crate::server::state::AppState;

/// Version sent when the caller does not name one.
pub const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicAdapter;

impl ProtocolAdapter for AnthropicAdapter {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn route(&self) -> &'static str {
        "/v1/messages"
    }

    fn default_backend(&self) -> BackendKind {
        BackendKind::Anthropic
    }

    fn content_fields(&self) -> &'static [&'static str] {
        &["system", "messages"]
    }

    fn upstream_path(&self) -> String {
        "/messages".to_string()
    }

    fn wants_stream(&self, body: &Value) -> bool {
        stream_flag(body)
    }

    fn passthrough_headers(&self, inbound: &HeaderMap) -> Vec<(&'static str, String)> {
        let header = |name: &str| {
            inbound
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let mut headers = vec![(
            "anthropic-version",
            header("anthropic-version").unwrap_or_else(|| DEFAULT_ANTHROPIC_VERSION.to_string()),
        )];
        if let Some(beta) = header("anthropic-beta") {
            headers.push(("anthropic-beta", beta));
        }
        headers
    }
}

/// `POST /v1/messages`
pub async fn handle(State(state): State<AppState>, headers: HeaderMap, body: Body) -> Response {
    forward(state, AnthropicAdapter, headers, body).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    #[test]
    fn test_version_defaults() {
        let headers = AnthropicAdapter.passthrough_headers(&HeaderMap::new());
        assert_eq!(
            headers,
            vec![("anthropic-version", DEFAULT_ANTHROPIC_VERSION.to_string())]
        );
    }

    #[test]
    fn test_version_and_beta_forwarded() {
        let mut inbound = HeaderMap::new();
        inbound.insert("anthropic-version", HeaderValue::from_static("2024-01-01"));
        inbound.insert("anthropic-beta", HeaderValue::from_static("tools-2024"));
        inbound.insert("x-api-key", HeaderValue::from_static("caller-key"));
        let headers = AnthropicAdapter.passthrough_headers(&inbound);
        assert_eq!(headers.len(), 2);
        assert!(headers.contains(&("anthropic-version", "2024-01-01".to_string())));
        assert!(headers.contains(&("anthropic-beta", "tools-2024".to_string())));
    }

    #[test]
    fn test_stream_flag() {
        assert!(AnthropicAdapter.wants_stream(&json!({"stream": true})));
        assert!(!AnthropicAdapter.wants_stream(&json!({"stream": "yes"})));
        assert!(!AnthropicAdapter.wants_stream(&json!({})));
    }
}
