use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid request body: {reason}")]
    BadRequest { reason: String },

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("invalid model name: {model}")]
    InvalidModel { model: String },

    #[error("backend not configured: {backend}")]
    BackendNotConfigured { backend: String },

    #[error("upstream timeout after {timeout_secs}s")]
    UpstreamTimeout { timeout_secs: u64 },

    #[error("upstream transport error: {reason}")]
    Upstream { reason: String },

    #[error("invalid detector pattern: {reason}")]
    InvalidPattern { reason: String },

    #[error("config parse error in {path}: {reason}")]
    ConfigParse { path: PathBuf, reason: String },

    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },

    #[error("server error: {reason}")]
    Server { reason: String },

    #[error("internal error: {reason}")]
    Internal { reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest { .. }
            | GatewayError::BodyTooLarge { .. }
            | GatewayError::InvalidModel { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the caller. Transport and internal failures stay generic.
    fn public_message(&self) -> String {
        match self {
            GatewayError::BadRequest { .. }
            | GatewayError::BodyTooLarge { .. }
            | GatewayError::InvalidModel { .. }
            | GatewayError::BackendNotConfigured { .. } => self.to_string(),
            _ => "internal gateway error".to_string(),
        }
    }
}

/// JSON error body in the shape agents already parse for OpenAI-style APIs.
pub fn error_body(message: &str, kind: &str) -> serde_json::Value {
    serde_json::json!({ "error": { "message": message, "type": kind } })
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = if status.is_client_error() {
            "invalid_request_error"
        } else {
            "gateway_error"
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }
        let body = error_body(&self.public_message(), kind);
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_400() {
        let err = GatewayError::InvalidModel {
            model: "../x".into(),
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.public_message().contains("../x"));
    }

    #[test]
    fn transport_errors_hide_detail() {
        let err = GatewayError::Upstream {
            reason: "dns failure for internal.example".into(),
        };
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "internal gateway error");
    }

    #[test]
    fn missing_backend_is_explicit() {
        let err = GatewayError::BackendNotConfigured {
            backend: "gemini".into(),
        };
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "backend not configured: gemini");
    }
}
