use std::sync::LazyLock;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use regex::Regex;
use serde_json::Value;

use super::{forward, ProtocolAdapter};
use crate::config::BackendKind;
use crate::error::{GatewayError, Result};
use crate::server::state::AppState;

/// Model names that may be interpolated into the upstream URL.
static MODEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9\-_.]+$").expect("model name pattern compiles"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeminiAction {
    Generate,
    StreamGenerate,
}

impl GeminiAction {
    fn as_str(&self) -> &'static str {
        match self {
            GeminiAction::Generate => "generateContent",
            GeminiAction::StreamGenerate => "streamGenerateContent",
        }
    }
}

/// Gemini generateContent for one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiAdapter {
    model: String,
    action: GeminiAction,
}

impl GeminiAdapter {
    /// Parse the `{model}:{action}` tail of `/v1/models/...`.
    ///
    /// The model is checked before anything else touches it, so traversal
    /// attempts like `../../etc/passwd` never reach an upstream URL.
    pub fn from_path(tail: &str) -> Result<Self> {
        let (model, action) = tail.rsplit_once(':').ok_or_else(|| GatewayError::BadRequest {
            reason: "expected {model}:generateContent".into(),
        })?;
        if model == "." || model == ".." || !MODEL_RE.is_match(model) {
            return Err(GatewayError::InvalidModel {
                model: model.to_string(),
            });
        }
        let action = match action {
            "generateContent" => GeminiAction::Generate,
            "streamGenerateContent" => GeminiAction::StreamGenerate,
            other => {
                return Err(GatewayError::BadRequest {
                    reason: format!("unsupported action: {other}"),
                })
            }
        };
        Ok(Self {
            model: model.to_string(),
            action,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn action(&self) -> GeminiAction {
        self.action
    }
}

impl ProtocolAdapter for GeminiAdapter {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn route(&self) -> &'static str {
        "/v1/models"
    }

    fn default_backend(&self) -> BackendKind {
        BackendKind::Gemini
    }

    fn content_fields(&self) -> &'static [&'static str] {
        &["systemInstruction", "system_instruction", "contents"]
    }

    fn upstream_path(&self) -> String {
        let path = format!("/models/{}:{}", self.model, self.action.as_str());
        match self.action {
            GeminiAction::Generate => path,
            GeminiAction::StreamGenerate => format!("{path}?alt=sse"),
        }
    }

    fn wants_stream(&self, _body: &Value) -> bool {
        self.action == GeminiAction::StreamGenerate
    }
}

/// `POST /v1/models/{model}:generateContent` and `:streamGenerateContent`
pub async fn handle(
    State(state): State<AppState>,
    Path(tail): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    match GeminiAdapter::from_path(&tail) {
        Ok(adapter) => forward(state, adapter, headers, body).await,
        Err(e) => e.into_response(),
    }
}
