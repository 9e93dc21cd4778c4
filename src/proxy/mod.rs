//! Protocol adapters: one per upstream wire format.
//!
//! An adapter knows which top-level fields of its request body carry free
//! text, where the upstream endpoint lives relative to the backend's base URL,
//! and whether the caller asked for a stream. Everything else (body limits,
//! sanitizing, the upstream call, restoration) is shared in [`forward`].

pub mod anthropic;
pub mod forward;
pub mod gemini;
pub mod openai;

use axum::http::HeaderMap;
use serde_json::Value;

use crate::config::BackendKind;

pub use forward::forward;

/// Wire-format specifics of one API route.
pub trait ProtocolAdapter: Send + Sync {
    /// Short protocol name used in logs.
    fn name(&self) -> &'static str;

    /// Inbound route, also the key for backend overrides.
    fn route(&self) -> &'static str;

    fn default_backend(&self) -> BackendKind;

    /// Top-level request fields that are sanitized. All other fields are
    /// forwarded untouched.
    fn content_fields(&self) -> &'static [&'static str];

    /// Path (and query) appended to the backend base URL.
    fn upstream_path(&self) -> String;

    /// Whether the caller asked for a streamed response.
    fn wants_stream(&self, body: &Value) -> bool;

    /// Inbound headers to pass through to the upstream, with defaults for
    /// absent ones.
    fn passthrough_headers(&self, _inbound: &HeaderMap) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

/// `"stream": true` in the request body.
pub(crate) fn stream_flag(body: &Value) -> bool {
    body.get("stream").and_then(Value::as_bool).unwrap_or(false)
}
