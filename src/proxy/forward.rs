use axum::body::{Body, Bytes};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use serde_json::Value;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use super::ProtocolAdapter;
use crate::config::{BackendKind, ResolvedBackend};
use crate::error::{GatewayError, Result};
use crate::restore::{restore_body, sse::restore_stream};
use crate::sanitize::{reserve_placeholders, MappingTable};
use crate::server::state::AppState;

/// Run one request through the sanitize, forward, restore pipeline.
///
/// Never fails: errors become their HTTP response inside the request span.
pub async fn forward<A: ProtocolAdapter>(
    state: AppState,
    adapter: A,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!(
        "proxy",
        %request_id,
        protocol = adapter.name(),
        backend = tracing::field::Empty,
    );
    async move {
        match proxy(&state, &adapter, &headers, body).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        }
    }
    .instrument(span)
    .await
}

async fn proxy<A: ProtocolAdapter>(
    state: &AppState,
    adapter: &A,
    headers: &HeaderMap,
    body: Body,
) -> Result<Response> {
    let config = &state.config;
    let raw = read_body(body, config.max_body_bytes).await?;
    let mut payload = parse_object(&raw)?;
    let stream = adapter.wants_stream(&payload);

    let kind = config.backend_for_route(adapter.route(), adapter.default_backend());
    tracing::Span::current().record("backend", kind.as_str());
    let backend = config.resolve_backend(kind)?;

    // One table per request, shared by every content field.
    let mut table = MappingTable::new();
    let mut changed_strings = 0;
    if let Some(fields) = payload.as_object_mut() {
        for field in adapter.content_fields() {
            if let Some(value) = fields.get(*field) {
                reserve_placeholders(value, &mut table);
            }
        }
        for field in adapter.content_fields() {
            if let Some(value) = fields.get_mut(*field) {
                changed_strings += state.sanitizer.sanitize_in_place(value, &mut table);
            }
        }
    }
    tracing::info!(
        entities = table.len(),
        changed_strings,
        categories = ?table.category_counts(),
        stream,
        "sanitized request"
    );

    let url = format!("{}{}", backend.base_url, adapter.upstream_path());
    let mut request = state
        .client
        .post(&url)
        .header(CONTENT_TYPE, "application/json")
        .body(serde_json::to_vec(&payload)?);
    request = authorize(request, &backend);
    for (name, value) in adapter.passthrough_headers(headers) {
        request = request.header(name, value);
    }

    let timeout = config.upstream_timeout();
    let deadline = Instant::now() + timeout;
    let upstream = tokio::time::timeout_at(deadline, request.send())
        .await
        .map_err(|_| timed_out(timeout.as_secs()))?
        .map_err(|e| transport_error(e, timeout.as_secs()))?;

    let status = upstream.status();
    let content_type = upstream.headers().get(CONTENT_TYPE).cloned();
    tracing::debug!(%status, "upstream responded");

    if !status.is_success() {
        let bytes = read_upstream(upstream, deadline, timeout.as_secs()).await?;
        tracing::warn!(%status, "forwarding upstream error");
        return build_response(status, content_type, Body::from(bytes));
    }

    if stream {
        let restored = restore_stream(Box::pin(upstream.bytes_stream()), table);
        let content_type =
            content_type.unwrap_or_else(|| HeaderValue::from_static("text/event-stream"));
        let mut response = build_response(status, Some(content_type), Body::from_stream(restored))?;
        response
            .headers_mut()
            .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        return Ok(response);
    }

    let bytes = read_upstream(upstream, deadline, timeout.as_secs()).await?;
    let restored = restore_body(&bytes, &table);
    build_response(status, content_type, Body::from(restored))
}

/// Read the inbound body, refusing anything over `limit` bytes. A body that
/// fails mid-upload is a bad request, not an oversized one.
async fn read_body(body: Body, limit: usize) -> Result<Bytes> {
    let mut data = body.into_data_stream();
    let mut buf = Vec::new();
    while let Some(chunk) = data.next().await {
        let chunk = chunk.map_err(|e| GatewayError::BadRequest {
            reason: format!("failed to read request body: {e}"),
        })?;
        if buf.len() + chunk.len() > limit {
            return Err(GatewayError::BodyTooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}

fn parse_object(raw: &[u8]) -> Result<Value> {
    let value: Value = serde_json::from_slice(raw).map_err(|e| GatewayError::BadRequest {
        reason: format!("malformed JSON: {e}"),
    })?;
    if !value.is_object() {
        return Err(GatewayError::BadRequest {
            reason: "expected a JSON object".into(),
        });
    }
    Ok(value)
}

/// Attach the configured credential in the backend's own scheme. Whatever the
/// caller presented is never forwarded.
fn authorize(request: reqwest::RequestBuilder, backend: &ResolvedBackend) -> reqwest::RequestBuilder {
    match backend.kind {
        BackendKind::Anthropic => request.header("x-api-key", &backend.api_key),
        BackendKind::OpenAi | BackendKind::OpenRouter => request.bearer_auth(&backend.api_key),
        BackendKind::Gemini => request.header("x-goog-api-key", &backend.api_key),
    }
}

async fn read_upstream(upstream: reqwest::Response, deadline: Instant, timeout_secs: u64) -> Result<Bytes> {
    tokio::time::timeout_at(deadline, upstream.bytes())
        .await
        .map_err(|_| timed_out(timeout_secs))?
        .map_err(|e| transport_error(e, timeout_secs))
}

fn timed_out(timeout_secs: u64) -> GatewayError {
    GatewayError::UpstreamTimeout { timeout_secs }
}

fn transport_error(e: reqwest::Error, timeout_secs: u64) -> GatewayError {
    if e.is_timeout() {
        timed_out(timeout_secs)
    } else {
        GatewayError::Upstream {
            reason: e.to_string(),
        }
    }
}

fn build_response(status: StatusCode, content_type: Option<HeaderValue>, body: Body) -> Result<Response> {
    let mut builder = Response::builder().status(status);
    if let Some(content_type) = content_type {
        builder = builder.header(CONTENT_TYPE, content_type);
    }
    builder.body(body).map_err(|e| GatewayError::Internal {
        reason: format!("failed to build response: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object_rejects_garbage() {
        assert!(matches!(
            parse_object(b"{not json"),
            Err(GatewayError::BadRequest { .. })
        ));
        assert!(matches!(
            parse_object(b"[1, 2]"),
            Err(GatewayError::BadRequest { .. })
        ));
        assert!(parse_object(br#"{"messages": []}"#).is_ok());
    }

    #[tokio::test]
    async fn test_read_body_limit() {
        let body = Body::from(vec![b'x'; 64]);
        assert!(matches!(
            read_body(body, 16).await,
            Err(GatewayError::BodyTooLarge { limit: 16 })
        ));
        let body = Body::from("small");
        assert_eq!(read_body(body, 16).await.unwrap(), "small");
    }

    #[tokio::test]
    async fn test_read_body_failure_is_bad_request() {
        let chunks: Vec<std::result::Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"{\"messages\":")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let body = Body::from_stream(futures::stream::iter(chunks));
        assert!(matches!(
            read_body(body, 1024).await,
            Err(GatewayError::BadRequest { .. })
        ));
    }

    #[test]
    fn test_authorize_schemes() {
        let client = reqwest::Client::new();
        let backend = |kind| ResolvedBackend {
            kind,
            base_url: "http://127.0.0.1:1".into(),
            api_key: "secret-key".into(),
        };

        let req = authorize(client.post("http://127.0.0.1:1/x"), &backend(BackendKind::Anthropic))
            .build()
            .unwrap();
        assert_eq!(req.headers()["x-api-key"], "secret-key");

        let req = authorize(client.post("http://127.0.0.1:1/x"), &backend(BackendKind::OpenRouter))
            .build()
            .unwrap();
        assert_eq!(req.headers()["authorization"], "Bearer secret-key");

        let req = authorize(client.post("http://127.0.0.1:1/x"), &backend(BackendKind::Gemini))
            .build()
            .unwrap();
        assert_eq!(req.headers()["x-goog-api-key"], "secret-key");
    }
}
