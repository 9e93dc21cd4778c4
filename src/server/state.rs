use std::sync::Arc;
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::sanitize::{DetectionPipeline, Sanitizer};

/// Shared application state accessible to all HTTP handlers.
///
/// Everything here is immutable after startup; request-scoped state (the
/// mapping table, stream buffers) lives in the handling task.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub sanitizer: Sanitizer,
    pub client: reqwest::Client,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let pipeline = DetectionPipeline::from_config(&config.detection)?;
        tracing::debug!(layers = ?pipeline.layer_names(), "detection pipeline ready");
        let mut builder = reqwest::Client::builder()
            .no_proxy()
            .connect_timeout(Duration::from_secs(10).min(config.upstream_timeout()))
            .read_timeout(config.upstream_timeout());
        if let Some(proxy) = &config.upstream_proxy {
            let proxy = reqwest::Proxy::all(proxy).map_err(|e| GatewayError::InvalidConfig {
                reason: format!("invalid upstream_proxy: {e}"),
            })?;
            builder = builder.proxy(proxy);
        }
        let client = builder.build().map_err(|e| GatewayError::Server {
            reason: format!("failed to build HTTP client: {e}"),
        })?;
        Ok(Self {
            config: Arc::new(config),
            sanitizer: Sanitizer::new(Arc::new(pipeline)),
            client,
        })
    }
}
