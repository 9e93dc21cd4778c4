use std::path::Path;

use crate::config::{BackendKind, GatewayConfig};
use crate::error::Result;
use crate::server;

/// Load the config and run the gateway until Ctrl-C.
pub async fn run(config_path: Option<&Path>, port: Option<u16>) -> Result<()> {
    let mut config = GatewayConfig::load(config_path)?;
    if let Some(port) = port {
        config.port = port;
    }

    let configured: Vec<&str> = BackendKind::ALL
        .iter()
        .filter(|kind| config.resolve_backend(**kind).is_ok())
        .map(BackendKind::as_str)
        .collect();
    if configured.is_empty() {
        tracing::warn!("no backend has a credential; every API request will fail");
    } else {
        tracing::info!(backends = ?configured, "configured backends");
    }

    server::start(config).await
}
