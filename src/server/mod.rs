pub mod cors;
pub mod router;
pub mod state;

use std::future::Future;

use axum::Router;
use tokio::net::TcpListener;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};

/// Build the application for `config`.
pub fn app(config: GatewayConfig) -> Result<Router> {
    let state = state::AppState::new(config)?;
    Ok(router::build(state))
}

/// Bind to loopback and serve until Ctrl-C.
pub async fn start(config: GatewayConfig) -> Result<()> {
    let bind_addr = config.bind_address();
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| GatewayError::Server {
            reason: format!("failed to bind to {bind_addr}: {e}"),
        })?;
    tracing::info!("maskgate listening on {bind_addr}");
    serve(listener, config, shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` resolves. In-flight
/// requests are allowed to finish.
pub async fn serve<F>(listener: TcpListener, config: GatewayConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = app(config)?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| GatewayError::Server {
            reason: format!("server error: {e}"),
        })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
