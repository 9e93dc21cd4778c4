use std::path::Path;

use crate::config::{default_config_path, BackendKind, GatewayConfig};
use crate::error::Result;

/// Validate the config and print a summary. Credentials are never printed.
pub fn run(config_path: Option<&Path>) -> Result<()> {
    let config = GatewayConfig::load(config_path)?;
    let shown_path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_config_path);

    println!("config: {}", shown_path.display());
    println!("listen: {}", config.bind_address());
    println!("max body: {} bytes", config.max_body_bytes);
    println!("upstream timeout: {}s", config.upstream_timeout_secs);
    if let Some(proxy) = &config.upstream_proxy {
        println!("upstream proxy: {proxy}");
    }
    println!("backends:");
    for kind in BackendKind::ALL {
        match config.resolve_backend(kind) {
            Ok(backend) => println!(
                "  {:<11} {}  (credential set, {} chars)",
                kind.as_str(),
                backend.base_url,
                backend.api_key.chars().count()
            ),
            Err(_) => println!("  {:<11} not configured", kind.as_str()),
        }
    }
    if !config.routes.is_empty() {
        println!("routes:");
        for (path, kind) in &config.routes {
            println!("  {path} -> {kind}");
        }
    }
    println!(
        "detection: entropy >= {} bits over {}+ chars, {} extra prefix(es)",
        config.detection.entropy_min_bits,
        config.detection.entropy_min_length,
        config.detection.extra_secret_prefixes.len()
    );
    Ok(())
}
