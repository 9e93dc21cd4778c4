use std::collections::BTreeMap;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::DetectionConfig;
use crate::error::{GatewayError, Result};

/// An upstream provider the gateway can forward to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Anthropic,
    OpenAi,
    Gemini,
    OpenRouter,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Anthropic,
        BackendKind::OpenAi,
        BackendKind::Gemini,
        BackendKind::OpenRouter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Anthropic => "anthropic",
            BackendKind::OpenAi => "openai",
            BackendKind::Gemini => "gemini",
            BackendKind::OpenRouter => "openrouter",
        }
    }

    /// Prefix of the environment overrides, e.g. `OPENAI_API_KEY`.
    fn env_prefix(&self) -> &'static str {
        match self {
            BackendKind::Anthropic => "ANTHROPIC",
            BackendKind::OpenAi => "OPENAI",
            BackendKind::Gemini => "GEMINI",
            BackendKind::OpenRouter => "OPENROUTER",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            BackendKind::Anthropic => "https://api.anthropic.com/v1",
            BackendKind::OpenAi => "https://api.openai.com/v1",
            BackendKind::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            BackendKind::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base URL and credential for one backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Version root the adapter path is appended to. Falls back to the
    /// provider's public endpoint.
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,
}

/// Per-backend settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendsConfig {
    #[serde(default)]
    pub anthropic: BackendConfig,
    #[serde(default)]
    pub openai: BackendConfig,
    #[serde(default)]
    pub gemini: BackendConfig,
    #[serde(default)]
    pub openrouter: BackendConfig,
}

impl BackendsConfig {
    pub fn get(&self, kind: BackendKind) -> &BackendConfig {
        match kind {
            BackendKind::Anthropic => &self.anthropic,
            BackendKind::OpenAi => &self.openai,
            BackendKind::Gemini => &self.gemini,
            BackendKind::OpenRouter => &self.openrouter,
        }
    }

    fn get_mut(&mut self, kind: BackendKind) -> &mut BackendConfig {
        match kind {
            BackendKind::Anthropic => &mut self.anthropic,
            BackendKind::OpenAi => &mut self.openai,
            BackendKind::Gemini => &mut self.gemini,
            BackendKind::OpenRouter => &mut self.openrouter,
        }
    }
}

/// A backend ready to be called.
#[derive(Clone)]
pub struct ResolvedBackend {
    pub kind: BackendKind,
    pub base_url: String,
    pub api_key: String,
}

impl fmt::Debug for ResolvedBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedBackend")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("api_key", &"<hidden>")
            .finish()
    }
}

/// Process-wide gateway settings. Loaded once at startup, immutable after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Loopback port to listen on. Default: 8900.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum inbound request body. Default: 10 MiB.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Deadline for upstream calls in seconds. Default: 120.
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_secs: u64,

    /// Proxy for upstream calls. Proxy environment variables are ignored.
    #[serde(default)]
    pub upstream_proxy: Option<String>,

    #[serde(default)]
    pub backends: BackendsConfig,

    /// API path -> backend overrides, e.g. `/v1/chat/completions: openrouter`.
    #[serde(default)]
    pub routes: BTreeMap<String, BackendKind>,

    #[serde(default)]
    pub detection: DetectionConfig,
}

fn default_port() -> u16 {
    8900
}
fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}
fn default_upstream_timeout() -> u64 {
    120
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
            upstream_timeout_secs: default_upstream_timeout(),
            upstream_proxy: None,
            backends: BackendsConfig::default(),
            routes: BTreeMap::new(),
            detection: DetectionConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load config from a YAML file. Returns default if the file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents).map_err(|e| match e {
            GatewayError::ConfigParse { reason, .. } => GatewayError::ConfigParse {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).map_err(|e| GatewayError::ConfigParse {
            path: "<inline>".into(),
            reason: e.to_string(),
        })
    }

    /// Startup load: file (or the default path), then environment overrides,
    /// then validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load_from(&super::default_config_path())?,
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `MASKGATE_PORT` and `<BACKEND>_API_KEY` / `<BACKEND>_BASE_URL`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("MASKGATE_PORT") {
            self.port = port.trim().parse().map_err(|_| GatewayError::InvalidConfig {
                reason: format!("MASKGATE_PORT is not a port number: {port}"),
            })?;
        }
        for kind in BackendKind::ALL {
            let prefix = kind.env_prefix();
            let backend = self.backends.get_mut(kind);
            if let Some(key) = lookup(&format!("{prefix}_API_KEY")).filter(|v| !v.is_empty()) {
                backend.api_key = Some(key);
            }
            if let Some(url) = lookup(&format!("{prefix}_BASE_URL")).filter(|v| !v.is_empty()) {
                backend.base_url = Some(url);
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_body_bytes == 0 {
            return Err(GatewayError::InvalidConfig {
                reason: "max_body_bytes must be positive".into(),
            });
        }
        if self.upstream_timeout_secs == 0 {
            return Err(GatewayError::InvalidConfig {
                reason: "upstream_timeout_secs must be positive".into(),
            });
        }
        for (path, kind) in &self.routes {
            let compatible: &[BackendKind] = match path.as_str() {
                "/v1/messages" => &[BackendKind::Anthropic],
                "/v1/chat/completions" => &[BackendKind::OpenAi, BackendKind::OpenRouter],
                "/v1/models" => &[BackendKind::Gemini],
                _ => {
                    return Err(GatewayError::InvalidConfig {
                        reason: format!("unknown route in routes: {path}"),
                    })
                }
            };
            if !compatible.contains(kind) {
                return Err(GatewayError::InvalidConfig {
                    reason: format!("backend {kind} does not speak the wire format of {path}"),
                });
            }
        }
        self.detection.validate()
    }

    /// Loopback socket address the gateway binds to.
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.port))
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    /// Backend serving `route`, honouring overrides.
    pub fn backend_for_route(&self, route: &str, default: BackendKind) -> BackendKind {
        self.routes.get(route).copied().unwrap_or(default)
    }

    /// Base URL and credential for `kind`, or a configuration error when the
    /// credential is missing.
    pub fn resolve_backend(&self, kind: BackendKind) -> Result<ResolvedBackend> {
        let backend = self.backends.get(kind);
        let api_key = backend
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GatewayError::BackendNotConfigured {
                backend: kind.to_string(),
            })?;
        let base_url = backend
            .base_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| kind.default_base_url().to_string());
        Ok(ResolvedBackend {
            kind,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.port, 8900);
        assert_eq!(config.max_body_bytes, 10 * 1024 * 1024);
        assert_eq!(config.bind_address().to_string(), "127.0.0.1:8900");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialize() {
        let yaml = r#"
port: 9100
upstream_timeout_secs: 30
backends:
  openai:
    api_key: sk-test-123
  openrouter:
    base_url: https://router.example/api/v1/
    api_key: or-key
routes:
  /v1/chat/completions: openrouter
detection:
  entropy_min_bits: 4.5
"#;
        let config = GatewayConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.upstream_timeout(), Duration::from_secs(30));
        assert_eq!(
            config.backend_for_route("/v1/chat/completions", BackendKind::OpenAi),
            BackendKind::OpenRouter
        );
        assert_eq!(
            config.backend_for_route("/v1/messages", BackendKind::Anthropic),
            BackendKind::Anthropic
        );
        let resolved = config.resolve_backend(BackendKind::OpenRouter).unwrap();
        assert_eq!(resolved.base_url, "https://router.example/api/v1");
        assert_eq!(config.detection.entropy_min_length, 20);
        assert!((config.detection.entropy_min_bits - 4.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_credential_is_config_error() {
        let config = GatewayConfig::default();
        let err = config.resolve_backend(BackendKind::Gemini).unwrap_err();
        assert!(matches!(err, GatewayError::BackendNotConfigured { .. }));
    }

    #[test]
    fn test_default_base_url_used() {
        let mut config = GatewayConfig::default();
        config.backends.anthropic.api_key = Some("k".into());
        let resolved = config.resolve_backend(BackendKind::Anthropic).unwrap();
        assert_eq!(resolved.base_url, "https://api.anthropic.com/v1");
        assert!(!format!("{resolved:?}").contains("\"k\""));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("MASKGATE_PORT", "9200"),
            ("GEMINI_API_KEY", "g-key"),
            ("OPENAI_BASE_URL", "http://127.0.0.1:1234/v1"),
            ("ANTHROPIC_API_KEY", ""),
        ]
        .into_iter()
        .collect();
        let mut config = GatewayConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.port, 9200);
        assert_eq!(config.backends.gemini.api_key.as_deref(), Some("g-key"));
        assert_eq!(
            config.backends.openai.base_url.as_deref(),
            Some("http://127.0.0.1:1234/v1")
        );
        assert!(config.backends.anthropic.api_key.is_none());
    }

    #[test]
    fn test_bad_port_env() {
        let mut config = GatewayConfig::default();
        let err = config
            .apply_env(|k| (k == "MASKGATE_PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidConfig { .. }));
    }

    #[test]
    fn test_unknown_route_rejected() {
        let yaml = "routes:\n  /v1/embeddings: openai\n";
        let config = GatewayConfig::from_yaml(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_incompatible_route_rejected() {
        let yaml = "routes:\n  /v1/messages: openai\n";
        let config = GatewayConfig::from_yaml(yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(GatewayError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let yaml = "routes:\n  /v1/messages: mistral\n";
        assert!(matches!(
            GatewayConfig::from_yaml(yaml),
            Err(GatewayError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_load_missing_file_gives_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = GatewayConfig::load_from(&dir.path().join("absent.yml")).unwrap();
        assert_eq!(config.port, 8900);
    }

    #[test]
    fn test_load_bad_yaml_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "port: [not a number").unwrap();
        match GatewayConfig::load_from(&path) {
            Err(GatewayError::ConfigParse { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
