use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// Detector tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Minimum token length for the entropy catch-all. Default: 20.
    #[serde(default = "default_entropy_min_length")]
    pub entropy_min_length: usize,

    /// Minimum Shannon entropy in bits per char. Default: 4.0.
    #[serde(default = "default_entropy_min_bits")]
    pub entropy_min_bits: f64,

    /// Secret prefixes recognised in addition to the built-in list.
    #[serde(default)]
    pub extra_secret_prefixes: Vec<String>,
}

fn default_entropy_min_length() -> usize {
    20
}
fn default_entropy_min_bits() -> f64 {
    4.0
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            entropy_min_length: default_entropy_min_length(),
            entropy_min_bits: default_entropy_min_bits(),
            extra_secret_prefixes: Vec::new(),
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.entropy_min_length == 0 {
            return Err(GatewayError::InvalidConfig {
                reason: "detection.entropy_min_length must be positive".into(),
            });
        }
        if self.entropy_min_bits.is_nan() || self.entropy_min_bits <= 0.0 {
            return Err(GatewayError::InvalidConfig {
                reason: "detection.entropy_min_bits must be positive".into(),
            });
        }
        if self.extra_secret_prefixes.iter().any(|p| p.trim().is_empty()) {
            return Err(GatewayError::InvalidConfig {
                reason: "detection.extra_secret_prefixes must not contain empty entries".into(),
            });
        }
        Ok(())
    }
}
