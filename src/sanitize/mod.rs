pub mod aho;
pub mod entropy;
pub mod patterns;
pub mod table;
pub mod tree;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::DetectionConfig;
use crate::error::Result;

pub use table::MappingTable;
pub use tree::{reserve_placeholders, SanitizeResult, Sanitizer};

/// Kind of sensitive value. The lowercase name is the placeholder category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Url,
    Email,
    CreditCard,
    BankCard,
    Ssn,
    Iban,
    Ip,
    Phone,
    Secret,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Url,
        Category::Email,
        Category::CreditCard,
        Category::BankCard,
        Category::Ssn,
        Category::Iban,
        Category::Ip,
        Category::Phone,
        Category::Secret,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Url => "url",
            Category::Email => "email",
            Category::CreditCard => "credit_card",
            Category::BankCard => "bank_card",
            Category::Ssn => "ssn",
            Category::Iban => "iban",
            Category::Ip => "ip",
            Category::Phone => "phone",
            Category::Secret => "secret",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate sensitive value found in a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMatch {
    pub original: String,
    pub category: Category,
    /// Byte span of this occurrence inside the scanned text.
    pub start: usize,
    pub end: usize,
}

impl EntityMatch {
    pub fn new(input: &str, start: usize, end: usize, category: Category) -> Self {
        Self {
            original: input[start..end].to_string(),
            category,
            start,
            end,
        }
    }

    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start < end && start < self.end
    }
}

/// A single detection layer.
pub trait Detector: Send + Sync {
    /// Return every candidate match in `input`, in position order.
    fn detect(&self, input: &str) -> Vec<EntityMatch>;

    /// Name of this layer (for logging/debugging).
    fn name(&self) -> &str;

    /// Catch-all layers only report spans no earlier layer already covers.
    fn is_catch_all(&self) -> bool {
        false
    }
}

/// The complete detection pipeline. Runs all layers in sequence.
pub struct DetectionPipeline {
    layers: Vec<Box<dyn Detector>>,
}

impl DetectionPipeline {
    /// Create the default pipeline with built-in patterns and thresholds.
    /// Order: PII patterns -> secret prefixes -> bearer tokens -> entropy.
    pub fn default_pipeline() -> Result<Self> {
        Self::from_config(&DetectionConfig::default())
    }

    pub fn from_config(config: &DetectionConfig) -> Result<Self> {
        let mut prefixes = aho::AhoCorasickDetector::default_prefixes();
        prefixes.extend(config.extra_secret_prefixes.iter().cloned());

        Ok(Self {
            layers: vec![
                Box::new(patterns::RegexDetector::new(
                    "patterns",
                    patterns::RegexDetector::default_patterns(),
                )?),
                Box::new(aho::AhoCorasickDetector::new(prefixes)?),
                Box::new(patterns::RegexDetector::new(
                    "bearer",
                    patterns::RegexDetector::bearer_patterns(),
                )?),
                Box::new(entropy::EntropyDetector::new(
                    config.entropy_min_length,
                    config.entropy_min_bits,
                )),
            ],
        })
    }

    /// Create a pipeline from custom layers.
    pub fn new(layers: Vec<Box<dyn Detector>>) -> Self {
        Self { layers }
    }

    /// Run all layers and collect their matches.
    ///
    /// Matches touching an existing placeholder token are discarded, which keeps
    /// sanitizing already-sanitized text a no-op.
    pub fn detect(&self, input: &str) -> Vec<EntityMatch> {
        let protected = table::placeholder_spans(input);
        let mut found: Vec<EntityMatch> = Vec::new();

        for layer in &self.layers {
            let catch_all = layer.is_catch_all();
            for m in layer.detect(input) {
                if protected.iter().any(|&(s, e)| m.overlaps(s, e)) {
                    continue;
                }
                if catch_all && found.iter().any(|f| f.overlaps(m.start, m.end)) {
                    continue;
                }
                found.push(m);
            }
        }

        found
    }

    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.name()).collect()
    }
}
