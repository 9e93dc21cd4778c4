use regex::{Regex, RegexSet};

use crate::error::{GatewayError, Result};

use super::{Category, Detector, EntityMatch};

/// One regex rule. `group` selects the capture that holds the sensitive part;
/// 0 means the whole match.
#[derive(Debug, Clone)]
pub struct PatternSpec {
    pub category: Category,
    pub pattern: String,
    pub group: usize,
}

impl PatternSpec {
    pub fn new(category: Category, pattern: &str) -> Self {
        Self {
            category,
            pattern: pattern.to_string(),
            group: 0,
        }
    }

    pub fn with_group(mut self, group: usize) -> Self {
        self.group = group;
        self
    }
}

/// Category-tagged pattern matching via RegexSet.
pub struct RegexDetector {
    name: String,
    regex_set: RegexSet,
    specs: Vec<(PatternSpec, Regex)>,
}

impl RegexDetector {
    /// Build from a named list of pattern specs.
    pub fn new(name: &str, specs: Vec<PatternSpec>) -> Result<Self> {
        let regex_set = RegexSet::new(specs.iter().map(|s| s.pattern.as_str())).map_err(|e| {
            GatewayError::InvalidPattern {
                reason: e.to_string(),
            }
        })?;
        let specs = specs
            .into_iter()
            .map(|spec| {
                let re = Regex::new(&spec.pattern).map_err(|e| GatewayError::InvalidPattern {
                    reason: format!("{}: {e}", spec.pattern),
                })?;
                Ok((spec, re))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            name: name.to_string(),
            regex_set,
            specs,
        })
    }

    /// Built-in PII and financial identifier patterns, in detection order.
    pub fn default_patterns() -> Vec<PatternSpec> {
        vec![
            PatternSpec::new(
                Category::Url,
                r#"(?i)\b(?:https?|ftp)://[^\s"'<>\\^`{|}]+"#,
            ),
            PatternSpec::new(
                Category::Email,
                r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}\b",
            ),
            // Four groups of four digits with separators
            PatternSpec::new(
                Category::CreditCard,
                r"\b\d{4}[ -]\d{4}[ -]\d{4}[ -]\d{4}\b",
            ),
            PatternSpec::new(Category::BankCard, r"\b\d{16,19}\b"),
            PatternSpec::new(Category::Ssn, r"\b\d{3}-\d{2}-\d{4}\b"),
            PatternSpec::new(Category::Iban, r"\b[A-Z]{2}\d{2}[A-Z0-9]{11,30}\b"),
            PatternSpec::new(
                Category::Ip,
                r"\b(?:(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\b",
            ),
            // North American style, optional country code
            PatternSpec::new(
                Category::Phone,
                r"(?:\+\d{1,3}[ .-]?)?(?:\(\d{3}\)|\b\d{3})[ .-]?\d{3}[ .-]?\d{4}\b",
            ),
            // Mainland China mobile
            PatternSpec::new(Category::Phone, r"\b1[3-9]\d{9}\b"),
        ]
    }

    /// `Bearer <token>` credentials. Only the token is captured.
    pub fn bearer_patterns() -> Vec<PatternSpec> {
        vec![
            PatternSpec::new(Category::Secret, r"(?i)\bbearer\s+([A-Za-z0-9\-._~+/]{8,}=*)")
                .with_group(1),
        ]
    }
}

impl Detector for RegexDetector {
    fn detect(&self, input: &str) -> Vec<EntityMatch> {
        let matching: Vec<usize> = self.regex_set.matches(input).into_iter().collect();
        let mut found = Vec::new();

        for idx in matching {
            let (spec, re) = &self.specs[idx];
            for caps in re.captures_iter(input) {
                let Some(m) = caps.get(spec.group) else {
                    continue;
                };
                let mut end = m.end();
                if spec.category == Category::Url {
                    // Sentence punctuation directly after a link is not part of it.
                    end = m.start() + m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']).len();
                }
                if end > m.start() {
                    found.push(EntityMatch::new(input, m.start(), end, spec.category));
                }
            }
        }

        found
    }

    fn name(&self) -> &str {
        &self.name
    }
}
