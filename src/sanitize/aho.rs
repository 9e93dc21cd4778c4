use aho_corasick::{AhoCorasick, MatchKind};

use crate::error::{GatewayError, Result};

use super::{Category, Detector, EntityMatch};

/// Characters a secret body must have after its prefix to count.
const MIN_BODY_LEN: usize = 6;

/// Literal secret-prefix matching via aho-corasick.
pub struct AhoCorasickDetector {
    automaton: AhoCorasick,
    prefixes: Vec<String>,
}

impl AhoCorasickDetector {
    /// Build from a list of known secret prefixes.
    pub fn new(prefixes: Vec<String>) -> Result<Self> {
        let automaton = AhoCorasick::builder()
            .match_kind(MatchKind::LeftmostLongest)
            .build(&prefixes)
            .map_err(|e| GatewayError::InvalidPattern {
                reason: format!("invalid secret prefix set: {e}"),
            })?;
        Ok(Self {
            automaton,
            prefixes,
        })
    }

    /// Default known secret prefixes.
    pub fn default_prefixes() -> Vec<String> {
        vec![
            // Anthropic / OpenAI and compatible
            "sk-".into(),
            "sk-ant-".into(),
            "sk-proj-".into(),
            // GitHub
            "ghp_".into(),
            "gho_".into(),
            "ghs_".into(),
            "ghu_".into(),
            "github_pat_".into(),
            // AWS
            "AKIA".into(),
            "ASIA".into(),
            // Slack
            "xoxb-".into(),
            "xoxp-".into(),
            "xoxs-".into(),
            "xoxa-".into(),
            // GitLab
            "glpat-".into(),
            "glsa-".into(),
            // Package registries
            "npm_".into(),
            "pypi-".into(),
            "AGE-SECRET-KEY-".into(),
            // Stripe
            "whsec_".into(),
            "sk_live_".into(),
            "sk_test_".into(),
            "rk_live_".into(),
            "rk_test_".into(),
            "SG.".into(),
            "dop_v1_".into(),
            "nrk-".into(),
            "NRAK-".into(),
            "hf_".into(),
            // HashiCorp Vault
            "hvs.".into(),
            // Google
            "AIzaSy".into(),
            "ya29.".into(),
        ]
    }
}

fn is_token_end(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            '"' | '\'' | ',' | ';' | '}' | ']' | ')' | '`' | '<' | '>' | '\\'
        )
}

impl Detector for AhoCorasickDetector {
    fn detect(&self, input: &str) -> Vec<EntityMatch> {
        if self.prefixes.is_empty() {
            return Vec::new();
        }

        let mut found = Vec::new();
        let mut last_end = 0;

        for mat in self.automaton.find_iter(input) {
            let start = mat.start();
            if start < last_end {
                continue;
            }
            // A prefix only counts at the start of a token ("ask-" is not "sk-").
            let at_boundary = input[..start]
                .chars()
                .next_back()
                .map_or(true, |c| !c.is_alphanumeric() && c != '_');
            if !at_boundary {
                continue;
            }

            let rest = &input[start..];
            let token_len = rest.find(is_token_end).unwrap_or(rest.len());
            let prefix_len = mat.end() - mat.start();
            if token_len >= prefix_len + MIN_BODY_LEN {
                let end = start + token_len;
                found.push(EntityMatch::new(input, start, end, Category::Secret));
                last_end = end;
            }
        }

        found
    }

    fn name(&self) -> &str {
        "aho-corasick"
    }
}
