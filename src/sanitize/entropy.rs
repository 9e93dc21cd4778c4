use super::{Category, Detector, EntityMatch};

/// Shannon entropy catch-all for opaque credentials of unknown format.
pub struct EntropyDetector {
    /// Minimum token length to consider. Default: 20.
    pub min_length: usize,
    /// Minimum Shannon entropy in bits per char. Default: 4.0.
    pub min_entropy: f64,
}

impl EntropyDetector {
    pub fn new(min_length: usize, min_entropy: f64) -> Self {
        Self {
            min_length,
            min_entropy,
        }
    }

    /// Calculate Shannon entropy of a string.
    pub fn shannon_entropy(s: &str) -> f64 {
        if s.is_empty() {
            return 0.0;
        }
        let mut freq = [0u32; 256];
        for &b in s.as_bytes() {
            freq[b as usize] += 1;
        }
        let len = s.len() as f64;
        freq.iter()
            .filter(|&&c| c > 0)
            .map(|&c| {
                let p = c as f64 / len;
                -p * p.log2()
            })
            .sum()
    }

    fn qualifies(&self, token: &str) -> bool {
        if token.len() < self.min_length {
            return false;
        }
        // Ordinary words never count, however long.
        if token.bytes().all(|b| b.is_ascii_lowercase()) {
            return false;
        }
        Self::shannon_entropy(token) >= self.min_entropy
    }
}

/// Base64 and URL-safe base64 alphabet, padding excluded.
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'_' | b'-')
}

impl Detector for EntropyDetector {
    fn detect(&self, input: &str) -> Vec<EntityMatch> {
        let bytes = input.as_bytes();
        let len = bytes.len();
        let mut found = Vec::new();
        let mut pos = 0;

        while pos < len {
            if !is_token_byte(bytes[pos]) {
                pos += 1;
                continue;
            }
            let start = pos;
            while pos < len && is_token_byte(bytes[pos]) {
                pos += 1;
            }
            let mut padding = 0;
            while pos < len && bytes[pos] == b'=' && padding < 2 {
                pos += 1;
                padding += 1;
            }
            // Token bytes are ASCII, so both ends sit on char boundaries.
            if self.qualifies(&input[start..pos]) {
                found.push(EntityMatch::new(input, start, pos, Category::Secret));
            }
        }

        found
    }

    fn name(&self) -> &str {
        "entropy"
    }

    fn is_catch_all(&self) -> bool {
        true
    }
}
