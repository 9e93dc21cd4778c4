use std::sync::Arc;

use serde_json::Value;

use super::table::placeholder_spans;
use super::{DetectionPipeline, EntityMatch, MappingTable};

/// Outcome of sanitizing one value tree with a fresh table.
#[derive(Debug, Clone)]
pub struct SanitizeResult {
    pub sanitized_value: Value,
    pub table: MappingTable,
    pub redaction_count: usize,
}

/// Visit every string leaf of a JSON tree in document order.
pub fn visit_strings_mut<F>(value: &mut Value, f: &mut F)
where
    F: FnMut(&mut String),
{
    match value {
        Value::String(s) => f(s),
        Value::Array(items) => {
            for item in items {
                visit_strings_mut(item, f);
            }
        }
        Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                visit_strings_mut(v, f);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

/// Reserve every placeholder-shaped token already written anywhere in `value`,
/// so values sanitized later never reuse one.
pub fn reserve_placeholders(value: &Value, table: &mut MappingTable) {
    match value {
        Value::String(s) => table.reserve_existing(s),
        Value::Array(items) => {
            for item in items {
                reserve_placeholders(item, table);
            }
        }
        Value::Object(map) => {
            for v in map.values() {
                reserve_placeholders(v, table);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

/// Replaces detected entities with placeholders, recording them in a table.
#[derive(Clone)]
pub struct Sanitizer {
    pipeline: Arc<DetectionPipeline>,
}

impl Sanitizer {
    pub fn new(pipeline: Arc<DetectionPipeline>) -> Self {
        Self { pipeline }
    }

    /// Sanitize a whole tree with a fresh table.
    pub fn sanitize(&self, value: &Value) -> SanitizeResult {
        let mut table = MappingTable::new();
        let mut sanitized_value = value.clone();
        reserve_placeholders(value, &mut table);
        self.sanitize_in_place(&mut sanitized_value, &mut table);
        let redaction_count = table.len();
        SanitizeResult {
            sanitized_value,
            table,
            redaction_count,
        }
    }

    /// Sanitize `value` in place, sharing `table` with other fields of the same
    /// request. Returns the number of string leaves that changed.
    ///
    /// Callers sanitizing several fields should run [`reserve_placeholders`]
    /// over all of them first.
    pub fn sanitize_in_place(&self, value: &mut Value, table: &mut MappingTable) -> usize {
        let mut changed = 0;
        visit_strings_mut(value, &mut |s: &mut String| {
            let sanitized = self.sanitize_text(s, table);
            if sanitized != *s {
                *s = sanitized;
                changed += 1;
            }
        });
        changed
    }

    /// Sanitize a single string.
    ///
    /// Unique matches are ordered longest first (stable, so ties keep detection
    /// order). Each then claims its literal occurrences that do not intersect an
    /// already claimed span or an existing placeholder. A placeholder is only
    /// allocated once a match has claimed at least one occurrence.
    pub fn sanitize_text(&self, text: &str, table: &mut MappingTable) -> String {
        table.reserve_existing(text);
        let matches = self.pipeline.detect(text);
        if matches.is_empty() {
            return text.to_string();
        }

        let mut unique: Vec<EntityMatch> = Vec::new();
        for m in matches {
            if !unique.iter().any(|u| u.original == m.original) {
                unique.push(m);
            }
        }
        unique.sort_by(|a, b| b.original.len().cmp(&a.original.len()));

        let protected = placeholder_spans(text);
        let mut claimed: Vec<(usize, usize, String)> = Vec::new();

        for m in &unique {
            let spans: Vec<(usize, usize)> = text
                .match_indices(m.original.as_str())
                .map(|(start, s)| (start, start + s.len()))
                .filter(|&(s, e)| {
                    !claimed.iter().any(|(cs, ce, _)| s < *ce && *cs < e)
                        && !protected.iter().any(|&(ps, pe)| s < pe && ps < e)
                })
                .collect();
            if spans.is_empty() {
                continue;
            }
            let token = table.placeholder_for(&m.original, m.category);
            claimed.extend(spans.into_iter().map(|(s, e)| (s, e, token.clone())));
        }

        claimed.sort_by_key(|&(start, _, _)| start);

        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        for (start, end, token) in &claimed {
            out.push_str(&text[cursor..*start]);
            out.push_str(token);
            cursor = *end;
        }
        out.push_str(&text[cursor..]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sanitizer() -> Sanitizer {
        Sanitizer::new(Arc::new(DetectionPipeline::default_pipeline().unwrap()))
    }

    #[test]
    fn test_example_message() {
        let mut table = MappingTable::new();
        let out = sanitizer().sanitize_text(
            "My card is 6222021234567890, email me at a@b.com",
            &mut table,
        );
        assert_eq!(out, "My card is __bank_card_1__, email me at __email_1__");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_same_value_same_placeholder() {
        let mut table = MappingTable::new();
        let out = sanitizer().sanitize_text("a@b.com wrote to a@b.com", &mut table);
        assert_eq!(out, "__email_1__ wrote to __email_1__");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_longer_match_numbered_first() {
        let mut table = MappingTable::new();
        let out = sanitizer().sanitize_text("x@y.io then longer.name@example.org", &mut table);
        assert_eq!(out, "__email_2__ then __email_1__");
    }

    #[test]
    fn test_nested_match_not_allocated() {
        // The email inside the URL is covered by the longer URL match.
        let mut table = MappingTable::new();
        let out = sanitizer().sanitize_text("open https://bob@example.com/inbox now", &mut table);
        assert_eq!(out, "open __url_1__ now");
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("__url_1__"), Some("https://bob@example.com/inbox"));
    }

    #[test]
    fn test_tree_shares_table() {
        let value = json!({
            "system": "operator key sk-ant-api03-abcdef123456",
            "messages": [
                {"role": "user", "content": "use sk-ant-api03-abcdef123456 please"},
                {"role": "user", "content": [{"type": "text", "text": "ping 10.1.2.3"}]}
            ],
            "max_tokens": 128,
            "stream": false
        });
        let result = sanitizer().sanitize(&value);
        assert_eq!(result.redaction_count, 2);
        assert_eq!(
            result.sanitized_value["system"],
            "operator key __secret_1__"
        );
        assert_eq!(
            result.sanitized_value["messages"][0]["content"],
            "use __secret_1__ please"
        );
        assert_eq!(
            result.sanitized_value["messages"][1]["content"][0]["text"],
            "ping __ip_1__"
        );
        assert_eq!(result.sanitized_value["max_tokens"], 128);
    }

    #[test]
    fn test_typed_placeholder_not_reused() {
        let mut table = MappingTable::new();
        let out = sanitizer().sanitize_text("template __email_1__, mine is a@b.com", &mut table);
        assert_eq!(out, "template __email_1__, mine is __email_2__");
        assert_eq!(table.get("__email_1__"), None);
    }

    #[test]
    fn test_clean_text_untouched() {
        let mut table = MappingTable::new();
        let text = "Refactor the parser for better error messages.";
        assert_eq!(sanitizer().sanitize_text(text, &mut table), text);
        assert!(table.is_empty());
    }
}
