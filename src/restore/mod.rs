//! Placeholder restoration for upstream responses.
//!
//! Every entry point shares [`MappingTable::replace_with`]: a single scan for
//! the placeholder grammar with a table lookup per token.

pub mod sse;
pub mod window;

use serde_json::Value;

use crate::sanitize::MappingTable;

pub use sse::SseRestorer;
pub use window::TextStreamRestorer;

/// Restore placeholders in plain text.
pub fn restore_text(text: &str, table: &MappingTable) -> String {
    table.replace_with(text, |original| original.to_string())
}

/// Restore placeholders inside text that is itself a JSON document, so the
/// original value is inserted with JSON string escaping.
pub fn restore_json_text(text: &str, table: &MappingTable) -> String {
    table.replace_with(text, json_escape)
}

/// String fields whose value is itself JSON text (tool-call arguments, streamed
/// tool input).
const EMBEDDED_JSON_KEYS: [&str; 2] = ["arguments", "partial_json"];

/// Restore every string leaf of a JSON tree in place.
///
/// Leaves under an embedded-JSON key get their originals JSON-escaped, so the
/// inner document stays valid once the outer one is serialized.
pub fn restore_value(value: &mut Value, table: &MappingTable) {
    if table.is_empty() {
        return;
    }
    restore_node(value, table, false);
}

fn restore_node(value: &mut Value, table: &MappingTable, embedded_json: bool) {
    match value {
        Value::String(s) => {
            let restored = if embedded_json {
                restore_json_text(s, table)
            } else {
                restore_text(s, table)
            };
            if restored != *s {
                *s = restored;
            }
        }
        Value::Array(items) => {
            for item in items {
                restore_node(item, table, false);
            }
        }
        Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                restore_node(v, table, EMBEDDED_JSON_KEYS.contains(&key.as_str()));
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

/// Restore a fully buffered response body.
///
/// A JSON body is restored leaf by leaf and re-serialized (key order is kept).
/// Anything else gets a plain text pass.
pub fn restore_body(body: &[u8], table: &MappingTable) -> Vec<u8> {
    if table.is_empty() {
        return body.to_vec();
    }
    if let Ok(mut value) = serde_json::from_slice::<Value>(body) {
        restore_value(&mut value, table);
        if let Ok(bytes) = serde_json::to_vec(&value) {
            return bytes;
        }
    }
    restore_text(&String::from_utf8_lossy(body), table).into_bytes()
}

/// Escape `s` for use inside a JSON string literal (without the quotes).
fn json_escape(s: &str) -> String {
    let quoted = serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""));
    quoted[1..quoted.len() - 1].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitize::Category;
    use serde_json::json;

    fn table() -> MappingTable {
        let mut table = MappingTable::new();
        table.placeholder_for("a@b.com", Category::Email);
        table.placeholder_for("pa\"ss\\word\n", Category::Secret);
        table
    }

    #[test]
    fn test_restore_text() {
        assert_eq!(
            restore_text("mail __email_1__ now", &table()),
            "mail a@b.com now"
        );
    }

    #[test]
    fn test_restore_json_text_escapes() {
        let line = r#"{"text":"secret is __secret_1__"}"#;
        let restored = restore_json_text(line, &table());
        let parsed: Value = serde_json::from_str(&restored).unwrap();
        assert_eq!(parsed["text"], "secret is pa\"ss\\word\n");
        assert!(!restored.contains('\n'));
    }

    #[test]
    fn test_restore_body_json() {
        let body = serde_json::to_vec(&json!({
            "content": [{"type": "text", "text": "hi __email_1__"}],
            "usage": {"output_tokens": 3}
        }))
        .unwrap();
        let restored: Value = serde_json::from_slice(&restore_body(&body, &table())).unwrap();
        assert_eq!(restored["content"][0]["text"], "hi a@b.com");
        assert_eq!(restored["usage"]["output_tokens"], 3);
    }

    #[test]
    fn test_restore_body_keeps_key_order() {
        let body = b"{ \"z\": 1,\n  \"a\": \"__secret_1__\" }";
        let restored = String::from_utf8(restore_body(body, &table())).unwrap();
        assert_eq!(restored, r#"{"z":1,"a":"pa\"ss\\word\n"}"#);
    }

    #[test]
    fn test_tool_arguments_stay_valid_json() {
        let body = serde_json::to_vec(&json!({
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "function": {
                            "name": "login",
                            "arguments": r#"{"user":"__email_1__","password":"__secret_1__"}"#
                        }
                    }]
                }
            }]
        }))
        .unwrap();
        let restored: Value = serde_json::from_slice(&restore_body(&body, &table())).unwrap();
        let arguments = restored["choices"][0]["message"]["tool_calls"][0]["function"]["arguments"]
            .as_str()
            .unwrap();
        let arguments: Value = serde_json::from_str(arguments).unwrap();
        assert_eq!(arguments["user"], "a@b.com");
        assert_eq!(arguments["password"], "pa\"ss\\word\n");
    }

    #[test]
    fn test_restore_body_plain_text() {
        let restored = restore_body(b"plain __email_1__", &table());
        assert_eq!(restored, b"plain a@b.com");
    }

    #[test]
    fn test_empty_table_is_passthrough() {
        let body = br#"{ "spaced" : "__email_1__" }"#;
        assert_eq!(restore_body(body, &MappingTable::new()), body.to_vec());
    }
}
