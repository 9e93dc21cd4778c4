use crate::sanitize::table::placeholder_spans;
use crate::sanitize::MappingTable;

use super::{restore_json_text, restore_text};

/// Longest placeholder the window waits for, in bytes.
pub const DEFAULT_MAX_PLACEHOLDER_LEN: usize = 32;

/// Sliding-window restorer for plain text deltas.
///
/// Unlike SSE lines, text deltas carry no framing, so a placeholder may be
/// split anywhere (`"Hello __em"` + `"ail_1__ world"`). The restorer withholds
/// the shortest tail that could still grow into a placeholder and emits the
/// rest restored.
#[derive(Debug, Clone)]
pub struct TextStreamRestorer {
    table: MappingTable,
    buffer: String,
    max_placeholder_len: usize,
    escape_json: bool,
}

impl TextStreamRestorer {
    pub fn new(table: MappingTable) -> Self {
        Self::with_max_len(table, DEFAULT_MAX_PLACEHOLDER_LEN)
    }

    pub fn with_max_len(table: MappingTable, max_placeholder_len: usize) -> Self {
        Self {
            table,
            buffer: String::new(),
            max_placeholder_len,
            escape_json: false,
        }
    }

    /// Restorer for deltas that are fragments of a JSON document, such as
    /// streamed tool-call arguments. Originals come out JSON-escaped.
    pub fn json_escaped(table: MappingTable) -> Self {
        Self {
            escape_json: true,
            ..Self::new(table)
        }
    }

    /// Feed a chunk; returns the text that is safe to emit now.
    pub fn push(&mut self, chunk: &str) -> String {
        self.buffer.push_str(chunk);
        let hold = self.hold_position();
        let rest = self.buffer.split_off(hold);
        let ready = std::mem::replace(&mut self.buffer, rest);
        self.restore(&ready)
    }

    /// Emit whatever is still held at end of stream.
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.buffer);
        self.restore(&rest)
    }

    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    fn restore(&self, text: &str) -> String {
        if self.escape_json {
            restore_json_text(text, &self.table)
        } else {
            restore_text(text, &self.table)
        }
    }

    /// Start of the earliest suffix that is an incomplete placeholder prefix,
    /// or the buffer length when nothing needs holding. Positions inside a
    /// complete placeholder are never split.
    fn hold_position(&self) -> usize {
        let bytes = self.buffer.as_bytes();
        let complete = placeholder_spans(&self.buffer);
        let window_start = bytes.len().saturating_sub(self.max_placeholder_len);
        (window_start..bytes.len())
            .find(|&i| {
                bytes[i] == b'_'
                    && !complete.iter().any(|&(s, e)| s < i && i < e)
                    && is_placeholder_prefix(&bytes[i..])
            })
            .unwrap_or(bytes.len())
    }
}

/// Whether `s` is a proper prefix of some `__<category>_<n>__` token.
fn is_placeholder_prefix(s: &[u8]) -> bool {
    #[derive(Clone, Copy)]
    enum State {
        Open1,
        Open2,
        FirstLetter,
        Letters,
        AfterUnderscore,
        Digits,
        Close1,
        Done,
    }

    let mut state = State::Open1;
    for &b in s {
        state = match (state, b) {
            (State::Open1, b'_') => State::Open2,
            (State::Open2, b'_') => State::FirstLetter,
            (State::FirstLetter, b'a'..=b'z') => State::Letters,
            (State::Letters, b'a'..=b'z') => State::Letters,
            (State::Letters, b'_') => State::AfterUnderscore,
            (State::AfterUnderscore, b'a'..=b'z') => State::Letters,
            (State::AfterUnderscore, b'1'..=b'9') => State::Digits,
            (State::Digits, b'0'..=b'9') => State::Digits,
            (State::Digits, b'_') => State::Close1,
            (State::Close1, b'_') => State::Done,
            _ => return false,
        };
    }
    !matches!(state, State::Done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitize::Category;

    fn restorer() -> TextStreamRestorer {
        let mut table = MappingTable::new();
        table.placeholder_for("a@b.com", Category::Email);
        table.placeholder_for("4111 1111 1111 1111", Category::CreditCard);
        TextStreamRestorer::new(table)
    }

    #[test]
    fn test_split_placeholder() {
        let mut r = restorer();
        assert_eq!(r.push("Hello __em"), "Hello ");
        assert!(r.has_pending());
        assert_eq!(r.push("ail_1__ world"), "a@b.com world");
        assert!(!r.has_pending());
    }

    #[test]
    fn test_split_at_every_position() {
        let text = "pay __credit_card_1__ and mail __email_1__ now";
        let expected = "pay 4111 1111 1111 1111 and mail a@b.com now";
        for cut in 1..text.len() {
            let mut r = restorer();
            let mut out = r.push(&text[..cut]);
            out.push_str(&r.push(&text[cut..]));
            out.push_str(&r.finish());
            assert_eq!(out, expected, "cut at {cut}");
        }
    }

    #[test]
    fn test_snake_case_not_held_forever() {
        let mut r = restorer();
        assert_eq!(r.push("call my_function now"), "call my_function now");
        assert!(!r.has_pending());
    }

    #[test]
    fn test_finish_flushes_partial() {
        let mut r = restorer();
        assert_eq!(r.push("ends with __ema"), "ends with ");
        assert_eq!(r.finish(), "__ema");
    }

    #[test]
    fn test_json_fragments_are_escaped() {
        let mut table = MappingTable::new();
        table.placeholder_for("say \"hi\"", Category::Secret);
        let mut r = TextStreamRestorer::json_escaped(table);
        let mut out = r.push("{\"note\":\"__sec");
        out.push_str(&r.push("ret_1__\"}"));
        out.push_str(&r.finish());
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["note"], "say \"hi\"");
    }

    #[test]
    fn test_prefix_grammar() {
        assert!(is_placeholder_prefix(b"_"));
        assert!(is_placeholder_prefix(b"__credit_card_1"));
        assert!(is_placeholder_prefix(b"__email_12_"));
        assert!(!is_placeholder_prefix(b"__email_1__"));
        assert!(!is_placeholder_prefix(b"__Email"));
        assert!(!is_placeholder_prefix(b"_x"));
    }
}
