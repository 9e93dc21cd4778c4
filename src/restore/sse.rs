use std::collections::BTreeMap;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;

use crate::sanitize::MappingTable;

use super::{restore_json_text, restore_text, restore_value, TextStreamRestorer};

/// Event-buffered restorer for Server-Sent-Events bodies.
///
/// Bytes are held until a blank line completes an event, so a placeholder
/// split across reads is never missed. Events whose `data:` payload is JSON are
/// restored field by field. The generated text of each choice, content block
/// or candidate part runs through its own [`TextStreamRestorer`], so a
/// placeholder the model emits across several events still comes out whole.
/// Text held that way is released into the event that finishes its channel,
/// as an extra event before `[DONE]`, or when the upstream closes.
#[derive(Debug)]
pub struct SseRestorer {
    table: MappingTable,
    buffer: Vec<u8>,
    event: Vec<Vec<u8>>,
    channels: BTreeMap<String, Channel>,
}

/// One stream of deltas, e.g. the content of choice 0 or content block 2.
#[derive(Debug)]
struct Channel {
    restorer: TextStreamRestorer,
    /// Last event that carried this channel with its text blanked, replayed
    /// to release held text.
    event_name: Option<String>,
    template: Value,
    pointer: String,
}

/// A delta field inside one parsed event.
struct Slot {
    key: String,
    pointer: String,
    json_fragment: bool,
}

impl Slot {
    fn text(key: String, pointer: String) -> Self {
        Self {
            key,
            pointer,
            json_fragment: false,
        }
    }

    fn json(key: String, pointer: String) -> Self {
        Self {
            key,
            pointer,
            json_fragment: true,
        }
    }
}

impl SseRestorer {
    pub fn new(table: MappingTable) -> Self {
        Self {
            table,
            buffer: Vec::new(),
            event: Vec::new(),
            channels: BTreeMap::new(),
        }
    }

    /// Feed one upstream chunk; returns the restored bytes of every event the
    /// chunk completed (possibly empty).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<u8> {
        self.buffer.extend_from_slice(chunk);
        let Some(last_newline) = self.buffer.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);

        let mut out = Vec::with_capacity(complete.len());
        for line in complete.split_inclusive(|&b| b == b'\n') {
            self.event.push(line.to_vec());
            if is_blank(line) {
                let lines = std::mem::take(&mut self.event);
                out.extend(self.restore_event(&lines));
            }
        }
        out
    }

    /// Flush whatever is left after the upstream closed, even without a
    /// terminating blank line, then release any held delta text.
    pub fn finish(&mut self) -> Vec<u8> {
        let mut lines = std::mem::take(&mut self.event);
        if !self.buffer.is_empty() {
            lines.push(std::mem::take(&mut self.buffer));
        }
        let mut out = if lines.is_empty() {
            Vec::new()
        } else {
            self.restore_event(&lines)
        };

        let held = self.release(|_| true);
        if !held.is_empty() && !out.is_empty() {
            let separator: &[u8] = if out.ends_with(b"\n") { b"\n" } else { b"\n\n" };
            out.extend_from_slice(separator);
        }
        out.extend(held);
        out
    }

    /// Bytes received but not yet emitted as part of an event.
    pub fn pending(&self) -> usize {
        self.buffer.len() + self.event.iter().map(Vec::len).sum::<usize>()
    }

    fn restore_event(&mut self, lines: &[Vec<u8>]) -> Vec<u8> {
        if self.table.is_empty() {
            return lines.concat();
        }

        let mut event_name = None;
        let mut data = Vec::new();
        for line in lines {
            let text = String::from_utf8_lossy(line);
            let field = text.trim_end_matches(['\r', '\n']);
            if let Some(name) = field.strip_prefix("event:") {
                event_name = Some(name.trim().to_string());
            } else if let Some(payload) = field.strip_prefix("data:") {
                data.push(payload.strip_prefix(' ').unwrap_or(payload).to_string());
            }
        }
        if data.is_empty() {
            return self.restore_lines(lines);
        }

        let payload = data.join("\n");
        let Ok(mut value) = serde_json::from_str::<Value>(&payload) else {
            // `[DONE]` and other plain payloads close every open channel.
            let mut out = self.release(|_| true);
            out.extend(self.restore_lines(lines));
            return out;
        };

        let (mut out, changed) = self.restore_deltas(&mut value, event_name);
        if !changed && !payload.contains("__") {
            out.extend(lines.concat());
            return out;
        }

        restore_value(&mut value, &self.table);
        let json = serde_json::to_string(&value)
            .unwrap_or_else(|_| restore_json_text(&payload, &self.table));
        let mut wrote_data = false;
        for line in lines {
            if !line.starts_with(b"data:") {
                out.extend(self.restore_line(line));
            } else if !wrote_data {
                out.extend_from_slice(b"data: ");
                out.extend_from_slice(json.as_bytes());
                out.extend_from_slice(line_ending(line));
                wrote_data = true;
            }
        }
        out
    }

    /// Run every delta field of `value` through its channel and release the
    /// channels this event finishes. Returns the bytes of any event that must
    /// precede this one, and whether `value` changed.
    fn restore_deltas(&mut self, value: &mut Value, event_name: Option<String>) -> (Vec<u8>, bool) {
        let slots = delta_slots(value);
        let mut changed = false;

        for slot in &slots {
            let Some(Value::String(text)) = value.pointer_mut(&slot.pointer) else {
                continue;
            };
            let table = &self.table;
            let channel = self
                .channels
                .entry(slot.key.clone())
                .or_insert_with(|| Channel::new(table.clone(), slot.json_fragment));
            let emitted = channel.restorer.push(text);
            if emitted != *text {
                *text = emitted;
                changed = true;
            }
        }

        if !slots.is_empty() {
            let template = blank_template(value, &slots);
            for slot in &slots {
                if let Some(channel) = self.channels.get_mut(&slot.key) {
                    channel.template = template.clone();
                    channel.pointer = slot.pointer.clone();
                    channel.event_name = event_name.clone();
                }
            }
        }

        let mut before = Vec::new();
        for prefix in finished_prefixes(value) {
            let keys: Vec<String> = self
                .channels
                .keys()
                .filter(|k| k.starts_with(&prefix))
                .cloned()
                .collect();
            for key in keys {
                let Some(mut channel) = self.channels.remove(&key) else {
                    continue;
                };
                let tail = channel.restorer.finish();
                if tail.is_empty() {
                    continue;
                }
                let own = slots.iter().find(|s| s.key == key);
                match own.and_then(|s| value.pointer_mut(&s.pointer)) {
                    Some(Value::String(text)) => {
                        text.push_str(&tail);
                        changed = true;
                    }
                    _ => before.extend(channel.replay(tail)),
                }
            }
        }
        (before, changed)
    }

    /// Release held text of every channel matching `finished` as replayed
    /// events.
    fn release<F>(&mut self, finished: F) -> Vec<u8>
    where
        F: Fn(&str) -> bool,
    {
        let keys: Vec<String> = self.channels.keys().filter(|k| finished(k)).cloned().collect();
        let mut out = Vec::new();
        for key in keys {
            if let Some(mut channel) = self.channels.remove(&key) {
                let tail = channel.restorer.finish();
                if !tail.is_empty() {
                    out.extend(channel.replay(tail));
                }
            }
        }
        out
    }

    fn restore_lines(&self, lines: &[Vec<u8>]) -> Vec<u8> {
        lines.iter().flat_map(|line| self.restore_line(line)).collect()
    }

    /// Restore one non-JSON line (with or without its trailing newline).
    fn restore_line(&self, line: &[u8]) -> Vec<u8> {
        if !line.windows(2).any(|w| w == b"__") {
            return line.to_vec();
        }
        restore_text(&String::from_utf8_lossy(line), &self.table).into_bytes()
    }
}

impl Channel {
    fn new(table: MappingTable, json_fragment: bool) -> Self {
        let restorer = if json_fragment {
            TextStreamRestorer::json_escaped(table)
        } else {
            TextStreamRestorer::new(table)
        };
        Self {
            restorer,
            event_name: None,
            template: Value::Null,
            pointer: String::new(),
        }
    }

    /// One complete event carrying `text` in this channel's field.
    fn replay(&self, text: String) -> Vec<u8> {
        let mut event = self.template.clone();
        if let Some(field) = event.pointer_mut(&self.pointer) {
            *field = Value::String(text);
        }
        let mut out = String::new();
        if let Some(name) = &self.event_name {
            out.push_str(&format!("event: {name}\n"));
        }
        out.push_str(&format!("data: {event}\n\n"));
        out.into_bytes()
    }
}

/// Delta fields of the three wire formats: chat completion choices (content
/// and tool-call arguments), Anthropic content block deltas, and Gemini
/// candidate parts.
fn delta_slots(value: &Value) -> Vec<Slot> {
    let mut slots = Vec::new();

    if let Some(choices) = value.get("choices").and_then(Value::as_array) {
        for (pos, choice) in choices.iter().enumerate() {
            let idx = index_of(choice, pos);
            if is_string(choice.pointer("/delta/content")) {
                slots.push(Slot::text(
                    format!("choice:{idx}:content"),
                    format!("/choices/{pos}/delta/content"),
                ));
            }
            let calls = choice.pointer("/delta/tool_calls").and_then(Value::as_array);
            for (call_pos, call) in calls.into_iter().flatten().enumerate() {
                if is_string(call.pointer("/function/arguments")) {
                    slots.push(Slot::json(
                        format!("choice:{idx}:tool:{}", index_of(call, call_pos)),
                        format!("/choices/{pos}/delta/tool_calls/{call_pos}/function/arguments"),
                    ));
                }
            }
        }
    }

    if value.get("type").and_then(Value::as_str) == Some("content_block_delta") {
        let idx = index_of(value, 0);
        if is_string(value.pointer("/delta/text")) {
            slots.push(Slot::text(format!("block:{idx}:text"), "/delta/text".into()));
        }
        if is_string(value.pointer("/delta/partial_json")) {
            slots.push(Slot::json(format!("block:{idx}:json"), "/delta/partial_json".into()));
        }
    }

    if let Some(candidates) = value.get("candidates").and_then(Value::as_array) {
        for (pos, candidate) in candidates.iter().enumerate() {
            let idx = index_of(candidate, pos);
            let parts = candidate.pointer("/content/parts").and_then(Value::as_array);
            for (part, p) in parts.into_iter().flatten().enumerate() {
                if is_string(p.get("text")) {
                    slots.push(Slot::text(
                        format!("candidate:{idx}:part:{part}"),
                        format!("/candidates/{pos}/content/parts/{part}/text"),
                    ));
                }
            }
        }
    }

    slots
}

/// Key prefixes of the channels `value` finishes. The empty prefix finishes
/// all of them.
fn finished_prefixes(value: &Value) -> Vec<String> {
    let mut done = Vec::new();

    if let Some(choices) = value.get("choices").and_then(Value::as_array) {
        for (pos, choice) in choices.iter().enumerate() {
            if choice.get("finish_reason").is_some_and(|r| !r.is_null()) {
                done.push(format!("choice:{}:", index_of(choice, pos)));
            }
        }
    }

    match value.get("type").and_then(Value::as_str) {
        Some("content_block_stop") => done.push(format!("block:{}:", index_of(value, 0))),
        Some("message_delta" | "message_stop") => done.push(String::new()),
        _ => {}
    }

    if let Some(candidates) = value.get("candidates").and_then(Value::as_array) {
        for (pos, candidate) in candidates.iter().enumerate() {
            if candidate.get("finishReason").is_some_and(|r| !r.is_null()) {
                done.push(format!("candidate:{}:", index_of(candidate, pos)));
            }
        }
    }

    done
}

/// `value` with every delta field emptied. Tool-call identity (id, type,
/// function name) is dropped so a replayed fragment is not read as a new
/// call.
fn blank_template(value: &Value, slots: &[Slot]) -> Value {
    let mut template = value.clone();
    for slot in slots {
        if let Some(field) = template.pointer_mut(&slot.pointer) {
            *field = Value::String(String::new());
        }
        if let Some(call) = slot.pointer.strip_suffix("/function/arguments") {
            if let Some(Value::Object(call)) = template.pointer_mut(call) {
                call.remove("id");
                call.remove("type");
                if let Some(Value::Object(function)) = call.get_mut("function") {
                    function.remove("name");
                }
            }
        }
    }
    template
}

fn index_of(value: &Value, fallback: usize) -> u64 {
    value
        .get("index")
        .and_then(Value::as_u64)
        .unwrap_or(fallback as u64)
}

fn is_string(value: Option<&Value>) -> bool {
    value.is_some_and(Value::is_string)
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(|&b| b == b'\r' || b == b'\n')
}

fn line_ending(line: &[u8]) -> &'static [u8] {
    if line.ends_with(b"\r\n") {
        b"\r\n"
    } else if line.ends_with(b"\n") {
        b"\n"
    } else {
        b""
    }
}

/// Wrap an upstream byte stream so that every chunk comes out restored.
///
/// The stream ends when the upstream ends (after flushing held text) or on the
/// first upstream error, which is passed through. Dropping the returned stream
/// drops the upstream stream with it.
pub fn restore_stream<S, E>(upstream: S, table: MappingTable) -> impl Stream<Item = Result<Bytes, E>>
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: Send + 'static,
{
    let state = Some((upstream, SseRestorer::new(table)));
    futures::stream::unfold(state, |state| async move {
        let (mut upstream, mut restorer) = state?;
        loop {
            match upstream.next().await {
                Some(Ok(chunk)) => {
                    let out = restorer.push(&chunk);
                    if !out.is_empty() {
                        return Some((Ok(Bytes::from(out)), Some((upstream, restorer))));
                    }
                }
                Some(Err(e)) => return Some((Err(e), None)),
                None => {
                    let tail = restorer.finish();
                    if tail.is_empty() {
                        return None;
                    }
                    return Some((Ok(Bytes::from(tail)), None));
                }
            }
        }
    })
}
