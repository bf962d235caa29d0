//! Reply extraction across the response shapes the chat endpoint has been seen to return.
//!
//! The upstream provider behind `/api/chat` is not pinned to one schema, so the body is
//! probed with an ordered list of extraction attempts. Each attempt is total: it either
//! yields a non-blank string or `None`, never an error.

use serde_json::Value;

/// Nesting bound for JSON documents that decode to yet another JSON string.
const MAX_STRING_DECODE_DEPTH: usize = 4;

type Extractor = fn(&Value) -> Option<&str>;

/// Object-shape probes, tried in order after the `choices[0]` probe.
const FALLBACK_EXTRACTORS: &[(&str, Extractor)] = &[
    ("output_text", output_text),
    ("message.content", message_content),
    ("content", content),
    ("text", text),
    ("data.content", data_content),
];

fn output_text(value: &Value) -> Option<&str> {
    value.get("output_text")?.as_str()
}

fn message_content(value: &Value) -> Option<&str> {
    value.get("message")?.get("content")?.as_str()
}

fn content(value: &Value) -> Option<&str> {
    value.get("content")?.as_str()
}

fn text(value: &Value) -> Option<&str> {
    value.get("text")?.as_str()
}

fn data_content(value: &Value) -> Option<&str> {
    value.get("data")?.get("content")?.as_str()
}

/// Extracts the reply from a raw response body.
///
/// Text that parses as JSON is probed structurally. Text that opens like a JSON document
/// but does not parse is malformed and yields nothing; any other text is the reply itself.
pub fn extract_reply(body: &str) -> Option<String> {
    extract_from_text(body, 0)
}

/// Extracts the reply from an already-parsed value.
pub fn extract_reply_value(value: &Value) -> Option<String> {
    extract_from_value(value, 0)
}

fn extract_from_text(text: &str, depth: usize) -> Option<String> {
    match serde_json::from_str::<Value>(text) {
        Ok(parsed) => extract_from_value(&parsed, depth),
        Err(_) if looks_like_json(text) => None,
        Err(_) => accept(text),
    }
}

fn extract_from_value(value: &Value, depth: usize) -> Option<String> {
    match value {
        Value::String(inner) if depth < MAX_STRING_DECODE_DEPTH => {
            extract_from_text(inner, depth + 1)
        }
        Value::String(inner) => accept(inner),
        Value::Object(_) => extract_from_object(value),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::Array(_) => None,
    }
}

fn extract_from_object(value: &Value) -> Option<String> {
    if let Some(choice) = value.get("choices").and_then(|choices| choices.get(0)) {
        let content = choice
            .get("message")
            .and_then(|message| message.get("content"))
            .or_else(|| choice.get("delta").and_then(|delta| delta.get("content")));
        if let Some(reply) = content.and_then(Value::as_str).and_then(accept) {
            return Some(reply);
        }
    }

    FALLBACK_EXTRACTORS.iter().find_map(|(field, extract)| {
        let reply = extract(value).and_then(accept)?;
        tracing::trace!(field = *field, "extracted reply from fallback field");
        Some(reply)
    })
}

fn looks_like_json(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

fn accept(candidate: &str) -> Option<String> {
    if candidate.trim().is_empty() {
        None
    } else {
        Some(candidate.to_string())
    }
}

/// Pulls a human-readable error message out of a failed response body, if it has one.
///
/// Checked in order: `error.message`, `error` as a string, `upstream.error`.
pub fn upstream_error_message(body: &str) -> Option<String> {
    let value = serde_json::from_str::<Value>(body).ok()?;
    let error = value.get("error");
    error
        .and_then(|error| error.get("message"))
        .and_then(Value::as_str)
        .or_else(|| error.and_then(Value::as_str))
        .or_else(|| {
            value
                .get("upstream")
                .and_then(|upstream| upstream.get("error"))
                .and_then(Value::as_str)
        })
        .and_then(accept)
}

/// Truncates a body to at most `max_chars` characters for diagnostics.
pub fn excerpt(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((cut, _)) => body[..cut].to_string(),
        None => body.to_string(),
    }
}
