//! Resilient extraction of structured payloads from generated text.
//!
//! The generation service is asked for JSON but nothing guarantees it. A reply
//! is searched in a fixed order and the first candidate that both decodes and
//! matches the expected shape wins:
//!
//! 1. the first fenced block marked `json`
//! 2. the first top-level bracketed or braced span outside prose fences
//!    (an unlabelled fence whose body opens with `[` or `{` is not prose)
//! 3. for list shapes, the whole trimmed reply when it is itself a list
//!
//! When all of them fail the reply is kept verbatim as [`Parsed::Fallback`].
//! Parsing never fails outright.

use std::ops::Range;

use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Category given to the record synthesized from an unparsable reply.
pub const UNPARSED_CATEGORY: &str = "unparsed";

/// Outcome of parsing one reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    /// A value matching the expected shape
    Structured(Value),
    /// No candidate matched; the raw reply
    Fallback(String),
}

impl Parsed {
    pub fn is_structured(&self) -> bool {
        matches!(self, Parsed::Structured(_))
    }

    /// Flatten into records. A fallback becomes exactly one record carrying the
    /// raw text, so a list consumer never sees an empty set for bad input.
    pub fn into_records(self) -> Vec<Value> {
        match self {
            Parsed::Structured(Value::Array(items)) => items,
            Parsed::Structured(other) => vec![other],
            Parsed::Fallback(raw) => vec![fallback_record(&raw)],
        }
    }
}

/// The record standing in for a reply that could not be parsed.
pub fn fallback_record(raw: &str) -> Value {
    let mut record = Map::new();
    record.insert("category".into(), Value::String(UNPARSED_CATEGORY.into()));
    record.insert("payload".into(), Value::String(raw.to_string()));
    Value::Object(record)
}

/// A named field of an expected object, with the alternate names accepted for it.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
}

/// What the caller expects the reply to contain.
#[derive(Debug, Clone, Copy)]
pub enum ExpectedShape {
    /// An array of records, possibly wrapped in an object under one of `wrapper_keys`.
    List {
        wrapper_keys: &'static [&'static str],
    },
    /// An object carrying at least one of `fields`. The result is normalized
    /// to the canonical field names.
    Object { fields: &'static [FieldSpec] },
}

impl ExpectedShape {
    fn is_list(&self) -> bool {
        matches!(self, ExpectedShape::List { .. })
    }

    /// Check a decoded value against the shape.
    fn accept(&self, value: Value) -> Option<Value> {
        match (self, value) {
            (ExpectedShape::List { .. }, Value::Array(items)) => Some(Value::Array(items)),
            (ExpectedShape::List { wrapper_keys }, Value::Object(mut map)) => wrapper_keys
                .iter()
                .find_map(|key| match map.remove(*key) {
                    Some(Value::Array(items)) => Some(Value::Array(items)),
                    _ => None,
                }),
            (ExpectedShape::Object { fields }, Value::Object(mut map)) => {
                let mut normalized = Map::new();
                for field in fields.iter() {
                    let found = std::iter::once(field.name)
                        .chain(field.aliases.iter().copied())
                        .find_map(|key| map.remove(key).filter(|v| !v.is_null()));
                    if let Some(value) = found {
                        normalized.insert(field.name.to_string(), value);
                    }
                }
                if normalized.is_empty() {
                    None
                } else {
                    Some(Value::Object(normalized))
                }
            }
            _ => None,
        }
    }
}

/// Parse `raw` against `shape`.
pub fn parse(raw: &str, shape: &ExpectedShape) -> Parsed {
    let fences = fences(raw);

    let mut candidates: Vec<(&'static str, &str)> = Vec::with_capacity(3);
    if let Some(fence) = fences.iter().find(|f| f.lang.eq_ignore_ascii_case("json")) {
        candidates.push(("json fence", fence.body.trim()));
    }
    if let Some(span) = first_top_level_span(raw, &fences, shape.is_list()) {
        candidates.push(("bracketed span", span));
    }
    let trimmed = raw.trim();
    if shape.is_list() && trimmed.starts_with('[') && trimmed.ends_with(']') {
        candidates.push(("whole reply", trimmed));
    }

    for (attempt, candidate) in candidates {
        match serde_json::from_str::<Value>(candidate) {
            Ok(value) => match shape.accept(value) {
                Some(accepted) => {
                    debug!(attempt, "Parsed structured reply");
                    return Parsed::Structured(accepted);
                }
                None => debug!(attempt, "Decoded value does not match expected shape"),
            },
            Err(e) => debug!(attempt, error = %e, "Candidate is not valid JSON"),
        }
    }

    warn!(
        reply_len = raw.len(),
        preview = %raw.chars().take(80).collect::<String>(),
        "No structured payload found in reply, using fallback"
    );
    Parsed::Fallback(raw.to_string())
}

/// A ``` fenced region of the reply.
#[derive(Debug)]
struct Fence<'a> {
    lang: &'a str,
    body: &'a str,
    /// Byte range covering both fence markers
    span: Range<usize>,
}

impl Fence<'_> {
    fn is_prose(&self) -> bool {
        if self.lang.is_empty() {
            let body = self.body.trim_start();
            return !(body.starts_with('[') || body.starts_with('{'));
        }
        !self.lang.eq_ignore_ascii_case("json")
    }
}

/// Pair up ``` markers in order. An unclosed fence runs to the end of the text.
fn fences(text: &str) -> Vec<Fence<'_>> {
    const MARKER: &str = "```";
    let mut found = Vec::new();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find(MARKER) {
        let open = pos + offset;
        let after = open + MARKER.len();
        let lang_len = text[after..]
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+')))
            .unwrap_or(text.len() - after);
        let lang = &text[after..after + lang_len];
        let body_start = after + lang_len;

        let (body_end, close_end) = match text[body_start..].find(MARKER) {
            Some(i) => (body_start + i, body_start + i + MARKER.len()),
            None => (text.len(), text.len()),
        };

        found.push(Fence {
            lang,
            body: &text[body_start..body_end],
            span: open..close_end,
        });
        pos = close_end;
    }

    found
}

/// First balanced `[...]` / `{...}` span whose opener lies outside prose
/// fences. Object shapes only look for braces.
fn first_top_level_span<'a>(text: &'a str, fences: &[Fence<'_>], allow_list: bool) -> Option<&'a str> {
    let in_prose = |idx: usize| {
        fences
            .iter()
            .any(|f| f.is_prose() && f.span.contains(&idx))
    };

    let start = text
        .char_indices()
        .find(|&(i, c)| (c == '{' || (allow_list && c == '[')) && !in_prose(i))
        .map(|(i, _)| i)?;

    balanced_span(&text[start..])
}

/// The balanced span at the start of `s`, aware of JSON string literals.
/// `None` for mismatched or unterminated input.
fn balanced_span(s: &str) -> Option<&str> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(c) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(&s[..i + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}
