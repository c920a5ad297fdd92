//! Structured payloads embedded in generated text.
//!
//! Replies from the text-generation collaborator carry machine-readable
//! sections wrapped in `<START_DATA>`/`<END_DATA>` markers with a tag block
//! per payload kind (`<PROFILE_DATA>`, `<QUERY_DATA>`, `<WORKOUT_DATA>`).
//! The primary body format is line-oriented `key: value` pairs; JSON is the
//! fallback. Decoding is tolerant: callers receive a tagged result and never
//! a partial object.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

pub const START_MARKER: &str = "<START_DATA>";
pub const END_MARKER: &str = "<END_DATA>";
pub const PROFILE_TAG: &str = "PROFILE_DATA";
pub const QUERY_TAG: &str = "QUERY_DATA";
pub const WORKOUT_TAG: &str = "WORKOUT_DATA";

static MARKER_SECTION_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?s)<START_DATA>.*?<END_DATA>").expect("static regex"));
static TAG_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"(?s)<[A-Z][A-Z_]*_DATA>.*?</[A-Z][A-Z_]*_DATA>").expect("static regex")
});
static FENCE_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z]*[ \t]*\n(.*?)```").expect("static regex"));
static BLANK_RUN_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"\n{3,}").expect("static regex"));

#[derive(Clone, Debug, PartialEq)]
pub enum Decoded {
	Ok(Value),
	Malformed,
	Absent,
}

impl Decoded {
	pub fn into_value(self) -> Option<Value> {
		match self {
			Self::Ok(value) => Some(value),
			Self::Malformed | Self::Absent => None,
		}
	}
}

/// Locates the payload for `tag` in generated text. Falls back through the
/// marker section, any fenced code block, and finally a bare JSON object
/// span, mirroring how loosely models follow format instructions.
pub fn extract(text: &str, tag: &str) -> Decoded {
	if let Some(body) = tag_body(text, tag) {
		return decode(unwrap_fence(body));
	}
	if let Some(section) = delimited(text, START_MARKER, END_MARKER) {
		let body = unwrap_fence(section);

		// The section may hold a differently tagged payload; leave those to
		// the matching extract call.
		if !body.starts_with('<') {
			return decode(body);
		}
	}
	if let Some(captures) = FENCE_RE.captures(text) {
		return decode(captures.get(1).map(|m| m.as_str()).unwrap_or_default());
	}
	if let Some((start, end)) = json_object_span(text) {
		return match serde_json::from_str(&text[start..end]) {
			Ok(value) => Decoded::Ok(value),
			Err(_) => Decoded::Malformed,
		};
	}

	Decoded::Absent
}

/// Decodes a raw payload body: JSON when it looks bracketed, otherwise the
/// compact line format with JSON as a last resort.
pub fn decode(raw: &str) -> Decoded {
	let trimmed = raw.trim();

	if trimmed.is_empty() {
		return Decoded::Absent;
	}
	if trimmed.starts_with('{') || trimmed.starts_with('[') {
		return match serde_json::from_str(trimmed) {
			Ok(value) => Decoded::Ok(value),
			Err(_) => Decoded::Malformed,
		};
	}

	match decode_lines(trimmed) {
		Some(map) => Decoded::Ok(Value::Object(map)),
		None => match serde_json::from_str(trimmed) {
			Ok(value) => Decoded::Ok(value),
			Err(_) => Decoded::Malformed,
		},
	}
}

pub fn encode_lines(map: &Map<String, Value>) -> String {
	let mut out = String::new();

	for (key, value) in map {
		out.push_str(key);
		out.push_str(": ");
		out.push_str(&scalar_text(value));
		out.push('\n');
	}

	out
}

pub fn encode(tag: &str, body: &str) -> String {
	format!("{START_MARKER}\n<{tag}>\n{body}\n</{tag}>\n{END_MARKER}")
}

/// Produces the human-readable rendition of a reply: marker sections, tag
/// blocks, fenced code blocks, and JSON-parseable brace spans are removed;
/// prose that merely resembles data is kept.
pub fn strip(text: &str) -> String {
	let cleaned = MARKER_SECTION_RE.replace_all(text, "");
	let cleaned = TAG_BLOCK_RE.replace_all(&cleaned, "");
	let cleaned = FENCE_RE.replace_all(&cleaned, "");
	let cleaned = strip_json_spans(&cleaned);
	let cleaned = BLANK_RUN_RE.replace_all(&cleaned, "\n\n");

	cleaned.trim().to_string()
}

fn tag_body<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
	let open = format!("<{tag}>");
	let close = format!("</{tag}>");
	let start = text.find(&open)? + open.len();
	let end = text[start..].find(&close)? + start;

	Some(&text[start..end])
}

fn delimited<'a>(text: &'a str, open: &str, close: &str) -> Option<&'a str> {
	let start = text.find(open)? + open.len();
	let end = text[start..].find(close)? + start;

	Some(&text[start..end])
}

fn unwrap_fence(raw: &str) -> &str {
	let trimmed = raw.trim();
	let Some(rest) = trimmed.strip_prefix("```") else {
		return trimmed;
	};
	let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
	let rest = rest.strip_suffix("```").unwrap_or(rest);

	rest.trim()
}

fn decode_lines(raw: &str) -> Option<Map<String, Value>> {
	let mut map = Map::new();

	for line in raw.lines() {
		let line = line.trim();

		if line.is_empty() {
			continue;
		}

		let (key, value) = line.split_once(':')?;
		let key = key.trim();

		// Prose like "Note: ..." has whitespace in the would-be key; reject
		// the whole body rather than decode half of it.
		if key.is_empty() || key.contains(char::is_whitespace) {
			return None;
		}

		map.insert(key.to_string(), scalar_value(value.trim()));
	}

	if map.is_empty() { None } else { Some(map) }
}

fn scalar_value(raw: &str) -> Value {
	match raw {
		"null" => Value::Null,
		"true" => Value::Bool(true),
		"false" => Value::Bool(false),
		_ => {
			if let Ok(number) = raw.parse::<i64>() {
				return Value::from(number);
			}
			if let Ok(number) = raw.parse::<f64>()
				&& number.is_finite()
			{
				return Value::from(number);
			}

			Value::String(raw.to_string())
		},
	}
}

fn scalar_text(value: &Value) -> String {
	match value {
		Value::Null => "null".to_string(),
		Value::Bool(flag) => flag.to_string(),
		Value::Number(number) => number.to_string(),
		Value::String(text) => text.clone(),
		other => other.to_string(),
	}
}

/// Byte range of the first balanced `{...}` span, string-aware so braces
/// inside JSON strings do not unbalance the scan.
fn json_object_span(text: &str) -> Option<(usize, usize)> {
	let bytes = text.as_bytes();
	let mut start = None;
	let mut depth = 0_usize;
	let mut in_string = false;
	let mut escaped = false;

	for (idx, &byte) in bytes.iter().enumerate() {
		if in_string {
			if escaped {
				escaped = false;
			} else if byte == b'\\' {
				escaped = true;
			} else if byte == b'"' {
				in_string = false;
			}

			continue;
		}

		match byte {
			b'"' if start.is_some() => in_string = true,
			b'{' => {
				if start.is_none() {
					start = Some(idx);
				}

				depth += 1;
			},
			b'}' =>
				if let Some(span_start) = start {
					depth -= 1;

					if depth == 0 {
						return Some((span_start, idx + 1));
					}
				},
			_ => {},
		}
	}

	None
}

fn strip_json_spans(text: &str) -> String {
	let mut out = String::with_capacity(text.len());
	let mut rest = text;

	while let Some((start, end)) = json_object_span(rest) {
		if serde_json::from_str::<Value>(&rest[start..end]).is_ok() {
			out.push_str(&rest[..start]);
		} else {
			out.push_str(&rest[..end]);
		}

		rest = &rest[end..];
	}

	out.push_str(rest);

	out
}
