//! Router envelope unwrapping
//!
//! Some agent workflows wrap the reply in `{"route":"…","response":"…"}`.
//! Only the `response` string is meant for display. While the envelope is
//! still streaming in, whatever part of the response has arrived is shown.

use super::{ParseMode, StageOutput, TransformStage};
use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

fn envelope_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?s)^\s*\{\s*"route"\s*:\s*"[^"]*"\s*,\s*"response"\s*:\s*"((?:[^"\\]|\\.)*)"\s*\}"#,
        )
        .expect("valid router envelope regex")
    })
}

fn response_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""response"\s*:"#).expect("valid response marker regex"))
}

/// Text left after unwrapping, plus whether the envelope is still incomplete
#[derive(Debug, Clone, PartialEq)]
pub struct Unwrapped<'a> {
    pub text: Cow<'a, str>,
    pub pending: bool,
}

impl<'a> Unwrapped<'a> {
    fn unchanged(text: &'a str) -> Self {
        Self {
            text: Cow::Borrowed(text),
            pending: false,
        }
    }

    fn owned(text: String, pending: bool) -> Self {
        Self {
            text: Cow::Owned(text),
            pending,
        }
    }
}

pub fn unwrap_router_envelope(content: &str) -> Unwrapped<'_> {
    let trimmed = content.trim();
    if !trimmed.starts_with('{') || !trimmed.contains("\"route\"") {
        return Unwrapped::unchanged(content);
    }

    if let Some(caps) = envelope_regex().captures(trimmed) {
        let (Some(whole), Some(response)) = (caps.get(0), caps.get(1)) else {
            return Unwrapped::unchanged(content);
        };
        let result = join_trailing(unescape(response.as_str()), &trimmed[whole.end()..]);
        return Unwrapped::owned(blank_to_empty(result), false);
    }

    unwrap_partial(content, trimmed)
}

fn unwrap_partial<'a>(content: &'a str, trimmed: &str) -> Unwrapped<'a> {
    let Some(marker) = response_marker_regex().find(trimmed) else {
        // Envelope started but the response field has not arrived
        return Unwrapped::owned(String::new(), true);
    };

    let after_marker = trimmed[marker.end()..].trim_start();
    if after_marker.is_empty() {
        return Unwrapped::owned(String::new(), true);
    }
    if !after_marker.starts_with('"') {
        return Unwrapped::unchanged(content);
    }

    if let Some(end) = trimmed.rfind('}') {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&trimmed[..=end]) {
            if let Some(response) = value.get("response").and_then(|r| r.as_str()) {
                let result = join_trailing(response.to_string(), &trimmed[end + 1..]);
                return Unwrapped::owned(blank_to_empty(result), false);
            }
        }
    }

    Unwrapped::owned(scan_partial_string(&after_marker[1..]), true)
}

/// Decode a JSON string body up to its closing quote or the end of input
fn scan_partial_string(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => break,
            '\\' => match chars.next() {
                Some('"') => out.push('"'),
                Some('n') => out.push('\n'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                // Escape split across chunks
                None => break,
            },
            c => out.push(c),
        }
    }
    out
}

fn unescape(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Append text that followed the envelope, minus stray closing punctuation
fn join_trailing(mut response: String, trailing: &str) -> String {
    response.push_str(trailing.trim_start_matches(['"', '}']));
    response
}

fn blank_to_empty(text: String) -> String {
    if text.trim().is_empty() {
        String::new()
    } else {
        text
    }
}

/// True for `{`, `{"ro`, `{ "route"` and the like: too short to tell yet
fn is_envelope_prefix(text: &str) -> bool {
    const ENVELOPE_START: &str = "{\"route\"";
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    !compact.is_empty() && ENVELOPE_START.starts_with(&compact)
}

pub struct RouterEnvelopeStage;

impl TransformStage for RouterEnvelopeStage {
    fn name(&self) -> &'static str {
        "router"
    }

    fn apply(&self, text: &str, mode: ParseMode) -> StageOutput {
        if mode == ParseMode::Streaming && is_envelope_prefix(text) {
            return StageOutput {
                awaiting: true,
                ..StageOutput::default()
            };
        }

        let unwrapped = unwrap_router_envelope(text);
        StageOutput {
            text: unwrapped.text.into_owned(),
            payloads: Vec::new(),
            awaiting: unwrapped.pending,
        }
    }
}
