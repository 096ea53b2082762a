//! Sniffing of carousel and property-card JSON written inline without tags
//!
//! Agents sometimes paste the tool JSON straight into prose. Objects are found
//! by their leading keys, cut out with a string-aware brace scanner and kept
//! only when their shape looks like the component they are meant for.

use super::identity::tool_identity;
use super::{ParseMode, StageOutput, TransformStage};
use crate::types::{JsonObject, StructuredPayload, ToolPayload};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

fn carousel_start_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\{\s*"title"\s*:\s*"[^"]*"\s*,\s*"items"\s*:\s*\["#)
            .expect("valid carousel regex")
    })
}

fn property_card_start_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\{\s*"id"\s*:\s*"[^"]*"\s*,\s*"title"\s*:\s*""#)
            .expect("valid property card regex")
    })
}

/// Byte offset just past the `}` closing the object that opens at `start`.
///
/// Braces inside strings are ignored and backslash escapes are honoured.
/// Returns `None` when the text ends before the object closes.
pub fn balanced_object_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape = false;

    for (offset, byte) in text.as_bytes()[start..].iter().enumerate() {
        if escape {
            escape = false;
            continue;
        }
        match byte {
            b'\\' => escape = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }

    None
}

/// JavaScript-style truthiness, which is what the producers of this JSON assume
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn is_carousel(object: &JsonObject) -> bool {
    let Some(first) = object
        .get("items")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
    else {
        return false;
    };
    ["title", "image", "price"]
        .iter()
        .any(|key| truthy(first.get(*key)))
}

fn is_property_card(object: &JsonObject) -> bool {
    truthy(object.get("title"))
        && ["image", "price", "description"]
            .iter()
            .any(|key| truthy(object.get(*key)))
        && !object.contains_key("items")
}

struct Shape {
    name: &'static str,
    start: fn() -> &'static Regex,
    accept: fn(&JsonObject) -> bool,
}

const CAROUSEL: Shape = Shape {
    name: "carousel",
    start: carousel_start_regex,
    accept: is_carousel,
};

const PROPERTY_CARD: Shape = Shape {
    name: "property-card",
    start: property_card_start_regex,
    accept: is_property_card,
};

/// Hold back the leftmost opener of `shape` whose object has not closed yet.
fn hold_unterminated(text: &mut String, shape: &Shape) -> bool {
    let cut = (shape.start)()
        .find_iter(text.as_str())
        .map(|m| m.start())
        .find(|&start| balanced_object_end(text, start).is_none());
    match cut {
        Some(start) => {
            text.truncate(start);
            true
        }
        None => false,
    }
}

/// Remove accepted objects of `shape` from `text`, returning their payloads
/// in left-to-right order.
fn extract_shape(text: &mut String, shape: &Shape) -> Vec<StructuredPayload> {
    let starts: Vec<usize> = (shape.start)()
        .find_iter(text.as_str())
        .map(|m| m.start())
        .collect();
    let mut payloads = Vec::new();

    // Reverse order keeps earlier offsets valid while cutting
    for start in starts.into_iter().rev() {
        let Some(end) = balanced_object_end(text, start) else {
            continue;
        };
        let span = &text[start..end];
        let object = match serde_json::from_str::<Value>(span) {
            Ok(Value::Object(object)) => object,
            Ok(_) => continue,
            Err(e) => {
                debug!("Skipping {} candidate that is not valid JSON: {}", shape.name, e);
                continue;
            }
        };
        if !(shape.accept)(&object) {
            continue;
        }

        payloads.push(StructuredPayload::Tool(ToolPayload::new(
            format!("tool-{}", shape.name),
            object,
            tool_identity(shape.name, span),
        )));
        text.replace_range(start..end, "");
    }

    payloads.reverse();
    payloads
}

pub struct EmbeddedJsonStage;

impl TransformStage for EmbeddedJsonStage {
    fn name(&self) -> &'static str {
        "embedded-json"
    }

    fn apply(&self, text: &str, mode: ParseMode) -> StageOutput {
        let mut text = text.to_string();
        let mut awaiting = false;

        if mode == ParseMode::Streaming {
            awaiting |= hold_unterminated(&mut text, &CAROUSEL);
            awaiting |= hold_unterminated(&mut text, &PROPERTY_CARD);
        }

        let mut payloads = extract_shape(&mut text, &CAROUSEL);
        payloads.extend(extract_shape(&mut text, &PROPERTY_CARD));

        StageOutput {
            text,
            payloads,
            awaiting,
        }
    }
}
