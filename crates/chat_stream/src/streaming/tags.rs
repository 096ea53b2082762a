//! Extraction of `[artifact …]…[/artifact]` and `[tool:Name]…[/tool]` blocks

use super::identity::{artifact_identity, tool_identity};
use super::{ParseMode, StageOutput, TransformStage};
use crate::types::{ArtifactPayload, JsonObject, StructuredPayload, ToolPayload};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

fn artifact_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)\[artifact([^\]]*)\](.*?)\[/artifact\]").expect("valid artifact regex")
    })
}

fn tool_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)\[tool:(\w+(?:-\w+)*)\](.*?)\[/tool\]").expect("valid tool regex")
    })
}

fn attribute_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(\w[\w-]*)\s*=\s*"([^"]*)""#).expect("valid attribute regex"))
}

/// Map a lower-cased tool name to its display type
pub fn tool_display_type(name: &str) -> String {
    match name {
        "carousel" => "tool-carousel".to_string(),
        "property-card" | "propertycard" => "tool-property-card".to_string(),
        "image-display" | "imagedisplay" => "tool-image-display".to_string(),
        other => format!("tool-{other}"),
    }
}

/// Parse a tag body into a payload object.
///
/// Empty bodies give `{}`, non-object JSON is wrapped as `{value}` and
/// anything that fails to parse is kept as `{raw}`.
pub(crate) fn parse_payload(raw: &str) -> JsonObject {
    if raw.is_empty() {
        return JsonObject::new();
    }
    let (key, value) = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => return map,
        Ok(other) => ("value", other),
        Err(_) => ("raw", Value::String(raw.to_string())),
    };
    let mut map = JsonObject::new();
    map.insert(key.to_string(), value);
    map
}

fn parse_attributes(raw: &str) -> HashMap<String, String> {
    attribute_regex()
        .captures_iter(raw.trim())
        .filter_map(|caps| {
            let key = caps.get(1)?.as_str().to_lowercase();
            let value = caps.get(2)?.as_str().trim();
            (!value.is_empty()).then(|| (key, value.to_string()))
        })
        .collect()
}

fn artifact_payload(attrs: &str, body: &str) -> StructuredPayload {
    let mut attributes = parse_attributes(attrs);
    let artifact_type = attributes
        .remove("type")
        .map(|t| t.to_lowercase())
        .unwrap_or_else(|| "custom".to_string());
    let title = attributes.remove("title");
    let description = attributes.remove("description");
    let payload = body.trim();

    StructuredPayload::Artifact(ArtifactPayload {
        identity: artifact_identity(&artifact_type, payload, title.as_deref()),
        data: parse_payload(payload),
        artifact_type,
        title,
        description,
    })
}

fn tool_payload(name: &str, body: &str) -> StructuredPayload {
    let payload = body.trim();
    StructuredPayload::Tool(ToolPayload::new(
        tool_display_type(&name.to_lowercase()),
        parse_payload(payload),
        tool_identity(name, payload),
    ))
}

/// Remove every complete artifact and tool block from `source`.
///
/// Payloads come back in the order their tags appear in `source`.
pub fn extract_tags(source: &str) -> (String, Vec<StructuredPayload>) {
    let mut found: Vec<(usize, StructuredPayload)> = Vec::new();
    // Removed spans in source coordinates
    let mut removed: Vec<(usize, usize)> = Vec::new();
    let mut without_artifacts = String::with_capacity(source.len());
    let mut last = 0;

    for caps in artifact_regex().captures_iter(source) {
        let (Some(whole), Some(attrs), Some(body)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        without_artifacts.push_str(&source[last..whole.start()]);
        last = whole.end();
        removed.push((whole.start(), whole.end()));
        found.push((whole.start(), artifact_payload(attrs.as_str(), body.as_str())));
    }
    without_artifacts.push_str(&source[last..]);

    let mut cleaned = String::with_capacity(without_artifacts.len());
    let mut last = 0;
    for caps in tool_regex().captures_iter(&without_artifacts) {
        let (Some(whole), Some(name), Some(body)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        cleaned.push_str(&without_artifacts[last..whole.start()]);
        last = whole.end();
        let position = source_offset(whole.start(), &removed);
        found.push((position, tool_payload(name.as_str(), body.as_str())));
    }
    cleaned.push_str(&without_artifacts[last..]);

    found.sort_by_key(|(position, _)| *position);
    (cleaned, found.into_iter().map(|(_, payload)| payload).collect())
}

/// Translate an offset in the artifact-free text back to `source`
fn source_offset(offset: usize, removed: &[(usize, usize)]) -> usize {
    let mut shift = 0;
    for (start, end) in removed {
        if start - shift <= offset {
            shift += end - start;
        } else {
            break;
        }
    }
    offset + shift
}

pub struct TagExtractStage;

impl TransformStage for TagExtractStage {
    fn name(&self) -> &'static str {
        "tags"
    }

    fn apply(&self, text: &str, _mode: ParseMode) -> StageOutput {
        let (text, payloads) = extract_tags(text);
        StageOutput {
            text,
            payloads,
            awaiting: false,
        }
    }
}
