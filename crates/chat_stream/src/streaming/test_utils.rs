//! Shared helpers for pipeline and session tests
use super::{ContentPipeline, ParseMode};
use crate::types::{ParseResult, StructuredPayload};
use serde_json::json;

/// Split a string into chunks of `chunk_size` characters
pub fn chunk_str(s: &str, chunk_size: usize) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut chunks = Vec::new();

    for chunk in chars.chunks(chunk_size) {
        chunks.push(chunk.iter().collect::<String>());
    }

    chunks
}

/// Encode text fragments as line-delimited `item` records
pub fn ndjson_items(fragments: &[&str]) -> String {
    fragments
        .iter()
        .map(|content| format!("{}\n", json!({ "type": "item", "content": content })))
        .collect()
}

/// Feed `text` to the pipeline one growing prefix at a time, like a session does
pub fn parse_prefixes(pipeline: &ContentPipeline, text: &str, chunk_size: usize) -> Vec<ParseResult> {
    let mut buffer = String::new();
    chunk_str(text, chunk_size)
        .into_iter()
        .map(|chunk| {
            buffer.push_str(&chunk);
            pipeline.parse(&buffer, ParseMode::Streaming)
        })
        .collect()
}

pub fn identities(payloads: &[StructuredPayload]) -> Vec<String> {
    payloads.iter().map(|p| p.identity().to_string()).collect()
}

/// Tool display types of the payloads, artifacts reported as `artifact`
pub fn payload_types(payloads: &[StructuredPayload]) -> Vec<String> {
    payloads
        .iter()
        .map(|p| match p {
            StructuredPayload::Artifact(_) => "artifact".to_string(),
            StructuredPayload::Tool(tool) => tool.tool_name.clone(),
        })
        .collect()
}
