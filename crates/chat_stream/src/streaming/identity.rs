//! Deterministic payload identities
//!
//! An identity depends only on payload content, so re-parsing a longer prefix
//! of the same stream yields the same identity for a payload already emitted.

const HASH_LEN: usize = 16;

fn digest(input: &str) -> String {
    let hex = format!("{:x}", md5::compute(input.as_bytes()));
    hex[..HASH_LEN].to_string()
}

pub fn artifact_identity(artifact_type: &str, payload: &str, title: Option<&str>) -> String {
    format!(
        "artifact-{}",
        digest(&format!("{artifact_type}:{payload}:{}", title.unwrap_or("")))
    )
}

/// `name` is the tool name as written in the source, before aliasing.
pub fn tool_identity(name: &str, payload: &str) -> String {
    format!("tool-{}", digest(&format!("{name}:{payload}")))
}
