use super::test_utils::{identities, parse_prefixes, payload_types};
use super::{ContentPipeline, ParseMode, PipelineConfig};
use crate::types::StructuredPayload;
use std::collections::HashSet;

const CAROUSEL_JSON: &str = r#"{"title":"Homes","items":[{"title":"Casa","price":"R$ 1"}]}"#;

fn full() -> ContentPipeline {
    ContentPipeline::from_config(&PipelineConfig::full())
}

/// Router envelope around prose, BBCode, a tool tag and an artifact
fn enveloped_reply() -> String {
    let response = format!(
        "Hi [b]there[/b]! [tool:carousel]{CAROUSEL_JSON}[/tool] and [artifact type=\"note\"]{{\"x\":1}}[/artifact] done"
    );
    // Built by hand: the envelope keys must stay in route, response order
    format!(
        r#"{{"route":"general","response":{}}}"#,
        serde_json::Value::String(response)
    )
}

#[test]
fn test_stage_order_for_presets() {
    assert_eq!(
        full().stage_names(),
        vec!["router", "tags", "partial-tag-guard", "embedded-json", "bbcode"]
    );
    assert_eq!(
        ContentPipeline::from_config(&PipelineConfig::server()).stage_names(),
        vec!["router", "tags", "partial-tag-guard", "embedded-json"]
    );
    assert_eq!(
        ContentPipeline::from_config(&PipelineConfig::markup()).stage_names(),
        vec!["tags", "partial-tag-guard", "bbcode"]
    );
}

#[test]
fn test_partial_tool_tag_then_completion() {
    let pipeline = full();

    let partial = pipeline.parse("hello [tool:carou", ParseMode::Streaming);
    assert_eq!(partial.display_text, "hello");
    assert!(partial.payloads.is_empty());
    assert!(partial.is_awaiting_more_input);

    let complete = pipeline.parse(
        &format!("hello [tool:carousel]{CAROUSEL_JSON}[/tool]"),
        ParseMode::Streaming,
    );
    assert_eq!(complete.display_text, "hello");
    assert_eq!(payload_types(&complete.payloads), vec!["tool-carousel"]);
    assert!(!complete.is_awaiting_more_input);
}

#[test]
fn test_parse_is_idempotent() {
    let pipeline = full();
    let raw = enveloped_reply();
    for mode in [ParseMode::Streaming, ParseMode::Final] {
        assert_eq!(pipeline.parse(&raw, mode), pipeline.parse(&raw, mode));
    }
}

#[test]
fn test_enveloped_reply_final_result() {
    let result = full().parse(&enveloped_reply(), ParseMode::Final);

    assert_eq!(result.display_text, "Hi **there**!  and  done");
    assert!(!result.is_awaiting_more_input);
    assert_eq!(payload_types(&result.payloads), vec!["tool-carousel", "artifact"]);
    match &result.payloads[1] {
        StructuredPayload::Artifact(artifact) => {
            assert_eq!(artifact.artifact_type, "note");
            assert_eq!(artifact.data["x"], 1);
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn test_prefixes_never_invent_or_leak() {
    let pipeline = full();
    let raw = enveloped_reply();
    let final_ids: HashSet<String> =
        identities(&pipeline.parse(&raw, ParseMode::Final).payloads)
            .into_iter()
            .collect();
    assert_eq!(final_ids.len(), 2);

    for chunk_size in 1..=7 {
        let results = parse_prefixes(&pipeline, &raw, chunk_size);

        for result in &results {
            for id in identities(&result.payloads) {
                assert!(final_ids.contains(&id), "unexpected identity {id} at chunk size {chunk_size}");
            }
            for leaked in ["route", "[tool", "[artifact", "\"items\""] {
                assert!(
                    !result.display_text.contains(leaked),
                    "leaked {leaked:?} in {:?} at chunk size {chunk_size}",
                    result.display_text
                );
            }
        }

        // Payload lists only ever grow, in order
        for pair in results.windows(2) {
            let before = identities(&pair[0].payloads);
            let after = identities(&pair[1].payloads);
            assert!(after.starts_with(&before), "payloads reordered at chunk size {chunk_size}");
        }
    }
}

#[test]
fn test_json_inside_unclosed_tool_tag_is_not_sniffed() {
    let raw = format!("Here [tool:carousel]{CAROUSEL_JSON}");
    let result = full().parse(&raw, ParseMode::Streaming);
    assert_eq!(result.display_text, "Here");
    assert!(result.payloads.is_empty());
    assert!(result.is_awaiting_more_input);
}

#[test]
fn test_final_pass_forces_awaiting_off() {
    let pipeline = full();
    for raw in ["hello [tool:carou", r#"{"route":"a","response":"Hal"#, "see ["] {
        let result = pipeline.parse(raw, ParseMode::Final);
        assert!(!result.is_awaiting_more_input, "input {raw:?}");
    }
    assert_eq!(pipeline.parse("hello [tool:carou", ParseMode::Final).display_text, "hello");
    assert_eq!(pipeline.parse("see [", ParseMode::Final).display_text, "see [");
}

#[test]
fn test_router_cases_through_pipeline() {
    let pipeline = full();
    let result = pipeline.parse(r#"{"route":"general","response":"Hi there"}"#, ParseMode::Streaming);
    assert_eq!(result.display_text, "Hi there");
    assert!(!result.is_awaiting_more_input);

    let result = pipeline.parse(r#"{"route":"x","response":""}"} more text"#, ParseMode::Final);
    assert_eq!(result.display_text, "more text");

    let result = pipeline.parse(r#"{"route":"general","#, ParseMode::Streaming);
    assert_eq!(result.display_text, "");
    assert!(result.is_awaiting_more_input);
}

#[test]
fn test_disabled_stages_pass_text_through() {
    let pipeline = ContentPipeline::from_config(&PipelineConfig {
        router_envelope: false,
        embedded_json: false,
        bbcode: false,
    });
    let result = pipeline.parse(&format!("[b]x[/b] {CAROUSEL_JSON}"), ParseMode::Final);
    assert_eq!(result.display_text, format!("[b]x[/b] {CAROUSEL_JSON}"));
    assert!(result.payloads.is_empty());
}

#[test]
fn test_malformed_artifact_payload() {
    let result = full().parse("[artifact]not json[/artifact]", ParseMode::Final);
    assert_eq!(result.display_text, "");
    match &result.payloads[..] {
        [StructuredPayload::Artifact(artifact)] => assert_eq!(artifact.data["raw"], "not json"),
        other => panic!("unexpected payloads {other:?}"),
    }
}

#[test]
fn test_accented_text_after_brackets_streams() {
    let pipeline = full();
    let text = "Preço [ótimo] e [b]ação[/b] já";
    let results = parse_prefixes(&pipeline, text, 1);
    assert_eq!(results.len(), text.chars().count());

    let result = pipeline.parse(text, ParseMode::Final);
    assert_eq!(result.display_text, "Preço [ótimo] e **ação** já");
    assert!(result.payloads.is_empty());
}
