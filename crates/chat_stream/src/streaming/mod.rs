//! Content pipeline for assistant responses
//!
//! The raw assistant buffer is run through an ordered list of stages on every
//! chunk. Each stage receives the text produced by the previous one, may pull
//! structured payloads out of it and may report that the tail of the text is
//! still incomplete. Stages are pure: the same input always yields the same
//! output, which is what makes re-parsing the whole buffer safe.

use crate::types::{ParseResult, StructuredPayload};
use serde::{Deserialize, Serialize};
use tracing::trace;

mod bbcode;
mod embedded;
pub mod identity;
mod partial;
mod router;
mod tags;

#[cfg(test)]
mod pipeline_tests;
#[cfg(test)]
pub(crate) mod test_utils;

pub use bbcode::{bbcode_to_markdown, BbcodeStage};
pub use embedded::{balanced_object_end, EmbeddedJsonStage};
pub use partial::PartialTagGuard;
pub use router::{unwrap_router_envelope, RouterEnvelopeStage, Unwrapped};
pub use tags::{extract_tags, TagExtractStage};

/// Whether more input may still arrive for the text being parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Mid-stream: incomplete syntax at the tail is held back
    Streaming,
    /// End of stream: dangling syntax is resolved for good
    Final,
}

/// What a single stage hands to the next one
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutput {
    pub text: String,
    pub payloads: Vec<StructuredPayload>,
    pub awaiting: bool,
}

impl StageOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Common trait for pipeline stages
pub trait TransformStage: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, text: &str, mode: ParseMode) -> StageOutput;
}

/// Which optional stages run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Unwrap `{"route":…,"response":…}` envelopes at the start of the buffer
    pub router_envelope: bool,
    /// Sniff carousel and property-card JSON written without tags
    pub embedded_json: bool,
    /// Convert the BBCode dialect to Markdown
    pub bbcode: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::full()
    }
}

impl PipelineConfig {
    /// Every stage enabled
    pub fn full() -> Self {
        Self {
            router_envelope: true,
            embedded_json: true,
            bbcode: true,
        }
    }

    /// Server-side rich parse: no markup conversion
    pub fn server() -> Self {
        Self {
            router_envelope: true,
            embedded_json: true,
            bbcode: false,
        }
    }

    /// Markup client: tags and BBCode only
    pub fn markup() -> Self {
        Self {
            router_envelope: false,
            embedded_json: false,
            bbcode: true,
        }
    }
}

/// Ordered list of stages
pub struct ContentPipeline {
    stages: Vec<Box<dyn TransformStage>>,
}

impl ContentPipeline {
    pub fn new(stages: Vec<Box<dyn TransformStage>>) -> Self {
        Self { stages }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        let mut stages: Vec<Box<dyn TransformStage>> = Vec::new();
        if config.router_envelope {
            stages.push(Box::new(RouterEnvelopeStage));
        }
        stages.push(Box::new(TagExtractStage));
        // The guard runs before the sniffer so JSON inside an unclosed
        // tool tag is never picked up as an untagged object.
        stages.push(Box::new(PartialTagGuard::new(config.bbcode)));
        if config.embedded_json {
            stages.push(Box::new(EmbeddedJsonStage));
        }
        if config.bbcode {
            stages.push(Box::new(BbcodeStage));
        }
        Self::new(stages)
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Run every stage over `raw`. The final pass never reports awaiting input.
    pub fn parse(&self, raw: &str, mode: ParseMode) -> ParseResult {
        let mut text = raw.to_string();
        let mut payloads = Vec::new();
        let mut awaiting = false;

        for stage in &self.stages {
            let output = stage.apply(&text, mode);
            if output.awaiting {
                trace!("Stage {} holds back an incomplete tail", stage.name());
            }
            awaiting |= output.awaiting;
            payloads.extend(output.payloads);
            text = output.text;
        }

        ParseResult {
            display_text: text.trim().to_string(),
            payloads,
            is_awaiting_more_input: awaiting && mode == ParseMode::Streaming,
        }
    }
}

impl Default for ContentPipeline {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}
