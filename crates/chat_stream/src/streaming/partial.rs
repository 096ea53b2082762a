use super::{ParseMode, StageOutput, TransformStage};
use regex::Regex;
use std::sync::OnceLock;

const TOOL_OPENER: &str = "[tool:";
const ARTIFACT_OPENER: &str = "[artifact";
const TOOL_CLOSER: &str = "[/tool]";
const ARTIFACT_CLOSER: &str = "[/artifact]";

fn trailing_markup_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[/?[A-Za-z*]{0,10}(=[^\]\n]{0,200})?$").expect("valid trailing markup regex")
    })
}

/// Hides tags that have started but not finished.
///
/// Runs after complete tags were extracted, so any opener still present is
/// either unfinished or malformed. While streaming everything from such an
/// opener to the end is held back. On the final pass it is dropped.
pub struct PartialTagGuard {
    /// Also hold back a trailing, unterminated BBCode tag while streaming
    hold_markup: bool,
}

impl PartialTagGuard {
    pub fn new(hold_markup: bool) -> Self {
        Self { hold_markup }
    }

    /// Byte offset where the incomplete tail starts, if there is one
    fn cut_position(&self, text: &str, mode: ParseMode) -> Option<usize> {
        let lower = text.to_ascii_lowercase();

        if let Some(pos) = find_unclosed_opener(&lower) {
            return Some(pos);
        }

        if mode == ParseMode::Final {
            return None;
        }

        if let Some(pos) = trailing_opener_prefix(&lower) {
            return Some(pos);
        }

        if self.hold_markup {
            return trailing_markup_regex().find(text).map(|m| m.start());
        }

        None
    }
}

fn find_unclosed_opener(lower: &str) -> Option<usize> {
    lower
        .match_indices('[')
        .map(|(pos, _)| pos)
        .find(|&pos| is_unclosed_opener(lower, pos))
}

fn is_unclosed_opener(lower: &str, pos: usize) -> bool {
    let rest = &lower[pos..];

    if let Some(after) = rest.strip_prefix(TOOL_OPENER) {
        let name_end = after
            .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(after.len());
        let after_name = &after[name_end..];
        return (after_name.is_empty() || after_name.starts_with(']'))
            && !rest.contains(TOOL_CLOSER);
    }

    if let Some(after) = rest.strip_prefix(ARTIFACT_OPENER) {
        let opens = match after.chars().next() {
            None => true,
            Some(c) => c == ']' || c.is_whitespace(),
        };
        return opens && !rest.contains(ARTIFACT_CLOSER);
    }

    false
}

/// Start of a trailing strict prefix of an opener such as `[`, `[to`, `[artif`
fn trailing_opener_prefix(lower: &str) -> Option<usize> {
    let mut earliest: Option<usize> = None;
    for opener in [TOOL_OPENER, ARTIFACT_OPENER] {
        for len in 1..opener.len() {
            if lower.ends_with(&opener[..len]) {
                let pos = lower.len() - len;
                earliest = Some(earliest.map_or(pos, |e| e.min(pos)));
            }
        }
    }
    earliest
}

impl TransformStage for PartialTagGuard {
    fn name(&self) -> &'static str {
        "partial-tag-guard"
    }

    fn apply(&self, text: &str, mode: ParseMode) -> StageOutput {
        match self.cut_position(text, mode) {
            Some(pos) => StageOutput {
                text: text[..pos].to_string(),
                payloads: Vec::new(),
                awaiting: mode == ParseMode::Streaming,
            },
            None => StageOutput::text(text),
        }
    }
}
