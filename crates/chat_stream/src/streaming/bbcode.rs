//! BBCode dialect to Markdown conversion

use super::{ParseMode, StageOutput, TransformStage};
use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Tags that start with one of the loose single-letter tags but are not one
const LONGER_TAGS: [&str; 14] = [
    "bbcode", "br", "code", "center", "color", "font", "img", "list", "quote", "right", "left",
    "size", "span", "url",
];

/// Plain pattern → replacement rules, applied in order
fn simple_rules() -> &'static [(Regex, &'static str)] {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            (r"(?i)\[br\s*/?\]", "\n"),
            (r"(?is)\[code\](.*?)\[/code\]", "\n```\n${1}\n```\n"),
            (r"(?is)\[bbcode\](.*?)\[/bbcode\]", "\n```\n${1}\n```\n"),
            (r"(?is)\[b\](.*?)\[/b\]", "**${1}**"),
            (r"(?is)\[i\](.*?)\[/i\]", "*${1}*"),
            (r"(?is)\[u\](.*?)\[/u\]", "<u>${1}</u>"),
            (r"(?is)\[s\](.*?)\[/s\]", "~~${1}~~"),
            (r"(?i)\[/?(?:center|left|right)\]", ""),
            (r"(?is)\[url\](.*?)\[/url\]", "<${1}>"),
            (r"(?is)\[url=([^\]]+)\](.*?)\[/url\]", "[${2}](${1})"),
            (r"(?is)\[img\](.*?)\[/img\]", "![](${1})"),
            (r"(?i)\[(?:color|size|font|span)(?:[=\s][^\]]*)?\]", ""),
            (r"(?i)\[/(?:color|size|font|span)\]", ""),
        ]
        .into_iter()
        .map(|(pattern, replacement)| {
            (
                Regex::new(pattern).expect("valid bbcode rule"),
                replacement,
            )
        })
        .collect()
    })
}

fn quote_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)\[quote(?:=([^\]]*))?\](.*?)\[/quote\]").expect("valid quote regex")
    })
}

fn list_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)\[list(=1)?\](.*?)\[/list\]").expect("valid list regex")
    })
}

fn blank_lines_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("valid blank line regex"))
}

/// Insert the missing `]` after loose `[b`, `[i`, `[u`, `[s` and their closers.
///
/// An opener is only repaired when a matching closer follows it somewhere.
fn normalize_loose_tags(text: &str) -> String {
    let lower = text.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut out = String::with_capacity(text.len() + 8);
    let mut last = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'[' {
            i += 1;
            continue;
        }
        let closing = bytes.get(i + 1) == Some(&b'/');
        let name_at = i + 1 + usize::from(closing);
        let Some(&name) = bytes.get(name_at) else {
            break;
        };
        let after = name_at + 1;

        // `name` is ASCII here, so `after` is a char boundary
        let loose = matches!(name, b'b' | b'i' | b'u' | b's') && bytes.get(after) != Some(&b']');
        let repair = loose
            && !LONGER_TAGS
                .iter()
                .any(|tag| lower[name_at..].starts_with(tag))
            && (closing || lower[after..].contains(&format!("[/{}", char::from(name))));

        if repair {
            out.push_str(&text[last..after]);
            out.push(']');
            last = after;
            i = after;
        } else {
            i += 1;
        }
    }

    out.push_str(&text[last..]);
    out
}

fn convert_quote(caps: &Captures) -> String {
    let body = caps.get(2).map_or("", |m| m.as_str()).trim();
    let quoted = body
        .lines()
        .map(|line| format!("> {line}"))
        .collect::<Vec<_>>()
        .join("\n");

    match caps.get(1).map(|m| m.as_str().trim()) {
        Some(author) if !author.is_empty() => format!("\n**{author}:**\n{quoted}\n"),
        _ => format!("\n{quoted}\n"),
    }
}

fn convert_list(caps: &Captures) -> String {
    let numbered = caps.get(1).is_some();
    let body = caps.get(2).map_or("", |m| m.as_str());
    let items = body
        .split("[*]")
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .enumerate()
        .map(|(index, item)| {
            if numbered {
                format!("{}. {item}", index + 1)
            } else {
                format!("- {item}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("\n{items}\n")
}

/// Convert BBCode markup to Markdown. The result is trimmed.
pub fn bbcode_to_markdown(text: &str) -> String {
    let mut out = normalize_loose_tags(text);

    for (regex, replacement) in simple_rules() {
        out = regex.replace_all(&out, *replacement).into_owned();
    }
    out = quote_regex().replace_all(&out, convert_quote).into_owned();
    out = list_regex().replace_all(&out, convert_list).into_owned();
    out = blank_lines_regex().replace_all(&out, "\n\n").into_owned();

    out.trim().to_string()
}

pub struct BbcodeStage;

impl TransformStage for BbcodeStage {
    fn name(&self) -> &'static str {
        "bbcode"
    }

    fn apply(&self, text: &str, _mode: ParseMode) -> StageOutput {
        StageOutput::text(bbcode_to_markdown(text))
    }
}
