use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Language assigned to a fenced block whose opening fence carries no tag.
pub const DEFAULT_LANGUAGE: &str = "javascript";

// Opening fence with optional word tag, then the shortest body up to the next
// fence. A newline right after the closing fence is part of the fence.
static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(\w+)?\n(.*?)```\n?").expect("fence pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Segment<'a> {
    Text { content: &'a str },
    Code { language: &'a str, content: &'a str },
}

impl<'a> Segment<'a> {
    pub fn content(&self) -> &'a str {
        match self {
            Segment::Text { content } | Segment::Code { content, .. } => content,
        }
    }

    pub fn is_code(&self) -> bool {
        matches!(self, Segment::Code { .. })
    }
}

/// Splits a message body into prose and fenced code, in order of appearance.
pub fn segment(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut last = 0;
    for caps in FENCE.captures_iter(text) {
        let whole = caps.get(0).expect("group 0 always matches");
        if whole.start() > last {
            segments.push(Segment::Text {
                content: &text[last..whole.start()],
            });
        }
        segments.push(Segment::Code {
            language: caps.get(1).map_or(DEFAULT_LANGUAGE, |m| m.as_str()),
            content: caps.get(2).map_or("", |m| m.as_str()),
        });
        last = whole.end();
    }
    if segments.is_empty() {
        return vec![Segment::Text { content: text }];
    }
    if last < text.len() {
        segments.push(Segment::Text {
            content: &text[last..],
        });
    }
    segments
}
