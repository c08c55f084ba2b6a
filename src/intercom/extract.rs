//! Plain-text extraction from conversation parts.

use std::sync::OnceLock;

use regex::Regex;

use super::types::ConversationPart;

/// Result of one read: extracted texts plus the advanced watermark.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadBatch {
    pub messages: Vec<String>,
    pub last_time: i64,
}

fn paragraph_regex() -> &'static Regex {
    static PARAGRAPH: OnceLock<Regex> = OnceLock::new();
    PARAGRAPH.get_or_init(|| Regex::new(r"<p[^>]*>(.+?)</p>").expect("Invalid paragraph regex"))
}

/// Inner text of the first single-line `<p>` element in `body`.
pub fn extract_paragraph(body: &str) -> Option<&str> {
    paragraph_regex()
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Turn already-filtered parts into forwarded texts and a new watermark.
///
/// Parts without an extractable paragraph are dropped but still move the
/// watermark. The watermark never goes backwards.
pub fn extract_batch(parts: &[ConversationPart], watermark: i64) -> ReadBatch {
    let mut last_time = watermark;
    let mut messages = Vec::new();
    for part in parts {
        last_time = last_time.max(part.created_at);
        if let Some(text) = part.body.as_deref().and_then(extract_paragraph) {
            messages.push(text.to_string());
        }
    }
    ReadBatch {
        messages,
        last_time,
    }
}
