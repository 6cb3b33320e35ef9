//! Message normalizer: one remote message -> the lines of one message block.
//!
//! A rendered block always starts with a line beginning with
//! [`MESSAGE_PREFIX`]. Body lines that would start with `#` are escaped, so
//! the number of message blocks in a document can be counted by prefix.

use chrono::{FixedOffset, Offset, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::message::{Attachment, ContentType, MemberDirectory, Message};

pub const MESSAGE_PREFIX: &str = "### ";
pub const UNKNOWN_SENDER: &str = "Unknown User";

static LINE_BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("line break pattern"));
static PARAGRAPH_END_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</p\s*>").expect("paragraph pattern"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag pattern"));

/// Rendering switches shared by the normalizer and the date grouper.
#[derive(Debug, Clone)]
pub struct FormatOptions {
    /// Append `(HH:MM)` to the sender line.
    pub include_timestamp: bool,
    /// Offset used for calendar dates and clock times.
    pub offset: FixedOffset,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            include_timestamp: true,
            offset: Utc.fix(),
        }
    }
}

impl FormatOptions {
    pub fn with_local_offset(include_timestamp: bool) -> Self {
        Self {
            include_timestamp,
            offset: *chrono::Local::now().offset(),
        }
    }

    pub fn with_offset_minutes(include_timestamp: bool, minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(minutes * 60).unwrap_or_else(|| Self::default().offset);
        Self {
            include_timestamp,
            offset,
        }
    }
}

/// The text lines of one message block, without a trailing newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub lines: Vec<String>,
}

impl RenderedMessage {
    pub fn to_text(&self) -> String {
        self.lines.join("\n")
    }
}

/// Embedded display name, then directory lookup, then [`UNKNOWN_SENDER`].
pub fn resolve_sender(message: &Message, directory: &MemberDirectory) -> String {
    if let Some(name) = message
        .sender
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
    {
        return name.to_string();
    }

    message
        .sender
        .id
        .as_deref()
        .and_then(|id| directory.get(id))
        .map(|n| n.to_string())
        .unwrap_or_else(|| UNKNOWN_SENDER.to_string())
}

/// Strip markup down to plain text. Plain content passes through unchanged.
pub fn clean_content(content: &str, content_type: ContentType) -> String {
    match content_type {
        ContentType::Text => content.to_string(),
        ContentType::Html => strip_markup(content),
    }
}

fn strip_markup(html: &str) -> String {
    let text = LINE_BREAK_RE.replace_all(html, "\n");
    let text = PARAGRAPH_END_RE.replace_all(&text, "\n\n");
    let text = TAG_RE.replace_all(&text, "");

    // &amp; last, so "&amp;lt;" decodes to "&lt;" and not "<".
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

/// Render one message into its block lines.
pub fn format_message(
    message: &Message,
    directory: &MemberDirectory,
    options: &FormatOptions,
) -> RenderedMessage {
    let sender = resolve_sender(message, directory);
    let mut lines = Vec::new();

    if options.include_timestamp {
        let local = message.created_at.with_timezone(&options.offset);
        lines.push(format!("{}{} ({})", MESSAGE_PREFIX, sender, local.format("%H:%M")));
    } else {
        lines.push(format!("{}{}", MESSAGE_PREFIX, sender));
    }

    let content = clean_content(&message.body.content, message.body.content_type);
    for line in content.lines() {
        lines.push(escape_marker(line));
    }

    if !message.attachments.is_empty() {
        lines.push(String::new());
        lines.push("**Attachments:**".to_string());
        for attachment in &message.attachments {
            lines.push(format!("- {}", attachment_label(attachment)));
        }
    }

    if !message.reactions.is_empty() {
        let kinds = message
            .reactions
            .iter()
            .map(|r| r.kind.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(String::new());
        lines.push(format!("*Reactions: {}*", kinds));
    }

    RenderedMessage { lines }
}

fn attachment_label(attachment: &Attachment) -> &str {
    attachment
        .name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .or(attachment.kind.as_deref())
        .unwrap_or("attachment")
}

fn escape_marker(line: &str) -> String {
    if line.starts_with('#') {
        format!("\\{}", line)
    } else {
        line.to_string()
    }
}
