//! Whole export documents: header + date-sectioned body.

use chrono::{DateTime, Duration, Utc};

use chatmirror_core::{
    group_by_date, render_section, render_sections, ConversationInfo, FormatOptions,
    MemberDirectory, Message, SourceRef, MESSAGE_PREFIX, SECTION_PREFIX,
};

use crate::header::{ExportHeader, HEADER_TERMINATOR};

#[derive(Debug, Clone, PartialEq)]
pub struct ExportDocument {
    pub header: ExportHeader,
    /// Everything after the header terminator line, verbatim.
    pub body: String,
}

impl ExportDocument {
    /// Build a complete document for a first export or a full refresh.
    pub fn assemble(
        info: &ConversationInfo,
        source: &SourceRef,
        messages: &[Message],
        directory: &MemberDirectory,
        options: &FormatOptions,
        synced_at: DateTime<Utc>,
    ) -> Self {
        let sections = group_by_date(messages, options);
        let body = render_sections(&sections, directory, options);

        let header = ExportHeader {
            topic: single_line(&info.topic),
            chat_type: single_line(&info.descriptor),
            source: source.to_string(),
            created_at: info.created_at,
            total_message_count: messages.len(),
            last_sync_at: Some(sync_mark(None, synced_at, messages)),
        };

        Self { header, body }
    }

    pub fn to_text(&self) -> String {
        if self.body.is_empty() {
            return self.header.to_text();
        }
        format!("{}\n{}", self.header.to_text(), self.body)
    }

    /// Split a document at its header terminator and parse the header.
    pub fn parse(text: &str) -> Option<Self> {
        let header = ExportHeader::parse(text.lines())?;
        Some(Self {
            header,
            body: body_of(text).to_string(),
        })
    }

    /// Append messages after the existing body, updating count and sync time.
    ///
    /// When the first new date group has the same date as the last section
    /// already present, its heading is not repeated.
    pub fn append_messages(
        &mut self,
        messages: &[Message],
        directory: &MemberDirectory,
        options: &FormatOptions,
        synced_at: DateTime<Utc>,
    ) {
        if messages.is_empty() {
            return;
        }

        let sections = group_by_date(messages, options);
        let last_label = last_section_label(&self.body).map(|s| s.to_string());

        let mut addition = String::new();
        for (i, section) in sections.iter().enumerate() {
            let continues = i == 0 && last_label.as_deref() == Some(section.label.as_str());
            if !addition.is_empty() {
                addition.push('\n');
            }
            addition.push_str(&render_section(section, directory, options, !continues));
        }

        if !self.body.is_empty() {
            if !self.body.ends_with('\n') {
                self.body.push('\n');
            }
            self.body.push('\n');
        }
        self.body.push_str(&addition);

        self.header.total_message_count += messages.len();
        self.header.last_sync_at = Some(sync_mark(self.header.last_sync_at, synced_at, messages));
    }
}

/// The `Last Sync` to store after writing `messages`.
///
/// Never earlier than the previous mark, the run start, or any written
/// message, and rounded up to the millisecond the header can hold. A message
/// posted while the run was fetching is therefore not picked up again.
fn sync_mark(
    previous: Option<DateTime<Utc>>,
    synced_at: DateTime<Utc>,
    messages: &[Message],
) -> DateTime<Utc> {
    let newest = messages.iter().map(|m| m.created_at).max();
    let mark = [previous, Some(synced_at), newest]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(synced_at);
    ceil_to_millis(mark)
}

fn ceil_to_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    let sub_millis = t.timestamp_subsec_nanos() % 1_000_000;
    if sub_millis == 0 {
        t
    } else {
        t + Duration::nanoseconds(i64::from(1_000_000 - sub_millis))
    }
}

/// The text after the first header terminator line; empty if there is none.
pub fn body_of(text: &str) -> &str {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        offset += line.len();
        if line.trim() == HEADER_TERMINATOR {
            let rest = &text[offset..];
            return rest.strip_prefix('\n').unwrap_or(rest);
        }
    }
    ""
}

/// Number of message blocks in a body.
pub fn count_message_blocks(body: &str) -> usize {
    body.lines().filter(|l| l.starts_with(MESSAGE_PREFIX)).count()
}

/// Heading text of the last date section in a body.
pub fn last_section_label(body: &str) -> Option<&str> {
    body.lines()
        .rev()
        .find_map(|l| l.strip_prefix(SECTION_PREFIX))
        .map(str::trim)
}

fn single_line(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
