//! The export header: a fixed, ordered list of `**Label:** value` fields
//! ended by a `---` line.
//!
//! [`ExportHeader::to_text`] and [`ExportHeader::parse`] are the only code
//! that reads or writes these lines.

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

pub const TITLE_PREFIX: &str = "# Conversation Export: ";
pub const HEADER_TERMINATOR: &str = "---";

const UNKNOWN_VALUE: &str = "unknown";

/// Recognized header fields, in write order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderField {
    Topic,
    ChatType,
    Source,
    Created,
    TotalMessages,
    LastSync,
}

impl HeaderField {
    pub const ALL: [HeaderField; 6] = [
        HeaderField::Topic,
        HeaderField::ChatType,
        HeaderField::Source,
        HeaderField::Created,
        HeaderField::TotalMessages,
        HeaderField::LastSync,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            HeaderField::Topic => "Topic",
            HeaderField::ChatType => "Chat Type",
            HeaderField::Source => "Source",
            HeaderField::Created => "Created",
            HeaderField::TotalMessages => "Total Messages",
            HeaderField::LastSync => "Last Sync",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.label() == label)
    }
}

/// Parsed header state of an export document.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportHeader {
    pub topic: String,
    pub chat_type: String,
    /// `SourceRef` display form, e.g. `chat:19:abc@thread.v2`.
    pub source: String,
    /// Creation instant of the remote conversation.
    pub created_at: Option<DateTime<Utc>>,
    /// Number of message blocks in the body.
    pub total_message_count: usize,
    /// Instant of the most recent successful sync. `None` forces a full fetch.
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl ExportHeader {
    pub fn to_text(&self) -> String {
        let mut out = format!("{}{}\n\n", TITLE_PREFIX, self.topic);
        for field in HeaderField::ALL {
            out.push_str(&format!("**{}:** {}\n", field.label(), self.value_of(field)));
        }
        out.push('\n');
        out.push_str(HEADER_TERMINATOR);
        out.push('\n');
        out
    }

    fn value_of(&self, field: HeaderField) -> String {
        match field {
            HeaderField::Topic => self.topic.clone(),
            HeaderField::ChatType => self.chat_type.clone(),
            HeaderField::Source => self.source.clone(),
            HeaderField::Created => format_instant(self.created_at),
            HeaderField::TotalMessages => self.total_message_count.to_string(),
            HeaderField::LastSync => format_instant(self.last_sync_at),
        }
    }

    /// Parse header lines up to the terminator.
    ///
    /// Returns `None` when the terminator, `Source` or a numeric
    /// `Total Messages` is missing. An unparseable `Last Sync` or `Created`
    /// becomes `None` rather than an error.
    pub fn parse<'a, I>(lines: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut topic = None;
        let mut chat_type = None;
        let mut source = None;
        let mut created_at = None;
        let mut total = None;
        let mut last_sync_at = None;
        let mut terminated = false;

        for line in lines {
            let line = line.trim_end_matches('\r');
            if line.trim() == HEADER_TERMINATOR {
                terminated = true;
                break;
            }
            let Some((field, value)) = split_field(line) else {
                continue;
            };
            match field {
                HeaderField::Topic => topic = Some(value.to_string()),
                HeaderField::ChatType => chat_type = Some(value.to_string()),
                HeaderField::Source => source = Some(value.to_string()),
                HeaderField::Created => created_at = parse_instant(value),
                HeaderField::TotalMessages => total = value.parse::<usize>().ok(),
                HeaderField::LastSync => {
                    last_sync_at = parse_instant(value);
                    if last_sync_at.is_none() && value != UNKNOWN_VALUE {
                        warn!("Unparseable Last Sync value {:?}; treating as absent", value);
                    }
                }
            }
        }

        if !terminated {
            return None;
        }

        Some(Self {
            topic: topic.unwrap_or_default(),
            chat_type: chat_type.unwrap_or_default(),
            source: source?,
            created_at,
            total_message_count: total?,
            last_sync_at,
        })
    }
}

fn split_field(line: &str) -> Option<(HeaderField, &str)> {
    let rest = line.trim().strip_prefix("**")?;
    let (label, value) = rest.split_once(":**")?;
    let field = HeaderField::from_label(label.trim())?;
    Some((field, value.trim()))
}

fn format_instant(instant: Option<DateTime<Utc>>) -> String {
    instant
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| UNKNOWN_VALUE.to_string())
}

fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> ExportHeader {
        ExportHeader {
            topic: "Release planning".to_string(),
            chat_type: "group".to_string(),
            source: "chat:19:abc@thread.v2".to_string(),
            created_at: Some(Utc.with_ymd_and_hms(2023, 6, 1, 8, 0, 0).unwrap()),
            total_message_count: 42,
            last_sync_at: Some(Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap()),
        }
    }

    #[test]
    fn test_header_text_layout() {
        let text = sample().to_text();
        assert_eq!(
            text,
            "# Conversation Export: Release planning\n\n\
             **Topic:** Release planning\n\
             **Chat Type:** group\n\
             **Source:** chat:19:abc@thread.v2\n\
             **Created:** 2023-06-01T08:00:00.000Z\n\
             **Total Messages:** 42\n\
             **Last Sync:** 2024-02-03T04:05:06.000Z\n\
             \n---\n"
        );
    }

    #[test]
    fn test_parse_reads_what_to_text_writes() {
        let header = sample();
        let text = header.to_text();
        assert_eq!(ExportHeader::parse(text.lines()), Some(header));
    }

    #[test]
    fn test_bad_last_sync_is_absent() {
        let text = sample().to_text().replace("2024-02-03T04:05:06.000Z", "last tuesday");
        let parsed = ExportHeader::parse(text.lines()).unwrap();
        assert_eq!(parsed.last_sync_at, None);
        assert_eq!(parsed.total_message_count, 42);
    }

    #[test]
    fn test_parse_stops_at_terminator() {
        let text = format!("{}\n**Total Messages:** 7\n", sample().to_text());
        let parsed = ExportHeader::parse(text.lines()).unwrap();
        assert_eq!(parsed.total_message_count, 42);
    }

    #[test]
    fn test_unrecognizable_header() {
        assert_eq!(ExportHeader::parse("just some notes\n".lines()), None);
        let no_count = "**Source:** chat:x\n---\n";
        assert_eq!(ExportHeader::parse(no_count.lines()), None);
    }
}
