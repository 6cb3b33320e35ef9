//! Date grouping: chronological messages -> ordered calendar-date sections.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::message::{MemberDirectory, Message};
use crate::normalize::{format_message, FormatOptions};

pub const SECTION_PREFIX: &str = "## ";

/// Messages sharing one calendar date, in input order.
#[derive(Debug, Clone)]
pub struct DateSection<'a> {
    pub date: NaiveDate,
    pub label: String,
    /// Timestamp of the message that opened this section.
    pub opened_at: DateTime<Utc>,
    pub messages: Vec<&'a Message>,
}

/// The heading text used for a date, e.g. `Monday, March 4, 2024`.
pub fn date_label(date: NaiveDate) -> String {
    date.format("%A, %B %-d, %Y").to_string()
}

/// Group messages by calendar date in `options.offset`.
///
/// Sections are ordered by the timestamp that opened them, never by the
/// label text, so label formats that do not sort lexically stay correct.
pub fn group_by_date<'a>(messages: &'a [Message], options: &FormatOptions) -> Vec<DateSection<'a>> {
    let mut index_by_date: HashMap<NaiveDate, usize> = HashMap::new();
    let mut sections: Vec<DateSection<'a>> = Vec::new();

    for message in messages {
        let date = message.created_at.with_timezone(&options.offset).date_naive();
        match index_by_date.get(&date).copied() {
            Some(idx) => {
                let section = &mut sections[idx];
                if message.created_at < section.opened_at {
                    section.opened_at = message.created_at;
                }
                section.messages.push(message);
            }
            None => {
                index_by_date.insert(date, sections.len());
                sections.push(DateSection {
                    date,
                    label: date_label(date),
                    opened_at: message.created_at,
                    messages: vec![message],
                });
            }
        }
    }

    sections.sort_by_key(|s| s.opened_at);
    sections
}

/// Render one section. With `with_heading == false` only the message blocks
/// are emitted, for continuing a section that already has its heading.
pub fn render_section(
    section: &DateSection<'_>,
    directory: &MemberDirectory,
    options: &FormatOptions,
    with_heading: bool,
) -> String {
    let mut out = String::new();
    if with_heading {
        out.push_str(SECTION_PREFIX);
        out.push_str(&section.label);
        out.push_str("\n\n");
    }

    let blocks = section
        .messages
        .iter()
        .map(|m| format_message(m, directory, options).to_text())
        .collect::<Vec<_>>();
    out.push_str(&blocks.join("\n\n"));
    out.push('\n');
    out
}

/// Render all sections, blank-line separated.
pub fn render_sections(
    sections: &[DateSection<'_>],
    directory: &MemberDirectory,
    options: &FormatOptions,
) -> String {
    sections
        .iter()
        .map(|s| render_section(s, directory, options, true))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageBody, Sender};
    use chrono::{FixedOffset, TimeZone};

    fn msg(id: &str, at: DateTime<Utc>) -> Message {
        Message {
            id: id.to_string(),
            created_at: at,
            sender: Sender {
                id: None,
                display_name: Some("Alice".to_string()),
            },
            body: MessageBody::text(format!("message {}", id)),
            attachments: Vec::new(),
            reactions: Vec::new(),
        }
    }

    #[test]
    fn test_groups_preserve_input_order() {
        let messages = vec![
            msg("a", Utc.with_ymd_and_hms(2024, 1, 9, 23, 0, 0).unwrap()),
            msg("b", Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap()),
            msg("c", Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap()),
        ];
        let sections = group_by_date(&messages, &FormatOptions::default());
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].label, "Tuesday, January 9, 2024");
        assert_eq!(sections[1].label, "Wednesday, January 10, 2024");
        let ids: Vec<_> = sections[1].messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_sections_ordered_by_time_not_label() {
        // "December" sorts before "November" lexically.
        let messages = vec![
            msg("nov", Utc.with_ymd_and_hms(2023, 11, 30, 12, 0, 0).unwrap()),
            msg("dec", Utc.with_ymd_and_hms(2023, 12, 1, 12, 0, 0).unwrap()),
        ];
        let sections = group_by_date(&messages, &FormatOptions::default());
        assert_eq!(sections[0].messages[0].id, "nov");
        assert_eq!(sections[1].messages[0].id, "dec");
    }

    #[test]
    fn test_offset_moves_date_boundary() {
        let messages = vec![msg("late", Utc.with_ymd_and_hms(2024, 1, 9, 23, 30, 0).unwrap())];
        let options = FormatOptions {
            include_timestamp: true,
            offset: FixedOffset::east_opt(2 * 3600).unwrap(),
        };
        let sections = group_by_date(&messages, &options);
        assert_eq!(sections[0].label, "Wednesday, January 10, 2024");
    }

    #[test]
    fn test_render_sections_layout() {
        let messages = vec![
            msg("a", Utc.with_ymd_and_hms(2024, 1, 9, 10, 0, 0).unwrap()),
            msg("b", Utc.with_ymd_and_hms(2024, 1, 10, 11, 0, 0).unwrap()),
        ];
        let options = FormatOptions::default();
        let sections = group_by_date(&messages, &options);
        let text = render_sections(&sections, &MemberDirectory::new(), &options);
        assert_eq!(
            text,
            "## Tuesday, January 9, 2024\n\n### Alice (10:00)\nmessage a\n\n## Wednesday, January 10, 2024\n\n### Alice (11:00)\nmessage b\n"
        );
    }
}
