//! Date-section chunker.
//!
//! Splits an export body into chunks no larger than `max_chars`, cutting only
//! at date-section headings. Sections are packed greedily; a section that is
//! larger than the budget on its own becomes a single oversized chunk. Text
//! before the first heading is treated as its own section.

use chatmirror_core::SECTION_PREFIX;
use tracing::debug;

/// Split `body` into chunks along date-section boundaries.
///
/// Returns no chunks for blank input, and the whole body as one chunk when
/// it has no section headings.
pub fn split_chunks(body: &str, max_chars: usize) -> Vec<String> {
    if body.trim().is_empty() {
        return Vec::new();
    }

    let sections = split_sections(body);
    if sections.len() <= 1 {
        return vec![body.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for section in sections {
        let section_chars = section.chars().count();
        if !current.is_empty() && current_chars + section_chars > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        if section_chars > max_chars {
            debug!(
                "Section of {} chars exceeds chunk budget of {}; keeping it whole",
                section_chars, max_chars
            );
        }
        current.push_str(section);
        current_chars += section_chars;
    }
    if !current.trim().is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Slices of `body`, each starting at a section heading (except possibly
/// the first). Concatenating them yields `body` exactly.
fn split_sections(body: &str) -> Vec<&str> {
    let mut starts = Vec::new();
    let mut offset = 0;
    for line in body.split_inclusive('\n') {
        if line.starts_with(SECTION_PREFIX) {
            starts.push(offset);
        }
        offset += line.len();
    }

    if starts.first() != Some(&0) {
        starts.insert(0, 0);
    }

    let mut sections = Vec::with_capacity(starts.len());
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(body.len());
        let slice = &body[start..end];
        if !slice.trim().is_empty() {
            sections.push(slice);
        }
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(day: u32, messages: usize) -> String {
        let mut out = format!("## Monday, January {}, 2024\n\n", day);
        for i in 0..messages {
            out.push_str(&format!("### Ann (09:{:02})\nmessage number {}\n\n", i, i));
        }
        out
    }

    fn headings(chunk: &str) -> usize {
        chunk.lines().filter(|l| l.starts_with(SECTION_PREFIX)).count()
    }

    #[test]
    fn test_empty_body_has_no_chunks() {
        assert!(split_chunks("", 100).is_empty());
        assert!(split_chunks("\n\n", 100).is_empty());
    }

    #[test]
    fn test_body_without_sections_is_one_chunk() {
        let body = "just some text\nwith lines\n";
        assert_eq!(split_chunks(body, 5), vec![body.to_string()]);
    }

    #[test]
    fn test_sections_are_packed_within_budget() {
        let parts: Vec<String> = (1..=6).map(|d| section(d, 3)).collect();
        let body = parts.concat();
        let budget = parts[0].len() * 2 + 1;

        let chunks = split_chunks(&body, budget);
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert!(chunk.len() <= budget);
            assert_eq!(headings(chunk), 2);
        }
        assert_eq!(chunks.concat(), body);
    }

    #[test]
    fn test_no_section_is_split_across_chunks() {
        let parts: Vec<String> = vec![section(1, 2), section(2, 9), section(3, 1), section(4, 5)];
        let body = parts.concat();
        let chunks = split_chunks(&body, 300);

        for part in &parts {
            let holders = chunks.iter().filter(|c| c.contains(part.as_str())).count();
            assert_eq!(holders, 1, "section must live wholly inside one chunk");
        }
    }

    #[test]
    fn test_oversized_section_is_its_own_chunk() {
        let small = section(1, 1);
        let huge = section(2, 40);
        let body = format!("{}{}{}", small, huge, small.replace("January 1", "January 3"));

        let chunks = split_chunks(&body, small.len() + 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1], huge);
        assert!(chunks[1].len() > small.len() + 10);
    }

    #[test]
    fn test_preamble_travels_with_first_section() {
        let body = format!("intro line\n\n{}", section(1, 1));
        let chunks = split_chunks(&body, 10_000);
        assert_eq!(chunks, vec![body.clone()]);
    }

    #[test]
    fn test_budget_counts_characters_not_bytes() {
        let day1 = format!("## Day 1

{}
", "é".repeat(40));
        let day2 = format!("## Day 2

{}
", "ü".repeat(40));
        let body = format!("{}{}", day1, day2);
        let budget = day1.chars().count() + day2.chars().count();
        assert!(body.len() > budget);

        assert_eq!(split_chunks(&body, budget), vec![body.clone()]);
    }
}
