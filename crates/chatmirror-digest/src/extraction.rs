//! Structured extraction results and their aggregation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use chatmirror_core::{MirrorError, MirrorResult};

/// Longest slice of a bad reply kept in [`MirrorError::ExtractionParse`].
pub const RAW_EXCERPT_CHARS: usize = 500;

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n(.*)```").expect("fenced block pattern")
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub participants: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionItem {
    #[serde(default)]
    pub task: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSummary {
    #[serde(default)]
    pub timeframe: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalDetail {
    /// Free-form category such as `code`, `config` or `command`.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
}

/// What the extraction service returns for one chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractionResult {
    pub topics: Vec<String>,
    pub decisions: Vec<Decision>,
    pub action_items: Vec<ActionItem>,
    pub context_summaries: Vec<ContextSummary>,
    pub technical_details: Vec<TechnicalDetail>,
    pub participants: Vec<Participant>,
}

/// Results of every chunk merged in chunk order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateExtraction {
    /// Distinct topics in first-seen order.
    pub topics: Vec<String>,
    pub decisions: Vec<Decision>,
    pub action_items: Vec<ActionItem>,
    pub context_summaries: Vec<ContextSummary>,
    pub technical_details: Vec<TechnicalDetail>,
    pub participants: Vec<Participant>,
}

impl AggregateExtraction {
    /// Merge one chunk's result. Call in chunk order.
    pub fn merge(&mut self, result: ExtractionResult) {
        for topic in result.topics {
            let topic = topic.trim().to_string();
            if !topic.is_empty() && !self.topics.contains(&topic) {
                self.topics.push(topic);
            }
        }
        self.decisions.extend(result.decisions);
        self.action_items.extend(result.action_items);
        self.context_summaries.extend(result.context_summaries);
        self.technical_details.extend(result.technical_details);
        self.participants.extend(result.participants);
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
            && self.decisions.is_empty()
            && self.action_items.is_empty()
            && self.context_summaries.is_empty()
            && self.technical_details.is_empty()
            && self.participants.is_empty()
    }
}

impl FromIterator<ExtractionResult> for AggregateExtraction {
    fn from_iter<I: IntoIterator<Item = ExtractionResult>>(iter: I) -> Self {
        let mut aggregate = Self::default();
        for result in iter {
            aggregate.merge(result);
        }
        aggregate
    }
}

/// Parse an extraction reply for chunk `chunk_index`.
///
/// The JSON object may be wrapped in a fenced code block or appear bare,
/// possibly surrounded by prose. Missing collections default to empty.
pub fn parse_extraction(raw: &str, chunk_index: usize) -> MirrorResult<ExtractionResult> {
    let fenced = FENCED_BLOCK
        .captures(raw)
        .and_then(|c| c.get(1))
        .and_then(|m| object_span(m.as_str()));
    let bare = object_span(raw);

    let mut last_error = None;
    for payload in [fenced, bare].into_iter().flatten() {
        match serde_json::from_str::<ExtractionResult>(payload) {
            Ok(result) => return Ok(result),
            Err(e) => last_error = Some(e.to_string()),
        }
    }
    let reason = last_error.unwrap_or_else(|| "no JSON object found".to_string());
    Err(parse_error(raw, chunk_index, &reason))
}

/// From the first `{` to the last `}`.
fn object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn parse_error(raw: &str, chunk_index: usize, reason: &str) -> MirrorError {
    MirrorError::ExtractionParse {
        chunk_index,
        reason: reason.to_string(),
        raw_excerpt: raw.chars().take(RAW_EXCERPT_CHARS).collect(),
    }
}
