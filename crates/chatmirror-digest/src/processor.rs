//! Runs chunks through the extraction service and merges the results.
//!
//! Chunks are processed one at a time, in document order. Any chunk whose
//! reply cannot be parsed aborts the run. The executive summary is a
//! separate call over the aggregate; if it fails the digest keeps a
//! placeholder instead.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::{info, warn};

use chatmirror_core::MirrorResult;

use crate::chunk::split_chunks;
use crate::extraction::{parse_extraction, AggregateExtraction, ExtractionResult};
use crate::service::ExtractionService;

pub const DEFAULT_MAX_CHUNK_CHARS: usize = 12_000;
pub const SUMMARY_PLACEHOLDER: &str = "Summary unavailable: the summarization request failed.";
pub const EMPTY_SUMMARY: &str = "No messages to summarize.";

const EXTRACTION_TEMPLATE: &str = r#"You are analyzing part {index} of {total} of an exported team conversation titled "{title}".

Extract the following and reply with a single JSON object, no other text:
{
  "topics": ["short topic names"],
  "decisions": [{"summary": "", "details": "", "participants": [""]}],
  "actionItems": [{"task": "", "owner": "", "context": ""}],
  "contextSummaries": [{"timeframe": "", "topic": "", "summary": "", "keyPoints": [""]}],
  "technicalDetails": [{"type": "code|config|command|link|other", "content": "", "context": ""}],
  "participants": [{"name": "", "role": ""}]
}

Use empty lists where nothing applies. Conversation excerpt:

{chunk}"#;

const SUMMARY_TEMPLATE: &str = r#"Write a short executive summary (two or three paragraphs of plain prose) of the team conversation titled "{title}", based on these extracted notes:

{notes}"#;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([a-z]+)\}").expect("placeholder pattern"));

/// Substitute `{name}` placeholders in one pass, so substituted text is never
/// scanned again. Unknown names are left as they are.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            values
                .iter()
                .find(|(name, _)| *name == &caps[1])
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Full result of digesting one export.
#[derive(Debug, Clone, PartialEq)]
pub struct Digest {
    pub title: String,
    pub aggregate: AggregateExtraction,
    pub summary: String,
    /// Set when `summary` is the placeholder.
    pub summary_degraded: bool,
    pub chunk_count: usize,
}

pub struct SegmentProcessor<'a> {
    service: &'a dyn ExtractionService,
    max_chunk_chars: usize,
}

impl<'a> SegmentProcessor<'a> {
    pub fn new(service: &'a dyn ExtractionService, max_chunk_chars: usize) -> Self {
        Self {
            service,
            max_chunk_chars: max_chunk_chars.max(1),
        }
    }

    /// Extract structured data from one chunk.
    pub async fn process_chunk(
        &self,
        title: &str,
        chunk: &str,
        index: usize,
        total: usize,
    ) -> MirrorResult<ExtractionResult> {
        let index_text = (index + 1).to_string();
        let total_text = total.to_string();
        let prompt = fill(
            EXTRACTION_TEMPLATE,
            &[
                ("index", &index_text),
                ("total", &total_text),
                ("title", title),
                ("chunk", chunk),
            ],
        );
        let reply = self.service.complete(&prompt).await?;
        parse_extraction(&reply, index)
    }

    /// Split `body`, extract every chunk in order and summarize the result.
    pub async fn digest(&self, title: &str, body: &str) -> MirrorResult<Digest> {
        let chunks = split_chunks(body, self.max_chunk_chars);
        let total = chunks.len();
        info!("Digesting {:?}: {} chunks", title, total);

        let mut aggregate = AggregateExtraction::default();
        for (index, chunk) in chunks.iter().enumerate() {
            let result = self.process_chunk(title, chunk, index, total).await?;
            info!(
                "Chunk {}/{}: {} topics, {} decisions, {} action items",
                index + 1,
                total,
                result.topics.len(),
                result.decisions.len(),
                result.action_items.len()
            );
            aggregate.merge(result);
        }

        let (summary, summary_degraded) = if total == 0 {
            (EMPTY_SUMMARY.to_string(), false)
        } else {
            self.summarize(title, &aggregate).await
        };

        Ok(Digest {
            title: title.to_string(),
            aggregate,
            summary,
            summary_degraded,
            chunk_count: total,
        })
    }

    /// Prose summary of the aggregate. Never fails; returns the placeholder
    /// and `true` when the service call does.
    pub async fn summarize(&self, title: &str, aggregate: &AggregateExtraction) -> (String, bool) {
        let notes = match serde_json::to_string_pretty(aggregate) {
            Ok(notes) => notes,
            Err(e) => {
                warn!("Could not serialize notes for summary, using placeholder (degraded): {}", e);
                return (SUMMARY_PLACEHOLDER.to_string(), true);
            }
        };
        let prompt = fill(SUMMARY_TEMPLATE, &[("title", title), ("notes", &notes)]);

        match self.service.complete(&prompt).await {
            Ok(reply) if !reply.trim().is_empty() => (reply.trim().to_string(), false),
            Ok(_) => {
                warn!("Summary reply was empty, using placeholder (degraded)");
                (SUMMARY_PLACEHOLDER.to_string(), true)
            }
            Err(e) => {
                warn!("Summary request failed, using placeholder (degraded): {}", e);
                (SUMMARY_PLACEHOLDER.to_string(), true)
            }
        }
    }
}
