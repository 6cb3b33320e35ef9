//! Renders a [`Digest`] as readable documents or as JSONL records.

use serde::Serialize;
use serde_json::{json, Value};

use crate::extraction::{ContextSummary, Decision, TechnicalDetail};
use crate::processor::Digest;

/// The four documents of the structured output.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredDocs {
    pub main: String,
    pub topics: String,
    pub decisions: String,
    pub action_items: String,
}

/// One retrieval record of the semantic output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub content: String,
    pub metadata: Value,
}

pub fn render_structured(digest: &Digest) -> StructuredDocs {
    StructuredDocs {
        main: render_main(digest),
        topics: render_topics(digest),
        decisions: render_decisions(digest),
        action_items: render_action_items(digest),
    }
}

fn render_main(digest: &Digest) -> String {
    let agg = &digest.aggregate;
    let mut out = format!("# {}\n\n## Executive Summary\n\n{}\n", digest.title, digest.summary);

    out.push_str("\n## Overview\n\n");
    out.push_str(&format!("- Topics: {}\n", agg.topics.len()));
    out.push_str(&format!("- Decisions: {}\n", agg.decisions.len()));
    out.push_str(&format!("- Action items: {}\n", agg.action_items.len()));
    out.push_str(&format!("- Chunks analyzed: {}\n", digest.chunk_count));

    if !agg.participants.is_empty() {
        out.push_str("\n## Participants\n\n");
        for p in &agg.participants {
            match p.role.as_deref().filter(|r| !r.is_empty()) {
                Some(role) => out.push_str(&format!("- {} ({})\n", p.name, role)),
                None => out.push_str(&format!("- {}\n", p.name)),
            }
        }
    }

    if !agg.context_summaries.is_empty() {
        out.push_str("\n## Timeline\n");
        for summary in &agg.context_summaries {
            out.push_str(&format!("\n### {} ({})\n\n{}\n", summary.topic, summary.timeframe, summary.summary));
            for point in &summary.key_points {
                out.push_str(&format!("- {}\n", point));
            }
        }
    }

    if !agg.technical_details.is_empty() {
        out.push_str("\n## Technical Details\n");
        for detail in &agg.technical_details {
            out.push_str(&format!("\n**{}**: {}\n", detail.kind, detail.context));
            out.push_str(&format!("\n```\n{}\n```\n", detail.content));
        }
    }

    out
}

fn render_topics(digest: &Digest) -> String {
    let mut out = format!("# Topics: {}\n\n", digest.title);
    if digest.aggregate.topics.is_empty() {
        out.push_str("No topics identified.\n");
    }
    for topic in &digest.aggregate.topics {
        out.push_str(&format!("- {}\n", topic));
    }
    out
}

fn render_decisions(digest: &Digest) -> String {
    let mut out = format!("# Decisions: {}\n", digest.title);
    if digest.aggregate.decisions.is_empty() {
        out.push_str("\nNo decisions recorded.\n");
    }
    for (i, decision) in digest.aggregate.decisions.iter().enumerate() {
        out.push_str(&format!("\n## {}. {}\n", i + 1, decision.summary));
        if !decision.details.is_empty() {
            out.push_str(&format!("\n{}\n", decision.details));
        }
        if !decision.participants.is_empty() {
            out.push_str(&format!("\n*Participants: {}*\n", decision.participants.join(", ")));
        }
    }
    out
}

fn render_action_items(digest: &Digest) -> String {
    let mut out = format!("# Action Items: {}\n\n", digest.title);
    if digest.aggregate.action_items.is_empty() {
        out.push_str("No action items recorded.\n");
    }
    for item in &digest.aggregate.action_items {
        match item.owner.as_deref().filter(|o| !o.is_empty()) {
            Some(owner) => out.push_str(&format!("- [ ] {} (owner: {})\n", item.task, owner)),
            None => out.push_str(&format!("- [ ] {}\n", item.task)),
        }
        if !item.context.is_empty() {
            out.push_str(&format!("  {}\n", item.context));
        }
    }
    out
}

/// Records for context summaries, then technical details, then decisions,
/// each in aggregation order. Ids are `<conversation-slug>-<type>-<n>`.
pub fn render_semantic(digest: &Digest) -> Vec<SemanticRecord> {
    let mut conversation = slug::slugify(&digest.title);
    if conversation.is_empty() {
        conversation = "conversation".to_string();
    }
    let agg = &digest.aggregate;
    let mut records = Vec::new();

    for (i, summary) in agg.context_summaries.iter().enumerate() {
        records.push(context_record(&conversation, &digest.title, i + 1, summary));
    }
    for (i, detail) in agg.technical_details.iter().enumerate() {
        records.push(technical_record(&conversation, &digest.title, i + 1, detail));
    }
    for (i, decision) in agg.decisions.iter().enumerate() {
        records.push(decision_record(&conversation, &digest.title, i + 1, decision));
    }

    records
}

fn context_record(slug: &str, title: &str, n: usize, summary: &ContextSummary) -> SemanticRecord {
    let mut content = summary.summary.clone();
    for point in &summary.key_points {
        content.push_str(&format!("\n- {}", point));
    }
    SemanticRecord {
        id: format!("{}-context-{}", slug, n),
        kind: "context",
        content,
        metadata: json!({
            "conversation": title,
            "topic": summary.topic,
            "timeframe": summary.timeframe,
        }),
    }
}

fn technical_record(slug: &str, title: &str, n: usize, detail: &TechnicalDetail) -> SemanticRecord {
    SemanticRecord {
        id: format!("{}-technical-{}", slug, n),
        kind: "technical",
        content: detail.content.clone(),
        metadata: json!({
            "conversation": title,
            "detailType": detail.kind,
            "context": detail.context,
        }),
    }
}

fn decision_record(slug: &str, title: &str, n: usize, decision: &Decision) -> SemanticRecord {
    let content = if decision.details.is_empty() {
        decision.summary.clone()
    } else {
        format!("{}\n\n{}", decision.summary, decision.details)
    };
    SemanticRecord {
        id: format!("{}-decision-{}", slug, n),
        kind: "decision",
        content,
        metadata: json!({
            "conversation": title,
            "participants": decision.participants,
        }),
    }
}

/// One JSON object per line, newline-terminated.
pub fn to_jsonl(records: &[SemanticRecord]) -> serde_json::Result<String> {
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    Ok(out)
}
