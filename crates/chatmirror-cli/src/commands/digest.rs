use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;

use chatmirror_digest::{
    render_semantic, render_structured, to_jsonl, ChatCompletionsClient, Digest, SegmentProcessor,
};
use chatmirror_export::{artifact_path, read_document, Artifact};

use crate::config::Config;
use crate::ui;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Summary, topics, decisions and action-item documents
    #[default]
    Structured,
    /// One JSONL file of retrieval records
    Semantic,
}

pub struct DigestArgs {
    pub path: PathBuf,
    pub format: OutputFormat,
    pub chunk_chars: Option<usize>,
}

pub async fn run(config: &Config, args: DigestArgs) -> Result<()> {
    let document = read_document(&args.path)
        .with_context(|| format!("Could not read export {}", args.path.display()))?;

    let key_env = &config.digest.api_key_env;
    let api_key = std::env::var(key_env)
        .map_err(|_| anyhow!("{} is not set; it must hold the summarization API key", key_env))?;
    let client = ChatCompletionsClient::new(
        config.digest.endpoint.clone(),
        api_key,
        config.digest.model.clone(),
        config.digest.temperature,
        Duration::from_secs(config.digest.timeout_secs),
    )?;

    let chunk_chars = args.chunk_chars.unwrap_or(config.digest.max_chunk_chars);
    let processor = SegmentProcessor::new(&client, chunk_chars);

    let pb = ui::spinner(&format!("Digesting {}", document.header.topic));
    let digest = processor.digest(&document.header.topic, &document.body).await;
    pb.finish_and_clear();
    let digest = digest.with_context(|| format!("Digest of {} failed", args.path.display()))?;

    if digest.summary_degraded {
        ui::warn("Executive summary unavailable; wrote a placeholder");
    }

    let written = write_artifacts(&args.path, &digest, args.format)?;
    ui::success(&format!(
        "Digested {} chunks: {} topics, {} decisions, {} action items",
        digest.chunk_count,
        digest.aggregate.topics.len(),
        digest.aggregate.decisions.len(),
        digest.aggregate.action_items.len()
    ));
    for path in written {
        ui::info(&path.display().to_string());
    }

    Ok(())
}

/// Write the chosen artifacts next to `export` and return their paths.
fn write_artifacts(export: &Path, digest: &Digest, format: OutputFormat) -> Result<Vec<PathBuf>> {
    let outputs = match format {
        OutputFormat::Structured => {
            let docs = render_structured(digest);
            vec![
                (Artifact::Summary, docs.main),
                (Artifact::Topics, docs.topics),
                (Artifact::Decisions, docs.decisions),
                (Artifact::Actions, docs.action_items),
            ]
        }
        OutputFormat::Semantic => {
            let records = render_semantic(digest);
            vec![(Artifact::Semantic, to_jsonl(&records)?)]
        }
    };

    let mut written = Vec::with_capacity(outputs.len());
    for (artifact, contents) in outputs {
        let path = artifact_path(export, artifact);
        std::fs::write(&path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}
