//! Default file names for exports and the artifacts derived from them.

use std::path::{Path, PathBuf};

use chatmirror_core::{ConversationInfo, SourceRef};

const EXPORT_EXTENSION: &str = "md";

/// Artifacts written next to an export by the digest command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Summary,
    Topics,
    Decisions,
    Actions,
    Semantic,
}

impl Artifact {
    fn suffix(&self) -> &'static str {
        match self {
            Artifact::Summary => "summary.md",
            Artifact::Topics => "topics.md",
            Artifact::Decisions => "decisions.md",
            Artifact::Actions => "actions.md",
            Artifact::Semantic => "semantic.jsonl",
        }
    }
}

/// `<output_dir>/<slug>.md`, slugged from the topic, or from the identifier
/// when the topic is empty or has no sluggable characters.
pub fn default_export_path(output_dir: &Path, info: &ConversationInfo, source: &SourceRef) -> PathBuf {
    let mut stem = slug::slugify(&info.topic);
    if stem.is_empty() {
        stem = slug::slugify(source.fallback_name());
    }
    if stem.is_empty() {
        stem = "conversation".to_string();
    }
    output_dir.join(format!("{}.{}", stem, EXPORT_EXTENSION))
}

/// Path of a digest artifact next to `export`.
pub fn artifact_path(export: &Path, artifact: Artifact) -> PathBuf {
    let stem = export
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "conversation".to_string());
    export.with_file_name(format!("{}.{}", stem, artifact.suffix()))
}
