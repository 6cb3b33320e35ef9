//! Error taxonomy shared by every chatmirror stage.
//!
//! Each variant's message starts with the stage that failed (`fetch`,
//! `export`, `extract`) so the top-level invocation can report it as-is.

use std::path::PathBuf;

use thiserror::Error;

use crate::auth::AuthMode;

pub type MirrorResult<T> = Result<T, MirrorError>;

#[derive(Debug, Error)]
pub enum MirrorError {
    /// The conversation identifier does not resolve on the remote side.
    #[error("fetch: conversation not found: {source_ref}")]
    SourceNotFound { source_ref: String },

    /// The credential lacks a permission; `hint` names what to grant.
    #[error("fetch: permission denied ({mode} auth): {hint}")]
    Permission { mode: AuthMode, hint: String },

    /// Any other remote failure, from either the message source or the
    /// extraction service.
    #[error("{stage}: upstream error{}: {message}", status_suffix(.status))]
    Upstream {
        stage: &'static str,
        status: Option<u16>,
        message: String,
    },

    #[error("export: failed to read {}: {source}", .path.display())]
    ExportRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("export: failed to write {}: {source}", .path.display())]
    ExportWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("export: {} has no recognizable export header", .path.display())]
    MissingHeader { path: PathBuf },

    #[error("export: {} mirrors {found}, refusing to write {expected} into it", .path.display())]
    SourceMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    /// The extraction service replied with something that is not the
    /// expected JSON object. Aborts the whole extraction run.
    #[error("extract: chunk {chunk_index} response could not be parsed ({reason}); response began: {raw_excerpt}")]
    ExtractionParse {
        chunk_index: usize,
        reason: String,
        raw_excerpt: String,
    },
}

impl MirrorError {
    pub fn upstream(stage: &'static str, status: Option<u16>, message: impl Into<String>) -> Self {
        MirrorError::Upstream {
            stage,
            status,
            message: message.into(),
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status
        .map(|code| format!(" (HTTP {})", code))
        .unwrap_or_default()
}
