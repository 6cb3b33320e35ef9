//! Markdown export documents and the incremental merge engine.
//!
//! An export is a header followed by a date-sectioned body. The header's
//! `Last Sync` and `Total Messages` fields are the only state carried
//! between runs.

pub mod document;
pub mod header;
pub mod naming;
pub mod store;
pub mod sync;

pub use document::{body_of, count_message_blocks, ExportDocument};
pub use header::{ExportHeader, HeaderField, HEADER_TERMINATOR, TITLE_PREFIX};
pub use naming::{artifact_path, default_export_path, Artifact};
pub use store::{append, overwrite, read_document, read_header, write_new};
pub use sync::{sync_conversation, StrategyByKind, SyncOptions, SyncOutcome, SyncStrategy};
