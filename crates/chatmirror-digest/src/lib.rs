//! Digest pipeline for chatmirror exports: chunking, structured extraction
//! through an LLM service, aggregation, and rendering.

pub mod chunk;
pub mod extraction;
pub mod processor;
pub mod render;
pub mod service;

pub use chunk::split_chunks;
pub use extraction::{
    parse_extraction, ActionItem, AggregateExtraction, ContextSummary, Decision, ExtractionResult,
    Participant, TechnicalDetail,
};
pub use processor::{Digest, SegmentProcessor, DEFAULT_MAX_CHUNK_CHARS};
pub use render::{render_semantic, render_structured, to_jsonl, SemanticRecord, StructuredDocs};
pub use service::{ChatCompletionsClient, ExtractionService, DEFAULT_ENDPOINT, DEFAULT_MODEL};
