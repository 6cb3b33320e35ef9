//! chatmirror core: the conversation model, the remote message source and
//! the incremental fetch engine, plus the message/date formatting shared by
//! every export.

pub mod auth;
pub mod error;
pub mod grouping;
pub mod message;
pub mod normalize;
pub mod source;

pub use auth::{AuthMode, Credential};
pub use error::{MirrorError, MirrorResult};
pub use grouping::{group_by_date, render_section, render_sections, DateSection, SECTION_PREFIX};
pub use message::{Attachment, ContentType, MemberDirectory, Message, MessageBody, Reaction, Sender};
pub use normalize::{format_message, FormatOptions, RenderedMessage, MESSAGE_PREFIX};
pub use source::{
    conversation_info_or_fallback, fetch_messages, members_or_empty, ConversationInfo,
    FetchOptions, GraphSource, MessagePage, MessageSource, SourceKind, SourceRef, PAGE_SIZE,
};
