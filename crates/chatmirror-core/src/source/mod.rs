//! Remote message source and the paginated fetch-with-cutoff engine.
//!
//! The engine only relies on the listing being newest-first; it never asks
//! the remote side to filter by time.

mod graph;

pub use graph::{GraphSource, DEFAULT_BASE_URL};

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::MirrorResult;
use crate::message::{MemberDirectory, Message};

/// Messages requested per listing page.
pub const PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Direct or group chat.
    Chat,
    /// Team channel feed.
    Channel,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Chat => "chat",
            SourceKind::Channel => "channel",
        }
    }
}

/// Identifies one remote conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceRef {
    Chat { chat_id: String },
    Channel { team_id: String, channel_id: String },
}

impl SourceRef {
    pub fn chat(chat_id: impl Into<String>) -> Self {
        SourceRef::Chat {
            chat_id: chat_id.into(),
        }
    }

    pub fn channel(team_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        SourceRef::Channel {
            team_id: team_id.into(),
            channel_id: channel_id.into(),
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            SourceRef::Chat { .. } => SourceKind::Chat,
            SourceRef::Channel { .. } => SourceKind::Channel,
        }
    }

    /// Parse the form produced by `Display`: `chat:<id>` or `channel:<team>/<channel>`.
    pub fn parse(s: &str) -> Option<Self> {
        let (kind, rest) = s.trim().split_once(':')?;
        match kind {
            "chat" if !rest.is_empty() => Some(SourceRef::chat(rest)),
            "channel" => {
                let (team, channel) = rest.split_once('/')?;
                if team.is_empty() || channel.is_empty() {
                    return None;
                }
                Some(SourceRef::channel(team, channel))
            }
            _ => None,
        }
    }

    /// Short name derived from the identifier, used when metadata is unavailable.
    pub fn fallback_name(&self) -> String {
        match self {
            SourceRef::Chat { chat_id } => format!("Chat {}", short_id(chat_id)),
            SourceRef::Channel { channel_id, .. } => format!("Channel {}", short_id(channel_id)),
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Chat { chat_id } => write!(f, "chat:{}", chat_id),
            SourceRef::Channel {
                team_id,
                channel_id,
            } => write!(f, "channel:{}/{}", team_id, channel_id),
        }
    }
}

fn short_id(id: &str) -> String {
    let trimmed = id.trim_start_matches("19:");
    trimmed.chars().take(8).collect()
}

/// One page of the newest-first listing.
#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    /// Opaque continuation reference for the next (older) page.
    pub next: Option<String>,
}

/// Conversation metadata used for the export header.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationInfo {
    pub topic: String,
    /// `oneOnOne`, `group`, `meeting`, `channel`, ...
    pub descriptor: String,
    pub created_at: Option<DateTime<Utc>>,
    /// True when the remote lookup failed and the fields are derived from the identifier.
    pub degraded: bool,
}

impl ConversationInfo {
    pub fn fallback(source: &SourceRef) -> Self {
        Self {
            topic: source.fallback_name(),
            descriptor: source.kind().as_str().to_string(),
            created_at: None,
            degraded: true,
        }
    }
}

/// The remote conversation API as the engine consumes it.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Fetch one page of messages, newest first. `continuation` is `None`
    /// for the first page.
    async fn list_messages(
        &self,
        source: &SourceRef,
        continuation: Option<&str>,
    ) -> MirrorResult<MessagePage>;

    async fn conversation_info(&self, source: &SourceRef) -> MirrorResult<ConversationInfo>;

    async fn members(&self, source: &SourceRef) -> MirrorResult<MemberDirectory>;
}

/// Limits applied while walking the listing.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Only messages strictly newer than this are kept.
    pub cutoff: Option<DateTime<Utc>>,
    /// Overall message limit; the most recent `cap` messages are kept.
    pub cap: Option<usize>,
    /// Maximum number of page requests.
    pub max_pages: Option<usize>,
}

/// Walk the listing and return the selected messages oldest-first.
///
/// Stops when the listing ends, the page budget is spent, `cap` messages
/// are collected, or a non-empty page has nothing newer than the cutoff.
pub async fn fetch_messages(
    source: &dyn MessageSource,
    source_ref: &SourceRef,
    options: &FetchOptions,
) -> MirrorResult<Vec<Message>> {
    let mut collected: Vec<Message> = Vec::new();
    let mut continuation: Option<String> = None;
    let mut pages = 0usize;
    let mut dropped = 0usize;

    let stop = loop {
        if let Some(max_pages) = options.max_pages {
            if pages >= max_pages {
                debug!("{}: page budget of {} reached", source_ref, max_pages);
                break FetchStop::PageBudget;
            }
        }

        let page = source
            .list_messages(source_ref, continuation.as_deref())
            .await?;
        pages += 1;

        let raw_len = page.messages.len();
        let kept: Vec<Message> = match options.cutoff {
            Some(cutoff) => page
                .messages
                .into_iter()
                .filter(|m| m.created_at > cutoff)
                .collect(),
            None => page.messages,
        };
        dropped += raw_len - kept.len();

        let reached_cutoff = options.cutoff.is_some() && raw_len > 0 && kept.is_empty();
        collected.extend(kept);

        if reached_cutoff {
            debug!("{}: page {} is entirely at or before the cutoff", source_ref, pages);
            break FetchStop::Cutoff;
        }

        if let Some(cap) = options.cap {
            if collected.len() >= cap {
                debug!("{}: message cap of {} reached", source_ref, cap);
                break FetchStop::Cap;
            }
        }

        match page.next {
            Some(next) => continuation = Some(next),
            None => break FetchStop::End,
        }
    };

    if leaves_gap(options.cutoff.is_some(), dropped, stop) {
        warn!(
            "{}: incremental fetch stopped at the {} before reaching the last sync; \
             older unsynced messages were not fetched (degraded)",
            source_ref,
            stop.describe()
        );
    }

    // Pages arrive newest-first. Reverse, then a stable sort guards against
    // out-of-order entries within a page.
    collected.reverse();
    collected.sort_by_key(|m| m.created_at);

    if let Some(cap) = options.cap {
        if collected.len() > cap {
            let excess = collected.len() - cap;
            collected.drain(..excess);
        }
    }

    info!(
        "{}: fetched {} pages, kept {} messages, skipped {} already synced",
        source_ref,
        pages,
        collected.len(),
        dropped
    );

    Ok(collected)
}

/// Why the listing walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchStop {
    End,
    Cutoff,
    PageBudget,
    Cap,
}

impl FetchStop {
    fn describe(self) -> &'static str {
        match self {
            FetchStop::End => "end of the listing",
            FetchStop::Cutoff => "cutoff",
            FetchStop::PageBudget => "page budget",
            FetchStop::Cap => "message cap",
        }
    }
}

/// True when an incremental walk ended on a limit without ever seeing a
/// message at or before the cutoff, so messages between the cutoff and the
/// oldest fetched one may be missing.
fn leaves_gap(incremental: bool, dropped: usize, stop: FetchStop) -> bool {
    incremental && dropped == 0 && matches!(stop, FetchStop::PageBudget | FetchStop::Cap)
}

/// Metadata lookup that never fails: falls back to identifier-derived
/// fields and marks the result degraded.
pub async fn conversation_info_or_fallback(
    source: &dyn MessageSource,
    source_ref: &SourceRef,
) -> ConversationInfo {
    match source.conversation_info(source_ref).await {
        Ok(info) => info,
        Err(e) => {
            warn!(
                "{}: metadata lookup failed, using identifier-derived name (degraded): {}",
                source_ref, e
            );
            ConversationInfo::fallback(source_ref)
        }
    }
}

/// Member lookup that never fails: an empty directory on error, so sender
/// resolution falls through to embedded names.
pub async fn members_or_empty(source: &dyn MessageSource, source_ref: &SourceRef) -> MemberDirectory {
    match source.members(source_ref).await {
        Ok(directory) => {
            debug!("{}: member directory has {} entries", source_ref, directory.len());
            directory
        }
        Err(e) => {
            warn!("{}: member lookup failed, continuing without directory (degraded): {}", source_ref, e);
            MemberDirectory::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MirrorError;
    use crate::message::{MessageBody, Sender};
    use chrono::{Duration, TimeZone};
    use std::sync::Mutex;

    /// Serves scripted pages and records which continuations were requested.
    struct ScriptedSource {
        pages: Vec<Vec<Message>>,
        requests: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<Vec<Message>>) -> Self {
            Self {
                pages,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requested_pages(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MessageSource for ScriptedSource {
        async fn list_messages(
            &self,
            _source: &SourceRef,
            continuation: Option<&str>,
        ) -> MirrorResult<MessagePage> {
            self.requests
                .lock()
                .unwrap()
                .push(continuation.map(|c| c.to_string()));
            let index = continuation.map(|c| c.parse::<usize>().unwrap()).unwrap_or(0);
            let messages = self.pages.get(index).cloned().unwrap_or_default();
            let next = (index + 1 < self.pages.len()).then(|| (index + 1).to_string());
            Ok(MessagePage { messages, next })
        }

        async fn conversation_info(&self, source: &SourceRef) -> MirrorResult<ConversationInfo> {
            Err(MirrorError::SourceNotFound {
                source_ref: source.to_string(),
            })
        }

        async fn members(&self, _source: &SourceRef) -> MirrorResult<MemberDirectory> {
            Err(MirrorError::upstream("fetch", Some(500), "boom"))
        }
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn message_at(minutes: i64) -> Message {
        Message {
            id: format!("m{}", minutes),
            created_at: base() + Duration::minutes(minutes),
            sender: Sender::default(),
            body: MessageBody::text("x"),
            attachments: Vec::new(),
            reactions: Vec::new(),
        }
    }

    /// Newest-first page covering minutes `to` down to `from` (inclusive).
    fn page(from: i64, to: i64) -> Vec<Message> {
        (from..=to).rev().map(message_at).collect()
    }

    fn assert_chronological(messages: &[Message]) {
        for pair in messages.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }
    }

    #[tokio::test]
    async fn test_first_run_reads_every_page_in_chronological_order() {
        let source = ScriptedSource::new(vec![page(100, 149), page(50, 99), page(0, 49)]);
        let messages = fetch_messages(&source, &SourceRef::chat("c"), &FetchOptions::default())
            .await
            .unwrap();
        assert_eq!(messages.len(), 150);
        assert_eq!(messages.first().unwrap().id, "m0");
        assert_eq!(messages.last().unwrap().id, "m149");
        assert_chronological(&messages);
        assert_eq!(source.requested_pages(), 3);
    }

    #[tokio::test]
    async fn test_stops_on_page_entirely_before_cutoff() {
        // Page 0 is newer than the cutoff, page 1 is entirely at/before it.
        let source = ScriptedSource::new(vec![page(100, 149), page(50, 99), page(0, 49)]);
        let options = FetchOptions {
            cutoff: Some(base() + Duration::minutes(99)),
            ..FetchOptions::default()
        };
        let messages = fetch_messages(&source, &SourceRef::chat("c"), &options)
            .await
            .unwrap();
        assert_eq!(messages.len(), 50);
        assert!(messages.iter().all(|m| m.created_at > base() + Duration::minutes(99)));
        assert_eq!(source.requested_pages(), 2, "page 3 must not be requested");
    }

    #[tokio::test]
    async fn test_partial_page_keeps_only_newer_messages() {
        let source = ScriptedSource::new(vec![page(0, 9)]);
        let options = FetchOptions {
            cutoff: Some(base() + Duration::minutes(6)),
            ..FetchOptions::default()
        };
        let messages = fetch_messages(&source, &SourceRef::chat("c"), &options)
            .await
            .unwrap();
        let ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m7", "m8", "m9"]);
    }

    #[tokio::test]
    async fn test_cap_keeps_most_recent_messages() {
        let source = ScriptedSource::new(vec![page(100, 149), page(50, 99), page(0, 49)]);
        let options = FetchOptions {
            cap: Some(60),
            ..FetchOptions::default()
        };
        let messages = fetch_messages(&source, &SourceRef::chat("c"), &options)
            .await
            .unwrap();
        assert_eq!(messages.len(), 60);
        assert_eq!(messages.first().unwrap().id, "m90");
        assert_eq!(messages.last().unwrap().id, "m149");
        assert_chronological(&messages);
        assert_eq!(source.requested_pages(), 2);
    }

    #[tokio::test]
    async fn test_page_budget_limits_requests() {
        let source = ScriptedSource::new(vec![page(100, 149), page(50, 99), page(0, 49)]);
        let options = FetchOptions {
            max_pages: Some(1),
            ..FetchOptions::default()
        };
        let messages = fetch_messages(&source, &SourceRef::chat("c"), &options)
            .await
            .unwrap();
        assert_eq!(messages.len(), 50);
        assert_eq!(source.requested_pages(), 1);
    }

    #[tokio::test]
    async fn test_empty_listing_returns_nothing() {
        let source = ScriptedSource::new(vec![Vec::new()]);
        let options = FetchOptions {
            cutoff: Some(base()),
            ..FetchOptions::default()
        };
        let messages = fetch_messages(&source, &SourceRef::chat("c"), &options)
            .await
            .unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_metadata_failures_degrade() {
        let source = ScriptedSource::new(Vec::new());
        let source_ref = SourceRef::chat("19:abcdef123456@thread.v2");

        let info = conversation_info_or_fallback(&source, &source_ref).await;
        assert!(info.degraded);
        assert_eq!(info.topic, "Chat abcdef12");
        assert_eq!(info.descriptor, "chat");

        let directory = members_or_empty(&source, &source_ref).await;
        assert!(directory.is_empty());
    }

    #[test]
    fn test_gap_only_when_incremental_stops_on_a_limit_before_cutoff() {
        assert!(leaves_gap(true, 0, FetchStop::PageBudget));
        assert!(leaves_gap(true, 0, FetchStop::Cap));
        // Some message at or before the cutoff was seen: no gap.
        assert!(!leaves_gap(true, 3, FetchStop::PageBudget));
        assert!(!leaves_gap(true, 0, FetchStop::End));
        assert!(!leaves_gap(true, 0, FetchStop::Cutoff));
        assert!(!leaves_gap(false, 0, FetchStop::Cap));
    }

    #[tokio::test]
    async fn test_incremental_budget_stop_keeps_fetched_messages() {
        let source = ScriptedSource::new(vec![page(100, 149), page(50, 99), page(0, 49)]);
        let options = FetchOptions {
            cutoff: Some(base() - Duration::minutes(1)),
            max_pages: Some(1),
            ..FetchOptions::default()
        };
        let messages = fetch_messages(&source, &SourceRef::chat("c"), &options)
            .await
            .unwrap();
        assert_eq!(messages.len(), 50);
        assert_eq!(source.requested_pages(), 1);
    }

    #[test]
    fn test_source_ref_display_parse() {
        let chat = SourceRef::chat("19:abc@thread.v2");
        assert_eq!(chat.to_string(), "chat:19:abc@thread.v2");
        assert_eq!(SourceRef::parse(&chat.to_string()), Some(chat));

        let channel = SourceRef::channel("team-1", "19:chan@thread.tacv2");
        assert_eq!(SourceRef::parse(&channel.to_string()), Some(channel));

        assert_eq!(SourceRef::parse("channel:onlyteam"), None);
        assert_eq!(SourceRef::parse("dm:x"), None);
    }
}
