//! One sync run: read the export state, fetch what is new, persist it.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use chatmirror_core::{
    conversation_info_or_fallback, fetch_messages, members_or_empty, FetchOptions, FormatOptions,
    MessageSource, MirrorError, MirrorResult, SourceKind, SourceRef,
};

use crate::document::ExportDocument;
use crate::store;

/// How an existing export is brought up to date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// Fetch messages newer than `Last Sync` and append them.
    #[default]
    Incremental,
    /// Fetch everything and rewrite the export.
    FullRefresh,
}

/// Strategy per source kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyByKind {
    #[serde(default)]
    pub chat: SyncStrategy,
    #[serde(default)]
    pub channel: SyncStrategy,
}

impl StrategyByKind {
    pub fn for_kind(&self, kind: SourceKind) -> SyncStrategy {
        match kind {
            SourceKind::Chat => self.chat,
            SourceKind::Channel => self.channel,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub format: FormatOptions,
    pub strategies: StrategyByKind,
    /// Force a full refresh regardless of strategy.
    pub force_full: bool,
    pub cap: Option<usize>,
    pub max_pages: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// First export written.
    Created { count: usize },
    /// First export written, but the conversation has no messages.
    CreatedEmpty,
    /// New messages appended to an existing export.
    Appended { count: usize },
    /// Nothing new; the export was not touched.
    UpToDate,
    /// Existing export rewritten from a full fetch.
    Refreshed { count: usize },
}

/// Bring the export at `path` up to date with `source_ref`.
pub async fn sync_conversation(
    source: &dyn MessageSource,
    source_ref: &SourceRef,
    path: &Path,
    options: &SyncOptions,
) -> MirrorResult<SyncOutcome> {
    // Captured before fetching; the stored mark also covers anything newer
    // that this run writes.
    let started_at = Utc::now();
    let existing = store::read_header(path)?;

    if let Some(header) = &existing {
        let expected = source_ref.to_string();
        if header.source != expected {
            return Err(MirrorError::SourceMismatch {
                path: path.to_path_buf(),
                expected,
                found: header.source.clone(),
            });
        }
    }

    let strategy = if options.force_full {
        SyncStrategy::FullRefresh
    } else {
        options.strategies.for_kind(source_ref.kind())
    };

    let cutoff = match (&existing, strategy) {
        (Some(header), SyncStrategy::Incremental) => match header.last_sync_at {
            Some(last_sync) => Some(last_sync),
            None => {
                warn!(
                    "{} has no usable Last Sync; falling back to a full refresh",
                    path.display()
                );
                None
            }
        },
        _ => None,
    };

    let fetch_options = FetchOptions {
        cutoff,
        cap: options.cap,
        max_pages: options.max_pages,
    };
    let messages = fetch_messages(source, source_ref, &fetch_options).await?;

    if existing.is_some() && cutoff.is_some() {
        if messages.is_empty() {
            info!("{} is up to date", path.display());
            return Ok(SyncOutcome::UpToDate);
        }
        let directory = members_or_empty(source, source_ref).await;
        let count = store::append(path, &messages, &directory, &options.format, started_at)?;
        return Ok(SyncOutcome::Appended { count });
    }

    let info = conversation_info_or_fallback(source, source_ref).await;
    let directory = if messages.is_empty() {
        Default::default()
    } else {
        members_or_empty(source, source_ref).await
    };
    let document = ExportDocument::assemble(
        &info,
        source_ref,
        &messages,
        &directory,
        &options.format,
        started_at,
    );

    if existing.is_some() {
        store::overwrite(path, &document)?;
        return Ok(SyncOutcome::Refreshed {
            count: messages.len(),
        });
    }

    store::write_new(path, &document)?;
    if messages.is_empty() {
        Ok(SyncOutcome::CreatedEmpty)
    } else {
        Ok(SyncOutcome::Created {
            count: messages.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::count_message_blocks;
    use async_trait::async_trait;
    use chatmirror_core::{
        ConversationInfo, MemberDirectory, Message, MessageBody, MessagePage, Sender,
    };
    use chrono::{DateTime, Duration, TimeZone};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Newest-first pages of 50 over a mutable message list.
    struct FakeSource {
        messages: Mutex<Vec<Message>>,
        page_requests: Mutex<usize>,
    }

    impl FakeSource {
        fn new(messages: Vec<Message>) -> Self {
            Self {
                messages: Mutex::new(messages),
                page_requests: Mutex::new(0),
            }
        }

        fn push(&self, more: Vec<Message>) {
            self.messages.lock().unwrap().extend(more);
        }

        fn requests(&self) -> usize {
            *self.page_requests.lock().unwrap()
        }
    }

    #[async_trait]
    impl MessageSource for FakeSource {
        async fn list_messages(
            &self,
            _source: &SourceRef,
            continuation: Option<&str>,
        ) -> MirrorResult<MessagePage> {
            *self.page_requests.lock().unwrap() += 1;
            let mut all = self.messages.lock().unwrap().clone();
            all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            let start = continuation.map(|c| c.parse::<usize>().unwrap()).unwrap_or(0);
            let end = (start + 50).min(all.len());
            let next = (end < all.len()).then(|| end.to_string());
            Ok(MessagePage {
                messages: all[start..end].to_vec(),
                next,
            })
        }

        async fn conversation_info(&self, _source: &SourceRef) -> MirrorResult<ConversationInfo> {
            Ok(ConversationInfo {
                topic: "Weekly sync".to_string(),
                descriptor: "group".to_string(),
                created_at: None,
                degraded: false,
            })
        }

        async fn members(&self, _source: &SourceRef) -> MirrorResult<MemberDirectory> {
            Ok([("u1", "Uma")].into_iter().collect())
        }
    }

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn messages_at(minutes: impl IntoIterator<Item = i64>) -> Vec<Message> {
        minutes
            .into_iter()
            .map(|m| Message {
                id: m.to_string(),
                created_at: at(m),
                sender: Sender {
                    id: Some("u1".to_string()),
                    display_name: None,
                },
                body: MessageBody::text(format!("update {}", m)),
                attachments: Vec::new(),
                reactions: Vec::new(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_first_run_creates_export() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("weekly.md");
        let source = FakeSource::new(messages_at(0..3));
        let source_ref = SourceRef::chat("c1");

        let outcome = sync_conversation(&source, &source_ref, &path, &SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Created { count: 3 });

        let doc = store::read_document(&path).unwrap();
        assert_eq!(doc.header.total_message_count, 3);
        assert_eq!(doc.header.topic, "Weekly sync");
        assert_eq!(doc.body.lines().filter(|l| l.starts_with("## ")).count(), 1);
        assert_eq!(count_message_blocks(&doc.body), 3);
        assert!(doc.body.contains("### Uma (09:00)"));
    }

    #[tokio::test]
    async fn test_first_run_with_no_messages() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.md");
        let source = FakeSource::new(Vec::new());

        let outcome = sync_conversation(&source, &SourceRef::chat("c1"), &path, &SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::CreatedEmpty);
        let header = store::read_header(&path).unwrap().unwrap();
        assert_eq!(header.total_message_count, 0);
    }

    #[tokio::test]
    async fn test_rerun_without_new_messages_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("weekly.md");
        // Messages in the past relative to the first run's sync time.
        let source = FakeSource::new(messages_at(0..3));
        let source_ref = SourceRef::chat("c1");
        sync_conversation(&source, &source_ref, &path, &SyncOptions::default())
            .await
            .unwrap();
        let before = std::fs::read(&path).unwrap();

        let outcome = sync_conversation(&source, &source_ref, &path, &SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::UpToDate);
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_incremental_run_appends_only_new_page() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("weekly.md");
        let source_ref = SourceRef::chat("c1");

        // Existing export: 10 messages, last synced well after them.
        let seed = messages_at(0..10);
        let info = ConversationInfo {
            topic: "Weekly sync".to_string(),
            descriptor: "group".to_string(),
            created_at: None,
            degraded: false,
        };
        let t_sync = at(60);
        let doc = ExportDocument::assemble(
            &info,
            &source_ref,
            &seed,
            &MemberDirectory::new(),
            &FormatOptions::default(),
            t_sync,
        );
        store::write_new(&path, &doc).unwrap();

        // Remote, newest first: 50 new, then 50 at or before the cutoff, then 50 older.
        let source = FakeSource::new(messages_at(-50..0));
        source.push(messages_at(11..=60));
        source.push(messages_at(1000..1050));

        let outcome = sync_conversation(&source, &source_ref, &path, &SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Appended { count: 50 });
        assert_eq!(source.requests(), 2, "third page must not be requested");

        let after = store::read_document(&path).unwrap();
        assert_eq!(after.header.total_message_count, 60);
        assert_eq!(count_message_blocks(&after.body), 60);
        assert!(after.body.starts_with(&doc.body));
    }

    /// Posts one message the moment the listing is first read.
    struct LiveSource {
        posted: Mutex<Option<Message>>,
    }

    #[async_trait]
    impl MessageSource for LiveSource {
        async fn list_messages(
            &self,
            _source: &SourceRef,
            _continuation: Option<&str>,
        ) -> MirrorResult<MessagePage> {
            let mut posted = self.posted.lock().unwrap();
            let message = posted.get_or_insert_with(|| Message {
                id: "live".to_string(),
                created_at: Utc::now(),
                sender: Sender {
                    id: Some("u1".to_string()),
                    display_name: None,
                },
                body: MessageBody::text("posted during run"),
                attachments: Vec::new(),
                reactions: Vec::new(),
            });
            Ok(MessagePage {
                messages: vec![message.clone()],
                next: None,
            })
        }

        async fn conversation_info(&self, _source: &SourceRef) -> MirrorResult<ConversationInfo> {
            Ok(ConversationInfo {
                topic: "Live".to_string(),
                descriptor: "group".to_string(),
                created_at: None,
                degraded: false,
            })
        }

        async fn members(&self, _source: &SourceRef) -> MirrorResult<MemberDirectory> {
            Ok(MemberDirectory::new())
        }
    }

    #[tokio::test]
    async fn test_message_posted_during_run_is_written_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("live.md");
        let source = LiveSource {
            posted: Mutex::new(None),
        };
        let source_ref = SourceRef::chat("c1");

        let first = sync_conversation(&source, &source_ref, &path, &SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(first, SyncOutcome::Created { count: 1 });

        let second = sync_conversation(&source, &source_ref, &path, &SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(second, SyncOutcome::UpToDate);

        let doc = store::read_document(&path).unwrap();
        assert_eq!(doc.body.matches("posted during run").count(), 1);
        assert_eq!(doc.header.total_message_count, 1);
    }

    #[tokio::test]
    async fn test_full_refresh_strategy_rewrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("channel.md");
        let source_ref = SourceRef::channel("t1", "ch1");
        let source = FakeSource::new(messages_at(0..4));
        let options = SyncOptions {
            strategies: StrategyByKind {
                chat: SyncStrategy::Incremental,
                channel: SyncStrategy::FullRefresh,
            },
            ..SyncOptions::default()
        };

        sync_conversation(&source, &source_ref, &path, &options).await.unwrap();
        source.push(messages_at(5..7));
        let outcome = sync_conversation(&source, &source_ref, &path, &options)
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Refreshed { count: 6 });
        let header = store::read_header(&path).unwrap().unwrap();
        assert_eq!(header.total_message_count, 6);
    }

    #[tokio::test]
    async fn test_refuses_to_mix_conversations() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("weekly.md");
        let source = FakeSource::new(messages_at(0..2));
        sync_conversation(&source, &SourceRef::chat("c1"), &path, &SyncOptions::default())
            .await
            .unwrap();

        let result = sync_conversation(&source, &SourceRef::chat("c2"), &path, &SyncOptions::default()).await;
        assert!(matches!(result, Err(MirrorError::SourceMismatch { .. })));
    }
}
