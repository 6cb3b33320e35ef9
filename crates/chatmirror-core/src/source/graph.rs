//! Microsoft Graph implementation of [`MessageSource`].
//!
//! Chats: `/chats/{id}/messages`, channels:
//! `/teams/{team}/channels/{channel}/messages`. Continuation is the
//! `@odata.nextLink` URL. No request is retried.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{ConversationInfo, MessagePage, MessageSource, SourceRef, PAGE_SIZE};
use crate::auth::Credential;
use crate::error::{MirrorError, MirrorResult};
use crate::message::{Attachment, ContentType, MemberDirectory, Message, MessageBody, Reaction, Sender};

pub const DEFAULT_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Upper bound on how much of an error body is kept in [`MirrorError::Upstream`].
const ERROR_BODY_LIMIT: usize = 500;

pub struct GraphSource {
    client: reqwest::Client,
    base_url: String,
    credential: Credential,
}

impl GraphSource {
    pub fn new(base_url: impl Into<String>, credential: Credential, timeout: Duration) -> MirrorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(Policy::limited(5))
            .build()
            .map_err(|e| MirrorError::upstream("fetch", None, format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential,
        })
    }

    fn messages_url(&self, source: &SourceRef) -> String {
        match source {
            SourceRef::Chat { chat_id } => {
                format!("{}/chats/{}/messages?$top={}", self.base_url, chat_id, PAGE_SIZE)
            }
            SourceRef::Channel {
                team_id,
                channel_id,
            } => format!(
                "{}/teams/{}/channels/{}/messages?$top={}",
                self.base_url, team_id, channel_id, PAGE_SIZE
            ),
        }
    }

    fn members_url(&self, source: &SourceRef) -> String {
        match source {
            SourceRef::Chat { chat_id } => format!("{}/chats/{}/members", self.base_url, chat_id),
            SourceRef::Channel {
                team_id,
                channel_id,
            } => format!("{}/teams/{}/channels/{}/members", self.base_url, team_id, channel_id),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, source: &SourceRef) -> MirrorResult<T> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .bearer_auth(self.credential.access_token())
            .send()
            .await
            .map_err(|e| MirrorError::upstream("fetch", None, e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| MirrorError::upstream("fetch", Some(status.as_u16()), format!("malformed response: {}", e)));
        }

        let mode = self.credential.mode();
        match status {
            StatusCode::NOT_FOUND => Err(MirrorError::SourceNotFound {
                source_ref: source.to_string(),
            }),
            StatusCode::FORBIDDEN => Err(MirrorError::Permission {
                mode,
                hint: mode.permission_hint(source.kind()),
            }),
            StatusCode::UNAUTHORIZED => Err(MirrorError::Permission {
                mode,
                hint: mode.rejected_token_hint(),
            }),
            _ => {
                Err(MirrorError::upstream(
                    "fetch",
                    Some(status.as_u16()),
                    remote_error_message(response.text().await),
                ))
            }
        }
    }
}

#[async_trait]
impl MessageSource for GraphSource {
    async fn list_messages(
        &self,
        source: &SourceRef,
        continuation: Option<&str>,
    ) -> MirrorResult<MessagePage> {
        let url = match continuation {
            Some(next) => next.to_string(),
            None => self.messages_url(source),
        };
        let payload: GraphList<GraphMessage> = self.get_json(&url, source).await?;

        Ok(MessagePage {
            messages: payload.value.into_iter().map(Message::from).collect(),
            next: payload.next_link.filter(|l| !l.is_empty()),
        })
    }

    async fn conversation_info(&self, source: &SourceRef) -> MirrorResult<ConversationInfo> {
        match source {
            SourceRef::Chat { chat_id } => {
                let url = format!("{}/chats/{}", self.base_url, chat_id);
                let chat: GraphChat = self.get_json(&url, source).await?;
                let topic = chat
                    .topic
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| source.fallback_name());
                Ok(ConversationInfo {
                    topic,
                    descriptor: chat.chat_type.unwrap_or_else(|| "chat".to_string()),
                    created_at: chat.created_date_time,
                    degraded: false,
                })
            }
            SourceRef::Channel {
                team_id,
                channel_id,
            } => {
                let url = format!("{}/teams/{}/channels/{}", self.base_url, team_id, channel_id);
                let channel: GraphChannel = self.get_json(&url, source).await?;
                let team_url = format!("{}/teams/{}", self.base_url, team_id);
                let team: GraphTeam = self.get_json(&team_url, source).await?;

                let channel_name = channel
                    .display_name
                    .unwrap_or_else(|| source.fallback_name());
                let topic = match team.display_name {
                    Some(team_name) => format!("{} / {}", team_name, channel_name),
                    None => channel_name,
                };
                Ok(ConversationInfo {
                    topic,
                    descriptor: "channel".to_string(),
                    created_at: channel.created_date_time,
                    degraded: false,
                })
            }
        }
    }

    async fn members(&self, source: &SourceRef) -> MirrorResult<MemberDirectory> {
        let mut directory = MemberDirectory::new();
        let mut url = self.members_url(source);

        loop {
            let payload: GraphList<GraphMember> = self.get_json(&url, source).await?;
            for member in payload.value {
                if let (Some(id), Some(name)) = (member.user_id, member.display_name) {
                    directory.insert(id, name);
                }
            }
            match payload.next_link.filter(|l| !l.is_empty()) {
                Some(next) => url = next,
                None => break,
            }
        }

        Ok(directory)
    }
}

/// Prefer the `error.message` field of a Graph error body over the raw text.
fn remote_error_message<E: std::fmt::Display>(body: Result<String, E>) -> String {
    let body = match body {
        Ok(body) => body,
        Err(e) => return format!("error body could not be read: {}", e),
    };
    let parsed = serde_json::from_str::<GraphErrorEnvelope>(&body)
        .ok()
        .and_then(|e| e.error.message);
    match parsed {
        Some(message) => message,
        None => body.chars().take(ERROR_BODY_LIMIT).collect(),
    }
}

// --- Graph API Response Types ---

#[derive(Debug, Deserialize)]
struct GraphList<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMessage {
    id: String,
    created_date_time: DateTime<Utc>,
    from: Option<GraphFrom>,
    body: Option<GraphBody>,
    #[serde(default)]
    attachments: Vec<GraphAttachment>,
    #[serde(default)]
    reactions: Vec<GraphReaction>,
}

#[derive(Debug, Deserialize)]
struct GraphFrom {
    user: Option<GraphIdentity>,
    application: Option<GraphIdentity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphIdentity {
    id: Option<String>,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphBody {
    content_type: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphAttachment {
    name: Option<String>,
    content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphReaction {
    reaction_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphChat {
    topic: Option<String>,
    chat_type: Option<String>,
    created_date_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphChannel {
    display_name: Option<String>,
    created_date_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphTeam {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMember {
    user_id: Option<String>,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphErrorEnvelope {
    error: GraphErrorBody,
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    message: Option<String>,
}

impl From<GraphMessage> for Message {
    fn from(raw: GraphMessage) -> Self {
        let identity = raw.from.and_then(|f| f.user.or(f.application));
        let sender = identity
            .map(|i| Sender {
                id: i.id,
                display_name: i.display_name,
            })
            .unwrap_or_default();

        let body = raw
            .body
            .map(|b| {
                let content_type = match b.content_type.as_deref() {
                    Some(t) if t.eq_ignore_ascii_case("html") => ContentType::Html,
                    _ => ContentType::Text,
                };
                MessageBody {
                    content: b.content.unwrap_or_default(),
                    content_type,
                }
            })
            .unwrap_or_default();

        Message {
            id: raw.id,
            created_at: raw.created_date_time,
            sender,
            body,
            attachments: raw
                .attachments
                .into_iter()
                .map(|a| Attachment {
                    name: a.name,
                    kind: a.content_type,
                })
                .collect(),
            reactions: raw
                .reactions
                .into_iter()
                .map(|r| Reaction {
                    kind: r.reaction_type,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthMode;

    #[test]
    fn test_message_mapping() {
        let raw = r#"{
            "id": "1700000000000",
            "createdDateTime": "2024-03-04T09:15:00.123Z",
            "from": {"user": {"id": "u1", "displayName": "Alice"}},
            "body": {"contentType": "html", "content": "<p>Hi</p>"},
            "attachments": [{"name": "plan.pdf", "contentType": "reference"}],
            "reactions": [{"reactionType": "like"}]
        }"#;
        let message: Message = serde_json::from_str::<GraphMessage>(raw).unwrap().into();
        assert_eq!(message.sender.display_name.as_deref(), Some("Alice"));
        assert_eq!(message.sender.id.as_deref(), Some("u1"));
        assert_eq!(message.body.content_type, ContentType::Html);
        assert_eq!(message.attachments[0].name.as_deref(), Some("plan.pdf"));
        assert_eq!(message.reactions[0].kind, "like");
    }

    #[test]
    fn test_system_message_without_sender() {
        let raw = r#"{"id": "2", "createdDateTime": "2024-03-04T09:15:00Z", "from": null, "body": null}"#;
        let message: Message = serde_json::from_str::<GraphMessage>(raw).unwrap().into();
        assert_eq!(message.sender, Sender::default());
        assert!(message.body.content.is_empty());
    }

    #[test]
    fn test_list_next_link() {
        let raw = r#"{"value": [], "@odata.nextLink": "https://graph/next"}"#;
        let list: GraphList<GraphMessage> = serde_json::from_str(raw).unwrap();
        assert_eq!(list.next_link.as_deref(), Some("https://graph/next"));
    }

    #[test]
    fn test_remote_error_message() {
        let body = r#"{"error": {"code": "BadRequest", "message": "Invalid filter clause"}}"#;
        assert_eq!(remote_error_message::<String>(Ok(body.to_string())), "Invalid filter clause");
        assert_eq!(remote_error_message::<String>(Ok("plain failure".into())), "plain failure");
        assert_eq!(
            remote_error_message(Err("connection reset")),
            "error body could not be read: connection reset"
        );
    }

    #[test]
    fn test_urls() {
        let source = GraphSource::new(
            "https://graph.example/v1.0/",
            Credential::new("t", AuthMode::Application),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            source.messages_url(&SourceRef::chat("c1")),
            "https://graph.example/v1.0/chats/c1/messages?$top=50"
        );
        assert_eq!(
            source.members_url(&SourceRef::channel("t1", "ch1")),
            "https://graph.example/v1.0/teams/t1/channels/ch1/members"
        );
    }
}
