//! Bearer credential handed to the remote source.
//!
//! Token acquisition happens elsewhere; this module only carries the token
//! and the mode it was obtained in, so permission failures can say which
//! grant is missing.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::source::SourceKind;

/// How the bearer token was obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Service identity (client credentials, admin-consented app permissions).
    Application,
    /// Signed-in user (delegated scopes).
    #[default]
    Delegated,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::Application => "application",
            AuthMode::Delegated => "delegated",
        }
    }

    /// Remediation text for a 403 on the given kind of conversation.
    pub fn permission_hint(&self, kind: SourceKind) -> String {
        match (self, kind) {
            (AuthMode::Application, SourceKind::Chat) => {
                "the app registration needs the Chat.Read.All application permission with admin consent".to_string()
            }
            (AuthMode::Application, SourceKind::Channel) => {
                "the app registration needs the ChannelMessage.Read.All application permission with admin consent".to_string()
            }
            (AuthMode::Delegated, SourceKind::Chat) => {
                "the token needs the Chat.Read delegated scope and the signed-in user must be a member of the chat".to_string()
            }
            (AuthMode::Delegated, SourceKind::Channel) => {
                "the token needs the ChannelMessage.Read.All delegated scope and the signed-in user must be a member of the team".to_string()
            }
        }
    }

    /// Remediation text for a 401, independent of conversation kind.
    pub fn rejected_token_hint(&self) -> String {
        match self {
            AuthMode::Application => {
                "the service token was rejected; request a new client-credentials token".to_string()
            }
            AuthMode::Delegated => {
                "the user token was rejected or expired; sign in again".to_string()
            }
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque bearer token plus its [`AuthMode`].
#[derive(Clone)]
pub struct Credential {
    access_token: String,
    mode: AuthMode,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, mode: AuthMode) -> Self {
        Self {
            access_token: access_token.into(),
            mode,
        }
    }

    /// Read the token from an environment variable. Empty values count as unset.
    pub fn from_env(var: &str, mode: AuthMode) -> Option<Self> {
        std::env::var(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(|token| Self::new(token, mode))
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &format_args!("<{} bytes>", self.access_token.len()))
            .field("mode", &self.mode)
            .finish()
    }
}
