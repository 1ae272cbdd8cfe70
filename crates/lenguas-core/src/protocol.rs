//! Relay control frames.
//!
//! Everything exchanged on the realtime WebSocket after configuration is
//! provider-defined and forwarded untouched. Only the handful of control
//! frames the relay itself consumes or emits have a schema here.

use serde::{Deserialize, Serialize};

/// A control frame sent by the downstream client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientControl {
    /// Select the target language and bootstrap the upstream session.
    #[serde(rename = "session.configure", rename_all = "camelCase")]
    Configure {
        language: String,
        #[serde(default, alias = "includesTramitesContext")]
        include_domain_context: bool,
    },
}

impl ClientControl {
    /// Parse a text frame as a control frame. Returns `None` for anything
    /// that is not a well-formed `session.configure` message.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

/// A control frame sent by the relay to the downstream client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerControl {
    /// Upstream session configured; frames are relayed from now on.
    #[serde(rename = "session.ready", rename_all = "camelCase")]
    Ready { language: String, session_id: String },

    #[serde(rename = "error")]
    Error { error: String },
}

impl ServerControl {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        // Both variants contain only strings, serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}
