//! WebSocket message types.

use serde::{Deserialize, Serialize};

use crate::events::ProgressEvent;

/// Messages sent by the browser.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,

    /// Start a download. Missing fields are reported, not rejected.
    DownloadVideo {
        #[serde(default)]
        token: String,
        #[serde(default)]
        url: String,
        #[serde(default)]
        video_code: String,
        #[serde(default)]
        audio_code: String,
        /// Routing key for progress; generated when absent
        #[serde(default)]
        session_id: Option<String>,
    },

    /// Receive events for a session started elsewhere (e.g. after reconnecting).
    Subscribe { session_id: String },

    Unsubscribe { session_id: String },
}

/// Control replies to [`ClientMessage`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Pong,
    Error { message: String },
    DownloadAccepted { session_id: String, download_id: String },
    Subscribed { session_id: String },
    Unsubscribed { session_id: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

/// Anything written to the socket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outbound {
    Control(ServerMessage),
    Event(ProgressEvent),
}
