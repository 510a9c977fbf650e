//! JSON frames exchanged with the chat backend.
//!
//! Every frame is an object with a `type` discriminator. Unknown types decode
//! to [`InboundFrame::Unknown`] so the dispatcher can ignore them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A replayed history entry as the server stores it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub message: Option<String>,
    /// `"sent"` for user messages; anything else is the bot.
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    ConnectionConfirmed {
        #[serde(default)]
        chat_messages: Vec<HistoryEntry>,
        #[serde(default)]
        user_id: Option<Value>,
        #[serde(default)]
        employee_id: Option<Value>,
    },
    ChatbotStream {
        #[serde(default)]
        chunk: String,
    },
    ChatbotResponse {
        #[serde(default)]
        message: Option<String>,
    },
    DisconnectConfirmed {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        chat_messages: Vec<HistoryEntry>,
    },
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    // Presence broadcasts, reserved.
    Connect,
    Disconnect,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Connection { username: String },
    ChatbotQuery { message: String, username: String },
    DisconnectRequest,
}

impl InboundFrame {
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InboundFrame::ConnectionConfirmed { .. } => "connection_confirmed",
            InboundFrame::ChatbotStream { .. } => "chatbot_stream",
            InboundFrame::ChatbotResponse { .. } => "chatbot_response",
            InboundFrame::DisconnectConfirmed { .. } => "disconnect_confirmed",
            InboundFrame::Error { .. } => "error",
            InboundFrame::Connect => "connect",
            InboundFrame::Disconnect => "disconnect",
            InboundFrame::Unknown => "unknown",
        }
    }
}

impl OutboundFrame {
    pub fn encode(&self) -> String {
        // Plain enum of strings; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}
