use crate::text;
use chrono::Local;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Bot => write!(f, "bot"),
        }
    }
}

/// One finished entry in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// Creation time in milliseconds since the epoch.
    pub id: i64,
    pub text: String,
    pub sender: Sender,
    /// Local calendar date, `YYYY-MM-DD`.
    pub date: String,
}

pub(crate) fn now_ms() -> i64 {
    Local::now().timestamp_millis()
}

pub(crate) fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Ordered message history for the active session.
///
/// Append-only; history replays go through [`MessageLog::extend_merged`].
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Vec<ChatMessage>,
    last_local_id: i64,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn get(&self, id: i64) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Append a locally created message. Returns `None` when the normalized
    /// text is blank.
    pub fn append(&mut self, text: &str, sender: Sender) -> Option<ChatMessage> {
        let cleaned = text::clean(text);
        if text::is_blank(&cleaned) {
            return None;
        }
        let id = now_ms().max(self.last_local_id + 1);
        self.last_local_id = id;
        let message = ChatMessage {
            id,
            text: cleaned,
            sender,
            date: today(),
        };
        self.messages.push(message.clone());
        Some(message)
    }

    /// `(sender, text)` pairs currently in the log.
    pub fn pairs(&self) -> HashSet<(Sender, String)> {
        self.messages
            .iter()
            .map(|m| (m.sender, m.text.clone()))
            .collect()
    }

    pub(crate) fn extend_merged(&mut self, merged: impl IntoIterator<Item = ChatMessage>) {
        self.messages.extend(merged);
    }
}
