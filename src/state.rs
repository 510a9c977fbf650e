use crate::message::ChatMessage;
use crate::speech::{CaptureEvent, PlaybackEvent};
use crate::transport::TransportEvent;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    Listening,
}

/// Stimuli handled by the session loop, one at a time.
///
/// Timer events carry the token of the thing they were armed for; a token
/// that no longer matches means the timer was superseded.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Transport { attempt: u64, event: TransportEvent },
    ReconnectDue { attempt: u64 },
    Capture { session: u64, event: CaptureEvent },
    SilenceDeadline { session: u64, seq: u64 },
    Playback { handle: u64, event: PlaybackEvent },
    ReleaseDue { handle: u64 },
    AutoSpeak { message_id: i64 },
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Connection(ConnectionState),
    MessageAppended(ChatMessage),
    HistoryMerged { added: usize },
    Typing(bool),
    Input(String),
    Listening(bool),
    /// Message currently being spoken, if any.
    Speaking(Option<i64>),
    AutoSpeak(bool),
    Identified { user_id: Option<String>, employee_id: Option<String> },
    ServerError(String),
    /// Capture or playback hardware was refused outside a direct request.
    DeviceError(String),
}

pub type UpdateSender = mpsc::UnboundedSender<SessionUpdate>;

pub(crate) fn notify(tx: &UpdateSender, update: SessionUpdate) {
    let _ = tx.send(update);
}
