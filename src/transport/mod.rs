pub mod websocket;

use crate::state::EventSender;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Everything needed to open one duplex channel to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl ConnectionConfig {
    /// Per-room chat endpoint: `{base}/ws/chat/{room}/`.
    pub fn for_room(base_url: &str, room: &str) -> Self {
        Self {
            url: format!("{}/ws/chat/{}/", base_url.trim_end_matches('/'), room),
            headers: Vec::new(),
        }
    }
}

/// Events a link reports back to the session loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Frame(String),
    /// The channel is gone, for any reason. Sent at most once per link.
    Closed { reason: Option<String> },
}

/// Owned handle to one open (or opening) channel.
///
/// Outbound frames are queued to the link task; dropping the link aborts the
/// task without reporting a close.
#[derive(Debug)]
pub struct Link {
    outbound: mpsc::UnboundedSender<String>,
    task: Option<JoinHandle<()>>,
}

impl Link {
    pub fn new(outbound: mpsc::UnboundedSender<String>, task: Option<JoinHandle<()>>) -> Self {
        Self { outbound, task }
    }

    /// Queue a text frame. Returns false when the link task has gone away.
    pub fn send(&self, text: String) -> bool {
        self.outbound.send(text).is_ok()
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Opens links. The websocket implementation lives in [`websocket`]; tests
/// substitute an in-memory one.
pub trait Connector: Send + Sync {
    fn name(&self) -> &str;
    /// Start opening a link. Progress is reported as
    /// `SessionEvent::Transport { attempt, .. }` on `events`.
    fn open(&self, config: &ConnectionConfig, attempt: u64, events: EventSender) -> Link;
}
