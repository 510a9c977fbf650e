use crate::protocol::{InboundFrame, OutboundFrame};
use crate::state::{ConnectionState, EventSender, SessionEvent};
use crate::timer::ScheduledTask;
use crate::transport::{ConnectionConfig, Connector, Link};
use std::sync::Arc;
use std::time::Duration;

pub const RECONNECT_DELAY_MS: u64 = 3_000;

/// Owns the transport and its reconnect policy.
///
/// Every connect bumps `attempt`; transport events and reconnect timers carry
/// the attempt they belong to, and anything tagged with an older attempt is
/// dropped. Retries are unconditional: fixed delay, no cap.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    config: ConnectionConfig,
    username: String,
    events: EventSender,
    state: ConnectionState,
    attempt: u64,
    link: Option<Link>,
    reconnect: Option<ScheduledTask>,
    shut_down: bool,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        config: ConnectionConfig,
        username: String,
        events: EventSender,
    ) -> Self {
        Self {
            connector,
            config,
            username,
            events,
            state: ConnectionState::Disconnected,
            attempt: 0,
            link: None,
            reconnect: None,
            shut_down: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn endpoint(&self) -> &str {
        &self.config.url
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect.is_some()
    }

    /// Tear down whatever link exists and start a fresh attempt.
    pub fn connect(&mut self) {
        if self.shut_down {
            return;
        }
        if let Some(timer) = self.reconnect.take() {
            timer.cancel();
        }
        self.link = None;
        self.attempt += 1;
        log::info!(
            "[connection] attempt {} via {} -> {}",
            self.attempt,
            self.connector.name(),
            self.config.url
        );
        self.link = Some(
            self.connector
                .open(&self.config, self.attempt, self.events.clone()),
        );
        self.state = ConnectionState::Connecting;
    }

    /// Transport reported open. Returns false for a stale attempt.
    pub fn on_open(&mut self, attempt: u64) -> bool {
        if attempt != self.attempt || self.link.is_none() {
            log::debug!("[connection] ignoring open from stale attempt {}", attempt);
            return false;
        }
        self.state = ConnectionState::Connected;
        log::info!("[connection] connected (attempt {})", attempt);
        self.send(&OutboundFrame::Connection {
            username: self.username.clone(),
        });
        true
    }

    /// Transport reported close. Schedules the next attempt. Returns false
    /// for a stale attempt.
    pub fn on_closed(&mut self, attempt: u64, reason: Option<&str>) -> bool {
        if attempt != self.attempt || self.link.is_none() {
            log::debug!("[connection] ignoring close from stale attempt {}", attempt);
            return false;
        }
        self.link = None;
        self.state = ConnectionState::Disconnected;
        match reason {
            Some(reason) => log::warn!("[connection] closed: {}", reason),
            None => log::warn!("[connection] closed"),
        }
        if !self.shut_down {
            log::info!("[connection] reconnecting in {}ms", RECONNECT_DELAY_MS);
            self.reconnect = Some(ScheduledTask::schedule(
                &self.events,
                Duration::from_millis(RECONNECT_DELAY_MS),
                SessionEvent::ReconnectDue { attempt },
            ));
        }
        true
    }

    pub fn on_reconnect_due(&mut self, attempt: u64) {
        if attempt != self.attempt || self.state != ConnectionState::Disconnected {
            log::debug!("[connection] dropping stale reconnect timer {}", attempt);
            return;
        }
        self.reconnect = None;
        self.connect();
    }

    /// Host view came back to the foreground.
    pub fn on_visible(&mut self) {
        if self.state != ConnectionState::Connected {
            log::info!("[connection] visible while {}, reconnecting now", self.state);
            self.connect();
        }
    }

    /// Decode an inbound frame. Malformed frames are logged and dropped.
    pub fn decode(&self, text: &str) -> Option<InboundFrame> {
        match InboundFrame::decode(text) {
            Ok(frame) => Some(frame),
            Err(e) => {
                log::warn!("[connection] dropping malformed frame ({}): {}", e, text);
                None
            }
        }
    }

    /// Send a frame. Silently dropped unless connected.
    pub fn send(&self, frame: &OutboundFrame) -> bool {
        if self.state != ConnectionState::Connected {
            log::debug!("[connection] not connected, dropping outbound frame");
            return false;
        }
        match &self.link {
            Some(link) => link.send(frame.encode()),
            None => false,
        }
    }

    /// Close the link for good; no reconnect follows.
    pub fn shutdown(&mut self) {
        self.shut_down = true;
        if let Some(timer) = self.reconnect.take() {
            timer.cancel();
        }
        self.link = None;
        self.state = ConnectionState::Disconnected;
        log::info!("[connection] shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Records open calls and keeps the outbound receivers so tests can read
    /// what was sent.
    #[derive(Default)]
    struct FakeConnector {
        opened: Mutex<Vec<(u64, mpsc::UnboundedReceiver<String>)>>,
    }

    impl FakeConnector {
        fn attempts(&self) -> Vec<u64> {
            self.opened.lock().unwrap().iter().map(|(a, _)| *a).collect()
        }

        fn sent(&self, attempt: u64) -> Vec<String> {
            let mut opened = self.opened.lock().unwrap();
            let (_, rx) = opened.iter_mut().find(|(a, _)| *a == attempt).unwrap();
            let mut out = Vec::new();
            while let Ok(frame) = rx.try_recv() {
                out.push(frame);
            }
            out
        }
    }

    impl Connector for FakeConnector {
        fn name(&self) -> &str {
            "fake"
        }

        fn open(&self, _config: &ConnectionConfig, attempt: u64, _events: EventSender) -> Link {
            let (tx, rx) = mpsc::unbounded_channel();
            self.opened.lock().unwrap().push((attempt, rx));
            Link::new(tx, None)
        }
    }

    fn manager() -> (
        ConnectionManager,
        Arc<FakeConnector>,
        mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        let connector = Arc::new(FakeConnector::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let mgr = ConnectionManager::new(
            connector.clone(),
            ConnectionConfig::for_room("wss://chat.example.com", "default"),
            "asha".into(),
            tx,
        );
        (mgr, connector, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn open_sends_identification() {
        let (mut mgr, connector, _rx) = manager();
        mgr.connect();
        assert_eq!(mgr.state(), ConnectionState::Connecting);
        assert!(mgr.on_open(1));
        assert!(mgr.is_connected());
        assert_eq!(
            connector.sent(1),
            vec![r#"{"type":"connection","username":"asha"}"#.to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn send_is_dropped_while_connecting() {
        let (mut mgr, connector, _rx) = manager();
        mgr.connect();
        let sent = mgr.send(&OutboundFrame::ChatbotQuery {
            message: "hi".into(),
            username: "asha".into(),
        });
        assert!(!sent);
        assert!(connector.sent(1).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn close_schedules_reconnect_after_three_seconds() {
        let (mut mgr, _connector, mut rx) = manager();
        mgr.connect();
        mgr.on_open(1);
        assert!(mgr.on_closed(1, Some("1006 abnormal")));
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        assert!(mgr.reconnect_pending());

        tokio::time::sleep(Duration::from_millis(2_999)).await;
        assert!(rx.try_recv().is_err());
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(rx.try_recv().ok(), Some(SessionEvent::ReconnectDue { attempt: 1 }));

        mgr.on_reconnect_due(1);
        assert_eq!(mgr.attempt(), 2);
        assert_eq!(mgr.state(), ConnectionState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_forever_without_backoff() {
        let (mut mgr, connector, mut rx) = manager();
        mgr.connect();
        for attempt in 1..=25u64 {
            assert!(mgr.on_closed(attempt, None));
            tokio::time::sleep(Duration::from_millis(RECONNECT_DELAY_MS)).await;
            match rx.recv().await {
                Some(SessionEvent::ReconnectDue { attempt: due }) => {
                    assert_eq!(due, attempt);
                    mgr.on_reconnect_due(due);
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert_eq!(connector.attempts().len(), 26);
    }

    #[tokio::test(start_paused = true)]
    async fn visibility_preempts_reconnect_timer() {
        let (mut mgr, connector, mut rx) = manager();
        mgr.connect();
        mgr.on_closed(1, None);
        mgr.on_visible();
        assert_eq!(mgr.attempt(), 2);
        assert!(!mgr.reconnect_pending());

        // The old timer is gone; even a late delivery would be stale.
        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert!(rx.try_recv().is_err());
        mgr.on_reconnect_due(1);
        assert_eq!(mgr.attempt(), 2);
        assert_eq!(connector.attempts(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn visibility_is_noop_when_connected() {
        let (mut mgr, _connector, _rx) = manager();
        mgr.connect();
        mgr.on_open(1);
        mgr.on_visible();
        assert_eq!(mgr.attempt(), 1);
        assert!(mgr.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_attempt_events_are_ignored() {
        let (mut mgr, _connector, _rx) = manager();
        mgr.connect();
        mgr.connect();
        assert!(!mgr.on_open(1));
        assert_eq!(mgr.state(), ConnectionState::Connecting);
        assert!(!mgr.on_closed(1, None));
        assert!(!mgr.reconnect_pending());
        assert!(mgr.on_open(2));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_reconnecting() {
        let (mut mgr, connector, mut rx) = manager();
        mgr.connect();
        mgr.on_closed(1, None);
        mgr.shutdown();
        tokio::time::sleep(Duration::from_millis(10_000)).await;
        assert!(rx.try_recv().is_err());
        mgr.connect();
        assert_eq!(connector.attempts(), vec![1]);
    }

    #[test]
    fn malformed_frames_are_dropped() {
        let (mgr, _connector, _rx) = manager();
        assert!(mgr.decode("{oops").is_none());
        assert_eq!(
            mgr.decode(r#"{"type":"chatbot_stream","chunk":"x"}"#),
            Some(InboundFrame::ChatbotStream { chunk: "x".into() })
        );
    }
}
