use crate::error::SessionError;
use crate::speech::{PlaybackEvent, SpeechSynth, VoiceSettings};
use crate::state::{EventSender, SessionEvent};
use crate::timer::ScheduledTask;
use std::time::Duration;

/// How long the speaking indicator outlives the end of synthesis.
pub const RELEASE_DELAY_MS: u64 = 5_000;

struct PlaybackSession {
    message_id: i64,
    handle: u64,
    release: Option<ScheduledTask>,
}

/// Exclusive speech playback: at most one synthesis handle is open.
pub struct PlaybackController {
    synth: Box<dyn SpeechSynth>,
    voice: VoiceSettings,
    events: EventSender,
    active: Option<PlaybackSession>,
    next_handle: u64,
}

impl PlaybackController {
    pub fn new(synth: Box<dyn SpeechSynth>, voice: VoiceSettings, events: EventSender) -> Self {
        Self {
            synth,
            voice,
            events,
            active: None,
            next_handle: 0,
        }
    }

    /// Message whose speaking indicator is showing.
    pub fn speaking(&self) -> Option<i64> {
        self.active.as_ref().map(|s| s.message_id)
    }

    pub fn active_handle(&self) -> Option<u64> {
        self.active.as_ref().map(|s| s.handle)
    }

    /// Speak `text` for `message_id`, preempting whatever is playing.
    ///
    /// Only a hardware denial is returned as an error; other synthesis
    /// failures just leave nothing playing.
    pub fn play(&mut self, text: &str, message_id: i64) -> Result<(), SessionError> {
        self.stop();
        self.next_handle += 1;
        let handle = self.next_handle;
        match self
            .synth
            .speak(handle, text, &self.voice, self.events.clone())
        {
            Ok(()) => {
                log::info!("[playback] speaking message {} (handle {})", message_id, handle);
                self.active = Some(PlaybackSession {
                    message_id,
                    handle,
                    release: None,
                });
                Ok(())
            }
            Err(e) if e.is_hardware_denied() => {
                log::error!("[playback] synthesis unavailable: {}", e);
                Err(e)
            }
            Err(e) => {
                log::warn!("[playback] synthesis failed to start: {}", e);
                self.synth.close(handle);
                Ok(())
            }
        }
    }

    /// Cancel any pending release and close the active handle now.
    /// Returns true when something was playing.
    pub fn stop(&mut self) -> bool {
        let Some(session) = self.active.take() else {
            return false;
        };
        if let Some(release) = session.release {
            release.cancel();
        }
        self.synth.close(session.handle);
        log::info!("[playback] stopped message {}", session.message_id);
        true
    }

    pub fn toggle(&mut self, message_id: i64, text: &str) -> Result<(), SessionError> {
        if self.speaking() == Some(message_id) {
            self.stop();
            Ok(())
        } else {
            self.play(text, message_id)
        }
    }

    /// Synthesis callback. Returns true when the speaking indicator changed.
    pub fn handle_event(&mut self, handle: u64, event: PlaybackEvent) -> bool {
        let events = self.events.clone();
        let Some(session) = self.active.as_mut().filter(|s| s.handle == handle) else {
            log::debug!("[playback] event for released handle {}: {:?}", handle, event);
            return false;
        };
        match event {
            PlaybackEvent::Completed => {
                log::debug!(
                    "[playback] handle {} done, releasing in {}ms",
                    handle,
                    RELEASE_DELAY_MS
                );
                session.release = Some(ScheduledTask::schedule(
                    &events,
                    Duration::from_millis(RELEASE_DELAY_MS),
                    SessionEvent::ReleaseDue { handle },
                ));
                false
            }
            PlaybackEvent::Failed(err) => {
                log::warn!("[playback] synthesis error on handle {}: {}", handle, err);
                self.stop()
            }
        }
    }

    /// Delayed release fired. Returns true when the indicator cleared.
    pub fn on_release_due(&mut self, handle: u64) -> bool {
        if self.active_handle() != Some(handle) {
            log::debug!("[playback] stale release for handle {}", handle);
            return false;
        }
        self.stop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Speak(u64, String),
        Close(u64),
    }

    struct FakeSynth {
        calls: Arc<Mutex<Vec<Call>>>,
        result: Result<(), SessionError>,
    }

    impl SpeechSynth for FakeSynth {
        fn speak(
            &mut self,
            handle: u64,
            text: &str,
            _voice: &VoiceSettings,
            _events: EventSender,
        ) -> Result<(), SessionError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Speak(handle, text.to_string()));
            self.result.clone()
        }

        fn close(&mut self, handle: u64) {
            self.calls.lock().unwrap().push(Call::Close(handle));
        }
    }

    fn controller(
        result: Result<(), SessionError>,
    ) -> (
        PlaybackController,
        Arc<Mutex<Vec<Call>>>,
        mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        let synth = FakeSynth {
            calls: calls.clone(),
            result,
        };
        let voice = VoiceSettings {
            voice_name: "en-IN-AartiNeural".into(),
            rate: 1.75,
        };
        (PlaybackController::new(Box::new(synth), voice, tx), calls, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn completion_holds_indicator_for_release_delay() {
        let (mut playback, calls, mut rx) = controller(Ok(()));
        playback.play("hello", 10).unwrap();
        assert_eq!(playback.speaking(), Some(10));

        assert!(!playback.handle_event(1, PlaybackEvent::Completed));
        assert_eq!(playback.speaking(), Some(10));

        tokio::time::sleep(Duration::from_millis(4_999)).await;
        assert!(rx.try_recv().is_err());
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(rx.try_recv().ok(), Some(SessionEvent::ReleaseDue { handle: 1 }));

        assert!(playback.on_release_due(1));
        assert_eq!(playback.speaking(), None);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![Call::Speak(1, "hello".into()), Call::Close(1)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn new_play_preempts_previous() {
        let (mut playback, calls, mut rx) = controller(Ok(()));
        playback.play("first", 1).unwrap();
        playback.play("second", 2).unwrap();
        assert_eq!(playback.speaking(), Some(2));
        assert_eq!(playback.active_handle(), Some(2));

        // Late completion for the preempted handle must not arm a release.
        assert!(!playback.handle_event(1, PlaybackEvent::Completed));
        tokio::time::sleep(Duration::from_millis(10_000)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(playback.speaking(), Some(2));

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                Call::Speak(1, "first".into()),
                Call::Close(1),
                Call::Speak(2, "second".into()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_release() {
        let (mut playback, calls, mut rx) = controller(Ok(()));
        playback.play("hello", 10).unwrap();
        playback.handle_event(1, PlaybackEvent::Completed);
        assert!(playback.stop());

        tokio::time::sleep(Duration::from_millis(6_000)).await;
        assert!(rx.try_recv().is_err());
        assert!(!playback.on_release_due(1));
        let closes = calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, Call::Close(_)))
            .count();
        assert_eq!(closes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn release_timer_from_preempted_session_is_invalid() {
        let (mut playback, _calls, mut rx) = controller(Ok(()));
        playback.play("first", 1).unwrap();
        playback.handle_event(1, PlaybackEvent::Completed);
        playback.play("second", 2).unwrap();

        tokio::time::sleep(Duration::from_millis(6_000)).await;
        assert!(rx.try_recv().is_err());
        assert!(!playback.on_release_due(1));
        assert_eq!(playback.speaking(), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_releases_immediately() {
        let (mut playback, calls, _rx) = controller(Ok(()));
        playback.play("hello", 10).unwrap();
        assert!(playback.handle_event(1, PlaybackEvent::Failed("voice not found".into())));
        assert_eq!(playback.speaking(), None);
        assert_eq!(calls.lock().unwrap().last(), Some(&Call::Close(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_stops_same_message_and_plays_other() {
        let (mut playback, _calls, _rx) = controller(Ok(()));
        playback.toggle(5, "five").unwrap();
        assert_eq!(playback.speaking(), Some(5));
        playback.toggle(5, "five").unwrap();
        assert_eq!(playback.speaking(), None);
        playback.toggle(5, "five").unwrap();
        playback.toggle(6, "six").unwrap();
        assert_eq!(playback.speaking(), Some(6));
    }

    #[test]
    fn denied_hardware_is_reported() {
        let (mut playback, _calls, _rx) =
            controller(Err(SessionError::PlaybackUnavailable("no audio device".into())));
        let err = playback.play("hello", 1).unwrap_err();
        assert!(err.is_hardware_denied());
        assert_eq!(playback.speaking(), None);
    }

    #[test]
    fn start_failure_clears_indicator() {
        let (mut playback, calls, _rx) =
            controller(Err(SessionError::Playback("bad voice".into())));
        playback.play("hello", 1).unwrap();
        assert_eq!(playback.speaking(), None);
        assert_eq!(calls.lock().unwrap().last(), Some(&Call::Close(1)));
    }
}
