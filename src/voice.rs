//! Push-to-talk capture that also ends an utterance on its own after a pause.
//!
//! Transitions:
//! - Idle -> Listening on `start`
//! - Listening -> Idle on a final transcript, a silence deadline with text,
//!   a cancellation, or an explicit `stop` once the engine confirms

use crate::error::SessionError;
use crate::speech::{CaptureEvent, SpeechCapture};
use crate::state::{EventSender, SessionEvent, VoiceState};
use crate::text;
use crate::timer::ScheduledTask;
use std::time::Duration;
use tokio::time::Instant;

pub const SILENCE_THRESHOLD_MS: u64 = 2_000;

struct VoiceSession {
    id: u64,
    last_speech: Instant,
    interim: String,
    deadline: Option<ScheduledTask>,
    deadline_seq: u64,
    stopping: bool,
}

/// What the session should do after a capture event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceOutcome {
    Nothing,
    /// Interim hypothesis to show as the current input.
    Input(String),
    /// End of utterance: send this as a user message.
    Submit(String),
    /// Capture ended without anything to send.
    Ended,
}

pub struct VoiceCaptureController {
    capture: Box<dyn SpeechCapture>,
    events: EventSender,
    session: Option<VoiceSession>,
    next_session: u64,
}

impl VoiceCaptureController {
    pub fn new(capture: Box<dyn SpeechCapture>, events: EventSender) -> Self {
        Self {
            capture,
            events,
            session: None,
            next_session: 0,
        }
    }

    pub fn state(&self) -> VoiceState {
        match self.session {
            Some(_) => VoiceState::Listening,
            None => VoiceState::Idle,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.session.is_some()
    }

    /// Start continuous capture. Already listening is a no-op.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.session.is_some() {
            log::debug!("[voice] start while already listening");
            return Ok(());
        }
        self.next_session += 1;
        let id = self.next_session;
        if let Err(e) = self.capture.start(id, self.events.clone()) {
            log::error!("[voice] capture failed to start: {}", e);
            return Err(e);
        }
        self.session = Some(VoiceSession {
            id,
            last_speech: Instant::now(),
            interim: String::new(),
            deadline: None,
            deadline_seq: 0,
            stopping: false,
        });
        log::info!("[voice] listening (session {})", id);
        Ok(())
    }

    /// Explicit stop, e.g. push-to-talk released.
    pub fn stop(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let Some(deadline) = session.deadline.take() {
            deadline.cancel();
        }
        if session.stopping {
            return;
        }
        match self.capture.stop() {
            Ok(()) => {
                session.stopping = true;
                log::debug!("[voice] stop requested (session {})", session.id);
            }
            Err(e) => {
                log::warn!("[voice] capture stop failed: {}", e);
                self.end("stop failed");
            }
        }
    }

    pub fn handle_event(&mut self, session: u64, event: CaptureEvent) -> VoiceOutcome {
        let Some(current) = self.session.as_ref() else {
            log::debug!("[voice] capture event while idle: {:?}", event);
            return VoiceOutcome::Nothing;
        };
        if current.id != session {
            log::debug!("[voice] capture event from stale session {}", session);
            return VoiceOutcome::Nothing;
        }
        match event {
            CaptureEvent::Interim(text) => self.on_interim(text),
            CaptureEvent::Final(text) => self.on_final(text),
            CaptureEvent::Canceled(reason) => {
                log::warn!("[voice] capture canceled: {}", reason);
                self.end("canceled");
                VoiceOutcome::Ended
            }
            CaptureEvent::Stopped => {
                self.end("stopped");
                VoiceOutcome::Ended
            }
        }
    }

    fn on_interim(&mut self, text: String) -> VoiceOutcome {
        let events = self.events.clone();
        let Some(session) = self.session.as_mut() else {
            return VoiceOutcome::Nothing;
        };
        if text.is_empty() {
            return VoiceOutcome::Nothing;
        }
        session.last_speech = Instant::now();
        session.interim = text.clone();
        // Awaiting stop confirmation: show the hypothesis but never re-arm.
        if session.stopping {
            return VoiceOutcome::Input(text);
        }
        session.deadline_seq += 1;
        // Replacing the slot drops, and so aborts, the previous deadline.
        session.deadline = Some(ScheduledTask::schedule(
            &events,
            Duration::from_millis(SILENCE_THRESHOLD_MS),
            SessionEvent::SilenceDeadline {
                session: session.id,
                seq: session.deadline_seq,
            },
        ));
        VoiceOutcome::Input(text)
    }

    /// Engines often deliver the last final only after `stop`, so a final
    /// is submitted for as long as the session exists.
    fn on_final(&mut self, text: String) -> VoiceOutcome {
        if text::is_blank(&text) {
            return VoiceOutcome::Nothing;
        }
        log::info!("[voice] final transcript: \"{}\"", text);
        // No-op when a stop is already pending.
        self.stop();
        VoiceOutcome::Submit(text)
    }

    pub fn on_silence_deadline(&mut self, session: u64, seq: u64) -> VoiceOutcome {
        let Some(current) = self.session.as_mut() else {
            return VoiceOutcome::Nothing;
        };
        if current.id != session || current.deadline_seq != seq || current.stopping {
            log::debug!("[voice] stale silence deadline {}/{}", session, seq);
            return VoiceOutcome::Nothing;
        }
        current.deadline = None;
        if text::is_blank(&current.interim) {
            return VoiceOutcome::Nothing;
        }
        let text = current.interim.clone();
        log::info!(
            "[voice] {}ms of silence, submitting \"{}\"",
            current.last_speech.elapsed().as_millis(),
            text
        );
        self.stop();
        VoiceOutcome::Submit(text)
    }

    fn end(&mut self, why: &str) {
        if let Some(session) = self.session.take() {
            log::info!("[voice] idle (session {} {})", session.id, why);
        }
    }
}
