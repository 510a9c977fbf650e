//! Narrow contracts for the speech engines the session drives.
//!
//! Engines report back asynchronously by posting `SessionEvent::Capture` or
//! `SessionEvent::Playback` on the sender they are given, tagged with the
//! session or handle id they were started with.

pub mod console;

use crate::error::SessionError;
use crate::state::EventSender;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Hypothesis for the utterance so far.
    Interim(String),
    /// Recognized speech for a completed utterance.
    Final(String),
    /// The engine gave up (error, no match, device lost).
    Canceled(String),
    /// Continuous capture has ended after a `stop` request.
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Completed,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSettings {
    pub voice_name: String,
    pub rate: f32,
}

pub trait SpeechCapture: Send {
    /// Begin continuous recognition for `session`. An `Err` of
    /// `SessionError::CaptureUnavailable` means the host refused the device.
    fn start(&mut self, session: u64, events: EventSender) -> Result<(), SessionError>;
    /// Ask for continuous recognition to end. On `Ok`, the engine confirms
    /// with `CaptureEvent::Stopped`.
    fn stop(&mut self) -> Result<(), SessionError>;
}

pub trait SpeechSynth: Send {
    /// Start speaking `text` under `handle`. Completion or failure arrives
    /// later as a `PlaybackEvent`.
    fn speak(
        &mut self,
        handle: u64,
        text: &str,
        voice: &VoiceSettings,
        events: EventSender,
    ) -> Result<(), SessionError>;
    /// Release the synthesizer for `handle`, cutting off any audio.
    fn close(&mut self, handle: u64);
}
