use super::{PlaybackEvent, SpeechCapture, SpeechSynth, VoiceSettings};
use crate::error::SessionError;
use crate::state::{EventSender, SessionEvent};
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;

const WORDS_PER_MINUTE: f32 = 150.0;

/// Writes spoken text to stdout and reports completion after roughly the time
/// a voice at the configured rate would need.
#[derive(Default)]
pub struct ConsoleSynth {
    pending: HashMap<u64, JoinHandle<()>>,
}

impl ConsoleSynth {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn estimated_duration(text: &str, rate: f32) -> Duration {
    let words = text.split_whitespace().count().max(1) as f32;
    let rate = if rate > 0.0 { rate } else { 1.0 };
    Duration::from_secs_f32(words * 60.0 / (WORDS_PER_MINUTE * rate))
}

impl SpeechSynth for ConsoleSynth {
    fn speak(
        &mut self,
        handle: u64,
        text: &str,
        voice: &VoiceSettings,
        events: EventSender,
    ) -> Result<(), SessionError> {
        println!("[speak:{}] {}", voice.voice_name, text);
        let duration = estimated_duration(text, voice.rate);
        let task = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = events.send(SessionEvent::Playback {
                handle,
                event: PlaybackEvent::Completed,
            });
        });
        self.pending.retain(|_, t| !t.is_finished());
        self.pending.insert(handle, task);
        Ok(())
    }

    fn close(&mut self, handle: u64) {
        if let Some(task) = self.pending.remove(&handle) {
            task.abort();
        }
    }
}

/// Capture stand-in for hosts without a speech recognizer.
pub struct UnavailableCapture;

impl SpeechCapture for UnavailableCapture {
    fn start(&mut self, _session: u64, _events: EventSender) -> Result<(), SessionError> {
        Err(SessionError::CaptureUnavailable(
            "no speech recognizer on this host".into(),
        ))
    }

    fn stop(&mut self) -> Result<(), SessionError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn voice() -> VoiceSettings {
        VoiceSettings {
            voice_name: "en-IN-AartiNeural".into(),
            rate: 1.0,
        }
    }

    #[test]
    fn duration_scales_with_rate() {
        let slow = estimated_duration("one two three four five", 1.0);
        let fast = estimated_duration("one two three four five", 2.0);
        assert_eq!(slow, Duration::from_secs(2));
        assert_eq!(fast, Duration::from_secs(1));
        assert!(estimated_duration("", 1.0) > Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn completes_after_estimate() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut synth = ConsoleSynth::new();
        synth.speak(3, "hello there", &voice(), tx).unwrap();
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(
            rx.try_recv().ok(),
            Some(SessionEvent::Playback {
                handle: 3,
                event: PlaybackEvent::Completed
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn close_suppresses_completion() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut synth = ConsoleSynth::new();
        synth.speak(1, "cut me off", &voice(), tx).unwrap();
        synth.close(1);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unavailable_capture_reports_hardware_denial() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = UnavailableCapture.start(1, tx).unwrap_err();
        assert!(err.is_hardware_denied());
    }
}
