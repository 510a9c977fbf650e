/// Errors surfaced to whoever drives a chat session.
///
/// Transport drops, recognizer cancellations and synthesis failures are
/// recovered inside the session and only show up here when the host refuses
/// the underlying hardware outright.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("not connected")]
    NotConnected,
    #[error("speech capture unavailable: {0}")]
    CaptureUnavailable(String),
    #[error("speech playback unavailable: {0}")]
    PlaybackUnavailable(String),
    #[error("capture error: {0}")]
    Capture(String),
    #[error("playback error: {0}")]
    Playback(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("session closed")]
    SessionClosed,
}

impl SessionError {
    /// Whether the host denied access to capture or playback hardware.
    pub fn is_hardware_denied(&self) -> bool {
        matches!(
            self,
            SessionError::CaptureUnavailable(_) | SessionError::PlaybackUnavailable(_)
        )
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(SessionError::EmptyMessage.to_string(), "message cannot be empty");
        assert_eq!(SessionError::NotConnected.to_string(), "not connected");
        assert_eq!(
            SessionError::CaptureUnavailable("no microphone".into()).to_string(),
            "speech capture unavailable: no microphone"
        );
        assert_eq!(
            SessionError::Config("room is empty".into()).to_string(),
            "config error: room is empty"
        );
        assert_eq!(SessionError::SessionClosed.to_string(), "session closed");
    }

    #[test]
    fn test_hardware_denied() {
        assert!(SessionError::CaptureUnavailable(String::new()).is_hardware_denied());
        assert!(SessionError::PlaybackUnavailable(String::new()).is_hardware_denied());
        assert!(!SessionError::Capture("aborted".into()).is_hardware_denied());
        assert!(!SessionError::NotConnected.is_hardware_denied());
    }

    #[test]
    fn test_from_serde_error() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: SessionError = err.into();
        assert!(matches!(err, SessionError::Decode(_)));
    }
}
