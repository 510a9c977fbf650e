use crate::message::{ChatMessage, MessageLog, Sender};

/// Accumulates `chatbot_stream` chunks until the response is finalized.
///
/// One buffer per connection, not per response: two interleaved streams would
/// corrupt each other. The backend answers queries one at a time.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    buffer: String,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, chunk: &str) {
        self.buffer.push_str(chunk);
    }

    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Complete the current response. A non-empty `explicit` message wins
    /// over the buffered chunks. The buffer is cleared either way.
    pub fn finalize(&mut self, explicit: Option<&str>, log: &mut MessageLog) -> Option<ChatMessage> {
        let buffered = std::mem::take(&mut self.buffer);
        let text = match explicit {
            Some(msg) if !msg.is_empty() => msg,
            _ => buffered.as_str(),
        };
        let message = log.append(text, Sender::Bot);
        if message.is_none() {
            log::debug!("[stream] finalized response was empty");
        }
        message
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}
