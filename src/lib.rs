//! Client core for a conversational chat backend spoken over WebSocket, with
//! optional speech capture for input and speech synthesis for replies.

pub mod connection;
pub mod error;
pub mod history;
pub mod message;
pub mod playback;
pub mod protocol;
pub mod session;
pub mod settings;
pub mod speech;
pub mod state;
pub mod stream;
pub mod text;
pub mod timer;
pub mod transport;
pub mod voice;

pub use error::SessionError;
pub use message::{ChatMessage, MessageLog, Sender};
pub use session::{SessionFacade, SessionHandle, SessionSnapshot};
pub use settings::Settings;
pub use state::{ConnectionState, SessionEvent, SessionUpdate, VoiceState};
