//! The session facade: one task owns every controller and handles commands
//! from the presentation layer and events from transport, timers and speech
//! engines strictly one at a time.

use crate::connection::ConnectionManager;
use crate::error::SessionError;
use crate::history;
use crate::message::{ChatMessage, MessageLog, Sender};
use crate::playback::PlaybackController;
use crate::protocol::{HistoryEntry, InboundFrame, OutboundFrame};
use crate::settings::Settings;
use crate::speech::{SpeechCapture, SpeechSynth};
use crate::state::{
    notify, ConnectionState, SessionEvent, SessionUpdate, UpdateSender, VoiceState,
};
use crate::stream::StreamAssembler;
use crate::text;
use crate::timer::ScheduledTask;
use crate::transport::{Connector, TransportEvent};
use crate::voice::{VoiceCaptureController, VoiceOutcome};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Deferral between a bot message landing and auto-speak starting.
pub const AUTO_SPEAK_DELAY_MS: u64 = 100;

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

#[derive(Debug)]
pub enum Command {
    SendText { text: String, reply: Reply<ChatMessage> },
    SetInput(String),
    StartCapture { reply: Reply<()> },
    StopCapture,
    TogglePlayback { message_id: i64, reply: Reply<()> },
    StopPlayback,
    SetAutoSpeak(bool),
    Visibility(bool),
    EndSession { reply: Reply<()> },
    Snapshot { reply: oneshot::Sender<SessionSnapshot> },
    Shutdown,
}

/// Point-in-time view of the session for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub connection: ConnectionState,
    pub messages: Vec<ChatMessage>,
    pub typing: bool,
    pub input: String,
    pub voice: VoiceState,
    pub speaking: Option<i64>,
    pub auto_speak: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Published {
    connection: ConnectionState,
    listening: bool,
    speaking: Option<i64>,
}

pub struct SessionFacade {
    username: String,
    connection: ConnectionManager,
    log: MessageLog,
    stream: StreamAssembler,
    voice: VoiceCaptureController,
    playback: PlaybackController,
    typing: bool,
    input: String,
    auto_speak: bool,
    pending_speak: Option<ScheduledTask>,
    user_id: Option<String>,
    employee_id: Option<String>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    updates: UpdateSender,
    published: Published,
}

fn id_string(value: Option<Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

impl SessionFacade {
    pub fn new(
        settings: &Settings,
        connector: Arc<dyn Connector>,
        capture: Box<dyn SpeechCapture>,
        synth: Box<dyn SpeechSynth>,
        updates: UpdateSender,
    ) -> Result<Self, SessionError> {
        settings.validate()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let connection = ConnectionManager::new(
            connector,
            settings.connection_config(),
            settings.username.clone(),
            events_tx.clone(),
        );
        let voice = VoiceCaptureController::new(capture, events_tx.clone());
        let playback = PlaybackController::new(synth, settings.voice(), events_tx.clone());
        Ok(Self {
            username: settings.username.clone(),
            connection,
            log: MessageLog::new(),
            stream: StreamAssembler::new(),
            voice,
            playback,
            typing: false,
            input: String::new(),
            auto_speak: settings.auto_speak,
            pending_speak: None,
            user_id: None,
            employee_id: None,
            events_tx,
            events_rx: Some(events_rx),
            updates,
            published: Published {
                connection: ConnectionState::Disconnected,
                listening: false,
                speaking: None,
            },
        })
    }

    /// Run the session on its own task.
    pub fn spawn(self) -> (SessionHandle, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(commands_rx));
        (
            SessionHandle {
                commands: commands_tx,
            },
            task,
        )
    }

    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let Some(mut events) = self.events_rx.take() else {
            log::error!("[session] already running");
            return;
        };
        log::info!(
            "[session] starting for '{}' at {}",
            self.username,
            self.connection.endpoint()
        );
        self.connect();
        loop {
            // Internal events drain before the next command so a command never
            // observes state older than an event queued ahead of it.
            tokio::select! {
                biased;
                Some(event) = events.recv() => self.handle_event(event),
                cmd = commands.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
            }
        }
        self.shutdown();
        log::info!("[session] stopped");
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            connection: self.connection.state(),
            messages: self.log.messages().to_vec(),
            typing: self.typing,
            input: self.input.clone(),
            voice: self.voice.state(),
            speaking: self.playback.speaking(),
            auto_speak: self.auto_speak,
        }
    }

    pub fn connect(&mut self) {
        self.connection.connect();
        self.publish();
    }

    /// Submit a user utterance, typed or spoken.
    pub fn send_text(&mut self, text: &str) -> Result<ChatMessage, SessionError> {
        if text::is_blank(&text::clean(text)) {
            return Err(SessionError::EmptyMessage);
        }
        if !self.connection.is_connected() {
            return Err(SessionError::NotConnected);
        }
        let message = self
            .log
            .append(text, Sender::User)
            .ok_or(SessionError::EmptyMessage)?;
        notify(&self.updates, SessionUpdate::MessageAppended(message.clone()));
        self.set_typing(true);
        self.connection.send(&OutboundFrame::ChatbotQuery {
            message: text.to_string(),
            username: self.username.clone(),
        });
        self.set_input(String::new());
        Ok(message)
    }

    pub fn set_input(&mut self, input: String) {
        if self.input != input {
            self.input = input;
            notify(&self.updates, SessionUpdate::Input(self.input.clone()));
        }
    }

    pub fn start_capture(&mut self) -> Result<(), SessionError> {
        let was_listening = self.voice.is_listening();
        self.voice.start()?;
        if !was_listening {
            self.set_input(String::new());
        }
        self.publish();
        Ok(())
    }

    pub fn stop_capture(&mut self) {
        self.voice.stop();
        self.publish();
    }

    pub fn toggle_playback(&mut self, message_id: i64) -> Result<(), SessionError> {
        let result = match self.log.get(message_id) {
            Some(message) => {
                let text = message.text.clone();
                self.playback.toggle(message_id, &text)
            }
            None => Err(SessionError::Playback(format!(
                "no message with id {}",
                message_id
            ))),
        };
        self.publish();
        result
    }

    pub fn stop_playback(&mut self) {
        self.playback.stop();
        self.publish();
    }

    pub fn set_auto_speak(&mut self, enabled: bool) {
        if self.auto_speak != enabled {
            self.auto_speak = enabled;
            log::info!("[session] auto-speak {}", if enabled { "on" } else { "off" });
            notify(&self.updates, SessionUpdate::AutoSpeak(enabled));
        }
    }

    pub fn set_visible(&mut self, visible: bool) {
        if visible {
            self.connection.on_visible();
            self.publish();
        }
    }

    /// Ask the server to end the chat session. History it returns is merged.
    pub fn end_session(&mut self) -> Result<(), SessionError> {
        if !self.connection.is_connected() {
            return Err(SessionError::NotConnected);
        }
        self.connection.send(&OutboundFrame::DisconnectRequest);
        Ok(())
    }

    pub fn shutdown(&mut self) {
        self.voice.stop();
        self.playback.stop();
        self.pending_speak = None;
        self.connection.shutdown();
        self.set_typing(false);
        self.publish();
    }

    pub fn handle_command(&mut self, command: Command) {
        match command {
            Command::SendText { text, reply } => {
                let _ = reply.send(self.send_text(&text));
            }
            Command::SetInput(input) => self.set_input(input),
            Command::StartCapture { reply } => {
                let _ = reply.send(self.start_capture());
            }
            Command::StopCapture => self.stop_capture(),
            Command::TogglePlayback { message_id, reply } => {
                let _ = reply.send(self.toggle_playback(message_id));
            }
            Command::StopPlayback => self.stop_playback(),
            Command::SetAutoSpeak(enabled) => self.set_auto_speak(enabled),
            Command::Visibility(visible) => self.set_visible(visible),
            Command::EndSession { reply } => {
                let _ = reply.send(self.end_session());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown => self.shutdown(),
        }
    }

    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Transport { attempt, event } => match event {
                TransportEvent::Opened => {
                    self.connection.on_open(attempt);
                }
                TransportEvent::Frame(text) => {
                    if attempt != self.connection.attempt() {
                        log::debug!("[session] frame from stale attempt {}", attempt);
                    } else if let Some(frame) = self.connection.decode(&text) {
                        self.dispatch(frame);
                    }
                }
                TransportEvent::Closed { reason } => {
                    if self.connection.on_closed(attempt, reason.as_deref()) {
                        self.set_typing(false);
                        self.stream.reset();
                    }
                }
            },
            SessionEvent::ReconnectDue { attempt } => self.connection.on_reconnect_due(attempt),
            SessionEvent::Capture { session, event } => {
                let outcome = self.voice.handle_event(session, event);
                self.apply_voice(outcome);
            }
            SessionEvent::SilenceDeadline { session, seq } => {
                let outcome = self.voice.on_silence_deadline(session, seq);
                self.apply_voice(outcome);
            }
            SessionEvent::Playback { handle, event } => {
                self.playback.handle_event(handle, event);
            }
            SessionEvent::ReleaseDue { handle } => {
                self.playback.on_release_due(handle);
            }
            SessionEvent::AutoSpeak { message_id } => {
                self.pending_speak = None;
                self.speak_message(message_id);
            }
        }
        self.publish();
    }

    fn dispatch(&mut self, frame: InboundFrame) {
        log::debug!("[session] inbound {}", frame.kind());
        match frame {
            InboundFrame::ConnectionConfirmed {
                chat_messages,
                user_id,
                employee_id,
            } => {
                self.user_id = id_string(user_id);
                self.employee_id = id_string(employee_id);
                log::info!(
                    "[session] confirmed user_id={:?} employee_id={:?}",
                    self.user_id,
                    self.employee_id
                );
                notify(
                    &self.updates,
                    SessionUpdate::Identified {
                        user_id: self.user_id.clone(),
                        employee_id: self.employee_id.clone(),
                    },
                );
                self.merge_history(&chat_messages);
            }
            InboundFrame::ChatbotStream { chunk } => self.stream.append(&chunk),
            InboundFrame::ChatbotResponse { message } => {
                self.set_typing(false);
                if let Some(message) = self.stream.finalize(message.as_deref(), &mut self.log) {
                    notify(&self.updates, SessionUpdate::MessageAppended(message.clone()));
                    if self.auto_speak {
                        self.pending_speak = Some(ScheduledTask::schedule(
                            &self.events_tx,
                            Duration::from_millis(AUTO_SPEAK_DELAY_MS),
                            SessionEvent::AutoSpeak {
                                message_id: message.id,
                            },
                        ));
                    }
                }
            }
            InboundFrame::DisconnectConfirmed {
                message,
                chat_messages,
            } => {
                log::info!(
                    "[session] server ended chat: {}",
                    message.as_deref().unwrap_or("no message")
                );
                self.merge_history(&chat_messages);
            }
            InboundFrame::Error { message } => {
                let message = message.unwrap_or_else(|| "unknown server error".into());
                log::warn!("[session] server error: {}", message);
                notify(&self.updates, SessionUpdate::ServerError(message));
            }
            InboundFrame::Connect | InboundFrame::Disconnect | InboundFrame::Unknown => {}
        }
    }

    fn merge_history(&mut self, entries: &[HistoryEntry]) {
        let added = history::merge(&mut self.log, entries);
        for message in &added {
            notify(&self.updates, SessionUpdate::MessageAppended(message.clone()));
        }
        notify(&self.updates, SessionUpdate::HistoryMerged { added: added.len() });
    }

    fn apply_voice(&mut self, outcome: VoiceOutcome) {
        match outcome {
            VoiceOutcome::Input(text) => self.set_input(text),
            VoiceOutcome::Submit(text) => {
                self.set_input(text.clone());
                if let Err(e) = self.send_text(&text) {
                    log::warn!("[voice] dropped submission \"{}\": {}", text, e);
                }
            }
            VoiceOutcome::Ended | VoiceOutcome::Nothing => {}
        }
    }

    fn speak_message(&mut self, message_id: i64) {
        let Some(text) = self.log.get(message_id).map(|m| m.text.clone()) else {
            return;
        };
        if let Err(e) = self.playback.play(&text, message_id) {
            notify(&self.updates, SessionUpdate::DeviceError(e.to_string()));
        }
    }

    fn set_typing(&mut self, typing: bool) {
        if self.typing != typing {
            self.typing = typing;
            notify(&self.updates, SessionUpdate::Typing(typing));
        }
    }

    /// Emit updates for whatever changed since the last publish.
    fn publish(&mut self) {
        let now = Published {
            connection: self.connection.state(),
            listening: self.voice.is_listening(),
            speaking: self.playback.speaking(),
        };
        if now.connection != self.published.connection {
            notify(&self.updates, SessionUpdate::Connection(now.connection));
        }
        if now.listening != self.published.listening {
            notify(&self.updates, SessionUpdate::Listening(now.listening));
        }
        if now.speaking != self.published.speaking {
            notify(&self.updates, SessionUpdate::Speaking(now.speaking));
        }
        self.published = now;
    }
}

/// Cloneable front door to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    fn post(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .map_err(|_| SessionError::SessionClosed)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.post(make(tx))?;
        rx.await.map_err(|_| SessionError::SessionClosed)
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<ChatMessage, SessionError> {
        let text = text.into();
        self.request(|reply| Command::SendText { text, reply }).await?
    }

    pub fn set_input(&self, input: impl Into<String>) -> Result<(), SessionError> {
        self.post(Command::SetInput(input.into()))
    }

    pub async fn start_capture(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::StartCapture { reply }).await?
    }

    pub fn stop_capture(&self) -> Result<(), SessionError> {
        self.post(Command::StopCapture)
    }

    pub async fn toggle_playback(&self, message_id: i64) -> Result<(), SessionError> {
        self.request(|reply| Command::TogglePlayback { message_id, reply })
            .await?
    }

    pub fn stop_playback(&self) -> Result<(), SessionError> {
        self.post(Command::StopPlayback)
    }

    pub fn set_auto_speak(&self, enabled: bool) -> Result<(), SessionError> {
        self.post(Command::SetAutoSpeak(enabled))
    }

    pub fn set_visible(&self, visible: bool) -> Result<(), SessionError> {
        self.post(Command::Visibility(visible))
    }

    pub async fn end_session(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::EndSession { reply }).await?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    pub fn shutdown(&self) -> Result<(), SessionError> {
        self.post(Command::Shutdown)
    }
}
