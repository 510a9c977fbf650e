use crate::error::SessionError;
use crate::speech::VoiceSettings;
use crate::transport::ConnectionConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

static ROOM_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+$").expect("valid room pattern"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Scheme and host of the chat backend, e.g. `wss://chat.example.com`.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_room")]
    pub room: String,
    /// Display name sent on connect and with every query.
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_voice_name")]
    pub voice_name: String,
    #[serde(default = "default_voice_rate")]
    pub voice_rate: f32,
    #[serde(default = "default_auto_speak")]
    pub auto_speak: bool,
}

impl Settings {
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::for_room(&self.server_url, &self.room)
    }

    pub fn voice(&self) -> VoiceSettings {
        VoiceSettings {
            voice_name: self.voice_name.clone(),
            rate: self.voice_rate,
        }
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if !(self.server_url.starts_with("ws://") || self.server_url.starts_with("wss://")) {
            return Err(SessionError::Config(format!(
                "server_url must start with ws:// or wss://, got '{}'",
                self.server_url
            )));
        }
        if !ROOM_NAME.is_match(&self.room) {
            return Err(SessionError::Config(format!(
                "room must be letters, digits or '_', got '{}'",
                self.room
            )));
        }
        if self.username.trim().is_empty() {
            return Err(SessionError::Config("username is empty".into()));
        }
        if !(self.voice_rate > 0.0 && self.voice_rate <= 4.0) {
            return Err(SessionError::Config(format!(
                "voice_rate must be in (0, 4], got {}",
                self.voice_rate
            )));
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            room: default_room(),
            username: default_username(),
            voice_name: default_voice_name(),
            voice_rate: default_voice_rate(),
            auto_speak: default_auto_speak(),
        }
    }
}

fn default_server_url() -> String {
    "wss://opensoftbackend-ytr6.onrender.com".into()
}
fn default_room() -> String {
    "default".into()
}
fn default_username() -> String {
    "User".into()
}
fn default_voice_name() -> String {
    "en-IN-AartiNeural".into()
}
fn default_voice_rate() -> f32 {
    1.75
}
fn default_auto_speak() -> bool {
    true
}

pub fn settings_path() -> Result<PathBuf, String> {
    if let Some(dir) = dirs::data_local_dir() {
        return Ok(dir.join("chatlink").join("settings.json"));
    }
    if let Some(home) = dirs::home_dir() {
        return Ok(home.join(".chatlink").join("settings.json"));
    }
    Err("Failed to resolve data directory".into())
}

pub fn load() -> Settings {
    match settings_path() {
        Ok(path) => load_from(&path),
        Err(_) => Settings::default(),
    }
}

/// Missing or unreadable files yield defaults.
pub fn load_from(path: &Path) -> Settings {
    match fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
            log::warn!("[settings] ignoring unreadable {}: {}", path.display(), e);
            Settings::default()
        }),
        Err(_) => Settings::default(),
    }
}

pub fn save(settings: &Settings) -> Result<(), String> {
    let path = settings_path()?;
    save_to(settings, &path)
}

pub fn save_to(settings: &Settings, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create settings dir: {}", e))?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize settings: {}", e))?;
    fs::write(path, json).map_err(|e| format!("Failed to write settings: {}", e))?;
    Ok(())
}
