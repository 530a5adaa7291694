use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use crate::palette::PaletteKind;

/// Hard cap on client slots; the slot table is sized from this.
pub const MAX_CLIENTS_LIMIT: u32 = 32;

/// Server configuration, loaded from a TOML file with CLI overrides
/// applied on top.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// TCP port for client connections.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bind address. The default `::` binds dual-stack (IPv4-mapped)
    /// where the platform allows it.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Maximum concurrent clients (1–32).
    #[serde(default = "default_max_clients")]
    pub max_clients: u32,

    /// Whether audio mixing runs at all.
    #[serde(default = "default_true")]
    pub audio_enabled: bool,

    /// Optional log file; log lines also go to stderr.
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Glyph ramp used for rendered frames.
    #[serde(default)]
    pub palette: PaletteKind,

    /// Ramp characters when `palette = "custom"`.
    #[serde(default)]
    pub palette_custom: Option<String>,

    /// Disable the handshake and per-packet encryption entirely.
    #[serde(default)]
    pub no_encrypt: bool,

    /// Path to the server's Ed25519 identity key file.
    #[serde(default)]
    pub identity_key: Option<PathBuf>,

    /// Path to the JSON whitelist of authorized client keys.
    #[serde(default)]
    pub whitelist: Option<PathBuf>,

    /// Pre-shared password for password authentication.
    #[serde(default)]
    pub password: Option<String>,

    /// Target video frame rate.
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Capacity of each client's outbound audio packet queue.
    #[serde(default = "default_audio_queue")]
    pub audio_queue_capacity: usize,

    /// Maximum accepted payload size on the wire.
    #[serde(default = "default_max_payload")]
    pub max_payload: u32,
}

fn default_port() -> u16 {
    27224
}

fn default_bind() -> String {
    "::".into()
}

fn default_max_clients() -> u32 {
    MAX_CLIENTS_LIMIT
}

fn default_true() -> bool {
    true
}

fn default_fps() -> u32 {
    60
}

fn default_audio_queue() -> usize {
    64
}

fn default_max_payload() -> u32 {
    asciichat_proto::DEFAULT_MAX_PAYLOAD
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            max_clients: default_max_clients(),
            audio_enabled: default_true(),
            log_file: None,
            palette: PaletteKind::default(),
            palette_custom: None,
            no_encrypt: false,
            identity_key: None,
            whitelist: None,
            password: None,
            fps: default_fps(),
            audio_queue_capacity: default_audio_queue(),
            max_payload: default_max_payload(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max_clients must be between 1 and {MAX_CLIENTS_LIMIT}, got {0}")]
    MaxClients(u32),

    #[error("fps must be between 1 and 240, got {0}")]
    Fps(u32),

    #[error("audio_queue_capacity must be non-zero")]
    AudioQueue,

    #[error("max_payload must be non-zero")]
    MaxPayload,

    #[error("palette = \"custom\" requires palette_custom")]
    MissingCustomPalette,

    #[error("bind address {0:?} is not a valid IP address")]
    BadBindAddr(String),
}

impl ServerConfig {
    /// Validate before any socket is bound. Errors here are fatal with
    /// the config exit code.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_clients == 0 || self.max_clients > MAX_CLIENTS_LIMIT {
            return Err(ConfigError::MaxClients(self.max_clients));
        }
        if self.fps == 0 || self.fps > 240 {
            return Err(ConfigError::Fps(self.fps));
        }
        if self.audio_queue_capacity == 0 {
            return Err(ConfigError::AudioQueue);
        }
        if self.max_payload == 0 {
            return Err(ConfigError::MaxPayload);
        }
        if self.palette == PaletteKind::Custom
            && self.palette_custom.as_deref().map_or(true, str::is_empty)
        {
            return Err(ConfigError::MissingCustomPalette);
        }
        if self.bind.parse::<std::net::IpAddr>().is_err() {
            return Err(ConfigError::BadBindAddr(self.bind.clone()));
        }
        Ok(())
    }
}
