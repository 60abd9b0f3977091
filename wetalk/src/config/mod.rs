//! Configuration system for the `WeTalk` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/wetalk/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use wetalk_proto::room::key_from_share_link;

use crate::avatar::AvatarConfig;
use crate::chat::{JoinRequest, SessionConfig, SessionError};
use crate::transport::mqtt::MqttSettings;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// The share link carries no room key.
    #[error("share link has no room key: {0}")]
    InvalidRoomLink(String),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    broker: BrokerFileConfig,
    session: SessionFileConfig,
    avatar: AvatarFileConfig,
}

/// `[broker]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct BrokerFileConfig {
    host: Option<String>,
    port: Option<u16>,
    tls: Option<bool>,
    keep_alive_secs: Option<u64>,
    reconnect_interval_ms: Option<u64>,
    event_capacity: Option<usize>,
}

/// `[session]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionFileConfig {
    typing_debounce_ms: Option<u64>,
    max_tracked_ids: Option<usize>,
    event_buffer: Option<usize>,
}

/// `[avatar]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct AvatarFileConfig {
    enabled: Option<bool>,
    endpoint: Option<String>,
    placeholder: Option<String>,
    timeout_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Local nickname, if given.
    pub nickname: Option<String>,
    /// Room key, given directly or taken from a share link.
    pub room_key: Option<String>,
    /// Broker connection settings.
    pub broker: MqttSettings,
    /// Session tunables.
    pub session: SessionConfig,
    /// Avatar lookup settings.
    pub avatar: AvatarConfig,
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read,
    /// the file cannot be parsed, or `--room-link` carries no room key.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let room_key = match (&cli.room_key, &cli.room_link) {
            (Some(key), _) => Some(key.clone()),
            (None, Some(link)) => Some(
                key_from_share_link(link)
                    .ok_or_else(|| ConfigError::InvalidRoomLink(link.clone()))?,
            ),
            (None, None) => None,
        };

        let broker = MqttSettings {
            host: cli
                .broker_host
                .clone()
                .or_else(|| file.broker.host.clone())
                .unwrap_or(defaults.broker.host),
            port: cli
                .broker_port
                .or(file.broker.port)
                .unwrap_or(defaults.broker.port),
            tls: cli.tls || file.broker.tls.unwrap_or(defaults.broker.tls),
            keep_alive: file
                .broker
                .keep_alive_secs
                .map_or(defaults.broker.keep_alive, Duration::from_secs),
            reconnect_interval: file
                .broker
                .reconnect_interval_ms
                .map_or(defaults.broker.reconnect_interval, Duration::from_millis),
            event_capacity: file
                .broker
                .event_capacity
                .unwrap_or(defaults.broker.event_capacity),
        };

        let session = SessionConfig {
            typing_debounce: file
                .session
                .typing_debounce_ms
                .map_or(defaults.session.typing_debounce, Duration::from_millis),
            max_tracked_ids: file
                .session
                .max_tracked_ids
                .unwrap_or(defaults.session.max_tracked_ids),
            event_buffer: file
                .session
                .event_buffer
                .unwrap_or(defaults.session.event_buffer),
        };

        let avatar = AvatarConfig {
            enabled: !cli.no_avatar && file.avatar.enabled.unwrap_or(defaults.avatar.enabled),
            endpoint: file
                .avatar
                .endpoint
                .clone()
                .unwrap_or(defaults.avatar.endpoint),
            placeholder: file
                .avatar
                .placeholder
                .clone()
                .unwrap_or(defaults.avatar.placeholder),
            timeout: file
                .avatar
                .timeout_secs
                .map_or(defaults.avatar.timeout, Duration::from_secs),
        };

        Ok(Self {
            nickname: cli.nickname.clone(),
            room_key,
            broker,
            session,
            avatar,
        })
    }

    /// Validates nickname and room key into a [`JoinRequest`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if either is missing or blank.
    pub fn join_request(&self, avatar: &str) -> Result<JoinRequest, SessionError> {
        JoinRequest::new(
            self.nickname.as_deref().unwrap_or_default(),
            avatar,
            self.room_key.as_deref().unwrap_or_default(),
        )
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Ephemeral encrypted group chat over MQTT")]
pub struct CliArgs {
    /// Your nickname in the room.
    #[arg(long, env = "WETALK_NICKNAME")]
    pub nickname: Option<String>,

    /// Shared room key (encryption secret and broker username).
    #[arg(long, env = "WETALK_ROOM_KEY")]
    pub room_key: Option<String>,

    /// Share link carrying the room key (`...?room=<key>`).
    #[arg(long, conflicts_with = "room_key")]
    pub room_link: Option<String>,

    /// MQTT broker host.
    #[arg(long, env = "WETALK_BROKER_HOST")]
    pub broker_host: Option<String>,

    /// MQTT broker port.
    #[arg(long, env = "WETALK_BROKER_PORT")]
    pub broker_port: Option<u16>,

    /// Connect to the broker over TLS.
    #[arg(long)]
    pub tls: bool,

    /// Skip the random avatar lookup.
    #[arg(long)]
    pub no_avatar: bool,

    /// Path to config file (default: `~/.config/wetalk/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "WETALK_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/wetalk.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("wetalk").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
