//! Bot configuration, loaded from a TOML file at startup.
//!
//! The file is read again before every connection attempt so channels
//! persisted by the `sc` command take effect on the next reconnect. Policy
//! flags in here are the per-session defaults; toggling them in chat only
//! lasts until the connection drops.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

/// Identity and policy snapshot for one bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Server hostname.
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub use_tls: bool,
    pub nickname: String,
    /// Server password (PASS), if the network requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realname: Option<String>,
    /// Channels joined after sign-on.
    #[serde(default)]
    pub channels: Vec<String>,
    /// Sentinel character that marks a chat line as a command.
    #[serde(default = "default_prefix")]
    pub prefix: char,
    /// Messages allowed per 8-second burst window before the client
    /// throttles its own output.
    #[serde(default = "default_line_rate")]
    pub line_rate: u32,
    /// Answer channel mentions by private message instead of in-channel.
    #[serde(default)]
    pub private_replies: bool,
    /// Rejoin a channel immediately after being kicked from it.
    #[serde(default)]
    pub kick_rejoin: bool,
    /// Join channels we are invited to.
    #[serde(default)]
    pub join_invite: bool,
    /// Learn from conversation by default.
    #[serde(default)]
    pub learn: bool,
    /// Owner authorization by exact nick match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_nick: Option<String>,
    /// Owner authorization by hostmask substring, e.g. `@host.example.org`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_mask: Option<String>,
    /// Backing file for the Markov brain.
    #[serde(default = "default_brain_file")]
    pub brain_file: PathBuf,
}

fn default_port() -> u16 {
    6667
}

fn default_prefix() -> char {
    '@'
}

fn default_line_rate() -> u32 {
    8
}

fn default_brain_file() -> PathBuf {
    PathBuf::from("banter.brain")
}

impl BotConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(self)?;
        fs::write(path, text).map_err(|source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    /// Add a channel to the persisted list. Returns false if already there.
    pub fn add_channel(&mut self, channel: &str) -> bool {
        if self.channels.iter().any(|c| c == channel) {
            return false;
        }
        self.channels.push(channel.to_string());
        true
    }

    /// Connection settings for the IRC client layer. Registration, channel
    /// auto-join, PING handling, and output throttling all happen there.
    pub fn irc_config(&self) -> irc::client::data::Config {
        irc::client::data::Config {
            nickname: Some(self.nickname.clone()),
            password: self.password.clone(),
            username: self.username.clone(),
            realname: self.realname.clone(),
            server: Some(self.server.clone()),
            port: Some(self.port),
            use_tls: Some(self.use_tls),
            channels: self.channels.clone(),
            burst_window_length: Some(8),
            max_messages_in_burst: Some(self.line_rate),
            ..irc::client::data::Config::default()
        }
    }
}
