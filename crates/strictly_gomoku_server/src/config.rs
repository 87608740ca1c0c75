//! Server configuration.
//!
//! Values come from a TOML file when one is given, then `GOMOKU_*`
//! environment variables (a `.env` file is honoured by the binary), then
//! command-line flags.

use crate::session::MatchSettings;
use derive_getters::Getters;
use derive_more::{Display, Error};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::path::Path;
use strictly_gomoku::{DEFAULT_BOARD_SIZE, DEFAULT_WIN_LENGTH, Rules};
use tracing::{debug, info, instrument};

/// What happens to a match when a seated player leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectPolicy {
    /// The seat stays reserved; the same id can reconnect and resume.
    #[default]
    #[display("keep_match")]
    KeepMatch,
    /// An unfinished match is reset and the leaver's seat is freed.
    #[display("abandon_match")]
    AbandonMatch,
}

/// Configuration for the match server.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_", into)]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    port: u16,

    /// Board edge length for new matches.
    #[serde(default = "default_board_size")]
    board_size: usize,

    /// Run length that wins.
    #[serde(default = "default_win_length")]
    win_length: usize,

    /// Seat handling on disconnect.
    #[serde(default)]
    disconnect_policy: DisconnectPolicy,

    /// Capacity of each match's command queue.
    #[serde(default = "default_queue_capacity")]
    queue_capacity: usize,

    /// Answer hint requests with the centre-first suggester.
    #[serde(default)]
    offer_hints: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_board_size() -> usize {
    DEFAULT_BOARD_SIZE
}

fn default_win_length() -> usize {
    DEFAULT_WIN_LENGTH
}

fn default_queue_capacity() -> usize {
    64
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            board_size: default_board_size(),
            win_length: default_win_length(),
            disconnect_policy: DisconnectPolicy::default(),
            queue_capacity: default_queue_capacity(),
            offer_hints: false,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        info!(host = %config.host, port = config.port, "Config loaded successfully");
        Ok(config)
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::new(format!("Failed to render config: {}", e)))
    }

    /// File (or defaults), then environment, then validation.
    #[instrument]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = base.with_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `GOMOKU_HOST`, `GOMOKU_PORT`, `GOMOKU_BOARD_SIZE`,
    /// `GOMOKU_WIN_LENGTH` and `GOMOKU_DISCONNECT_POLICY` from `lookup`.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(host) = lookup("GOMOKU_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("GOMOKU_PORT") {
            self.port = parse_var("GOMOKU_PORT", &port)?;
        }
        if let Some(size) = lookup("GOMOKU_BOARD_SIZE") {
            self.board_size = parse_var("GOMOKU_BOARD_SIZE", &size)?;
        }
        if let Some(win) = lookup("GOMOKU_WIN_LENGTH") {
            self.win_length = parse_var("GOMOKU_WIN_LENGTH", &win)?;
        }
        if let Some(policy) = lookup("GOMOKU_DISCONNECT_POLICY") {
            self.disconnect_policy = match policy.as_str() {
                "keep_match" => DisconnectPolicy::KeepMatch,
                "abandon_match" => DisconnectPolicy::AbandonMatch,
                other => {
                    return Err(ConfigError::new(format!(
                        "GOMOKU_DISCONNECT_POLICY must be keep_match or abandon_match, got {other}"
                    )));
                }
            };
        }
        Ok(self)
    }

    /// Checks the board rules and queue capacity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rules()?;
        if self.queue_capacity == 0 {
            return Err(ConfigError::new("queue_capacity must be at least 1"));
        }
        Ok(())
    }

    /// Rules for new matches.
    pub fn rules(&self) -> Result<Rules, ConfigError> {
        Rules::new(self.board_size, self.win_length).map_err(|e| ConfigError::new(e.message))
    }

    /// Per-match settings derived from this configuration.
    pub fn match_settings(&self) -> Result<MatchSettings, ConfigError> {
        Ok(MatchSettings::new(self.rules()?, self.disconnect_policy))
    }

    /// `host:port` for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[track_caller]
fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::new(format!("{key} has an invalid value: {value}")))
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}
