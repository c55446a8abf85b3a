//! Server configuration.
//!
//! Loaded once at startup from a TOML file and treated as read-only
//! afterwards. Every field carries a default so a missing or partial file
//! still yields a runnable server.

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server name (e.g., "irc.example.org").
    #[serde(default = "default_name")]
    pub name: String,
    /// Network name advertised in the welcome burst and ISUPPORT.
    #[serde(default = "default_network")]
    pub network: String,
    /// Maximum number of parsed messages a session may have pending.
    #[serde(default = "default_recvq_len")]
    pub recvq_len: usize,
    /// Extension modules to register at startup (e.g., `["sasl"]`).
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Log sinks; the first entry selects the log file, otherwise stderr.
    #[serde(default)]
    pub logs: Vec<LogConfig>,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub clients: ClientsConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub motd: MotdConfig,
    #[serde(default)]
    pub data: DataConfig,
    /// Listener set; defaults to plaintext on 6667.
    #[serde(default = "default_listeners")]
    pub listeners: Vec<ListenerConfig>,
    /// Named grants of capability tokens, referenced by sessions.
    #[serde(default)]
    pub roles: BTreeMap<String, RoleConfig>,
}

/// One log sink.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Path to the log file.
    pub path: String,
}

/// Protocol size limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum wire line length, including tags (default: 512).
    #[serde(default = "default_line_limit")]
    pub line: usize,
    /// Maximum nickname length (default: 31).
    #[serde(default = "default_nick_limit")]
    pub nick: usize,
    /// Maximum channel name length (default: 64).
    #[serde(default = "default_channel_limit")]
    pub channel: usize,
    /// Maximum topic length (default: 400).
    #[serde(default = "default_topic_limit")]
    pub topic: usize,
    /// Maximum username length (default: 10).
    #[serde(default = "default_user_limit")]
    pub user: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            line: default_line_limit(),
            nick: default_nick_limit(),
            channel: default_channel_limit(),
            topic: default_topic_limit(),
            user: default_user_limit(),
        }
    }
}

/// Client liveness configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientsConfig {
    /// Idle interval before the server sends `PING`.
    #[serde(default = "default_ping_frequency")]
    pub ping_frequency: DurationSpec,
    /// How long after that an unanswered session survives.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: DurationSpec,
}

impl Default for ClientsConfig {
    fn default() -> Self {
        Self {
            ping_frequency: default_ping_frequency(),
            ping_timeout: default_ping_timeout(),
        }
    }
}

/// A duration record, summed across its fields.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct DurationSpec {
    #[serde(default)]
    pub days: u64,
    #[serde(default)]
    pub hours: u64,
    #[serde(default)]
    pub minutes: u64,
    #[serde(default)]
    pub seconds: u64,
}

impl DurationSpec {
    /// Total seconds described by this record.
    pub fn as_secs(&self) -> u64 {
        ((self.days * 24 + self.hours) * 60 + self.minutes) * 60 + self.seconds
    }
}

/// METADATA extension limits (advertised via ISUPPORT).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataConfig {
    /// Maximum metadata keys per target; `None` renders as a bare token.
    pub limit: Option<u32>,
}

/// MONITOR extension limits (advertised via ISUPPORT).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonitorConfig {
    /// Maximum monitored targets per session; `None` renders as a bare token.
    pub limit: Option<u32>,
}

/// Message of the day.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MotdConfig {
    /// Path to a MOTD file (one reply line per file line).
    pub file: Option<String>,
    /// Inline MOTD lines, used when `file` is not set.
    #[serde(default)]
    pub lines: Vec<String>,
}

impl MotdConfig {
    /// Load the MOTD lines, or `None` when no MOTD is configured.
    pub fn load_lines(&self) -> Option<Vec<String>> {
        if let Some(ref path) = self.file {
            match std::fs::read_to_string(path) {
                Ok(content) => {
                    return Some(content.lines().map(str::to_string).collect());
                }
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Failed to read MOTD file");
                }
            }
        }

        if self.lines.is_empty() {
            None
        } else {
            Some(self.lines.clone())
        }
    }
}

/// Account datastore location and save cadence.
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Path to the JSON datastore.
    #[serde(default = "default_data_path")]
    pub path: String,
    /// Seconds between background saves.
    #[serde(default = "default_save_interval")]
    pub save_interval: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: default_data_path(),
            save_interval: default_save_interval(),
        }
    }
}

/// One listener.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    /// Address to bind (e.g., "0.0.0.0:6667").
    pub address: std::net::SocketAddr,
    /// Whether this listener speaks TLS.
    #[serde(default)]
    pub tls: bool,
    /// Path to the certificate chain (PEM), required when `tls` is set.
    pub cert_path: Option<String>,
    /// Path to the private key (PEM), required when `tls` is set.
    pub key_path: Option<String>,
}

/// A named grant of capability tokens (e.g. `metadata:set_global`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleConfig {
    #[serde(default)]
    pub capabilities: HashSet<String>,
}

impl Default for Config {
    fn default() -> Self {
        // An absent config file yields exactly this server.
        toml::from_str("").expect("empty config must deserialize")
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// A missing file logs a notice and falls back to the defaults; a file
    /// that exists but fails to parse is a startup error.
    pub fn load(path: &str) -> anyhow::Result<Config> {
        if !Path::new(path).exists() {
            tracing::info!(path = %path, "cannot find config file, using defaults");
            return Ok(Config::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

fn default_name() -> String {
    "irc.coracle.localhost".to_string()
}

fn default_network() -> String {
    "CoracleNet".to_string()
}

fn default_recvq_len() -> usize {
    20
}

fn default_extensions() -> Vec<String> {
    vec!["sasl".to_string()]
}

fn default_line_limit() -> usize {
    512
}

fn default_nick_limit() -> usize {
    31
}

fn default_channel_limit() -> usize {
    64
}

fn default_topic_limit() -> usize {
    400
}

fn default_user_limit() -> usize {
    10
}

fn default_ping_frequency() -> DurationSpec {
    DurationSpec {
        minutes: 1,
        ..DurationSpec::default()
    }
}

fn default_ping_timeout() -> DurationSpec {
    DurationSpec {
        minutes: 2,
        ..DurationSpec::default()
    }
}

fn default_data_path() -> String {
    "coracled.json".to_string()
}

fn default_save_interval() -> u64 {
    300
}

fn default_listeners() -> Vec<ListenerConfig> {
    vec![ListenerConfig {
        address: "0.0.0.0:6667".parse().expect("default listener address"),
        tls: false,
        cert_path: None,
        key_path: None,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::default();
        assert_eq!(config.limits.line, 512);
        assert_eq!(config.recvq_len, 20);
        assert_eq!(config.clients.ping_frequency.as_secs(), 60);
        assert_eq!(config.clients.ping_timeout.as_secs(), 120);
        assert_eq!(config.listeners.len(), 1);
        assert_eq!(config.extensions, vec!["sasl"]);
    }

    #[test]
    fn duration_records_sum() {
        let spec: DurationSpec =
            toml::from_str("days = 1\nhours = 2\nminutes = 3\nseconds = 4").unwrap();
        assert_eq!(spec.as_secs(), 86400 + 7200 + 180 + 4);
    }

    #[test]
    fn parses_roles_and_limits() {
        let config: Config = toml::from_str(
            r#"
            name = "irc.test"
            [limits]
            line = 1024
            [clients]
            ping_frequency = { seconds = 30 }
            [roles.admin]
            capabilities = ["metadata:set_global", "oper:kill"]
            "#,
        )
        .unwrap();
        assert_eq!(config.name, "irc.test");
        assert_eq!(config.limits.line, 1024);
        assert_eq!(config.limits.nick, 31);
        assert_eq!(config.clients.ping_frequency.as_secs(), 30);
        assert!(config.roles["admin"].capabilities.contains("oper:kill"));
    }
}
