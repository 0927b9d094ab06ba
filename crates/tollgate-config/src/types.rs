use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete gateway configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Caller-facing listener.
    pub server: ServerSection,
    /// API key file.
    pub keys: KeysSection,
    /// Backend OAuth token file.
    pub credentials: CredentialsSection,
    /// Operator confirmation.
    pub confirmation: ConfirmationSection,
    /// Backend routing.
    pub backend: BackendSection,
    /// Log output.
    pub logging: LoggingSection,
}

/// Caller-facing listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8000,
        }
    }
}

/// API key file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysSection {
    /// Path to the JSON key file.
    pub file: PathBuf,
}

impl Default for KeysSection {
    fn default() -> Self {
        Self {
            file: PathBuf::from("api_keys.json"),
        }
    }
}

/// Backend OAuth token file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsSection {
    /// Path to the authorized-user token JSON.
    pub token_file: PathBuf,
    /// Refresh this many seconds before the token expires.
    pub refresh_skew_secs: u64,
}

impl Default for CredentialsSection {
    fn default() -> Self {
        Self {
            token_file: PathBuf::from("token.json"),
            refresh_skew_secs: 60,
        }
    }
}

/// How operator decisions are collected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Prompt on the gateway's terminal.
    #[default]
    Console,
    /// Prompt on the operator web page.
    Web,
}

/// Operator confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationSection {
    /// `all`, `modify` or `none`.
    pub mode: String,
    /// Seconds the operator has to decide.
    pub timeout_secs: u64,
    /// Where prompts are shown.
    pub channel: ChannelKind,
    /// Operator web listener address (web channel only).
    pub web_host: String,
    /// Operator web listener port (web channel only).
    pub web_port: u16,
}

impl Default for ConfirmationSection {
    fn default() -> Self {
        Self {
            mode: "modify".to_owned(),
            timeout_secs: 300,
            channel: ChannelKind::Console,
            web_host: "127.0.0.1".to_owned(),
            web_port: 8001,
        }
    }
}

/// One backend family: requests whose path starts with `prefix` go to
/// `base_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendRoute {
    /// Path prefix, starting and ending with `/`.
    pub prefix: String,
    /// Backend origin.
    pub base_url: String,
}

/// Backend routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSection {
    /// Per-request timeout for backend calls.
    pub request_timeout_secs: u64,
    /// Route table; the longest matching prefix wins.
    pub routes: Vec<BackendRoute>,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            routes: vec![
                BackendRoute {
                    prefix: "/gmail/".to_owned(),
                    base_url: "https://gmail.googleapis.com".to_owned(),
                },
                BackendRoute {
                    prefix: "/calendar/".to_owned(),
                    base_url: "https://www.googleapis.com".to_owned(),
                },
            ],
        }
    }
}

/// Log output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Default level: `trace`, `debug`, `info`, `warn` or `error`.
    pub level: String,
    /// `pretty`, `compact`, `json` or `full`.
    pub format: String,
    /// Log file; stderr when unset.
    pub file: Option<PathBuf>,
    /// Extra `EnvFilter` directives, e.g. `tower_http=debug`.
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "pretty".to_owned(),
            file: None,
            directives: Vec::new(),
        }
    }
}

/// Values supplied on the command line or via `TOLLGATE_*` variables.
///
/// Applied after the config file; `None` leaves the loaded value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// `server.host`
    pub host: Option<String>,
    /// `server.port`
    pub port: Option<u16>,
    /// `keys.file`
    pub keys_file: Option<PathBuf>,
    /// `credentials.token_file`
    pub token_file: Option<PathBuf>,
    /// `confirmation.mode`
    pub confirmation_mode: Option<String>,
    /// `confirmation.timeout_secs`
    pub confirmation_timeout_secs: Option<u64>,
    /// `confirmation.channel`
    pub confirmation_channel: Option<ChannelKind>,
    /// `confirmation.web_port`
    pub web_port: Option<u16>,
    /// `logging.level`
    pub log_level: Option<String>,
    /// `logging.file`
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Overlay command-line values.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        let o = overrides.clone();
        if let Some(v) = o.host {
            self.server.host = v;
        }
        if let Some(v) = o.port {
            self.server.port = v;
        }
        if let Some(v) = o.keys_file {
            self.keys.file = v;
        }
        if let Some(v) = o.token_file {
            self.credentials.token_file = v;
        }
        if let Some(v) = o.confirmation_mode {
            self.confirmation.mode = v;
        }
        if let Some(v) = o.confirmation_timeout_secs {
            self.confirmation.timeout_secs = v;
        }
        if let Some(v) = o.confirmation_channel {
            self.confirmation.channel = v;
        }
        if let Some(v) = o.web_port {
            self.confirmation.web_port = v;
        }
        if let Some(v) = o.log_level {
            self.logging.level = v;
        }
        if let Some(v) = o.log_file {
            self.logging.file = Some(v);
        }
    }
}
