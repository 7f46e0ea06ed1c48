//! Configuration for invite-daemon

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use invite_tracker::{parse_invite_code, TrackerConfig};
use invite_types::{InviteCode, RoleId};
use serde::{Deserialize, Serialize};

use crate::error::{DaemonError, DaemonResult};

/// Main daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream platform API
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Attribution and ingestion settings
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Seed invite-to-role table. Keys may be bare codes or invite links.
    #[serde(default)]
    pub mappings: BTreeMap<String, String>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            tracker: TrackerConfig::default(),
            mappings: BTreeMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Enable permissive CORS; off unless the API is called from a browser
    #[serde(default)]
    pub enable_cors: bool,

    /// Bearer token required on `/api/v1`; required to start
    #[serde(default)]
    pub api_token: String,

    /// Observe every visible community on startup
    #[serde(default = "default_true")]
    pub bootstrap: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            enable_cors: false,
            api_token: String::new(),
            bootstrap: true,
        }
    }
}

/// Upstream platform configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the platform API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token; required to start
    #[serde(default)]
    pub token: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: String::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl UpstreamConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8085))
}

fn default_base_url() -> String {
    "http://127.0.0.1:9000/api".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration from defaults, an optional file and `INVITED_` variables
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Nested keys use a double underscore: INVITED_UPSTREAM__BASE_URL
        builder = builder.add_source(
            config::Environment::with_prefix("INVITED")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Check everything the daemon needs before it starts serving
    pub fn validate(&self) -> DaemonResult<()> {
        if self.upstream.token.trim().is_empty() {
            return Err(DaemonError::Config(
                "upstream token is missing; set --token or INVITED_TOKEN".to_string(),
            ));
        }
        if self.server.api_token.trim().is_empty() {
            return Err(DaemonError::Config(
                "API token is missing; set --api-token or INVITED_SERVER__API_TOKEN".to_string(),
            ));
        }
        reqwest::Url::parse(&self.upstream.base_url).map_err(|e| {
            DaemonError::Config(format!(
                "invalid upstream base URL {}: {}",
                self.upstream.base_url, e
            ))
        })?;
        if self.upstream.request_timeout_secs == 0 {
            return Err(DaemonError::Config(
                "upstream.request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        self.tracker.validate()?;
        self.seed_mappings()?;
        Ok(())
    }

    /// Parse the seed mapping table
    pub fn seed_mappings(&self) -> DaemonResult<Vec<(InviteCode, RoleId)>> {
        self.mappings
            .iter()
            .map(|(key, role)| {
                let code = parse_invite_code(key).ok_or_else(|| {
                    DaemonError::Config(format!("invalid invite code or link in mappings: {}", key))
                })?;
                if role.trim().is_empty() {
                    return Err(DaemonError::Config(format!(
                        "empty role for invite {} in mappings",
                        code
                    )));
                }
                Ok((code, RoleId::new(role.trim())))
            })
            .collect()
    }
}
