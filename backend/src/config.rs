//! Configuration management.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::plane::PlaneSettings;

/// Base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost/api/v1";

/// Plain environment variables honoured for compatibility with other Plane
/// tooling, and the config key each one sets.
const PLAIN_ENV_VARS: &[(&str, &str)] = &[
    ("PLANE_API_KEY", "plane.api_key"),
    ("PLANE_BASE_URL", "plane.base_url"),
    ("PLANE_WORKSPACE_SLUG", "plane.workspace_slug"),
    ("PORT", "server.port"),
];

/// Which transport the server speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Newline-delimited JSON-RPC on stdin/stdout
    Stdio,
    /// Legacy HTTP+SSE (protocol 2024-11-05)
    Sse,
    /// Streamable HTTP with resumable streams
    #[default]
    Http,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Stdio => "stdio",
            TransportKind::Sse => "sse",
            TransportKind::Http => "http",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration structure that matches the TOML file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    plane: PlaneConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ServerConfig {
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    transport: TransportKind,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            transport: TransportKind::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PlaneConfig {
    #[serde(default = "default_base_url")]
    base_url: String,
    #[serde(default)]
    api_key: String,
    #[serde(default)]
    workspace_slug: String,
}

impl Default for PlaneConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            workspace_slug: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct LoggingConfig {
    /// Path to log file (if set, logs will be written to file in addition to the console)
    log_file: Option<PathBuf>,
    /// Log level (trace, debug, info, warn, error)
    /// If not set, uses RUST_LOG environment variable or defaults to "info"
    log_level: Option<String>,
}

fn default_port() -> u16 {
    plane_mcp_types::DEFAULT_PORT
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

/// Values given on the command line. `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub transport: Option<TransportKind>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub workspace_slug: Option<String>,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
}

/// Application configuration.
#[derive(Clone)]
pub struct Config {
    /// Port to listen on (HTTP transports)
    pub port: u16,
    pub transport: TransportKind,
    pub plane: PlaneSettings,
    /// Path to log file (if set, logs will be written to file in addition to the console)
    pub log_file: Option<PathBuf>,
    /// Log level (if set, used when RUST_LOG is not)
    pub log_level: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("transport", &self.transport)
            .field("base_url", &self.plane.base_url)
            .field("workspace_slug", &self.plane.workspace_slug)
            .field("api_key_set", &!self.plane.api_key.is_empty())
            .field("log_file", &self.log_file)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
    /// Load configuration with full priority chain:
    /// CLI args > plain env vars > `PLANE_MCP_*` env vars > config files > defaults.
    ///
    /// Config files are searched in this order:
    /// 1. `config.toml` in user config directory (~/.config/plane-mcp/ on Linux)
    /// 2. `.plane-mcp.toml` in current directory (wins over the user file)
    pub fn from_figment(overrides: ConfigOverrides) -> anyhow::Result<Self> {
        let local_config = std::env::current_dir()
            .ok()
            .map(|d| d.join(".plane-mcp.toml"));
        let user_config = directories::ProjectDirs::from("", "", "plane-mcp")
            .map(|dirs| dirs.config_dir().join("config.toml"));

        // 1. Start with defaults
        let mut figment = Figment::new().merge(Serialized::defaults(ConfigFile {
            server: ServerConfig::default(),
            plane: PlaneConfig::default(),
            logging: LoggingConfig::default(),
        }));

        // 2. Merge user config file if it exists
        if let Some(ref path) = user_config {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        // 3. Merge local config file if it exists
        if let Some(ref path) = local_config {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        // 4. Merge environment variables (PLANE_MCP_* prefix, `__` separates sections)
        figment = figment.merge(Env::prefixed("PLANE_MCP_").split("__"));

        // 5. Merge the plain variables
        for (var, key) in PLAIN_ENV_VARS {
            if let Ok(value) = std::env::var(var) {
                figment = figment.merge(Env::raw().only(&[*var]).map(move |_| (*key).into()));
                tracing::debug!("Using {} from environment ({} chars)", var, value.len());
            }
        }

        // 6. Merge CLI arguments (highest priority)
        if let Some(p) = overrides.port {
            figment = figment.merge(Serialized::default("server.port", p));
        }
        if let Some(t) = overrides.transport {
            figment = figment.merge(Serialized::default("server.transport", t));
        }
        if let Some(ref url) = overrides.base_url {
            figment = figment.merge(Serialized::default("plane.base_url", url));
        }
        if let Some(ref key) = overrides.api_key {
            figment = figment.merge(Serialized::default("plane.api_key", key));
        }
        if let Some(ref slug) = overrides.workspace_slug {
            figment = figment.merge(Serialized::default("plane.workspace_slug", slug));
        }
        if let Some(ref level) = overrides.log_level {
            figment = figment.merge(Serialized::default("logging.log_level", level));
        }
        if let Some(ref file) = overrides.log_file {
            figment = figment.merge(Serialized::default("logging.log_file", file));
        }

        // Extract the configuration
        let config_file: ConfigFile = figment.extract()?;

        Ok(Self {
            port: config_file.server.port,
            transport: config_file.server.transport,
            plane: PlaneSettings {
                base_url: config_file.plane.base_url,
                api_key: config_file.plane.api_key,
                workspace_slug: config_file.plane.workspace_slug,
            },
            log_file: config_file.logging.log_file,
            log_level: config_file.logging.log_level,
        })
    }
}
