//! Gatehouse configuration: a TOML file with `GATEHOUSE_*` environment
//! overrides applied on top.

use gatehouse_types::{Address, GatePolicy};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use thiserror::Error;

/// Everything the binary needs to start.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Engine authority and rule policy.
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Where the HTTP API listens.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// SQLite settings for the state tables, records mirror and decision log.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database file. Created on first start.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Busy timeout applied to every pooled connection.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Tracing output.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "gatehouse_engine=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit one JSON object per line instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

/// Engine configuration.
///
/// `root` only matters on first start: once genesis has run, the stored
/// role tables are authoritative.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    /// The address that receives genesis authority.
    #[serde(default)]
    pub root: Address,

    /// The only caller allowed to submit and withdraw records.
    #[serde(default)]
    pub ledger_caller: Address,

    /// Rule variants the engine enforces.
    #[serde(default)]
    pub policy: GatePolicy,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "gatehouse.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Reasons configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("cannot read gatehouse config: {0}")]
    FileRead(#[from] std::io::Error),

    /// The file is not valid TOML or holds an invalid value.
    #[error("invalid gatehouse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Reads `path` (defaults when it is absent or missing on disk) and applies
/// environment overrides:
/// - `GATEHOUSE_HOST` overrides `server.host`
/// - `GATEHOUSE_PORT` overrides `server.port`
/// - `GATEHOUSE_DB_PATH` overrides `database.path`
/// - `GATEHOUSE_LOG_LEVEL` overrides `logging.level`
/// - `GATEHOUSE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `GATEHOUSE_ROOT` overrides `engine.root`
/// - `GATEHOUSE_LEDGER_CALLER` overrides `engine.ledger_caller`
///
/// Unparseable override values are ignored with a warning.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "no gatehouse config on disk, using defaults");
                Config::default()
            }
            Err(e) => return Err(e.into()),
        },
        None => Config::default(),
    };

    override_parsed("GATEHOUSE_HOST", &mut config.server.host);
    override_parsed("GATEHOUSE_PORT", &mut config.server.port);
    override_parsed("GATEHOUSE_ROOT", &mut config.engine.root);
    override_parsed("GATEHOUSE_LEDGER_CALLER", &mut config.engine.ledger_caller);
    if let Ok(db_path) = std::env::var("GATEHOUSE_DB_PATH") {
        config.database.path = db_path;
    }
    if let Ok(level) = std::env::var("GATEHOUSE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("GATEHOUSE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    Ok(config)
}

fn override_parsed<T: FromStr>(var: &str, slot: &mut T) {
    let Ok(raw) = std::env::var(var) else {
        return;
    };
    match raw.parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => tracing::warn!(var, value = %raw, "ignoring unparseable override"),
    }
}
