//! Server configuration management
//!
//! Values come from an optional TOML file, then environment variables
//! (a `.env` file is loaded by the binary before this runs).

use crate::error::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Main configuration for the stats server
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct DashboardConfig {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Stats store access
    pub store: StoreConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,
}

/// Which store backend serves the data
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Direct SQL through a connection pool
    Postgres,
    /// PostgREST over HTTPS
    Rest,
    /// JSON fixture held in memory
    Memory,
}

impl FromStr for StoreBackend {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "rest" | "supabase" => Ok(StoreBackend::Rest),
            "memory" | "fixture" => Ok(StoreBackend::Memory),
            other => Err(GatewayError::config(format!("Unknown store backend: {}", other))),
        }
    }
}

/// Stats store access configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Postgres connection string (postgres backend)
    pub database_url: Option<String>,

    /// Pool size (postgres backend)
    pub max_connections: u32,

    /// Project URL, without `/rest/v1` (rest backend)
    pub rest_url: Option<String>,

    /// API key sent as `apikey` and bearer token (rest backend)
    pub api_key: Option<String>,

    /// Per-request timeout in seconds (rest backend)
    pub request_timeout_secs: u64,

    /// Fixture file (memory backend)
    pub fixture_path: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8080 }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            database_url: None,
            max_connections: 5,
            rest_url: None,
            api_key: None,
            request_timeout_secs: 10,
            fixture_path: PathBuf::from("fixtures/sample.json"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

impl DashboardConfig {
    /// Load from an optional file, apply environment overrides and validate
    pub fn load(path: Option<&Path>) -> GatewayResult<Self> {
        let mut config = match path {
            Some(path) => {
                tracing::debug!("Loading configuration from file: {:?}", path);
                Self::load_from_file(path)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> GatewayResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Override values from environment-style `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> GatewayResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| {
            keys.iter().find_map(|key| lookup(*key).filter(|v| !v.trim().is_empty()))
        };

        if let Some(host) = first(&["STATS_HOST"]) {
            self.server.host = host;
        }
        if let Some(port) = first(&["STATS_PORT"]) {
            self.server.port = parse_number("STATS_PORT", &port)?;
        }
        if let Some(backend) = first(&["STATS_STORE_BACKEND"]) {
            self.store.backend = backend.parse()?;
        }
        if let Some(url) = first(&["DATABASE_URL"]) {
            self.store.database_url = Some(url);
        }
        if let Some(max) = first(&["STATS_DB_MAX_CONNECTIONS"]) {
            self.store.max_connections = parse_number("STATS_DB_MAX_CONNECTIONS", &max)?;
        }
        if let Some(url) = first(&["SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL"]) {
            self.store.rest_url = Some(url);
        }
        if let Some(key) = first(&["SUPABASE_SERVICE_ROLE_KEY", "NEXT_PUBLIC_SUPABASE_ANON_KEY"]) {
            self.store.api_key = Some(key);
        }
        if let Some(secs) = first(&["STATS_REQUEST_TIMEOUT_SECS"]) {
            self.store.request_timeout_secs = parse_number("STATS_REQUEST_TIMEOUT_SECS", &secs)?;
        }
        if let Some(path) = first(&["STATS_FIXTURE_PATH"]) {
            self.store.fixture_path = PathBuf::from(path);
        }
        if let Some(level) = first(&["STATS_LOG_LEVEL"]) {
            self.logging.level = level;
        }
        if let Some(format) = first(&["STATS_LOG_FORMAT"]) {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> GatewayResult<()> {
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => return Err(GatewayError::config(format!("Invalid log level: {}", other))),
        }

        match self.logging.format.as_str() {
            "json" | "pretty" | "compact" => {}
            other => return Err(GatewayError::config(format!("Invalid log format: {}", other))),
        }

        match self.store.backend {
            StoreBackend::Postgres => {
                if self.store.database_url.is_none() {
                    return Err(GatewayError::config("postgres backend requires DATABASE_URL"));
                }
                if self.store.max_connections == 0 {
                    return Err(GatewayError::config("max_connections must be at least 1"));
                }
            }
            StoreBackend::Rest => {
                if self.store.rest_url.is_none() {
                    return Err(GatewayError::config("rest backend requires SUPABASE_URL"));
                }
                if self.store.api_key.is_none() {
                    return Err(GatewayError::config("rest backend requires an API key"));
                }
            }
            StoreBackend::Memory => {}
        }

        if self.store.request_timeout_secs == 0 {
            return Err(GatewayError::config("request_timeout_secs must be at least 1"));
        }

        self.server_addr()?;
        Ok(())
    }

    /// Socket address the server binds to
    pub fn server_addr(&self) -> GatewayResult<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port).parse().map_err(|e| {
            GatewayError::config(format!(
                "Invalid server address {}:{}: {}",
                self.server.host, self.server.port, e
            ))
        })
    }
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> GatewayResult<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e| GatewayError::config(format!("Invalid {}: {}", key, e)))
}
