//! Application configuration
//!
//! Configuration comes from environment variables. A local `configs/config.env`
//! file, when present, seeds variables that are not already set.

use sqlx::postgres::PgSslMode;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Local file loaded into the environment before configuration is read
pub const CONFIG_FILE: &str = "./configs/config.env";

/// Errors raised while reading configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is not set
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    /// A variable is set but its value cannot be used
    #[error("invalid value for {var}: {reason}")]
    Invalid {
        /// Offending variable
        var: &'static str,
        /// Why the value was rejected
        reason: String,
    },
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Storage backend selection
    pub storage: StorageConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `debug,sqlx=warn`
    pub level: String,
    /// Output targets: `stdout`, `stderr` or file paths
    pub output_paths: Vec<String>,
}

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind, `host:port`
    pub addr: String,
    /// Upper bound on handling a single request
    pub write_timeout: Duration,
    /// Application name reported in logs and health checks
    pub app_name: String,
}

/// Where services and subscriptions are stored
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// PostgreSQL database
    Postgres(DbConfig),
    /// Process memory, lost on exit
    Memory,
}

/// PostgreSQL connection parameters
#[derive(Clone)]
pub struct DbConfig {
    /// Database host
    pub host: String,
    /// Database port
    pub port: u16,
    /// Database name
    pub name: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// TLS negotiation mode
    pub ssl_mode: PgSslMode,
    /// Directory holding `.sql` migrations
    pub migrations_path: PathBuf,
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("ssl_mode", &self.ssl_mode)
            .field("migrations_path", &self.migrations_path)
            .finish()
    }
}

/// Load variables from a `.env`-style file without overriding existing ones
pub fn load_config_file<P: AsRef<Path>>(path: P) -> Result<PathBuf, dotenv::Error> {
    dotenv::from_path(path.as_ref()).map(|_| path.as_ref().to_path_buf())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let log = LogConfig {
            level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            output_paths: get("LOG_OUTPUTPATHS")
                .map(|paths| {
                    paths
                        .split(',')
                        .map(|p| p.trim().to_string())
                        .filter(|p| !p.is_empty())
                        .collect()
                })
                .unwrap_or_else(|| vec!["stdout".to_string()]),
        };

        let write_timeout = required("SRV_WRITE_TIMEOUT")?;
        let server = ServerConfig {
            addr: normalize_addr(&required("SRV_ADDR")?),
            write_timeout: humantime::parse_duration(&write_timeout).map_err(|e| {
                ConfigError::Invalid {
                    var: "SRV_WRITE_TIMEOUT",
                    reason: e.to_string(),
                }
            })?,
            app_name: required("SRV_APPNAME")?,
        };

        let backend = get("DB_BACKEND").unwrap_or_else(|| "postgres".to_string());
        let storage = match backend.to_lowercase().as_str() {
            "postgres" | "postgresql" => {
                let port = required("DB_PORT")?;
                let ssl_mode = get("DB_SSL_MODE").unwrap_or_else(|| "disable".to_string());
                StorageConfig::Postgres(DbConfig {
                    host: required("DB_HOST")?,
                    port: port.parse().map_err(|e: std::num::ParseIntError| {
                        ConfigError::Invalid {
                            var: "DB_PORT",
                            reason: e.to_string(),
                        }
                    })?,
                    name: required("DB_DBNAME")?,
                    user: required("DB_USER")?,
                    password: required("DB_PASSWORD")?,
                    ssl_mode: ssl_mode.parse().map_err(|e: sqlx::Error| ConfigError::Invalid {
                        var: "DB_SSL_MODE",
                        reason: e.to_string(),
                    })?,
                    migrations_path: PathBuf::from(required("DB_MIGRATIONS_PATH")?),
                })
            }
            "memory" => StorageConfig::Memory,
            other => {
                return Err(ConfigError::Invalid {
                    var: "DB_BACKEND",
                    reason: format!("unknown backend {:?}, expected postgres or memory", other),
                })
            }
        };

        Ok(Self {
            log,
            server,
            storage,
        })
    }
}

/// Accept the `:8080` shorthand for "all interfaces"
fn normalize_addr(addr: &str) -> String {
    let addr = addr.trim();
    if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    }
}
