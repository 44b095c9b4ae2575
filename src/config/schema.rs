//! Configuration schema definitions.
//!
//! This module defines the complete configuration document for the service.
//! Top-level keys and store groups are required; rotation and `[server]`
//! settings fall back to defaults. Unknown keys are rejected so that a typo
//! never silently drops a setting.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Root configuration document.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Service name, reported at startup.
    pub name: String,

    /// Service version string.
    pub version: String,

    /// Run mode.
    pub mode: RunMode,

    /// TCP port the HTTP listener binds on all interfaces.
    pub port: u16,

    /// Logging sink settings.
    pub log: LogConfig,

    /// Relational store settings.
    pub mysql: MysqlConfig,

    /// Cache store settings.
    pub redis: RedisConfig,

    /// Listener and lifecycle settings.
    #[serde(default)]
    pub server: ServerConfig,
}

/// Run mode of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Development: log lines are mirrored to stdout.
    Debug,
    Release,
    Test,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunMode::Debug => "debug",
            RunMode::Release => "release",
            RunMode::Test => "test",
        };
        f.write_str(name)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Minimum level (trace, debug, info, warn, error, dpanic, panic, fatal).
    pub level: String,

    /// Path of the active log file.
    pub filename: PathBuf,

    /// Size in megabytes that triggers rotation (0 = 100 MB).
    #[serde(default)]
    pub max_size: u64,

    /// Days to keep rotated backups (0 = forever).
    #[serde(default)]
    pub max_age: u64,

    /// Number of rotated backups to keep (0 = all).
    #[serde(default)]
    pub max_backups: usize,
}

/// Relational store (MySQL) configuration.
#[derive(Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MysqlConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub dbname: String,

    /// Upper bound of pooled connections.
    #[serde(default = "default_max_open_conns")]
    pub max_open_conns: u32,

    /// Idle hint. The pool never holds connections open on its behalf;
    /// 0 closes idle connections almost immediately.
    #[serde(default = "default_max_idle_conns")]
    pub max_idle_conns: u32,
}

fn default_max_open_conns() -> u32 {
    10
}

fn default_max_idle_conns() -> u32 {
    2
}

// Manual impl keeps the password out of log lines.
impl fmt::Debug for MysqlConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MysqlConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("dbname", &self.dbname)
            .field("max_open_conns", &self.max_open_conns)
            .field("max_idle_conns", &self.max_idle_conns)
            .finish()
    }
}

/// Cache store (Redis) configuration.
#[derive(Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,

    /// Logical database index.
    #[serde(default)]
    pub db: i64,

    #[serde(default)]
    pub password: String,

    /// Maximum pooled connections.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    10
}

impl fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db", &self.db)
            .field("password", &"***")
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

/// Listener and lifecycle configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Drain window for graceful shutdown, in seconds.
    pub shutdown_timeout_secs: u64,

    /// Treat a store that fails to open as a fatal startup error.
    pub require_stores: bool,

    /// Include the panic backtrace in recovery log lines.
    pub capture_stack: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            shutdown_timeout_secs: 5,
            require_stores: false,
            capture_stack: true,
        }
    }
}
