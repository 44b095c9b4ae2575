//! Shared state handed to business handlers.

use std::sync::Arc;

use crate::config::{AppConfig, ConfigStore};
use crate::http::error::AppError;
use crate::store::{MysqlStore, RedisStore, StorePools};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigStore>,
    pub stores: StorePools,
}

impl AppState {
    pub fn new(config: Arc<ConfigStore>, stores: StorePools) -> Self {
        Self { config, stores }
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.snapshot()
    }

    /// The MySQL pool, or 503 if it never opened.
    pub fn mysql(&self) -> Result<&MysqlStore, AppError> {
        self.stores.mysql().ok_or(AppError::Unavailable("mysql"))
    }

    /// The Redis pool, or 503 if it never opened.
    pub fn redis(&self) -> Result<&RedisStore, AppError> {
        self.stores.redis().ok_or(AppError::Unavailable("redis"))
    }
}
