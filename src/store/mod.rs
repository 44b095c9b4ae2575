//! Backing-store connection pools.
//!
//! # Data Flow
//! ```text
//! AppConfig snapshot (at startup)
//!     → mysql.rs (sqlx pool + ping)
//!     → redis.rs (deadpool pool + PING)
//!     → StorePools (cloned into AppState, read-only afterwards)
//!
//! Shutdown:
//!     listener drained → StorePools::close (redis, then mysql)
//! ```
//!
//! # Design Decisions
//! - Each open is bounded by a 5 second deadline
//! - A failed open leaves the slot empty; handlers get `AppError::Unavailable`
//! - Whether a failure aborts startup is decided by `server.require_stores`

pub mod mysql;
pub mod redis;

use std::time::Duration;

use thiserror::Error;

use crate::config::AppConfig;

pub use self::mysql::MysqlStore;
pub use self::redis::RedisStore;

/// Deadline for establishing a pool and answering its first ping.
pub const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Error type for store initialization.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("mysql: {0}")]
    Mysql(#[from] sqlx::Error),

    #[error("redis pool: {0}")]
    RedisPool(#[from] deadpool_redis::CreatePoolError),

    #[error("redis connection: {0}")]
    RedisConnection(#[from] deadpool_redis::PoolError),

    #[error("redis: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),

    #[error("{store} did not answer within {}s", timeout.as_secs())]
    Timeout {
        store: &'static str,
        timeout: Duration,
    },
}

/// The pools opened at startup. Either slot may be empty.
#[derive(Clone, Default)]
pub struct StorePools {
    mysql: Option<MysqlStore>,
    redis: Option<RedisStore>,
}

impl StorePools {
    /// Open both pools, MySQL first. Failures are logged and returned.
    pub async fn open(config: &AppConfig) -> (Self, Vec<StoreError>) {
        let mut failures = Vec::new();

        let mysql = match MysqlStore::open(&config.mysql).await {
            Ok(store) => Some(store),
            Err(e) => {
                tracing::error!(store = "mysql", error = %e, "init mysql failed");
                failures.push(e);
                None
            }
        };

        let redis = match RedisStore::open(&config.redis).await {
            Ok(store) => Some(store),
            Err(e) => {
                tracing::error!(store = "redis", error = %e, "init redis failed");
                failures.push(e);
                None
            }
        };

        (Self { mysql, redis }, failures)
    }

    pub fn mysql(&self) -> Option<&MysqlStore> {
        self.mysql.as_ref()
    }

    pub fn redis(&self) -> Option<&RedisStore> {
        self.redis.as_ref()
    }

    /// Close in reverse acquisition order. Empty slots are skipped.
    pub async fn close(&self) {
        if let Some(redis) = &self.redis {
            redis.close();
        }
        if let Some(mysql) = &self.mysql {
            mysql.close().await;
        }
        tracing::debug!("store pools closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::parse_config;
    use crate::config::loader::tests::SAMPLE;

    fn unreachable_config() -> AppConfig {
        let mut config = parse_config(SAMPLE).unwrap();
        // nothing listens on port 1
        config.mysql.port = 1;
        config.redis.port = 1;
        config
    }

    #[tokio::test]
    async fn failed_opens_leave_empty_slots() {
        let (pools, failures) = StorePools::open(&unreachable_config()).await;
        assert_eq!(failures.len(), 2);
        assert!(pools.mysql().is_none());
        assert!(pools.redis().is_none());
    }

    #[tokio::test]
    async fn closing_empty_pools_is_a_no_op() {
        let pools = StorePools::default();
        pools.close().await;
        pools.close().await;
    }
}
