//! Relational store pool (MySQL via sqlx).

use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::Connection;

use crate::config::MysqlConfig;
use crate::store::{StoreError, OPEN_TIMEOUT};

/// How long an unused connection stays pooled.
const IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// With `max_idle_conns = 0` idle connections are closed almost at once.
const NO_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

/// Handle to the MySQL pool. Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct MysqlStore {
    pool: MySqlPool,
}

impl MysqlStore {
    /// Connect, size the pool and ping once, all within [`OPEN_TIMEOUT`].
    pub async fn open(config: &MysqlConfig) -> Result<Self, StoreError> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.dbname)
            .charset("utf8mb4");

        let pool = tokio::time::timeout(OPEN_TIMEOUT, connect(config, options))
            .await
            .map_err(|_| StoreError::Timeout {
                store: "mysql",
                timeout: OPEN_TIMEOUT,
            })??;

        tracing::info!(
            host = %config.host,
            port = config.port,
            dbname = %config.dbname,
            max_open_conns = config.max_open_conns,
            max_idle_conns = config.max_idle_conns,
            "mysql pool ready"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Release all pooled connections. Safe to call more than once.
    pub async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
        }
    }
}

/// sqlx has no idle ceiling. The pool is never pre-filled and idle
/// connections are reaped by timeout instead; `max_idle_conns = 0` shortens it.
fn pool_options(config: &MysqlConfig) -> MySqlPoolOptions {
    let idle_timeout = if config.max_idle_conns == 0 {
        NO_IDLE_TIMEOUT
    } else {
        IDLE_TIMEOUT
    };
    MySqlPoolOptions::new()
        .max_connections(config.max_open_conns)
        .min_connections(0)
        .idle_timeout(idle_timeout)
        .acquire_timeout(OPEN_TIMEOUT)
}

async fn connect(config: &MysqlConfig, options: MySqlConnectOptions) -> Result<MySqlPool, StoreError> {
    let pool = pool_options(config).connect_with(options).await?;

    let ping = async {
        let mut conn = pool.acquire().await?;
        conn.ping().await
    };
    if let Err(e) = ping.await {
        pool.close().await;
        return Err(e.into());
    }
    Ok(pool)
}
