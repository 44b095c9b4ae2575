//! Cache store pool (Redis via deadpool-redis).

use deadpool_redis::{
    redis, Config, ConnectionAddr, ConnectionInfo, Pool, PoolConfig, ProtocolVersion,
    RedisConnectionInfo, Runtime,
};

use crate::config::RedisConfig;
use crate::store::{StoreError, OPEN_TIMEOUT};

/// Handle to the Redis pool. Cloning shares the pool.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    /// Build the pool and `PING` once within [`OPEN_TIMEOUT`].
    pub async fn open(config: &RedisConfig) -> Result<Self, StoreError> {
        let pool = pool_config(config).create_pool(Some(Runtime::Tokio1))?;

        let outcome = tokio::time::timeout(OPEN_TIMEOUT, ping(&pool)).await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                pool.close();
                return Err(e);
            }
            Err(_) => {
                pool.close();
                return Err(StoreError::Timeout {
                    store: "redis",
                    timeout: OPEN_TIMEOUT,
                });
            }
        }

        tracing::info!(
            host = %config.host,
            port = config.port,
            db = config.db,
            pool_size = config.pool_size,
            "redis pool ready"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Release all pooled connections. Safe to call more than once.
    pub fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close();
        }
    }
}

async fn ping(pool: &Pool) -> Result<(), StoreError> {
    let mut conn = pool.get().await?;
    let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
    Ok(())
}

/// Connection settings as typed fields; the password never passes through a URL.
fn pool_config(config: &RedisConfig) -> Config {
    Config {
        connection: Some(ConnectionInfo {
            addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
            redis: RedisConnectionInfo {
                db: config.db,
                username: None,
                password: (!config.password.is_empty()).then(|| config.password.clone()),
                protocol: ProtocolVersion::RESP2,
            },
        }),
        pool: Some(PoolConfig::new(config.pool_size)),
        ..Default::default()
    }
}
