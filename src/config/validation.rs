//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ports, pool sizing, timeouts)
//! - Reject log levels the sink cannot honour
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::observability::logging::parse_level;

/// A single semantic problem in a configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("`{field}` must not be empty")]
    Empty { field: &'static str },

    #[error("`{field}` must be greater than zero")]
    Zero { field: &'static str },

    #[error("unrecognized log level `{0}`")]
    UnknownLevel(String),

    #[error("mysql.max_idle_conns ({idle}) exceeds mysql.max_open_conns ({open})")]
    IdleExceedsOpen { idle: u32, open: u32 },
}

/// Check a parsed document for semantic consistency.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.name.trim().is_empty() {
        errors.push(ValidationError::Empty { field: "name" });
    }

    if parse_level(&config.log.level).is_none() {
        errors.push(ValidationError::UnknownLevel(config.log.level.clone()));
    }
    if config.log.filename.as_os_str().is_empty() {
        errors.push(ValidationError::Empty { field: "log.filename" });
    }

    let mysql = &config.mysql;
    if mysql.host.trim().is_empty() {
        errors.push(ValidationError::Empty { field: "mysql.host" });
    }
    if mysql.port == 0 {
        errors.push(ValidationError::Zero { field: "mysql.port" });
    }
    if mysql.max_open_conns == 0 {
        errors.push(ValidationError::Zero { field: "mysql.max_open_conns" });
    } else if mysql.max_idle_conns > mysql.max_open_conns {
        errors.push(ValidationError::IdleExceedsOpen {
            idle: mysql.max_idle_conns,
            open: mysql.max_open_conns,
        });
    }

    let redis = &config.redis;
    if redis.host.trim().is_empty() {
        errors.push(ValidationError::Empty { field: "redis.host" });
    }
    if redis.port == 0 {
        errors.push(ValidationError::Zero { field: "redis.port" });
    }
    if redis.pool_size == 0 {
        errors.push(ValidationError::Zero { field: "redis.pool_size" });
    }

    if config.server.max_connections == 0 {
        errors.push(ValidationError::Zero { field: "server.max_connections" });
    }
    if config.server.shutdown_timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "server.shutdown_timeout_secs" });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::parse_config;
    use crate::config::loader::tests::SAMPLE;

    #[test]
    fn sample_is_valid() {
        let config = parse_config(SAMPLE).unwrap();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = parse_config(SAMPLE).unwrap();
        config.name = " ".into();
        config.log.level = "loud".into();
        config.redis.pool_size = 0;
        config.mysql.max_idle_conns = config.mysql.max_open_conns + 1;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::UnknownLevel("loud".into())));
        assert!(errors.contains(&ValidationError::Zero { field: "redis.pool_size" }));
    }

    #[test]
    fn zero_shutdown_window_rejected() {
        let mut config = parse_config(SAMPLE).unwrap();
        config.server.shutdown_timeout_secs = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::Zero { field: "server.shutdown_timeout_secs" }]
        );
    }
}
