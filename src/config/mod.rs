//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → snapshot.rs (ArcSwap slot, shared via Arc<ConfigStore>)
//!
//! On file change:
//!     watcher.rs detects change
//!     → applier task reloads through loader.rs
//!     → validation.rs validates
//!     → atomic swap of Arc<AppConfig>
//!     → readers observe new config on their next snapshot()
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - A failed reload keeps the previous snapshot and is only logged
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod snapshot;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError, DEFAULT_CONFIG_PATH};
pub use schema::{AppConfig, LogConfig, MysqlConfig, RedisConfig, RunMode, ServerConfig};
pub use snapshot::{ConfigStore, WatchHandle};
