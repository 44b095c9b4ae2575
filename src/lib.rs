//! Service harness: configuration, structured logging, request interceptors,
//! store pools and a bounded graceful lifecycle around an axum router.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routes;
pub mod store;

pub use config::schema::AppConfig;
pub use http::{AppState, HttpServer};
pub use lifecycle::{Harness, HarnessError, Serving, Shutdown};
