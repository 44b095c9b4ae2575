//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper-util connection, graceful drain)
//!     → pipeline.rs (request id → access log → recovery)
//!     → business routes (handlers get AppState from state.rs)
//!     → error.rs (AppError → status + extensions)
//!     → Send to client, or close silently on AbortConnection
//! ```

pub mod access_log;
pub mod error;
pub mod pipeline;
pub mod recovery;
pub mod server;
pub mod state;

pub use error::{AbortConnection, AppError, HandlerErrors};
pub use server::{HttpServer, ServeOutcome};
pub use state::AppState;
