//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce tracing events
//!     → logging.rs (level gate, JSON line format)
//!     → rolling.rs (size-rotated file, backup retention)
//!     → non-blocking worker thread → disk
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - The sink is built once at startup; config reloads do not retarget it
//! - Final flush happens when the sink is dropped at shutdown

pub mod logging;
pub mod rolling;

pub use logging::{LogError, LogSink};
