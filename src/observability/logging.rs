//! Structured logging.
//!
//! # Responsibilities
//! - Build the process log sink from `[log]` configuration
//! - Render every event as one JSON object per line
//! - Gate events below the configured level
//!
//! # Line format
//! ```text
//! {"ts":"2024-05-01T10:00:00.123+02:00","level":"INFO","caller":"http/access_log.rs:88","msg":"/","status":200,...}
//! ```
//!
//! # Design Decisions
//! - The sink owns a `Dispatch`; only the orchestrator installs it globally
//! - File output goes through a non-blocking worker; dropping the sink flushes it
//! - An event with `fatal = true` is rendered with level `FATAL`

use std::fmt;

use chrono::{Local, SecondsFormat};
use serde_json::{Map, Number, Value};
use thiserror::Error;
use tracing::field::{Field, Visit};
use tracing::{Dispatch, Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;

use crate::config::schema::{LogConfig, RunMode};
use crate::observability::rolling::{self, RotationPolicy};

/// Error type for sink initialization.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("unrecognized log level `{0}`")]
    Level(String),

    #[error("cannot open log file {}: {source}", path.display())]
    Open {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Map a configured level name to a tracing level.
///
/// The `dpanic`, `panic` and `fatal` names are accepted and gate at error.
pub fn parse_level(name: &str) -> Option<Level> {
    match name.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" | "dpanic" | "panic" | "fatal" => Some(Level::ERROR),
        _ => None,
    }
}

/// The process log sink.
pub struct LogSink {
    dispatch: Dispatch,
    // Dropping the guard drains the non-blocking worker.
    _guard: Option<WorkerGuard>,
}

impl LogSink {
    /// Build the sink described by `config`, writing to a rotating file.
    pub fn init(config: &LogConfig, mode: RunMode) -> Result<Self, LogError> {
        let level = parse_level(&config.level).ok_or_else(|| LogError::Level(config.level.clone()))?;

        let file = rolling::open(&config.filename, RotationPolicy::from_config(config))
            .map_err(|source| LogError::Open {
                path: config.filename.clone(),
                source,
            })?;
        let (writer, guard) = tracing_appender::non_blocking(file);

        let dispatch = if mode == RunMode::Debug {
            build_dispatch(level, writer.and(std::io::stdout))
        } else {
            build_dispatch(level, writer)
        };

        Ok(Self {
            dispatch,
            _guard: Some(guard),
        })
    }

    /// Build a sink with the same format and gate over an arbitrary writer.
    pub fn with_writer<W>(level: &str, make_writer: W) -> Result<Self, LogError>
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        let level = parse_level(level).ok_or_else(|| LogError::Level(level.to_string()))?;
        Ok(Self {
            dispatch: build_dispatch(level, make_writer),
            _guard: None,
        })
    }

    /// The dispatcher, for scoping with `tracing::dispatcher::with_default`.
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Install as the process-wide default. Returns `false` if one was already set.
    pub fn install(&self) -> bool {
        tracing::dispatcher::set_global_default(self.dispatch.clone()).is_ok()
    }
}

fn build_dispatch<W>(level: Level, make_writer: W) -> Dispatch
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .event_format(JsonLines)
        .with_writer(make_writer);

    Dispatch::new(
        tracing_subscriber::registry()
            .with(LevelFilter::from_level(level))
            .with(layer),
    )
}

/// Event formatter producing one JSON object per line.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLines;

impl<S, N> FormatEvent<S, N> for JsonLines
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let level = if fields.fatal {
            "FATAL"
        } else {
            level_name(meta.level())
        };

        let mut record = Map::new();
        record.insert(
            "ts".into(),
            Value::String(Local::now().to_rfc3339_opts(SecondsFormat::Millis, false)),
        );
        record.insert("level".into(), Value::String(level.into()));
        if let (Some(file), Some(line)) = (meta.file(), meta.line()) {
            record.insert("caller".into(), Value::String(short_caller(file, line)));
        }
        record.insert("msg".into(), Value::String(fields.message));
        for (key, value) in fields.values {
            record.entry(key).or_insert(value);
        }

        let line = serde_json::to_string(&Value::Object(record)).map_err(|_| fmt::Error)?;
        writeln!(writer, "{line}")
    }
}

fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "TRACE",
        Level::DEBUG => "DEBUG",
        Level::INFO => "INFO",
        Level::WARN => "WARN",
        Level::ERROR => "ERROR",
    }
}

/// `src/http/recovery.rs` → `http/recovery.rs:42`
fn short_caller(file: &str, line: u32) -> String {
    let mut parts = file.rsplitn(3, |c: char| c == '/' || c == '\\');
    let name = parts.next().unwrap_or(file);
    match parts.next() {
        Some(dir) => format!("{dir}/{name}:{line}"),
        None => format!("{name}:{line}"),
    }
}

#[derive(Default)]
struct FieldCollector {
    message: String,
    fatal: bool,
    values: Vec<(String, Value)>,
}

impl FieldCollector {
    fn push(&mut self, field: &Field, value: Value) {
        self.values.push((field.name().to_string(), value));
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push(field, Value::String(value.to_string()));
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        if field.name() == "fatal" {
            self.fatal = value;
        } else {
            self.push(field, Value::Bool(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, Value::Number(value.into()));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null);
        self.push(field, value);
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push(field, Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            use std::fmt::Write;
            let _ = write!(self.message, "{value:?}");
        } else {
            self.push(field, Value::String(format!("{value:?}")));
        }
    }
}
