//! Size-rotated log file with age or count retention.
//!
//! Rotation is done by `file-rotate`: the active file is moved to
//! `<name>.<timestamp>` once a write pushes it past `max_bytes`, and old
//! backups are removed by count or, when no count is set, by age.

use std::fs;
use std::io;
use std::path::Path;

use file_rotate::compression::Compression;
use file_rotate::suffix::{AppendTimestamp, FileLimit};
use file_rotate::{ContentLimit, FileRotate};

use crate::config::schema::LogConfig;

const MEGABYTE: usize = 1024 * 1024;
const DEFAULT_MAX_MEGABYTES: usize = 100;

/// The rotating writer handed to the non-blocking worker.
pub type RollingFile = FileRotate<AppendTimestamp>;

/// When to rotate and what to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Rotate once the file grows past this size.
    pub max_bytes: usize,
    /// Remove backups older than this; `None` keeps them regardless of age.
    pub max_age: Option<chrono::Duration>,
    /// Keep at most this many backups; 0 keeps all.
    pub max_backups: usize,
}

impl RotationPolicy {
    pub fn from_config(config: &LogConfig) -> Self {
        let megabytes = match usize::try_from(config.max_size) {
            Ok(0) => DEFAULT_MAX_MEGABYTES,
            Ok(megabytes) => megabytes,
            Err(_) => usize::MAX,
        };
        let max_age = i64::try_from(config.max_age)
            .ok()
            .and_then(chrono::Duration::try_days)
            .unwrap_or(chrono::Duration::MAX);
        Self {
            max_bytes: megabytes.saturating_mul(MEGABYTE),
            max_age: (config.max_age > 0).then_some(max_age),
            max_backups: config.max_backups,
        }
    }

    /// Retention rule for backups. A backup count wins over an age limit.
    pub fn file_limit(&self) -> FileLimit {
        match (self.max_backups, self.max_age) {
            (0, Some(age)) => FileLimit::Age(age),
            (0, None) => FileLimit::Unlimited,
            (count, _) => FileLimit::MaxFiles(count),
        }
    }
}

/// Open (or create) the active file, creating parent directories.
pub fn open(path: impl AsRef<Path>, policy: RotationPolicy) -> io::Result<RollingFile> {
    let path = path.as_ref();
    if path.file_name().is_none() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "log path has no file name"));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    Ok(FileRotate::new(
        path,
        AppendTimestamp::default(policy.file_limit()),
        ContentLimit::BytesSurpassed(policy.max_bytes),
        Compression::None,
        #[cfg(unix)]
        None,
    ))
}
