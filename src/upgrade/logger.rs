//! User-facing progress messages.
//!
//! The updater reports what it is doing through a [`Logger`] so an embedding
//! application can route those lines wherever it likes. Internal diagnostics
//! still go through `tracing`; this trait only carries the handful of messages
//! an end user would want to see.

use chrono::Local;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::core::{Result, UpdateError};

/// Two-severity message sink.
pub trait Logger: Send + Sync {
    /// Report progress.
    fn info(&self, args: fmt::Arguments<'_>);

    /// Report a failure.
    fn error(&self, args: fmt::Arguments<'_>);
}

/// Discards everything. Used when no logger is supplied.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn info(&self, _args: fmt::Arguments<'_>) {}

    fn error(&self, _args: fmt::Arguments<'_>) {}
}

/// Forwards messages to `tracing` under the `selfup` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, args: fmt::Arguments<'_>) {
        tracing::info!(target: "selfup", "{args}");
    }

    fn error(&self, args: fmt::Arguments<'_>) {
        tracing::error!(target: "selfup", "{args}");
    }
}

/// Appends timestamped lines to a file.
///
/// Each message becomes one line: `2024-05-01 12:00:00 [INFO] message`.
///
/// # Examples
///
/// ```rust,no_run
/// use selfup::upgrade::{FileLogger, Logger};
///
/// # fn example() -> anyhow::Result<()> {
/// let logger = FileLogger::open("/tmp/app/update.log")?;
/// logger.info(format_args!("checking for updates"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FileLogger {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileLogger {
    /// Open `path` for appending, creating it and its parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| UpdateError::io("creating log directory", parent, e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| UpdateError::io("opening log file", path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&self, level: &str, args: fmt::Arguments<'_>) {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        // A poisoned lock only means another writer panicked mid-line.
        let mut file = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(file, "{timestamp} [{level}] {args}") {
            tracing::warn!("Failed to write to {}: {e}", self.path.display());
        }
    }
}

impl Logger for FileLogger {
    fn info(&self, args: fmt::Arguments<'_>) {
        self.write_line("INFO", args);
    }

    fn error(&self, args: fmt::Arguments<'_>) {
        self.write_line("ERROR", args);
    }
}
