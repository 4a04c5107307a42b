//! Error handling for selfup.
//!
//! The library reports every failure through [`UpdateError`], a single enum whose
//! variants mirror the stages of an update: resolving the manifest, picking the
//! platform download, fetching the asset, verifying it, unwrapping the archive and
//! finally swapping the executable on disk.
//!
//! The binary layer works with [`anyhow::Error`] and converts whatever bubbles up
//! into an [`ErrorContext`] via [`user_friendly_error`] before printing it.
//!
//! # Examples
//!
//! ```rust,no_run
//! use selfup::core::UpdateError;
//!
//! fn describe(error: &UpdateError) -> &'static str {
//!     match error {
//!         UpdateError::ChecksumMismatch { .. } => "download corrupted, nothing was written",
//!         UpdateError::PlatformNotFound { .. } => "no build for this machine",
//!         UpdateError::Cancelled { .. } => "aborted",
//!         _ => "update failed",
//!     }
//! }
//! ```

use colored::Colorize;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::upgrade::UpdateStage;

/// Which side of a version comparison a version string came from.
///
/// Used by [`UpdateError::InvalidVersion`] so the caller can tell whether the
/// running build or the published manifest carries the malformed version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionRole {
    /// The version of the running build, supplied by the caller.
    Current,
    /// The version published in the remote manifest.
    Latest,
    /// The left operand of a plain comparison.
    Left,
    /// The right operand of a plain comparison.
    Right,
}

impl fmt::Display for VersionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Current => "current",
            Self::Latest => "latest",
            Self::Left => "left-hand",
            Self::Right => "right-hand",
        };
        f.write_str(name)
    }
}

/// The error type for every selfup operation.
///
/// Variants carry the URL, version, name or path that was being processed so a
/// caller can log the failing stage without extra bookkeeping. Nothing in the
/// crate retries on its own; each of these propagates to the caller as soon as
/// it happens.
///
/// # Error Categories
///
/// ## Manifest and versions
/// - [`NetworkFailure`] / [`TransportFailure`] - the request failed or got a non-2xx answer
/// - [`DecodeFailure`] - the manifest is not the expected JSON document
/// - [`InvalidVersion`] - a version string is not a semantic version
/// - [`PlatformNotFound`] / [`VersionMismatch`] - the manifest cannot serve this build
///
/// ## Asset handling
/// - [`FormatUnsupported`] - unknown archive suffix in strict mode
/// - [`CorruptArchive`] / [`ExecutableNotFound`] - archive unreadable or without the command
/// - [`ChecksumMismatch`] - payload digest differs from the manifest
///
/// ## Installation
/// - [`ReplacementFailure`] - the swap primitive could not install the new binary
/// - [`Cancelled`] - the caller's cancellation token fired
///
/// [`NetworkFailure`]: UpdateError::NetworkFailure
/// [`TransportFailure`]: UpdateError::TransportFailure
/// [`DecodeFailure`]: UpdateError::DecodeFailure
/// [`InvalidVersion`]: UpdateError::InvalidVersion
/// [`PlatformNotFound`]: UpdateError::PlatformNotFound
/// [`VersionMismatch`]: UpdateError::VersionMismatch
/// [`FormatUnsupported`]: UpdateError::FormatUnsupported
/// [`CorruptArchive`]: UpdateError::CorruptArchive
/// [`ExecutableNotFound`]: UpdateError::ExecutableNotFound
/// [`ChecksumMismatch`]: UpdateError::ChecksumMismatch
/// [`ReplacementFailure`]: UpdateError::ReplacementFailure
/// [`Cancelled`]: UpdateError::Cancelled
#[derive(Error, Debug)]
pub enum UpdateError {
    /// A request could not be sent or its body could not be read.
    #[error("Network error while {operation} ({url}): {reason}")]
    NetworkFailure {
        /// What was being fetched (e.g. "fetching version manifest")
        operation: String,
        /// The URL that was requested
        url: String,
        /// Underlying transport error
        reason: String,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status} while {operation} ({url})")]
    TransportFailure {
        /// What was being fetched
        operation: String,
        /// The URL that was requested
        url: String,
        /// HTTP status code returned by the server
        status: u16,
    },

    /// The version manifest is not valid JSON of the expected shape.
    #[error("Failed to decode version manifest from {url}: {reason}")]
    DecodeFailure {
        /// Where the manifest came from
        url: String,
        /// Decoder message
        reason: String,
    },

    /// A version string is not a semantic version.
    #[error("Invalid {role} version '{version}': {reason}")]
    InvalidVersion {
        /// Which input was malformed
        role: VersionRole,
        /// The offending version string
        version: String,
        /// Parser message
        reason: String,
    },

    /// The manifest has no download entry for the running platform.
    #[error("No download for platform '{platform}' in release {version}")]
    PlatformNotFound {
        /// Platform key that was looked up (`{os}-{arch}`)
        platform: String,
        /// Release version from the manifest
        version: String,
    },

    /// The manifest no longer describes the version that was requested.
    #[error("Requested version {requested} does not match manifest version {found}")]
    VersionMismatch {
        /// Version the caller asked for
        requested: String,
        /// Version the manifest currently advertises
        found: String,
    },

    /// The asset URL has a suffix that is not a known archive format.
    ///
    /// Only raised when pass-through of unknown formats is disabled.
    #[error("Unsupported archive format for {url}")]
    FormatUnsupported {
        /// Asset URL whose suffix was not recognized
        url: String,
    },

    /// The archive could not be read.
    #[error("Corrupt {format} archive from {url}: {reason}")]
    CorruptArchive {
        /// Format that was being decoded ("zip", "tar.gz", "gzip")
        format: String,
        /// Asset URL
        url: String,
        /// Decoder message
        reason: String,
    },

    /// No archive entry matched the command being updated.
    #[error("Executable '{command}' not found in {url}{}", found_suffix(.found))]
    ExecutableNotFound {
        /// Asset URL
        url: String,
        /// Command name that was searched for
        command: String,
        /// For single-file archives, the name that was present instead
        found: Option<String>,
    },

    /// The downloaded payload does not hash to the published digest.
    #[error("Checksum verification failed: expected {expected}, computed {actual}")]
    ChecksumMismatch {
        /// Digest published in the manifest
        expected: String,
        /// Digest computed over the payload
        actual: String,
    },

    /// The swap primitive failed to install the new executable.
    #[error("Failed to replace {}: {reason}", .path.display())]
    ReplacementFailure {
        /// Target executable path
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// The caller cancelled the operation.
    #[error("Update cancelled while {stage}")]
    Cancelled {
        /// Stage that was running when cancellation was observed
        stage: UpdateStage,
    },

    /// A source was asked for a capability it does not provide.
    #[error("Update source does not support {capability}")]
    CapabilityUnsupported {
        /// Name of the missing capability
        capability: String,
    },

    /// Invalid updater configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem
        message: String,
    },

    /// Local filesystem error outside the swap primitive.
    #[error("I/O error while {operation} ({}): {source}", .path.display())]
    Io {
        /// The operation that failed
        operation: String,
        /// Path involved in the operation
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
}

fn found_suffix(found: &Option<String>) -> String {
    match found {
        Some(name) => format!(" (archive contains '{name}')"),
        None => String::new(),
    }
}

impl UpdateError {
    /// Build a [`UpdateError::Io`] from an operation description and path.
    pub fn io(operation: impl Into<String>, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Whether this error was caused by cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// An error paired with optional details and a suggested fix.
///
/// This is what the CLI prints. Library callers normally match on
/// [`UpdateError`] directly.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error message
    pub error: String,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a context with no suggestion or details.
    #[must_use]
    pub fn new(error: impl fmt::Display) -> Self {
        Self {
            error: error.to_string(),
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr: error in red, details in yellow, suggestion in green.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert an arbitrary error into something worth showing a user.
///
/// Looks for an [`UpdateError`] anywhere in the chain and attaches a suggestion
/// matching its kind. Other errors are shown with their full context chain.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let Some(update_error) = error.chain().find_map(|e| e.downcast_ref::<UpdateError>()) else {
        return ErrorContext::new(format!("{error:#}"));
    };

    let context = ErrorContext::new(format!("{error:#}"));
    match update_error {
        UpdateError::NetworkFailure { .. } | UpdateError::TransportFailure { .. } => context
            .with_suggestion("Check your network connection and the configured base URL, then retry")
            .with_details("Nothing was downloaded or installed"),
        UpdateError::DecodeFailure { .. } => context
            .with_suggestion("Verify that latest.json on the update server is valid JSON")
            .with_details(
                "Expected fields: version, releaseDate, description, downloads, changelogUrl",
            ),
        UpdateError::InvalidVersion { role, .. } => context.with_suggestion(match role {
            VersionRole::Current => "Pass a semantic version such as 1.4.0 as the current version",
            _ => "Publish a semantic version such as 1.4.0 in the manifest",
        }),
        UpdateError::PlatformNotFound { platform, .. } => context.with_suggestion(format!(
            "Add a '{platform}' entry to the manifest's downloads, or override --os/--arch"
        )),
        UpdateError::VersionMismatch { .. } => context
            .with_suggestion("The manifest changed during the update; run the update again")
            .with_details("The release was republished between the version check and the download"),
        UpdateError::FormatUnsupported { .. } => context.with_suggestion(
            "Publish a .zip, .tar.gz, .tgz or .gz asset, or enable passthrough_unknown_formats",
        ),
        UpdateError::CorruptArchive { .. } => context
            .with_suggestion("Retry the download; if it persists, republish the asset")
            .with_details("The executable was not modified"),
        UpdateError::ExecutableNotFound { command, .. } => context.with_suggestion(format!(
            "Name the binary '{command}' or '{command}_<os>_<arch>' inside the archive"
        )),
        UpdateError::ChecksumMismatch { .. } => context
            .with_suggestion("Retry the download, or check the md5 published in the manifest")
            .with_details("The executable was not modified"),
        UpdateError::ReplacementFailure { .. } => context
            .with_suggestion("Check write permissions on the executable and its directory")
            .with_details("The previous executable was restored if it had been moved"),
        UpdateError::Cancelled { .. } => context,
        UpdateError::CapabilityUnsupported { .. } => context,
        UpdateError::Config { .. } => {
            context.with_suggestion("Check the [upgrade] section of your configuration file")
        }
        UpdateError::Io { source, .. } => match source.kind() {
            io::ErrorKind::PermissionDenied => context.with_suggestion(
                "Try running with elevated permissions (sudo/Administrator) or check file ownership",
            ),
            io::ErrorKind::NotFound => {
                context.with_suggestion("Check that the executable path exists")
            }
            _ => context,
        },
    }
}
