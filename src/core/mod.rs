//! Core types shared by the library and the CLI.
//!
//! ## `error` - Error Handling
//!
//! - [`UpdateError`] - every failure mode of an update attempt
//! - [`VersionRole`] - which input of a version comparison was malformed
//! - [`ErrorContext`] - user-facing wrapper with details and suggestions
//! - [`user_friendly_error`] - convert any [`anyhow::Error`] for display
//!
//! # Examples
//!
//! ```rust
//! use selfup::core::{UpdateError, user_friendly_error};
//!
//! let error = anyhow::Error::new(UpdateError::PlatformNotFound {
//!     platform: "plan9-mips".to_string(),
//!     version: "1.2.3".to_string(),
//! });
//! let friendly = user_friendly_error(error);
//! assert!(friendly.suggestion.is_some());
//! ```

pub mod error;

pub use error::{ErrorContext, UpdateError, VersionRole, user_friendly_error};

/// Result alias used throughout the library.
pub type Result<T, E = UpdateError> = std::result::Result<T, E>;
