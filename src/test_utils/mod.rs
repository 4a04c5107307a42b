//! Test utilities for selfup
//!
//! Helpers shared by unit and integration tests:
//! - Logging setup that plays well with the test harness
//! - Archive and manifest fixtures
//! - An in-memory [`UpdateSource`](crate::upgrade::UpdateSource) and a
//!   recording [`BinaryReplacer`](crate::upgrade::BinaryReplacer)
//!
//! # Example
//!
//! ```rust,no_run
//! use selfup::test_utils::{ArchiveFixture, ManifestFixture, StaticSource, md5_hex};
//!
//! let zip = ArchiveFixture::zip(&[("app_linux_amd64", b"binary")]);
//! let manifest = ManifestFixture::new("1.2.3")
//!     .download("linux-amd64", "https://h/app.zip", &md5_hex(&zip))
//!     .build();
//! let source = StaticSource::new(manifest).with_asset("https://h/app.zip", zip);
//! ```

pub mod fixtures;
pub mod source;

pub use fixtures::{ArchiveFixture, ManifestFixture, md5_hex};
pub use source::{RecordingReplacer, StaticSource};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has any effect. Uses `level` if given, else `RUST_LOG`,
/// else leaves logging off.
///
/// # Example
///
/// ```rust,no_run
/// use tracing::Level;
///
/// selfup::test_utils::init_test_logging(None);
/// selfup::test_utils::init_test_logging(Some(Level::DEBUG));
/// ```
///
/// To enable logging in tests via environment variable:
/// ```bash
/// RUST_LOG=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}
