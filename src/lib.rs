//! selfup - self-update pipeline for command-line programs
//!
//! Lets a running executable discover, fetch and install a newer published build
//! of itself from a plain HTTP release server: one `latest.json` manifest plus an
//! archive per platform.
//!
//! # Architecture Overview
//!
//! - The server publishes `{base_url}/latest.json` naming the newest version and a
//!   download per `{os}-{arch}` key, each with an MD5 digest
//! - The updater compares versions by semantic-version precedence and only ever
//!   moves forward
//! - The asset format is inferred from its URL suffix (`.zip`, `.tar.gz`/`.tgz`,
//!   `.gz`/`.gzip`, otherwise a bare binary)
//! - The executable is located in the archive by name, allowing platform-suffixed
//!   names such as `app_windows_amd64.exe`
//! - The digest is checked and the executable extracted before anything on disk
//!   changes; the final swap is a rename
//!
//! # Core Modules
//!
//! - [`upgrade`] - the update pipeline: manifest model, sources, verification,
//!   extraction, replacement and the [`upgrade::SelfUpdater`] orchestrator
//! - [`core`] - error types shared by every stage
//! - [`cli`] - the `selfup` command used to exercise a release server by hand
//!
//! # Example
//!
//! ```rust,no_run
//! use selfup::upgrade::{SelfUpdater, UpgradeConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let updater = SelfUpdater::from_config(
//!     UpgradeConfig::new("https://updates.example.com/app"),
//!     env!("CARGO_PKG_VERSION"),
//! )?;
//!
//! let check = updater.check_for_updates(&CancellationToken::new()).await?;
//! if check.has_update {
//!     println!("Version {} is available", check.latest_version());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! ```toml
//! [upgrade]
//! base_url = "https://updates.example.com/app"
//! verify_checksum = true
//! passthrough_unknown_formats = true
//! timeout_secs = 60
//! ```

pub mod cli;
pub mod core;
pub mod upgrade;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
