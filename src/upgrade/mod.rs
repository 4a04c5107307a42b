//! Self-update pipeline.
//!
//! Lets a running command-line program find, fetch and install a newer build of
//! itself from a static release server, without a package manager.
//!
//! # Architecture Overview
//!
//! - **[`SelfUpdater`]**: sequences the whole flow and owns executable path resolution
//! - **[`VersionChecker`]**: compares the running version with the published one
//! - **[`UpdateSource`]**: fetches the manifest and the asset ([`HttpSource`] over HTTP)
//! - **[`ChecksumVerifier`]**: checks the asset against the published digest
//! - **[`ArchiveExtractor`]**: finds the executable inside zip, tar.gz or gzip assets
//! - **[`BinaryReplacer`]**: swaps the file on disk ([`AtomicReplacer`] by default)
//!
//! ## Update Process Flow
//!
//! ```text
//! 1. Check
//!    ├── Resolve the target path (.exe on Windows, follow symlinks)
//!    ├── Fetch {base_url}/latest.json
//!    └── Stop if the published version is not newer
//!
//! 2. Download
//!    ├── Re-fetch the manifest and pick the {os}-{arch} entry
//!    └── Spool the asset to a temp file
//!
//! 3. Validate (when verify_checksum is on)
//!    └── MD5 (or SHA-256) of the asset must match the manifest
//!
//! 4. Extract
//!    └── First entry named {cmd}, {cmd}.exe or {cmd}_{os}_{arch}[.exe]
//!
//! 5. Replace
//!    └── Stage beside the target, rename into place, keep permissions
//! ```
//!
//! Nothing touches the executable until validation and extraction have both
//! succeeded. Every stage observes the caller's [`CancellationToken`].
//!
//! # Manifest
//!
//! ```json
//! {
//!   "version": "1.2.3",
//!   "releaseDate": "2024-05-01",
//!   "description": "Bug fixes",
//!   "downloads": {
//!     "linux-amd64": { "url": "https://example.com/app_linux_amd64.tar.gz", "md5": "..." }
//!   },
//!   "changelogUrl": "https://example.com/CHANGELOG.md"
//! }
//! ```
//!
//! # Examples
//!
//! ```rust,no_run
//! use selfup::upgrade::{SelfUpdater, UpdateOutcome, UpgradeConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let updater = SelfUpdater::from_config(
//!     UpgradeConfig::new("https://updates.example.com/app"),
//!     env!("CARGO_PKG_VERSION"),
//! )?;
//!
//! let token = CancellationToken::new();
//! match updater.update_self(&token).await? {
//!     UpdateOutcome::Updated { to, .. } => println!("Updated to {to}"),
//!     UpdateOutcome::UpToDate { current, .. } => println!("{current} is current"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod config;
pub mod extract;
pub mod logger;
pub mod manifest;
pub mod platform;
pub mod replace;
pub mod self_updater;
pub mod source;
pub mod verification;
pub mod version_check;

pub use config::UpgradeConfig;
pub use extract::{ArchiveExtractor, ArchiveFormat, ExecutableAsset, match_executable_name};
pub use logger::{FileLogger, Logger, NoopLogger, TracingLogger};
pub use manifest::{DownloadEntry, UpdateInfo, VersionDescriptor};
pub use platform::Platform;
pub use replace::{AtomicReplacer, BinaryReplacer};
pub use self_updater::{SelfUpdater, UpdateOutcome, UpdateStage, resolve_target_path};
pub use source::{
    AssetStream, ChangelogProvider, HttpSource, HttpSourceBuilder, MANIFEST_FILE, SourceFuture,
    UpdateSource,
};
pub use verification::{ChecksumVerifier, DigestAlgorithm};
pub use version_check::{UpdateCheck, VersionChecker, compare_versions, has_update};
