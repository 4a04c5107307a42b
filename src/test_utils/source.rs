//! In-memory collaborators for driving [`SelfUpdater`](crate::upgrade::SelfUpdater)
//! without a network or a real executable.

use std::collections::{HashMap, VecDeque};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

use crate::core::{Result, UpdateError};
use crate::upgrade::source::cancellable;
use crate::upgrade::{
    AssetStream, BinaryReplacer, ChangelogProvider, SourceFuture, UpdateInfo, UpdateSource,
    UpdateStage, VersionDescriptor,
};

/// Update source serving fixed manifests and assets from memory.
///
/// Manifests are served in order; the last one repeats. Queue two manifests to
/// simulate a release published between the check and the download.
pub struct StaticSource {
    manifests: Mutex<VecDeque<VersionDescriptor>>,
    assets: HashMap<String, Vec<u8>>,
    changelog: Option<String>,
    stall_downloads: bool,
    fetches: AtomicUsize,
    downloads: AtomicUsize,
}

impl StaticSource {
    /// Source that always serves `manifest`.
    pub fn new(manifest: VersionDescriptor) -> Self {
        Self {
            manifests: Mutex::new(VecDeque::from([manifest])),
            assets: HashMap::new(),
            changelog: None,
            stall_downloads: false,
            fetches: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
        }
    }

    /// Serve `manifest` after the ones already queued.
    pub fn then_serve(self, manifest: VersionDescriptor) -> Self {
        self.manifests.lock().expect("manifest lock").push_back(manifest);
        self
    }

    /// Serve `bytes` for downloads of `url`.
    pub fn with_asset(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.assets.insert(url.to_string(), bytes);
        self
    }

    /// Offer the changelog capability, answering with `text`.
    pub fn with_changelog(mut self, text: &str) -> Self {
        self.changelog = Some(text.to_string());
        self
    }

    /// Make downloads hang until the token is cancelled.
    pub fn stalling_downloads(mut self) -> Self {
        self.stall_downloads = true;
        self
    }

    /// Number of manifest fetches so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of downloads opened so far.
    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    fn next_manifest(&self) -> VersionDescriptor {
        let mut manifests = self.manifests.lock().expect("manifest lock");
        if manifests.len() > 1 {
            manifests.pop_front().expect("non-empty queue")
        } else {
            manifests.front().cloned().expect("at least one manifest")
        }
    }
}

impl UpdateSource for StaticSource {
    fn fetch_descriptor<'a>(
        &'a self,
        token: &'a CancellationToken,
    ) -> SourceFuture<'a, VersionDescriptor> {
        Box::pin(cancellable(token, UpdateStage::Checking, async move {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.next_manifest())
        }))
    }

    fn download<'a>(
        &'a self,
        token: &'a CancellationToken,
        info: &'a UpdateInfo,
    ) -> SourceFuture<'a, AssetStream> {
        Box::pin(cancellable(token, UpdateStage::Downloading, async move {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            if self.stall_downloads {
                std::future::pending::<()>().await;
            }
            let bytes = self.assets.get(&info.download_url).cloned().ok_or_else(|| {
                UpdateError::TransportFailure {
                    operation: "downloading update".to_string(),
                    url: info.download_url.clone(),
                    status: 404,
                }
            })?;
            let stream: AssetStream = Box::pin(Cursor::new(bytes));
            Ok(stream)
        }))
    }

    fn changelog_provider(&self) -> Option<&dyn ChangelogProvider> {
        if self.changelog.is_some() { Some(self) } else { None }
    }
}

impl ChangelogProvider for StaticSource {
    fn fetch_changelog<'a>(
        &'a self,
        token: &'a CancellationToken,
        version: &'a str,
    ) -> SourceFuture<'a, String> {
        Box::pin(cancellable(token, UpdateStage::Checking, async move {
            let manifest = self.next_manifest();
            if manifest.version != version {
                return Err(UpdateError::VersionMismatch {
                    requested: version.to_string(),
                    found: manifest.version,
                });
            }
            Ok(self.changelog.clone().unwrap_or_default())
        }))
    }
}

/// Replacer that records what it was asked to install instead of touching disk.
#[derive(Default)]
pub struct RecordingReplacer {
    installs: Mutex<Vec<(PathBuf, Vec<u8>)>>,
    fail: bool,
}

impl RecordingReplacer {
    /// Replacer that accepts every install.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replacer that drains the asset and then fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Every `(target, content)` pair installed so far.
    pub fn installs(&self) -> Vec<(PathBuf, Vec<u8>)> {
        self.installs.lock().expect("installs lock").clone()
    }
}

impl BinaryReplacer for RecordingReplacer {
    fn replace(&self, target: &Path, asset: &mut dyn Read) -> Result<()> {
        let mut content = Vec::new();
        asset
            .read_to_end(&mut content)
            .map_err(|e| UpdateError::ReplacementFailure {
                path: target.to_path_buf(),
                reason: e.to_string(),
            })?;

        if self.fail {
            return Err(UpdateError::ReplacementFailure {
                path: target.to_path_buf(),
                reason: "simulated failure".to_string(),
            });
        }

        self.installs.lock().expect("installs lock").push((target.to_path_buf(), content));
        Ok(())
    }
}
