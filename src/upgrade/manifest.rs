//! Release manifest model.
//!
//! The update server publishes a single JSON document (`latest.json`) describing
//! the newest release:
//!
//! ```json
//! {
//!   "version": "1.2.3",
//!   "releaseDate": "2024-05-01",
//!   "description": "Bug fixes",
//!   "downloads": {
//!     "linux-amd64": { "url": "https://example.com/app_linux_amd64.tar.gz", "md5": "..." },
//!     "windows-amd64": { "url": "https://example.com/app.zip", "md5": "..." }
//!   },
//!   "changelogUrl": "https://example.com/CHANGELOG.md"
//! }
//! ```

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::core::{Result, UpdateError, VersionRole};
use crate::upgrade::Platform;
use crate::upgrade::version_check::parse_version;

/// A published release as described by the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct VersionDescriptor {
    /// Semantic version of the release.
    pub version: String,
    /// Release date as published (free-form).
    #[serde(default)]
    pub release_date: String,
    /// Human readable summary.
    #[serde(default)]
    pub description: String,
    /// Download entries keyed by platform (`{os}-{arch}`).
    #[serde(default, deserialize_with = "unique_platform_keys")]
    pub downloads: BTreeMap<String, DownloadEntry>,
    /// Where the full changelog can be fetched.
    #[serde(default)]
    pub changelog_url: String,
}

/// One platform's asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DownloadEntry {
    /// Asset URL; its suffix selects the archive format.
    pub url: String,
    /// Expected digest of the asset as downloaded.
    #[serde(default)]
    pub md5: String,
}

/// Platform-specific view of a release, produced per resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInfo {
    /// Release version.
    pub version: String,
    /// Release date as published.
    pub release_date: String,
    /// Asset URL for the requested platform.
    pub download_url: String,
    /// Expected digest of the asset.
    pub checksum: String,
    /// Release description.
    pub description: String,
    /// Changelog location.
    pub changelog_url: String,
}

impl VersionDescriptor {
    /// Decode a manifest body. `origin` is only used in the error message.
    ///
    /// The version must be a semantic version and each platform key may appear
    /// only once; anything else is a [`UpdateError::DecodeFailure`].
    pub fn from_json(body: &[u8], origin: &str) -> Result<Self> {
        let decode_failure = |reason: String| UpdateError::DecodeFailure {
            url: origin.to_string(),
            reason,
        };

        let descriptor: Self =
            serde_json::from_slice(body).map_err(|e| decode_failure(e.to_string()))?;
        parse_version(&descriptor.version, VersionRole::Latest)
            .map_err(|e| decode_failure(e.to_string()))?;
        Ok(descriptor)
    }

    /// Resolve the download for `platform`, requiring the manifest to still
    /// describe `requested_version`.
    ///
    /// The version check runs first: a manifest that moved on to another release
    /// is reported as [`UpdateError::VersionMismatch`] even if it also lacks the
    /// platform.
    pub fn resolve(&self, requested_version: &str, platform: &Platform) -> Result<UpdateInfo> {
        if self.version != requested_version {
            return Err(UpdateError::VersionMismatch {
                requested: requested_version.to_string(),
                found: self.version.clone(),
            });
        }

        let key = platform.key();
        let download = self.downloads.get(&key).ok_or_else(|| UpdateError::PlatformNotFound {
            platform: key.clone(),
            version: self.version.clone(),
        })?;

        Ok(UpdateInfo {
            version: self.version.clone(),
            release_date: self.release_date.clone(),
            download_url: download.url.clone(),
            checksum: download.md5.clone(),
            description: self.description.clone(),
            changelog_url: self.changelog_url.clone(),
        })
    }
}

/// Deserialize `downloads`, rejecting a platform key that appears twice.
fn unique_platform_keys<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, DownloadEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    struct DownloadsVisitor;

    impl<'de> Visitor<'de> for DownloadsVisitor {
        type Value = BTreeMap<String, DownloadEntry>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of platform keys to downloads")
        }

        fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut downloads = BTreeMap::new();
            while let Some((key, entry)) = map.next_entry::<String, DownloadEntry>()? {
                if downloads.contains_key(&key) {
                    return Err(serde::de::Error::custom(format!(
                        "duplicate platform key '{key}' in downloads"
                    )));
                }
                downloads.insert(key, entry);
            }
            Ok(downloads)
        }
    }

    deserializer.deserialize_map(DownloadsVisitor)
}
