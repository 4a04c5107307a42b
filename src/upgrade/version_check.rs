use std::cmp::Ordering;

use semver::Version;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::{Result, UpdateError, VersionRole};
use crate::upgrade::{UpdateSource, VersionDescriptor};

/// Result of comparing the running build against the published release.
#[derive(Debug, Clone)]
pub struct UpdateCheck {
    /// Whether the published release is strictly newer.
    pub has_update: bool,
    /// Version of the running build.
    pub current_version: String,
    /// The manifest that was compared against.
    pub latest: VersionDescriptor,
}

impl UpdateCheck {
    /// Version string advertised by the manifest.
    #[must_use]
    pub fn latest_version(&self) -> &str {
        &self.latest.version
    }
}

/// Decides whether the running build is behind the published release.
///
/// `VersionChecker` holds the current version and asks an [`UpdateSource`] for
/// the manifest. It never retries: a failed fetch is returned to the caller as is.
///
/// # Examples
///
/// ```rust,no_run
/// use selfup::upgrade::{HttpSource, VersionChecker};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> anyhow::Result<()> {
/// let source = HttpSource::new("https://updates.example.com/app")?;
/// let checker = VersionChecker::new("1.0.0");
/// let check = checker.check(&source, &CancellationToken::new()).await?;
/// if check.has_update {
///     println!("{} -> {}", check.current_version, check.latest_version());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct VersionChecker {
    current_version: String,
}

impl VersionChecker {
    /// Create a checker for the given running version.
    pub fn new(current_version: impl Into<String>) -> Self {
        Self {
            current_version: current_version.into(),
        }
    }

    /// Version of the running build.
    #[must_use]
    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    /// Fetch the manifest describing the latest release.
    pub async fn resolve_latest(
        &self,
        source: &dyn UpdateSource,
        token: &CancellationToken,
    ) -> Result<VersionDescriptor> {
        source.fetch_descriptor(token).await
    }

    /// Fetch the manifest and compare it against the running version.
    pub async fn check(
        &self,
        source: &dyn UpdateSource,
        token: &CancellationToken,
    ) -> Result<UpdateCheck> {
        let latest = self.resolve_latest(source, token).await?;
        debug!("Current version: {}, latest version: {}", self.current_version, latest.version);

        let has_update = is_newer(&self.current_version, &latest.version)?;
        if has_update {
            info!("Update available: {} -> {}", self.current_version, latest.version);
        } else {
            debug!("Already on latest version");
        }

        Ok(UpdateCheck {
            has_update,
            current_version: self.current_version.clone(),
            latest,
        })
    }

    /// One-line summary of the running and latest versions.
    #[must_use]
    pub fn format_version_info(current: &str, latest: Option<&str>) -> String {
        match latest {
            Some(latest) if is_newer(current, latest).unwrap_or(false) => {
                format!("Current version: {current}\nLatest version:  {latest} (update available)")
            }
            _ => format!("Current version: {current} (up to date)"),
        }
    }
}

/// Compare two semantic versions by precedence.
///
/// A leading `v` is accepted (`v1.2.0`). Build metadata is ignored, so
/// `1.0.0+a` and `1.0.0+b` compare equal. An unparseable input fails with
/// [`UpdateError::InvalidVersion`] naming the side that was invalid.
///
/// # Examples
///
/// ```rust
/// use selfup::upgrade::compare_versions;
/// use std::cmp::Ordering;
///
/// assert_eq!(compare_versions("1.0.0", "1.2.3").unwrap(), Ordering::Less);
/// assert_eq!(compare_versions("1.0.0-rc.1", "1.0.0").unwrap(), Ordering::Less);
/// assert!(compare_versions("1.0", "1.0.0").is_err());
/// ```
pub fn compare_versions(a: &str, b: &str) -> Result<Ordering> {
    let left = parse_version(a, VersionRole::Left)?;
    let right = parse_version(b, VersionRole::Right)?;
    Ok(precedence(&left, &right))
}

/// Whether `latest` is strictly newer than `current`.
///
/// Equal or older releases never count as updates; downgrades are not offered.
pub fn has_update(current: &str, latest: &str) -> Result<bool> {
    is_newer(current, latest)
}

fn is_newer(current: &str, latest: &str) -> Result<bool> {
    let current = parse_version(current, VersionRole::Current)?;
    let latest = parse_version(latest, VersionRole::Latest)?;
    Ok(precedence(&current, &latest) == Ordering::Less)
}

pub(crate) fn parse_version(raw: &str, role: VersionRole) -> Result<Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(trimmed).map_err(|e| UpdateError::InvalidVersion {
        role,
        version: raw.to_string(),
        reason: e.to_string(),
    })
}

fn precedence(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch, &a.pre).cmp(&(b.major, b.minor, b.patch, &b.pre))
}
