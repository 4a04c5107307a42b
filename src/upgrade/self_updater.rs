use std::fmt;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::{Result, UpdateError};
use crate::upgrade::{
    ArchiveExtractor, AssetStream, AtomicReplacer, BinaryReplacer, ChecksumVerifier, HttpSource,
    Logger, NoopLogger, Platform, UpdateCheck, UpdateInfo, UpdateSource, UpgradeConfig,
    VersionChecker, VersionDescriptor,
};

/// Where an update attempt currently is.
///
/// ```text
/// Idle -> Checking -> UpToDate
///                  -> UpdateAvailable -> Downloading -> [Validating] -> Extracting -> Replacing -> Done
/// any stage -> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateStage {
    /// Nothing started yet.
    Idle,
    /// Fetching the manifest and comparing versions.
    Checking,
    /// The running build is current. Terminal.
    UpToDate,
    /// A newer release exists.
    UpdateAvailable,
    /// Fetching the asset.
    Downloading,
    /// Checking the asset digest. Skipped when verification is off.
    Validating,
    /// Locating the executable in the asset.
    Extracting,
    /// Handing the executable to the swap primitive.
    Replacing,
    /// The new binary is in place. Terminal.
    Done,
    /// The attempt failed. Terminal.
    Failed,
}

impl fmt::Display for UpdateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::UpToDate => "up to date",
            Self::UpdateAvailable => "update available",
            Self::Downloading => "downloading",
            Self::Validating => "validating",
            Self::Extracting => "extracting",
            Self::Replacing => "replacing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How a successful update attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Nothing to do.
    UpToDate {
        /// Running version
        current: String,
        /// Version advertised by the manifest
        latest: String,
    },
    /// The executable at `path` now holds version `to`.
    Updated {
        /// Version that was replaced
        from: String,
        /// Version that was installed
        to: String,
        /// Path that was written, after symlink resolution
        path: PathBuf,
    },
}

impl UpdateOutcome {
    /// Whether a new binary was installed.
    #[must_use]
    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated { .. })
    }
}

type StageCallback = Arc<dyn Fn(UpdateStage) + Send + Sync>;

/// Forwards stage transitions to the optional observer. Cheap to clone into
/// blocking tasks.
#[derive(Clone, Default)]
struct StageReporter {
    callback: Option<StageCallback>,
}

impl StageReporter {
    fn report(&self, stage: UpdateStage) {
        debug!("Update stage: {stage}");
        if let Some(callback) = &self.callback {
            callback(stage);
        }
    }
}

/// Sequences check, download, verification, extraction and replacement.
///
/// `SelfUpdater` never retries and never runs stages concurrently. Validation
/// and extraction both finish before the swap primitive is called, so a bad
/// download never touches the executable.
///
/// # Examples
///
/// ```rust,no_run
/// use selfup::upgrade::{SelfUpdater, TracingLogger, UpgradeConfig};
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = UpgradeConfig::new("https://updates.example.com/app");
/// let updater = SelfUpdater::from_config(config, env!("CARGO_PKG_VERSION"))?
///     .with_logger(Arc::new(TracingLogger));
///
/// let outcome = updater.update_self(&CancellationToken::new()).await?;
/// if outcome.is_updated() {
///     println!("Restart to use the new version");
/// }
/// # Ok(())
/// # }
/// ```
pub struct SelfUpdater {
    config: UpgradeConfig,
    platform: Platform,
    checker: VersionChecker,
    source: Arc<dyn UpdateSource>,
    extractor: ArchiveExtractor,
    replacer: Arc<dyn BinaryReplacer>,
    logger: Arc<dyn Logger>,
    stages: StageReporter,
}

impl SelfUpdater {
    /// Create an updater for `current_version` reading releases from `source`.
    ///
    /// The platform is taken from the config overrides or detected once here.
    pub fn new(
        config: UpgradeConfig,
        current_version: impl Into<String>,
        source: impl UpdateSource + 'static,
    ) -> Result<Self> {
        let current_version = current_version.into();
        if current_version.trim().is_empty() {
            return Err(UpdateError::Config {
                message: "current version must not be empty".to_string(),
            });
        }

        let platform = config.platform();
        let extractor = ArchiveExtractor::new(platform.clone())
            .passthrough_unknown(config.passthrough_unknown_formats);
        debug!("Self-updater for {current_version} on {platform}");

        Ok(Self {
            config,
            platform,
            checker: VersionChecker::new(current_version),
            source: Arc::new(source),
            extractor,
            replacer: Arc::new(AtomicReplacer),
            logger: Arc::new(NoopLogger),
            stages: StageReporter::default(),
        })
    }

    /// Create an updater backed by an [`HttpSource`] built from `config`.
    pub fn from_config(config: UpgradeConfig, current_version: impl Into<String>) -> Result<Self> {
        config.validate()?;

        let mut builder = HttpSource::builder(config.base_url.clone());
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let source = builder.build()?;

        Self::new(config, current_version, source)
    }

    /// Send user-facing progress messages to `logger`.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Install through `replacer` instead of [`AtomicReplacer`].
    #[must_use]
    pub fn with_replacer(mut self, replacer: Arc<dyn BinaryReplacer>) -> Self {
        self.replacer = replacer;
        self
    }

    /// Observe every stage transition, including [`UpdateStage::Failed`].
    ///
    /// Called from whichever thread runs the stage.
    #[must_use]
    pub fn on_stage(mut self, callback: impl Fn(UpdateStage) + Send + Sync + 'static) -> Self {
        self.stages = StageReporter {
            callback: Some(Arc::new(callback)),
        };
        self
    }

    /// Version of the running build.
    #[must_use]
    pub fn current_version(&self) -> &str {
        self.checker.current_version()
    }

    /// Platform downloads are resolved for.
    #[must_use]
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &UpgradeConfig {
        &self.config
    }

    /// Compare the running version with the published release.
    pub async fn check_for_updates(&self, token: &CancellationToken) -> Result<UpdateCheck> {
        self.logger.info(format_args!("Checking for updates"));
        let check = self.checker.check(self.source.as_ref(), token).await.inspect_err(|e| {
            self.logger.error(format_args!("Failed to check for updates: {e}"));
        })?;

        self.logger.info(format_args!(
            "Current version: {}, latest version: {}",
            check.current_version,
            check.latest_version()
        ));
        if check.has_update {
            self.logger.info(format_args!("New version available"));
        } else {
            self.logger.info(format_args!("Already up to date"));
        }
        Ok(check)
    }

    /// The manifest describing the latest release.
    pub async fn latest_release(&self, token: &CancellationToken) -> Result<VersionDescriptor> {
        self.checker.resolve_latest(self.source.as_ref(), token).await
    }

    /// Release notes for `version`, if the source can provide them.
    pub async fn changelog(&self, token: &CancellationToken, version: &str) -> Result<String> {
        let provider =
            self.source.changelog_provider().ok_or_else(|| UpdateError::CapabilityUnsupported {
                capability: "changelog".to_string(),
            })?;
        provider.fetch_changelog(token, version).await
    }

    /// Update the running executable.
    pub async fn update_self(&self, token: &CancellationToken) -> Result<UpdateOutcome> {
        let exe = std::env::current_exe()
            .map_err(|e| UpdateError::io("locating current executable", PathBuf::new(), e))?;
        self.update_to(token, &exe).await
    }

    /// Update the executable at `path` to the latest release.
    ///
    /// On Windows `.exe` is appended when missing. A symlink is followed so the
    /// link keeps pointing at the refreshed binary.
    pub async fn update_to(&self, token: &CancellationToken, path: &Path) -> Result<UpdateOutcome> {
        self.stages.report(UpdateStage::Idle);
        match self.run_update(token, path).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.stages.report(UpdateStage::Failed);
                self.logger.error(format_args!("Update failed: {e}"));
                Err(e)
            }
        }
    }

    async fn run_update(&self, token: &CancellationToken, path: &Path) -> Result<UpdateOutcome> {
        let target = resolve_target_path(path, &self.platform)?;
        let command = command_name(&target, &self.platform)?;
        debug!("Updating {} (command '{command}')", target.display());

        self.stages.report(UpdateStage::Checking);
        let check = self.check_for_updates(token).await?;
        let current = check.current_version.clone();
        let latest = check.latest.version.clone();
        if !check.has_update {
            self.stages.report(UpdateStage::UpToDate);
            return Ok(UpdateOutcome::UpToDate { current, latest });
        }
        self.stages.report(UpdateStage::UpdateAvailable);

        self.logger.info(format_args!("Preparing to download version {latest}"));
        let update = self.source.resolve_for_platform(token, &latest, &self.platform).await?;

        self.stages.report(UpdateStage::Downloading);
        self.logger.info(format_args!("Downloading {}", update.download_url));
        let stream = self.source.download(token, &update).await?;
        let spooled = spool(token, stream, &update.download_url).await?;

        if !self.config.verify_checksum {
            warn!("Checksum verification disabled; installing {} unverified", update.download_url);
        }

        let job = InstallJob {
            token: token.clone(),
            spooled,
            update,
            command,
            target: target.clone(),
            verify_checksum: self.config.verify_checksum,
            extractor: self.extractor.clone(),
            replacer: Arc::clone(&self.replacer),
            logger: Arc::clone(&self.logger),
            stages: self.stages.clone(),
        };
        tokio::task::spawn_blocking(move || job.run())
            .await
            .map_err(|e| UpdateError::io("installing update", &target, io::Error::other(e)))??;

        self.stages.report(UpdateStage::Done);
        self.logger.info(format_args!("Updated {current} -> {latest}"));
        info!("Updated {} from {current} to {latest}", target.display());
        Ok(UpdateOutcome::Updated {
            from: current,
            to: latest,
            path: target,
        })
    }
}

/// Apply the platform suffix and follow a symlink to the file it points at.
///
/// The `.exe` suffix is added on Windows before the filesystem is consulted.
/// The path must exist.
pub fn resolve_target_path(path: &Path, platform: &Platform) -> Result<PathBuf> {
    let mut path = path.to_path_buf();
    let has_exe = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("exe"));
    if platform.is_windows() && !has_exe {
        let mut with_suffix = path.into_os_string();
        with_suffix.push(".exe");
        path = PathBuf::from(with_suffix);
    }

    let metadata = fs::symlink_metadata(&path)
        .map_err(|e| UpdateError::io("inspecting executable", &path, e))?;
    if !metadata.file_type().is_symlink() {
        return Ok(path);
    }

    let resolved = fs::canonicalize(&path)
        .map_err(|e| UpdateError::io("resolving executable symlink", &path, e))?;
    debug!("{} resolves to {}", path.display(), resolved.display());
    Ok(resolved)
}

/// Command name matched against archive entries: the file name without `.exe`
/// on Windows.
fn command_name(target: &Path, platform: &Platform) -> Result<String> {
    let name = target
        .file_name()
        .ok_or_else(|| UpdateError::Config {
            message: format!("executable path {} has no file name", target.display()),
        })?
        .to_string_lossy()
        .into_owned();

    if platform.is_windows() && name.len() > 4 && name.to_ascii_lowercase().ends_with(".exe") {
        return Ok(name[..name.len() - 4].to_string());
    }
    Ok(name)
}

/// Write the download to a temp file, racing the cancellation token.
async fn spool(token: &CancellationToken, mut stream: AssetStream, url: &str) -> Result<NamedTempFile> {
    let spooled = NamedTempFile::new()
        .map_err(|e| UpdateError::io("creating download file", std::env::temp_dir(), e))?;
    let handle = spooled
        .as_file()
        .try_clone()
        .map_err(|e| UpdateError::io("opening download file", spooled.path(), e))?;
    let mut file = tokio::fs::File::from_std(handle);

    let copy = async {
        let bytes = tokio::io::copy(&mut stream, &mut file).await?;
        file.flush().await?;
        Ok::<_, io::Error>(bytes)
    };

    let bytes = tokio::select! {
        biased;
        () = token.cancelled() => return Err(UpdateError::Cancelled { stage: UpdateStage::Downloading }),
        result = copy => result.map_err(|e| UpdateError::NetworkFailure {
            operation: "downloading update".to_string(),
            url: url.to_string(),
            reason: e.to_string(),
        })?,
    };
    debug!("Downloaded {bytes} bytes to {}", spooled.path().display());
    Ok(spooled)
}

/// Everything the blocking half of an update needs, owned.
struct InstallJob {
    token: CancellationToken,
    spooled: NamedTempFile,
    update: UpdateInfo,
    command: String,
    target: PathBuf,
    verify_checksum: bool,
    extractor: ArchiveExtractor,
    replacer: Arc<dyn BinaryReplacer>,
    logger: Arc<dyn Logger>,
    stages: StageReporter,
}

impl InstallJob {
    fn run(self) -> Result<()> {
        let token = self.token;
        let in_stage = |stage: UpdateStage| {
            let token = token.clone();
            move |e: UpdateError| {
                if token.is_cancelled() {
                    UpdateError::Cancelled { stage }
                } else {
                    e
                }
            }
        };

        let mut payload = self
            .spooled
            .reopen()
            .map_err(|e| UpdateError::io("opening download file", self.spooled.path(), e))?;

        if self.verify_checksum {
            self.stages.report(UpdateStage::Validating);
            self.logger.info(format_args!("Verifying checksum"));
            let mut reader = CancellableReader::new(&mut payload, token.clone());
            ChecksumVerifier::validate(&mut reader, &self.update.checksum)
                .map_err(in_stage(UpdateStage::Validating))?;
            payload
                .seek(SeekFrom::Start(0))
                .map_err(|e| UpdateError::io("rewinding download file", self.spooled.path(), e))?;
        }

        self.stages.report(UpdateStage::Extracting);
        let reader = Box::new(CancellableReader::new(payload, token.clone()));
        let mut asset = self
            .extractor
            .extract(reader, &self.update.download_url, &self.command)
            .map_err(in_stage(UpdateStage::Extracting))?;

        if token.is_cancelled() {
            return Err(UpdateError::Cancelled {
                stage: UpdateStage::Extracting,
            });
        }

        self.stages.report(UpdateStage::Replacing);
        self.logger.info(format_args!("Replacing executable {}", self.target.display()));
        self.replacer
            .replace(&self.target, &mut asset)
            .map_err(in_stage(UpdateStage::Replacing))
    }
}

/// Fails reads once the token is cancelled.
struct CancellableReader<R> {
    inner: R,
    token: CancellationToken,
}

impl<R> CancellableReader<R> {
    fn new(inner: R, token: CancellationToken) -> Self {
        Self { inner, token }
    }
}

impl<R: Read> Read for CancellableReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.token.is_cancelled() {
            // Not `Interrupted`: std read loops retry that kind.
            return Err(io::Error::other("update cancelled"));
        }
        self.inner.read(buf)
    }
}
