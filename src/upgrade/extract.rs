//! Locating the executable inside a downloaded asset.
//!
//! The archive format is inferred from the asset URL suffix, checked in order
//! and case-sensitively:
//!
//! | Suffix              | Handling                                              |
//! |---------------------|-------------------------------------------------------|
//! | `.zip`              | buffered fully, first matching non-directory entry    |
//! | `.tar.gz`, `.tgz`   | streamed, first matching regular file, read lazily    |
//! | `.gz`, `.gzip`      | the single file's header name must match              |
//! | anything else       | the payload is the executable (pass-through)          |
//!
//! Entry names are compared by base name using [`match_executable_name`], so an
//! archive may ship `bin/app`, `app_linux_amd64` or `app-windows-amd64.exe` for a
//! command called `app`.

use flate2::read::MultiGzDecoder;
use std::io::{Cursor, Read};
use tracing::{debug, info};

use crate::core::{Result, UpdateError};
use crate::upgrade::Platform;

/// Smallest possible zip file: a bare end-of-central-directory record.
const MIN_ZIP_SIZE: usize = 22;

/// Reader over the extracted executable.
pub type ExecutableAsset = Box<dyn Read + Send>;

/// Container formats recognized from an asset URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// `.zip`
    Zip,
    /// `.tar.gz` or `.tgz`
    TarGz,
    /// `.gz` or `.gzip` holding a single file
    Gzip,
}

impl ArchiveFormat {
    /// Detect the format from a URL or file name.
    ///
    /// Query strings and fragments are ignored. Returns `None` for anything
    /// that is not a recognized archive suffix.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use selfup::upgrade::ArchiveFormat;
    ///
    /// assert_eq!(ArchiveFormat::detect("https://x/app.tar.gz"), Some(ArchiveFormat::TarGz));
    /// assert_eq!(ArchiveFormat::detect("https://x/app.zip?sig=1"), Some(ArchiveFormat::Zip));
    /// assert_eq!(ArchiveFormat::detect("https://x/app.ZIP"), None);
    /// assert_eq!(ArchiveFormat::detect("https://x/app"), None);
    /// ```
    #[must_use]
    pub fn detect(url: &str) -> Option<Self> {
        let path = strip_query(url);
        if path.ends_with(".zip") {
            Some(Self::Zip)
        } else if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if path.ends_with(".gzip") || path.ends_with(".gz") {
            Some(Self::Gzip)
        } else {
            None
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarGz => "tar.gz",
            Self::Gzip => "gzip",
        }
    }
}

fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// Final path component of an archive entry name, for either separator.
fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Whether an archive entry named `target` is the executable for `cmd`.
///
/// Matches when:
/// - `target == cmd`
/// - on Windows, `target == "{cmd}.exe"`
/// - `target == "{cmd}{sep}{os}{sep}{arch}"` for `sep` in `_` and `-`, with
///   `.exe` appended on Windows
///
/// # Examples
///
/// ```rust
/// use selfup::upgrade::{Platform, match_executable_name};
///
/// let linux = Platform::new("linux", "amd64");
/// assert!(match_executable_name("app", "app_linux_amd64", &linux));
/// assert!(!match_executable_name("app", "app_windows_amd64.exe", &linux));
///
/// let windows = Platform::new("windows", "amd64");
/// assert!(match_executable_name("app", "app_windows_amd64.exe", &windows));
/// ```
#[must_use]
pub fn match_executable_name(cmd: &str, target: &str, platform: &Platform) -> bool {
    if cmd == target {
        return true;
    }

    let exe = if platform.is_windows() { ".exe" } else { "" };
    if !exe.is_empty() && target == format!("{cmd}{exe}") {
        return true;
    }

    ['_', '-'].iter().any(|sep| {
        let candidate = format!("{cmd}{sep}{os}{sep}{arch}{exe}", os = platform.os, arch = platform.arch);
        candidate == target
    })
}

/// Pulls the executable out of a downloaded asset.
///
/// # Examples
///
/// ```rust
/// use selfup::upgrade::{ArchiveExtractor, Platform};
/// use std::io::{Cursor, Read};
///
/// let extractor = ArchiveExtractor::new(Platform::new("linux", "amd64"));
/// let payload = Cursor::new(b"#!/bin/sh\necho hi\n".to_vec());
/// let mut asset = extractor
///     .extract(Box::new(payload), "https://x/app", "app")
///     .unwrap();
/// let mut contents = String::new();
/// asset.read_to_string(&mut contents).unwrap();
/// assert!(contents.starts_with("#!/bin/sh"));
/// ```
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    platform: Platform,
    passthrough_unknown: bool,
}

impl ArchiveExtractor {
    /// Create an extractor matching names for `platform`.
    ///
    /// Unknown suffixes pass the payload through unchanged by default.
    #[must_use]
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            passthrough_unknown: true,
        }
    }

    /// Whether assets with an unrecognized suffix are treated as the bare
    /// executable (`true`) or rejected with [`UpdateError::FormatUnsupported`].
    #[must_use]
    pub fn passthrough_unknown(mut self, enabled: bool) -> Self {
        self.passthrough_unknown = enabled;
        self
    }

    /// The platform used for name matching.
    #[must_use]
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Extract the executable for `cmd` from `src`, downloaded from `url`.
    pub fn extract(&self, src: ExecutableAsset, url: &str, cmd: &str) -> Result<ExecutableAsset> {
        match ArchiveFormat::detect(url) {
            Some(ArchiveFormat::Zip) => self.extract_zip(src, url, cmd),
            Some(ArchiveFormat::TarGz) => self.extract_tar_gz(src, url, cmd),
            Some(ArchiveFormat::Gzip) => self.extract_gzip(src, url, cmd),
            None if self.passthrough_unknown => {
                debug!("No extraction needed for {url}");
                Ok(src)
            }
            None => Err(UpdateError::FormatUnsupported {
                url: url.to_string(),
            }),
        }
    }

    fn extract_zip(&self, mut src: ExecutableAsset, url: &str, cmd: &str) -> Result<ExecutableAsset> {
        info!("Extracting zip archive {url}");
        let corrupt = |reason: String| corrupt(ArchiveFormat::Zip, url, reason);

        // The central directory sits at the end, so the whole payload is needed.
        let mut buf = Vec::new();
        src.read_to_end(&mut buf)
            .map_err(|e| corrupt(format!("failed to read payload: {e}")))?;
        if buf.len() < MIN_ZIP_SIZE {
            return Err(corrupt(format!(
                "payload is {} bytes, smaller than any valid zip file",
                buf.len()
            )));
        }

        let payload_len = buf.len();
        let mut archive =
            zip::ZipArchive::new(Cursor::new(buf)).map_err(|e| corrupt(e.to_string()))?;
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index).map_err(|e| corrupt(e.to_string()))?;
            if entry.is_dir() || !match_executable_name(cmd, base_name(entry.name()), &self.platform)
            {
                continue;
            }

            info!("Found executable {} in zip archive", entry.name());
            // The declared size comes from the download; only use it as a hint
            // bounded by the payload.
            let hint = usize::try_from(entry.size()).unwrap_or(usize::MAX).min(payload_len);
            let mut contents = Vec::with_capacity(hint);
            entry
                .read_to_end(&mut contents)
                .map_err(|e| corrupt(format!("failed to read {}: {e}", entry.name())))?;
            return Ok(Box::new(Cursor::new(contents)));
        }

        Err(not_found(url, cmd, None))
    }

    fn extract_tar_gz(&self, src: ExecutableAsset, url: &str, cmd: &str) -> Result<ExecutableAsset> {
        info!("Extracting tar.gz archive {url}");
        let corrupt = |reason: String| corrupt(ArchiveFormat::TarGz, url, reason);

        let mut archive = tar::Archive::new(MultiGzDecoder::new(src));
        let mut found = None;
        for entry in archive.entries().map_err(|e| corrupt(e.to_string()))? {
            let entry = entry.map_err(|e| corrupt(e.to_string()))?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let path = entry.path().map_err(|e| corrupt(e.to_string()))?;
            let name = path.to_string_lossy().into_owned();
            if match_executable_name(cmd, base_name(&name), &self.platform) {
                found = Some((name, entry.size()));
                break;
            }
        }

        let Some((name, size)) = found else {
            return Err(not_found(url, cmd, None));
        };
        info!("Found executable {name} in tar archive");

        // The matched entry was not read, so the decompressor sits at the start
        // of its data. Hand the remaining `size` bytes to the caller unbuffered.
        Ok(Box::new(archive.into_inner().take(size)))
    }

    fn extract_gzip(&self, src: ExecutableAsset, url: &str, cmd: &str) -> Result<ExecutableAsset> {
        info!("Extracting gzip file {url}");

        let decoder = MultiGzDecoder::new(src);
        let header = decoder.header().ok_or_else(|| {
            corrupt(ArchiveFormat::Gzip, url, "missing or invalid gzip header".to_string())
        })?;
        let name = header.filename().map(|n| String::from_utf8_lossy(n).into_owned());

        match name {
            Some(name) if match_executable_name(cmd, base_name(&name), &self.platform) => {
                info!("Found executable {name} in gzip file");
                Ok(Box::new(decoder))
            }
            other => Err(not_found(url, cmd, other)),
        }
    }
}

fn corrupt(format: ArchiveFormat, url: &str, reason: String) -> UpdateError {
    UpdateError::CorruptArchive {
        format: format.label().to_string(),
        url: url.to_string(),
        reason,
    }
}

fn not_found(url: &str, cmd: &str, found: Option<String>) -> UpdateError {
    UpdateError::ExecutableNotFound {
        url: url.to_string(),
        command: cmd.to_string(),
        found,
    }
}
