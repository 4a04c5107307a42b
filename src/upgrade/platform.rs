//! Platform identification for manifest lookups and executable naming.
//!
//! Manifests key their downloads by `{os}-{arch}` using Go-style names
//! (`windows-amd64`, `darwin-arm64`, `linux-386`). [`Platform`] carries those two
//! strings explicitly so tests can pretend to be any machine; only
//! [`Platform::current`] looks at the build target.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating system and architecture of the build being updated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    /// Lowercase OS name, e.g. `linux`, `darwin`, `windows`.
    pub os: String,
    /// Lowercase architecture name, e.g. `amd64`, `arm64`, `386`.
    pub arch: String,
}

impl Platform {
    /// Create a platform from explicit OS and architecture names.
    ///
    /// Both values are lowercased; no other normalization is applied, so
    /// `Platform::new("linux", "amd64")` matches a `linux-amd64` manifest key.
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into().to_lowercase(),
            arch: arch.into().to_lowercase(),
        }
    }

    /// The platform this binary was compiled for, in manifest naming.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use selfup::upgrade::Platform;
    ///
    /// let platform = Platform::current();
    /// #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    /// assert_eq!(platform.key(), "linux-amd64");
    /// ```
    #[must_use]
    pub fn current() -> Self {
        Self::new(
            os_name(std::env::consts::OS),
            arch_name(std::env::consts::ARCH),
        )
    }

    /// Manifest key for this platform: `{os}-{arch}`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}-{}", self.os, self.arch)
    }

    /// Whether executables on this platform carry an `.exe` suffix.
    #[must_use]
    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// Map a Rust `target_os` value to the manifest naming.
fn os_name(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}

/// Map a Rust `target_arch` value to the manifest naming.
fn arch_name(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" => "ppc64",
        "loongarch64" => "loong64",
        other => other,
    }
}
