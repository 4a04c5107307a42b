use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::core::{Result, UpdateError};
use crate::upgrade::Platform;

/// Settings for the self-updater.
///
/// Loaded from TOML, either as a top-level document or under an `[upgrade]`
/// table so it can live inside an application's own config file.
///
/// # Examples
///
/// ```rust
/// use selfup::upgrade::UpgradeConfig;
///
/// let config = UpgradeConfig::from_toml_str(
///     r#"
///     [upgrade]
///     base_url = "https://updates.example.com/app"
///     timeout_secs = 30
///     "#,
/// )
/// .unwrap();
/// assert!(config.verify_checksum);
/// assert_eq!(config.base_url, "https://updates.example.com/app");
/// ```
///
/// ## TOML Example
/// ```toml
/// [upgrade]
/// base_url = "https://updates.example.com/app"
/// verify_checksum = true
/// passthrough_unknown_formats = true
/// timeout_secs = 60
/// user_agent = "app-updater/1.0"
/// os = "linux"
/// arch = "amd64"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeConfig {
    /// Location of `latest.json`, without the file name.
    #[serde(default)]
    pub base_url: String,

    /// Whether downloads are checked against the published digest.
    ///
    /// # Default: `true`
    ///
    /// With verification on, a release that publishes no digest cannot be
    /// installed.
    #[serde(default = "default_verify_checksum")]
    pub verify_checksum: bool,

    /// Whether assets with an unrecognized suffix are installed as-is.
    ///
    /// # Default: `true`
    ///
    /// When `false`, such assets fail with
    /// [`UpdateError::FormatUnsupported`].
    #[serde(default = "default_passthrough_unknown_formats")]
    pub passthrough_unknown_formats: bool,

    /// Overall HTTP request timeout in seconds. No timeout when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// User-Agent for HTTP requests. Defaults to `selfup/<version>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Operating system override in manifest naming (`linux`, `darwin`, `windows`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,

    /// Architecture override in manifest naming (`amd64`, `arm64`, `386`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            verify_checksum: default_verify_checksum(),
            passthrough_unknown_formats: default_passthrough_unknown_formats(),
            timeout_secs: None,
            user_agent: None,
            os: None,
            arch: None,
        }
    }
}

fn default_verify_checksum() -> bool {
    true
}

fn default_passthrough_unknown_formats() -> bool {
    true
}

/// Accepts both `[upgrade]`-wrapped and bare documents.
#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigDocument {
    Wrapped { upgrade: UpgradeConfig },
    Bare(UpgradeConfig),
}

impl UpgradeConfig {
    /// Configuration pointing at `base_url` with default settings.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let document: ConfigDocument = toml::from_str(content).map_err(|e| UpdateError::Config {
            message: format!("invalid configuration: {e}"),
        })?;
        Ok(match document {
            ConfigDocument::Wrapped { upgrade } => upgrade,
            ConfigDocument::Bare(config) => config,
        })
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| UpdateError::io("reading configuration", path, e))?;
        Self::from_toml_str(&content)
    }

    /// Check that the configuration can drive an update.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(UpdateError::Config {
                message: "base_url must be set".to_string(),
            });
        }
        if self.os.is_some() != self.arch.is_some() {
            return Err(UpdateError::Config {
                message: "os and arch must be overridden together".to_string(),
            });
        }
        if self.timeout_secs == Some(0) {
            return Err(UpdateError::Config {
                message: "timeout_secs must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Platform to resolve downloads for: the overrides if set, else the build target.
    #[must_use]
    pub fn platform(&self) -> Platform {
        match (&self.os, &self.arch) {
            (Some(os), Some(arch)) => Platform::new(os, arch),
            _ => Platform::current(),
        }
    }

    /// HTTP timeout, if configured.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
