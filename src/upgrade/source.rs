//! Where manifests and assets come from.
//!
//! [`UpdateSource`] is the minimal contract the updater needs: fetch the
//! manifest, resolve it for a platform, and open the asset. Sources that can
//! also serve release notes expose [`ChangelogProvider`] through
//! [`UpdateSource::changelog_provider`]; callers probe for it instead of
//! checking the concrete source type.
//!
//! [`HttpSource`] is the HTTP implementation: the manifest lives at
//! `{base_url}/latest.json` and assets are fetched from the URLs it lists.

use futures::TryStreamExt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::{Result, UpdateError};
use crate::upgrade::{Platform, UpdateInfo, UpdateStage, VersionDescriptor};

/// Boxed future returned by source operations.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Byte stream of a downloaded asset. Dropping it releases the connection.
pub type AssetStream = Pin<Box<dyn AsyncRead + Send>>;

/// File name of the manifest relative to the base URL.
pub const MANIFEST_FILE: &str = "latest.json";

/// Provider of release manifests and assets.
pub trait UpdateSource: Send + Sync {
    /// Fetch the manifest describing the latest release.
    fn fetch_descriptor<'a>(
        &'a self,
        token: &'a CancellationToken,
    ) -> SourceFuture<'a, VersionDescriptor>;

    /// Fetch the manifest again and resolve the download for `platform`.
    ///
    /// Fails with [`UpdateError::VersionMismatch`] when the manifest no longer
    /// describes `version`, and with [`UpdateError::PlatformNotFound`] when it
    /// has no entry for the platform.
    fn resolve_for_platform<'a>(
        &'a self,
        token: &'a CancellationToken,
        version: &'a str,
        platform: &'a Platform,
    ) -> SourceFuture<'a, UpdateInfo> {
        Box::pin(async move { self.fetch_descriptor(token).await?.resolve(version, platform) })
    }

    /// Open the asset described by a resolved [`UpdateInfo`].
    ///
    /// Non-success responses fail with [`UpdateError::TransportFailure`].
    fn download<'a>(
        &'a self,
        token: &'a CancellationToken,
        info: &'a UpdateInfo,
    ) -> SourceFuture<'a, AssetStream>;

    /// Release-notes capability, if this source has one.
    fn changelog_provider(&self) -> Option<&dyn ChangelogProvider> {
        None
    }
}

impl<T: UpdateSource + ?Sized> UpdateSource for std::sync::Arc<T> {
    fn fetch_descriptor<'a>(
        &'a self,
        token: &'a CancellationToken,
    ) -> SourceFuture<'a, VersionDescriptor> {
        (**self).fetch_descriptor(token)
    }

    fn resolve_for_platform<'a>(
        &'a self,
        token: &'a CancellationToken,
        version: &'a str,
        platform: &'a Platform,
    ) -> SourceFuture<'a, UpdateInfo> {
        (**self).resolve_for_platform(token, version, platform)
    }

    fn download<'a>(
        &'a self,
        token: &'a CancellationToken,
        info: &'a UpdateInfo,
    ) -> SourceFuture<'a, AssetStream> {
        (**self).download(token, info)
    }

    fn changelog_provider(&self) -> Option<&dyn ChangelogProvider> {
        (**self).changelog_provider()
    }
}

/// Optional capability: fetch the changelog for a release.
pub trait ChangelogProvider: Send + Sync {
    /// Fetch the changelog text for `version`.
    fn fetch_changelog<'a>(
        &'a self,
        token: &'a CancellationToken,
        version: &'a str,
    ) -> SourceFuture<'a, String>;
}

/// Race a future against the cancellation token.
pub(crate) async fn cancellable<T>(
    token: &CancellationToken,
    stage: UpdateStage,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        () = token.cancelled() => Err(UpdateError::Cancelled { stage }),
        result = fut => result,
    }
}

/// HTTP(S) update source.
///
/// # Examples
///
/// ```rust,no_run
/// use selfup::upgrade::{HttpSource, UpdateSource};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> anyhow::Result<()> {
/// let source = HttpSource::new("https://updates.example.com/app")?;
/// let manifest = source.fetch_descriptor(&CancellationToken::new()).await?;
/// println!("latest: {}", manifest.version);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSource {
    /// Create a source with a default client.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::builder(base_url).build()
    }

    /// Start configuring a source.
    pub fn builder(base_url: impl Into<String>) -> HttpSourceBuilder {
        HttpSourceBuilder {
            base_url: base_url.into(),
            timeout: None,
            user_agent: None,
        }
    }

    /// Create a source around an existing client.
    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    /// The configured base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL of the manifest.
    #[must_use]
    pub fn manifest_url(&self) -> String {
        format!("{}/{MANIFEST_FILE}", self.base_url.trim_end_matches('/'))
    }

    /// GET `url` and return the response if its status is a success.
    async fn get(&self, operation: &str, url: &str) -> Result<reqwest::Response> {
        debug!("GET {url} ({operation})");
        let response =
            self.client.get(url).send().await.map_err(|e| UpdateError::NetworkFailure {
                operation: operation.to_string(),
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::TransportFailure {
                operation: operation.to_string(),
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn latest(&self) -> Result<VersionDescriptor> {
        let url = self.manifest_url();
        let operation = "fetching version manifest";
        let response = self.get(operation, &url).await?;
        let body = response.bytes().await.map_err(|e| UpdateError::NetworkFailure {
            operation: operation.to_string(),
            url: url.clone(),
            reason: e.to_string(),
        })?;
        VersionDescriptor::from_json(&body, &url)
    }

    async fn changelog(&self, version: &str) -> Result<String> {
        let descriptor = self.latest().await?;
        if descriptor.version != version {
            return Err(UpdateError::VersionMismatch {
                requested: version.to_string(),
                found: descriptor.version,
            });
        }

        let operation = "fetching changelog";
        let url = descriptor.changelog_url;
        let response = self.get(operation, &url).await?;
        response.text().await.map_err(|e| UpdateError::NetworkFailure {
            operation: operation.to_string(),
            url,
            reason: e.to_string(),
        })
    }
}

impl UpdateSource for HttpSource {
    fn fetch_descriptor<'a>(
        &'a self,
        token: &'a CancellationToken,
    ) -> SourceFuture<'a, VersionDescriptor> {
        Box::pin(cancellable(token, UpdateStage::Checking, self.latest()))
    }

    fn download<'a>(
        &'a self,
        token: &'a CancellationToken,
        info: &'a UpdateInfo,
    ) -> SourceFuture<'a, AssetStream> {
        Box::pin(cancellable(token, UpdateStage::Downloading, async move {
            let url = info.download_url.as_str();
            let response = self.get("downloading update", url).await?;
            let stream = response.bytes_stream().map_err(std::io::Error::other);
            let reader: AssetStream = Box::pin(StreamReader::new(stream));
            Ok(reader)
        }))
    }

    fn changelog_provider(&self) -> Option<&dyn ChangelogProvider> {
        Some(self)
    }
}

impl ChangelogProvider for HttpSource {
    fn fetch_changelog<'a>(
        &'a self,
        token: &'a CancellationToken,
        version: &'a str,
    ) -> SourceFuture<'a, String> {
        Box::pin(cancellable(token, UpdateStage::Checking, self.changelog(version)))
    }
}

/// Builder for [`HttpSource`].
#[derive(Debug)]
pub struct HttpSourceBuilder {
    base_url: String,
    timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl HttpSourceBuilder {
    /// Overall request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// User-Agent header sent with every request.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Build the source.
    pub fn build(self) -> Result<HttpSource> {
        if self.base_url.trim().is_empty() {
            return Err(UpdateError::Config {
                message: "update base URL must not be empty".to_string(),
            });
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("selfup/{}", env!("CARGO_PKG_VERSION")));
        builder = builder.user_agent(user_agent);

        let client = builder.build().map_err(|e| UpdateError::Config {
            message: format!("failed to build HTTP client: {e}"),
        })?;

        Ok(HttpSource::with_client(self.base_url, client))
    }
}
