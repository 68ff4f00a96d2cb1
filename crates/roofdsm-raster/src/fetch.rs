//! Remote raster retrieval.
//!
//! [`RasterSource`] is the capability the pipeline depends on;
//! [`HttpRasterFetcher`] is the production implementation over a blocking
//! reqwest client. Fetchers are shared between the concurrent fetch workers
//! of one measurement, so implementations must be `Send + Sync`.

use crate::credentials::{redact_url, CredentialProvider};
use crate::{RasterError, Result};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for a single raster download.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Retrieves raster bytes by URL.
pub trait RasterSource: Send + Sync {
    /// Download the raster at `url`.
    fn fetch_raster(&self, url: &str) -> Result<Vec<u8>>;
}

/// Download statistics for a fetcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadStats {
    /// Number of rasters downloaded.
    pub rasters_downloaded: usize,
    /// Total bytes downloaded.
    pub bytes_downloaded: u64,
}

/// HTTP raster fetcher with an injected credential provider.
///
/// No retries are performed; a failed request surfaces as a
/// [`RasterError`] for which [`RasterError::is_fetch`] holds.
pub struct HttpRasterFetcher {
    client: reqwest::blocking::Client,
    credentials: Option<Arc<dyn CredentialProvider>>,
    rasters_downloaded: AtomicUsize,
    bytes_downloaded: AtomicU64,
}

impl std::fmt::Debug for HttpRasterFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRasterFetcher")
            .field("authenticated", &self.credentials.is_some())
            .field("stats", &self.download_stats())
            .finish()
    }
}

impl HttpRasterFetcher {
    /// Create an unauthenticated fetcher with the default timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create an unauthenticated fetcher with a specific timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self::with_client(client))
    }

    /// Wrap an existing client.
    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        Self {
            client,
            credentials: None,
            rasters_downloaded: AtomicUsize::new(0),
            bytes_downloaded: AtomicU64::new(0),
        }
    }

    /// Attach a credential provider consulted on every request.
    pub fn with_credentials(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    /// Download statistics for this fetcher.
    pub fn download_stats(&self) -> DownloadStats {
        DownloadStats {
            rasters_downloaded: self.rasters_downloaded.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
        }
    }

    fn authorize(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> Result<reqwest::blocking::RequestBuilder> {
        let Some(provider) = &self.credentials else {
            return Ok(request);
        };

        Ok(provider.credential()?.apply(request))
    }
}

impl RasterSource for HttpRasterFetcher {
    fn fetch_raster(&self, url: &str) -> Result<Vec<u8>> {
        let redacted = redact_url(url);
        debug!(url = %redacted, "Fetching raster");

        let request = self.authorize(self.client.get(url))?;
        let response = request.send().map_err(|e| RasterError::Fetch {
            url: redacted.clone(),
            status: e.status().map(|s| s.as_u16()),
            reason: e.without_url().to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %redacted, status = status.as_u16(), "Raster fetch rejected");
            return Err(RasterError::Fetch {
                url: redacted,
                status: Some(status.as_u16()),
                reason: format!("HTTP {}", status),
            });
        }

        let bytes = response.bytes().map_err(|e| RasterError::Fetch {
            url: redacted.clone(),
            status: Some(status.as_u16()),
            reason: e.without_url().to_string(),
        })?;

        self.rasters_downloaded.fetch_add(1, Ordering::Relaxed);
        self.bytes_downloaded
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        debug!(url = %redacted, bytes = bytes.len(), "Fetched raster");

        Ok(bytes.to_vec())
    }
}

impl<T: RasterSource + ?Sized> RasterSource for Arc<T> {
    fn fetch_raster(&self, url: &str) -> Result<Vec<u8>> {
        (**self).fetch_raster(url)
    }
}
