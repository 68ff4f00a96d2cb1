//! Error types for the raster crate.

use thiserror::Error;

/// Errors that can occur when fetching or decoding rasters.
#[derive(Debug, Error)]
pub enum RasterError {
    /// I/O error while reading raster bytes.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TIFF decoding error.
    #[error("TIFF decode error: {0}")]
    TiffDecode(#[from] tiff::TiffError),

    /// Invalid GeoTIFF - missing or malformed georeferencing tags.
    #[error("Invalid GeoTIFF: {0}")]
    InvalidGeoTiff(String),

    /// The raster has fewer bands than its kind requires, or an
    /// unsupported sample layout.
    #[error("Unsupported raster layout: {0}")]
    UnsupportedLayout(String),

    /// Band data does not match the declared dimensions.
    #[error("Band {band} has {actual} samples, expected {expected} ({width}x{height})")]
    DimensionMismatch {
        /// Index of the offending band.
        band: usize,
        /// Number of samples found.
        actual: usize,
        /// Number of samples expected (width x height).
        expected: usize,
        /// Raster width in pixels.
        width: u32,
        /// Raster height in pixels.
        height: u32,
    },

    /// HTTP transport error when fetching a raster.
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// The remote server answered, but not with raster bytes.
    #[error("Failed to fetch raster {url}: {reason}")]
    Fetch {
        /// Requested URL with credentials redacted.
        url: String,
        /// HTTP status code, when the server responded.
        status: Option<u16>,
        /// Reason for failure.
        reason: String,
    },

    /// Credentials could not be obtained.
    #[error("Credential error: {0}")]
    Credentials(String),

    /// Credential cache lock was poisoned (a thread panicked while holding the lock).
    #[error("Credential cache lock was poisoned")]
    CacheLockPoisoned,
}

impl RasterError {
    /// True for network, HTTP and credential failures.
    pub fn is_fetch(&self) -> bool {
        matches!(
            self,
            RasterError::HttpRequest(_)
                | RasterError::Fetch { .. }
                | RasterError::Credentials(_)
                | RasterError::CacheLockPoisoned
        )
    }

    /// True for malformed or unsupported raster content.
    pub fn is_decode(&self) -> bool {
        !self.is_fetch()
    }

    /// HTTP status code of the failed request, if the server responded.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            RasterError::Fetch { status, .. } => *status,
            RasterError::HttpRequest(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
