//! Error types for the measurement pipeline.

use roofdsm_analysis::FootprintError;
use roofdsm_raster::RasterError;
use thiserror::Error;

/// Pipeline stage, used to label failures and fallbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Geocode,
    Layers,
    Footprint,
    Elevation,
    Mask,
    TrueColor,
    Analysis,
}

impl Stage {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Stage::Geocode => "geocode",
            Stage::Layers => "layers",
            Stage::Footprint => "footprint",
            Stage::Elevation => "elevation",
            Stage::Mask => "mask",
            Stage::TrueColor => "true_color",
            Stage::Analysis => "analysis",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of an external data provider (geocoding, building insights,
/// data layers).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Request to {service} failed: {reason}")]
    Request {
        service: &'static str,
        status: Option<u16>,
        reason: String,
    },

    #[error("{service} returned HTTP {status}")]
    Status { service: &'static str, status: u16 },

    #[error("{service} returned a malformed response: {reason}")]
    Malformed {
        service: &'static str,
        reason: String,
    },

    #[error("Invalid footprint: {0}")]
    Footprint(#[from] FootprintError),

    #[error("Credentials unavailable: {0}")]
    Credentials(#[from] RasterError),
}

impl ProviderError {
    /// Build a [`ProviderError::Request`] without leaking the request URL.
    pub fn request(service: &'static str, err: reqwest::Error) -> Self {
        ProviderError::Request {
            service,
            status: err.status().map(|s| s.as_u16()),
            reason: err.without_url().to_string(),
        }
    }

    pub fn malformed(service: &'static str, reason: impl std::fmt::Display) -> Self {
        ProviderError::Malformed {
            service,
            reason: reason.to_string(),
        }
    }

    /// Upstream HTTP status, if the provider answered with one.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ProviderError::Request { status, .. } => *status,
            ProviderError::Status { status, .. } => Some(*status),
            ProviderError::Credentials(e) => e.http_status(),
            _ => None,
        }
    }
}

/// Geocoding failure.
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("No geocoding result for {address:?} (status {status})")]
    NotFound { address: String, status: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Fatal pipeline errors. Non-fatal failures are absorbed as fallbacks and
/// never surface here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Address not found: {address}")]
    AddressNotFound { address: String },

    #[error("{stage} stage failed: {source}")]
    Provider {
        stage: Stage,
        #[source]
        source: ProviderError,
    },

    #[error("{stage} raster fetch failed: {source}")]
    RasterFetch {
        stage: Stage,
        #[source]
        source: RasterError,
    },

    #[error("{stage} raster decode failed: {source}")]
    RasterDecode {
        stage: Stage,
        #[source]
        source: RasterError,
    },

    #[error("{stage} worker panicked")]
    WorkerPanicked { stage: Stage },
}

impl PipelineError {
    /// Classify a raster error into fetch or decode for `stage`.
    pub fn raster(stage: Stage, source: RasterError) -> Self {
        if source.is_fetch() {
            PipelineError::RasterFetch { stage, source }
        } else {
            PipelineError::RasterDecode { stage, source }
        }
    }

    /// Stage that failed.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::AddressNotFound { .. } => Stage::Geocode,
            PipelineError::Provider { stage, .. }
            | PipelineError::RasterFetch { stage, .. }
            | PipelineError::RasterDecode { stage, .. }
            | PipelineError::WorkerPanicked { stage } => *stage,
        }
    }

    /// Upstream HTTP status, if the failure came from an HTTP response.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            PipelineError::Provider { source, .. } => source.http_status(),
            PipelineError::RasterFetch { source, .. } => source.http_status(),
            _ => None,
        }
    }
}

impl From<GeocodeError> for PipelineError {
    fn from(err: GeocodeError) -> Self {
        match err {
            GeocodeError::NotFound { address, .. } => PipelineError::AddressNotFound { address },
            GeocodeError::Provider(source) => PipelineError::Provider {
                stage: Stage::Geocode,
                source,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_errors_are_classified() {
        let fetch = PipelineError::raster(
            Stage::Elevation,
            RasterError::Fetch {
                url: "https://example.com/dsm.tif".to_string(),
                status: Some(403),
                reason: "HTTP 403 Forbidden".to_string(),
            },
        );
        assert!(matches!(fetch, PipelineError::RasterFetch { .. }));
        assert_eq!(fetch.stage(), Stage::Elevation);
        assert_eq!(fetch.http_status(), Some(403));

        let decode = PipelineError::raster(
            Stage::Elevation,
            RasterError::InvalidGeoTiff("missing tiepoint".to_string()),
        );
        assert!(matches!(decode, PipelineError::RasterDecode { .. }));
        assert_eq!(decode.http_status(), None);
    }

    #[test]
    fn test_geocode_not_found_maps_to_address_not_found() {
        let err: PipelineError = GeocodeError::NotFound {
            address: "nowhere".to_string(),
            status: "ZERO_RESULTS".to_string(),
        }
        .into();

        assert!(matches!(
            err,
            PipelineError::AddressNotFound { ref address } if address == "nowhere"
        ));
        assert_eq!(err.stage(), Stage::Geocode);
    }

    #[test]
    fn test_provider_status_is_exposed() {
        let err: PipelineError = GeocodeError::Provider(ProviderError::Status {
            service: "geocoding",
            status: 503,
        })
        .into();
        assert_eq!(err.http_status(), Some(503));
        assert_eq!(err.to_string(), "geocode stage failed: geocoding returned HTTP 503");
    }
}
