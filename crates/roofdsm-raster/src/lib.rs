//! # roofdsm-raster
//!
//! Retrieval and decoding of the geospatial rasters behind a roof
//! measurement: the digital surface model (elevation), the building mask,
//! and optional true-color imagery.
//!
//! ## Overview
//!
//! Rasters arrive as GeoTIFF bytes from a credentialed HTTP endpoint. They
//! are decoded into an immutable [`RasterGrid`] carrying one vector per band,
//! the bounds in the raster's native coordinate reference, and the ground
//! size of a pixel in meters. The pixel size is always derived from the
//! bounding box divided by the pixel dimensions, because the CRS units vary
//! between projected (meters) and geographic (degrees) rasters.
//!
//! True-color rasters larger than a configurable pixel limit (500 x 500 by
//! default) are not materialised; see [`RasterDecoder::decode_preview`].
//!
//! ## Examples
//!
//! ```no_run
//! use roofdsm_raster::{
//!     HttpRasterFetcher, RasterDecoder, RasterKind, RasterSource, StaticApiKey,
//! };
//! use std::sync::Arc;
//!
//! let fetcher = HttpRasterFetcher::new()?
//!     .with_credentials(Arc::new(StaticApiKey::new("AIza...")));
//! let bytes = fetcher.fetch_raster("https://solar.googleapis.com/v1/geoTiff:get?id=...")?;
//!
//! let grid = RasterDecoder::new().decode_grid(&bytes, RasterKind::Elevation)?;
//! println!(
//!     "{}x{} pixels at {:.2} m/pixel",
//!     grid.width(),
//!     grid.height(),
//!     grid.pixel_size_meters()
//! );
//! # Ok::<(), roofdsm_raster::RasterError>(())
//! ```

mod credentials;
mod decode;
mod encode;
mod error;
mod fetch;
mod grid;

pub use credentials::{
    redact_url, Credential, CredentialProvider, IssuedToken, StaticApiKey, TokenCache,
    TokenSource, DEFAULT_REFRESH_MARGIN,
};
pub use decode::{RasterDecoder, DEFAULT_MAX_TRUE_COLOR_PIXELS};
pub use encode::{encode_geotiff, NODATA_VALUE};
pub use error::RasterError;
pub use fetch::{DownloadStats, HttpRasterFetcher, RasterSource, DEFAULT_TIMEOUT};
pub use grid::{CrsKind, RasterBounds, RasterGrid, RasterKind, METERS_PER_DEGREE};

/// Result type for raster operations.
pub type Result<T> = std::result::Result<T, RasterError>;
