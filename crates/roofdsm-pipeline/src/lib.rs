//! # roofdsm-pipeline
//!
//! Turns a property address into a roof measurement: geocode, fetch the
//! building footprint and the elevation, mask and true-color rasters
//! concurrently, then run height extraction, slope estimation and area
//! reconciliation.
//!
//! ## Features
//!
//! - **Capabilities**: geocoding, footprint and layer lookup are traits, so
//!   the pipeline runs against in-memory fakes as easily as live services
//! - **Google clients**: Geocoding API and Solar API implementations
//! - **Fallbacks**: footprint and mask failures degrade the result instead of
//!   aborting it, and are recorded with their reason
//! - **Configuration**: YAML with defaults for every field
//!
//! See `examples/measure_address.rs` for a pipeline wired to the live
//! Google services.

mod capabilities;
mod config;
mod error;
mod google;
mod imagery;
mod orchestrator;
mod result;
pub mod telemetry;

pub use capabilities::{
    Coordinates, FootprintProvider, GeocodedAddress, Geocoder, ImageryQuality, LayerLocator,
    LayerUrls,
};
pub use config::{ConfigError, EndpointConfig, ImageryConfig, PipelineConfig, SolarConfig};
pub use error::{GeocodeError, PipelineError, ProviderError, Stage};
pub use google::{
    parse_building_insights, parse_data_layers, parse_geocode_response, GoogleGeocoder,
    SolarBuildingInsights, SolarDataLayers,
};
pub use imagery::{ImageryUrls, StreetViewUrl, STREET_VIEW_HEADINGS};
pub use orchestrator::{Capabilities, Pipeline};
pub use result::{
    confidence_score, Fallback, FallbackKind, MeasurementResult, Provider, RasterReference,
    SourceRasters, FALLBACK_CONFIDENCE_PENALTY,
};
