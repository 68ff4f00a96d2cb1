//! External capabilities the pipeline depends on.
//!
//! Each capability is a `Send + Sync` trait so the orchestrator can call
//! them from concurrent fetch workers. Production implementations live in
//! [`crate::google`]; tests substitute in-memory fakes.

use crate::error::{GeocodeError, ProviderError};
use chrono::NaiveDate;
use roofdsm_analysis::FootprintSource;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// WGS84 latitude and longitude in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

/// A geocoded address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodedAddress {
    pub coordinates: Coordinates,
    pub formatted_address: String,
}

/// Imagery quality tier reported by the data provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageryQuality {
    /// About 0.1 m per pixel.
    High,
    Medium,
    Low,
    /// Unspecified or unrecognised quality.
    Base,
}

impl ImageryQuality {
    /// Parse the provider's label; unknown labels map to [`ImageryQuality::Base`].
    pub fn from_label(label: &str) -> Self {
        match label {
            "HIGH" => ImageryQuality::High,
            "MEDIUM" => ImageryQuality::Medium,
            "LOW" => ImageryQuality::Low,
            _ => ImageryQuality::Base,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            ImageryQuality::High => "HIGH",
            ImageryQuality::Medium => "MEDIUM",
            ImageryQuality::Low => "LOW",
            ImageryQuality::Base => "BASE",
        }
    }
}

impl std::fmt::Display for ImageryQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raster locations for one property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerUrls {
    pub elevation_url: String,
    pub mask_url: Option<String>,
    pub true_color_url: Option<String>,
    pub imagery_quality: ImageryQuality,
    pub imagery_date: Option<NaiveDate>,
}

/// Address to coordinates.
pub trait Geocoder: Send + Sync {
    fn geocode(&self, address: &str) -> Result<GeocodedAddress, GeocodeError>;
}

/// Authoritative building footprint near a coordinate.
pub trait FootprintProvider: Send + Sync {
    /// `Ok(None)` when the provider has no building at this location.
    fn fetch_footprint(&self, at: Coordinates) -> Result<Option<FootprintSource>, ProviderError>;
}

/// Resolves the elevation, mask and true-color raster URLs for a coordinate.
pub trait LayerLocator: Send + Sync {
    fn locate_layers(&self, at: Coordinates) -> Result<LayerUrls, ProviderError>;
}

impl<T: Geocoder + ?Sized> Geocoder for Arc<T> {
    fn geocode(&self, address: &str) -> Result<GeocodedAddress, GeocodeError> {
        (**self).geocode(address)
    }
}

impl<T: FootprintProvider + ?Sized> FootprintProvider for Arc<T> {
    fn fetch_footprint(&self, at: Coordinates) -> Result<Option<FootprintSource>, ProviderError> {
        (**self).fetch_footprint(at)
    }
}

impl<T: LayerLocator + ?Sized> LayerLocator for Arc<T> {
    fn locate_layers(&self, at: Coordinates) -> Result<LayerUrls, ProviderError> {
        (**self).locate_layers(at)
    }
}
