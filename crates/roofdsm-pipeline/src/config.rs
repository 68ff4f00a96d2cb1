//! Pipeline configuration.
//!
//! Every field has a default, so an empty YAML document is a valid
//! configuration. Unknown keys are rejected to catch typos.
//!
//! ```yaml
//! http_timeout_secs: 30
//! use_mask: true
//! fetch_true_color: false
//! solar:
//!   required_quality: MEDIUM
//!   radius_meters: 40
//! imagery:
//!   zoom: 19
//! ```

use crate::capabilities::ImageryQuality;
use roofdsm_analysis::{Degrees, ReconcileOptions, DEFAULT_PITCH_DISCREPANCY};
use roofdsm_raster::DEFAULT_MAX_TRUE_COLOR_PIXELS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Service endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EndpointConfig {
    pub geocoding_url: String,
    pub building_insights_url: String,
    pub data_layers_url: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            geocoding_url: "https://maps.googleapis.com/maps/api/geocode/json".to_string(),
            building_insights_url: "https://solar.googleapis.com/v1/buildingInsights:findClosest"
                .to_string(),
            data_layers_url: "https://solar.googleapis.com/v1/dataLayers:get".to_string(),
        }
    }
}

/// Building-insights and data-layer request parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolarConfig {
    /// Minimum imagery quality requested from the provider.
    pub required_quality: ImageryQuality,
    /// Radius around the coordinate covered by data layers.
    pub radius_meters: f64,
    /// Requested raster resolution.
    pub pixel_size_meters: f64,
}

impl Default for SolarConfig {
    fn default() -> Self {
        Self {
            required_quality: ImageryQuality::High,
            radius_meters: 50.0,
            pixel_size_meters: 0.1,
        }
    }
}

/// Parameters for the satellite and street-view image URLs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageryConfig {
    pub static_map_url: String,
    pub street_view_url: String,
    pub zoom: u8,
    /// Image size as `WIDTHxHEIGHT`.
    pub size: String,
    pub street_view_pitch: i32,
    pub street_view_fov: u32,
}

impl Default for ImageryConfig {
    fn default() -> Self {
        Self {
            static_map_url: "https://maps.googleapis.com/maps/api/staticmap".to_string(),
            street_view_url: "https://maps.googleapis.com/maps/api/streetview".to_string(),
            zoom: 20,
            size: "600x400".to_string(),
            street_view_pitch: 25,
            street_view_fov: 90,
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub endpoints: EndpointConfig,
    /// Timeout for every outgoing HTTP request.
    pub http_timeout_secs: u64,
    pub solar: SolarConfig,
    /// Fetch the building mask. Without it, roof pixels come from the
    /// ground-level heuristic.
    pub use_mask: bool,
    /// Fetch and decode the true-color raster for a preview.
    pub fetch_true_color: bool,
    /// True-color rasters with more pixels than this are not decoded.
    pub max_true_color_pixels: u64,
    /// Footprint and raster pitches further apart than this are logged.
    pub pitch_discrepancy_degrees: f64,
    pub imagery: ImageryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            endpoints: EndpointConfig::default(),
            http_timeout_secs: 60,
            solar: SolarConfig::default(),
            use_mask: true,
            fetch_true_color: false,
            max_true_color_pixels: DEFAULT_MAX_TRUE_COLOR_PIXELS,
            pitch_discrepancy_degrees: DEFAULT_PITCH_DISCREPANCY.value(),
            imagery: ImageryConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        // serde_yaml reads an empty document as null rather than an empty map
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid("http_timeout_secs must be positive".into()));
        }
        if !(self.solar.radius_meters > 0.0) {
            return Err(ConfigError::Invalid("solar.radius_meters must be positive".into()));
        }
        if !(self.solar.pixel_size_meters > 0.0) {
            return Err(ConfigError::Invalid(
                "solar.pixel_size_meters must be positive".into(),
            ));
        }
        if self.max_true_color_pixels == 0 {
            return Err(ConfigError::Invalid(
                "max_true_color_pixels must be positive".into(),
            ));
        }
        if !(self.pitch_discrepancy_degrees >= 0.0) {
            return Err(ConfigError::Invalid(
                "pitch_discrepancy_degrees must be non-negative".into(),
            ));
        }
        for url in [&self.imagery.static_map_url, &self.imagery.street_view_url] {
            reqwest::Url::parse(url)
                .map_err(|e| ConfigError::Invalid(format!("imagery URL {:?}: {}", url, e)))?;
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            pitch_discrepancy_threshold: Degrees(self.pitch_discrepancy_degrees),
        }
    }
}
