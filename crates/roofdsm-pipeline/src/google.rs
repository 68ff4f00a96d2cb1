//! Google Geocoding and Solar API clients.
//!
//! Each client issues one blocking request per call and leaves retries to
//! the caller. Response parsing is split into pure `parse_*` functions so
//! payload handling can be tested without a network.

use crate::capabilities::{
    Coordinates, FootprintProvider, GeocodedAddress, Geocoder, ImageryQuality, LayerLocator,
    LayerUrls,
};
use crate::config::PipelineConfig;
use crate::error::{GeocodeError, ProviderError};
use chrono::NaiveDate;
use roofdsm_analysis::{Degrees, FootprintSource, Meters, RoofSegment, SquareMeters};
use roofdsm_raster::CredentialProvider;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

const GEOCODING: &str = "geocoding";
const BUILDING_INSIGHTS: &str = "building insights";
const DATA_LAYERS: &str = "data layers";

/// Shared HTTP plumbing for the Google endpoints.
struct ApiClient {
    client: reqwest::blocking::Client,
    credentials: Arc<dyn CredentialProvider>,
}

impl ApiClient {
    fn new(
        config: &PipelineConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| ProviderError::request("http client", e))?;
        Ok(Self {
            client,
            credentials,
        })
    }

    /// GET `url` with `query`. Returns `None` on HTTP 404.
    fn get(
        &self,
        service: &'static str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Option<String>, ProviderError> {
        let request = self.credentials.credential()?.apply(self.client.get(url).query(query));
        let response = request
            .send()
            .map_err(|e| ProviderError::request(service, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ProviderError::Status {
                service,
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .map_err(|e| ProviderError::request(service, e))?;
        Ok(Some(body))
    }
}

/// Google Geocoding API.
pub struct GoogleGeocoder {
    api: ApiClient,
    endpoint: String,
}

impl GoogleGeocoder {
    pub fn new(
        config: &PipelineConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            api: ApiClient::new(config, credentials)?,
            endpoint: config.endpoints.geocoding_url.clone(),
        })
    }
}

impl Geocoder for GoogleGeocoder {
    fn geocode(&self, address: &str) -> Result<GeocodedAddress, GeocodeError> {
        debug!(address, "Geocoding");
        let body = self
            .api
            .get(GEOCODING, &self.endpoint, &[("address", address.to_string())])?
            .ok_or(ProviderError::Status {
                service: GEOCODING,
                status: 404,
            })?;
        parse_geocode_response(&body, address)
    }
}

/// Solar API `buildingInsights:findClosest`.
pub struct SolarBuildingInsights {
    api: ApiClient,
    endpoint: String,
    required_quality: ImageryQuality,
}

impl SolarBuildingInsights {
    pub fn new(
        config: &PipelineConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            api: ApiClient::new(config, credentials)?,
            endpoint: config.endpoints.building_insights_url.clone(),
            required_quality: config.solar.required_quality,
        })
    }
}

impl FootprintProvider for SolarBuildingInsights {
    fn fetch_footprint(&self, at: Coordinates) -> Result<Option<FootprintSource>, ProviderError> {
        debug!(%at, "Fetching building insights");
        let query = [
            ("location.latitude", at.lat.to_string()),
            ("location.longitude", at.lng.to_string()),
            ("requiredQuality", self.required_quality.as_str().to_string()),
        ];
        match self.api.get(BUILDING_INSIGHTS, &self.endpoint, &query)? {
            Some(body) => parse_building_insights(&body),
            None => Ok(None),
        }
    }
}

/// Solar API `dataLayers:get`.
pub struct SolarDataLayers {
    api: ApiClient,
    endpoint: String,
    radius_meters: f64,
    pixel_size_meters: f64,
    required_quality: ImageryQuality,
}

impl SolarDataLayers {
    pub fn new(
        config: &PipelineConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            api: ApiClient::new(config, credentials)?,
            endpoint: config.endpoints.data_layers_url.clone(),
            radius_meters: config.solar.radius_meters,
            pixel_size_meters: config.solar.pixel_size_meters,
            required_quality: config.solar.required_quality,
        })
    }
}

impl LayerLocator for SolarDataLayers {
    fn locate_layers(&self, at: Coordinates) -> Result<LayerUrls, ProviderError> {
        debug!(%at, "Locating data layers");
        let query = [
            ("location.latitude", at.lat.to_string()),
            ("location.longitude", at.lng.to_string()),
            ("radiusMeters", self.radius_meters.to_string()),
            ("view", "FULL_LAYERS".to_string()),
            ("requiredQuality", self.required_quality.as_str().to_string()),
            ("pixelSizeMeters", self.pixel_size_meters.to_string()),
        ];
        let body = self
            .api
            .get(DATA_LAYERS, &self.endpoint, &query)?
            .ok_or(ProviderError::Status {
                service: DATA_LAYERS,
                status: 404,
            })?;
        parse_data_layers(&body)
    }
}

#[derive(Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Deserialize)]
struct GeocodeResult {
    formatted_address: Option<String>,
    geometry: GeocodeGeometry,
}

#[derive(Deserialize)]
struct GeocodeGeometry {
    location: Coordinates,
}

/// Parse a Geocoding API response. Any status other than `OK`, or an empty
/// result list, is [`GeocodeError::NotFound`].
pub fn parse_geocode_response(body: &str, address: &str) -> Result<GeocodedAddress, GeocodeError> {
    let response: GeocodeResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::malformed(GEOCODING, e))?;

    let not_found = |status: String| GeocodeError::NotFound {
        address: address.to_string(),
        status,
    };

    if response.status != "OK" {
        return Err(not_found(response.status));
    }
    let first = response
        .results
        .into_iter()
        .next()
        .ok_or_else(|| not_found("OK".to_string()))?;

    Ok(GeocodedAddress {
        coordinates: first.geometry.location,
        formatted_address: first
            .formatted_address
            .unwrap_or_else(|| address.to_string()),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildingInsightsResponse {
    solar_potential: Option<SolarPotential>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolarPotential {
    #[serde(default)]
    roof_segment_stats: Vec<SegmentStats>,
    whole_roof_stats: Option<SizeStats>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SegmentStats {
    #[serde(default)]
    pitch_degrees: f64,
    azimuth_degrees: Option<f64>,
    plane_height_at_center_meters: Option<f64>,
    #[serde(default)]
    stats: SizeStats,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct SizeStats {
    #[serde(default)]
    area_meters2: f64,
}

/// Parse a building-insights response into a footprint.
///
/// The footprint area is the sum of roof segment areas, falling back to
/// `wholeRoofStats.areaMeters2` when segments carry no area. A response
/// without any area is `Ok(None)`.
pub fn parse_building_insights(body: &str) -> Result<Option<FootprintSource>, ProviderError> {
    let response: BuildingInsightsResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::malformed(BUILDING_INSIGHTS, e))?;

    let Some(potential) = response.solar_potential else {
        return Ok(None);
    };

    let segments: Vec<RoofSegment> = potential
        .roof_segment_stats
        .iter()
        .map(|s| {
            let mut segment =
                RoofSegment::new(SquareMeters(s.stats.area_meters2), Degrees(s.pitch_degrees));
            segment.azimuth = s.azimuth_degrees.map(Degrees);
            segment.plane_height = s.plane_height_at_center_meters.map(Meters);
            segment
        })
        .collect();

    let segment_area: f64 = segments.iter().map(|s| s.area.value()).sum();
    let whole_roof_area = potential
        .whole_roof_stats
        .map(|s| s.area_meters2)
        .unwrap_or(0.0);

    let footprint = if segment_area > 0.0 {
        FootprintSource::from_segments(segments)?
    } else if whole_roof_area > 0.0 {
        FootprintSource::new(SquareMeters(whole_roof_area), segments)?
    } else {
        return Ok(None);
    };

    debug!(
        area_sqm = footprint.area().value(),
        segments = footprint.segments().len(),
        "Parsed building insights"
    );
    Ok(Some(footprint))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataLayersResponse {
    dsm_url: Option<String>,
    mask_url: Option<String>,
    rgb_url: Option<String>,
    imagery_quality: Option<String>,
    imagery_date: Option<DateParts>,
}

#[derive(Deserialize)]
struct DateParts {
    year: i32,
    month: u32,
    day: u32,
}

/// Parse a data-layers response. A missing `dsmUrl` is an error because
/// no measurement is possible without elevation data.
pub fn parse_data_layers(body: &str) -> Result<LayerUrls, ProviderError> {
    let response: DataLayersResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::malformed(DATA_LAYERS, e))?;

    let elevation_url = response
        .dsm_url
        .ok_or_else(|| ProviderError::malformed(DATA_LAYERS, "missing dsmUrl"))?;

    Ok(LayerUrls {
        elevation_url,
        mask_url: response.mask_url,
        true_color_url: response.rgb_url,
        imagery_quality: response
            .imagery_quality
            .as_deref()
            .map(ImageryQuality::from_label)
            .unwrap_or(ImageryQuality::Base),
        imagery_date: response
            .imagery_date
            .and_then(|d| NaiveDate::from_ymd_opt(d.year, d.month, d.day)),
    })
}
