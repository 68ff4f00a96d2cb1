//! Pipeline tests against in-memory capabilities and synthetic GeoTIFFs.

use approx::assert_relative_eq;
use chrono::NaiveDate;
use roofdsm_analysis::{
    AreaSource, Degrees, FootprintSource, PitchSource, RoofClassification, RoofSegment,
    SquareMeters,
};
use roofdsm_pipeline::{
    Capabilities, Coordinates, FallbackKind, FootprintProvider, GeocodeError, GeocodedAddress,
    Geocoder, ImageryQuality, LayerLocator, LayerUrls, Pipeline, PipelineConfig, PipelineError,
    Provider, ProviderError, Stage,
};
use roofdsm_raster::{
    encode_geotiff, CrsKind, RasterBounds, RasterError, RasterGrid, RasterSource,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

const DSM_URL: &str = "https://rasters.test/dsm.tif?id=dsm&key=SECRET";
const MASK_URL: &str = "https://rasters.test/mask.tif?id=mask&key=SECRET";
const RGB_URL: &str = "https://rasters.test/rgb.tif?id=rgb&key=SECRET";

const SIZE: u32 = 20;
const PIXEL_M: f64 = 0.5;

// ============================================================================
// Fixtures
// ============================================================================

fn bounds(width: u32, height: u32, pixel: f64) -> RasterBounds {
    RasterBounds {
        north: 5_935_010.0,
        south: 5_935_010.0 - height as f64 * pixel,
        east: 334_000.0 + width as f64 * pixel,
        west: 334_000.0,
    }
}

fn in_building(x: u32, y: u32) -> bool {
    (4..14).contains(&x) && (4..14).contains(&y)
}

/// Flat ground at 100 m with a 10 x 10 pixel mono-pitch roof rising 0.25 m
/// per pixel eastward from 108 m (slope 0.5, about 26.57 degrees).
fn dsm_bytes() -> Vec<u8> {
    let data = (0..SIZE)
        .flat_map(|y| {
            (0..SIZE).map(move |x| {
                if in_building(x, y) {
                    108.0 + (x - 4) as f32 * 0.25
                } else {
                    100.0
                }
            })
        })
        .collect();
    let grid = RasterGrid::new(
        SIZE,
        SIZE,
        vec![data],
        bounds(SIZE, SIZE, PIXEL_M),
        CrsKind::Projected,
    )
    .unwrap();
    encode_geotiff(&grid).unwrap()
}

fn nan_dsm_bytes() -> Vec<u8> {
    let grid = RasterGrid::new(
        SIZE,
        SIZE,
        vec![vec![f32::NAN; (SIZE * SIZE) as usize]],
        bounds(SIZE, SIZE, PIXEL_M),
        CrsKind::Projected,
    )
    .unwrap();
    encode_geotiff(&grid).unwrap()
}

/// Building mask at half the elevation resolution, aligned so that nearest
/// resampling reproduces the building exactly.
fn mask_bytes() -> Vec<u8> {
    let half = SIZE / 2;
    let data = (0..half)
        .flat_map(|y| {
            (0..half).map(move |x| if in_building(x * 2, y * 2) { 1.0 } else { 0.0 })
        })
        .collect();
    let grid = RasterGrid::new(
        half,
        half,
        vec![data],
        bounds(half, half, PIXEL_M * 2.0),
        CrsKind::Projected,
    )
    .unwrap();
    encode_geotiff(&grid).unwrap()
}

fn rgb_bytes(size: u32) -> Vec<u8> {
    let n = (size * size) as usize;
    let grid = RasterGrid::new(
        size,
        size,
        vec![vec![90.0; n], vec![110.0; n], vec![70.0; n]],
        bounds(size, size, 0.25),
        CrsKind::Projected,
    )
    .unwrap();
    encode_geotiff(&grid).unwrap()
}

fn gable_footprint() -> FootprintSource {
    FootprintSource::from_segments(vec![
        RoofSegment::new(SquareMeters(60.0), Degrees(26.57)).with_azimuth(Degrees(90.0)),
        RoofSegment::new(SquareMeters(55.0), Degrees(26.57)).with_azimuth(Degrees(270.0)),
    ])
    .unwrap()
}

// ============================================================================
// Fake capabilities
// ============================================================================

struct FakeGeocoder;

impl Geocoder for FakeGeocoder {
    fn geocode(&self, address: &str) -> Result<GeocodedAddress, GeocodeError> {
        if address.contains("Nowhere") {
            return Err(GeocodeError::NotFound {
                address: address.to_string(),
                status: "ZERO_RESULTS".to_string(),
            });
        }
        Ok(GeocodedAddress {
            coordinates: Coordinates::new(53.5461, -113.4938),
            formatted_address: format!("{}, Edmonton, AB", address),
        })
    }
}

enum FootprintBehavior {
    Found(FootprintSource),
    NoBuilding,
    Fails,
    Panics,
    /// Answers only once the elevation fetch has started.
    AwaitsElevation(Arc<Rendezvous>, FootprintSource),
}

const FOOTPRINT_SIDE: usize = 0;
const ELEVATION_SIDE: usize = 1;

/// Two workers that each wait, up to a timeout, for the other to arrive.
#[derive(Default)]
struct Rendezvous {
    arrived: Mutex<[bool; 2]>,
    signal: Condvar,
}

impl Rendezvous {
    /// Mark `side` as arrived and wait for the other side. Returns whether
    /// it arrived before the timeout.
    fn meet(&self, side: usize) -> bool {
        let mut arrived = self.arrived.lock().unwrap();
        arrived[side] = true;
        self.signal.notify_all();
        let (arrived, _) = self
            .signal
            .wait_timeout_while(arrived, Duration::from_secs(3), |a| !a[1 - side])
            .unwrap();
        arrived[1 - side]
    }
}

struct FakeFootprints(FootprintBehavior);

impl FootprintProvider for FakeFootprints {
    fn fetch_footprint(&self, _at: Coordinates) -> Result<Option<FootprintSource>, ProviderError> {
        match &self.0 {
            FootprintBehavior::Found(footprint) => Ok(Some(footprint.clone())),
            FootprintBehavior::NoBuilding => Ok(None),
            FootprintBehavior::Fails => Err(ProviderError::Status {
                service: "building insights",
                status: 503,
            }),
            FootprintBehavior::Panics => panic!("footprint provider crashed"),
            FootprintBehavior::AwaitsElevation(rendezvous, footprint) => {
                if rendezvous.meet(FOOTPRINT_SIDE) {
                    Ok(Some(footprint.clone()))
                } else {
                    Err(ProviderError::Status {
                        service: "building insights",
                        status: 504,
                    })
                }
            }
        }
    }
}

struct FakeLayers {
    layers: Option<LayerUrls>,
}

impl FakeLayers {
    fn all(quality: ImageryQuality) -> Self {
        Self {
            layers: Some(LayerUrls {
                elevation_url: DSM_URL.to_string(),
                mask_url: Some(MASK_URL.to_string()),
                true_color_url: Some(RGB_URL.to_string()),
                imagery_quality: quality,
                imagery_date: NaiveDate::from_ymd_opt(2024, 6, 18),
            }),
        }
    }

    fn failing() -> Self {
        Self { layers: None }
    }
}

impl LayerLocator for FakeLayers {
    fn locate_layers(&self, _at: Coordinates) -> Result<LayerUrls, ProviderError> {
        self.layers.clone().ok_or(ProviderError::Status {
            service: "data layers",
            status: 403,
        })
    }
}

#[derive(Default)]
struct FakeRasters {
    files: HashMap<String, Vec<u8>>,
    requests: AtomicUsize,
}

impl FakeRasters {
    fn standard() -> Self {
        Self::default()
            .with(DSM_URL, dsm_bytes())
            .with(MASK_URL, mask_bytes())
            .with(RGB_URL, rgb_bytes(8))
    }

    fn with(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(url.to_string(), bytes);
        self
    }

    fn without(mut self, url: &str) -> Self {
        self.files.remove(url);
        self
    }
}

impl RasterSource for FakeRasters {
    fn fetch_raster(&self, url: &str) -> roofdsm_raster::Result<Vec<u8>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.files.get(url).cloned().ok_or_else(|| RasterError::Fetch {
            url: roofdsm_raster::redact_url(url),
            status: Some(500),
            reason: "HTTP 500 Internal Server Error".to_string(),
        })
    }
}

/// Holds the elevation fetch until the footprint request has started.
struct RendezvousRasters {
    inner: FakeRasters,
    rendezvous: Arc<Rendezvous>,
}

impl RasterSource for RendezvousRasters {
    fn fetch_raster(&self, url: &str) -> roofdsm_raster::Result<Vec<u8>> {
        if url == DSM_URL && !self.rendezvous.meet(ELEVATION_SIDE) {
            return Err(RasterError::Fetch {
                url: roofdsm_raster::redact_url(url),
                status: Some(504),
                reason: "footprint request never started".to_string(),
            });
        }
        self.inner.fetch_raster(url)
    }
}

fn pipeline_with(
    config: PipelineConfig,
    footprint: FootprintBehavior,
    layers: FakeLayers,
    rasters: FakeRasters,
) -> Pipeline {
    Pipeline::new(
        config,
        Capabilities {
            geocoder: Arc::new(FakeGeocoder),
            footprints: Arc::new(FakeFootprints(footprint)),
            layers: Arc::new(layers),
            rasters: Arc::new(rasters),
        },
    )
}

fn pipeline(footprint: FootprintBehavior, rasters: FakeRasters) -> Pipeline {
    pipeline_with(
        PipelineConfig::default(),
        footprint,
        FakeLayers::all(ImageryQuality::High),
        rasters,
    )
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_footprint_path() {
    let pipeline = pipeline(
        FootprintBehavior::Found(gable_footprint()),
        FakeRasters::standard(),
    );
    let result = pipeline.measure("10220 104 Ave NW").unwrap();

    assert_eq!(result.provider, Provider::FootprintDsm);
    assert!(result.fallbacks.is_empty());
    assert_eq!(result.confidence_score, 90);
    assert!(!result.field_verification_recommended);

    assert_eq!(result.roof.flat_area_source, AreaSource::Footprint);
    assert_eq!(result.roof.pitch_source, PitchSource::FootprintSegments);
    assert_relative_eq!(result.roof.flat_area_sqm.value(), 115.0);
    assert_relative_eq!(result.roof.avg_pitch.value(), 26.57, epsilon = 1e-9);
    assert_eq!(result.roof.pitch_ratio, "6.0:12");
    assert_eq!(result.roof.waste_factor, 1.05);
    assert_eq!(result.waste_table.len(), 4);

    // Gradient agrees with the footprint, so no discrepancy note
    let discrepancy = result.roof.pitch_discrepancy.unwrap().value();
    assert!(discrepancy.abs() < 0.1, "discrepancy {}", discrepancy);

    assert_eq!(result.segments.len(), 2);
    assert_eq!(result.dominant_azimuth, Some(Degrees(90.0)));
    assert_eq!(result.dominant_direction.as_deref(), Some("E"));
    assert_eq!(result.imagery_date, NaiveDate::from_ymd_opt(2024, 6, 18));
}

#[test]
fn test_segment_breakdown() {
    let pipeline = pipeline(
        FootprintBehavior::Found(gable_footprint()),
        FakeRasters::standard(),
    );
    let result = pipeline.measure("10220 104 Ave NW").unwrap();

    let east = &result.segments[0];
    assert_eq!(east.index, 1);
    assert_relative_eq!(east.flat_area_sqm.value(), 60.0);
    assert_relative_eq!(
        east.true_area_sqm.value(),
        60.0 / 26.57_f64.to_radians().cos(),
        epsilon = 1e-9
    );
    assert_relative_eq!(
        east.true_area_sqft.value(),
        east.true_area_sqm.value() * 10.7639,
        epsilon = 1e-9
    );
    assert_eq!(east.pitch_ratio, "6.0:12");
    assert_eq!(east.direction.as_deref(), Some("E"));

    let west = &result.segments[1];
    assert_eq!(west.index, 2);
    assert_relative_eq!(west.flat_area_sqm.value(), 55.0);
    assert_eq!(west.direction.as_deref(), Some("W"));

    // Segment true areas add up to the reconciled true area at a uniform pitch
    let total: f64 = result.segments.iter().map(|s| s.true_area_sqm.value()).sum();
    assert_relative_eq!(total, result.roof.true_area_sqm.value(), epsilon = 1e-9);

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["segments"][1]["direction"], "W");
    assert_eq!(json["segments"][0]["pitch_ratio"], "6.0:12");
}

#[test]
fn test_footprint_and_elevation_fetch_concurrently() {
    let rendezvous = Arc::new(Rendezvous::default());
    let pipeline = Pipeline::new(
        PipelineConfig::default(),
        Capabilities {
            geocoder: Arc::new(FakeGeocoder),
            footprints: Arc::new(FakeFootprints(FootprintBehavior::AwaitsElevation(
                rendezvous.clone(),
                gable_footprint(),
            ))),
            layers: Arc::new(FakeLayers::all(ImageryQuality::High)),
            rasters: Arc::new(RendezvousRasters {
                inner: FakeRasters::standard(),
                rendezvous,
            }),
        },
    );

    // Either request would time out if the other had to finish first
    let result = pipeline.measure("10220 104 Ave NW").unwrap();
    assert!(!result.has_fallback(FallbackKind::FootprintUnavailable));
    assert_eq!(result.provider, Provider::FootprintDsm);
    assert_eq!(result.segments.len(), 2);
}

#[test]
fn test_mask_is_resampled_and_used() {
    let pipeline = pipeline(FootprintBehavior::NoBuilding, FakeRasters::standard());
    let result = pipeline.measure("10220 104 Ave NW").unwrap();

    assert_eq!(result.provider, Provider::DsmMask);
    assert_eq!(
        result.roof_classification,
        RoofClassification::Mask { resampled: true }
    );
    assert_eq!(result.height.valid_pixel_count, 100);

    // 100 pixels of 0.5 m x 0.5 m
    assert_eq!(result.roof.flat_area_source, AreaSource::PixelCount);
    assert_relative_eq!(result.roof.flat_area_sqm.value(), 25.0);
    assert_eq!(result.roof.pitch_source, PitchSource::RasterGradient);
    assert_relative_eq!(
        result.roof.avg_pitch.value(),
        0.5f64.atan().to_degrees(),
        epsilon = 1e-4
    );

    assert!(result.has_fallback(FallbackKind::FootprintUnavailable));
    assert_eq!(result.fallbacks.len(), 1);
    assert_eq!(result.confidence_score, 80);
    assert!(result.field_verification_recommended);
    assert!(result.segments.is_empty());
}

#[test]
fn test_footprint_failure_is_not_fatal() {
    let pipeline = pipeline(FootprintBehavior::Fails, FakeRasters::standard());
    let result = pipeline.measure("10220 104 Ave NW").unwrap();

    assert_eq!(result.provider, Provider::DsmMask);
    assert_eq!(result.fallbacks[0].kind, FallbackKind::FootprintUnavailable);
    assert_eq!(result.fallbacks[0].stage, Stage::Footprint);
    assert!(result.fallbacks[0].reason.contains("503"));
}

#[test]
fn test_footprint_panic_is_absorbed() {
    let pipeline = pipeline(FootprintBehavior::Panics, FakeRasters::standard());
    let result = pipeline.measure("10220 104 Ave NW").unwrap();

    assert!(result.has_fallback(FallbackKind::FootprintUnavailable));
    assert!(result.fallbacks[0].reason.contains("panicked"));
}

#[test]
fn test_mask_failure_uses_ground_heuristic() {
    let pipeline = pipeline(
        FootprintBehavior::NoBuilding,
        FakeRasters::standard().without(MASK_URL),
    );
    let result = pipeline.measure("10220 104 Ave NW").unwrap();

    assert_eq!(result.provider, Provider::DsmHeuristic);
    assert!(matches!(
        result.roof_classification,
        RoofClassification::GroundHeuristic { .. }
    ));
    assert_eq!(result.height.valid_pixel_count, 100);
    assert!(result.has_fallback(FallbackKind::MaskUnavailable));
    assert_eq!(result.confidence_score, 70);
}

#[test]
fn test_mask_disabled_is_not_a_fallback() {
    let config = PipelineConfig::from_yaml_str("use_mask: false").unwrap();
    let rasters = Arc::new(FakeRasters::standard());
    let pipeline = Pipeline::new(
        config,
        Capabilities {
            geocoder: Arc::new(FakeGeocoder),
            footprints: Arc::new(FakeFootprints(FootprintBehavior::Found(gable_footprint()))),
            layers: Arc::new(FakeLayers::all(ImageryQuality::High)),
            rasters: rasters.clone(),
        },
    );
    let result = pipeline.measure("10220 104 Ave NW").unwrap();

    assert!(result.fallbacks.is_empty());
    assert!(result.sources.mask.is_none());
    // Elevation only: mask disabled, true color off by default
    assert_eq!(rasters.requests.load(Ordering::SeqCst), 1);
}

#[test]
fn test_elevation_fetch_failure_is_fatal() {
    let pipeline = pipeline(
        FootprintBehavior::Found(gable_footprint()),
        FakeRasters::standard().without(DSM_URL),
    );
    let err = pipeline.measure("10220 104 Ave NW").unwrap_err();

    assert!(matches!(
        err,
        PipelineError::RasterFetch {
            stage: Stage::Elevation,
            ..
        }
    ));
    assert_eq!(err.http_status(), Some(500));
    assert!(!err.to_string().contains("SECRET"));
}

#[test]
fn test_elevation_decode_failure_is_fatal() {
    let pipeline = pipeline(
        FootprintBehavior::Found(gable_footprint()),
        FakeRasters::standard().with(DSM_URL, b"not a tiff".to_vec()),
    );
    let err = pipeline.measure("10220 104 Ave NW").unwrap_err();

    assert!(matches!(
        err,
        PipelineError::RasterDecode {
            stage: Stage::Elevation,
            ..
        }
    ));
}

#[test]
fn test_address_not_found() {
    let pipeline = pipeline(FootprintBehavior::NoBuilding, FakeRasters::standard());
    let err = pipeline.measure("1 Nowhere Road").unwrap_err();

    assert!(matches!(err, PipelineError::AddressNotFound { .. }));
    assert_eq!(err.stage(), Stage::Geocode);
}

#[test]
fn test_layer_lookup_failure_is_fatal() {
    let pipeline = pipeline_with(
        PipelineConfig::default(),
        FootprintBehavior::Found(gable_footprint()),
        FakeLayers::failing(),
        FakeRasters::standard(),
    );
    let err = pipeline.measure("10220 104 Ave NW").unwrap_err();

    assert_eq!(err.stage(), Stage::Layers);
    assert_eq!(err.http_status(), Some(403));
}

#[test]
fn test_no_valid_elevation_degrades_without_error() {
    let pipeline = pipeline(
        FootprintBehavior::NoBuilding,
        FakeRasters::standard()
            .with(DSM_URL, nan_dsm_bytes())
            .without(MASK_URL),
    );
    let result = pipeline.measure("10220 104 Ave NW").unwrap();

    assert_eq!(result.height.valid_pixel_count, 0);
    assert_eq!(result.roof.flat_area_sqm.value(), 0.0);
    assert_eq!(result.roof.area_multiplier, 1.0);
    assert!(result.is_unavailable());
    assert!(result.has_fallback(FallbackKind::NoRoofPixels));
    assert!(result.has_fallback(FallbackKind::PitchUnavailable));
    assert!(result.field_verification_recommended);
}

#[test]
fn test_true_color_preview() {
    let config = PipelineConfig::from_yaml_str("fetch_true_color: true").unwrap();
    let pipeline = pipeline_with(
        config,
        FootprintBehavior::Found(gable_footprint()),
        FakeLayers::all(ImageryQuality::High),
        FakeRasters::standard(),
    );
    let result = pipeline.measure("10220 104 Ave NW").unwrap();

    let preview = result.sources.true_color.unwrap();
    assert_eq!((preview.width, preview.height, preview.bands), (8, 8, 3));
    assert!(preview.url.contains("key=REDACTED"));
    assert!(!preview.url.contains("SECRET"));
}

#[test]
fn test_oversized_true_color_is_skipped() {
    let config =
        PipelineConfig::from_yaml_str("fetch_true_color: true\nmax_true_color_pixels: 16").unwrap();
    let pipeline = pipeline_with(
        config,
        FootprintBehavior::Found(gable_footprint()),
        FakeLayers::all(ImageryQuality::High),
        FakeRasters::standard(),
    );
    let result = pipeline.measure("10220 104 Ave NW").unwrap();

    assert!(result.sources.true_color.is_none());
    assert!(result.fallbacks.is_empty());
    assert!(result
        .quality_notes
        .iter()
        .any(|n| n.contains("preview size limit")));
}

#[test]
fn test_medium_quality_lowers_confidence() {
    let pipeline = pipeline_with(
        PipelineConfig::default(),
        FootprintBehavior::Found(gable_footprint()),
        FakeLayers::all(ImageryQuality::Medium),
        FakeRasters::standard(),
    );
    let result = pipeline.measure("10220 104 Ave NW").unwrap();

    assert_eq!(result.confidence_score, 75);
    assert!(result.field_verification_recommended);
    assert!(result.quality_notes[0].contains("MEDIUM"));
}

#[test]
fn test_source_urls_are_redacted() {
    let pipeline = pipeline(FootprintBehavior::NoBuilding, FakeRasters::standard());
    let result = pipeline.measure("10220 104 Ave NW").unwrap();

    assert_eq!(
        result.sources.elevation.url,
        "https://rasters.test/dsm.tif?id=dsm&key=REDACTED"
    );
    assert_eq!(result.sources.elevation.width, SIZE);
    assert_relative_eq!(result.sources.elevation.pixel_size_meters, PIXEL_M, epsilon = 1e-9);
    assert_eq!(result.sources.mask.as_ref().unwrap().width, SIZE / 2);
}

#[test]
fn test_roof_area_is_deterministic() {
    let pipeline = pipeline(
        FootprintBehavior::Found(gable_footprint()),
        FakeRasters::standard(),
    );

    let first = pipeline.measure("10220 104 Ave NW").unwrap();
    let second = pipeline.measure("10220 104 Ave NW").unwrap();

    assert_eq!(
        serde_json::to_vec(&first.roof).unwrap(),
        serde_json::to_vec(&second.roof).unwrap()
    );
    assert_eq!(first.waste_table, second.waste_table);
    assert_eq!(first.slope, second.slope);
}

#[test]
fn test_result_serializes() {
    let pipeline = pipeline(FootprintBehavior::NoBuilding, FakeRasters::standard());
    let result = pipeline.measure("10220 104 Ave NW").unwrap();

    let json: serde_json::Value = serde_json::to_value(&result).unwrap();
    assert_eq!(json["provider"], "dsm_mask");
    assert_eq!(json["imagery_quality"], "HIGH");
    assert_eq!(json["fallbacks"][0]["kind"], "footprint_unavailable");
    assert_eq!(json["roof"]["flat_area_source"], "pixel_count");
    assert_eq!(json["roof_classification"]["method"], "mask");
    assert_eq!(json["imagery"]["street_views"].as_array().unwrap().len(), 4);
}
