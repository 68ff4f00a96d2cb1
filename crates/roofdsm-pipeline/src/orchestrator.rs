//! Address-to-measurement orchestration.
//!
//! ```text
//! GEOCODE -> FETCH (footprint | layers -> elevation, mask, true color)
//!         -> DECODE -> EXTRACT -> SLOPE -> RECONCILE -> ASSEMBLE
//! ```
//!
//! Geocoding, layer lookup and elevation failures are fatal. Footprint and
//! mask failures fall back to pixel-count area and the ground-level
//! heuristic; every fallback is recorded on the result, logged, and counted.

use crate::capabilities::{
    Coordinates, FootprintProvider, Geocoder, ImageryQuality, LayerLocator, LayerUrls,
};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, ProviderError, Stage};
use crate::imagery::ImageryUrls;
use crate::result::{
    confidence_score, Fallback, FallbackKind, MeasurementResult, Provider, RasterReference,
    SourceRasters,
};
use chrono::Utc;
use metrics::{counter, histogram};
use roofdsm_analysis::{
    compute_slope, degrees_to_cardinal, extract, reconcile_with, segment_measurements,
    waste_table, FootprintSource, PitchSource, RoofClassification,
};
use roofdsm_metrics::metric_defs;
use roofdsm_raster::{redact_url, RasterDecoder, RasterGrid, RasterKind, RasterSource};
use std::sync::Arc;
use std::thread::{self, ScopedJoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn};

/// The external capabilities a [`Pipeline`] runs against.
#[derive(Clone)]
pub struct Capabilities {
    pub geocoder: Arc<dyn Geocoder>,
    pub footprints: Arc<dyn FootprintProvider>,
    pub layers: Arc<dyn LayerLocator>,
    pub rasters: Arc<dyn RasterSource>,
}

/// Outcome of the concurrent fetch phase, before fallbacks are applied.
struct Fetched {
    layers: LayerUrls,
    footprint: Result<Option<FootprintSource>, PipelineError>,
    elevation: Result<RasterGrid, PipelineError>,
    mask: Option<Result<RasterGrid, PipelineError>>,
    true_color: Option<Result<Option<RasterGrid>, PipelineError>>,
}

/// Stateless measurement pipeline. One instance can serve many requests,
/// including concurrently.
pub struct Pipeline {
    config: PipelineConfig,
    capabilities: Capabilities,
    decoder: RasterDecoder,
    imagery_key: Option<String>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, capabilities: Capabilities) -> Self {
        let decoder =
            RasterDecoder::new().with_max_true_color_pixels(config.max_true_color_pixels);
        Self {
            config,
            capabilities,
            decoder,
            imagery_key: None,
        }
    }

    /// Key appended to the satellite and street-view URLs of every result.
    pub fn with_imagery_key(mut self, key: impl Into<String>) -> Self {
        self.imagery_key = Some(key.into());
        self
    }

    /// Measure the roof at `address`.
    pub fn measure(&self, address: &str) -> Result<MeasurementResult, PipelineError> {
        let span = info_span!("measure", address);
        let _guard = span.enter();
        let started = Instant::now();

        let result = self.run(address, started);

        histogram!(metric_defs::PIPELINE_DURATION.name)
            .record(started.elapsed().as_secs_f64() * 1000.0);
        match &result {
            Ok(measurement) => {
                let provider = measurement.provider.as_str();
                counter!(metric_defs::PIPELINE_RUNS.name, "provider" => provider).increment(1);
                info!(
                    provider = %measurement.provider,
                    true_area_sqft = measurement.roof.true_area_sqft.value(),
                    squares = measurement.roof.material_squares,
                    confidence = measurement.confidence_score,
                    fallbacks = measurement.fallbacks.len(),
                    duration_ms = measurement.duration_ms,
                    "Measurement complete"
                );
            }
            Err(e) => {
                counter!(metric_defs::PIPELINE_FAILURES.name, "stage" => e.stage().as_str())
                    .increment(1);
                error!(stage = %e.stage(), status = ?e.http_status(), "Measurement failed: {}", e);
            }
        }

        result
    }

    fn run(&self, address: &str, started: Instant) -> Result<MeasurementResult, PipelineError> {
        let located = self.capabilities.geocoder.geocode(address)?;
        let at = located.coordinates;
        info!(%at, formatted = %located.formatted_address, "Geocoded address");

        let Fetched {
            layers,
            footprint,
            elevation,
            mask,
            true_color,
        } = self.fetch_all(at)?;

        let elevation = elevation?;
        let mut fallbacks = Vec::new();
        let mut quality_notes = Vec::new();

        let footprint = match footprint {
            Ok(Some(footprint)) => Some(footprint),
            Ok(None) => {
                record_fallback(
                    &mut fallbacks,
                    FallbackKind::FootprintUnavailable,
                    Stage::Footprint,
                    "No building footprint at this location".to_string(),
                );
                None
            }
            Err(e) => {
                record_fallback(
                    &mut fallbacks,
                    FallbackKind::FootprintUnavailable,
                    Stage::Footprint,
                    e.to_string(),
                );
                None
            }
        };

        let mask = match mask {
            Some(Ok(grid)) => Some(grid),
            Some(Err(e)) => {
                record_fallback(
                    &mut fallbacks,
                    FallbackKind::MaskUnavailable,
                    Stage::Mask,
                    e.to_string(),
                );
                None
            }
            None if self.config.use_mask => {
                record_fallback(
                    &mut fallbacks,
                    FallbackKind::MaskUnavailable,
                    Stage::Mask,
                    "Data layers returned no mask".to_string(),
                );
                None
            }
            None => None,
        };

        let true_color = match true_color {
            Some(Ok(Some(grid))) => Some(grid),
            Some(Ok(None)) => {
                quality_notes.push("True-color raster exceeds the preview size limit.".to_string());
                None
            }
            Some(Err(e)) => {
                warn!(error = %e, "True-color preview unavailable");
                quality_notes.push(format!("True-color preview unavailable: {}", e));
                None
            }
            None => None,
        };

        // Pure raster math from here on
        let height = extract(&elevation, mask.as_ref());
        histogram!(metric_defs::ROOF_PIXELS.name).record(height.valid_pixel_count() as f64);
        if height.is_empty() {
            record_fallback(
                &mut fallbacks,
                FallbackKind::NoRoofPixels,
                Stage::Analysis,
                "No pixel was classified as roof".to_string(),
            );
        }

        let slope = compute_slope(&height);
        let options = self.config.reconcile_options();
        let roof = reconcile_with(&height, &slope, footprint.as_ref(), &options);

        if roof.pitch_source == PitchSource::Unavailable {
            record_fallback(
                &mut fallbacks,
                FallbackKind::PitchUnavailable,
                Stage::Analysis,
                "Neither segment nor gradient pitch available; assuming a flat roof".to_string(),
            );
        }

        let provider = match (&footprint, height.classification()) {
            (Some(_), _) => Provider::FootprintDsm,
            (None, RoofClassification::Mask { .. }) => Provider::DsmMask,
            (None, _) => Provider::DsmHeuristic,
        };

        if layers.imagery_quality != ImageryQuality::High {
            quality_notes.push(format!(
                "Imagery quality is {}. HIGH quality (0.1 m/px) recommended for exact \
                 material orders.",
                layers.imagery_quality
            ));
        }
        if footprint.as_ref().is_some_and(|f| f.segments().len() < 2) {
            quality_notes
                .push("Low segment count may indicate incomplete building model.".to_string());
        }
        if let Some(diff) = roof.pitch_discrepancy {
            if diff.value().abs() > options.pitch_discrepancy_threshold.value() {
                quality_notes.push(format!(
                    "Footprint pitch differs from raster pitch by {:.1} degrees.",
                    diff.value().abs()
                ));
            }
        }
        if roof.is_unavailable() {
            quality_notes.push("Insufficient data: roof area could not be measured.".to_string());
        }

        let dominant_azimuth = footprint.as_ref().and_then(FootprintSource::dominant_azimuth);
        let confidence = confidence_score(layers.imagery_quality, fallbacks.len());
        let field_verification_recommended = layers.imagery_quality != ImageryQuality::High
            || !fallbacks.is_empty()
            || roof.is_unavailable();

        let imagery =
            match ImageryUrls::assemble(at, &self.config.imagery, self.imagery_key.as_deref()) {
                Ok(urls) => Some(urls),
                Err(e) => {
                    warn!(error = %e, "Imagery URLs unavailable");
                    quality_notes.push(format!("Imagery URLs unavailable: {}", e));
                    None
                }
            };

        let sources = SourceRasters {
            elevation: raster_reference(&layers.elevation_url, &elevation),
            mask: layers
                .mask_url
                .as_deref()
                .zip(mask.as_ref())
                .map(|(url, grid)| raster_reference(url, grid)),
            true_color: layers
                .true_color_url
                .as_deref()
                .zip(true_color.as_ref())
                .map(|(url, grid)| raster_reference(url, grid)),
        };

        Ok(MeasurementResult {
            address: address.to_string(),
            formatted_address: located.formatted_address,
            coordinates: at,
            imagery_quality: layers.imagery_quality,
            imagery_date: layers.imagery_date,
            provider,
            confidence_score: confidence,
            field_verification_recommended,
            quality_notes,
            waste_table: waste_table(roof.true_area_sqft),
            slope: slope.stats(),
            height: height.stats(),
            roof_classification: height.classification(),
            segments: footprint
                .as_ref()
                .map(segment_measurements)
                .unwrap_or_default(),
            dominant_azimuth,
            dominant_direction: dominant_azimuth.map(|az| degrees_to_cardinal(az).to_string()),
            sources,
            imagery,
            roof,
            fallbacks,
            duration_ms: started.elapsed().as_millis() as u64,
            generated_at: Utc::now(),
        })
    }

    /// Issue the footprint and raster requests concurrently.
    ///
    /// The layer lookup runs on the calling thread while the footprint
    /// request is in flight; the raster fetches start once their URLs are
    /// known. Every worker is joined before returning.
    fn fetch_all(&self, at: Coordinates) -> Result<Fetched, PipelineError> {
        thread::scope(|scope| {
            let footprint = scope.spawn(move || {
                self.capabilities
                    .footprints
                    .fetch_footprint(at)
                    .map_err(|source| PipelineError::Provider {
                        stage: Stage::Footprint,
                        source,
                    })
            });

            let layers = match self.capabilities.layers.locate_layers(at) {
                Ok(layers) => layers,
                Err(source) => {
                    let _ = footprint.join();
                    return Err(layers_error(source));
                }
            };
            debug!(
                quality = %layers.imagery_quality,
                has_mask = layers.mask_url.is_some(),
                has_true_color = layers.true_color_url.is_some(),
                "Located data layers"
            );

            let elevation = {
                let url = layers.elevation_url.clone();
                scope.spawn(move || self.fetch_grid(&url, RasterKind::Elevation))
            };
            let mask = match (&layers.mask_url, self.config.use_mask) {
                (Some(url), true) => {
                    let url = url.clone();
                    Some(scope.spawn(move || self.fetch_grid(&url, RasterKind::Mask)))
                }
                _ => None,
            };
            let true_color = match (&layers.true_color_url, self.config.fetch_true_color) {
                (Some(url), true) => {
                    let url = url.clone();
                    Some(scope.spawn(move || self.fetch_preview(&url)))
                }
                _ => None,
            };

            Ok(Fetched {
                footprint: join(footprint, Stage::Footprint),
                elevation: join(elevation, Stage::Elevation),
                mask: mask.map(|handle| join(handle, Stage::Mask)),
                true_color: true_color.map(|handle| join(handle, Stage::TrueColor)),
                layers,
            })
        })
    }

    fn fetch_bytes(
        &self,
        url: &str,
        kind: RasterKind,
        stage: Stage,
    ) -> Result<Vec<u8>, PipelineError> {
        let bytes = self
            .capabilities
            .rasters
            .fetch_raster(url)
            .map_err(|e| PipelineError::raster(stage, e))?;
        let layer = kind.as_str();
        counter!(metric_defs::RASTER_BYTES.name, "layer" => layer).increment(bytes.len() as u64);
        Ok(bytes)
    }

    fn fetch_grid(&self, url: &str, kind: RasterKind) -> Result<RasterGrid, PipelineError> {
        let stage = stage_for(kind);
        let bytes = self.fetch_bytes(url, kind, stage)?;
        let grid = self
            .decoder
            .decode_grid(&bytes, kind)
            .map_err(|e| PipelineError::raster(stage, e))?;
        debug!(
            %kind,
            width = grid.width(),
            height = grid.height(),
            pixel_size_m = grid.pixel_size_meters(),
            "Decoded raster"
        );
        Ok(grid)
    }

    fn fetch_preview(&self, url: &str) -> Result<Option<RasterGrid>, PipelineError> {
        let bytes = self.fetch_bytes(url, RasterKind::TrueColor, Stage::TrueColor)?;
        self.decoder
            .decode_preview(&bytes)
            .map_err(|e| PipelineError::raster(Stage::TrueColor, e))
    }
}

fn stage_for(kind: RasterKind) -> Stage {
    match kind {
        RasterKind::Elevation => Stage::Elevation,
        RasterKind::Mask => Stage::Mask,
        RasterKind::TrueColor => Stage::TrueColor,
    }
}

fn layers_error(source: ProviderError) -> PipelineError {
    PipelineError::Provider {
        stage: Stage::Layers,
        source,
    }
}

/// Join a worker, turning a panic into [`PipelineError::WorkerPanicked`].
fn join<T>(
    handle: ScopedJoinHandle<'_, Result<T, PipelineError>>,
    stage: Stage,
) -> Result<T, PipelineError> {
    handle
        .join()
        .unwrap_or(Err(PipelineError::WorkerPanicked { stage }))
}

fn record_fallback(
    fallbacks: &mut Vec<Fallback>,
    kind: FallbackKind,
    stage: Stage,
    reason: String,
) {
    warn!(kind = kind.as_str(), %stage, %reason, "Falling back");
    counter!(metric_defs::PIPELINE_FALLBACKS.name, "kind" => kind.as_str()).increment(1);
    fallbacks.push(Fallback {
        kind,
        stage,
        reason,
    });
}

fn raster_reference(url: &str, grid: &RasterGrid) -> RasterReference {
    RasterReference {
        url: redact_url(url),
        width: grid.width(),
        height: grid.height(),
        bands: grid.band_count(),
        pixel_size_meters: grid.pixel_size_meters(),
    }
}
