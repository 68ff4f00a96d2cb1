//! The measurement record returned to callers.

use crate::capabilities::{Coordinates, ImageryQuality};
use crate::error::Stage;
use crate::imagery::ImageryUrls;
use chrono::{DateTime, NaiveDate, Utc};
use roofdsm_analysis::{
    Degrees, HeightStats, PitchStats, RoofAreaResult, RoofClassification, SegmentMeasurement,
    WasteScenario,
};
use serde::{Deserialize, Serialize};

/// Confidence deducted per recorded fallback.
pub const FALLBACK_CONFIDENCE_PENALTY: u8 = 10;

/// Which combination of sources produced the measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Footprint area and segment pitch with DSM support.
    FootprintDsm,
    /// DSM with building mask.
    DsmMask,
    /// DSM with ground-level heuristic.
    DsmHeuristic,
}

impl Provider {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Provider::FootprintDsm => "footprint_dsm",
            Provider::DsmMask => "dsm_mask",
            Provider::DsmHeuristic => "dsm_heuristic",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A degraded path the pipeline took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackKind {
    /// No footprint; flat area from pixel count.
    FootprintUnavailable,
    /// No mask; roof pixels from the ground-level heuristic.
    MaskUnavailable,
    /// No pixel was classified as roof.
    NoRoofPixels,
    /// Neither segment nor gradient pitch; pitch taken as 0.
    PitchUnavailable,
}

impl FallbackKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            FallbackKind::FootprintUnavailable => "footprint_unavailable",
            FallbackKind::MaskUnavailable => "mask_unavailable",
            FallbackKind::NoRoofPixels => "no_roof_pixels",
            FallbackKind::PitchUnavailable => "pitch_unavailable",
        }
    }
}

/// A recorded fallback and why it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fallback {
    pub kind: FallbackKind,
    pub stage: Stage,
    pub reason: String,
}

/// A fetched raster, with credentials removed from its URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterReference {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub bands: usize,
    pub pixel_size_meters: f64,
}

/// Rasters the measurement was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRasters {
    pub elevation: RasterReference,
    pub mask: Option<RasterReference>,
    /// Present only when the true-color raster was fetched and small enough
    /// to decode.
    pub true_color: Option<RasterReference>,
}

/// Everything a report needs about one measured roof.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementResult {
    /// Address as requested.
    pub address: String,
    pub formatted_address: String,
    pub coordinates: Coordinates,
    pub imagery_quality: ImageryQuality,
    pub imagery_date: Option<NaiveDate>,
    pub provider: Provider,
    pub fallbacks: Vec<Fallback>,
    /// 0-100.
    pub confidence_score: u8,
    pub field_verification_recommended: bool,
    pub quality_notes: Vec<String>,
    pub roof: RoofAreaResult,
    pub waste_table: Vec<WasteScenario>,
    pub slope: PitchStats,
    pub height: HeightStats,
    pub roof_classification: RoofClassification,
    /// Per-plane breakdown; empty without a footprint.
    pub segments: Vec<SegmentMeasurement>,
    pub dominant_azimuth: Option<Degrees>,
    pub dominant_direction: Option<String>,
    pub sources: SourceRasters,
    /// Absent when the configured imagery endpoints are not valid URLs.
    pub imagery: Option<ImageryUrls>,
    pub duration_ms: u64,
    pub generated_at: DateTime<Utc>,
}

impl MeasurementResult {
    /// True when the roof could not be measured; see
    /// [`RoofAreaResult::is_unavailable`].
    pub fn is_unavailable(&self) -> bool {
        self.roof.is_unavailable()
    }

    pub fn has_fallback(&self, kind: FallbackKind) -> bool {
        self.fallbacks.iter().any(|f| f.kind == kind)
    }
}

/// Confidence score: 90 for HIGH imagery, 75 for MEDIUM, otherwise 60,
/// minus 10 per fallback, never below 0.
pub fn confidence_score(quality: ImageryQuality, fallbacks: usize) -> u8 {
    let base: u8 = match quality {
        ImageryQuality::High => 90,
        ImageryQuality::Medium => 75,
        ImageryQuality::Low | ImageryQuality::Base => 60,
    };
    let penalty = fallbacks.saturating_mul(FALLBACK_CONFIDENCE_PENALTY as usize);
    base.saturating_sub(penalty.min(u8::MAX as usize) as u8)
}
