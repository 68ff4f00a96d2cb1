//! Hybrid area reconciliation.
//!
//! Combines the footprint source (when available) with the raster-derived
//! height map and slope field into one [`RoofAreaResult`]. Every branch has a
//! defined fallback, so reconciliation never fails; insufficient input shows
//! up as a result for which [`RoofAreaResult::is_unavailable`] holds.

use crate::footprint::{degrees_to_cardinal, FootprintSource};
use crate::height_map::HeightMap;
use crate::slope::SlopeField;
use crate::units::{Degrees, Meters, SquareFeet, SquareMeters};
use tracing::{debug, warn};

/// True area above which the higher waste tier applies.
pub const WASTE_TIER_THRESHOLD_SQFT: f64 = 2000.0;

/// Waste factor for roofs up to [`WASTE_TIER_THRESHOLD_SQFT`].
pub const STANDARD_WASTE_FACTOR: f64 = 1.05;

/// Waste factor for roofs larger than [`WASTE_TIER_THRESHOLD_SQFT`].
pub const LARGE_ROOF_WASTE_FACTOR: f64 = 1.15;

/// Default difference between footprint and gradient pitch that gets logged.
pub const DEFAULT_PITCH_DISCREPANCY: Degrees = Degrees(10.0);

/// Shingle bundles per roofing square.
pub const BUNDLES_PER_SQUARE: f64 = 3.0;

/// Where the flat area came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AreaSource {
    Footprint,
    PixelCount,
}

/// Where the pitch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PitchSource {
    FootprintSegments,
    RasterGradient,
    /// Neither source had data; pitch is taken as 0.
    Unavailable,
}

/// Tunables for [`reconcile_with`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcileOptions {
    /// Footprint and gradient pitches further apart than this are logged.
    pub pitch_discrepancy_threshold: Degrees,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            pitch_discrepancy_threshold: DEFAULT_PITCH_DISCREPANCY,
        }
    }
}

/// Reconciled roof area and material quantity.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoofAreaResult {
    pub flat_area_sqm: SquareMeters,
    pub flat_area_sqft: SquareFeet,
    pub true_area_sqm: SquareMeters,
    pub true_area_sqft: SquareFeet,
    /// `true_area / flat_area`, or 1.0 when the flat area is zero.
    pub area_multiplier: f64,
    pub avg_pitch: Degrees,
    /// Rise per 12 units of run, e.g. `"6.0:12"`.
    pub pitch_ratio: String,
    pub waste_factor: f64,
    pub pitch_multiplier: f64,
    pub material_area_sqft: SquareFeet,
    pub material_squares: f64,
    pub flat_area_source: AreaSource,
    pub pitch_source: PitchSource,
    /// Footprint pitch minus gradient pitch, when both were available.
    pub pitch_discrepancy: Option<Degrees>,
}

impl RoofAreaResult {
    /// No measurable roof: zero flat area and a unit multiplier.
    pub fn is_unavailable(&self) -> bool {
        self.flat_area_sqm.value() == 0.0 && self.area_multiplier == 1.0
    }
}

/// One row of the waste comparison table.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WasteScenario {
    pub waste_pct: u32,
    pub factor: f64,
    pub description: String,
    /// Gross area rounded to whole square feet.
    pub gross_sqft: f64,
    /// Roofing squares rounded to one decimal.
    pub squares: f64,
    pub bundles: u32,
}

/// Measurements of one footprint segment.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SegmentMeasurement {
    /// 1-based position in the footprint.
    pub index: usize,
    pub flat_area_sqm: SquareMeters,
    pub flat_area_sqft: SquareFeet,
    pub true_area_sqm: SquareMeters,
    pub true_area_sqft: SquareFeet,
    pub pitch: Degrees,
    pub pitch_ratio: String,
    pub pitch_multiplier: f64,
    pub azimuth: Option<Degrees>,
    /// 16-point compass label of the azimuth.
    pub direction: Option<String>,
    pub plane_height: Option<Meters>,
}

const WASTE_SCENARIOS: [(u32, f64, &str); 4] = [
    (5, 1.05, "Minimal waste (simple gable)"),
    (10, 1.10, "Standard waste (moderate complexity)"),
    (15, 1.15, "Above average (hips/valleys)"),
    (20, 1.20, "High waste (complex/cut-up roof)"),
];

/// Whether a pitch is outside the open interval (0°, 90°).
fn is_degenerate(pitch: Degrees) -> bool {
    let p = pitch.value();
    !(p > 0.0 && p < 90.0) || pitch.to_radians().cos() <= 0.0
}

/// Ratio of sloped surface area to plan area, `1 / cos(pitch)`.
///
/// Exactly 1.0 for degenerate pitches (≤ 0°, ≥ 90°, or non-finite).
pub fn surface_factor(pitch: Degrees) -> f64 {
    if is_degenerate(pitch) {
        1.0
    } else {
        1.0 / pitch.to_radians().cos()
    }
}

/// Sloped surface area for a plan area at the given pitch.
pub fn true_area(flat: SquareMeters, pitch: Degrees) -> SquareMeters {
    if is_degenerate(pitch) {
        flat
    } else {
        flat / pitch.to_radians().cos()
    }
}

/// Tiered waste factor: 1.15 above 2000 sq ft, otherwise 1.05.
pub fn waste_factor(true_area: SquareFeet) -> f64 {
    if true_area.value() > WASTE_TIER_THRESHOLD_SQFT {
        LARGE_ROOF_WASTE_FACTOR
    } else {
        STANDARD_WASTE_FACTOR
    }
}

/// `sqrt(1 + (pitch / 45)^2)`.
pub fn pitch_multiplier(pitch: Degrees) -> f64 {
    let ratio = pitch.value() / 45.0;
    (1.0 + ratio * ratio).sqrt()
}

/// Rise-per-12 label rounded to one decimal; `"0:12"` when degenerate.
pub fn pitch_ratio(pitch: Degrees) -> String {
    if is_degenerate(pitch) {
        return "0:12".to_string();
    }
    let rise = 12.0 * pitch.to_radians().tan();
    format!("{:.1}:12", (rise * 10.0).round() / 10.0)
}

/// Material comparison at 5, 10, 15 and 20 % overage.
pub fn waste_table(true_area: SquareFeet) -> Vec<WasteScenario> {
    WASTE_SCENARIOS
        .iter()
        .map(|&(waste_pct, factor, description)| {
            let gross = true_area * factor;
            let squares = gross.squares();
            WasteScenario {
                waste_pct,
                factor,
                description: description.to_string(),
                gross_sqft: gross.value().round(),
                squares: (squares * 10.0).round() / 10.0,
                bundles: (squares * BUNDLES_PER_SQUARE).ceil().max(0.0) as u32,
            }
        })
        .collect()
}

/// Per-segment flat and true area, pitch label and facing.
pub fn segment_measurements(footprint: &FootprintSource) -> Vec<SegmentMeasurement> {
    footprint
        .segments()
        .iter()
        .enumerate()
        .map(|(i, segment)| {
            let true_area_sqm = true_area(segment.area, segment.pitch);
            SegmentMeasurement {
                index: i + 1,
                flat_area_sqm: segment.area,
                flat_area_sqft: segment.area.to_square_feet(),
                true_area_sqm,
                true_area_sqft: true_area_sqm.to_square_feet(),
                pitch: segment.pitch,
                pitch_ratio: pitch_ratio(segment.pitch),
                pitch_multiplier: pitch_multiplier(segment.pitch),
                azimuth: segment.azimuth,
                direction: segment
                    .azimuth
                    .map(|az| degrees_to_cardinal(az).to_string()),
                plane_height: segment.plane_height,
            }
        })
        .collect()
}

/// Reconcile with default options.
pub fn reconcile(
    height: &HeightMap,
    slope: &SlopeField,
    footprint: Option<&FootprintSource>,
) -> RoofAreaResult {
    reconcile_with(height, slope, footprint, &ReconcileOptions::default())
}

/// Combine footprint and raster measurements into a [`RoofAreaResult`].
///
/// The footprint area is preferred over the pixel-count area, and the
/// footprint's area-weighted segment pitch over the gradient pitch. When
/// both pitches exist and disagree by more than the configured threshold,
/// a warning is logged and the footprint pitch is still used.
pub fn reconcile_with(
    height: &HeightMap,
    slope: &SlopeField,
    footprint: Option<&FootprintSource>,
    options: &ReconcileOptions,
) -> RoofAreaResult {
    let (flat_area_sqm, flat_area_source) = match footprint {
        Some(fp) => (fp.area(), AreaSource::Footprint),
        None => (height.roof_area(), AreaSource::PixelCount),
    };

    let gradient_pitch = (!slope.is_empty()).then(|| slope.stats().weighted_mean_pitch);
    let segment_pitch = footprint.and_then(FootprintSource::weighted_pitch);

    let pitch_discrepancy = match (segment_pitch, gradient_pitch) {
        (Some(segment), Some(gradient)) => {
            let diff = Degrees(segment.value() - gradient.value());
            if diff.value().abs() > options.pitch_discrepancy_threshold.value() {
                warn!(
                    footprint_pitch = segment.value(),
                    gradient_pitch = gradient.value(),
                    "Footprint and raster pitch disagree; using footprint pitch"
                );
            }
            Some(diff)
        }
        _ => None,
    };

    let (avg_pitch, pitch_source) = match (segment_pitch, gradient_pitch) {
        (Some(p), _) => (p, PitchSource::FootprintSegments),
        (None, Some(p)) => (p, PitchSource::RasterGradient),
        (None, None) => (Degrees(0.0), PitchSource::Unavailable),
    };

    let true_area_sqm = true_area(flat_area_sqm, avg_pitch);
    let area_multiplier = if flat_area_sqm.value() > 0.0 {
        true_area_sqm.value() / flat_area_sqm.value()
    } else {
        1.0
    };

    let flat_area_sqft = flat_area_sqm.to_square_feet();
    let true_area_sqft = true_area_sqm.to_square_feet();
    let waste_factor = waste_factor(true_area_sqft);
    let pitch_multiplier = pitch_multiplier(avg_pitch);
    let material_area_sqft = true_area_sqft * waste_factor * pitch_multiplier;

    let result = RoofAreaResult {
        flat_area_sqm,
        flat_area_sqft,
        true_area_sqm,
        true_area_sqft,
        area_multiplier,
        avg_pitch,
        pitch_ratio: pitch_ratio(avg_pitch),
        waste_factor,
        pitch_multiplier,
        material_area_sqft,
        material_squares: material_area_sqft.squares(),
        flat_area_source,
        pitch_source,
        pitch_discrepancy,
    };

    debug!(
        flat_sqft = result.flat_area_sqft.value(),
        true_sqft = result.true_area_sqft.value(),
        pitch = result.avg_pitch.value(),
        ?flat_area_source,
        ?pitch_source,
        "Reconciled roof area"
    );

    result
}
