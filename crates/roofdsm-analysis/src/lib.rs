//! # roofdsm-analysis
//!
//! Roof geometry from elevation rasters: height-map extraction, slope and
//! pitch estimation, and hybrid area reconciliation against an optional
//! building footprint.
//!
//! ## Features
//!
//! - **Height maps**: roof pixels selected by building mask (resampled to the
//!   elevation grid when needed) or by a ground-level heuristic
//! - **Slope**: central-difference gradient and per-pixel pitch with
//!   aggregate statistics
//! - **Reconciliation**: flat and true area, waste tier, pitch multiplier and
//!   material squares
//! - **Units**: meters, square meters/feet, degrees and radians as distinct types
//!
//! Every stage is pure. Insufficient data (no roof pixels, no gradient
//! samples) degrades to an empty result instead of an error.

mod footprint;
mod height_map;
mod reconcile;
mod slope;
mod units;

pub use footprint::{degrees_to_cardinal, FootprintError, FootprintSource, RoofSegment};
pub use height_map::{
    extract, resample_nearest, HeightMap, HeightStats, RoofClassification, GROUND_PERCENTILE,
    MIN_ROOF_CLEARANCE_M, ROOF_CLEARANCE_FRACTION,
};
pub use reconcile::{
    pitch_multiplier, pitch_ratio, reconcile, reconcile_with, segment_measurements,
    surface_factor, true_area, waste_factor, waste_table, AreaSource, PitchSource,
    ReconcileOptions, RoofAreaResult, SegmentMeasurement, WasteScenario, BUNDLES_PER_SQUARE,
    DEFAULT_PITCH_DISCREPANCY, LARGE_ROOF_WASTE_FACTOR, STANDARD_WASTE_FACTOR,
    WASTE_TIER_THRESHOLD_SQFT,
};
pub use slope::{compute_slope, PitchStats, SlopeField, MAX_PITCH_DEGREES};
pub use units::{Degrees, Meters, Radians, SquareFeet, SquareMeters, SQFT_PER_SQM};
