//! Building footprint from an external building-insights source.
//!
//! A footprint is optional input to reconciliation. When present its area is
//! authoritative for the flat roof area and its per-segment pitches are
//! preferred over the raster gradient.

use crate::units::{Degrees, Meters, SquareMeters};
use thiserror::Error;

/// Validation errors for footprint input.
#[derive(Debug, Error, PartialEq)]
pub enum FootprintError {
    #[error("Footprint area must be finite and non-negative, got {0}")]
    InvalidArea(f64),

    #[error("Segment {index}: area must be finite and non-negative, got {area}")]
    InvalidSegmentArea { index: usize, area: f64 },

    #[error("Segment {index}: pitch must be in [0, 90) degrees, got {pitch}")]
    InvalidSegmentPitch { index: usize, pitch: f64 },
}

/// One planar roof segment.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoofSegment {
    /// Plan-view area of the segment.
    pub area: SquareMeters,
    /// Slope from horizontal.
    pub pitch: Degrees,
    /// Compass direction the segment faces, when known.
    pub azimuth: Option<Degrees>,
    /// Height of the plane at its centre.
    pub plane_height: Option<Meters>,
}

impl RoofSegment {
    pub fn new(area: SquareMeters, pitch: Degrees) -> Self {
        Self {
            area,
            pitch,
            azimuth: None,
            plane_height: None,
        }
    }

    pub fn with_azimuth(mut self, azimuth: Degrees) -> Self {
        self.azimuth = Some(azimuth);
        self
    }

    pub fn with_plane_height(mut self, height: Meters) -> Self {
        self.plane_height = Some(height);
        self
    }
}

/// Authoritative building area and per-segment pitch.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FootprintSource {
    area: SquareMeters,
    segments: Vec<RoofSegment>,
}

impl FootprintSource {
    /// Build a footprint, validating the area and every segment.
    pub fn new(area: SquareMeters, segments: Vec<RoofSegment>) -> Result<Self, FootprintError> {
        if !area.value().is_finite() || area.value() < 0.0 {
            return Err(FootprintError::InvalidArea(area.value()));
        }

        for (index, segment) in segments.iter().enumerate() {
            let a = segment.area.value();
            if !a.is_finite() || a < 0.0 {
                return Err(FootprintError::InvalidSegmentArea { index, area: a });
            }
            let p = segment.pitch.value();
            if !(0.0..90.0).contains(&p) {
                return Err(FootprintError::InvalidSegmentPitch { index, pitch: p });
            }
        }

        Ok(Self { area, segments })
    }

    /// Footprint whose area is the sum of its segment areas.
    pub fn from_segments(segments: Vec<RoofSegment>) -> Result<Self, FootprintError> {
        let area = segments.iter().map(|s| s.area).sum();
        Self::new(area, segments)
    }

    pub fn area(&self) -> SquareMeters {
        self.area
    }

    pub fn segments(&self) -> &[RoofSegment] {
        &self.segments
    }

    /// Area-weighted mean pitch, `Σ(pitch × area) / Σ(area)`.
    ///
    /// `None` when there are no segments or their total area is zero.
    pub fn weighted_pitch(&self) -> Option<Degrees> {
        let total: f64 = self.segments.iter().map(|s| s.area.value()).sum();
        if total <= 0.0 {
            return None;
        }

        let weighted: f64 = self
            .segments
            .iter()
            .map(|s| s.pitch.value() * s.area.value())
            .sum();
        Some(Degrees(weighted / total))
    }

    /// Azimuth of the largest segment that reports one.
    pub fn dominant_azimuth(&self) -> Option<Degrees> {
        self.segments
            .iter()
            .filter_map(|s| s.azimuth.map(|az| (s.area, az)))
            .max_by(|a, b| a.0.value().total_cmp(&b.0.value()))
            .map(|(_, az)| az)
    }
}

const COMPASS_POINTS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

/// 16-point compass label for a bearing. Any finite value is normalised to
/// [0, 360); non-finite input maps to "N".
pub fn degrees_to_cardinal(bearing: Degrees) -> &'static str {
    let deg = bearing.value();
    if !deg.is_finite() {
        return COMPASS_POINTS[0];
    }
    let normalized = deg.rem_euclid(360.0);
    let index = (normalized / 22.5).round() as usize % COMPASS_POINTS.len();
    COMPASS_POINTS[index]
}
