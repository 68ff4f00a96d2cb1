//! Roof height-map extraction from a digital surface model.
//!
//! A DSM includes terrain, vegetation and structures. Extraction keeps only
//! pixels classified as roof, either by a building mask or, when no mask is
//! available, by a statistical ground-level threshold. Every other pixel is
//! stored as NaN and never takes part in area or slope aggregation.

use crate::units::{Meters, SquareMeters};
use roofdsm_raster::RasterGrid;
use statrs::statistics::{Data, OrderStatistics, Statistics};
use std::borrow::Cow;
use tracing::debug;

/// Percentile of positive elevations taken as ground level.
pub const GROUND_PERCENTILE: usize = 10;

/// Minimum height above ground for a pixel to count as roof.
pub const MIN_ROOF_CLEARANCE_M: f64 = 2.5;

/// Fraction of the ground-to-peak range used as roof clearance when that
/// exceeds [`MIN_ROOF_CLEARANCE_M`].
pub const ROOF_CLEARANCE_FRACTION: f64 = 0.3;

/// How roof pixels were selected.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "method", rename_all = "snake_case"))]
pub enum RoofClassification {
    /// Pixels flagged by a building mask (value > 0).
    Mask {
        /// Whether the mask had to be resampled to the elevation grid.
        resampled: bool,
    },
    /// Pixels higher than a threshold above the estimated ground level.
    GroundHeuristic {
        /// Estimated ground elevation (10th percentile of positive heights).
        ground_level: Meters,
        /// Elevation a pixel must exceed to be classified as roof.
        roof_threshold: Meters,
    },
    /// No mask and no finite positive elevations to estimate ground from.
    NoValidElevation,
}

/// Summary statistics over the roof pixels of a height map.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HeightStats {
    /// Lowest roof elevation (0 when there are no roof pixels).
    pub min_height: Meters,
    /// Highest roof elevation (0 when there are no roof pixels).
    pub max_height: Meters,
    /// Mean roof elevation (0 when there are no roof pixels).
    pub mean_height: Meters,
    /// Number of roof pixels.
    pub valid_pixel_count: usize,
}

/// Roof heights on the elevation raster's grid. NaN marks non-roof pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightMap {
    values: Vec<f64>,
    width: u32,
    height: u32,
    pixel_size: Meters,
    stats: HeightStats,
    classification: RoofClassification,
}

impl HeightMap {
    /// Build a height map directly from values on a grid.
    ///
    /// Non-finite and negative values are normalised to NaN, and the
    /// statistics are computed from what remains. `values` must hold
    /// `width * height` entries; missing entries are treated as NaN and
    /// extra entries are dropped.
    pub fn from_values(
        mut values: Vec<f64>,
        width: u32,
        height: u32,
        pixel_size: Meters,
        classification: RoofClassification,
    ) -> Self {
        values.resize(width as usize * height as usize, f64::NAN);
        for v in values.iter_mut() {
            if !is_valid_elevation(*v) {
                *v = f64::NAN;
            }
        }
        let stats = compute_stats(&values);

        Self {
            values,
            width,
            height,
            pixel_size,
            stats,
            classification,
        }
    }

    /// Row-major roof heights.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Height at pixel (x, y); NaN for non-roof or out of range.
    pub fn get(&self, x: u32, y: u32) -> f64 {
        if x >= self.width || y >= self.height {
            return f64::NAN;
        }
        self.values[y as usize * self.width as usize + x as usize]
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Ground size of one pixel.
    pub fn pixel_size(&self) -> Meters {
        self.pixel_size
    }

    /// Summary statistics.
    pub fn stats(&self) -> HeightStats {
        self.stats
    }

    /// Number of roof pixels.
    pub fn valid_pixel_count(&self) -> usize {
        self.stats.valid_pixel_count
    }

    /// How roof pixels were selected.
    pub fn classification(&self) -> RoofClassification {
        self.classification
    }

    /// Flat (plan-view) area covered by roof pixels.
    pub fn roof_area(&self) -> SquareMeters {
        self.pixel_size.squared() * self.stats.valid_pixel_count as f64
    }

    /// True when no pixel was classified as roof.
    pub fn is_empty(&self) -> bool {
        self.stats.valid_pixel_count == 0
    }
}

/// Extract a roof height map from an elevation raster and an optional mask.
///
/// The mask is resampled (nearest neighbour) to the elevation grid when
/// their dimensions differ; the elevation grid is never resampled because
/// its resolution is what area math is based on. Zero roof pixels is not an
/// error: the result simply has `valid_pixel_count == 0`.
pub fn extract(elevation: &RasterGrid, mask: Option<&RasterGrid>) -> HeightMap {
    let (width, height) = elevation.dimensions();
    let pixel_size = Meters(elevation.pixel_size_meters());
    let heights = elevation.band(0).unwrap_or(&[]);

    let mask_band = mask.and_then(|m| {
        let band = m.band(0)?;
        if m.dimensions() == (width, height) {
            Some((Cow::Borrowed(band), false))
        } else {
            debug!(
                from = ?m.dimensions(),
                to = ?(width, height),
                "Resampling mask to elevation grid"
            );
            let (mw, mh) = m.dimensions();
            Some((Cow::Owned(resample_nearest(band, mw, mh, width, height)), true))
        }
    });

    let (values, classification) = match mask_band {
        Some((mask, resampled)) => {
            let values = heights
                .iter()
                .zip(mask.iter())
                .map(|(&h, &m)| {
                    let h = h as f64;
                    if m > 0.0 && is_valid_elevation(h) {
                        h
                    } else {
                        f64::NAN
                    }
                })
                .collect();
            (values, RoofClassification::Mask { resampled })
        }
        None => classify_by_ground_level(heights),
    };

    let map = HeightMap::from_values(values, width, height, pixel_size, classification);
    debug!(
        valid_pixels = map.valid_pixel_count(),
        total_pixels = elevation.pixel_count(),
        ?classification,
        "Extracted roof height map"
    );
    map
}

/// Resample a single band to new dimensions by nearest neighbour.
///
/// Source coordinates use truncating integer division,
/// `src = dst * src_dim / dst_dim`, so non-integer ratios always map to the
/// source pixel whose span contains the destination pixel's top-left corner.
/// No interpolation: every output value is a copy of one source value.
pub fn resample_nearest(
    src: &[f32],
    src_width: u32,
    src_height: u32,
    dst_width: u32,
    dst_height: u32,
) -> Vec<f32> {
    let (sw, sh) = (src_width as u64, src_height as u64);
    let (dw, dh) = (dst_width as u64, dst_height as u64);
    let mut out = Vec::with_capacity((dw * dh) as usize);

    for y in 0..dh {
        let sy = (y * sh / dh).min(sh.saturating_sub(1));
        for x in 0..dw {
            let sx = (x * sw / dw).min(sw.saturating_sub(1));
            let idx = (sy * sw + sx) as usize;
            out.push(src.get(idx).copied().unwrap_or(f32::NAN));
        }
    }

    out
}

/// Classify roof pixels without a mask.
///
/// Ground is the 10th percentile of finite positive elevations; roof pixels
/// exceed `ground + max(2.5 m, 0.3 * (max - ground))`.
fn classify_by_ground_level(heights: &[f32]) -> (Vec<f64>, RoofClassification) {
    let positives: Vec<f64> = heights
        .iter()
        .map(|&h| h as f64)
        .filter(|h| h.is_finite() && *h > 0.0)
        .collect();

    if positives.is_empty() {
        return (
            vec![f64::NAN; heights.len()],
            RoofClassification::NoValidElevation,
        );
    }

    let max_elevation = Statistics::max(positives.iter());
    let mut data = Data::new(positives);
    let ground_level = data.percentile(GROUND_PERCENTILE);
    let clearance =
        MIN_ROOF_CLEARANCE_M.max(ROOF_CLEARANCE_FRACTION * (max_elevation - ground_level));
    let roof_threshold = ground_level + clearance;

    debug!(ground_level, roof_threshold, max_elevation, "Estimated ground level");

    let values = heights
        .iter()
        .map(|&h| {
            let h = h as f64;
            if is_valid_elevation(h) && h > roof_threshold {
                h
            } else {
                f64::NAN
            }
        })
        .collect();

    (
        values,
        RoofClassification::GroundHeuristic {
            ground_level: Meters(ground_level),
            roof_threshold: Meters(roof_threshold),
        },
    )
}

fn is_valid_elevation(h: f64) -> bool {
    h.is_finite() && h >= 0.0
}

fn compute_stats(values: &[f64]) -> HeightStats {
    let valid: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if valid.is_empty() {
        return HeightStats::default();
    }

    HeightStats {
        min_height: Meters(Statistics::min(valid.iter())),
        max_height: Meters(Statistics::max(valid.iter())),
        mean_height: Meters(Statistics::mean(valid.iter())),
        valid_pixel_count: valid.len(),
    }
}
