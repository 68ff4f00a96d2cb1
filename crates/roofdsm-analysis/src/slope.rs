//! Per-pixel slope and pitch from a roof height map.

use crate::height_map::HeightMap;
use crate::units::Degrees;
use statrs::statistics::{Data, Median, Statistics};
use tracing::debug;

/// Upper bound for a single pixel's pitch. Pitch is kept strictly below 90°.
pub const MAX_PITCH_DEGREES: f64 = 89.99;

/// Aggregate pitch over all pixels with a defined gradient.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PitchStats {
    pub mean_pitch: Degrees,
    pub median_pitch: Degrees,
    pub max_pitch: Degrees,
    /// Mean pitch weighted by each pixel's surface factor `1 / cos(pitch)`.
    pub weighted_mean_pitch: Degrees,
    /// Number of pixels with a defined gradient.
    pub valid_pixel_count: usize,
}

/// Slope magnitude and pitch per pixel, on the height map's grid.
///
/// Entries are NaN on the one-pixel border and wherever the pixel or any
/// of its four direct neighbours is NaN in the height map.
#[derive(Debug, Clone, PartialEq)]
pub struct SlopeField {
    slope_magnitude: Vec<f64>,
    pitch_degrees: Vec<f64>,
    width: u32,
    height: u32,
    stats: PitchStats,
}

impl SlopeField {
    /// Rise over run at each pixel.
    pub fn slope_magnitude(&self) -> &[f64] {
        &self.slope_magnitude
    }

    /// Pitch in degrees at each pixel.
    pub fn pitch_degrees(&self) -> &[f64] {
        &self.pitch_degrees
    }

    /// Pitch at pixel (x, y); NaN when undefined.
    pub fn pitch_at(&self, x: u32, y: u32) -> f64 {
        if x >= self.width || y >= self.height {
            return f64::NAN;
        }
        self.pitch_degrees[y as usize * self.width as usize + x as usize]
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stats(&self) -> PitchStats {
        self.stats
    }

    /// True when no pixel had a defined gradient. All aggregates are 0.
    pub fn is_empty(&self) -> bool {
        self.stats.valid_pixel_count == 0
    }
}

/// Compute central-difference slope over the interior of a height map.
///
/// `dz/dx = (east - west) / (2 * pixel)`, `dz/dy = (south - north) / (2 * pixel)`,
/// slope magnitude is the gradient norm and pitch is `atan(magnitude)`.
pub fn compute_slope(map: &HeightMap) -> SlopeField {
    let width = map.width();
    let height = map.height();
    let len = width as usize * height as usize;
    let pixel = map.pixel_size().value();

    let mut slope_magnitude = vec![f64::NAN; len];
    let mut pitch_degrees = vec![f64::NAN; len];
    let mut pitches = Vec::new();

    if width >= 3 && height >= 3 && pixel > 0.0 {
        for y in 1..height - 1 {
            for x in 1..width - 1 {
                let center = map.get(x, y);
                let west = map.get(x - 1, y);
                let east = map.get(x + 1, y);
                let north = map.get(x, y - 1);
                let south = map.get(x, y + 1);

                if ![center, west, east, north, south]
                    .iter()
                    .all(|v| v.is_finite())
                {
                    continue;
                }

                let dzdx = (east - west) / (2.0 * pixel);
                let dzdy = (south - north) / (2.0 * pixel);
                let magnitude = (dzdx * dzdx + dzdy * dzdy).sqrt();
                let pitch = magnitude.atan().to_degrees().clamp(0.0, MAX_PITCH_DEGREES);

                let idx = y as usize * width as usize + x as usize;
                slope_magnitude[idx] = magnitude;
                pitch_degrees[idx] = pitch;
                pitches.push(pitch);
            }
        }
    }

    let stats = aggregate(pitches);
    debug!(
        valid_pixels = stats.valid_pixel_count,
        mean_pitch = stats.mean_pitch.value(),
        weighted_mean_pitch = stats.weighted_mean_pitch.value(),
        "Computed slope field"
    );

    SlopeField {
        slope_magnitude,
        pitch_degrees,
        width,
        height,
        stats,
    }
}

fn aggregate(pitches: Vec<f64>) -> PitchStats {
    if pitches.is_empty() {
        return PitchStats::default();
    }

    let (weighted_sum, weight_total) = pitches.iter().fold((0.0, 0.0), |(sum, total), &p| {
        let weight = 1.0 / p.to_radians().cos();
        (sum + p * weight, total + weight)
    });

    let mean = Statistics::mean(pitches.iter());
    let max = Statistics::max(pitches.iter());
    let count = pitches.len();
    let median = Data::new(pitches).median();

    PitchStats {
        mean_pitch: Degrees(mean),
        median_pitch: Degrees(median),
        max_pitch: Degrees(max),
        weighted_mean_pitch: Degrees(weighted_sum / weight_total),
        valid_pixel_count: count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::height_map::RoofClassification;
    use crate::units::Meters;
    use approx::assert_relative_eq;

    fn plane(width: u32, height: u32, pixel: f64, rise_per_pixel_x: f64) -> HeightMap {
        let values = (0..height)
            .flat_map(|_| (0..width).map(move |x| 100.0 + x as f64 * rise_per_pixel_x))
            .collect();
        HeightMap::from_values(
            values,
            width,
            height,
            Meters(pixel),
            RoofClassification::Mask { resampled: false },
        )
    }

    #[test]
    fn test_flat_roof_has_zero_pitch() {
        let field = compute_slope(&plane(5, 5, 0.5, 0.0));
        let stats = field.stats();

        assert_eq!(stats.valid_pixel_count, 9);
        assert_eq!(stats.max_pitch, Degrees(0.0));
        assert_eq!(stats.weighted_mean_pitch, Degrees(0.0));
    }

    #[test]
    fn test_45_degree_plane() {
        // Rise of one pixel width per pixel
        let field = compute_slope(&plane(6, 4, 0.5, 0.5));
        let stats = field.stats();

        assert_eq!(stats.valid_pixel_count, 8);
        assert_relative_eq!(stats.mean_pitch.value(), 45.0, epsilon = 1e-9);
        assert_relative_eq!(stats.median_pitch.value(), 45.0, epsilon = 1e-9);
        assert_relative_eq!(stats.weighted_mean_pitch.value(), 45.0, epsilon = 1e-9);
        assert_relative_eq!(field.slope_magnitude()[6 + 1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_border_is_undefined() {
        let field = compute_slope(&plane(4, 4, 1.0, 1.0));
        assert!(field.pitch_at(0, 0).is_nan());
        assert!(field.pitch_at(3, 1).is_nan());
        assert!(field.pitch_at(1, 3).is_nan());
        assert!(field.pitch_at(1, 1).is_finite());
    }

    #[test]
    fn test_nan_neighbour_excludes_pixel() {
        let mut values = vec![10.0; 25];
        values[2 * 5 + 3] = f64::NAN;
        let map = HeightMap::from_values(
            values,
            5,
            5,
            Meters(1.0),
            RoofClassification::Mask { resampled: false },
        );

        let field = compute_slope(&map);
        // (2,2) has a NaN east neighbour, (3,2) is NaN itself, (3,1) and (3,3)
        // have a NaN neighbour
        assert!(field.pitch_at(2, 2).is_nan());
        assert!(field.pitch_at(3, 1).is_nan());
        assert!(field.pitch_at(3, 3).is_nan());
        assert!(field.pitch_at(1, 1).is_finite());
        assert_eq!(field.stats().valid_pixel_count, 5);
    }

    #[test]
    fn test_weighted_mean_favours_steeper_pixels() {
        let stats = aggregate(vec![0.0, 60.0]);
        // weights 1 and 2
        assert_relative_eq!(stats.mean_pitch.value(), 30.0);
        assert_relative_eq!(stats.weighted_mean_pitch.value(), 40.0, epsilon = 1e-9);
        assert_relative_eq!(stats.median_pitch.value(), 30.0);
    }

    #[test]
    fn test_empty_height_map_gives_empty_field() {
        let map = HeightMap::from_values(
            vec![f64::NAN; 16],
            4,
            4,
            Meters(0.5),
            RoofClassification::NoValidElevation,
        );
        let field = compute_slope(&map);

        assert!(field.is_empty());
        assert_eq!(field.stats(), PitchStats::default());
    }

    #[test]
    fn test_grid_too_small_for_interior() {
        let field = compute_slope(&plane(2, 5, 1.0, 1.0));
        assert!(field.is_empty());
        assert_eq!(field.pitch_degrees().len(), 10);
    }

    #[test]
    fn test_extreme_gradient_stays_below_90() {
        let field = compute_slope(&plane(3, 3, 1e-9, 1e9));
        assert!(field.stats().max_pitch.value() < 90.0);
    }
}
