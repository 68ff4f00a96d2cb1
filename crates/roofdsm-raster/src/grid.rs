//! Decoded raster grid representation.

use crate::{RasterError, Result};

/// Meters per degree of latitude (and of longitude at the equator).
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// What a raster is used for. Determines how many bands decoding requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RasterKind {
    /// Digital surface model, one band of heights in meters.
    Elevation,
    /// Building mask, one band where values > 0 flag roof pixels.
    Mask,
    /// RGB imagery, three bands.
    TrueColor,
}

impl RasterKind {
    /// Minimum number of bands a raster of this kind must carry.
    pub fn min_bands(&self) -> usize {
        match self {
            RasterKind::Elevation | RasterKind::Mask => 1,
            RasterKind::TrueColor => 3,
        }
    }

    /// Short lowercase name used in logs and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            RasterKind::Elevation => "elevation",
            RasterKind::Mask => "mask",
            RasterKind::TrueColor => "true_color",
        }
    }
}

impl std::fmt::Display for RasterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coordinate reference family of a raster's bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrsKind {
    /// Projected coordinates in meters (e.g. UTM).
    Projected,
    /// Geographic coordinates in decimal degrees.
    Geographic,
}

/// Bounds of a raster in its native coordinate reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterBounds {
    /// Northern edge (max y).
    pub north: f64,
    /// Southern edge (min y).
    pub south: f64,
    /// Eastern edge (max x).
    pub east: f64,
    /// Western edge (min x).
    pub west: f64,
}

impl RasterBounds {
    /// Extent along the x axis.
    pub fn x_span(&self) -> f64 {
        self.east - self.west
    }

    /// Extent along the y axis.
    pub fn y_span(&self) -> f64 {
        self.north - self.south
    }

    /// Centre of the bounds as (x, y).
    pub fn center(&self) -> (f64, f64) {
        ((self.west + self.east) / 2.0, (self.south + self.north) / 2.0)
    }

    /// Whether every edge fits within longitude/latitude ranges.
    pub fn looks_geographic(&self) -> bool {
        [self.west, self.east].iter().all(|x| x.abs() <= 180.0)
            && [self.south, self.north].iter().all(|y| y.abs() <= 90.0)
    }

    /// Ground resolution in meters per pixel for a grid of the given size.
    ///
    /// The resolution is derived from the bounding box, not from the pixel
    /// scale tag, and is the mean of the x and y resolutions. Geographic
    /// bounds are converted at the centre latitude.
    pub fn pixel_size_meters(&self, width: u32, height: u32, crs: CrsKind) -> f64 {
        let res_x = self.x_span().abs() / width.max(1) as f64;
        let res_y = self.y_span().abs() / height.max(1) as f64;

        match crs {
            CrsKind::Projected => (res_x + res_y) / 2.0,
            CrsKind::Geographic => {
                // Longitude shrinks by cos(latitude)
                let (_, center_lat) = self.center();
                let meters_x = res_x * METERS_PER_DEGREE * center_lat.to_radians().cos();
                let meters_y = res_y * METERS_PER_DEGREE;
                (meters_x + meters_y) / 2.0
            }
        }
    }
}

/// A decoded raster: one or more bands of samples in row-major order
/// (north to south, west to east).
///
/// Immutable once constructed. No-data samples are stored as NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterGrid {
    width: u32,
    height: u32,
    bands: Vec<Vec<f32>>,
    bounds: RasterBounds,
    crs: CrsKind,
    pixel_size_meters: f64,
}

impl RasterGrid {
    /// Build a grid, checking that every band holds `width * height` samples.
    ///
    /// The pixel size is derived from `bounds` (see
    /// [`RasterBounds::pixel_size_meters`]).
    pub fn new(
        width: u32,
        height: u32,
        bands: Vec<Vec<f32>>,
        bounds: RasterBounds,
        crs: CrsKind,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(RasterError::UnsupportedLayout(format!(
                "empty raster ({}x{})",
                width, height
            )));
        }
        if bands.is_empty() {
            return Err(RasterError::UnsupportedLayout("raster has no bands".to_string()));
        }

        let expected = width as usize * height as usize;
        for (band, data) in bands.iter().enumerate() {
            if data.len() != expected {
                return Err(RasterError::DimensionMismatch {
                    band,
                    actual: data.len(),
                    expected,
                    width,
                    height,
                });
            }
        }

        let pixel_size_meters = bounds.pixel_size_meters(width, height, crs);
        if !pixel_size_meters.is_finite() || pixel_size_meters <= 0.0 {
            return Err(RasterError::InvalidGeoTiff(format!(
                "degenerate bounds {:?} give pixel size {}",
                bounds, pixel_size_meters
            )));
        }

        Ok(Self {
            width,
            height,
            bands,
            bounds,
            crs,
            pixel_size_meters,
        })
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Dimensions as (width, height).
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of pixels per band.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Number of bands.
    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// Samples of one band, if present.
    pub fn band(&self, index: usize) -> Option<&[f32]> {
        self.bands.get(index).map(Vec::as_slice)
    }

    /// All bands.
    pub fn bands(&self) -> &[Vec<f32>] {
        &self.bands
    }

    /// Sample at pixel (x, y) of a band.
    pub fn value(&self, band: usize, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y as usize * self.width as usize + x as usize;
        self.bands.get(band).map(|b| b[idx])
    }

    /// Geographic bounds.
    pub fn bounds(&self) -> RasterBounds {
        self.bounds
    }

    /// Coordinate reference family of the bounds.
    pub fn crs(&self) -> CrsKind {
        self.crs
    }

    /// Ground size of one pixel in meters.
    pub fn pixel_size_meters(&self) -> f64 {
        self.pixel_size_meters
    }
}
