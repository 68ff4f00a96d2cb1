//! GeoTIFF decoding from in-memory bytes.

use crate::grid::{CrsKind, RasterBounds, RasterGrid, RasterKind};
use crate::{RasterError, Result};
use std::io::Cursor;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tracing::debug;

/// GeoKey id of `GTModelTypeGeoKey`.
const GT_MODEL_TYPE_GEO_KEY: u32 = 1024;
/// `GTModelTypeGeoKey` value for projected coordinate systems.
const MODEL_TYPE_PROJECTED: u32 = 1;
/// `GTModelTypeGeoKey` value for geographic coordinate systems.
const MODEL_TYPE_GEOGRAPHIC: u32 = 2;
/// `PlanarConfiguration` value for band-sequential (planar) storage.
const PLANAR_SEPARATE: u32 = 2;

/// Default pixel limit above which true-color imagery is not materialised.
pub const DEFAULT_MAX_TRUE_COLOR_PIXELS: u64 = 500 * 500;

/// Decodes GeoTIFF bytes into [`RasterGrid`]s.
#[derive(Debug, Clone)]
pub struct RasterDecoder {
    max_true_color_pixels: u64,
    max_buffer_bytes: usize,
}

impl Default for RasterDecoder {
    fn default() -> Self {
        Self {
            max_true_color_pixels: DEFAULT_MAX_TRUE_COLOR_PIXELS,
            // Single-property rasters are a few hundred pixels per side
            max_buffer_bytes: 256 * 1024 * 1024,
        }
    }
}

impl RasterDecoder {
    /// Create a decoder with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pixel count above which [`decode_preview`](Self::decode_preview)
    /// skips true-color imagery.
    pub fn with_max_true_color_pixels(mut self, max_pixels: u64) -> Self {
        self.max_true_color_pixels = max_pixels;
        self
    }

    /// Pixel limit for true-color previews.
    pub fn max_true_color_pixels(&self) -> u64 {
        self.max_true_color_pixels
    }

    /// Decode an elevation or mask raster (or a true-color raster, without
    /// any size limit).
    pub fn decode_grid(&self, bytes: &[u8], kind: RasterKind) -> Result<RasterGrid> {
        let mut decoder = self.open(bytes)?;
        let (width, height) = decoder.dimensions()?;
        self.read_grid(&mut decoder, width, height, kind)
    }

    /// Decode true-color imagery, returning `None` without reading pixel
    /// data when the image exceeds the configured pixel limit.
    pub fn decode_preview(&self, bytes: &[u8]) -> Result<Option<RasterGrid>> {
        let mut decoder = self.open(bytes)?;
        let (width, height) = decoder.dimensions()?;

        let pixels = width as u64 * height as u64;
        if pixels > self.max_true_color_pixels {
            debug!(
                width,
                height,
                limit = self.max_true_color_pixels,
                "Skipping true-color decode, image exceeds pixel limit"
            );
            return Ok(None);
        }

        self.read_grid(&mut decoder, width, height, RasterKind::TrueColor)
            .map(Some)
    }

    fn open<'a>(&self, bytes: &'a [u8]) -> Result<Decoder<Cursor<&'a [u8]>>> {
        let decoder = Decoder::new(Cursor::new(bytes))?;

        let mut limits = Limits::default();
        limits.decoding_buffer_size = self.max_buffer_bytes;
        limits.intermediate_buffer_size = self.max_buffer_bytes;
        limits.ifd_value_size = self.max_buffer_bytes;

        Ok(decoder.with_limits(limits))
    }

    fn read_grid(
        &self,
        decoder: &mut Decoder<Cursor<&[u8]>>,
        width: u32,
        height: u32,
        kind: RasterKind,
    ) -> Result<RasterGrid> {
        let (bounds, crs) = read_georeference(decoder, width, height)?;
        let no_data = read_nodata_value(decoder);
        let samples_per_pixel = decoder
            .get_tag_u32(Tag::SamplesPerPixel)
            .unwrap_or(1)
            .max(1) as usize;

        if samples_per_pixel < kind.min_bands() {
            return Err(RasterError::UnsupportedLayout(format!(
                "{} raster needs {} band(s), found {}",
                kind,
                kind.min_bands(),
                samples_per_pixel
            )));
        }

        // The tiff decoder only reads the first plane of separate-plane images
        if samples_per_pixel > 1
            && decoder.get_tag_u32(Tag::PlanarConfiguration).ok() == Some(PLANAR_SEPARATE)
        {
            return Err(RasterError::InvalidGeoTiff(
                "planar multi-band layout is not supported".to_string(),
            ));
        }

        let samples = decode_samples(decoder)?;
        let mut bands = deinterleave(samples, samples_per_pixel, width, height)?;

        if let Some(nodata) = no_data {
            for band in bands.iter_mut() {
                for value in band.iter_mut() {
                    if (*value - nodata).abs() < 0.001 {
                        *value = f32::NAN;
                    }
                }
            }
        }

        debug!(
            kind = kind.as_str(),
            width,
            height,
            bands = bands.len(),
            ?crs,
            "Decoded raster"
        );

        RasterGrid::new(width, height, bands, bounds, crs)
    }
}

/// Read bounds from ModelTiepoint (33922) and ModelPixelScale (33550), and
/// the coordinate family from the GeoKey directory.
fn read_georeference(
    decoder: &mut Decoder<Cursor<&[u8]>>,
    width: u32,
    height: u32,
) -> Result<(RasterBounds, CrsKind)> {
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::ModelTiepointTag)
        .map_err(|_| RasterError::InvalidGeoTiff("missing ModelTiepoint tag".to_string()))?;
    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .map_err(|_| RasterError::InvalidGeoTiff("missing ModelPixelScale tag".to_string()))?;

    if tiepoint.len() < 6 || scale.len() < 2 {
        return Err(RasterError::InvalidGeoTiff(format!(
            "malformed tiepoint ({} values) or pixel scale ({} values)",
            tiepoint.len(),
            scale.len()
        )));
    }

    // Tiepoint format: [i, j, k, x, y, z]; (i, j) is the raster position of (x, y)
    let (tie_i, tie_j) = (tiepoint[0], tiepoint[1]);
    let scale_x = scale[0];
    let scale_y = scale[1];
    let west = tiepoint[3] - tie_i * scale_x;
    let north = tiepoint[4] + tie_j * scale_y;

    let bounds = RasterBounds {
        north,
        south: north - height as f64 * scale_y,
        west,
        east: west + width as f64 * scale_x,
    };

    let crs = match read_model_type(decoder) {
        Some(MODEL_TYPE_GEOGRAPHIC) => CrsKind::Geographic,
        Some(MODEL_TYPE_PROJECTED) => CrsKind::Projected,
        _ if bounds.looks_geographic() => CrsKind::Geographic,
        _ => CrsKind::Projected,
    };

    Ok((bounds, crs))
}

/// Look up `GTModelTypeGeoKey` in the GeoKey directory.
///
/// Directory layout: a 4-value header `[version, revision, minor, count]`
/// followed by `count` entries of `[key, location, count, value]`.
fn read_model_type(decoder: &mut Decoder<Cursor<&[u8]>>) -> Option<u32> {
    let directory = decoder.get_tag_u32_vec(Tag::GeoKeyDirectoryTag).ok()?;
    if directory.len() < 4 {
        return None;
    }
    directory[4..]
        .chunks_exact(4)
        .find(|entry| entry[0] == GT_MODEL_TYPE_GEO_KEY && entry[1] == 0)
        .map(|entry| entry[3])
}

/// Read the GDAL_NODATA tag (42113), stored as an ASCII string.
fn read_nodata_value(decoder: &mut Decoder<Cursor<&[u8]>>) -> Option<f32> {
    decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()
        .and_then(|s| s.trim().trim_end_matches('\0').parse().ok())
}

fn decode_samples(decoder: &mut Decoder<Cursor<&[u8]>>) -> Result<Vec<f32>> {
    let result = decoder.read_image()?;

    Ok(match result {
        DecodingResult::F32(data) => data,
        DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f32).collect(),
    })
}

/// Split chunky (pixel-interleaved) samples into one vector per band.
fn deinterleave(
    samples: Vec<f32>,
    samples_per_pixel: usize,
    width: u32,
    height: u32,
) -> Result<Vec<Vec<f32>>> {
    let pixels = width as usize * height as usize;
    let expected = pixels * samples_per_pixel;
    if samples.len() != expected {
        return Err(RasterError::DimensionMismatch {
            band: 0,
            actual: samples.len(),
            expected,
            width,
            height,
        });
    }

    if samples_per_pixel == 1 {
        return Ok(vec![samples]);
    }

    let mut bands = vec![Vec::with_capacity(pixels); samples_per_pixel];
    for pixel in samples.chunks_exact(samples_per_pixel) {
        for (band, &value) in bands.iter_mut().zip(pixel) {
            band.push(value);
        }
    }
    Ok(bands)
}
