//! GeoTIFF encoding of raster grids.
//!
//! Used to persist intermediate rasters for inspection and to build
//! fixtures; the written file decodes back to the same bounds and pixel size.

use crate::grid::{CrsKind, RasterGrid};
use crate::{RasterError, Result};
use std::io::Cursor;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

/// Value written into the GDAL_NODATA tag; NaN samples are replaced by it.
pub const NODATA_VALUE: f32 = -9999.0;

/// Encode a grid as a GeoTIFF.
///
/// One-band grids are written as 32-bit float, three-band grids as 8-bit
/// RGB (samples clamped to 0..=255). Other band counts are rejected.
pub fn encode_geotiff(grid: &RasterGrid) -> Result<Vec<u8>> {
    let (width, height) = grid.dimensions();
    let bounds = grid.bounds();
    let scale = [
        bounds.x_span() / width as f64,
        bounds.y_span() / height as f64,
        0.0,
    ];
    let tiepoint = [0.0, 0.0, 0.0, bounds.west, bounds.north, 0.0];
    let model_type: u16 = match grid.crs() {
        CrsKind::Projected => 1,
        CrsKind::Geographic => 2,
    };
    // Header [version, revision, minor, count] then [key, location, count, value]
    let geo_keys: [u16; 8] = [1, 1, 0, 1, 1024, 0, 1, model_type];
    let nodata = format!("{}", NODATA_VALUE);

    let mut buffer = Cursor::new(Vec::new());
    {
        let mut tiff = TiffEncoder::new(&mut buffer)?;

        match grid.band_count() {
            1 => {
                let data: Vec<f32> = grid.bands()[0]
                    .iter()
                    .map(|v| if v.is_finite() { *v } else { NODATA_VALUE })
                    .collect();
                let mut image = tiff.new_image::<colortype::Gray32Float>(width, height)?;
                image.encoder().write_tag(Tag::ModelPixelScaleTag, &scale[..])?;
                image.encoder().write_tag(Tag::ModelTiepointTag, &tiepoint[..])?;
                image.encoder().write_tag(Tag::GeoKeyDirectoryTag, &geo_keys[..])?;
                image.encoder().write_tag(Tag::GdalNodata, nodata.as_str())?;
                image.write_data(&data)?;
            }
            3 => {
                let bands = grid.bands();
                let mut data = Vec::with_capacity(grid.pixel_count() * 3);
                for i in 0..grid.pixel_count() {
                    for band in bands {
                        data.push(band[i].clamp(0.0, 255.0) as u8);
                    }
                }
                let mut image = tiff.new_image::<colortype::RGB8>(width, height)?;
                image.encoder().write_tag(Tag::ModelPixelScaleTag, &scale[..])?;
                image.encoder().write_tag(Tag::ModelTiepointTag, &tiepoint[..])?;
                image.encoder().write_tag(Tag::GeoKeyDirectoryTag, &geo_keys[..])?;
                image.write_data(&data)?;
            }
            n => {
                return Err(RasterError::UnsupportedLayout(format!(
                    "cannot encode {} band(s); expected 1 or 3",
                    n
                )))
            }
        }
    }

    Ok(buffer.into_inner())
}
