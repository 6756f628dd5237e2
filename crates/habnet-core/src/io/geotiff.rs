//! Single-band GeoTIFF reading and writing with the `tiff` crate.
//!
//! Only the north-up subset of GeoTIFF is handled: a pixel scale plus one
//! tiepoint. Nodata travels in the GDAL_NODATA ASCII tag.

use std::fs::File;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::grid::{GeoTransform, Grid};

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Read the first band of a GeoTIFF as `f64`, nodata mapped to NaN.
pub fn read_geotiff(path: &Path) -> Result<Grid<f64>> {
    let file = File::open(path)?;
    let grid = decode(file)?;
    debug!(
        "{}: {}x{} cells of {}",
        path.display(),
        grid.width,
        grid.height,
        grid.transform.cell_size
    );
    Ok(grid)
}

fn to_f64<T: Copy + Into<f64>>(buf: Vec<T>) -> Vec<f64> {
    buf.into_iter().map(Into::into).collect()
}

fn decode<R: Read + Seek>(reader: R) -> Result<Grid<f64>> {
    let mut decoder = Decoder::new(reader)?.with_limits(Limits::unlimited());
    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);

    let transform = read_transform(&mut decoder)?;
    let nodata = decoder
        .get_tag_ascii_string(tag(GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f64>().ok());

    let data = match decoder.read_image()? {
        DecodingResult::U8(b) => to_f64(b),
        DecodingResult::U16(b) => to_f64(b),
        DecodingResult::U32(b) => to_f64(b),
        DecodingResult::U64(b) => b.into_iter().map(|v| v as f64).collect(),
        DecodingResult::I8(b) => to_f64(b),
        DecodingResult::I16(b) => to_f64(b),
        DecodingResult::I32(b) => to_f64(b),
        DecodingResult::I64(b) => b.into_iter().map(|v| v as f64).collect(),
        DecodingResult::F32(b) => to_f64(b),
        DecodingResult::F64(b) => b,
        #[allow(unreachable_patterns)]
        _ => return Err(Error::UnsupportedRaster("unsupported sample format".into())),
    };
    if data.len() != width * height {
        return Err(Error::UnsupportedRaster(format!(
            "{} samples for {width}x{height} pixels; only single-band rasters are supported",
            data.len()
        )));
    }

    let mut grid = Grid::from_vec(data, width, height, transform)?;
    if let Some(nd) = nodata.filter(|v| !v.is_nan()) {
        for v in grid.data.iter_mut() {
            if *v == nd {
                *v = f64::NAN;
            }
        }
    }
    Ok(grid)
}

fn read_transform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(tag(MODEL_PIXEL_SCALE)).ok();
    let tiepoint = decoder.get_tag_f64_vec(tag(MODEL_TIEPOINT)).ok();

    let (Some(scale), Some(tiepoint)) = (scale, tiepoint) else {
        warn!("no georeferencing tags; placing raster at the origin with unit cells");
        return Ok(GeoTransform::default());
    };
    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(Error::UnsupportedRaster("malformed pixel scale or tiepoint tag".into()));
    }

    let (sx, sy) = (scale[0], scale[1].abs());
    if !(sx > 0.0) || (sx - sy).abs() > 1e-9 * sx.max(sy) {
        return Err(Error::UnsupportedRaster(format!("non-square pixels {sx} x {sy}")));
    }
    // tiepoint: [I, J, K, X, Y, Z]
    let origin_x = tiepoint[3] - tiepoint[0] * sx;
    let origin_y = tiepoint[4] + tiepoint[1] * sx;
    Ok(GeoTransform::new(origin_x, origin_y, sx))
}

fn geo_tags<W: Write + Seek, K: tiff::encoder::TiffKind>(
    dir: &mut tiff::encoder::DirectoryEncoder<'_, W, K>,
    gt: &GeoTransform,
    nodata: &str,
) -> Result<()> {
    dir.write_tag(tag(MODEL_PIXEL_SCALE), &[gt.cell_size, gt.cell_size, 0.0][..])?;
    dir.write_tag(tag(MODEL_TIEPOINT), &[0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0][..])?;
    // Version 1.1.0 with two keys: projected model, pixel-is-area.
    let geokeys: [u16; 12] = [1, 1, 0, 2, 1024, 0, 1, 1, 1025, 0, 1, 1];
    dir.write_tag(tag(GEO_KEY_DIRECTORY), &geokeys[..])?;
    dir.write_tag(tag(GDAL_NODATA), nodata)?;
    Ok(())
}

/// Write a cost surface as 32-bit float with NaN nodata.
pub fn write_cost_geotiff(path: &Path, grid: &Grid<f64>) -> Result<()> {
    let data: Vec<f32> = grid.data.iter().map(|&v| v as f32).collect();
    let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path)?))?;
    let mut image = encoder.new_image::<colortype::Gray32Float>(grid.width as u32, grid.height as u32)?;
    geo_tags(image.encoder(), &grid.transform, "nan")?;
    image.write_data(&data)?;
    Ok(())
}

/// Write a label grid as 32-bit unsigned with 0 nodata.
pub fn write_label_geotiff(path: &Path, grid: &Grid<u32>) -> Result<()> {
    let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path)?))?;
    let mut image = encoder.new_image::<colortype::Gray32>(grid.width as u32, grid.height as u32)?;
    geo_tags(image.encoder(), &grid.transform, "0")?;
    image.write_data(&grid.data)?;
    Ok(())
}
