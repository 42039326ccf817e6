//! Single-band GeoTIFF reading and writing through the `tiff` crate.
//!
//! Only the tie-point/pixel-scale georeferencing and the GDAL nodata tag
//! are interpreted. Nodata cells come back as NaN.

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster};
use num_traits::ToPrimitive;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray64Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;
use tracing::debug;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

/// Read the first band of a GeoTIFF file
pub fn read_geotiff<P: AsRef<Path>>(path: P) -> Result<Raster> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let raster = decode(BufReader::new(file))?;
    debug!(
        "read {} ({}x{}, cell {})",
        path.display(),
        raster.cols(),
        raster.rows(),
        raster.cell_size()
    );
    Ok(raster)
}

/// Read a GeoTIFF held in memory
pub fn read_geotiff_from_buffer(data: &[u8]) -> Result<Raster> {
    decode(Cursor::new(data))
}

/// Write a raster as a 64-bit float GeoTIFF; NaN is written as-is
pub fn write_geotiff<P: AsRef<Path>>(raster: &Raster, path: P) -> Result<()> {
    let file = File::create(path.as_ref())?;
    encode(raster, file)
}

pub fn write_geotiff_to_buffer(raster: &Raster) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode(raster, Cursor::new(&mut buf))?;
    Ok(buf)
}

fn tiff_err(context: &str) -> impl Fn(tiff::TiffError) -> Error + '_ {
    move |e| Error::Other(format!("{}: {}", context, e))
}

fn to_f64<T: ToPrimitive>(buf: Vec<T>) -> Vec<f64> {
    buf.into_iter()
        .map(|v| v.to_f64().unwrap_or(f64::NAN))
        .collect()
}

fn decode<R: Read + Seek>(reader: R) -> Result<Raster> {
    let mut decoder = Decoder::new(reader).map_err(tiff_err("TIFF decode error"))?;
    let (width, height) = decoder
        .dimensions()
        .map_err(tiff_err("Cannot read dimensions"))?;
    let (rows, cols) = (height as usize, width as usize);

    let data = match decoder
        .read_image()
        .map_err(tiff_err("Cannot read image data"))?
    {
        DecodingResult::F64(buf) => buf,
        DecodingResult::F32(buf) => to_f64(buf),
        DecodingResult::U8(buf) => to_f64(buf),
        DecodingResult::U16(buf) => to_f64(buf),
        DecodingResult::U32(buf) => to_f64(buf),
        DecodingResult::I8(buf) => to_f64(buf),
        DecodingResult::I16(buf) => to_f64(buf),
        DecodingResult::I32(buf) => to_f64(buf),
        _ => {
            return Err(Error::UnsupportedDataType(
                "unsupported TIFF pixel format".to_string(),
            ))
        }
    };

    // Multi-sample images decode interleaved; keep the first sample
    let samples = if rows * cols > 0 { data.len() / (rows * cols) } else { 0 };
    let data = match samples {
        1 => data,
        n if n > 1 => data.into_iter().step_by(n).collect(),
        _ => {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            })
        }
    };

    let mut raster = Raster::from_vec(data, rows, cols)?;
    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    if let Some(nodata) = read_nodata(&mut decoder) {
        raster.mask_nodata(nodata);
    }
    Ok(raster)
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder
        .get_tag_f64_vec(Tag::Unknown(MODEL_PIXEL_SCALE))
        .ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::Unknown(MODEL_TIEPOINT)).ok()?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    // tiepoint: [I, J, K, X, Y, Z]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let text = decoder
        .get_tag_ascii_string(Tag::Unknown(GDAL_NODATA))
        .ok()?;
    let value: f64 = text.trim_matches(char::from(0)).trim().parse().ok()?;
    (!value.is_nan()).then_some(value)
}

fn encode<W: Write + Seek>(raster: &Raster, writer: W) -> Result<()> {
    let mut encoder = TiffEncoder::new(writer).map_err(tiff_err("TIFF encoder error"))?;
    let (rows, cols) = raster.shape();
    let data: Vec<f64> = raster.data().iter().copied().collect();

    let mut image = encoder
        .new_image::<Gray64Float>(cols as u32, rows as u32)
        .map_err(tiff_err("Cannot create TIFF image"))?;

    let gt = raster.transform();
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &scale[..])
        .map_err(tiff_err("Cannot write scale tag"))?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_TIEPOINT), &tiepoint[..])
        .map_err(tiff_err("Cannot write tiepoint tag"))?;

    // Version 1.1.0 with two keys: geographic model, pixel-is-area
    let geokeys: [u16; 12] = [1, 1, 0, 2, 1024, 0, 1, 2, 1025, 0, 1, 1];
    image
        .encoder()
        .write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), &geokeys[..])
        .map_err(tiff_err("Cannot write geokey tag"))?;

    image
        .write_data(&data)
        .map_err(tiff_err("Cannot write image data"))?;
    Ok(())
}
