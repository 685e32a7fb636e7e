use std::io::Cursor;

use image::ImageFormat;
use tracing::{debug, warn};

use crate::{config::ResolutionConfig, error::Result, types::Dpi};

const INCHES_PER_METRE: f64 = 39.370_078_740_157_48;
const CM_PER_INCH: f64 = 2.54;

/// Resolves the DPI a measurement runs at. Never fails: missing metadata
/// and metadata below the reliability threshold both resolve to the default.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DpiResolver {
    config: ResolutionConfig,
}

impl DpiResolver {
    pub fn new(config: ResolutionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ResolutionConfig {
        &self.config
    }

    pub fn resolve(&self, embedded: Option<(f64, f64)>) -> Dpi {
        let fallback = Dpi::uniform(self.config.default_dpi);
        match embedded {
            None => {
                debug!("No DPI metadata, using {}", fallback);
                fallback
            }
            Some((x, y)) if !x.is_finite() || !y.is_finite() => {
                warn!("Non-finite DPI metadata ({x}, {y}), using {}", fallback);
                fallback
            }
            Some((x, y))
                if x < self.config.min_reliable_dpi || y < self.config.min_reliable_dpi =>
            {
                warn!(
                    "DPI metadata ({x}, {y}) below {} treated as unreliable, using {}",
                    self.config.min_reliable_dpi, fallback
                );
                fallback
            }
            Some((x, y)) => Dpi::new(x, y),
        }
    }
}

/// Read the pixel density embedded in an encoded image, if it declares one in
/// physical units. PNG `pHYs` and JPEG JFIF `APP0` come first; EXIF
/// `XResolution`/`YResolution` covers TIFF, WebP and JPEG without JFIF density.
pub fn read_embedded_dpi(bytes: &[u8]) -> Option<(f64, f64)> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Png => png_density(bytes).or_else(|| exif_density(bytes)),
        ImageFormat::Jpeg => bytes
            .get(2..)
            .and_then(jfif_density)
            .or_else(|| exif_density(bytes)),
        ImageFormat::Tiff | ImageFormat::WebP => exif_density(bytes),
        _ => None,
    }
}

fn be_u16(bytes: &[u8]) -> Option<u16> {
    Some(u16::from_be_bytes(bytes.get(..2)?.try_into().ok()?))
}

fn png_density(bytes: &[u8]) -> Option<(f64, f64)> {
    let reader = png::Decoder::new(Cursor::new(bytes)).read_info().ok()?;
    let dims = reader.info().pixel_dims?;
    match dims.unit {
        png::Unit::Meter => Some((
            dims.xppu as f64 / INCHES_PER_METRE,
            dims.yppu as f64 / INCHES_PER_METRE,
        )),
        // Aspect ratio only.
        png::Unit::Unspecified => None,
    }
}

fn exif_density(bytes: &[u8]) -> Option<(f64, f64)> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .ok()?;
    let rational = |tag: exif::Tag| match &exif.get_field(tag, exif::In::PRIMARY)?.value {
        exif::Value::Rational(values) => values.first().map(|r| r.to_f64()),
        _ => None,
    };

    let x = rational(exif::Tag::XResolution)?;
    let y = rational(exif::Tag::YResolution).unwrap_or(x);
    // 2 is the inch and the default, 3 the centimetre, 1 means no unit.
    let unit = exif
        .get_field(exif::Tag::ResolutionUnit, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .unwrap_or(2);
    match unit {
        2 => Some((x, y)),
        3 => Some((x * CM_PER_INCH, y * CM_PER_INCH)),
        _ => None,
    }
}

fn jfif_density(mut segments: &[u8]) -> Option<(f64, f64)> {
    while segments.len() >= 4 {
        if segments[0] != 0xFF {
            return None;
        }
        let marker = segments[1];
        // Start of scan: no more header segments.
        if marker == 0xDA {
            return None;
        }
        let length = be_u16(&segments[2..])? as usize;
        let data = segments.get(4..2 + length)?;
        if marker == 0xE0 && data.starts_with(b"JFIF\0") && data.len() >= 12 {
            let unit = data[7];
            let x = be_u16(&data[8..])? as f64;
            let y = be_u16(&data[10..])? as f64;
            return match unit {
                1 => Some((x, y)),
                2 => Some((x * CM_PER_INCH, y * CM_PER_INCH)),
                _ => None,
            };
        }
        segments = segments.get(2 + length..)?;
    }
    None
}
