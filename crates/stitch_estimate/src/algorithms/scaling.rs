use fast_image_resize::{
    images::{Image, ImageRef},
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
};
use image::{ImageBuffer, Pixel, RgbImage};
use serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use tracing::debug;

use crate::{
    error::{EstimateError, Result},
    types::{Dpi, Mask, PhysicalDimensions},
};

/// Requested target size in inches. Absent or zero means "not requested".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ScaleRequest {
    width: Option<f64>,
    length: Option<f64>,
}

impl ScaleRequest {
    /// Validate user input: negative, NaN and infinite targets are rejected.
    pub fn new(width: Option<f64>, length: Option<f64>) -> Result<Self> {
        Ok(Self {
            width: validate("width", width)?,
            length: validate("length", length)?,
        })
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn width(&self) -> Option<f64> {
        self.width
    }

    pub fn length(&self) -> Option<f64> {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.width.is_none() && self.length.is_none()
    }

    /// The single uniform factor applied to both axes.
    ///
    /// Both targets: mean of the two per-axis factors. One target: that
    /// axis's factor. Neither: 1. An axis whose current size is zero cannot
    /// produce a factor and is ignored.
    pub fn factor(&self, current: PhysicalDimensions) -> f64 {
        let axis = |target: Option<f64>, current: f64| {
            target.filter(|_| current > 0.0).map(|t| t / current)
        };
        match (
            axis(self.width, current.width_inches),
            axis(self.length, current.length_inches),
        ) {
            (Some(w), Some(l)) => (w + l) / 2.0,
            (Some(f), None) | (None, Some(f)) => f,
            (None, None) => 1.0,
        }
    }
}

fn validate(axis: &'static str, value: Option<f64>) -> Result<Option<f64>> {
    match value {
        None => Ok(None),
        Some(v) if !v.is_finite() || v < 0.0 => Err(EstimateError::InvalidTarget { axis, value: v }),
        Some(v) if v == 0.0 => Ok(None),
        Some(v) => Ok(Some(v)),
    }
}

/// Applies a [`ScaleRequest`] to measured dimensions or to pixel data.
#[derive(Debug, Clone, Copy, Default)]
pub struct DimensionalScaler;

impl DimensionalScaler {
    /// Geometric path: scale physical dimensions uniformly.
    pub fn scale_dimensions(
        &self,
        current: PhysicalDimensions,
        request: &ScaleRequest,
    ) -> PhysicalDimensions {
        let factor = request.factor(current);
        debug!("Scale factor {:.4} for {:?}", factor, request);
        PhysicalDimensions::new(current.width_inches * factor, current.length_inches * factor)
    }

    /// Raster path: resample the image and its mask to the pixel size of the
    /// requested physical size at the given DPI. Image width maps to "width"
    /// and image height to "length".
    ///
    /// With both targets each axis is resampled to its own target, so the
    /// aspect ratio may change. With one target the uniform factor applies.
    pub fn scale_raster(
        &self,
        image: &RgbImage,
        mask: &Mask,
        dpi: Dpi,
        request: &ScaleRequest,
    ) -> Result<(RgbImage, Mask)> {
        if image.dimensions() != mask.dimensions() {
            return Err(EstimateError::ImageProcessing(format!(
                "mask {:?} does not match image {:?}",
                mask.dimensions(),
                image.dimensions()
            )));
        }

        let (width, height) = self.target_pixels(image, dpi, request)?;
        if (width, height) == image.dimensions() {
            return Ok((image.clone(), mask.clone()));
        }
        debug!(
            "Resampling {}x{} -> {}x{}",
            image.width(),
            image.height(),
            width,
            height
        );

        let resized_image = resample(image, width, height)?;
        let resized_mask = Mask::from_gray(&resample(mask.as_image(), width, height)?);
        Ok((resized_image, resized_mask))
    }

    /// Destination pixel size for [`Self::scale_raster`], bounded by
    /// [`MAX_RASTER_PIXELS`].
    fn target_pixels(&self, image: &RgbImage, dpi: Dpi, request: &ScaleRequest) -> Result<(u32, u32)> {
        let (width_inches, length_inches) = match (request.width(), request.length()) {
            (Some(width), Some(length)) => (width, length),
            _ => {
                let current = PhysicalDimensions::new(
                    image.width() as f64 / dpi.x,
                    image.height() as f64 / dpi.y,
                );
                let scaled = self.scale_dimensions(current, request);
                (scaled.width_inches, scaled.length_inches)
            }
        };

        // A single target drives both axes, so report it for either.
        let requested = |axis: &'static str, own: Option<f64>| {
            let value = own.or(request.width()).or(request.length()).unwrap_or(0.0);
            EstimateError::InvalidTarget { axis, value }
        };
        let pixels = |inches: f64, dpi: f64| {
            let pixels = (inches * dpi).round();
            (pixels.is_finite() && pixels <= u32::MAX as f64).then(|| (pixels as u32).max(1))
        };

        let width = pixels(width_inches, dpi.x).ok_or_else(|| requested("width", request.width()))?;
        let height = pixels(length_inches, dpi.y).ok_or_else(|| requested("length", request.length()))?;
        match (width as u64).checked_mul(height as u64) {
            Some(total) if total <= MAX_RASTER_PIXELS => Ok((width, height)),
            _ => {
                let axis = if request.width().is_some() { "width" } else { "length" };
                Err(requested(axis, None))
            }
        }
    }
}

/// Upper bound on the pixel count of a resampled raster.
pub const MAX_RASTER_PIXELS: u64 = 100_000_000;

fn pixel_type(channels: u8) -> Result<PixelType> {
    match channels {
        1 => Ok(PixelType::U8),
        2 => Ok(PixelType::U8x2),
        3 => Ok(PixelType::U8x3),
        4 => Ok(PixelType::U8x4),
        n => Err(EstimateError::ImageProcessing(format!(
            "cannot resample {n}-channel pixels"
        ))),
    }
}

/// Area-averaging resample: box-filter convolution, so every destination
/// pixel is the mean of the source pixels under it.
fn resample<P>(image: &ImageBuffer<P, Vec<u8>>, width: u32, height: u32) -> Result<ImageBuffer<P, Vec<u8>>>
where
    P: Pixel<Subpixel = u8>,
{
    let kind = pixel_type(P::CHANNEL_COUNT)?;
    let processing = |e: &dyn std::fmt::Display| EstimateError::ImageProcessing(format!("resample: {e}"));

    let source = ImageRef::new(image.width(), image.height(), image.as_raw(), kind)
        .map_err(|e| processing(&e))?;
    let mut destination = Image::new(width, height, kind);
    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Box));
    Resizer::new()
        .resize(&source, &mut destination, &options)
        .map_err(|e| processing(&e))?;

    ImageBuffer::from_raw(width, height, destination.into_vec())
        .ok_or_else(|| processing(&"destination buffer has the wrong length"))
}
