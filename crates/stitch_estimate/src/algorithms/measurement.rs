use geo::MinimumRotatedRect;
use image::RgbImage;
use tracing::debug;

use crate::{
    algorithms::{
        scaling::{DimensionalScaler, ScaleRequest},
        threshold::largest_external_contour,
    },
    error::{Result, StageContext},
    traits::{Measured, ShapeMeasurer},
    types::{Contour, Dpi, Foreground, OrientedBoundingBox, PhysicalDimensions, Stage},
};

/// Counts foreground pixels: area = count / (dpi_x · dpi_y).
///
/// Target dimensions are honoured by resampling the image and mask first,
/// so the request refers to the size of the whole picture.
#[derive(Debug, Clone, Default)]
pub struct PixelCountMeasurer {
    pub scaler: DimensionalScaler,
}

impl ShapeMeasurer for PixelCountMeasurer {
    fn measure(
        &self,
        image: &RgbImage,
        foreground: &Foreground,
        dpi: Dpi,
        request: &ScaleRequest,
    ) -> Result<Measured> {
        let count = if request.is_empty() {
            foreground.mask.foreground_count()
        } else {
            let (_, mask) = self
                .scaler
                .scale_raster(image, &foreground.mask, dpi, request)
                .in_stage(Stage::Scaling)?;
            mask.foreground_count()
        };
        debug!("{} foreground pixels at {}", count, dpi);

        Ok(Measured {
            dimensions: None,
            area_sq_inches: count as f64 / dpi.area(),
        })
    }

    fn name(&self) -> &'static str {
        "pixel_count"
    }
}

/// Measures the minimum-area rectangle around the object contour.
///
/// The longer rectangle edge is the length, the shorter the width, whatever
/// the rectangle's rotation.
#[derive(Debug, Clone, Default)]
pub struct OrientedBoxMeasurer {
    pub scaler: DimensionalScaler,
}

impl OrientedBoxMeasurer {
    pub fn bounding_box(contour: &Contour) -> Option<OrientedBoundingBox> {
        let rect = contour.to_geo_polygon().minimum_rotated_rect()?;
        let coords: Vec<[f64; 2]> = rect.exterior().coords().map(|c| [c.x, c.y]).collect();
        // Closed ring: four corners plus the repeated first one.
        match coords.as_slice() {
            [a, b, c, d, ..] => Some(OrientedBoundingBox {
                corners: [*a, *b, *c, *d],
            }),
            _ => None,
        }
    }

    /// Unscaled physical dimensions of a contour; `None` for degenerate shapes.
    pub fn dimensions(contour: &Contour, dpi: Dpi) -> Option<PhysicalDimensions> {
        if contour.area() == 0.0 {
            return None;
        }
        let obb = Self::bounding_box(contour)?;
        let (a, b) = obb.edge_lengths();
        debug!(
            "Oriented box {:.1} x {:.1} px at {:.1}°",
            a,
            b,
            obb.angle_degrees()
        );
        Some(PhysicalDimensions::from_unordered(a / dpi.x, b / dpi.y))
    }
}

impl ShapeMeasurer for OrientedBoxMeasurer {
    fn measure(
        &self,
        _image: &RgbImage,
        foreground: &Foreground,
        dpi: Dpi,
        request: &ScaleRequest,
    ) -> Result<Measured> {
        let traced;
        let contour = match &foreground.object_contour {
            Some(contour) => contour,
            None => match largest_external_contour(foreground.mask.as_image()) {
                Some(contour) => {
                    traced = contour;
                    &traced
                }
                None => return Ok(Measured::nothing()),
            },
        };

        let Some(measured) = Self::dimensions(contour, dpi) else {
            debug!("Degenerate object contour, reporting zero");
            return Ok(Measured::nothing());
        };
        let scaled = self.scaler.scale_dimensions(measured, request);

        Ok(Measured {
            dimensions: Some(scaled),
            area_sq_inches: scaled.area_sq_inches(),
        })
    }

    fn name(&self) -> &'static str {
        "oriented_box"
    }
}
