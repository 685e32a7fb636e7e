use std::path::Path;

use geo_types::{Coord, LineString, Polygon};
use image::{GrayImage, Luma, RgbImage};
use imageproc::point::Point;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{algorithms::resolution::read_embedded_dpi, error::Result};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Decode,
    Resolution,
    Segmentation,
    Measurement,
    Scaling,
    Preview,
}

/// Horizontal and vertical resolution in dots per inch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Dpi {
    pub x: f64,
    pub y: f64,
}

impl Dpi {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn uniform(dpi: f64) -> Self {
        Self { x: dpi, y: dpi }
    }

    /// Pixels per square inch.
    pub fn area(&self) -> f64 {
        self.x * self.y
    }
}

impl std::fmt::Display for Dpi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{} dpi", self.x, self.y)
    }
}

/// A decoded RGB raster plus whatever resolution metadata it carried.
#[derive(Debug, Clone)]
pub struct RasterImage {
    pixels: RgbImage,
    embedded_dpi: Option<(f64, f64)>,
}

impl RasterImage {
    pub fn new(pixels: RgbImage) -> Self {
        Self {
            pixels,
            embedded_dpi: None,
        }
    }

    pub fn with_dpi(pixels: RgbImage, dpi_x: f64, dpi_y: f64) -> Self {
        Self {
            pixels,
            embedded_dpi: Some((dpi_x, dpi_y)),
        }
    }

    /// Decode an encoded image (PNG, JPEG, TIFF, ...) and sniff its DPI metadata.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let pixels = image::load_from_memory(bytes)?.to_rgb8();
        Ok(Self {
            pixels,
            embedded_dpi: read_embedded_dpi(bytes),
        })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::decode(&bytes)
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn embedded_dpi(&self) -> Option<(f64, f64)> {
        self.embedded_dpi
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// Binary foreground indicator with the same dimensions as its source image.
///
/// Stored as a `GrayImage` holding 0 (background) or 255 (foreground) so it
/// can be handed straight to `imageproc`.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask(GrayImage);

impl Mask {
    pub const ON: u8 = 255;
    pub const OFF: u8 = 0;

    /// An all-background mask.
    pub fn empty(width: u32, height: u32) -> Self {
        Self(GrayImage::new(width, height))
    }

    pub fn from_fn<F>(width: u32, height: u32, mut is_foreground: F) -> Self
    where
        F: FnMut(u32, u32) -> bool,
    {
        Self(GrayImage::from_fn(width, height, |x, y| {
            Luma([if is_foreground(x, y) { Self::ON } else { Self::OFF }])
        }))
    }

    /// Collapse any grayscale image to a mask: values of 128 and up are foreground.
    pub fn from_gray(image: &GrayImage) -> Self {
        Self::from_fn(image.width(), image.height(), |x, y| {
            image.get_pixel(x, y)[0] >= 128
        })
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        self.0.get_pixel(x, y)[0] == Self::ON
    }

    pub fn foreground_count(&self) -> u64 {
        self.0.pixels().filter(|p| p[0] == Self::ON).count() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.foreground_count() == 0
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.0
    }
}

/// Closed boundary of a connected foreground region, in pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    pub points: Vec<Point<i32>>,
}

impl Contour {
    pub fn new(points: Vec<Point<i32>>) -> Self {
        Self { points }
    }

    /// Convert to a geo-types polygon for geometric operations
    pub fn to_geo_polygon(&self) -> Polygon<f64> {
        let coords: Vec<Coord<f64>> = self
            .points
            .iter()
            .map(|p| Coord {
                x: p.x as f64,
                y: p.y as f64,
            })
            .collect();
        Polygon::new(LineString::new(coords), vec![])
    }

    /// Enclosed area in square pixels.
    pub fn area(&self) -> f64 {
        use geo::Area;
        if self.points.len() < 3 {
            return 0.0;
        }
        self.to_geo_polygon().unsigned_area()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Minimum-area rectangle enclosing a contour, corners in traversal order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBoundingBox {
    pub corners: [[f64; 2]; 4],
}

impl OrientedBoundingBox {
    /// Pixel lengths of the two adjacent edges leaving the first corner.
    pub fn edge_lengths(&self) -> (f64, f64) {
        let [a, b, c, _] = self.corners;
        (distance(a, b), distance(b, c))
    }

    /// Rotation of the first edge against the x axis, in degrees.
    pub fn angle_degrees(&self) -> f64 {
        let [a, b, _, _] = self.corners;
        (b[1] - a[1]).atan2(b[0] - a[0]).to_degrees()
    }
}

fn distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    (dx * dx + dy * dy).sqrt()
}

/// Measured size of the object in inches.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct PhysicalDimensions {
    pub width_inches: f64,
    pub length_inches: f64,
}

impl PhysicalDimensions {
    pub fn new(width_inches: f64, length_inches: f64) -> Self {
        Self {
            width_inches,
            length_inches,
        }
    }

    /// Build from two edge lengths of unknown orientation: the longer edge
    /// is always the length.
    pub fn from_unordered(a: f64, b: f64) -> Self {
        Self::new(a.min(b), a.max(b))
    }

    pub fn area_sq_inches(&self) -> f64 {
        self.width_inches * self.length_inches
    }

    pub fn is_degenerate(&self) -> bool {
        self.width_inches <= 0.0 || self.length_inches <= 0.0
    }
}

/// Output of the foreground extractor.
#[derive(Debug, Clone)]
pub struct Foreground {
    pub mask: Mask,
    /// Largest external contour, when the extractor traced one.
    pub object_contour: Option<Contour>,
}

impl Foreground {
    pub fn nothing(width: u32, height: u32) -> Self {
        Self {
            mask: Mask::empty(width, height),
            object_contour: None,
        }
    }
}

/// Terminal output, computed at full precision.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct EstimateResult {
    pub area_sq_inches: f64,
    pub stitch_count: f64,
    pub cost: f64,
}

impl EstimateResult {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.area_sq_inches == 0.0 && self.stitch_count == 0.0 && self.cost == 0.0
    }

    /// Rounded for display: area to 0.1 in², stitches to a whole number, cost to cents.
    pub fn report(&self) -> EstimateReport {
        EstimateReport {
            area_sq_inches: (self.area_sq_inches * 10.0).round() / 10.0,
            stitch_count: self.stitch_count.round().max(0.0) as u64,
            cost: (self.cost * 100.0).round() / 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EstimateReport {
    pub area_sq_inches: f64,
    pub stitch_count: u64,
    pub cost: f64,
}
