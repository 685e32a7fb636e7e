use image::RgbImage;
use crate::{
    algorithms::scaling::ScaleRequest,
    error::Result,
    types::{Dpi, Foreground, PhysicalDimensions},
};

/// Trait for separating the subject of a photo from its background
pub trait ForegroundExtractor: Send + Sync {
    /// Produce a foreground mask (and, where available, the object contour).
    /// Finding nothing is not an error: return an empty mask instead.
    fn extract(&self, image: &RgbImage) -> Result<Foreground>;

    fn name(&self) -> &'static str;
}

/// What a measurer hands downstream to the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Measured {
    /// Object dimensions after scaling, when the measurer works geometrically.
    pub dimensions: Option<PhysicalDimensions>,
    pub area_sq_inches: f64,
}

impl Measured {
    pub fn nothing() -> Self {
        Self::default()
    }
}

/// Trait for turning a foreground into a physical size, honouring any
/// requested target dimensions
pub trait ShapeMeasurer: Send + Sync {
    fn measure(
        &self,
        image: &RgbImage,
        foreground: &Foreground,
        dpi: Dpi,
        request: &ScaleRequest,
    ) -> Result<Measured>;

    fn name(&self) -> &'static str;
}
