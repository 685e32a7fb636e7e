pub mod builder;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    algorithms::{DpiResolver, ScaleRequest, StitchEstimator},
    error::{Result, StageContext},
    traits::{ForegroundExtractor, ShapeMeasurer},
    types::{Dpi, EstimateReport, EstimateResult, Foreground, PhysicalDimensions, RasterImage, Stage},
};

/// Resolution -> segmentation -> measurement (with scaling) -> estimation.
///
/// Stateless between requests: one pipeline can serve any number of images,
/// from any number of threads.
pub struct Pipeline {
    resolver: DpiResolver,
    extractor: Box<dyn ForegroundExtractor>,
    measurer: Box<dyn ShapeMeasurer>,
    estimator: StitchEstimator,
}

/// Everything one run produced. The foreground is kept so callers can
/// render previews without segmenting twice.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub dpi: Dpi,
    pub foreground: Foreground,
    pub dimensions: Option<PhysicalDimensions>,
    pub result: EstimateResult,
}

/// Serialisable view of a [`PipelineOutput`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MeasurementSummary {
    pub dpi: Dpi,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<PhysicalDimensions>,
    pub estimate: EstimateReport,
}

impl PipelineOutput {
    pub fn summary(&self) -> MeasurementSummary {
        MeasurementSummary {
            dpi: self.dpi,
            dimensions: self.dimensions,
            estimate: self.result.report(),
        }
    }
}

impl Pipeline {
    /// Create a new pipeline builder
    pub fn builder() -> builder::PipelineBuilder {
        builder::PipelineBuilder::new()
    }

    pub fn new(
        resolver: DpiResolver,
        extractor: Box<dyn ForegroundExtractor>,
        measurer: Box<dyn ShapeMeasurer>,
        estimator: StitchEstimator,
    ) -> Self {
        Self {
            resolver,
            extractor,
            measurer,
            estimator,
        }
    }

    /// Decode an encoded image and run it through the pipeline.
    pub fn process_bytes(&self, bytes: &[u8], request: &ScaleRequest) -> Result<PipelineOutput> {
        let image = RasterImage::decode(bytes).in_stage(Stage::Decode)?;
        self.process(&image, request)
    }

    /// Run every stage on one image. Finding no object is a zero result,
    /// not an error.
    pub fn process(&self, image: &RasterImage, request: &ScaleRequest) -> Result<PipelineOutput> {
        let dpi = self.resolver.resolve(image.embedded_dpi());
        debug!(
            "{}x{} image at {} ({})",
            image.width(),
            image.height(),
            dpi,
            self.info()
        );

        let foreground = self
            .extractor
            .extract(image.pixels())
            .in_stage(Stage::Segmentation)?;
        debug!(
            "{} foreground pixels, contour: {}",
            foreground.mask.foreground_count(),
            foreground.object_contour.as_ref().map_or(0, |c| c.len())
        );

        let measured = self
            .measurer
            .measure(image.pixels(), &foreground, dpi, request)
            .in_stage(Stage::Measurement)?;

        let result = self.estimator.estimate(measured.area_sq_inches);
        info!(
            "Estimated {:.2} in², {:.0} stitches, cost {:.2}",
            result.area_sq_inches, result.stitch_count, result.cost
        );

        Ok(PipelineOutput {
            dpi,
            foreground,
            dimensions: measured.dimensions,
            result,
        })
    }

    /// Get information about the pipeline configuration
    pub fn info(&self) -> String {
        format!(
            "Pipeline: {} extractor, {} measurer, {} stitches/in², {} per 1000",
            self.extractor.name(),
            self.measurer.name(),
            self.estimator.pricing().stitch_density,
            self.estimator.pricing().price_per_thousand
        )
    }
}
