use crate::{
    algorithms::{
        DpiResolver, GrabCutExtractor, OrientedBoxMeasurer, PixelCountMeasurer, StitchEstimator,
        ThresholdExtractor,
    },
    config::{EstimatorConfig, ExtractorKind, GrabCutConfig, MeasureMode, PricingConfig, ResolutionConfig},
    error::Result,
    pipeline::Pipeline,
    traits::{ForegroundExtractor, ShapeMeasurer},
};

/// Builder for creating processing pipelines with a fluent API
pub struct PipelineBuilder {
    resolver: DpiResolver,
    extractor: Option<Box<dyn ForegroundExtractor>>,
    measurer: Option<Box<dyn ShapeMeasurer>>,
    estimator: StitchEstimator,
}

impl PipelineBuilder {
    /// Create a new pipeline builder
    pub fn new() -> Self {
        Self {
            resolver: DpiResolver::default(),
            extractor: None,
            measurer: None,
            estimator: StitchEstimator::default(),
        }
    }

    /// Set the foreground extractor (replaces any existing one)
    pub fn set_extractor<E>(mut self, extractor: E) -> Self
    where
        E: ForegroundExtractor + 'static,
    {
        self.extractor = Some(Box::new(extractor));
        self
    }

    /// Set the shape measurer (replaces any existing one)
    pub fn set_measurer<M>(mut self, measurer: M) -> Self
    where
        M: ShapeMeasurer + 'static,
    {
        self.measurer = Some(Box::new(measurer));
        self
    }

    /// Fails on a non-positive or non-finite default DPI
    pub fn with_resolution(mut self, config: ResolutionConfig) -> Result<Self> {
        self.resolver = DpiResolver::new(config)?;
        Ok(self)
    }

    /// Fails on a negative or non-finite density or price
    pub fn with_pricing(mut self, config: PricingConfig) -> Result<Self> {
        self.estimator = StitchEstimator::new(config)?;
        Ok(self)
    }

    /// Use rectangle-seeded segmentation, measured by pixel count
    pub fn with_grab_cut(self, config: GrabCutConfig) -> Result<Self> {
        Ok(self
            .set_extractor(GrabCutExtractor::new(config)?)
            .set_measurer(PixelCountMeasurer::default()))
    }

    /// Build the pipeline with default components if not specified.
    /// Defaults: Otsu threshold extraction, oriented-box measurement.
    pub fn build(self) -> Pipeline {
        let extractor = self
            .extractor
            .unwrap_or_else(|| Box::new(ThresholdExtractor));
        let measurer = self
            .measurer
            .unwrap_or_else(|| Box::new(OrientedBoxMeasurer::default()));

        Pipeline::new(self.resolver, extractor, measurer, self.estimator)
    }

    /// Build a pipeline from a validated configuration
    pub fn from_config(config: &EstimatorConfig) -> Result<Pipeline> {
        config.validate()?;

        let builder = Self::new()
            .with_resolution(config.resolution)?
            .with_pricing(config.pricing)?;

        let builder = match config.extractor {
            ExtractorKind::Threshold => builder.set_extractor(ThresholdExtractor),
            ExtractorKind::GrabCut => builder.set_extractor(GrabCutExtractor::new(config.grab_cut)?),
        };

        let builder = match config.measure_mode() {
            MeasureMode::PixelCount => builder.set_measurer(PixelCountMeasurer::default()),
            MeasureMode::OrientedBox => builder.set_measurer(OrientedBoxMeasurer::default()),
        };

        Ok(builder.build())
    }

    /// Build the default threshold pipeline
    pub fn build_threshold() -> Pipeline {
        Self::new().build()
    }

    /// Build a grab-cut pipeline with default settings
    pub fn build_grab_cut() -> Pipeline {
        Self::new()
            .set_extractor(GrabCutExtractor::default())
            .set_measurer(PixelCountMeasurer::default())
            .build()
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
