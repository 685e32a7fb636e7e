use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr, VariantNames};

use crate::error::{EstimateError, Result};

/// Which foreground extraction strategy to run.
#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, VariantNames, IntoStaticStr,
    PartialEq, Eq,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExtractorKind {
    /// Otsu threshold on the grayscale image, largest external contour
    #[default]
    Threshold,
    /// Rectangle-seeded iterative colour-model segmentation
    GrabCut,
}

impl ExtractorKind {
    /// The measurement mode that naturally pairs with the extractor.
    pub fn default_measurement(&self) -> MeasureMode {
        match self {
            Self::Threshold => MeasureMode::OrientedBox,
            Self::GrabCut => MeasureMode::PixelCount,
        }
    }
}

/// How the foreground is turned into a physical size.
#[derive(
    Debug, Clone, Copy,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, VariantNames, IntoStaticStr,
    PartialEq, Eq,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MeasureMode {
    /// Foreground pixel count divided by dpi_x * dpi_y
    PixelCount,
    /// Edge lengths of the minimum-area rectangle around the object contour
    OrientedBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Used when the image carries no DPI, or carries an unreliable one
    #[schemars(range(min = 1.0))]
    pub default_dpi: f64,
    /// Embedded DPI below this on either axis is ignored
    pub min_reliable_dpi: f64,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            default_dpi: 300.0,
            min_reliable_dpi: 100.0,
        }
    }
}

impl ResolutionConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.default_dpi.is_finite() && self.default_dpi > 0.0) {
            return invalid(format!("default_dpi must be positive, got {}", self.default_dpi));
        }
        if !self.min_reliable_dpi.is_finite() {
            return invalid("min_reliable_dpi must be finite".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GrabCutConfig {
    #[schemars(range(min = 1, max = 50))]
    pub iterations: usize,
    /// Width of the frame around the seed rectangle assumed to be background
    pub border: u32,
}

impl Default for GrabCutConfig {
    fn default() -> Self {
        Self {
            iterations: 5,
            border: 10,
        }
    }
}

impl GrabCutConfig {
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return invalid("grab_cut.iterations must be at least 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PricingConfig {
    /// Stitches per square inch
    pub stitch_density: f64,
    /// Price charged per 1000 stitches
    pub price_per_thousand: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            stitch_density: 2000.0,
            price_per_thousand: 1.25,
        }
    }
}

impl PricingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.stitch_density.is_finite() && self.stitch_density >= 0.0) {
            return invalid(format!("stitch_density must be non-negative, got {}", self.stitch_density));
        }
        if !(self.price_per_thousand.is_finite() && self.price_per_thousand >= 0.0) {
            return invalid(format!(
                "price_per_thousand must be non-negative, got {}",
                self.price_per_thousand
            ));
        }
        Ok(())
    }
}

/// Full estimator configuration. Every field has a default, so an empty
/// config file is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EstimatorConfig {
    pub extractor: ExtractorKind,
    /// Overrides the measurement mode paired with the extractor
    pub measurement: Option<MeasureMode>,
    pub resolution: ResolutionConfig,
    pub grab_cut: GrabCutConfig,
    pub pricing: PricingConfig,
}

impl EstimatorConfig {
    pub fn measure_mode(&self) -> MeasureMode {
        self.measurement
            .unwrap_or_else(|| self.extractor.default_measurement())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.resolution.validate()?;
        self.grab_cut.validate()?;
        self.pricing.validate()
    }

    /// Get the JSON schema of the configuration
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(EstimatorConfig)
    }
}

fn invalid(message: String) -> Result<()> {
    Err(EstimateError::InvalidConfig(message))
}
