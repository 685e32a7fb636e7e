use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use stitch_estimate::{
    EstimateError, EstimatorConfig, ExtractorKind, MeasurementSummary, Pipeline, Previews,
    RasterImage, ScaleRequest, ScratchArea, Stage, StageContext,
};

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    Estimate(#[from] EstimateError),
    #[error("Job file lists no images")]
    NoImages,
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
}

/// One image to measure, with optional target dimensions in inches.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct JobImage {
    pub path: PathBuf,
    pub width: Option<f64>,
    pub length: Option<f64>,
    /// Directory to copy preview rasters into
    pub previews: Option<PathBuf>,
}

impl JobImage {
    pub fn request(&self) -> Result<ScaleRequest, CliError> {
        Ok(ScaleRequest::new(self.width, self.length)?)
    }
}

/// A batch of measurements sharing one configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct JobFile {
    #[serde(default)]
    pub config: EstimatorConfig,
    pub images: Vec<JobImage>,
}

impl JobFile {
    /// Load a job file from TOML string
    pub fn from_toml(content: &str) -> Result<Self, CliError> {
        let job: JobFile = toml::from_str(content)?;
        job.check()
    }

    /// Load a job file from JSON string
    pub fn from_json(content: &str) -> Result<Self, CliError> {
        let job: JobFile = serde_json::from_str(content)?;
        job.check()
    }

    /// Auto-detect file format and load the job
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let mut job = match format_of(path.as_ref())? {
            FileFormat::Toml => Self::from_toml(&fs::read_to_string(path.as_ref())?)?,
            FileFormat::Json => Self::from_json(&fs::read_to_string(path.as_ref())?)?,
        };
        // Image paths are relative to the job file.
        if let Some(base) = path.as_ref().parent() {
            for image in &mut job.images {
                if image.path.is_relative() {
                    image.path = base.join(&image.path);
                }
            }
        }
        Ok(job)
    }

    fn check(self) -> Result<Self, CliError> {
        if self.images.is_empty() {
            return Err(CliError::NoImages);
        }
        Ok(self)
    }
}

enum FileFormat {
    Toml,
    Json,
}

fn format_of(path: &Path) -> Result<FileFormat, CliError> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => Ok(FileFormat::Toml),
        Some("json") => Ok(FileFormat::Json),
        _ => Err(CliError::UnsupportedFileFormat),
    }
}

/// Load an [`EstimatorConfig`] from a `.toml` or `.json` file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EstimatorConfig, CliError> {
    let content = fs::read_to_string(path.as_ref())?;
    let config = match format_of(path.as_ref())? {
        FileFormat::Toml => toml::from_str(&content)?,
        FileFormat::Json => serde_json::from_str(&content)?,
    };
    Ok(config)
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub extractor: Option<ExtractorKind>,
    pub stitch_density: Option<f64>,
    pub price_per_thousand: Option<f64>,
    pub default_dpi: Option<f64>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut EstimatorConfig) {
        if let Some(extractor) = self.extractor {
            config.extractor = extractor;
        }
        if let Some(density) = self.stitch_density {
            config.pricing.stitch_density = density;
        }
        if let Some(price) = self.price_per_thousand {
            config.pricing.price_per_thousand = price;
        }
        if let Some(dpi) = self.default_dpi {
            config.resolution.default_dpi = dpi;
        }
    }
}

/// Outcome of one image. A failed image carries its error instead of a summary
/// so one bad file does not sink a batch.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct JobOutcome {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<MeasurementSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub previews: Vec<PathBuf>,
}

impl JobOutcome {
    pub fn failed(path: PathBuf, error: impl std::fmt::Display) -> Self {
        Self {
            path,
            summary: None,
            error: Some(error.to_string()),
            previews: Vec::new(),
        }
    }
}

/// Measure one image. Previews, when asked for, are rendered into a private
/// scratch area and copied out, so concurrent jobs never share files.
pub fn measure_image(pipeline: &Pipeline, job: &JobImage) -> Result<JobOutcome, CliError> {
    let request = job.request()?;
    let image = RasterImage::open(&job.path).in_stage(Stage::Decode)?;
    let output = pipeline.process(&image, &request)?;

    let previews = match &job.previews {
        Some(target) => {
            let scratch = ScratchArea::new()?;
            scratch.write_previews(&Previews::render(image.pixels(), &output.foreground))?;
            let stem = job
                .path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or("image");
            let copied = scratch.persist_into(target, stem)?;
            scratch.close()?;
            copied
        }
        None => Vec::new(),
    };

    let summary = output.summary();
    info!(
        "{}: {} in², {} stitches, {:.2}",
        job.path.display(),
        summary.estimate.area_sq_inches,
        summary.estimate.stitch_count,
        summary.estimate.cost
    );
    if summary.estimate.stitch_count == 0 {
        warn!("{}: no object detected", job.path.display());
    }

    Ok(JobOutcome {
        path: job.path.clone(),
        summary: Some(summary),
        error: None,
        previews,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use stitch_estimate::PipelineBuilder;

    #[test]
    fn test_job_from_toml() {
        let job = JobFile::from_toml(
            r#"
            [config]
            extractor = "grab_cut"

            [config.pricing]
            price_per_thousand = 2.0

            [[images]]
            path = "a.png"
            length = 4.0

            [[images]]
            path = "b.jpg"
            "#,
        )
        .unwrap();
        assert_eq!(job.config.extractor, ExtractorKind::GrabCut);
        assert_eq!(job.config.pricing.price_per_thousand, 2.0);
        assert_eq!(job.config.pricing.stitch_density, 2000.0);
        assert_eq!(job.images.len(), 2);
        assert_eq!(job.images[0].length, Some(4.0));
        assert!(job.images[1].request().unwrap().is_empty());
    }

    #[test]
    fn test_job_from_json_without_config() {
        let job = JobFile::from_json(r#"{ "images": [{ "path": "x.png", "width": 3.5 }] }"#).unwrap();
        assert_eq!(job.config, EstimatorConfig::default());
        assert_eq!(job.images[0].request().unwrap().width(), Some(3.5));
    }

    #[test]
    fn test_empty_job_rejected() {
        assert!(matches!(
            JobFile::from_json(r#"{ "images": [] }"#),
            Err(CliError::NoImages)
        ));
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(matches!(
            JobFile::from_file("jobs.yaml"),
            Err(CliError::UnsupportedFileFormat)
        ));
    }

    #[test]
    fn test_relative_paths_resolve_against_job_file() {
        let dir = tempfile::tempdir().unwrap();
        let job_path = dir.path().join("job.json");
        fs::write(&job_path, r#"{ "images": [{ "path": "patch.png" }] }"#).unwrap();
        let job = JobFile::from_file(&job_path).unwrap();
        assert_eq!(job.images[0].path, dir.path().join("patch.png"));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut config = EstimatorConfig::default();
        ConfigOverrides {
            extractor: Some(ExtractorKind::GrabCut),
            price_per_thousand: Some(3.0),
            ..Default::default()
        }
        .apply(&mut config);
        assert_eq!(config.extractor, ExtractorKind::GrabCut);
        assert_eq!(config.pricing.price_per_thousand, 3.0);
        assert_eq!(config.resolution.default_dpi, 300.0);
    }

    #[test]
    fn test_load_config_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("estimator.toml");
        fs::write(&path, "[resolution]\ndefault_dpi = 150.0\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.resolution.default_dpi, 150.0);
        assert_eq!(config.resolution.min_reliable_dpi, 100.0);
    }

    #[test]
    fn test_measure_image_with_previews() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("patch.png");
        let mut pixels = RgbImage::from_pixel(600, 600, Rgb([255, 255, 255]));
        for y in 225..375 {
            for x in 150..450 {
                pixels.put_pixel(x, y, Rgb([10, 10, 10]));
            }
        }
        pixels.save(&image_path).unwrap();

        let job = JobImage {
            path: image_path,
            width: None,
            length: None,
            previews: Some(dir.path().join("previews")),
        };
        let outcome = measure_image(&PipelineBuilder::build_threshold(), &job).unwrap();
        let summary = outcome.summary.unwrap();
        assert!((summary.estimate.area_sq_inches - 0.5).abs() < 0.05);
        assert_eq!(outcome.previews.len(), 4);
        assert!(dir.path().join("previews/patch-foreground.png").exists());
    }

    #[test]
    fn test_two_images_share_a_previews_dir() {
        let dir = tempfile::tempdir().unwrap();
        let previews = dir.path().join("previews");
        let pipeline = PipelineBuilder::build_threshold();

        for name in ["left.png", "right.png"] {
            let path = dir.path().join(name);
            RgbImage::from_pixel(40, 40, Rgb([255, 255, 255])).save(&path).unwrap();
            let job = JobImage {
                path,
                width: None,
                length: None,
                previews: Some(previews.clone()),
            };
            measure_image(&pipeline, &job).unwrap();
        }

        assert_eq!(fs::read_dir(&previews).unwrap().count(), 8);
        assert!(previews.join("left-contours.png").exists());
        assert!(previews.join("right-contours.png").exists());
    }

    #[test]
    fn test_measure_missing_image_fails_in_decode() {
        let job = JobImage {
            path: PathBuf::from("/nonexistent/patch.png"),
            width: None,
            length: None,
            previews: None,
        };
        match measure_image(&PipelineBuilder::build_threshold(), &job) {
            Err(CliError::Estimate(err)) => assert_eq!(err.stage(), Some(Stage::Decode)),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
