use thiserror::Error;

use crate::types::Stage;

#[derive(Error, Debug)]
pub enum EstimateError {
    #[error("Invalid image: {0}")]
    InvalidImage(#[from] image::ImageError),

    #[error("Invalid {axis} target: {value} (expected a positive number of inches)")]
    InvalidTarget { axis: &'static str, value: f64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<EstimateError>,
    },
}

impl EstimateError {
    /// The pipeline stage the error was raised in, if it was tagged with one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EstimateError>;

/// Tags a failure with the stage that produced it.
pub trait StageContext<T> {
    fn in_stage(self, stage: Stage) -> Result<T>;
}

impl<T, E> StageContext<T> for std::result::Result<T, E>
where
    E: Into<EstimateError>,
{
    fn in_stage(self, stage: Stage) -> Result<T> {
        self.map_err(|source| match source.into() {
            // Keep the innermost stage.
            tagged @ EstimateError::Stage { .. } => tagged,
            source => EstimateError::Stage {
                stage,
                source: Box::new(source),
            },
        })
    }
}
