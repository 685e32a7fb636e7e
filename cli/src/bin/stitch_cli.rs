use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use cli::{load_config, measure_image, ConfigOverrides, JobFile, JobImage, JobOutcome};
use color_eyre::eyre::Result;
use stitch_estimate::{EstimatorConfig, ExtractorKind, PipelineBuilder};
use tracing::{error, info};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about = "Estimate embroidery stitches and cost from a photo", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure a single image
    Measure {
        /// Path to the image (PNG, JPEG, TIFF, ...)
        image: PathBuf,
        /// Requested object width in inches
        #[arg(long)]
        width: Option<f64>,
        /// Requested object length in inches
        #[arg(long)]
        length: Option<f64>,
        /// Estimator configuration (.toml or .json)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Foreground extraction strategy
        #[arg(long)]
        extractor: Option<ExtractorKind>,
        /// Stitches per square inch
        #[arg(long)]
        stitch_density: Option<f64>,
        /// Price per 1000 stitches
        #[arg(long)]
        price_per_thousand: Option<f64>,
        /// DPI assumed when the image carries none
        #[arg(long)]
        default_dpi: Option<f64>,
        /// Directory to write grayscale, mask and contour previews into
        #[arg(long)]
        previews: Option<PathBuf>,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Measure every image listed in a job file, in parallel
    Batch {
        /// Path to the job file (.toml or .json)
        job: PathBuf,
    },
    /// Print the JSON schema of the estimator configuration
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    // Logs go to stderr so JSON on stdout stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Measure {
            image,
            width,
            length,
            config,
            extractor,
            stitch_density,
            price_per_thousand,
            default_dpi,
            previews,
            json,
        } => {
            let overrides = ConfigOverrides {
                extractor,
                stitch_density,
                price_per_thousand,
                default_dpi,
            };
            let job = JobImage {
                path: image,
                width,
                length,
                previews,
            };
            measure(config.as_deref(), &overrides, &job, json)?;
        }
        Commands::Batch { job } => {
            batch(&job).await?;
        }
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&EstimatorConfig::schema())?);
        }
    }

    Ok(())
}

fn measure(
    config_path: Option<&Path>,
    overrides: &ConfigOverrides,
    job: &JobImage,
    json: bool,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => load_config(path)?,
        None => EstimatorConfig::default(),
    };
    overrides.apply(&mut config);

    let pipeline = PipelineBuilder::from_config(&config)?;
    info!("{}", pipeline.info());

    let outcome = measure_image(&pipeline, job)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else if let Some(summary) = &outcome.summary {
        let estimate = &summary.estimate;
        if let Some(dims) = &summary.dimensions {
            println!(
                "Size:     {:.2} x {:.2} in",
                dims.width_inches, dims.length_inches
            );
        }
        println!("Area:     {:.1} sq in", estimate.area_sq_inches);
        println!("Stitches: {}", estimate.stitch_count);
        println!("Cost:     ${:.2}", estimate.cost);
        for path in &outcome.previews {
            println!("Preview:  {}", path.display());
        }
    }

    Ok(())
}

async fn batch(job_path: &Path) -> Result<()> {
    let job = JobFile::from_file(job_path)?;
    let pipeline = Arc::new(PipelineBuilder::from_config(&job.config)?);
    info!("Batch of {} images: {}", job.images.len(), pipeline.info());

    let handles: Vec<_> = job
        .images
        .into_iter()
        .map(|image| {
            let pipeline = Arc::clone(&pipeline);
            let path = image.path.clone();
            let handle =
                tokio::task::spawn_blocking(move || measure_image(&pipeline, &image));
            (path, handle)
        })
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for (path, handle) in handles {
        let outcome = match handle.await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!("{}: {}", path.display(), e);
                JobOutcome::failed(path, e)
            }
            Err(e) => {
                error!("{}: worker failed: {}", path.display(), e);
                JobOutcome::failed(path, e)
            }
        };
        outcomes.push(outcome);
    }

    let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
    info!("✅ Batch finished: {} measured, {} failed", outcomes.len() - failed, failed);
    println!("{}", serde_json::to_string_pretty(&outcomes)?);
    Ok(())
}
