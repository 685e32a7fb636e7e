//! # Stitch Estimation Library
//!
//! Estimates the embroidery stitch count and price of the object in a photo.
//! A measurement runs four stages in order:
//!
//! - **Resolution**: the image's DPI, from embedded metadata or a default when
//!   the metadata is missing or implausibly low
//! - **Segmentation**: a binary foreground mask, by Otsu threshold plus
//!   external contours or by rectangle-seeded GrabCut
//! - **Measurement**: physical size, either foreground pixel count over DPI²
//!   or the minimum-area rectangle of the object contour, optionally scaled
//!   to a requested width and/or length
//! - **Estimation**: `stitches = area · density`, `cost = stitches / 1000 · price`
//!
//! An image with no detectable object yields an all-zero estimate, not an error.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stitch_estimate::{Pipeline, RasterImage, ScaleRequest};
//!
//! let pipeline = Pipeline::builder().build();
//!
//! let image = RasterImage::open("patch.png")?;
//! let output = pipeline.process(&image, &ScaleRequest::none())?;
//!
//! let report = output.result.report();
//! println!("{} in², {} stitches, ${}", report.area_sq_inches, report.stitch_count, report.cost);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Configured Pipeline
//!
//! ```rust,no_run
//! use stitch_estimate::{EstimatorConfig, ExtractorKind, PipelineBuilder, ScaleRequest};
//!
//! let config = EstimatorConfig {
//!     extractor: ExtractorKind::GrabCut,
//!     ..Default::default()
//! };
//! let pipeline = PipelineBuilder::from_config(&config)?;
//!
//! // Scale so the object is 4 inches long.
//! let request = ScaleRequest::new(None, Some(4.0))?;
//! let output = pipeline.process_bytes(&std::fs::read("patch.jpg")?, &request)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Core modules
pub mod error;
pub mod types;
pub mod traits;
pub mod algorithms;
pub mod pipeline;
pub mod config;
pub mod visualize;
pub mod scratch;

// Re-exports for convenience
pub use error::{EstimateError, Result, StageContext};
pub use types::*;
pub use traits::*;
pub use algorithms::*;
pub use config::*;
pub use pipeline::{builder::PipelineBuilder, MeasurementSummary, Pipeline, PipelineOutput};
pub use scratch::ScratchArea;
pub use visualize::Previews;

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
    const INK: Rgb<u8> = Rgb([30, 30, 30]);

    fn centered_rect(width: u32, height: u32, rect_w: u32, rect_h: u32) -> RgbImage {
        let x0 = (width - rect_w) / 2;
        let y0 = (height - rect_h) / 2;
        let mut image = RgbImage::from_pixel(width, height, WHITE);
        for y in y0..y0 + rect_h {
            for x in x0..x0 + rect_w {
                image.put_pixel(x, y, INK);
            }
        }
        image
    }

    fn encode_png(image: &RgbImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_end_to_end_rectangle_at_300_dpi() {
        let image = RasterImage::with_dpi(centered_rect(1200, 900, 600, 300), 300.0, 300.0);
        let output = Pipeline::builder()
            .build()
            .process(&image, &ScaleRequest::none())
            .unwrap();

        let result = output.result;
        assert!((result.area_sq_inches - 2.0).abs() / 2.0 < 0.02);
        assert!((result.cost - 5.0).abs() / 5.0 < 0.02);

        let report = result.report();
        assert_eq!(report.stitch_count, (result.area_sq_inches * 2000.0).round() as u64);

        let dims = output.dimensions.unwrap();
        assert!((dims.length_inches - 2.0).abs() / 2.0 < 0.02);
        assert!((dims.width_inches - 1.0).abs() < 0.02);
    }

    #[test]
    fn test_uniform_image_is_zero() {
        let image = RasterImage::new(RgbImage::from_pixel(200, 100, Rgb([90, 140, 200])));
        for pipeline in [PipelineBuilder::build_threshold(), PipelineBuilder::build_grab_cut()] {
            let output = pipeline.process(&image, &ScaleRequest::none()).unwrap();
            assert!(output.result.is_zero(), "{}", pipeline.info());
        }
    }

    #[test]
    fn test_low_embedded_dpi_falls_back_to_default() {
        let pixels = centered_rect(1200, 900, 600, 300);
        let pipeline = PipelineBuilder::build_threshold();

        let at_72 = pipeline
            .process(&RasterImage::with_dpi(pixels.clone(), 72.0, 72.0), &ScaleRequest::none())
            .unwrap();
        let at_300 = pipeline
            .process(&RasterImage::with_dpi(pixels, 300.0, 300.0), &ScaleRequest::none())
            .unwrap();

        assert_eq!(at_72.dpi, Dpi::uniform(300.0));
        assert_eq!(at_72.result, at_300.result);
    }

    #[test]
    fn test_decoded_png_without_density_uses_default() {
        let bytes = encode_png(&centered_rect(600, 600, 300, 150));
        let output = PipelineBuilder::build_threshold()
            .process_bytes(&bytes, &ScaleRequest::none())
            .unwrap();
        assert_eq!(output.dpi, Dpi::uniform(300.0));
        assert!((output.result.area_sq_inches - 0.5).abs() / 0.5 < 0.03);
    }

    #[test]
    fn test_decoded_tiff_uses_embedded_600_dpi() {
        let pixels = centered_rect(1200, 900, 600, 300);
        let mut bytes = Cursor::new(Vec::new());
        let mut encoder = tiff::encoder::TiffEncoder::new(&mut bytes).unwrap();
        let mut tiff_image = encoder
            .new_image::<tiff::encoder::colortype::RGB8>(1200, 900)
            .unwrap();
        tiff_image.resolution(
            tiff::tags::ResolutionUnit::Inch,
            tiff::encoder::Rational { n: 600, d: 1 },
        );
        tiff_image.write_data(pixels.as_raw()).unwrap();

        let output = PipelineBuilder::build_threshold()
            .process_bytes(&bytes.into_inner(), &ScaleRequest::none())
            .unwrap();
        assert_eq!(output.dpi, Dpi::uniform(600.0));
        // 600 x 300 px at 600 dpi.
        assert!((output.result.area_sq_inches - 0.5).abs() / 0.5 < 0.02);
    }

    #[test]
    fn test_undecodable_bytes_fail_in_decode_stage() {
        let err = PipelineBuilder::build_threshold()
            .process_bytes(b"definitely not an image", &ScaleRequest::none())
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Decode));
        match err {
            EstimateError::Stage { source, .. } => {
                assert!(matches!(*source, EstimateError::InvalidImage(_)))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_target_rejected_before_scaling() {
        assert!(matches!(
            ScaleRequest::new(Some(-1.0), None),
            Err(EstimateError::InvalidTarget { axis: "width", .. })
        ));
        assert!(ScaleRequest::new(None, Some(f64::NAN)).is_err());
    }

    #[test]
    fn test_doubling_single_target_scales_estimate_consistently() {
        let image = RasterImage::with_dpi(centered_rect(1200, 900, 600, 300), 300.0, 300.0);
        let pipeline = PipelineBuilder::build_threshold();

        let small = pipeline
            .process(&image, &ScaleRequest::new(None, Some(3.0)).unwrap())
            .unwrap()
            .result;
        let large = pipeline
            .process(&image, &ScaleRequest::new(None, Some(6.0)).unwrap())
            .unwrap()
            .result;

        let factor = large.area_sq_inches / small.area_sq_inches;
        assert!(factor > 1.0);
        assert!((large.stitch_count / small.stitch_count - factor).abs() < 1e-9);
        assert!((large.cost / small.cost - factor).abs() < 1e-9);
    }

    #[test]
    fn test_requested_length_sets_length() {
        let image = RasterImage::with_dpi(centered_rect(1200, 900, 600, 300), 300.0, 300.0);
        let output = PipelineBuilder::build_threshold()
            .process(&image, &ScaleRequest::new(None, Some(4.0)).unwrap())
            .unwrap();
        let dims = output.dimensions.unwrap();
        assert!((dims.length_inches - 4.0).abs() < 1e-9);
        let aspect = dims.length_inches / dims.width_inches;
        assert!((aspect - 2.0).abs() / 2.0 < 0.02);
    }

    #[test]
    fn test_grab_cut_pipeline_counts_object_pixels() {
        let mut pixels = RgbImage::from_pixel(80, 60, Rgb([245, 245, 245]));
        for y in 20..40 {
            for x in 25..55 {
                pixels.put_pixel(x, y, Rgb([180, 20, 30]));
            }
        }
        let image = RasterImage::with_dpi(pixels, 100.0, 100.0);
        let output = PipelineBuilder::build_grab_cut()
            .process(&image, &ScaleRequest::none())
            .unwrap();

        // 30 x 20 px at 100 dpi.
        let count = output.foreground.mask.foreground_count();
        assert!((count as f64 - 600.0).abs() <= 30.0, "{count} foreground pixels");
        assert!((output.result.area_sq_inches - count as f64 / 10_000.0).abs() < 1e-12);
        assert!(output.dimensions.is_none());
    }

    #[test]
    fn test_summary_serialises_rounded_report() {
        let image = RasterImage::with_dpi(centered_rect(1200, 900, 600, 300), 300.0, 300.0);
        let output = PipelineBuilder::build_threshold()
            .process(&image, &ScaleRequest::none())
            .unwrap();
        let json = serde_json::to_value(output.summary()).unwrap();
        assert_eq!(json["estimate"]["area_sq_inches"], 2.0);
        assert_eq!(json["dpi"]["x"], 300.0);
        assert!(json["dimensions"]["length_inches"].is_number());
    }

    #[test]
    fn test_stage_tag_keeps_innermost() {
        let inner: Result<()> = Err(EstimateError::ImageProcessing("boom".into()));
        let err = inner
            .in_stage(Stage::Scaling)
            .in_stage(Stage::Measurement)
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Scaling));
        assert!(err.to_string().starts_with("scaling stage failed"));
    }
}
