use std::path::{Path, PathBuf};

use image::{GrayImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;
use tracing::debug;

use crate::{
    algorithms::largest_external_contour,
    error::{EstimateError, Result, StageContext},
    types::{Contour, Foreground, Stage},
};

const CONTOUR_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Display-only rasters derived from one run. Nothing here feeds back into
/// the measurement.
#[derive(Debug, Clone)]
pub struct Previews {
    pub grayscale: GrayImage,
    pub binary: GrayImage,
    pub contours: RgbImage,
    pub composite: RgbImage,
}

impl Previews {
    pub const FILE_NAMES: [&'static str; 4] =
        ["grayscale.png", "binary.png", "contours.png", "foreground.png"];

    pub fn render(image: &RgbImage, foreground: &Foreground) -> Self {
        let binary = foreground.mask.as_image().clone();

        let mut contours = image.clone();
        let traced = match &foreground.object_contour {
            Some(contour) => Some(contour.clone()),
            None => largest_external_contour(&binary),
        };
        if let Some(contour) = &traced {
            draw_closed_contour(&mut contours, contour, CONTOUR_COLOR);
        }

        let composite = RgbImage::from_fn(image.width(), image.height(), |x, y| {
            if foreground.mask.is_foreground(x, y) {
                *image.get_pixel(x, y)
            } else {
                WHITE
            }
        });

        Self {
            grayscale: image::imageops::grayscale(image),
            binary,
            contours,
            composite,
        }
    }

    /// Write all four previews as PNGs into `dir`, returning their paths in
    /// [`Self::FILE_NAMES`] order.
    pub fn save(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let writers: [&dyn Fn(&Path) -> image::ImageResult<()>; 4] = [
            &|path| self.grayscale.save_with_format(path, ImageFormat::Png),
            &|path| self.binary.save_with_format(path, ImageFormat::Png),
            &|path| self.contours.save_with_format(path, ImageFormat::Png),
            &|path| self.composite.save_with_format(path, ImageFormat::Png),
        ];

        let mut paths = Vec::with_capacity(writers.len());
        for (name, write) in Self::FILE_NAMES.iter().zip(writers) {
            let path = dir.join(name);
            save_png(&path, write(&path))?;
            paths.push(path);
        }

        debug!("Wrote {} previews to {}", paths.len(), dir.display());
        Ok(paths)
    }
}

fn save_png(path: &Path, saved: image::ImageResult<()>) -> Result<()> {
    saved
        .map_err(|e| EstimateError::ImageProcessing(format!("{}: {}", path.display(), e)))
        .in_stage(Stage::Preview)
}

fn draw_closed_contour(canvas: &mut RgbImage, contour: &Contour, color: Rgb<u8>) {
    let points = &contour.points;
    for i in 0..points.len() {
        let p1 = points[i];
        let p2 = points[(i + 1) % points.len()];
        draw_line_segment_mut(
            canvas,
            (p1.x as f32, p1.y as f32),
            (p2.x as f32, p2.y as f32),
            color,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{algorithms::ThresholdExtractor, traits::ForegroundExtractor};

    fn dark_square() -> RgbImage {
        RgbImage::from_fn(60, 60, |x, y| {
            if (20..40).contains(&x) && (20..40).contains(&y) {
                Rgb([20, 20, 20])
            } else {
                Rgb([240, 240, 240])
            }
        })
    }

    #[test]
    fn test_render_draws_contour_and_whitens_background() {
        let image = dark_square();
        let foreground = ThresholdExtractor.extract(&image).unwrap();
        let previews = Previews::render(&image, &foreground);

        assert_eq!(previews.grayscale.dimensions(), (60, 60));
        assert_eq!(previews.binary.get_pixel(30, 30)[0], 255);
        assert_eq!(previews.binary.get_pixel(5, 5)[0], 0);
        assert_eq!(*previews.contours.get_pixel(20, 20), CONTOUR_COLOR);
        assert_eq!(*previews.contours.get_pixel(5, 5), Rgb([240, 240, 240]));
        assert_eq!(*previews.composite.get_pixel(5, 5), WHITE);
        assert_eq!(*previews.composite.get_pixel(30, 30), Rgb([20, 20, 20]));
    }

    #[test]
    fn test_save_writes_pngs() {
        let dir = tempfile::tempdir().unwrap();
        let pixels = dark_square();
        let foreground = ThresholdExtractor.extract(&pixels).unwrap();
        let paths = Previews::render(&pixels, &foreground).save(dir.path()).unwrap();

        assert_eq!(paths.len(), 4);
        for (path, name) in paths.iter().zip(Previews::FILE_NAMES) {
            assert_eq!(path, &dir.path().join(name));
            assert!(path.exists(), "{} missing", path.display());
        }
        let reloaded = image::open(&paths[1]).unwrap().to_luma8();
        assert_eq!(reloaded.get_pixel(30, 30)[0], 255);
    }

    #[test]
    fn test_save_into_missing_dir_reports_preview_stage() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does/not/exist");
        let previews = Previews::render(&dark_square(), &Foreground::nothing(60, 60));
        let err = previews.save(&missing).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Preview));
    }
}
