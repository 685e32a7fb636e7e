use image::{GrayImage, Luma, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use tracing::debug;

use crate::{
    error::Result,
    traits::ForegroundExtractor,
    types::{Contour, Foreground, Mask},
};

/// Grayscale + automatic (Otsu) threshold + largest external contour.
///
/// The subject is assumed to be darker than its background, so pixels at or
/// below the threshold are the "on" class.
#[derive(Debug, Clone, Default)]
pub struct ThresholdExtractor;

impl ThresholdExtractor {
    /// Inverted Otsu binarization. An image with a single intensity has no
    /// second class to separate, so it binarizes to all-background.
    pub fn binarize(gray: &GrayImage) -> GrayImage {
        let (min, max) = gray
            .pixels()
            .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
        if gray.is_empty() || min == max {
            return GrayImage::new(gray.width(), gray.height());
        }

        let level = imageproc::contrast::otsu_level(gray);
        debug!("Otsu level {} (intensity range {}..={})", level, min, max);

        let mut binary = gray.clone();
        for pixel in binary.pixels_mut() {
            *pixel = Luma([if pixel[0] <= level { Mask::ON } else { Mask::OFF }]);
        }
        binary
    }
}

impl ForegroundExtractor for ThresholdExtractor {
    fn extract(&self, image: &RgbImage) -> Result<Foreground> {
        let gray = image::imageops::grayscale(image);
        let binary = Self::binarize(&gray);
        let object_contour = largest_external_contour(&binary);

        match &object_contour {
            Some(contour) => debug!(
                "Object contour: {} points, {:.1} px²",
                contour.len(),
                contour.area()
            ),
            None => debug!("No object detected"),
        }

        Ok(Foreground {
            mask: Mask::from_gray(&binary),
            object_contour,
        })
    }

    fn name(&self) -> &'static str {
        "threshold"
    }
}

/// Outer borders that are not nested in any other region, largest enclosed
/// area first. Ties keep the first contour found.
pub fn external_contours(binary: &GrayImage) -> Vec<Contour> {
    let mut contours: Vec<Contour> = find_contours::<i32>(binary)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| Contour::new(c.points))
        .collect();

    contours.sort_by(|a, b| {
        b.area()
            .partial_cmp(&a.area())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    contours
}

/// The object contour: the external contour with the largest enclosed area.
pub fn largest_external_contour(binary: &GrayImage) -> Option<Contour> {
    external_contours(binary).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn dark_rect_on_white(width: u32, height: u32, rect: (u32, u32, u32, u32)) -> RgbImage {
        let (rx, ry, rw, rh) = rect;
        RgbImage::from_fn(width, height, |x, y| {
            if x >= rx && x < rx + rw && y >= ry && y < ry + rh {
                Rgb([20, 30, 90])
            } else {
                Rgb([255, 255, 255])
            }
        })
    }

    #[test]
    fn test_uniform_image_has_no_contours() {
        for value in [0u8, 128, 255] {
            let image = RgbImage::from_pixel(50, 40, Rgb([value, value, value]));
            let foreground = ThresholdExtractor.extract(&image).unwrap();
            assert!(foreground.object_contour.is_none());
            assert!(foreground.mask.is_empty());
        }
    }

    #[test]
    fn test_dark_subject_is_on_class() {
        let image = dark_rect_on_white(60, 50, (10, 10, 30, 20));
        let foreground = ThresholdExtractor.extract(&image).unwrap();
        assert_eq!(foreground.mask.foreground_count(), 600);
        assert!(foreground.mask.is_foreground(10, 10));
        assert!(!foreground.mask.is_foreground(5, 5));

        let contour = foreground.object_contour.expect("Should find the rectangle");
        assert!((contour.area() - 29.0 * 19.0).abs() < 1e-6);
    }

    #[test]
    fn test_largest_contour_wins() {
        let mut image = dark_rect_on_white(100, 100, (5, 5, 10, 10));
        for y in 40..90 {
            for x in 30..80 {
                image.put_pixel(x, y, Rgb([20, 30, 90]));
            }
        }
        let foreground = ThresholdExtractor.extract(&image).unwrap();
        let contour = foreground.object_contour.unwrap();
        assert!((contour.area() - 49.0 * 49.0).abs() < 1e-6);
    }

    #[test]
    fn test_nested_regions_are_ignored() {
        // A dark ring with a dark island in its hole: only the ring is external.
        let mut binary = GrayImage::new(60, 60);
        for y in 5..55 {
            for x in 5..55 {
                let inside_hole = (15..45).contains(&x) && (15..45).contains(&y);
                let island = (25..35).contains(&x) && (25..35).contains(&y);
                if !inside_hole || island {
                    binary.put_pixel(x, y, Luma([255]));
                }
            }
        }
        let contours = external_contours(&binary);
        assert_eq!(contours.len(), 1);
        assert!((contours[0].area() - 49.0 * 49.0).abs() < 1e-6);
    }
}
