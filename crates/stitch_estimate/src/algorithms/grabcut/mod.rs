//! Rectangle-seeded iterative segmentation (GrabCut).
//!
//! Pixels outside an inset rectangle are fixed as background. Two colour
//! mixtures, one per class, are refined over a fixed number of iterations;
//! each iteration relabels the undecided pixels with a minimum graph cut that
//! trades colour likelihood against an 8-connected smoothness term.

pub mod gmm;
pub mod graph;

use image::RgbImage;
use tracing::debug;

use crate::{
    config::GrabCutConfig,
    error::Result,
    traits::ForegroundExtractor,
    types::{Foreground, Mask},
};
use gmm::{Color, Gmm};
use graph::CutGraph;

const GAMMA: f64 = 50.0;
const LAMBDA: f64 = 9.0 * GAMMA;

/// Per-pixel segmentation label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Label {
    Background = 0,
    Foreground = 1,
    ProbableBackground = 2,
    ProbableForeground = 3,
}

impl Label {
    pub fn is_foreground(self) -> bool {
        matches!(self, Self::Foreground | Self::ProbableForeground)
    }

    fn is_fixed(self) -> bool {
        matches!(self, Self::Background | Self::Foreground)
    }
}

/// Label for every pixel, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMap {
    width: u32,
    height: u32,
    labels: Vec<Label>,
}

impl LabelMap {
    /// Everything inside the rectangle inset by `border` is probable
    /// foreground; the frame around it is definite background.
    pub fn from_inset_rect(width: u32, height: u32, border: u32) -> Self {
        let inside = |v: u32, extent: u32| v >= border && v + border < extent;
        let labels = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| {
                if inside(x, width) && inside(y, height) {
                    Label::ProbableForeground
                } else {
                    Label::Background
                }
            })
            .collect();
        Self {
            width,
            height,
            labels,
        }
    }

    pub fn get(&self, x: u32, y: u32) -> Label {
        self.labels[(y * self.width + x) as usize]
    }

    /// Collapse to a binary mask: definite and probable background are off.
    pub fn to_mask(&self) -> Mask {
        Mask::from_fn(self.width, self.height, |x, y| self.get(x, y).is_foreground())
    }
}

/// Neighbour offsets already visited in row-major order: left, up-left, up, up-right.
static NEIGHBOURS: [(i64, i64, f64); 4] = [
    (-1, 0, 1.0),
    (-1, -1, std::f64::consts::FRAC_1_SQRT_2),
    (0, -1, 1.0),
    (1, -1, std::f64::consts::FRAC_1_SQRT_2),
];

fn neighbours(x: u32, y: u32, width: u32) -> impl Iterator<Item = (u32, u32, f64)> {
    NEIGHBOURS.iter().filter_map(move |&(dx, dy, scale)| {
        let nx = x as i64 + dx;
        let ny = y as i64 + dy;
        (nx >= 0 && ny >= 0 && nx < width as i64).then_some((nx as u32, ny as u32, scale))
    })
}

fn color_distance(a: &Color, b: &Color) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

/// β = 1 / (2 · mean squared colour difference between neighbours); 0 for a flat image.
fn smoothness_beta(colors: &[Color], width: u32, height: u32) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for y in 0..height {
        for x in 0..width {
            let c = &colors[(y * width + x) as usize];
            for (nx, ny, _) in neighbours(x, y, width) {
                sum += color_distance(c, &colors[(ny * width + nx) as usize]);
                count += 1;
            }
        }
    }
    if count == 0 || sum <= f64::EPSILON {
        0.0
    } else {
        1.0 / (2.0 * sum / count as f64)
    }
}

/// Colour-model segmentation seeded from an inset rectangle.
#[derive(Debug, Clone, Default)]
pub struct GrabCutExtractor {
    config: GrabCutConfig,
}

impl GrabCutExtractor {
    pub fn new(config: GrabCutConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Run the iterations and return the final per-pixel labels.
    pub fn segment(&self, image: &RgbImage) -> LabelMap {
        let (width, height) = image.dimensions();
        let mut labels = LabelMap::from_inset_rect(width, height, self.config.border);

        let colors: Vec<Color> = image
            .pixels()
            .map(|p| [p[0] as f64, p[1] as f64, p[2] as f64])
            .collect();

        let (mut background, mut foreground) = match split_samples(&colors, &labels) {
            Some((bg, fg)) => (Gmm::fit(&bg), Gmm::fit(&fg)),
            None => {
                debug!("Seed rectangle leaves no samples for one class, skipping segmentation");
                return LabelMap {
                    width,
                    height,
                    labels: vec![Label::Background; (width * height) as usize],
                };
            }
        };

        let beta = smoothness_beta(&colors, width, height);
        debug!("GrabCut on {}x{}, beta = {:.6}", width, height, beta);

        for iteration in 0..self.config.iterations {
            // Learn both mixtures from the current labelling.
            let Some((bg_samples, fg_samples)) = split_samples(&colors, &labels) else {
                debug!("Iteration {}: one class became empty, stopping", iteration);
                break;
            };
            let bg_components: Vec<usize> = bg_samples
                .iter()
                .map(|c| background.most_likely_component(c))
                .collect();
            let fg_components: Vec<usize> = fg_samples
                .iter()
                .map(|c| foreground.most_likely_component(c))
                .collect();
            background.learn(&bg_samples, &bg_components);
            foreground.learn(&fg_samples, &fg_components);

            let mut graph = build_graph(&colors, &labels, &background, &foreground, beta);
            let flow = graph.max_flow();
            let source_side = graph.source_segment();

            let mut changed = 0usize;
            for (label, &in_source) in labels.labels.iter_mut().zip(&source_side) {
                if label.is_fixed() {
                    continue;
                }
                let relabelled = if in_source {
                    Label::ProbableForeground
                } else {
                    Label::ProbableBackground
                };
                if *label != relabelled {
                    changed += 1;
                    *label = relabelled;
                }
            }
            debug!("Iteration {}: flow {:.1}, {} pixels relabelled", iteration, flow, changed);
        }

        labels
    }
}

fn split_samples(colors: &[Color], labels: &LabelMap) -> Option<(Vec<Color>, Vec<Color>)> {
    let (mut background, mut foreground) = (Vec::new(), Vec::new());
    for (color, label) in colors.iter().zip(&labels.labels) {
        if label.is_foreground() {
            foreground.push(*color);
        } else {
            background.push(*color);
        }
    }
    (!background.is_empty() && !foreground.is_empty()).then_some((background, foreground))
}

fn data_cost(gmm: &Gmm, color: &Color) -> f64 {
    -gmm.density(color).max(f64::MIN_POSITIVE).ln()
}

fn build_graph(
    colors: &[Color],
    labels: &LabelMap,
    background: &Gmm,
    foreground: &Gmm,
    beta: f64,
) -> CutGraph {
    let (width, height) = (labels.width, labels.height);
    let nodes = (width * height) as usize;
    let mut graph = CutGraph::new(nodes, nodes * 5);

    for y in 0..height {
        for x in 0..width {
            let index = (y * width + x) as usize;
            let color = &colors[index];

            let (from_source, to_sink) = match labels.labels[index] {
                Label::Background => (0.0, LAMBDA),
                Label::Foreground => (LAMBDA, 0.0),
                _ => (data_cost(background, color), data_cost(foreground, color)),
            };
            graph.add_terminal_weights(index, from_source, to_sink);

            for (nx, ny, scale) in neighbours(x, y, width) {
                let neighbour = (ny * width + nx) as usize;
                let weight =
                    GAMMA * scale * (-beta * color_distance(color, &colors[neighbour])).exp();
                graph.add_edge(index, neighbour, weight, weight);
            }
        }
    }
    graph
}

impl ForegroundExtractor for GrabCutExtractor {
    fn extract(&self, image: &RgbImage) -> Result<Foreground> {
        let mask = self.segment(image).to_mask();
        debug!("GrabCut foreground: {} pixels", mask.foreground_count());
        Ok(Foreground {
            mask,
            object_contour: None,
        })
    }

    fn name(&self) -> &'static str {
        "grab_cut"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn red_rect_on_white(width: u32, height: u32, rect: (u32, u32, u32, u32)) -> RgbImage {
        let (rx, ry, rw, rh) = rect;
        RgbImage::from_fn(width, height, |x, y| {
            if x >= rx && x < rx + rw && y >= ry && y < ry + rh {
                Rgb([200, 30, 40])
            } else {
                Rgb([250, 250, 250])
            }
        })
    }

    #[test]
    fn test_seed_rectangle_is_inset_on_every_side() {
        let labels = LabelMap::from_inset_rect(40, 30, 10);
        assert_eq!(labels.get(9, 15), Label::Background);
        assert_eq!(labels.get(10, 10), Label::ProbableForeground);
        assert_eq!(labels.get(29, 19), Label::ProbableForeground);
        assert_eq!(labels.get(30, 19), Label::Background);
        assert_eq!(labels.get(29, 20), Label::Background);
        assert_eq!(labels.to_mask().foreground_count(), 20 * 10);
    }

    #[test]
    fn test_labels_collapse_to_mask() {
        assert!(Label::Foreground.is_foreground());
        assert!(Label::ProbableForeground.is_foreground());
        assert!(!Label::Background.is_foreground());
        assert!(!Label::ProbableBackground.is_foreground());
    }

    #[test]
    fn test_segments_subject_from_plain_background() {
        let image = red_rect_on_white(60, 50, (20, 15, 20, 20));
        let foreground = GrabCutExtractor::default().extract(&image).unwrap();

        assert_eq!(foreground.mask.dimensions(), (60, 50));
        let count = foreground.mask.foreground_count();
        assert!((count as i64 - 400).abs() <= 20, "{count} foreground pixels");
        assert!(foreground.mask.is_foreground(30, 25));
        assert!(!foreground.mask.is_foreground(12, 12));
    }

    #[test]
    fn test_too_small_image_detects_nothing() {
        let image = red_rect_on_white(15, 15, (5, 5, 5, 5));
        let foreground = GrabCutExtractor::default().extract(&image).unwrap();
        assert!(foreground.mask.is_empty());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let config = GrabCutConfig {
            iterations: 0,
            ..Default::default()
        };
        assert!(GrabCutExtractor::new(config).is_err());
    }

    #[test]
    fn test_flat_image_has_zero_beta() {
        let colors = vec![[10.0, 10.0, 10.0]; 16];
        assert_eq!(smoothness_beta(&colors, 4, 4), 0.0);
    }
}
