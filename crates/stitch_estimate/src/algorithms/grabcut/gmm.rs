//! Gaussian mixture colour model used by GrabCut.

pub type Color = [f64; 3];

pub const COMPONENTS: usize = 5;
const KMEANS_ITERATIONS: usize = 10;
const REGULARIZATION: f64 = 0.01;

#[derive(Debug, Clone, Copy, Default)]
struct Component {
    weight: f64,
    mean: Color,
    inverse: [[f64; 3]; 3],
    determinant: f64,
}

impl Component {
    /// Unnormalised Gaussian density, the constant (2π)^-3/2 is dropped.
    fn density(&self, color: &Color) -> f64 {
        if self.weight <= 0.0 {
            return 0.0;
        }
        let d = [
            color[0] - self.mean[0],
            color[1] - self.mean[1],
            color[2] - self.mean[2],
        ];
        let mut mahalanobis = 0.0;
        for (i, row) in self.inverse.iter().enumerate() {
            mahalanobis += d[i] * (row[0] * d[0] + row[1] * d[1] + row[2] * d[2]);
        }
        (-0.5 * mahalanobis).exp() / self.determinant.sqrt()
    }
}

/// Running sums for one component while learning.
#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    count: usize,
    sum: Color,
    products: [[f64; 3]; 3],
}

impl Accumulator {
    fn add(&mut self, color: &Color) {
        self.count += 1;
        for i in 0..3 {
            self.sum[i] += color[i];
            for j in 0..3 {
                self.products[i][j] += color[i] * color[j];
            }
        }
    }

    fn finish(&self, total: usize) -> Component {
        if self.count == 0 {
            return Component::default();
        }
        let n = self.count as f64;
        let mean = [self.sum[0] / n, self.sum[1] / n, self.sum[2] / n];
        let mut covariance = [[0.0; 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                covariance[i][j] = self.products[i][j] / n - mean[i] * mean[j];
            }
        }

        let mut determinant = determinant(&covariance);
        if determinant <= f64::EPSILON {
            for (i, row) in covariance.iter_mut().enumerate() {
                row[i] += REGULARIZATION;
            }
            determinant = self::determinant(&covariance);
        }

        Component {
            weight: n / total as f64,
            mean,
            inverse: inverse(&covariance, determinant),
            determinant,
        }
    }
}

fn determinant(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn inverse(m: &[[f64; 3]; 3], det: f64) -> [[f64; 3]; 3] {
    [
        [
            (m[1][1] * m[2][2] - m[1][2] * m[2][1]) / det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) / det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) / det,
        ],
        [
            (m[1][2] * m[2][0] - m[1][0] * m[2][2]) / det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) / det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) / det,
        ],
        [
            (m[1][0] * m[2][1] - m[1][1] * m[2][0]) / det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) / det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) / det,
        ],
    ]
}

fn squared_distance(a: &Color, b: &Color) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

#[derive(Debug, Clone, Default)]
pub struct Gmm {
    components: [Component; COMPONENTS],
}

impl Gmm {
    /// Fit from scratch: k-means clustering, then one learning pass.
    pub fn fit(samples: &[Color]) -> Self {
        let labels = kmeans(samples);
        let mut gmm = Self::default();
        gmm.learn(samples, &labels);
        gmm
    }

    /// Re-estimate every component from samples and their component labels.
    pub fn learn(&mut self, samples: &[Color], labels: &[usize]) {
        let mut accumulators = [Accumulator::default(); COMPONENTS];
        for (color, &label) in samples.iter().zip(labels) {
            accumulators[label].add(color);
        }
        for (component, accumulator) in self.components.iter_mut().zip(&accumulators) {
            *component = accumulator.finish(samples.len());
        }
    }

    /// Weighted mixture density of a colour.
    pub fn density(&self, color: &Color) -> f64 {
        self.components
            .iter()
            .map(|c| c.weight * c.density(color))
            .sum()
    }

    /// The component most likely to have produced the colour.
    pub fn most_likely_component(&self, color: &Color) -> usize {
        let mut best = 0;
        let mut best_density = f64::NEG_INFINITY;
        for (i, component) in self.components.iter().enumerate() {
            let density = component.density(color);
            if density > best_density {
                best = i;
                best_density = density;
            }
        }
        best
    }
}

/// Deterministic k-means: farthest-point seeding, then Lloyd iterations.
fn kmeans(samples: &[Color]) -> Vec<usize> {
    if samples.is_empty() {
        return Vec::new();
    }

    let mut centers: Vec<Color> = vec![samples[samples.len() / 2]];
    let mut nearest: Vec<f64> = samples
        .iter()
        .map(|s| squared_distance(s, &centers[0]))
        .collect();
    while centers.len() < COMPONENTS {
        let (farthest, distance) = nearest
            .iter()
            .copied()
            .enumerate()
            .fold((0, 0.0), |best, (i, d)| if d > best.1 { (i, d) } else { best });
        if distance == 0.0 {
            // Fewer distinct colours than components.
            break;
        }
        let center = samples[farthest];
        for (n, s) in nearest.iter_mut().zip(samples) {
            *n = n.min(squared_distance(s, &center));
        }
        centers.push(center);
    }

    let mut labels = vec![0; samples.len()];
    for _ in 0..KMEANS_ITERATIONS {
        let mut changed = false;
        for (label, sample) in labels.iter_mut().zip(samples) {
            let closest = (0..centers.len())
                .min_by(|&a, &b| {
                    squared_distance(sample, &centers[a])
                        .partial_cmp(&squared_distance(sample, &centers[b]))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .unwrap_or(0);
            if *label != closest {
                *label = closest;
                changed = true;
            }
        }

        let mut sums = vec![([0.0; 3], 0usize); centers.len()];
        for (&label, sample) in labels.iter().zip(samples) {
            for i in 0..3 {
                sums[label].0[i] += sample[i];
            }
            sums[label].1 += 1;
        }
        for (center, (sum, count)) in centers.iter_mut().zip(&sums) {
            if *count > 0 {
                let n = *count as f64;
                *center = [sum[0] / n, sum[1] / n, sum[2] / n];
            }
        }

        if !changed {
            break;
        }
    }
    labels
}
