//! Gaussian mixture over 3-D points with full covariance
//!
//! Points carry integer weights so a population with many repeated samples
//! (8-bit HSV triples repeat heavily) can be fitted over its distinct values.
//! Fitting is expectation-maximisation from a seeded k-means++ start, so the
//! same data and seed always give the same components.

use crate::error::{PianoError, Result as PianoResult};
use ndarray::Array2;
use rand::prelude::*;

pub type Point = [f64; 3];
type Matrix = [[f64; 3]; 3];

const LN_2PI: f64 = 1.837_877_066_409_345_3;

/// One Gaussian component
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianComponent {
    pub weight: f64,
    pub mean: Point,
    pub covariance: Matrix,
}

/// Lower Cholesky factor of a symmetric positive definite matrix
fn cholesky(m: &Matrix) -> Option<Matrix> {
    let mut l = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..=i {
            let mut sum = m[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }
    Some(l)
}

fn squared_distance(a: &Point, b: &Point) -> f64 {
    (0..3).map(|c| (a[c] - b[c]).powi(2)).sum()
}

/// Component density in log space, with its Cholesky factor precomputed
#[derive(Debug, Clone)]
struct Precomputed {
    log_weight: f64,
    mean: Point,
    chol: Matrix,
    log_norm: f64,
}

impl Precomputed {
    fn new(component: &GaussianComponent) -> PianoResult<Self> {
        let chol = cholesky(&component.covariance).ok_or_else(|| {
            PianoError::ClassificationError(
                "covariance is not positive definite; raise reg_covar".to_string(),
            )
        })?;
        let log_det: f64 = (0..3).map(|i| chol[i][i].ln()).sum::<f64>() * 2.0;
        Ok(Self {
            log_weight: component.weight.ln(),
            mean: component.mean,
            chol,
            log_norm: -0.5 * (3.0 * LN_2PI + log_det),
        })
    }

    /// ln(weight * N(x | mean, cov))
    fn weighted_log_density(&self, x: &Point) -> f64 {
        // Forward-substitute L y = x - mean; the Mahalanobis term is |y|^2
        let mut y = [0.0; 3];
        for i in 0..3 {
            let mut sum = x[i] - self.mean[i];
            for k in 0..i {
                sum -= self.chol[i][k] * y[k];
            }
            y[i] = sum / self.chol[i][i];
        }
        let maha: f64 = y.iter().map(|v| v * v).sum();
        self.log_weight + self.log_norm - 0.5 * maha
    }
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Gaussian mixture model for 3-D data
#[derive(Debug, Clone)]
pub struct GaussianMixture {
    n_components: usize,
    components: Vec<GaussianComponent>,
    max_iterations: usize,
    tolerance: f64,
    reg_covar: f64,
    seed: u64,
    init_candidates: usize,
    converged: bool,
    n_iter: usize,
}

impl GaussianMixture {
    pub fn new(n_components: usize, seed: u64) -> Self {
        Self {
            n_components,
            components: Vec::new(),
            max_iterations: 100,
            tolerance: 1e-3,
            reg_covar: 1e-6,
            seed,
            init_candidates: 0,
            converged: false,
            n_iter: 0,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_reg_covar(mut self, reg_covar: f64) -> Self {
        self.reg_covar = reg_covar;
        self
    }

    pub fn with_init_candidates(mut self, candidates: usize) -> Self {
        self.init_candidates = candidates;
        self
    }

    pub fn components(&self) -> &[GaussianComponent] {
        &self.components
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// Fit to `points`, each counted `weights[i]` times
    pub fn fit(&mut self, points: &[Point], weights: &[f64]) -> PianoResult<()> {
        if points.is_empty() {
            return Err(PianoError::ClassificationError(
                "cannot fit a mixture to an empty population".to_string(),
            ));
        }
        if points.len() != weights.len() {
            return Err(PianoError::ClassificationError(format!(
                "{} points but {} weights",
                points.len(),
                weights.len()
            )));
        }
        if self.n_components == 0 {
            return Err(PianoError::ClassificationError(
                "mixture needs at least one component".to_string(),
            ));
        }
        let total: f64 = weights.iter().sum();
        if !(total > 0.0) {
            return Err(PianoError::ClassificationError(
                "population has no weight".to_string(),
            ));
        }

        let centers = self.initial_centers(points, weights);
        let mut responsibilities = Array2::<f64>::zeros((points.len(), self.n_components));
        for (i, point) in points.iter().enumerate() {
            let nearest = nearest_center(point, &centers);
            responsibilities[[i, nearest]] = 1.0;
        }
        self.components = centers
            .iter()
            .map(|&mean| GaussianComponent {
                weight: 1.0 / self.n_components as f64,
                mean,
                covariance: [[0.0; 3]; 3],
            })
            .collect();
        self.m_step(points, weights, &responsibilities, total);

        self.converged = false;
        self.n_iter = 0;
        let mut prev_log_likelihood = f64::NEG_INFINITY;

        for iteration in 1..=self.max_iterations {
            let log_likelihood = self.e_step(points, weights, total, &mut responsibilities)?;
            self.m_step(points, weights, &responsibilities, total);
            self.n_iter = iteration;

            if (log_likelihood - prev_log_likelihood).abs() < self.tolerance {
                self.converged = true;
                break;
            }
            prev_log_likelihood = log_likelihood;
        }

        Ok(())
    }

    /// Seeded k-means++ with several candidates per step
    fn initial_centers(&self, points: &[Point], weights: &[f64]) -> Vec<Point> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let n_candidates = if self.init_candidates > 0 {
            self.init_candidates
        } else {
            2 + (self.n_components as f64).ln() as usize
        };

        let first = sample_index(&mut rng, weights).unwrap_or(0);
        let mut centers = vec![points[first]];
        let mut closest: Vec<f64> = points
            .iter()
            .map(|p| squared_distance(p, &points[first]))
            .collect();

        while centers.len() < self.n_components {
            let potential: Vec<f64> = closest
                .iter()
                .zip(weights)
                .map(|(d, w)| d * w)
                .collect();

            let mut best: Option<(usize, f64)> = None;
            for _ in 0..n_candidates {
                let Some(candidate) = sample_index(&mut rng, &potential) else {
                    break;
                };
                let score: f64 = points
                    .iter()
                    .zip(weights)
                    .zip(&closest)
                    .map(|((p, w), d)| w * d.min(squared_distance(p, &points[candidate])))
                    .sum();
                if best.map_or(true, |(_, s)| score < s) {
                    best = Some((candidate, score));
                }
            }

            // All remaining mass sits on existing centres; duplicate one
            let chosen = best.map_or(first, |(idx, _)| idx);
            for (d, p) in closest.iter_mut().zip(points) {
                *d = d.min(squared_distance(p, &points[chosen]));
            }
            centers.push(points[chosen]);
        }

        centers
    }

    /// Responsibilities in place; returns mean log-likelihood per sample
    fn e_step(
        &self,
        points: &[Point],
        weights: &[f64],
        total: f64,
        responsibilities: &mut Array2<f64>,
    ) -> PianoResult<f64> {
        let pre = self
            .components
            .iter()
            .map(Precomputed::new)
            .collect::<PianoResult<Vec<_>>>()?;

        let mut log_probs = vec![0.0; pre.len()];
        let mut log_likelihood = 0.0;
        for (i, point) in points.iter().enumerate() {
            for (j, component) in pre.iter().enumerate() {
                log_probs[j] = component.weighted_log_density(point);
            }
            let norm = log_sum_exp(&log_probs);
            if !norm.is_finite() {
                return Err(PianoError::ClassificationError(
                    "sample has zero likelihood under every component".to_string(),
                ));
            }
            for (j, lp) in log_probs.iter().enumerate() {
                responsibilities[[i, j]] = (lp - norm).exp();
            }
            log_likelihood += weights[i] * norm;
        }

        Ok(log_likelihood / total)
    }

    fn m_step(
        &mut self,
        points: &[Point],
        weights: &[f64],
        responsibilities: &Array2<f64>,
        total: f64,
    ) {
        for (j, component) in self.components.iter_mut().enumerate() {
            let mut nk = 0.0;
            let mut mean_sum = [0.0; 3];
            for (i, point) in points.iter().enumerate() {
                let r = weights[i] * responsibilities[[i, j]];
                nk += r;
                for c in 0..3 {
                    mean_sum[c] += r * point[c];
                }
            }

            // An emptied component keeps its old shape but carries no weight
            if nk <= f64::EPSILON * total {
                component.weight = f64::MIN_POSITIVE;
                if component.covariance[0][0] == 0.0 {
                    component.covariance = identity_scaled(1.0 + self.reg_covar);
                }
                continue;
            }

            let mean = mean_sum.map(|s| s / nk);
            let mut cov = [[0.0; 3]; 3];
            for (i, point) in points.iter().enumerate() {
                let r = weights[i] * responsibilities[[i, j]];
                if r == 0.0 {
                    continue;
                }
                let diff = [point[0] - mean[0], point[1] - mean[1], point[2] - mean[2]];
                for a in 0..3 {
                    for b in 0..3 {
                        cov[a][b] += r * diff[a] * diff[b];
                    }
                }
            }
            for (a, row) in cov.iter_mut().enumerate() {
                for value in row.iter_mut() {
                    *value /= nk;
                }
                row[a] += self.reg_covar;
            }

            component.weight = nk / total;
            component.mean = mean;
            component.covariance = cov;
        }
    }

    /// Most likely component for one point; ties go to the lower index
    pub fn predict(&self, point: &Point) -> PianoResult<usize> {
        Ok(self.predict_many(std::slice::from_ref(point))?[0])
    }

    pub fn predict_many(&self, points: &[Point]) -> PianoResult<Vec<usize>> {
        if self.components.is_empty() {
            return Err(PianoError::ClassificationError(
                "mixture has not been fitted".to_string(),
            ));
        }
        let pre = self
            .components
            .iter()
            .map(Precomputed::new)
            .collect::<PianoResult<Vec<_>>>()?;

        Ok(points
            .iter()
            .map(|point| {
                let mut best = 0;
                let mut best_lp = f64::NEG_INFINITY;
                for (j, component) in pre.iter().enumerate() {
                    let lp = component.weighted_log_density(point);
                    if lp > best_lp {
                        best_lp = lp;
                        best = j;
                    }
                }
                best
            })
            .collect())
    }
}

fn identity_scaled(scale: f64) -> Matrix {
    let mut m = [[0.0; 3]; 3];
    for (i, row) in m.iter_mut().enumerate() {
        row[i] = scale;
    }
    m
}

fn nearest_center(point: &Point, centers: &[Point]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (j, center) in centers.iter().enumerate() {
        let dist = squared_distance(point, center);
        if dist < best_dist {
            best_dist = dist;
            best = j;
        }
    }
    best
}

/// Draw an index with probability proportional to `mass`; None if all mass is zero
fn sample_index(rng: &mut StdRng, mass: &[f64]) -> Option<usize> {
    let total: f64 = mass.iter().sum();
    if !(total > 0.0) {
        return None;
    }
    let mut r = rng.gen::<f64>() * total;
    let mut last_positive = None;
    for (i, &m) in mass.iter().enumerate() {
        if m <= 0.0 {
            continue;
        }
        last_positive = Some(i);
        r -= m;
        if r <= 0.0 {
            return Some(i);
        }
    }
    last_positive
}
