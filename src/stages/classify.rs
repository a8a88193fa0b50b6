//! Unsupervised press classification over the sample table
//!
//! Every (frame, key) sample is one observation in HSV space. Dark samples are
//! collapsed to a single point, a seeded Gaussian mixture is fitted to the
//! population, and the resulting cluster labels are mapped to press states by a
//! [`LabelMapper`].

use crate::analysis::{
    Classification, ClusterLabel, ClusterSummary, PressState, PressTable, SampleTable,
};
use crate::config::ClassificationConfig;
use crate::error::{PianoError, Result as PianoResult};
use crate::gmm::{GaussianMixture, Point};
use crate::logging::LogSink;
use crate::video::Hsv;
use ndarray::Array2;
use std::collections::HashMap;

/// Value below which hue and saturation are treated as noise
pub const DARK_VALUE_THRESHOLD: u8 = 50;

/// Collapse samples darker than `threshold` onto `(0, 0, threshold / 2)`
pub fn normalize_dark(sample: Hsv, threshold: u8) -> Hsv {
    if sample.v < threshold {
        Hsv::new(0, 0, threshold / 2)
    } else {
        sample
    }
}

/// How often each cluster label occurs, and where on the keyboard
#[derive(Debug, Clone, PartialEq)]
pub struct LabelStats {
    pub counts: Vec<usize>,
    pub ordinal_sums: Vec<u64>,
}

impl LabelStats {
    /// Tally `labels`, whose column 0 is key ordinal `first_ordinal`
    pub fn from_labels(labels: &Array2<ClusterLabel>, n_components: usize, first_ordinal: usize) -> Self {
        let mut counts = vec![0usize; n_components];
        let mut ordinal_sums = vec![0u64; n_components];
        for ((_, col), &label) in labels.indexed_iter() {
            counts[label] += 1;
            ordinal_sums[label] += (first_ordinal + col) as u64;
        }
        Self {
            counts,
            ordinal_sums,
        }
    }

    /// Occurrence-weighted mean key ordinal; None for a label that never occurs
    pub fn mean_ordinal(&self, label: ClusterLabel) -> Option<f64> {
        match self.counts.get(label) {
            Some(&count) if count > 0 => Some(self.ordinal_sums[label] as f64 / count as f64),
            _ => None,
        }
    }
}

/// Maps fitted cluster labels onto press states
pub trait LabelMapper {
    /// One state per label, indexed by label
    fn assign(&self, stats: &LabelStats, sink: &dyn LogSink) -> PianoResult<Vec<PressState>>;
}

/// Resting colours dominate the timeline; the left hand plays lower on average.
///
/// The `resting_labels` most frequent labels become `Unpressed`. The remaining
/// labels are ranked by mean key ordinal: the lower half goes to `LeftHand`,
/// the rest to `RightHand`.
///
/// Caveat: the split is applied mechanically. On a clip with little or no
/// playing the mixture still produces the same number of labels, and a
/// legitimate resting colour can land among the candidates and be reported as
/// a hand. Nothing here detects that case.
#[derive(Debug, Clone, Copy)]
pub struct RestDominance {
    pub resting_labels: usize,
}

impl Default for RestDominance {
    fn default() -> Self {
        Self { resting_labels: 2 }
    }
}

impl LabelMapper for RestDominance {
    fn assign(&self, stats: &LabelStats, sink: &dyn LogSink) -> PianoResult<Vec<PressState>> {
        let n_labels = stats.counts.len();
        if n_labels < self.resting_labels + 2 {
            return Err(PianoError::ClassificationError(format!(
                "{} labels cannot cover {} resting colours and two hands",
                n_labels, self.resting_labels
            )));
        }

        let mut by_frequency: Vec<ClusterLabel> = (0..n_labels).collect();
        by_frequency.sort_by(|&a, &b| stats.counts[b].cmp(&stats.counts[a]).then(a.cmp(&b)));

        let mut candidates = Vec::with_capacity(n_labels - self.resting_labels);
        for &label in &by_frequency[self.resting_labels..] {
            let mean = stats
                .mean_ordinal(label)
                .ok_or(PianoError::EmptyHandCluster(label))?;
            candidates.push((label, mean));
        }
        candidates.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        let mut states = vec![PressState::Unpressed; n_labels];
        let left_count = candidates.len() / 2;
        for (rank, &(label, mean)) in candidates.iter().enumerate() {
            let state = if rank < left_count {
                PressState::LeftHand
            } else {
                PressState::RightHand
            };
            sink.debug(&format!(
                "Cluster {} -> {} (mean key ordinal {:.1})",
                label,
                state.name(),
                mean
            ));
            states[label] = state;
        }

        Ok(states)
    }
}

/// Classify every cell of `table` with the default rest-dominance mapping
pub fn classify_presses(
    table: &SampleTable,
    config: &ClassificationConfig,
    sink: &dyn LogSink,
) -> PianoResult<Classification> {
    classify_presses_with(table, config, &RestDominance::default(), sink)
}

/// Classify every cell of `table`, mapping clusters to states with `mapper`
pub fn classify_presses_with(
    table: &SampleTable,
    config: &ClassificationConfig,
    mapper: &dyn LabelMapper,
    sink: &dyn LogSink,
) -> PianoResult<Classification> {
    let n_frames = table.n_frames();
    let n_keys = table.n_keys();
    let starting_key = table.starting_key();

    if table.is_empty() {
        sink.warn("Sample table is empty, nothing to classify");
        return Ok(Classification {
            labels: Array2::zeros((n_frames, n_keys)),
            presses: PressTable::new(
                starting_key,
                Array2::from_elem((n_frames, n_keys), PressState::Unpressed),
            ),
            clusters: Vec::new(),
            converged: true,
        });
    }

    // Distinct normalised colours with their multiplicities, in first-seen order
    let mut index: HashMap<Hsv, usize> = HashMap::new();
    let mut points: Vec<Point> = Vec::new();
    let mut weights: Vec<f64> = Vec::new();
    let mut cell_points = Vec::with_capacity(n_frames * n_keys);
    let mut dark = 0usize;

    for frame in 0..n_frames {
        for col in 0..n_keys {
            let raw = table.get(frame, col);
            if raw.v < config.dark_value_threshold {
                dark += 1;
            }
            let sample = normalize_dark(raw, config.dark_value_threshold);
            let idx = *index.entry(sample).or_insert_with(|| {
                points.push(sample.as_array().map(f64::from));
                weights.push(0.0);
                points.len() - 1
            });
            weights[idx] += 1.0;
            cell_points.push(idx);
        }
    }

    sink.debug(&format!(
        "{} samples, {} distinct colours, {} collapsed as dark",
        cell_points.len(),
        points.len(),
        dark
    ));
    if points.len() < config.n_components {
        sink.warn(&format!(
            "Only {} distinct colours for {} clusters; the fit will degenerate",
            points.len(),
            config.n_components
        ));
    }

    let mut gmm = GaussianMixture::new(config.n_components, config.random_seed)
        .with_max_iterations(config.max_iterations)
        .with_tolerance(config.tolerance)
        .with_reg_covar(config.reg_covar)
        .with_init_candidates(config.init_candidates);
    gmm.fit(&points, &weights)?;
    if gmm.converged() {
        sink.debug(&format!("Mixture converged after {} iterations", gmm.n_iter()));
    } else {
        sink.warn(&format!(
            "Mixture did not converge within {} iterations",
            gmm.n_iter()
        ));
    }

    let point_labels = gmm.predict_many(&points)?;
    let labels = Array2::from_shape_vec(
        (n_frames, n_keys),
        cell_points.iter().map(|&i| point_labels[i]).collect(),
    )
    .map_err(|e| PianoError::ClassificationError(format!("label table shape: {}", e)))?;

    let stats = LabelStats::from_labels(&labels, config.n_components, starting_key.ordinal());
    for (label, &count) in stats.counts.iter().enumerate() {
        if count == 0 {
            sink.warn(&format!("Cluster {} received no samples", label));
        }
    }

    let states = mapper.assign(&stats, sink)?;
    let presses = PressTable::new(starting_key, labels.mapv(|label| states[label]));
    let clusters = summarize_clusters(&points, &weights, &point_labels, &stats, &states);

    for cluster in &clusters {
        sink.info(&format!(
            "Cluster {}: {} samples, mean HSV ({:.0}, {:.0}, {:.0}) -> {}",
            cluster.label,
            cluster.count,
            cluster.mean_hsv[0],
            cluster.mean_hsv[1],
            cluster.mean_hsv[2],
            cluster.state.name()
        ));
    }

    Ok(Classification {
        labels,
        presses,
        clusters,
        converged: gmm.converged(),
    })
}

fn summarize_clusters(
    points: &[Point],
    weights: &[f64],
    point_labels: &[ClusterLabel],
    stats: &LabelStats,
    states: &[PressState],
) -> Vec<ClusterSummary> {
    let n_labels = stats.counts.len();
    let mut sums = vec![[0.0f64; 3]; n_labels];
    for ((point, &weight), &label) in points.iter().zip(weights).zip(point_labels) {
        for c in 0..3 {
            sums[label][c] += point[c] * weight;
        }
    }

    (0..n_labels)
        .map(|label| {
            let count = stats.counts[label];
            let mean_hsv = if count > 0 {
                sums[label].map(|s| (s / count as f64) as f32)
            } else {
                [0.0; 3]
            };
            let [h, s, v] = mean_hsv.map(|c| c.round().clamp(0.0, 255.0) as u8);
            ClusterSummary {
                label,
                count,
                mean_hsv,
                mean_rgb: Hsv::new(h.min(179), s, v).to_rgb(),
                mean_key_ordinal: stats.mean_ordinal(label),
                state: states[label],
            }
        })
        .collect()
}
