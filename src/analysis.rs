//! Data types passed between pipeline stages, and the JSON analysis summary

use crate::error::{PianoError, Result as PianoResult};
use crate::piano::PianoKey;
use crate::video::{Hsv, VideoInfo};
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Sampling point for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyLocation {
    pub x: usize,
    pub y: usize,
}

/// Half-open pixel span `[left, right)` covered by one key on the scanline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpan {
    pub left: usize,
    pub right: usize,
}

impl KeySpan {
    pub fn center(&self) -> usize {
        (self.left + self.right) / 2
    }

    pub fn width(&self) -> usize {
        self.right.saturating_sub(self.left)
    }
}

/// Mixture component index before semantic remapping
pub type ClusterLabel = usize;

/// Final per-cell state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PressState {
    #[default]
    Unpressed,
    LeftHand,
    RightHand,
}

impl PressState {
    /// Compact code used in the flat text dumps
    pub fn code(&self) -> u8 {
        match self {
            PressState::Unpressed => 0,
            PressState::LeftHand => 1,
            PressState::RightHand => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PressState::Unpressed => "unpressed",
            PressState::LeftHand => "left_hand",
            PressState::RightHand => "right_hand",
        }
    }

    pub fn is_pressed(&self) -> bool {
        !matches!(self, PressState::Unpressed)
    }
}

/// Key ordinal of column `col` when the first column is `starting_key`.
/// May run past C8 when more keys were detected than the keyboard has.
fn column_ordinal(starting_key: PianoKey, col: usize) -> usize {
    starting_key.ordinal() + col
}

fn column_name(starting_key: PianoKey, col: usize) -> String {
    let ordinal = column_ordinal(starting_key, col);
    match PianoKey::from_ordinal(ordinal) {
        Some(key) => key.name().to_string(),
        None => format!("K{}", ordinal),
    }
}

/// One HSV sample per (frame, key); shape is frames x keys x 3
#[derive(Debug, Clone, PartialEq)]
pub struct SampleTable {
    starting_key: PianoKey,
    samples: Array3<u8>,
}

impl SampleTable {
    pub fn new(starting_key: PianoKey, samples: Array3<u8>) -> PianoResult<Self> {
        if samples.shape()[2] != 3 {
            return Err(PianoError::ProcessingPipelineError(format!(
                "sample table needs 3 channels, got {}",
                samples.shape()[2]
            )));
        }
        Ok(Self {
            starting_key,
            samples,
        })
    }

    /// Build from row-major packed HSV bytes
    pub fn from_raw(
        starting_key: PianoKey,
        n_frames: usize,
        n_keys: usize,
        data: Vec<u8>,
    ) -> PianoResult<Self> {
        let samples = Array3::from_shape_vec((n_frames, n_keys, 3), data)
            .map_err(|e| PianoError::ProcessingPipelineError(format!("sample table shape: {}", e)))?;
        Ok(Self {
            starting_key,
            samples,
        })
    }

    /// Build from per-frame rows of samples
    pub fn from_rows(starting_key: PianoKey, rows: &[Vec<Hsv>]) -> PianoResult<Self> {
        let n_keys = rows.first().map_or(0, |r| r.len());
        if let Some(bad) = rows.iter().position(|r| r.len() != n_keys) {
            return Err(PianoError::ProcessingPipelineError(format!(
                "row {} has {} samples, expected {}",
                bad,
                rows[bad].len(),
                n_keys
            )));
        }
        let data = rows
            .iter()
            .flat_map(|row| row.iter().flat_map(|p| p.as_array()))
            .collect();
        Self::from_raw(starting_key, rows.len(), n_keys, data)
    }

    pub fn starting_key(&self) -> PianoKey {
        self.starting_key
    }

    pub fn n_frames(&self) -> usize {
        self.samples.shape()[0]
    }

    pub fn n_keys(&self) -> usize {
        self.samples.shape()[1]
    }

    pub fn is_empty(&self) -> bool {
        self.n_frames() == 0 || self.n_keys() == 0
    }

    pub fn get(&self, frame: usize, col: usize) -> Hsv {
        Hsv::new(
            self.samples[[frame, col, 0]],
            self.samples[[frame, col, 1]],
            self.samples[[frame, col, 2]],
        )
    }

    pub fn key_ordinal(&self, col: usize) -> usize {
        column_ordinal(self.starting_key, col)
    }

    pub fn key(&self, col: usize) -> Option<PianoKey> {
        PianoKey::from_ordinal(self.key_ordinal(col))
    }

    pub fn column_name(&self, col: usize) -> String {
        column_name(self.starting_key, col)
    }

    pub fn samples(&self) -> &Array3<u8> {
        &self.samples
    }
}

/// Press state per (frame, key), same shape as the sample table it came from
#[derive(Debug, Clone, PartialEq)]
pub struct PressTable {
    starting_key: PianoKey,
    states: Array2<PressState>,
}

impl PressTable {
    pub fn new(starting_key: PianoKey, states: Array2<PressState>) -> Self {
        Self {
            starting_key,
            states,
        }
    }

    pub fn starting_key(&self) -> PianoKey {
        self.starting_key
    }

    pub fn n_frames(&self) -> usize {
        self.states.nrows()
    }

    pub fn n_keys(&self) -> usize {
        self.states.ncols()
    }

    pub fn get(&self, frame: usize, col: usize) -> PressState {
        self.states[[frame, col]]
    }

    pub fn states(&self) -> &Array2<PressState> {
        &self.states
    }

    pub fn key_ordinal(&self, col: usize) -> usize {
        column_ordinal(self.starting_key, col)
    }

    pub fn column_name(&self, col: usize) -> String {
        column_name(self.starting_key, col)
    }

    pub fn count(&self, state: PressState) -> usize {
        self.states.iter().filter(|&&s| s == state).count()
    }
}

/// What one mixture component turned out to be
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub label: ClusterLabel,
    pub count: usize,
    pub mean_hsv: [f32; 3],
    pub mean_rgb: [u8; 3],
    pub mean_key_ordinal: Option<f64>,
    pub state: PressState,
}

/// Output of the press classifier
#[derive(Debug, Clone)]
pub struct Classification {
    pub labels: Array2<ClusterLabel>,
    pub presses: PressTable,
    pub clusters: Vec<ClusterSummary>,
    pub converged: bool,
}

/// Everything one run produced
#[derive(Debug, Clone)]
pub struct Transcription {
    pub video: Option<VideoInfo>,
    pub scan_row: usize,
    pub key_locations: Vec<KeyLocation>,
    pub expected_key_count: usize,
    pub samples: SampleTable,
    pub classification: Classification,
    pub bpm: Option<f32>,
}

/// Serialised run summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub version: String,
    pub video: Option<VideoInfo>,
    pub starting_key: PianoKey,
    pub scan_row: usize,
    pub detected_keys: usize,
    pub expected_keys: usize,
    pub frames: usize,
    pub converged: bool,
    pub clusters: Vec<ClusterSummary>,
    pub state_totals: HashMap<String, usize>,
    pub pressed_fraction: f32,
    pub bpm: Option<f32>,
}

/// Build the summary for a finished run
pub fn build_analysis(transcription: &Transcription) -> Analysis {
    let presses = &transcription.classification.presses;
    let mut state_totals = HashMap::new();
    for state in [
        PressState::Unpressed,
        PressState::LeftHand,
        PressState::RightHand,
    ] {
        state_totals.insert(state.name().to_string(), presses.count(state));
    }

    let cells = presses.n_frames() * presses.n_keys();
    let pressed = cells - presses.count(PressState::Unpressed);
    let pressed_fraction = if cells > 0 {
        pressed as f32 / cells as f32
    } else {
        0.0
    };

    Analysis {
        version: env!("CARGO_PKG_VERSION").to_string(),
        video: transcription.video.clone(),
        starting_key: transcription.samples.starting_key(),
        scan_row: transcription.scan_row,
        detected_keys: transcription.key_locations.len(),
        expected_keys: transcription.expected_key_count,
        frames: transcription.samples.n_frames(),
        converged: transcription.classification.converged,
        clusters: transcription.classification.clusters.clone(),
        state_totals,
        pressed_fraction,
        bpm: transcription.bpm,
    }
}

/// Export analysis results to JSON
pub fn export_analysis(transcription: &Transcription, output_dir: &Path) -> PianoResult<()> {
    std::fs::create_dir_all(output_dir)?;

    let analysis_path = output_dir.join("analysis.json");
    let analysis = build_analysis(transcription);
    let json = serde_json::to_string_pretty(&analysis)?;
    std::fs::write(&analysis_path, json)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_center() {
        let span = KeySpan { left: 6, right: 9 };
        assert_eq!(span.center(), 7);
        assert_eq!(span.width(), 3);
    }

    #[test]
    fn test_sample_table_layout() {
        let rows = vec![
            vec![Hsv::new(1, 2, 3), Hsv::new(4, 5, 6)],
            vec![Hsv::new(7, 8, 9), Hsv::new(10, 11, 12)],
            vec![Hsv::new(13, 14, 15), Hsv::new(16, 17, 18)],
        ];
        let table = SampleTable::from_rows(PianoKey::C8, &rows).unwrap();
        assert_eq!(table.n_frames(), 3);
        assert_eq!(table.n_keys(), 2);
        assert_eq!(table.get(2, 1), Hsv::new(16, 17, 18));
        assert_eq!(table.column_name(0), "C8");
        assert_eq!(table.column_name(1), "K88");
        assert_eq!(table.key(1), None);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let rows = vec![vec![Hsv::default(); 2], vec![Hsv::default(); 3]];
        assert!(SampleTable::from_rows(PianoKey::A0, &rows).is_err());
    }

    #[test]
    fn test_press_table_counts() {
        let mut states = Array2::from_elem((2, 3), PressState::Unpressed);
        states[[0, 0]] = PressState::LeftHand;
        states[[1, 2]] = PressState::RightHand;
        states[[1, 1]] = PressState::RightHand;
        let table = PressTable::new(PianoKey::A0, states);
        assert_eq!(table.count(PressState::Unpressed), 3);
        assert_eq!(table.count(PressState::RightHand), 2);
        assert!(table.get(0, 0).is_pressed());
    }
}
