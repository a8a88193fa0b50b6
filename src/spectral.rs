//! Spectral processing for tempo estimation (onset envelope, autocorrelation)

use rustfft::{num_complex::Complex32, FftPlanner};

/// Hann window of `size` samples
pub fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos()))
        .collect()
}

/// Positive spectral flux of log-compressed magnitudes, one value per hop.
///
/// Frames are transformed one at a time; only the previous magnitude frame is
/// kept, so memory does not grow with the signal length.
pub fn onset_envelope(y: &[f32], n_fft: usize, hop_length: usize) -> Vec<f32> {
    if n_fft == 0 || hop_length == 0 || y.len() < n_fft {
        return Vec::new();
    }

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n_fft);
    let window = hann_window(n_fft);
    let n_frames = (y.len() - n_fft) / hop_length + 1;
    let n_bins = n_fft / 2 + 1;

    let mut envelope = Vec::with_capacity(n_frames);
    let mut buffer = vec![Complex32::new(0.0, 0.0); n_fft];
    let mut previous: Option<Vec<f32>> = None;

    for frame_idx in 0..n_frames {
        let start = frame_idx * hop_length;
        for (slot, (&sample, &win)) in buffer
            .iter_mut()
            .zip(y[start..start + n_fft].iter().zip(&window))
        {
            *slot = Complex32::new(sample * win, 0.0);
        }
        fft.process(&mut buffer);

        let magnitude: Vec<f32> = buffer[..n_bins].iter().map(|c| c.norm().ln_1p()).collect();
        let flux = match &previous {
            Some(prev) => magnitude
                .iter()
                .zip(prev)
                .map(|(m, p)| (m - p).max(0.0))
                .sum(),
            None => 0.0,
        };
        envelope.push(flux);
        previous = Some(magnitude);
    }

    envelope
}

/// Autocorrelation of the mean-removed signal for lags `0..=max_lag`.
///
/// Accumulates in f64 so a constant signal centres to zero instead of leaving
/// rounding residue that looks periodic.
pub fn autocorrelation(signal: &[f32], max_lag: usize) -> Vec<f64> {
    if signal.is_empty() {
        return Vec::new();
    }
    let mean = signal.iter().map(|&v| v as f64).sum::<f64>() / signal.len() as f64;
    let centered: Vec<f64> = signal.iter().map(|&v| v as f64 - mean).collect();
    let max_lag = max_lag.min(signal.len() - 1);

    (0..=max_lag)
        .map(|lag| {
            centered[..centered.len() - lag]
                .iter()
                .zip(&centered[lag..])
                .map(|(a, b)| a * b)
                .sum()
        })
        .collect()
}

const FLAT_ENVELOPE_RATIO: f64 = 1e-6;

/// Log-normal preference for tempi near 120 BPM, one octave wide
fn tempo_prior(bpm: f32) -> f32 {
    let octaves = (bpm / 120.0).log2();
    (-0.5 * octaves * octaves).exp()
}

/// Strongest periodicity of `envelope` inside `tempo_range_bpm`.
///
/// `frames_per_sec` is the envelope rate (sample rate / hop). Returns None when
/// the envelope is too short for the range or carries no periodic energy.
pub fn estimate_tempo(envelope: &[f32], frames_per_sec: f32, tempo_range_bpm: [f32; 2]) -> Option<f32> {
    if envelope.len() < 4 || frames_per_sec <= 0.0 || tempo_range_bpm[0] <= 0.0 {
        return None;
    }

    let min_lag = ((60.0 * frames_per_sec / tempo_range_bpm[1]).floor() as usize).max(1);
    let max_lag = ((60.0 * frames_per_sec / tempo_range_bpm[0]).ceil() as usize).min(envelope.len() - 2);
    if min_lag >= max_lag {
        return None;
    }

    // Variance below this share of the raw energy is a flat envelope
    let energy: f64 = envelope.iter().map(|&v| (v as f64).powi(2)).sum();
    let acf = autocorrelation(envelope, max_lag + 1);
    if acf[0] <= FLAT_ENVELOPE_RATIO * energy {
        return None;
    }

    let mut best: Option<(usize, f64)> = None;
    for lag in min_lag..=max_lag {
        let bpm = 60.0 * frames_per_sec / lag as f32;
        let score = acf[lag] * tempo_prior(bpm) as f64;
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((lag, score));
        }
    }
    let (lag, score) = best?;
    if score <= FLAT_ENVELOPE_RATIO * acf[0] {
        return None;
    }

    // Parabolic peak refinement
    let (a, b, c) = (acf[lag - 1], acf[lag], acf[lag + 1]);
    let denom = a - 2.0 * b + c;
    let offset = if denom.abs() > f64::EPSILON * acf[0] {
        (0.5 * (a - c) / denom).clamp(-0.5, 0.5) as f32
    } else {
        0.0
    };

    Some(60.0 * frames_per_sec / (lag as f32 + offset))
}
