//! Audio collaborator: soundtrack extraction through ffmpeg and tempo estimation

use crate::config::AudioConfig;
use crate::error::{PianoError, Result as PianoResult};
use crate::logging::LogSink;
use crate::spectral::{estimate_tempo, onset_envelope};
use crate::video::tool_error;
use hound::WavReader;
use std::path::Path;
use std::process::{Command, Stdio};

/// True when an `ffmpeg` binary runs from PATH
pub fn check_ffmpeg_installed() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Extract the soundtrack of `input` to a WAV file at `output`.
///
/// An existing `output` is overwritten. A missing ffmpeg is `ToolUnavailable`;
/// ffmpeg exiting non-zero is the recoverable `AudioExtractionFailed`.
pub fn extract_audio<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    config: &AudioConfig,
    sink: &dyn LogSink,
) -> PianoResult<()> {
    let input = input.as_ref();
    let output = output.as_ref();

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    sink.info(&format!(
        "Extracting audio from {} to {} ({} Hz, {} ch)",
        input.display(),
        output.display(),
        config.sample_rate,
        config.channels
    ));

    let result = Command::new("ffmpeg")
        .args(["-y", "-v", "error", "-nostdin", "-i"])
        .arg(input)
        .args([
            "-vn",
            "-ar",
            &config.sample_rate.to_string(),
            "-ac",
            &config.channels.to_string(),
        ])
        .arg(output)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| tool_error("ffmpeg", e))?;

    if !result.status.success() {
        return Err(PianoError::AudioExtractionFailed(format!(
            "ffmpeg exited with {}: {}",
            result.status,
            String::from_utf8_lossy(&result.stderr).trim()
        )));
    }

    Ok(())
}

/// Load a WAV file as mono samples in [-1, 1] with its sample rate
pub fn load_wav_mono<P: AsRef<Path>>(path: P) -> PianoResult<(Vec<f32>, u32)> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    if spec.channels == 0 {
        return Err(PianoError::AudioFileError("WAV declares zero channels".to_string()));
    }
    if spec.bits_per_sample > 32 {
        return Err(PianoError::AudioFileError(format!(
            "Unsupported bit depth: {}",
            spec.bits_per_sample
        )));
    }

    let mut interleaved: Vec<f32> = Vec::with_capacity(reader.len() as usize);
    match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            for sample in reader.samples::<i32>() {
                interleaved.push(sample? as f32 / max_value);
            }
        }
        hound::SampleFormat::Float => {
            for sample in reader.samples::<f32>() {
                interleaved.push(sample?);
            }
        }
    }

    let channels = spec.channels as usize;
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok((samples, spec.sample_rate))
}

/// Estimate the tempo of a WAV file in beats per minute.
///
/// Returns `Ok(None)` when no periodicity is found inside the configured range.
pub fn detect_bpm<P: AsRef<Path>>(
    path: P,
    config: &AudioConfig,
    sink: &dyn LogSink,
) -> PianoResult<Option<f32>> {
    let path = path.as_ref();
    let (samples, sample_rate) = load_wav_mono(path)?;
    if samples.is_empty() {
        return Err(PianoError::AudioFileError(format!(
            "{} contains no samples",
            path.display()
        )));
    }

    let envelope = onset_envelope(&samples, config.n_fft, config.hop_length);
    let frames_per_sec = sample_rate as f32 / config.hop_length as f32;
    sink.debug(&format!(
        "Onset envelope: {} frames at {:.2} frames/s",
        envelope.len(),
        frames_per_sec
    ));

    let bpm = estimate_tempo(&envelope, frames_per_sec, config.tempo_range_bpm);
    match bpm {
        Some(bpm) => sink.info(&format!("Estimated tempo: {:.1} BPM", bpm)),
        None => sink.warn(&format!(
            "No tempo found between {} and {} BPM",
            config.tempo_range_bpm[0], config.tempo_range_bpm[1]
        )),
    }
    Ok(bpm)
}
