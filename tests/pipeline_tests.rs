//! End-to-end tests for the in-memory pipeline and its exported artifacts

use image::{Rgb, RgbImage};
use pianovision::analysis::{PressState, Transcription};
use pianovision::{
    validate_input, Config, Frame, FrameBuffer, LogLevel, MemorySink, PianoError, PianoKey,
    PianoVision,
};
use std::sync::Arc;
use tempfile::TempDir;

const KEY_WIDTH: u32 = 6;
const HEIGHT: u32 = 40;
const LEFT_RGB: [u8; 3] = [30, 180, 30];
const RIGHT_RGB: [u8; 3] = [200, 80, 20];

/// Full-height keyboard image; `pressed[k]` overrides key `k`'s resting grey
fn render_keyboard(pressed: &[Option<PressState>]) -> Frame {
    let mut image = RgbImage::new(pressed.len() as u32 * KEY_WIDTH, HEIGHT);
    for (x, _, pixel) in image.enumerate_pixels_mut() {
        let key = (x / KEY_WIDTH) as usize;
        *pixel = match pressed[key] {
            Some(PressState::LeftHand) => Rgb(LEFT_RGB),
            Some(PressState::RightHand) => Rgb(RIGHT_RGB),
            _ if key % 2 == 0 => Rgb([220, 220, 220]),
            _ => Rgb([90, 90, 90]),
        };
    }
    Frame::from_image(image)
}

/// Left hand plays the bottom 20 keys, right hand the top 28
fn generate_performance(n_frames: usize) -> (Vec<Frame>, Vec<Vec<PressState>>) {
    let mut frames = Vec::with_capacity(n_frames);
    let mut truth = Vec::with_capacity(n_frames);
    for f in 0..n_frames {
        let states: Vec<PressState> = (0..88)
            .map(|k| {
                if k < 20 && (f + k) % 6 == 0 {
                    PressState::LeftHand
                } else if k >= 60 && (f + k) % 4 == 0 {
                    PressState::RightHand
                } else {
                    PressState::Unpressed
                }
            })
            .collect();
        let pressed: Vec<Option<PressState>> = states
            .iter()
            .map(|&s| if s.is_pressed() { Some(s) } else { None })
            .collect();
        frames.push(render_keyboard(&pressed));
        truth.push(states);
    }
    (frames, truth)
}

fn run(config: Config, n_frames: usize) -> (Transcription, Vec<Vec<PressState>>, Arc<MemorySink>, Frame) {
    let sink = Arc::new(MemorySink::new(LogLevel::Debug));
    let processor = PianoVision::new(config, Box::new(sink.clone()));
    let reference = render_keyboard(&vec![None; 88]);
    let (frames, truth) = generate_performance(n_frames);
    let mut source = FrameBuffer::new(frames);

    let transcription = processor.run_frames(&reference, &mut source).unwrap();
    (transcription, truth, sink, reference)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_keyboard_transcription() {
        let (transcription, truth, sink, _) = run(Config::default(), 30);

        assert_eq!(transcription.key_locations.len(), 88);
        assert_eq!(transcription.scan_row, 32);
        assert_eq!(transcription.expected_key_count, 88);
        assert!(!sink.contains(LogLevel::Warning, "key locations"));

        let presses = &transcription.classification.presses;
        assert_eq!(presses.n_frames(), 30);
        for (f, row) in truth.iter().enumerate() {
            for (k, &expected) in row.iter().enumerate() {
                assert_eq!(presses.get(f, k), expected, "frame {} key {}", f, k);
            }
        }
    }

    #[test]
    fn test_wrong_starting_key_warns() {
        let mut config = Config::default();
        config.vision.starting_key = PianoKey::MIDDLE_C;
        let (transcription, _, sink, _) = run(config, 12);

        assert_eq!(transcription.expected_key_count, 49);
        assert_eq!(transcription.samples.n_keys(), 88);
        assert!(sink.contains(
            LogLevel::Warning,
            "Detected 88 key locations but 49 keys are expected from C4"
        ));
    }

    #[test]
    fn test_export_results() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(MemorySink::new(LogLevel::Info));
        let processor = PianoVision::new(Config::default(), Box::new(sink.clone()));
        let (transcription, truth, _, reference) = run(Config::default(), 16);

        processor
            .export_results(&transcription, Some(&reference), dir.path())
            .unwrap();

        for name in ["analysis.json", "samples.txt", "presses.txt"] {
            assert!(dir.path().join(name).exists(), "{} missing", name);
        }
        assert!(dir.path().join("qa").join("keys.png").exists());
        assert!(dir.path().join("qa").join("timeline.png").exists());

        let json = std::fs::read_to_string(dir.path().join("analysis.json")).unwrap();
        let analysis: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(analysis["detected_keys"], 88);
        assert_eq!(analysis["frames"], 16);
        assert_eq!(analysis["starting_key"], "A0");
        let left = truth
            .iter()
            .flatten()
            .filter(|&&s| s == PressState::LeftHand)
            .count();
        assert_eq!(analysis["state_totals"]["left_hand"], left as u64);

        let presses = std::fs::read_to_string(dir.path().join("presses.txt")).unwrap();
        assert_eq!(presses.lines().count(), 17);
        assert!(presses.starts_with("frame\tA0\tA0sBb0\tB0"));
    }

    #[test]
    fn test_export_flags_disable_artifacts() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.export.write_sample_table = false;
        config.export.write_press_table = false;
        config.export.render_preview = false;
        config.export.render_timeline = false;
        let processor = PianoVision::new(config.clone(), Box::new(MemorySink::new(LogLevel::Info)));
        let (transcription, _, _, reference) = run(config, 8);

        processor
            .export_results(&transcription, Some(&reference), dir.path())
            .unwrap();

        assert!(dir.path().join("analysis.json").exists());
        assert!(!dir.path().join("samples.txt").exists());
        assert!(!dir.path().join("presses.txt").exists());
        assert!(!dir.path().join("qa").exists());
    }

    #[test]
    fn test_validate_input() {
        let config = Config::default();
        let err = validate_input("/nonexistent/performance.mp4", &config).unwrap_err();
        assert!(matches!(err, PianoError::InputValidationError(_)));

        let dir = TempDir::new().unwrap();
        let video = dir.path().join("performance.mp4");
        std::fs::write(&video, b"not really a video").unwrap();
        assert!(validate_input(&video, &config).is_ok());

        let mut bad = Config::default();
        bad.vision.key_offset = 0.0;
        let err = validate_input(&video, &bad).unwrap_err();
        assert!(matches!(err, PianoError::ConfigValidationFailed(_)));
    }
}
