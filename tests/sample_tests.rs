//! Validation tests for per-frame key sampling

use pianovision::analysis::KeyLocation;
use pianovision::stages::sample::sample_keys;
use pianovision::video::FrameSource;
use pianovision::{Frame, FrameBuffer, LogLevel, MemorySink, PianoError, PianoKey};

/// Frames filled with a red whose value encodes the frame index
fn generate_indexed_frames(n_frames: usize) -> Vec<Frame> {
    (0..n_frames)
        .map(|i| Frame::filled(32, 8, [(i * 20) as u8, 0, 0]))
        .collect()
}

/// `n` locations spread along row 4
fn generate_locations(n: usize) -> Vec<KeyLocation> {
    (0..n).map(|i| KeyLocation { x: i % 32, y: 4 }).collect()
}

/// Yields `good` frames, then fails
struct FailingSource {
    good: usize,
}

impl FrameSource for FailingSource {
    fn read(&mut self) -> pianovision::Result<Option<Frame>> {
        if self.good == 0 {
            return Err(PianoError::VideoDecodeError("corrupt packet".to_string()));
        }
        self.good -= 1;
        Ok(Some(Frame::filled(8, 8, [10, 20, 30])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_consumed_in_order() {
        let mut source = FrameBuffer::new(generate_indexed_frames(10));
        let locations = generate_locations(3);
        let sink = MemorySink::new(LogLevel::Info);

        let table = sample_keys(&mut source, &locations, PianoKey::A0, &sink).unwrap();
        assert_eq!(table.n_frames(), 10);
        assert_eq!(table.n_keys(), 3);
        assert_eq!(source.remaining(), 0);
        for frame in 0..10 {
            for col in 0..3 {
                assert_eq!(
                    table.get(frame, col).v as usize,
                    frame * 20,
                    "row {} is out of temporal order",
                    frame
                );
            }
        }
    }

    #[test]
    fn test_empty_video_gives_empty_table() {
        let mut source = FrameBuffer::new(Vec::new());
        let sink = MemorySink::new(LogLevel::Info);

        let table = sample_keys(&mut source, &generate_locations(5), PianoKey::A0, &sink).unwrap();
        assert_eq!(table.n_frames(), 0);
        assert_eq!(table.n_keys(), 5);
        assert!(table.is_empty());
    }

    #[test]
    fn test_count_mismatch_warns_but_continues() {
        let mut source = FrameBuffer::new(generate_indexed_frames(2));
        let sink = MemorySink::new(LogLevel::Info);

        let table = sample_keys(&mut source, &generate_locations(3), PianoKey::A0, &sink).unwrap();
        assert_eq!(table.n_keys(), 3);
        assert!(sink.contains(
            LogLevel::Warning,
            "Detected 3 key locations but 88 keys are expected from A0"
        ));
    }

    #[test]
    fn test_matching_count_does_not_warn() {
        let starting_key = PianoKey::from_name("A7").unwrap();
        let mut source = FrameBuffer::new(generate_indexed_frames(2));
        let sink = MemorySink::new(LogLevel::Info);

        let table = sample_keys(&mut source, &generate_locations(4), starting_key, &sink).unwrap();
        assert!(!sink.contains(LogLevel::Warning, "key locations"));
        assert_eq!(table.column_name(0), "A7");
        assert_eq!(table.column_name(3), "C8");
    }

    #[test]
    fn test_column_identity_follows_starting_key() {
        let mut source = FrameBuffer::new(generate_indexed_frames(1));
        let sink = MemorySink::new(LogLevel::Info);

        let table =
            sample_keys(&mut source, &generate_locations(2), PianoKey::MIDDLE_C, &sink).unwrap();
        assert_eq!(table.key(0), Some(PianoKey::MIDDLE_C));
        assert_eq!(table.column_name(1), "C4sDb4");
        assert_eq!(table.key_ordinal(1), 40);
    }

    #[test]
    fn test_source_error_propagates() {
        let mut source = FailingSource { good: 2 };
        let sink = MemorySink::new(LogLevel::Info);

        let err = sample_keys(&mut source, &generate_locations(1), PianoKey::C8, &sink).unwrap_err();
        assert!(matches!(err, PianoError::VideoDecodeError(_)));
    }

    #[test]
    fn test_location_outside_frame_is_error() {
        let mut source = FrameBuffer::new(generate_indexed_frames(1));
        let locations = [KeyLocation { x: 3, y: 8 }];
        let sink = MemorySink::new(LogLevel::Info);

        let err = sample_keys(&mut source, &locations, PianoKey::C8, &sink).unwrap_err();
        assert!(matches!(
            err,
            PianoError::LocationOutOfBounds {
                x: 3,
                y: 8,
                width: 32,
                height: 8
            }
        ));
    }
}
