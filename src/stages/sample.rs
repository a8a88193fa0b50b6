//! Per-frame colour sampling at each key location

use crate::analysis::{KeyLocation, SampleTable};
use crate::error::{PianoError, Result as PianoResult};
use crate::logging::LogSink;
use crate::piano::{expected_key_count, PianoKey};
use crate::video::FrameSource;

const PROGRESS_EVERY: usize = 1000;

/// Read `source` to the end and sample the HSV pixel under every key location.
///
/// Column `n` belongs to the `n`th key at or above `starting_key`. Only the
/// current frame is held in memory; the table grows by one row per frame.
pub fn sample_keys<S: FrameSource + ?Sized>(
    source: &mut S,
    locations: &[KeyLocation],
    starting_key: PianoKey,
    sink: &dyn LogSink,
) -> PianoResult<SampleTable> {
    let expected = expected_key_count(starting_key);
    if locations.len() != expected {
        sink.warn(&format!(
            "Detected {} key locations but {} keys are expected from {}; press hands may be misassigned",
            locations.len(),
            expected,
            starting_key
        ));
    }

    let mut data = Vec::new();
    let mut n_frames = 0;

    while let Some(frame) = source.read()? {
        for location in locations {
            let pixel = frame.hsv_at(location.x, location.y).ok_or_else(|| {
                PianoError::LocationOutOfBounds {
                    x: location.x,
                    y: location.y,
                    width: frame.width(),
                    height: frame.height(),
                }
            })?;
            data.extend_from_slice(&pixel.as_array());
        }
        n_frames += 1;

        if n_frames % PROGRESS_EVERY == 0 {
            sink.debug(&format!("Sampled {} frames", n_frames));
        }
    }

    sink.info(&format!(
        "Sampled {} frames x {} keys",
        n_frames,
        locations.len()
    ));
    SampleTable::from_raw(starting_key, n_frames, locations.len(), data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogLevel, MemorySink};
    use crate::video::{Frame, FrameBuffer};

    #[test]
    fn test_samples_each_location() {
        let mut image = image::RgbImage::from_pixel(4, 2, image::Rgb([0, 0, 0]));
        image.put_pixel(0, 1, image::Rgb([255, 255, 255]));
        image.put_pixel(3, 1, image::Rgb([0, 255, 0]));
        let mut source = FrameBuffer::new(vec![Frame::from_image(image)]);
        let locations = [KeyLocation { x: 0, y: 1 }, KeyLocation { x: 3, y: 1 }];
        let sink = MemorySink::new(LogLevel::Info);

        let table = sample_keys(&mut source, &locations, PianoKey::from_name("B7").unwrap(), &sink)
            .unwrap();
        assert_eq!(table.n_frames(), 1);
        assert_eq!(table.get(0, 0).v, 255);
        assert_eq!(table.get(0, 0).s, 0);
        assert_eq!(table.get(0, 1).h, 60);
        assert_eq!(table.column_name(1), "C8");
    }

    #[test]
    fn test_out_of_bounds_location_fails() {
        let mut source = FrameBuffer::new(vec![Frame::filled(4, 4, [9, 9, 9])]);
        let locations = [KeyLocation { x: 4, y: 0 }];
        let sink = MemorySink::new(LogLevel::Info);
        let err = sample_keys(&mut source, &locations, PianoKey::C8, &sink).unwrap_err();
        assert!(matches!(err, PianoError::LocationOutOfBounds { x: 4, .. }));
    }
}
