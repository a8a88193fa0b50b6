//! QA artifacts: key-location preview over the reference frame and a press timeline

use crate::analysis::{KeyLocation, PressState, PressTable};
use crate::error::{PianoError, Result as PianoResult};
use crate::logging::LogSink;
use crate::video::Frame;
use plotters::prelude::*;
use std::fs;
use std::path::Path;

/// Timeline rows beyond this are decimated
const MAX_TIMELINE_ROWS: usize = 2000;
/// Timeline pixels per key column
const KEY_WIDTH: u32 = 8;

const DOT_COLORS: [RGBColor; 2] = [RGBColor(0, 200, 255), RGBColor(255, 0, 200)];

fn render_error<E: std::fmt::Debug>(what: &str, e: E) -> PianoError {
    PianoError::QaRenderError(format!("{}: {:?}", what, e))
}

fn state_color(state: PressState) -> RGBColor {
    match state {
        PressState::Unpressed => RGBColor(40, 40, 40),
        PressState::LeftHand => RGBColor(30, 110, 255),
        PressState::RightHand => RGBColor(255, 140, 0),
    }
}

/// Generate the requested QA images under `output_dir/qa`
pub fn generate_artifacts(
    reference: Option<&Frame>,
    locations: &[KeyLocation],
    scan_row: usize,
    presses: Option<&PressTable>,
    output_dir: &Path,
    sink: &dyn LogSink,
) -> PianoResult<()> {
    let qa_dir = output_dir.join("qa");
    fs::create_dir_all(&qa_dir)?;

    if let Some(reference) = reference {
        render_key_preview(reference, locations, scan_row, qa_dir.join("keys.png"))?;
    }
    if let Some(presses) = presses {
        if presses.n_frames() == 0 || presses.n_keys() == 0 {
            sink.warn("Press table is empty, skipping timeline");
        } else {
            render_press_timeline(presses, qa_dir.join("timeline.png"))?;
        }
    }

    sink.info(&format!("QA artifacts generated in {}", qa_dir.display()));
    Ok(())
}

/// Draw the scanline and one dot per key location over `frame`
pub fn render_key_preview<P: AsRef<Path>>(
    frame: &Frame,
    locations: &[KeyLocation],
    scan_row: usize,
    path: P,
) -> PianoResult<()> {
    let (width, height) = (frame.width() as u32, frame.height() as u32);
    if width == 0 || height == 0 {
        return Err(PianoError::QaRenderError("reference frame is empty".to_string()));
    }

    let mut buffer = frame.image().as_raw().clone();
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();

        let y = scan_row as i32;
        root.draw(&PathElement::new(
            vec![(0, y), (width as i32 - 1, y)],
            RED.stroke_width(2),
        ))
        .map_err(|e| render_error("Failed to draw scanline", e))?;

        let radius = (width / 400).max(3) as i32;
        for (i, location) in locations.iter().enumerate() {
            root.draw(&Circle::new(
                (location.x as i32, location.y as i32),
                radius,
                DOT_COLORS[i % 2].filled(),
            ))
            .map_err(|e| render_error("Failed to draw key marker", e))?;
        }

        root.present()
            .map_err(|e| render_error("Failed to finish preview", e))?;
    }

    let image = image::RgbImage::from_raw(width, height, buffer)
        .ok_or_else(|| PianoError::QaRenderError("preview buffer size mismatch".to_string()))?;
    image.save(path)?;
    Ok(())
}

/// Draw the press table as an image: one column per key, one row per frame
pub fn render_press_timeline<P: AsRef<Path>>(presses: &PressTable, path: P) -> PianoResult<()> {
    let n_frames = presses.n_frames();
    let n_keys = presses.n_keys();
    if n_frames == 0 || n_keys == 0 {
        return Err(PianoError::QaRenderError("press table is empty".to_string()));
    }

    let stride = n_frames.div_ceil(MAX_TIMELINE_ROWS);
    let rows = n_frames.div_ceil(stride);
    let size = (n_keys as u32 * KEY_WIDTH, rows as u32);

    let root = BitMapBackend::new(path.as_ref(), size).into_drawing_area();
    root.fill(&state_color(PressState::Unpressed))
        .map_err(|e| render_error("Failed to fill timeline background", e))?;

    for row in 0..rows {
        let y = row as i32;
        for col in 0..n_keys {
            let state = presses.get(row * stride, col);
            if !state.is_pressed() {
                continue;
            }
            let color = state_color(state);
            let x0 = (col as u32 * KEY_WIDTH) as i32;
            for x in x0..x0 + KEY_WIDTH as i32 {
                root.draw_pixel((x, y), &color)
                    .map_err(|e| render_error("Failed to draw timeline", e))?;
            }
        }
    }

    root.present()
        .map_err(|e| render_error("Failed to write timeline", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogLevel, MemorySink};
    use crate::piano::PianoKey;
    use ndarray::Array2;
    use tempfile::TempDir;

    #[test]
    fn test_key_preview_marks_scanline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keys.png");
        let frame = Frame::filled(64, 32, [255, 255, 255]);
        let locations = [KeyLocation { x: 10, y: 20 }, KeyLocation { x: 40, y: 20 }];

        render_key_preview(&frame, &locations, 20, &path).unwrap();
        let image = image::open(&path).unwrap().to_rgb8();
        assert_eq!(image.dimensions(), (64, 32));
        let on_line = image.get_pixel(32, 20).0;
        assert!(on_line[0] > 200 && on_line[1] < 60, "scanline pixel {:?}", on_line);
        assert_eq!(image.get_pixel(32, 5).0, [255, 255, 255]);
    }

    #[test]
    fn test_press_timeline_dimensions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("timeline.png");
        let mut states = Array2::from_elem((5000, 4), PressState::Unpressed);
        states[[0, 0]] = PressState::LeftHand;
        let presses = PressTable::new(PianoKey::A0, states);

        render_press_timeline(&presses, &path).unwrap();
        let image = image::open(&path).unwrap().to_rgb8();
        assert_eq!(image.dimensions(), (4 * KEY_WIDTH, 1667));
        assert_eq!(image.get_pixel(1, 0).0, [30, 110, 255]);
    }

    #[test]
    fn test_press_timeline_shows_pressed_cells() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("timeline.png");
        let mut states = Array2::from_elem((10, 3), PressState::RightHand);
        states[[4, 1]] = PressState::Unpressed;
        let presses = PressTable::new(PianoKey::A0, states);

        render_press_timeline(&presses, &path).unwrap();
        let image = image::open(&path).unwrap().to_rgb8();
        assert_eq!(image.dimensions(), (3 * KEY_WIDTH, 10));
        for (x, y, pixel) in image.enumerate_pixels() {
            let expected = if y == 4 && x / KEY_WIDTH == 1 {
                [40, 40, 40]
            } else {
                [255, 140, 0]
            };
            assert_eq!(pixel.0, expected, "pixel ({}, {})", x, y);
        }
    }

    #[test]
    fn test_empty_press_table_skipped() {
        let dir = TempDir::new().unwrap();
        let frame = Frame::filled(16, 16, [0, 0, 0]);
        let presses = PressTable::new(PianoKey::A0, Array2::from_elem((0, 3), PressState::Unpressed));
        let sink = MemorySink::new(LogLevel::Info);

        generate_artifacts(Some(&frame), &[], 8, Some(&presses), dir.path(), &sink).unwrap();
        assert!(dir.path().join("qa").join("keys.png").exists());
        assert!(!dir.path().join("qa").join("timeline.png").exists());
        assert!(sink.contains(LogLevel::Warning, "skipping timeline"));
    }
}
