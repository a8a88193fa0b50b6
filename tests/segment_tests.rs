//! Validation tests for key boundary segmentation

use image::{Rgb, RgbImage};
use pianovision::analysis::KeyLocation;
use pianovision::config::VisionConfig;
use pianovision::stages::segment::{key_spans, locate_keys, locate_keys_with, scanline_row};
use pianovision::{Frame, LogLevel, MemorySink};

/// Scanline of `n_keys` plateaus of `key_width` pixels, alternating bright and dark
fn generate_keyboard_row(n_keys: usize, key_width: usize, jitter: bool) -> Vec<u8> {
    (0..n_keys * key_width)
        .map(|x| {
            let base: u8 = if (x / key_width) % 2 == 0 { 200 } else { 40 };
            let noise = if jitter { ((x * 7) % 11) as u8 } else { 0 };
            base + noise
        })
        .collect()
}

/// Frame whose every row is `row` in grey
fn frame_from_row(row: &[u8], height: u32) -> Frame {
    let mut image = RgbImage::new(row.len() as u32, height);
    for (x, _, pixel) in image.enumerate_pixels_mut() {
        let v = row[x as usize];
        *pixel = Rgb([v, v, v]);
    }
    Frame::from_image(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evenly_spaced_transitions() {
        let key_width = 12;
        for transitions in [1usize, 5, 20, 87] {
            let row = generate_keyboard_row(transitions + 1, key_width, false);
            let spans = key_spans(&row, 20, 3);

            assert_eq!(
                spans.len(),
                transitions + 1,
                "{} transitions should give {} spans",
                transitions,
                transitions + 1
            );
            for (k, span) in spans.iter().enumerate() {
                let true_center = (k * key_width) as f64 + (key_width as f64 - 1.0) / 2.0;
                assert!(
                    (span.center() as f64 - true_center).abs() <= 1.0,
                    "span {} center {} too far from {}",
                    k,
                    span.center(),
                    true_center
                );
            }
        }
    }

    #[test]
    fn test_noise_below_threshold_is_ignored() {
        let row = generate_keyboard_row(30, 10, true);
        let spans = key_spans(&row, 20, 3);
        assert_eq!(spans.len(), 30);
    }

    #[test]
    fn test_constant_scanline_is_single_span() {
        for value in [0u8, 128, 255] {
            for threshold in [1u8, 20, 100] {
                let row = vec![value; 300];
                let spans = key_spans(&row, threshold, 3);
                assert_eq!(spans.len(), 1);
                assert_eq!(spans[0].left, 0);
                assert_eq!(spans[0].right, 300);
            }
        }
    }

    #[test]
    fn test_three_key_scenario_on_frame() {
        let mut image = RgbImage::from_pixel(9, 100, Rgb([128, 128, 128]));
        let row = [10u8, 10, 10, 200, 200, 200, 15, 15, 15];
        let y = scanline_row(100, 20.0);
        assert_eq!(y, 80);
        for (x, &v) in row.iter().enumerate() {
            image.put_pixel(x as u32, y as u32, Rgb([v, v, v]));
        }
        let sink = MemorySink::new(LogLevel::Debug);

        let locations = locate_keys(&Frame::from_image(image), 20.0, 50, &sink);
        assert_eq!(
            locations,
            vec![
                KeyLocation { x: 1, y: 80 },
                KeyLocation { x: 4, y: 80 },
                KeyLocation { x: 7, y: 80 },
            ]
        );
        assert!(!sink.contains(LogLevel::Warning, "No key boundaries"));
    }

    #[test]
    fn test_full_keyboard_from_config() {
        let row = generate_keyboard_row(88, 6, false);
        let frame = frame_from_row(&row, 40);
        let config = VisionConfig::default();
        let sink = MemorySink::new(LogLevel::Info);

        let locations = locate_keys_with(&frame, &config, &sink);
        assert_eq!(locations.len(), 88);
        for (k, location) in locations.iter().enumerate() {
            assert_eq!(location.x / 6, k, "location {} lies outside its key", k);
            assert_eq!(location.y, scanline_row(40, config.key_offset));
        }
    }

    #[test]
    fn test_locations_are_left_to_right() {
        let row = generate_keyboard_row(40, 9, true);
        let frame = frame_from_row(&row, 20);
        let sink = MemorySink::new(LogLevel::Info);

        let locations = locate_keys(&frame, 50.0, 20, &sink);
        assert!(locations.windows(2).all(|pair| pair[0].x < pair[1].x));
    }

    #[test]
    fn test_uniform_frame_warns() {
        let frame = Frame::filled(200, 50, [90, 90, 90]);
        let sink = MemorySink::new(LogLevel::Info);

        let locations = locate_keys(&frame, 20.0, 20, &sink);
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].x, 100);
        assert!(sink.contains(LogLevel::Warning, "No key boundaries"));
    }
}
