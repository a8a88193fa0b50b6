//! Key boundary segmentation along a single scanline

use crate::analysis::{KeyLocation, KeySpan};
use crate::config::VisionConfig;
use crate::logging::LogSink;
use crate::video::Frame;

/// Window used when none is configured
pub const DEFAULT_WINDOW: usize = 3;

/// Row index of the scanline `key_offset` percent of the height above the bottom edge
pub fn scanline_row(height: usize, key_offset: f64) -> usize {
    let rise = (height as f64 * key_offset / 100.0) as usize;
    height.saturating_sub(rise).min(height.saturating_sub(1))
}

/// Split a value-channel row into key spans.
///
/// A window whose spread stays within `threshold` marks the inside of a key; a
/// window whose spread reaches `threshold` after that marks the edge closing it.
/// Pixels before the first plateau belong to the first span and the last span
/// runs to the end of the row.
pub fn key_spans(row: &[u8], threshold: u8, window: usize) -> Vec<KeySpan> {
    if row.is_empty() {
        return Vec::new();
    }
    let window = window.max(1);

    let mut spans = Vec::new();
    let mut settled = false;
    let mut left_edge = 0;

    for (i, values) in row.windows(window).enumerate() {
        let max = values.iter().copied().max().unwrap_or(0);
        let min = values.iter().copied().min().unwrap_or(0);
        let max_diff = max - min;

        if !settled && max_diff <= threshold {
            settled = true;
            if !spans.is_empty() {
                left_edge = i;
            }
        } else if settled && max_diff >= threshold {
            spans.push(KeySpan {
                left: left_edge,
                right: i + 1,
            });
            left_edge = i;
            settled = false;
        }
    }

    spans.push(KeySpan {
        left: left_edge,
        right: row.len(),
    });
    spans
}

/// Locate the sampling point of every visible key on `frame`
pub fn locate_keys(
    frame: &Frame,
    key_offset: f64,
    threshold: u8,
    sink: &dyn LogSink,
) -> Vec<KeyLocation> {
    locate_keys_windowed(frame, key_offset, threshold, DEFAULT_WINDOW, sink)
}

/// `locate_keys` driven by a vision config
pub fn locate_keys_with(frame: &Frame, config: &VisionConfig, sink: &dyn LogSink) -> Vec<KeyLocation> {
    locate_keys_windowed(
        frame,
        config.key_offset,
        config.key_difference_threshold,
        config.window_size,
        sink,
    )
}

fn locate_keys_windowed(
    frame: &Frame,
    key_offset: f64,
    threshold: u8,
    window: usize,
    sink: &dyn LogSink,
) -> Vec<KeyLocation> {
    if frame.width() == 0 || frame.height() == 0 {
        sink.warn("Reference frame is empty, no keys located");
        return Vec::new();
    }

    let y = scanline_row(frame.height(), key_offset);
    let row = frame.value_row(y);
    let spans = key_spans(&row, threshold, window);

    sink.debug(&format!(
        "Scanline y={} (offset {}%), threshold {}, window {}: {} spans",
        y,
        key_offset,
        threshold,
        window,
        spans.len()
    ));
    if spans.len() == 1 {
        sink.warn(&format!(
            "No key boundaries found on scanline y={}; check the key offset and threshold",
            y
        ));
    }

    spans
        .iter()
        .map(|span| KeyLocation {
            x: span.center(),
            y,
        })
        .collect()
}
