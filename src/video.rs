//! Video frames, HSV conversion and frame sources
//!
//! Decoding is delegated to the ffmpeg command line tools: `ffprobe` reports
//! stream geometry and rate, `ffmpeg` streams raw RGB24 frames over a pipe.
//! Frames are read forward-only; restarting means reopening the file.

use crate::error::{PianoError, Result as PianoResult};
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

/// One pixel in OpenCV's 8-bit HSV layout: hue in [0, 180), saturation and value in [0, 255]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Hsv {
    pub h: u8,
    pub s: u8,
    pub v: u8,
}

impl Hsv {
    pub const fn new(h: u8, s: u8, v: u8) -> Self {
        Self { h, s, v }
    }

    /// Convert a display RGB triple to HSV
    pub fn from_rgb(rgb: [u8; 3]) -> Self {
        let [r, g, b] = rgb.map(|c| c as f32);
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let diff = max - min;

        let s = if max > 0.0 { diff * 255.0 / max } else { 0.0 };

        let mut h = if diff == 0.0 {
            0.0
        } else if max == r {
            60.0 * (g - b) / diff
        } else if max == g {
            120.0 + 60.0 * (b - r) / diff
        } else {
            240.0 + 60.0 * (r - g) / diff
        };
        if h < 0.0 {
            h += 360.0;
        }

        let h = (h / 2.0).round() as u16 % 180;
        Self {
            h: h as u8,
            s: s.round() as u8,
            v: max as u8,
        }
    }

    /// Convert back to display RGB
    pub fn to_rgb(&self) -> [u8; 3] {
        let v = self.v as f32 / 255.0;
        let s = self.s as f32 / 255.0;
        let h = (self.h as f32 * 2.0) % 360.0;

        let c = v * s;
        let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
        let m = v - c;
        let (r, g, b) = match (h / 60.0) as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };

        [r, g, b].map(|ch| ((ch + m) * 255.0).round().clamp(0.0, 255.0) as u8)
    }

    pub fn as_array(&self) -> [u8; 3] {
        [self.h, self.s, self.v]
    }
}

/// A decoded video frame in display (RGB) colour space
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    /// Wrap a packed RGB24 buffer
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> PianoResult<Self> {
        let expected = width as usize * height as usize * 3;
        let actual = data.len();
        RgbImage::from_raw(width, height, data)
            .map(|image| Self { image })
            .ok_or(PianoError::FrameShapeMismatch { expected, actual })
    }

    pub fn from_image(image: RgbImage) -> Self {
        Self { image }
    }

    /// Solid-colour frame
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self {
            image: RgbImage::from_pixel(width, height, Rgb(rgb)),
        }
    }

    pub fn width(&self) -> usize {
        self.image.width() as usize
    }

    pub fn height(&self) -> usize {
        self.image.height() as usize
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn rgb_at(&self, x: usize, y: usize) -> Option<[u8; 3]> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        Some(self.image.get_pixel(x as u32, y as u32).0)
    }

    pub fn hsv_at(&self, x: usize, y: usize) -> Option<Hsv> {
        self.rgb_at(x, y).map(Hsv::from_rgb)
    }

    /// HSV value (brightness) channel along row `y`; empty if the row does not exist
    pub fn value_row(&self, y: usize) -> Vec<u8> {
        if y >= self.height() {
            return Vec::new();
        }
        (0..self.width())
            .map(|x| Hsv::from_rgb(self.image.get_pixel(x as u32, y as u32).0).v)
            .collect()
    }
}

/// Stream geometry and timing reported by the decoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: Option<u64>,
    pub duration_sec: Option<f64>,
}

/// Forward-only sequence of frames
pub trait FrameSource {
    /// Next frame, or `None` at end of stream
    fn read(&mut self) -> PianoResult<Option<Frame>>;
}

/// In-memory frame source
#[derive(Debug, Clone, Default)]
pub struct FrameBuffer {
    frames: VecDeque<Frame>,
}

impl FrameBuffer {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for FrameBuffer {
    fn read(&mut self) -> PianoResult<Option<Frame>> {
        Ok(self.frames.pop_front())
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

/// Parse an ffprobe rational such as "30000/1001"
fn parse_rate(rate: &str) -> Option<f64> {
    let (num, den) = match rate.split_once('/') {
        Some((n, d)) => (n.trim().parse::<f64>().ok()?, d.trim().parse::<f64>().ok()?),
        None => (rate.trim().parse::<f64>().ok()?, 1.0),
    };
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}

fn parse_probe(json: &str) -> PianoResult<VideoInfo> {
    let probe: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| PianoError::VideoOpenFailed(format!("unreadable ffprobe output: {}", e)))?;
    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| PianoError::VideoOpenFailed("no video stream found".to_string()))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => {
            return Err(PianoError::VideoOpenFailed(
                "video stream has no frame size".to_string(),
            ))
        }
    };

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate))
        .unwrap_or(0.0);

    Ok(VideoInfo {
        width,
        height,
        fps,
        frame_count: stream.nb_frames.and_then(|n| n.parse().ok()),
        duration_sec: stream.duration.and_then(|d| d.parse().ok()),
    })
}

pub(crate) fn tool_error(tool: &str, err: std::io::Error) -> PianoError {
    if err.kind() == ErrorKind::NotFound {
        PianoError::ToolUnavailable(format!("{} not found on PATH", tool))
    } else {
        PianoError::ToolUnavailable(format!("failed to run {}: {}", tool, err))
    }
}

/// Query stream geometry and frame rate with ffprobe
pub fn probe_video<P: AsRef<Path>>(path: P) -> PianoResult<VideoInfo> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PianoError::VideoOpenFailed(format!(
            "file does not exist: {}",
            path.display()
        )));
    }

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate,avg_frame_rate,nb_frames,duration",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| tool_error("ffprobe", e))?;

    if !output.status.success() {
        return Err(PianoError::VideoOpenFailed(format!(
            "ffprobe rejected {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_probe(&String::from_utf8_lossy(&output.stdout))
}

/// Frames decoded by an ffmpeg child process
#[derive(Debug)]
pub struct VideoReader {
    path: PathBuf,
    info: VideoInfo,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
    frames_read: usize,
}

impl VideoReader {
    /// Open a video at its first frame
    pub fn open<P: AsRef<Path>>(path: P) -> PianoResult<Self> {
        Self::open_at(path, 0)
    }

    /// Open a video positioned at `start_frame`
    pub fn open_at<P: AsRef<Path>>(path: P, start_frame: usize) -> PianoResult<Self> {
        let path = path.as_ref().to_path_buf();
        let info = probe_video(&path)?;

        let mut command = Command::new("ffmpeg");
        command.args(["-v", "error", "-nostdin"]);
        if start_frame > 0 && info.fps > 0.0 {
            let start_sec = start_frame as f64 / info.fps;
            command.args(["-ss", &format!("{:.6}", start_sec)]);
        }
        command
            .arg("-i")
            .arg(&path)
            .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| tool_error("ffmpeg", e))?;
        let stdout = child.stdout.take().ok_or_else(|| {
            PianoError::VideoOpenFailed("ffmpeg stdout was not captured".to_string())
        })?;
        // Drained on its own thread so a chatty decoder cannot block the frame pipe
        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });

        Ok(Self {
            path,
            info,
            child: Some(child),
            stdout: Some(stdout),
            stderr,
            frames_read: 0,
        })
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_read(&self) -> usize {
        self.frames_read
    }

    fn frame_bytes(&self) -> usize {
        self.info.width as usize * self.info.height as usize * 3
    }

    /// Reap the child once the pipe is drained
    fn finish(&mut self) -> PianoResult<()> {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let status = child
                .wait()
                .map_err(|e| PianoError::VideoDecodeError(e.to_string()))?;
            let diagnostics = self
                .stderr
                .take()
                .and_then(|handle| handle.join().ok())
                .unwrap_or_default();
            if !status.success() {
                return Err(PianoError::VideoDecodeError(decode_failure_message(
                    &status.to_string(),
                    self.frames_read,
                    &self.path,
                    &diagnostics,
                )));
            }
        }
        Ok(())
    }
}

/// Number of trailing ffmpeg stderr lines kept in a decode error
const STDERR_TAIL_LINES: usize = 4;

/// Last few non-empty lines of a tool's stderr, joined on one line
fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("; ")
}

fn decode_failure_message(status: &str, frames_read: usize, path: &Path, stderr: &str) -> String {
    let mut message = format!(
        "ffmpeg exited with {} after {} frames of {}",
        status,
        frames_read,
        path.display()
    );
    let tail = stderr_tail(stderr);
    if !tail.is_empty() {
        message.push_str(": ");
        message.push_str(&tail);
    }
    message
}

impl FrameSource for VideoReader {
    fn read(&mut self) -> PianoResult<Option<Frame>> {
        let frame_bytes = self.frame_bytes();
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let mut buffer = vec![0u8; frame_bytes];
        let mut filled = 0;
        while filled < frame_bytes {
            match stdout.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(PianoError::VideoDecodeError(e.to_string())),
            }
        }

        if filled == 0 {
            self.finish()?;
            return Ok(None);
        }
        if filled < frame_bytes {
            self.finish()?;
            return Err(PianoError::VideoDecodeError(format!(
                "truncated frame {}: {} of {} bytes",
                self.frames_read, filled, frame_bytes
            )));
        }

        self.frames_read += 1;
        Frame::from_rgb(self.info.width, self.info.height, buffer).map(Some)
    }
}

impl Drop for VideoReader {
    fn drop(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(handle) = self.stderr.take() {
            let _ = handle.join();
        }
    }
}
