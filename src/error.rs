//! Error types for the piano press pipeline

use std::fmt;

/// Custom error type for piano video processing
#[derive(Debug, Clone)]
pub enum PianoError {
    /// E001: Configuration validation failed
    ConfigValidationFailed(String),
    /// E002: Video file could not be opened or probed
    VideoOpenFailed(String),
    /// E003: Frame decode error mid-stream
    VideoDecodeError(String),
    /// E004: External media tool (ffmpeg/ffprobe) missing or unusable
    ToolUnavailable(String),
    /// E005: Frame buffer does not match its declared dimensions
    FrameShapeMismatch {
        expected: usize,
        actual: usize,
    },
    /// E006: Key location lies outside the frame
    LocationOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },
    /// E007: A pressed-candidate cluster never occurs in the table
    EmptyHandCluster(usize),
    /// E008: Classification error
    ClassificationError(String),
    /// E009: Audio extraction subprocess failed
    AudioExtractionFailed(String),
    /// E010: Audio file I/O or format error
    AudioFileError(String),
    /// E011: Debug/analysis export error
    ExportError(String),
    /// E012: QA rendering error
    QaRenderError(String),
    /// E013: Input validation error
    InputValidationError(String),
    /// E014: Processing pipeline error
    ProcessingPipelineError(String),
}

impl fmt::Display for PianoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PianoError::ConfigValidationFailed(msg) => {
                write!(f, "E001: Configuration validation failed - {}", msg)
            }
            PianoError::VideoOpenFailed(msg) => {
                write!(f, "E002: Unable to open video - {}", msg)
            }
            PianoError::VideoDecodeError(msg) => {
                write!(f, "E003: Video decode error - {}", msg)
            }
            PianoError::ToolUnavailable(msg) => {
                write!(f, "E004: Media tool unavailable - {}", msg)
            }
            PianoError::FrameShapeMismatch { expected, actual } => {
                write!(
                    f,
                    "E005: Frame buffer holds {} bytes, expected {}",
                    actual, expected
                )
            }
            PianoError::LocationOutOfBounds {
                x,
                y,
                width,
                height,
            } => {
                write!(
                    f,
                    "E006: Key location ({}, {}) outside {}x{} frame",
                    x, y, width, height
                )
            }
            PianoError::EmptyHandCluster(label) => {
                write!(
                    f,
                    "E007: Pressed cluster {} has no samples, cannot average its key ordinal",
                    label
                )
            }
            PianoError::ClassificationError(msg) => {
                write!(f, "E008: Classification error - {}", msg)
            }
            PianoError::AudioExtractionFailed(msg) => {
                write!(f, "E009: Audio extraction failed - {}", msg)
            }
            PianoError::AudioFileError(msg) => {
                write!(f, "E010: Audio file error - {}", msg)
            }
            PianoError::ExportError(msg) => {
                write!(f, "E011: Export error - {}", msg)
            }
            PianoError::QaRenderError(msg) => {
                write!(f, "E012: QA render error - {}", msg)
            }
            PianoError::InputValidationError(msg) => {
                write!(f, "E013: Input validation error - {}", msg)
            }
            PianoError::ProcessingPipelineError(msg) => {
                write!(f, "E014: Processing pipeline error - {}", msg)
            }
        }
    }
}

impl std::error::Error for PianoError {}

impl From<std::io::Error> for PianoError {
    fn from(err: std::io::Error) -> Self {
        PianoError::ExportError(format!("File I/O error: {}", err))
    }
}

impl From<serde_json::Error> for PianoError {
    fn from(err: serde_json::Error) -> Self {
        PianoError::ExportError(format!("JSON serialization error: {}", err))
    }
}

impl From<image::ImageError> for PianoError {
    fn from(err: image::ImageError) -> Self {
        PianoError::QaRenderError(format!("Image error: {}", err))
    }
}

impl From<hound::Error> for PianoError {
    fn from(err: hound::Error) -> Self {
        PianoError::AudioFileError(err.to_string())
    }
}

impl From<anyhow::Error> for PianoError {
    fn from(err: anyhow::Error) -> Self {
        PianoError::ProcessingPipelineError(format!("Generic error: {}", err))
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PianoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_code() {
        let err = PianoError::EmptyHandCluster(3);
        assert!(err.to_string().starts_with("E007"));

        let err = PianoError::LocationOutOfBounds {
            x: 10,
            y: 4,
            width: 8,
            height: 8,
        };
        assert_eq!(err.to_string(), "E006: Key location (10, 4) outside 8x8 frame");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: PianoError = io.into();
        assert!(matches!(err, PianoError::ExportError(_)));
    }
}
