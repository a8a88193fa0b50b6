//! Piano Press Transcription from Video
//!
//! An offline pipeline that finds the keys of a piano on a reference video
//! frame, samples every key's colour on every frame, and clusters those samples
//! into unpressed, left-hand and right-hand states without labelled data.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod export;
pub mod gmm;
pub mod logging;
pub mod piano;
pub mod qa;
pub mod spectral;
pub mod stages;
pub mod video;

pub use analysis::{
    Classification, KeyLocation, PressState, PressTable, SampleTable, Transcription,
};
pub use config::Config;
pub use error::{PianoError, Result};
pub use logging::{ConsoleSink, LogLevel, LogSink, MemorySink, NullSink};
pub use piano::PianoKey;
pub use video::{Frame, FrameBuffer, FrameSource, Hsv, VideoInfo, VideoReader};

use std::path::Path;

/// Scanline and key locations found on the reference frame
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    pub scan_row: usize,
    pub locations: Vec<KeyLocation>,
}

/// Main processing pipeline for piano press transcription
pub struct PianoVision {
    config: Config,
    sink: Box<dyn LogSink>,
}

impl PianoVision {
    /// Create a new processor with the given configuration and log sink
    pub fn new(config: Config, sink: Box<dyn LogSink>) -> Self {
        Self { config, sink }
    }

    /// Processor that logs through the `log` facade at the configured level
    pub fn with_console(config: Config) -> Self {
        let sink = Box::new(ConsoleSink::new(config.log_level));
        Self::new(config, sink)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sink(&self) -> &dyn LogSink {
        self.sink.as_ref()
    }

    /// Locate every visible key on `reference`
    pub fn segment(&self, reference: &Frame) -> Segmentation {
        let vision = &self.config.vision;
        let scan_row = stages::segment::scanline_row(reference.height(), vision.key_offset);
        let locations = stages::segment::locate_keys_with(reference, vision, self.sink());

        let expected = piano::expected_key_count(vision.starting_key);
        self.sink.info(&format!(
            "Located {} keys on scanline y={} ({} expected from {})",
            locations.len(),
            scan_row,
            expected,
            vision.starting_key
        ));

        Segmentation {
            scan_row,
            locations,
        }
    }

    /// Sample every frame of `source` at `locations`
    pub fn sample<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        locations: &[KeyLocation],
    ) -> Result<SampleTable> {
        stages::sample::sample_keys(
            source,
            locations,
            self.config.vision.starting_key,
            self.sink(),
        )
    }

    /// Classify a sample table into press states
    pub fn classify(&self, table: &SampleTable) -> Result<Classification> {
        stages::classify::classify_presses(table, &self.config.classification, self.sink())
    }

    /// Run all three stages over in-memory frames
    pub fn run_frames<S: FrameSource + ?Sized>(
        &self,
        reference: &Frame,
        source: &mut S,
    ) -> Result<Transcription> {
        let segmentation = self.segment(reference);
        let samples = self.sample(source, &segmentation.locations)?;
        let classification = self.classify(&samples)?;

        Ok(Transcription {
            video: None,
            scan_row: segmentation.scan_row,
            key_locations: segmentation.locations,
            expected_key_count: piano::expected_key_count(self.config.vision.starting_key),
            samples,
            classification,
            bpm: None,
        })
    }

    /// Read the configured reference frame of `input` and segment it
    pub fn locate<P: AsRef<Path>>(&self, input: P) -> Result<(Frame, VideoInfo, Segmentation)> {
        let input = input.as_ref();
        let index = self.config.vision.reference_frame;

        let mut reader = VideoReader::open_at(input, index)?;
        let info = reader.info().clone();
        self.sink.info(&format!(
            "Opened {} ({}x{} @ {:.2} fps)",
            reader.path().display(),
            info.width,
            info.height,
            info.fps
        ));

        let reference = reader.read()?.ok_or_else(|| {
            PianoError::VideoDecodeError(format!(
                "no frame at index {} in {}",
                index,
                input.display()
            ))
        })?;
        drop(reader);

        let segmentation = self.segment(&reference);
        Ok((reference, info, segmentation))
    }

    /// Process a video file and write results to `output_dir`
    pub fn process<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output_dir: Q,
    ) -> Result<Transcription> {
        let input = input.as_ref();
        let output_dir = output_dir.as_ref();

        let (reference, info, segmentation) = self.locate(input)?;

        // Sampling always starts from the first frame
        let mut reader = VideoReader::open(input)?;
        let samples = self.sample(&mut reader, &segmentation.locations)?;
        let classification = self.classify(&samples)?;

        let bpm = if self.config.audio.detect_tempo {
            match self.detect_tempo(input, output_dir) {
                Ok(bpm) => bpm,
                Err(e @ PianoError::AudioExtractionFailed(_)) => {
                    self.sink.warn(&format!("Skipping tempo estimate: {}", e));
                    None
                }
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        let transcription = Transcription {
            video: Some(info),
            scan_row: segmentation.scan_row,
            key_locations: segmentation.locations,
            expected_key_count: piano::expected_key_count(self.config.vision.starting_key),
            samples,
            classification,
            bpm,
        };

        self.export_results(&transcription, Some(&reference), output_dir)?;
        Ok(transcription)
    }

    /// Extract the soundtrack next to the results and estimate its tempo
    pub fn detect_tempo<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output_dir: Q,
    ) -> Result<Option<f32>> {
        let wav_path = output_dir.as_ref().join("audio.wav");
        audio::extract_audio(input, &wav_path, &self.config.audio, self.sink())?;
        audio::detect_bpm(&wav_path, &self.config.audio, self.sink())
    }

    /// Write the analysis summary plus whichever debug artifacts are enabled
    pub fn export_results<P: AsRef<Path>>(
        &self,
        transcription: &Transcription,
        reference: Option<&Frame>,
        output_dir: P,
    ) -> Result<()> {
        let output_dir = output_dir.as_ref();
        let export = &self.config.export;

        analysis::export_analysis(transcription, output_dir)?;
        if export.write_sample_table {
            export::write_sample_table(&transcription.samples, output_dir.join("samples.txt"))?;
        }
        if export.write_press_table {
            export::write_press_table(
                &transcription.classification.presses,
                output_dir.join("presses.txt"),
            )?;
        }

        let preview = reference.filter(|_| export.render_preview);
        let timeline = Some(&transcription.classification.presses).filter(|_| export.render_timeline);
        if preview.is_some() || timeline.is_some() {
            qa::generate_artifacts(
                preview,
                &transcription.key_locations,
                transcription.scan_row,
                timeline,
                output_dir,
                self.sink(),
            )?;
        }

        self.sink
            .info(&format!("Results saved to {}", output_dir.display()));
        Ok(())
    }
}

/// Validate configuration and input files
pub fn validate_input<P: AsRef<Path>>(input_path: P, config: &Config) -> Result<()> {
    let input_path = input_path.as_ref();
    if !input_path.is_file() {
        return Err(PianoError::InputValidationError(format!(
            "Video file does not exist: {}",
            input_path.display()
        )));
    }

    config::validate_config(config)
        .map_err(|e| PianoError::ConfigValidationFailed(e.to_string()))?;

    Ok(())
}
