//! Configuration system for the piano press pipeline

use crate::logging::LogLevel;
use crate::piano::PianoKey;
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: String,
    pub vision: VisionConfig,
    pub classification: ClassificationConfig,
    pub audio: AudioConfig,
    pub export: ExportConfig,
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            vision: VisionConfig::default(),
            classification: ClassificationConfig::default(),
            audio: AudioConfig::default(),
            export: ExportConfig::default(),
            log_level: LogLevel::Info,
        }
    }
}

/// Key segmentation and sampling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Scanline height as a percentage of frame height, measured from the bottom
    pub key_offset: f64,
    /// Minimum value-channel swing inside the window that counts as a key edge
    pub key_difference_threshold: u8,
    pub window_size: usize,
    /// Leftmost visible key
    pub starting_key: PianoKey,
    /// Frame used to locate the keys
    pub reference_frame: usize,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            key_offset: 20.0,
            key_difference_threshold: 20,
            window_size: 3,
            starting_key: PianoKey::A0,
            reference_frame: 0,
        }
    }
}

/// Mixture fitting and label mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Samples darker than this collapse to (0, 0, threshold / 2)
    pub dark_value_threshold: u8,
    pub n_components: usize,
    pub random_seed: u64,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub reg_covar: f64,
    /// k-means++ candidates per centre; 0 picks 2 + ln(k)
    pub init_candidates: usize,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            dark_value_threshold: 50,
            n_components: 4,
            random_seed: 0,
            max_iterations: 100,
            tolerance: 1e-3,
            reg_covar: 1e-6,
            init_candidates: 0,
        }
    }
}

/// Soundtrack extraction and tempo estimate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub detect_tempo: bool,
    pub sample_rate: u32,
    pub channels: u16,
    pub tempo_range_bpm: [f32; 2],
    pub n_fft: usize,
    pub hop_length: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            detect_tempo: false,
            sample_rate: 44100,
            channels: 2,
            tempo_range_bpm: [60.0, 200.0],
            n_fft: 2048,
            hop_length: 512,
        }
    }
}

/// Debug artifacts written next to the analysis summary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub write_sample_table: bool,
    pub write_press_table: bool,
    pub render_preview: bool,
    pub render_timeline: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            write_sample_table: true,
            write_press_table: true,
            render_preview: true,
            render_timeline: true,
        }
    }
}

/// Validate configuration parameters
pub fn validate_config(config: &Config) -> anyhow::Result<()> {
    let vision = &config.vision;
    if !(vision.key_offset > 0.0 && vision.key_offset <= 100.0) {
        anyhow::bail!("key_offset must be in (0, 100], got {}", vision.key_offset);
    }
    if vision.window_size < 2 {
        anyhow::bail!("window_size must be at least 2");
    }

    let classification = &config.classification;
    // Two resting colours plus at least one candidate per hand
    if classification.n_components < 4 {
        anyhow::bail!(
            "n_components must be at least 4, got {}",
            classification.n_components
        );
    }
    if classification.max_iterations == 0 {
        anyhow::bail!("max_iterations must be positive");
    }
    if !(classification.tolerance > 0.0) {
        anyhow::bail!("tolerance must be positive");
    }
    if classification.reg_covar < 0.0 {
        anyhow::bail!("reg_covar must not be negative");
    }

    let audio = &config.audio;
    if audio.tempo_range_bpm[0] <= 0.0 || audio.tempo_range_bpm[0] >= audio.tempo_range_bpm[1] {
        anyhow::bail!("tempo_range_bpm min must be positive and < max");
    }
    if audio.hop_length == 0 || audio.n_fft < audio.hop_length {
        anyhow::bail!("n_fft must be >= hop_length > 0");
    }
    if audio.channels == 0 || audio.sample_rate == 0 {
        anyhow::bail!("sample_rate and channels must be positive");
    }

    Ok(())
}

/// Load configuration from JSON file
pub fn load_config<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Save configuration to JSON file
pub fn save_config<P: AsRef<std::path::Path>>(config: &Config, path: P) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_saved_config_loads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pianovision.json");
        let mut config = Config::default();
        config.vision.starting_key = PianoKey::MIDDLE_C;
        config.classification.random_seed = 7;

        save_config(&config, &path).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.vision.starting_key, PianoKey::MIDDLE_C);
        assert_eq!(loaded.classification.random_seed, 7);
        assert_eq!(loaded.classification.n_components, 4);
    }

    #[test]
    fn test_invalid_saved_config_rejected_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        let mut config = Config::default();
        config.vision.key_offset = 150.0;

        save_config(&config, &path).unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.classification.dark_value_threshold, 50);
        assert_eq!(config.classification.n_components, 4);
        assert_eq!(config.vision.window_size, 3);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{ "vision": { "key_offset": 12.5, "starting_key": "C4" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.vision.key_offset, 12.5);
        assert_eq!(config.vision.starting_key, PianoKey::MIDDLE_C);
        assert_eq!(config.vision.key_difference_threshold, 20);
        assert_eq!(config.audio.sample_rate, 44100);
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = Config::default();
        config.vision.key_offset = 0.0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.classification.n_components = 3;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.audio.tempo_range_bpm = [200.0, 60.0];
        assert!(validate_config(&config).is_err());

        let json = r#"{ "vision": { "key_difference_threshold": 300 } }"#;
        assert!(serde_json::from_str::<Config>(json).is_err());
    }
}
