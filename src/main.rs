use clap::{Args, Parser, Subcommand};
use log::LevelFilter;
use pianovision::{validate_input, Config, LogLevel, PianoKey, PianoVision};
use std::path::PathBuf;

/// Piano Press Transcription from Video
#[derive(Parser)]
#[command(name = "pianovision")]
#[command(about = "Locate piano keys in a performance video and classify key presses by hand")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet output
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Options shared by every command that reads a video
#[derive(Args)]
struct VideoArgs {
    /// Input video file
    input: PathBuf,

    /// Output directory for results
    #[arg(short, long, default_value = "./output")]
    output: PathBuf,

    /// Custom configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Scanline height above the bottom edge, in percent
    #[arg(long)]
    key_offset: Option<f64>,

    /// Value-channel spread that marks a key edge
    #[arg(long)]
    threshold: Option<u8>,

    /// Lowest visible key (e.g. "A0", "C4")
    #[arg(long)]
    starting_key: Option<String>,

    /// Frame index used for key segmentation
    #[arg(long)]
    reference_frame: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment keys, sample every frame and classify presses
    Analyze {
        #[command(flatten)]
        video: VideoArgs,

        /// Also extract the soundtrack and estimate its tempo
        #[arg(long)]
        tempo: bool,
    },
    /// Segment keys on the reference frame only and render the preview
    Locate {
        #[command(flatten)]
        video: VideoArgs,
    },
    /// Extract the soundtrack and estimate its tempo
    Tempo {
        /// Input video file
        input: PathBuf,

        /// Output directory for the extracted audio
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,

        /// Custom configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Validate configuration file
    ValidateConfig {
        /// Configuration file to validate
        config: PathBuf,
    },
    /// Show default configuration
    ShowConfig {
        /// Also write it to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn load_or_default(path: Option<PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => pianovision::config::load_config(path),
        None => Ok(Config::default()),
    }
}

fn apply_overrides(config: &mut Config, video: &VideoArgs) -> anyhow::Result<()> {
    if let Some(offset) = video.key_offset {
        config.vision.key_offset = offset;
    }
    if let Some(threshold) = video.threshold {
        config.vision.key_difference_threshold = threshold;
    }
    if let Some(name) = &video.starting_key {
        config.vision.starting_key = match PianoKey::from_name(name) {
            Some(key) => key,
            None => anyhow::bail!("Unknown starting key: {}", name),
        };
    }
    if let Some(index) = video.reference_frame {
        config.vision.reference_frame = index;
    }
    Ok(())
}

fn init_logging(config_level: LogLevel, verbose: bool, quiet: bool) {
    let level = if verbose {
        LogLevel::Debug
    } else if quiet {
        LogLevel::Error
    } else {
        config_level
    };
    let filter = match level {
        LogLevel::Debug => LevelFilter::Debug,
        LogLevel::Info => LevelFilter::Info,
        LogLevel::Warning => LevelFilter::Warn,
        LogLevel::Error => LevelFilter::Error,
    };

    env_logger::Builder::new()
        .filter_level(filter)
        .parse_default_env()
        .format_timestamp_secs()
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.verbose && cli.quiet {
        anyhow::bail!("Cannot specify both --verbose and --quiet");
    }

    match cli.command {
        Commands::Analyze { video, tempo } => {
            let mut config = load_or_default(video.config.clone())?;
            apply_overrides(&mut config, &video)?;
            if tempo {
                config.audio.detect_tempo = true;
            }
            if cli.verbose {
                config.log_level = LogLevel::Debug;
            }
            init_logging(config.log_level, cli.verbose, cli.quiet);

            validate_input(&video.input, &config)?;
            let processor = PianoVision::with_console(config);

            if !cli.quiet {
                println!("Processing {}...", video.input.display());
            }

            let transcription = processor.process(&video.input, &video.output)?;

            if !cli.quiet {
                let presses = &transcription.classification.presses;
                println!(
                    "{} frames x {} keys, {} pressed cells",
                    presses.n_frames(),
                    presses.n_keys(),
                    presses.n_frames() * presses.n_keys()
                        - presses.count(pianovision::PressState::Unpressed)
                );
                if let Some(bpm) = transcription.bpm {
                    println!("Tempo: {:.1} BPM", bpm);
                }
                println!("Results saved to {}", video.output.display());
            }
        }
        Commands::Locate { video } => {
            let mut config = load_or_default(video.config.clone())?;
            apply_overrides(&mut config, &video)?;
            if cli.verbose {
                config.log_level = LogLevel::Debug;
            }
            init_logging(config.log_level, cli.verbose, cli.quiet);

            validate_input(&video.input, &config)?;
            let starting_key = config.vision.starting_key;
            let processor = PianoVision::with_console(config);

            let (reference, _, segmentation) = processor.locate(&video.input)?;
            pianovision::qa::generate_artifacts(
                Some(&reference),
                &segmentation.locations,
                segmentation.scan_row,
                None,
                &video.output,
                processor.sink(),
            )?;

            if !cli.quiet {
                for (i, location) in segmentation.locations.iter().enumerate() {
                    let name = PianoKey::from_ordinal(starting_key.ordinal() + i)
                        .map(|key| key.name().to_string())
                        .unwrap_or_else(|| format!("K{}", starting_key.ordinal() + i));
                    println!("{}\t{}\t{}", name, location.x, location.y);
                }
            }
        }
        Commands::Tempo {
            input,
            output,
            config,
        } => {
            let config = load_or_default(config)?;
            init_logging(config.log_level, cli.verbose, cli.quiet);

            validate_input(&input, &config)?;
            let processor = PianoVision::with_console(config);

            match processor.detect_tempo(&input, &output)? {
                Some(bpm) => println!("{:.1}", bpm),
                None => anyhow::bail!("No tempo found in {}", input.display()),
            }
        }
        Commands::ValidateConfig { config } => {
            let config = pianovision::config::load_config(config)?;
            println!("Configuration is valid");
            if let Ok(json) = serde_json::to_string_pretty(&config) {
                println!("{}", json);
            }
        }
        Commands::ShowConfig { output } => {
            let config = Config::default();
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
            if let Some(path) = output {
                pianovision::config::save_config(&config, &path)?;
                log::info!("Wrote default configuration to {}", path.display());
            }
        }
    }

    Ok(())
}
