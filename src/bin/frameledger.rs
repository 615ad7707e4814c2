use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{ArgGroup, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use frameledger::{
    DEFAULT_HASH_LENGTH, ExtractOptions, FfmpegLogLevel, FfmpegTools, FrameKind, FrameLedger,
    FrameReader, FrameRecord, ProgressCallback, ProgressInfo, ProjectLayout, RangeExtractor,
    SourceRecord, TimeRange, VideoContext, VideoProbe, save_frame, short_hash_for_path,
    video_folder_name,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  frameledger --project shoot init\n  frameledger probe clip.mp4 --json\n  frameledger --project shoot keyframe clip.mp4 --at 0:12.5\n  frameledger --project shoot extract clip.mp4 --start 2 --end 4 --fps 5 --progress\n  frameledger --project shoot ledger --json\n  frameledger --project shoot sources\n  frameledger completions zsh > _frameledger";

#[derive(Debug, Parser)]
#[command(
    name = "frameledger",
    version,
    about = "Extract video frames into a project and keep a ledger of every frame written",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone)]
struct GlobalOptions {
    /// Project root directory.
    #[arg(long, global = true, default_value = ".", env = "FRAMELEDGER_PROJECT")]
    project: PathBuf,

    /// Directory holding the ffmpeg and ffprobe executables.
    #[arg(long, global = true, env = "FRAMELEDGER_FFMPEG_DIR")]
    ffmpeg_dir: Option<PathBuf>,

    /// Show debug logging output.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar where supported.
    #[arg(long, global = true)]
    progress: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create the project's frames/ and metadata/ directories and the ledger.
    Init,

    /// Print the storage folder name derived from a video's identity.
    Identity {
        /// Video file path.
        video: PathBuf,
        /// Hex digits of the identity hash.
        #[arg(long, default_value_t = DEFAULT_HASH_LENGTH)]
        hash_length: usize,
    },

    /// Print stream metadata for a video.
    #[command(visible_alias = "info")]
    Probe {
        /// Video file path.
        video: PathBuf,
        /// Output metadata as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Save one frame as a keyframe and record it in the ledger.
    #[command(group(ArgGroup::new("position").required(true).args(["frame", "at"])))]
    Keyframe {
        /// Video file path.
        video: PathBuf,
        /// Frame index to capture.
        #[arg(long)]
        frame: Option<u64>,
        /// Timestamp to capture (seconds, MM:SS or HH:MM:SS).
        #[arg(long)]
        at: Option<String>,
        /// Output image extension (jpg, png, bmp, tiff, webp).
        #[arg(long, default_value = "jpg")]
        ext: String,
    },

    /// Sample a time range into frame files and record them in the ledger.
    Extract {
        /// Video file path.
        video: PathBuf,
        /// Range start (seconds, MM:SS or HH:MM:SS).
        #[arg(long)]
        start: String,
        /// Range end (seconds, MM:SS or HH:MM:SS).
        #[arg(long)]
        end: String,
        /// Sampling rate in frames per second.
        #[arg(long)]
        fps: f64,
        /// Source frame rate; probed when omitted.
        #[arg(long)]
        source_fps: Option<f64>,
        /// Output image extension.
        #[arg(long, default_value = "jpg")]
        ext: String,
        /// Kill the decoder after this many seconds.
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Print every ledger row.
    Ledger {
        /// Output rows as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// List the source videos frames were taken from.
    Sources {
        /// Output rows as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

fn parse_timecode(value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("time value cannot be empty".into());
    }

    if let Ok(seconds) = trimmed.parse::<f64>() {
        return Ok(Duration::try_from_secs_f64(seconds.max(0.0))?);
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(format!("invalid time format: {trimmed}").into());
    }

    let (hours, minutes, seconds_str) = if parts.len() == 3 {
        (parts[0].parse::<u64>()?, parts[1].parse::<u64>()?, parts[2])
    } else {
        (0_u64, parts[0].parse::<u64>()?, parts[1])
    };

    let seconds = seconds_str.parse::<f64>()?;
    let total_seconds = (hours as f64 * 3600.0) + (minutes as f64 * 60.0) + seconds;
    Ok(Duration::try_from_secs_f64(total_seconds.max(0.0))?)
}

fn parse_timecode_ms(value: &str) -> Result<u64, Box<dyn std::error::Error>> {
    Ok(u64::try_from(parse_timecode(value)?.as_millis())?)
}

fn init_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(global.verbose);
    if let Some(level) = &global.log_level {
        let parsed =
            FfmpegLogLevel::from_name(level).ok_or(format!("unsupported --log-level: {level}"))?;
        frameledger::set_ffmpeg_log_level(parsed);
    }
    Ok(())
}

fn locate_tools(global: &GlobalOptions) -> Result<FfmpegTools, Box<dyn std::error::Error>> {
    Ok(FfmpegTools::locate(global.ffmpeg_dir.as_deref())?)
}

fn open_project(root: &Path) -> Result<ProjectLayout, Box<dyn std::error::Error>> {
    if !root.join("metadata").is_dir() {
        eprintln!(
            "{} {}",
            "warning:".yellow().bold(),
            format!("initialising project at {}", root.display()).yellow()
        );
    }
    Ok(ProjectLayout::init(root)?)
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(0);
        bar.set_style(ProgressStyle::with_template(
            "{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}",
        )?);
        Ok(Self { bar })
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Some(total) = info.total {
            self.bar.set_length(total.max(info.current));
        }
        self.bar.set_position(info.current);
        if let Some(timestamp) = info.current_timestamp {
            self.bar.set_message(format!("{:.2}s", timestamp.as_secs_f64()));
        }
    }
}

/// Ledger rows of the project at `root`, without creating anything.
fn read_ledger(root: &Path) -> Result<Vec<FrameRecord>, Box<dyn std::error::Error>> {
    Ok(FrameLedger::at(ProjectLayout::new(root).ledger_path()).read_all()?)
}

fn print_records(records: &[FrameRecord]) {
    for record in records {
        println!(
            "{:>10} ms  #{:<8} {:<8} {}",
            record.timestamp_ms,
            record.frame_index,
            record.kind.as_str(),
            record.image_relpath
        );
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;
    let global = &cli.global;

    match cli.command {
        Commands::Init => {
            let layout = ProjectLayout::init(&global.project)?;
            println!(
                "{} {}",
                "initialised".green().bold(),
                layout.ledger_path().display()
            );
        }
        Commands::Identity { video, hash_length } => {
            let folder = video_folder_name(&video, hash_length)?;
            println!("{folder}");
            if global.verbose {
                println!("hash: {}", short_hash_for_path(&video, hash_length)?);
            }
        }
        Commands::Probe { video, json } => {
            let metadata = VideoProbe::from_tools(&locate_tools(global)?).probe(&video)?;
            if json {
                let payload = json!({
                    "path": metadata.path.display().to_string(),
                    "duration_seconds": metadata.duration_seconds,
                    "frames_per_second": metadata.frames_per_second,
                    "width": metadata.width,
                    "height": metadata.height,
                    "total_frames": metadata.total_frames,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Path: {}", metadata.path.display());
                println!("Duration: {:.3}s", metadata.duration_seconds);
                println!("Resolution: {}x{}", metadata.width, metadata.height);
                println!("Frame rate: {:.3} fps", metadata.frames_per_second);
                println!("Frames: {}", metadata.total_frames);
            }
        }
        Commands::Keyframe {
            video,
            frame,
            at,
            ext,
        } => {
            let layout = open_project(&global.project)?;
            let context = VideoContext::for_video(&layout, &video)?;
            let mut reader = FrameReader::from_path(&video)?;

            let captured = match (frame, at) {
                (Some(index), _) => reader.seek_to_frame(index)?,
                (None, Some(at)) => reader.seek_to_timestamp(parse_timecode_ms(&at)?)?,
                (None, None) => return Err("either --frame or --at is required".into()),
            };
            let captured = captured.ok_or("requested position is past the end of the video")?;

            match save_frame(&layout, &context, &captured, &ext)? {
                Some(record) => {
                    layout.ledger()?.append(std::slice::from_ref(&record))?;
                    layout.sources().register(&SourceRecord::from(&context))?;
                    println!("{} {}", "saved".green().bold(), record.image_relpath);
                }
                None => eprintln!(
                    "{} {}",
                    "warning:".yellow().bold(),
                    format!(
                        "frame {} at {} ms already saved",
                        captured.frame_index, captured.timestamp_ms
                    )
                    .yellow()
                ),
            }
        }
        Commands::Extract {
            video,
            start,
            end,
            fps,
            source_fps,
            ext,
            timeout,
        } => {
            let range = TimeRange::new(parse_timecode_ms(&start)?, parse_timecode_ms(&end)?);
            if range.is_empty() {
                return Err("range is empty: --start and --end must differ".into());
            }

            let tools = locate_tools(global)?;
            let layout = open_project(&global.project)?;
            let context = VideoContext::for_video(&layout, &video)?;
            let source_fps = match source_fps {
                Some(value) => value,
                None => VideoProbe::from_tools(&tools).probe(&video)?.frames_per_second,
            };

            let mut options = ExtractOptions::new();
            let progress = if global.progress {
                let progress = Arc::new(TerminalProgress::new()?);
                options = options.with_progress(progress.clone());
                Some(progress)
            } else {
                None
            };
            if let Some(seconds) = timeout {
                options = options.with_timeout(Duration::from_secs(seconds));
            }

            let extraction = RangeExtractor::from_tools(&tools)
                .with_options(options)
                .extract_range(
                    &layout,
                    &context,
                    &video,
                    range.in_ms,
                    range.out_ms,
                    fps,
                    source_fps,
                    &ext,
                )?;
            if let Some(progress) = progress {
                progress.bar.finish_and_clear();
            }

            let appended = layout.ledger()?.append(&extraction.records)?;
            if appended > 0 {
                layout.sources().register(&SourceRecord::from(&context))?;
            }
            println!(
                "{} {}",
                "success:".green().bold(),
                format!(
                    "Extracted {appended} frame(s) into {}",
                    layout.kind_dir(&context.video_folder, FrameKind::Range).display()
                )
                .green()
            );
            if extraction.skipped > 0 {
                eprintln!(
                    "{} {}",
                    "warning:".yellow().bold(),
                    format!("{} frame(s) already present, skipped", extraction.skipped).yellow()
                );
            }
        }
        Commands::Ledger { json } => {
            let records = read_ledger(&global.project)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                print_records(&records);
            }
        }
        Commands::Sources { json } => {
            let sources = ProjectLayout::new(&global.project).sources().read_all()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&sources)?);
            } else {
                for source in &sources {
                    println!("{}  {}", source.video_id, source.src_video_path);
                }
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "frameledger", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, parse_timecode, parse_timecode_ms, read_ledger};
    use clap::{CommandFactory, Parser};

    #[test]
    fn parse_timecode_formats() {
        let seconds = parse_timecode("75").unwrap();
        assert_eq!(seconds.as_secs(), 75);

        let mm_ss = parse_timecode("01:15").unwrap();
        assert_eq!(mm_ss.as_secs(), 75);

        let hh_mm_ss = parse_timecode("00:01:15.5").unwrap();
        assert_eq!(hh_mm_ss.as_millis(), 75_500);

        assert!(parse_timecode("").is_err());
        assert!(parse_timecode("1:2:3:4").is_err());
    }

    #[test]
    fn timecodes_convert_to_milliseconds() {
        assert_eq!(parse_timecode_ms("2.5").unwrap(), 2_500);
        assert_eq!(parse_timecode_ms("0:04").unwrap(), 4_000);
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn keyframe_requires_a_position() {
        assert!(Cli::try_parse_from(["frameledger", "keyframe", "clip.mp4"]).is_err());
        assert!(Cli::try_parse_from(["frameledger", "keyframe", "clip.mp4", "--frame", "3"]).is_ok());
        assert!(
            Cli::try_parse_from(["frameledger", "keyframe", "clip.mp4", "--frame", "3", "--at", "1"])
                .is_err()
        );
    }

    #[test]
    fn reading_a_missing_ledger_creates_nothing() {
        let directory = tempfile::tempdir().unwrap();
        let root = directory.path().join("not_a_project");

        assert!(read_ledger(&root).unwrap().is_empty());
        assert!(!root.exists());
    }
}
