use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rollcall_core::{AttendanceLog, DedupPolicy, EuclideanMatcher, OnnxFaceEngine, Overlay, RecognitionLoop, Registry};
use rollcall_hw::{resolve_device, Camera};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;
mod display;

use config::Config;
use display::{PreviewWindow, WINDOW_TITLE};

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-recognition attendance logging", version)]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Flags that take precedence over the config file and environment.
#[derive(Args, Debug, Default)]
struct Overrides {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory of reference images, one person per file
    #[arg(long, global = true)]
    images_dir: Option<PathBuf>,
    /// Attendance CSV file
    #[arg(long, global = true)]
    attendance_file: Option<PathBuf>,
    /// Camera device path or index (e.g., "0" or "/dev/video2")
    #[arg(long, global = true)]
    camera: Option<String>,
    /// Directory containing det_10g.onnx and w600k_r50.onnx
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,
    /// Maximum embedding distance for a match
    #[arg(long, global = true)]
    tolerance: Option<f32>,
    /// Detection downsample factor
    #[arg(long, global = true)]
    downsample: Option<u32>,
    /// Attendance deduplication: "once" or "daily"
    #[arg(long, global = true)]
    dedup: Option<DedupPolicy>,
    /// TrueType font for overlay labels
    #[arg(long, global = true)]
    font: Option<PathBuf>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(v) = self.images_dir {
            config.images_dir = v;
        }
        if let Some(v) = self.attendance_file {
            config.attendance_file = v;
        }
        if let Some(v) = self.camera {
            config.camera_device = v;
        }
        if let Some(v) = self.model_dir {
            config.model_dir = v;
        }
        if let Some(v) = self.tolerance {
            config.tolerance = v;
        }
        if let Some(v) = self.downsample {
            config.downsample = v;
        }
        if let Some(v) = self.dedup {
            config.dedup = v;
        }
        if let Some(v) = self.font {
            config.font_path = Some(v);
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Recognize faces from the camera and log attendance (default)
    Run,
    /// Build the registry from the images directory and list its names
    Registry {
        /// Print JSON instead of plain text
        #[arg(long)]
        json: bool,
    },
    /// Print the recorded attendance rows
    Attendance {
        /// Print JSON instead of plain text
        #[arg(long)]
        json: bool,
    },
    /// List V4L2 capture devices
    Devices,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.overrides.config.as_deref())?;
    cli.overrides.apply(&mut config);
    config.validate()?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&config),
        Commands::Registry { json } => list_registry(&config, json),
        Commands::Attendance { json } => list_attendance(&config, json),
        Commands::Devices => {
            list_devices();
            Ok(())
        }
    }
}

fn load_engine(config: &Config) -> Result<OnnxFaceEngine> {
    OnnxFaceEngine::load(&config.scrfd_model_path(), &config.arcface_model_path())
        .with_context(|| format!("loading face models from {}", config.model_dir.display()))
}

fn build_registry(config: &Config, engine: &mut OnnxFaceEngine) -> Result<Registry> {
    Registry::build(&config.images_dir, engine)
        .with_context(|| format!("building registry from {}", config.images_dir.display()))
}

fn run(config: &Config) -> Result<()> {
    let mut engine = load_engine(config)?;
    let registry = build_registry(config, &mut engine)?;

    let log = AttendanceLog::open(&config.attendance_file, config.dedup)
        .with_context(|| format!("opening attendance file {}", config.attendance_file.display()))?;
    let overlay = Overlay::load(config.font_path.as_deref());

    let device = resolve_device(&config.camera_device);
    let mut camera = Camera::open(&device).with_context(|| format!("opening camera {device}"))?;
    camera.discard_frames(config.warmup_frames)?;

    let mut window = PreviewWindow::new(WINDOW_TITLE);
    let mut recognition = RecognitionLoop::new(&registry, engine, EuclideanMatcher::new(config.tolerance), log, overlay)
        .with_downsample(config.downsample);

    let exit = recognition.run(&mut camera, &mut window)?;
    tracing::info!(?exit, frames = recognition.frames_processed(), "recognition loop finished");
    Ok(())
}

fn list_registry(config: &Config, json: bool) -> Result<()> {
    let mut engine = load_engine(config)?;
    let registry = build_registry(config, &mut engine)?;
    let names: Vec<&str> = registry.names().collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else if names.is_empty() {
        println!("No faces registered in {}", config.images_dir.display());
    } else {
        for name in names {
            println!("{name}");
        }
    }
    Ok(())
}

fn list_attendance(config: &Config, json: bool) -> Result<()> {
    let records = rollcall_core::attendance::read_records(&config.attendance_file)
        .with_context(|| format!("reading {}", config.attendance_file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else if records.is_empty() {
        println!("No attendance recorded in {}", config.attendance_file.display());
    } else {
        println!("{:<24} {:<12} {}", "NAME", "DATE", "TIME");
        for record in &records {
            println!("{:<24} {:<12} {}", record.name, record.date, record.time);
        }
    }
    Ok(())
}

fn list_devices() {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
        return;
    }
    for device in devices {
        println!("{}  {} ({}, {})", device.path, device.name, device.driver, device.bus);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_defaults_to_run() {
        let cli = Cli::try_parse_from(["rollcall"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "rollcall",
            "run",
            "--camera",
            "2",
            "--dedup",
            "daily",
            "--downsample",
            "2",
        ])
        .unwrap();
        let mut config = Config::default();
        cli.overrides.apply(&mut config);
        assert_eq!(config.camera_device, "2");
        assert_eq!(config.dedup, DedupPolicy::Daily);
        assert_eq!(config.downsample, 2);
        assert_eq!(config.images_dir, PathBuf::from("Images_Attendance"));
    }

    #[test]
    fn test_invalid_dedup_flag_rejected() {
        assert!(Cli::try_parse_from(["rollcall", "--dedup", "weekly"]).is_err());
    }

    #[test]
    fn test_attendance_json_flag() {
        let cli = Cli::try_parse_from(["rollcall", "attendance", "--json"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Attendance { json: true })));
    }

    #[test]
    fn test_list_attendance_missing_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config { attendance_file: dir.path().join("Attendance.csv"), ..Config::default() };
        list_attendance(&config, false).unwrap();
    }
}
