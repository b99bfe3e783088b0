use anyhow::{bail, Context, Result};
use rollcall_core::matcher::DEFAULT_TOLERANCE;
use rollcall_core::recognition::DEFAULT_DOWNSAMPLE;
use rollcall_core::DedupPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Runtime configuration.
///
/// Layers, lowest precedence first: built-in defaults, an optional TOML
/// file, `ROLLCALL_*` environment variables, then command-line flags
/// (applied by the caller).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory of reference images, one person per file.
    pub images_dir: PathBuf,
    /// Attendance CSV file.
    pub attendance_file: PathBuf,
    /// V4L2 device path or bare index (default: 0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Maximum embedding distance for a positive match.
    pub tolerance: f32,
    /// Detection downsample factor (>= 1).
    pub downsample: u32,
    /// When a name counts as already logged.
    pub dedup: DedupPolicy,
    /// TrueType font for overlay labels.
    pub font_path: Option<PathBuf>,
    /// Number of warmup frames to discard at startup (camera AGC/AE stabilization).
    pub warmup_frames: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            images_dir: PathBuf::from("Images_Attendance"),
            attendance_file: PathBuf::from("Attendance.csv"),
            camera_device: "0".to_string(),
            model_dir: rollcall_core::default_model_dir(),
            tolerance: DEFAULT_TOLERANCE,
            downsample: DEFAULT_DOWNSAMPLE,
            dedup: DedupPolicy::Once,
            font_path: None,
            warmup_frames: 4,
        }
    }
}

impl Config {
    /// Defaults, then `file` if given, then the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from `ROLLCALL_*` variables looked up through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = var("ROLLCALL_IMAGES_DIR") {
            self.images_dir = PathBuf::from(v);
        }
        if let Some(v) = var("ROLLCALL_ATTENDANCE_FILE") {
            self.attendance_file = PathBuf::from(v);
        }
        if let Some(v) = var("ROLLCALL_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Some(v) = var("ROLLCALL_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = var("ROLLCALL_FONT_PATH") {
            self.font_path = Some(PathBuf::from(v));
        }
        if let Some(v) = var("ROLLCALL_TOLERANCE") {
            self.tolerance = parse_env("ROLLCALL_TOLERANCE", &v)?;
        }
        if let Some(v) = var("ROLLCALL_DOWNSAMPLE") {
            self.downsample = parse_env("ROLLCALL_DOWNSAMPLE", &v)?;
        }
        if let Some(v) = var("ROLLCALL_WARMUP_FRAMES") {
            self.warmup_frames = parse_env("ROLLCALL_WARMUP_FRAMES", &v)?;
        }
        if let Some(v) = var("ROLLCALL_DEDUP") {
            self.dedup = v.parse().map_err(anyhow::Error::msg).context("ROLLCALL_DEDUP")?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.downsample == 0 {
            bail!("downsample must be at least 1");
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            bail!("tolerance must be a positive number, got {}", self.tolerance);
        }
        Ok(())
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir.join("det_10g.onnx").to_string_lossy().into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_dir.join("w600k_r50.onnx").to_string_lossy().into_owned()
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.trim().parse().with_context(|| format!("invalid value {value:?} for {key}"))
}
