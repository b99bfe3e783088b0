//! rollcall-core: Face registry, attendance log and recognition loop.
//!
//! Face detection (SCRFD) and embedding (ArcFace) run via ONNX Runtime
//! behind the [`FaceEngine`] trait; everything else in this crate only
//! talks to that trait.

pub mod alignment;
pub mod attendance;
pub mod detector;
pub mod engine;
pub mod matcher;
pub mod overlay;
pub mod recognition;
pub mod recognizer;
pub mod registry;
pub mod types;

pub use attendance::{AttendanceLog, AttendanceRecord, DedupPolicy};
pub use engine::{FaceEngine, OnnxFaceEngine};
pub use matcher::{Comparison, EuclideanMatcher, Matcher};
pub use overlay::Overlay;
pub use recognition::{FrameSink, FrameSource, LoopExit, RecognitionLoop};
pub use registry::Registry;
pub use types::{BoundingBox, DetectedFace, Embedding, FaceEncoding, FaceLocation, Identity, KnownFace};

use std::path::PathBuf;

/// Default location of the ONNX model files: `$XDG_DATA_HOME/rollcall/models`,
/// falling back to `~/.local/share/rollcall/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
        .join("models")
}
