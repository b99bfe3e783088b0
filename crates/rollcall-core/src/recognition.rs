//! The recognition loop: capture, detect, match, annotate, log, display.
//!
//! Single-threaded and synchronous. The loop ends when the sink reports a
//! quit request, when the source runs dry, or on the first capture, display
//! or attendance error.

use crate::attendance::{AttendanceError, AttendanceLog};
use crate::engine::FaceEngine;
use crate::matcher::{EuclideanMatcher, Matcher};
use crate::overlay::Overlay;
use crate::registry::Registry;
use crate::types::{DetectedFace, FaceLocation, Identity};
use image::imageops::{self, FilterType};
use image::RgbImage;
use thiserror::Error;

/// Linear downsample factor applied before detection.
pub const DEFAULT_DOWNSAMPLE: u32 = 4;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum LoopError {
    #[error("frame capture failed: {0}")]
    Capture(#[source] BoxError),
    #[error("display failed: {0}")]
    Display(#[source] BoxError),
    #[error("attendance log: {0}")]
    Attendance(#[from] AttendanceError),
}

/// Pull-based source of RGB frames. `Ok(None)` means the stream ended.
pub trait FrameSource {
    type Error: std::error::Error + Send + Sync + 'static;

    fn next_frame(&mut self) -> Result<Option<RgbImage>, Self::Error>;
}

/// Where annotated frames go, and where the quit key is read.
pub trait FrameSink {
    type Error: std::error::Error + Send + Sync + 'static;

    fn show(&mut self, frame: &RgbImage) -> Result<(), Self::Error>;

    /// Non-blocking poll for a user quit request.
    fn quit_requested(&mut self) -> bool;
}

/// How the loop ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Quit,
    EndOfStream,
}

/// One labelled face in a processed frame.
#[derive(Debug, Clone)]
pub struct Annotation {
    /// Full-resolution frame coordinates.
    pub location: FaceLocation,
    pub identity: Identity,
    /// Whether this sighting wrote a new attendance row.
    pub logged: bool,
}

pub struct RecognitionLoop<'r, E, M = EuclideanMatcher> {
    registry: &'r Registry,
    engine: E,
    matcher: M,
    log: AttendanceLog,
    overlay: Overlay,
    downsample: u32,
    frames: u64,
}

impl<'r, E: FaceEngine, M: Matcher> RecognitionLoop<'r, E, M> {
    pub fn new(registry: &'r Registry, engine: E, matcher: M, log: AttendanceLog, overlay: Overlay) -> Self {
        Self {
            registry,
            engine,
            matcher,
            log,
            overlay,
            downsample: DEFAULT_DOWNSAMPLE,
            frames: 0,
        }
    }

    /// Set the detection downsample factor. Values below 1 are treated as 1.
    pub fn with_downsample(mut self, factor: u32) -> Self {
        self.downsample = factor.max(1);
        self
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    /// Run until quit, end of stream, or error.
    pub fn run<S, D>(&mut self, source: &mut S, sink: &mut D) -> Result<LoopExit, LoopError>
    where
        S: FrameSource,
        D: FrameSink,
    {
        if self.registry.is_empty() {
            tracing::warn!("registry is empty; every face will be labelled UNKNOWN");
        }
        tracing::info!(known = self.registry.len(), downsample = self.downsample, "recognition loop started");

        loop {
            let Some(mut frame) = source.next_frame().map_err(|e| LoopError::Capture(Box::new(e)))? else {
                tracing::info!(frames = self.frames, "frame source ended");
                return Ok(LoopExit::EndOfStream);
            };

            let annotations = self.process_frame(&mut frame)?;
            tracing::trace!(frame = self.frames, faces = annotations.len(), "frame processed");

            sink.show(&frame).map_err(|e| LoopError::Display(Box::new(e)))?;

            if sink.quit_requested() {
                tracing::info!(frames = self.frames, "quit requested");
                return Ok(LoopExit::Quit);
            }
        }
    }

    /// Detect, identify and annotate every face in `frame`, logging
    /// attendance for recognized faces.
    ///
    /// A detection or encoding failure is not fatal: the frame is treated
    /// as having no faces.
    pub fn process_frame(&mut self, frame: &mut RgbImage) -> Result<Vec<Annotation>, LoopError> {
        let small = downsample(frame, self.downsample);
        let faces = match self.engine.detect_and_encode(&small) {
            Ok(faces) => faces,
            Err(error) => {
                tracing::warn!(frame = self.frames, %error, "face detection failed; skipping frame");
                Vec::new()
            }
        };

        let mut annotations = Vec::with_capacity(faces.len());
        for face in &faces {
            let identity = self.identify(face);
            let location = face.location.scaled(self.downsample);
            self.overlay.draw(frame, &location, &identity);

            let logged = match &identity {
                Identity::Known { name, .. } => {
                    let now = chrono::Local::now().naive_local();
                    match self.log.mark(name, now) {
                        Ok(record) => record.is_some(),
                        Err(AttendanceError::InvalidName(_)) => {
                            tracing::warn!(name = %name, "name cannot be stored in the attendance file; not logged");
                            false
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Identity::Unknown => false,
            };
            annotations.push(Annotation { location, identity, logged });
        }

        self.frames += 1;
        Ok(annotations)
    }

    /// Nearest registry entry within tolerance, uppercased; otherwise unknown.
    pub fn identify(&self, face: &DetectedFace) -> Identity {
        if self.registry.is_empty() {
            return Identity::Unknown;
        }
        let comparison = self.matcher.compare(self.registry.faces(), &face.embedding);
        match comparison.best_match().and_then(|(idx, d)| Some((self.registry.get(idx)?, d))) {
            Some((known, distance)) => Identity::Known { name: known.name.to_uppercase(), distance },
            None => Identity::Unknown,
        }
    }
}

/// Shrink a frame by an integer factor with bilinear filtering.
fn downsample(frame: &RgbImage, factor: u32) -> RgbImage {
    if factor <= 1 {
        return frame.clone();
    }
    let width = (frame.width() / factor).max(1);
    let height = (frame.height() / factor).max(1);
    imageops::resize(frame, width, height, FilterType::Triangle)
}
