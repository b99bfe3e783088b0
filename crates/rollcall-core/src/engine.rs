//! The face capability: detection plus embedding.
//!
//! Registry building and the recognition loop only depend on [`FaceEngine`];
//! [`OnnxFaceEngine`] is the SCRFD + ArcFace implementation.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, DetectedFace, Embedding, FaceEncoding};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Face detection and embedding over RGB images.
pub trait FaceEngine {
    /// Face boxes in image coordinates, best detection first.
    fn detect_faces(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, EngineError>;

    /// Embedding of the face inside `face`.
    fn embed(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Embedding, EngineError>;

    /// Encode one face. Without a box, the first detected face is used and
    /// an image with no detectable face yields [`FaceEncoding::NoFaceFound`].
    fn encode_face(&mut self, image: &RgbImage, face: Option<&BoundingBox>) -> Result<FaceEncoding, EngineError> {
        let detected;
        let face = match face {
            Some(face) => face,
            None => {
                detected = self.detect_faces(image)?;
                match detected.first() {
                    Some(face) => face,
                    None => return Ok(FaceEncoding::NoFaceFound),
                }
            }
        };
        Ok(FaceEncoding::Face(self.embed(image, face)?))
    }

    /// Every face in the image, located and embedded.
    fn detect_and_encode(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, EngineError> {
        let boxes = self.detect_faces(image)?;
        boxes
            .iter()
            .map(|face| {
                Ok(DetectedFace {
                    location: face.location(),
                    embedding: self.embed(image, face)?,
                })
            })
            .collect()
    }
}

impl<E: FaceEngine + ?Sized> FaceEngine for &mut E {
    fn detect_faces(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, EngineError> {
        (**self).detect_faces(image)
    }

    fn embed(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Embedding, EngineError> {
        (**self).embed(image, face)
    }
}

/// SCRFD detector + ArcFace recognizer.
pub struct OnnxFaceEngine {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceEngine {
    pub fn new(detector: FaceDetector, recognizer: FaceRecognizer) -> Self {
        Self { detector, recognizer }
    }

    /// Load both ONNX models. Fails fast if either is missing.
    pub fn load(scrfd_path: &str, arcface_path: &str) -> Result<Self, EngineError> {
        let detector = FaceDetector::load(scrfd_path)?;
        tracing::info!(path = scrfd_path, "SCRFD detector loaded");

        let recognizer = FaceRecognizer::load(arcface_path)?;
        tracing::info!(path = arcface_path, "ArcFace recognizer loaded");

        Ok(Self::new(detector, recognizer))
    }
}

impl FaceEngine for OnnxFaceEngine {
    fn detect_faces(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, EngineError> {
        Ok(self.detector.detect(image)?)
    }

    fn embed(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Embedding, EngineError> {
        Ok(self.recognizer.extract(image, face)?)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;

    /// Scripted engine: returns the same faces for every image.
    pub struct ScriptedEngine {
        pub faces: Vec<(BoundingBox, Embedding)>,
        pub detect_calls: usize,
        pub fail: bool,
    }

    impl ScriptedEngine {
        pub fn new(faces: Vec<(BoundingBox, Embedding)>) -> Self {
            Self { faces, detect_calls: 0, fail: false }
        }
    }

    pub fn bbox(left: f32, top: f32, right: f32, bottom: f32) -> BoundingBox {
        BoundingBox {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
            confidence: 0.9,
            landmarks: None,
        }
    }

    impl FaceEngine for ScriptedEngine {
        fn detect_faces(&mut self, _image: &RgbImage) -> Result<Vec<BoundingBox>, EngineError> {
            self.detect_calls += 1;
            if self.fail {
                return Err(EngineError::Detector(DetectorError::InferenceFailed("scripted".into())));
            }
            Ok(self.faces.iter().map(|(b, _)| b.clone()).collect())
        }

        fn embed(&mut self, _image: &RgbImage, face: &BoundingBox) -> Result<Embedding, EngineError> {
            self.faces
                .iter()
                .find(|(b, _)| b.x == face.x && b.y == face.y)
                .map(|(_, e)| e.clone())
                .ok_or(EngineError::Recognizer(RecognizerError::NoLandmarks))
        }
    }

    /// Engine that reads identity from pixel colour: an all-black image has
    /// no face, anything else has one face whose embedding is the top-left
    /// pixel's RGB value.
    pub struct ColourEngine;

    impl FaceEngine for ColourEngine {
        fn detect_faces(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, EngineError> {
            if image.pixels().all(|p| p.0 == [0, 0, 0]) {
                return Ok(Vec::new());
            }
            Ok(vec![bbox(0.0, 0.0, image.width() as f32, image.height() as f32)])
        }

        fn embed(&mut self, image: &RgbImage, _face: &BoundingBox) -> Result<Embedding, EngineError> {
            let p = image.get_pixel(0, 0).0;
            Ok(Embedding::new(p.iter().map(|&v| v as f32 / 255.0).collect()))
        }
    }
}
