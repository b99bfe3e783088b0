use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Integer pixel location of this box, clamped to non-negative coordinates.
    pub fn location(&self) -> FaceLocation {
        let px = |v: f32| v.round().max(0.0) as u32;
        FaceLocation {
            top: px(self.y),
            right: px(self.x + self.width),
            bottom: px(self.y + self.height),
            left: px(self.x),
        }
    }

    /// Intersection-over-union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.width * self.height + other.width * other.height - inter;

        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

/// Face rectangle in pixel coordinates, in `(top, right, bottom, left)` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceLocation {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl FaceLocation {
    pub fn new(top: u32, right: u32, bottom: u32, left: u32) -> Self {
        Self { top, right, bottom, left }
    }

    /// Map a location found in a frame downsampled by `factor` back to
    /// the full-resolution frame.
    pub fn scaled(&self, factor: u32) -> Self {
        Self {
            top: self.top.saturating_mul(factor),
            right: self.right.saturating_mul(factor),
            bottom: self.bottom.saturating_mul(factor),
            left: self.left.saturating_mul(factor),
        }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

/// Face embedding vector (512-dimensional, L2-normalized for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values, model_version: None }
    }

    /// Euclidean distance between two embeddings. Lower = more similar.
    ///
    /// Embeddings of different lengths cannot describe the same face, so the
    /// distance is infinite.
    pub fn distance(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }

    pub fn dimensions(&self) -> usize {
        self.values.len()
    }
}

/// A reference identity: display name paired with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownFace {
    pub name: String,
    pub embedding: Embedding,
}

/// A face found in one frame. `location` is in the coordinates of the
/// (downsampled) image it was detected in.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub location: FaceLocation,
    pub embedding: Embedding,
}

/// Outcome of asking the encoder for a face embedding.
#[derive(Debug, Clone)]
pub enum FaceEncoding {
    Face(Embedding),
    NoFaceFound,
}

/// Who a detected face was classified as.
#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    /// Nearest registry entry within tolerance; `name` is display-normalized (uppercase).
    Known { name: String, distance: f32 },
    Unknown,
}

impl Identity {
    pub const UNKNOWN_LABEL: &'static str = "UNKNOWN";

    pub fn label(&self) -> &str {
        match self {
            Identity::Known { name, .. } => name,
            Identity::Unknown => Self::UNKNOWN_LABEL,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Identity::Known { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: 1.0, landmarks: None }
    }

    #[test]
    fn test_distance_identical() {
        let a = Embedding::new(vec![0.6, 0.8, 0.0]);
        assert!(a.distance(&a).abs() < 1e-6);
    }

    #[test]
    fn test_distance_orthogonal_unit_vectors() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![0.0, 1.0]);
        assert!((a.distance(&b) - 2.0f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_distance_length_mismatch_is_infinite() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert!(a.distance(&b).is_infinite());
    }

    #[test]
    fn test_location_scaled_by_downsample_factor() {
        let loc = FaceLocation::new(10, 50, 40, 5);
        assert_eq!(loc.scaled(4), FaceLocation::new(40, 200, 160, 20));
    }

    #[test]
    fn test_bbox_location_clamps_negative() {
        let loc = make_bbox(-3.2, 4.6, 20.0, 10.0).location();
        assert_eq!(loc.left, 0);
        assert_eq!(loc.top, 5);
        assert_eq!(loc.right, 17);
        assert_eq!(loc.bottom, 15);
    }

    #[test]
    fn test_iou_identical() {
        let a = make_bbox(0.0, 0.0, 100.0, 100.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = make_bbox(0.0, 0.0, 10.0, 10.0);
        let b = make_bbox(20.0, 20.0, 10.0, 10.0);
        assert!(a.iou(&b).abs() < 1e-6);
    }

    #[test]
    fn test_iou_partial() {
        let a = make_bbox(0.0, 0.0, 10.0, 10.0);
        let b = make_bbox(5.0, 0.0, 10.0, 10.0);
        // Overlap 50, union 150
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_identity_label() {
        let known = Identity::Known { name: "ALICE".into(), distance: 0.3 };
        assert_eq!(known.label(), "ALICE");
        assert!(known.is_known());
        assert_eq!(Identity::Unknown.label(), "UNKNOWN");
    }
}
