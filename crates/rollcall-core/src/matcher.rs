use crate::types::{Embedding, KnownFace};

/// Default Euclidean tolerance for L2-normalized ArcFace embeddings.
///
/// For unit vectors `d² = 2 - 2·cos`, so 1.10 corresponds to a cosine
/// similarity of roughly 0.40.
pub const DEFAULT_TOLERANCE: f32 = 1.10;

/// Per-entry comparison of one candidate against every known face.
#[derive(Debug, Clone, Default)]
pub struct Comparison {
    /// `matches[i]` is true when known face `i` is within tolerance.
    pub matches: Vec<bool>,
    /// Distance from the candidate to known face `i`.
    pub distances: Vec<f32>,
}

impl Comparison {
    /// Index of the nearest known face; the first index wins on ties.
    /// `None` for an empty registry.
    pub fn nearest(&self) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (i, &d) in self.distances.iter().enumerate() {
            if d.is_nan() {
                continue;
            }
            if best.map_or(true, |(_, b)| d < b) {
                best = Some((i, d));
            }
        }
        best.map(|(i, _)| i)
    }

    /// Nearest known face, if it is also a match: `(index, distance)`.
    pub fn best_match(&self) -> Option<(usize, f32)> {
        let idx = self.nearest()?;
        if self.matches.get(idx).copied().unwrap_or(false) {
            Some((idx, self.distances[idx]))
        } else {
            None
        }
    }
}

/// Strategy for comparing a candidate embedding against the known faces.
pub trait Matcher {
    fn compare(&self, known: &[KnownFace], candidate: &Embedding) -> Comparison;
}

/// Euclidean distance with a fixed tolerance: `match = distance <= tolerance`.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    pub tolerance: f32,
}

impl EuclideanMatcher {
    pub fn new(tolerance: f32) -> Self {
        Self { tolerance }
    }
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl Matcher for EuclideanMatcher {
    fn compare(&self, known: &[KnownFace], candidate: &Embedding) -> Comparison {
        let distances: Vec<f32> = known.iter().map(|k| k.embedding.distance(candidate)).collect();
        let matches = distances.iter().map(|&d| d <= self.tolerance).collect();
        Comparison { matches, distances }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(name: &str, values: Vec<f32>) -> KnownFace {
        KnownFace { name: name.into(), embedding: Embedding::new(values) }
    }

    #[test]
    fn test_compare_every_entry() {
        let gallery = vec![
            known("decoy1", vec![0.0, 1.0, 0.0]),
            known("decoy2", vec![0.0, 0.0, 1.0]),
            known("match", vec![1.0, 0.0, 0.0]),
        ];
        let cmp = EuclideanMatcher::new(0.6).compare(&gallery, &Embedding::new(vec![1.0, 0.0, 0.0]));
        assert_eq!(cmp.matches, vec![false, false, true]);
        assert_eq!(cmp.distances.len(), 3);
        assert_eq!(cmp.best_match().map(|(i, _)| i), Some(2));
    }

    #[test]
    fn test_nearest_outside_tolerance_is_not_a_match() {
        let gallery = vec![known("other", vec![0.0, 1.0])];
        let cmp = EuclideanMatcher::new(0.6).compare(&gallery, &Embedding::new(vec![1.0, 0.0]));
        assert_eq!(cmp.nearest(), Some(0));
        assert!(cmp.best_match().is_none());
    }

    #[test]
    fn test_empty_registry_has_no_nearest() {
        let cmp = EuclideanMatcher::default().compare(&[], &Embedding::new(vec![1.0, 0.0]));
        assert!(cmp.matches.is_empty());
        assert!(cmp.nearest().is_none());
        assert!(cmp.best_match().is_none());
    }

    #[test]
    fn test_ties_resolve_to_first_index() {
        let cmp = Comparison {
            matches: vec![true, true, true],
            distances: vec![0.5, 0.2, 0.2],
        };
        assert_eq!(cmp.nearest(), Some(1));
    }

    #[test]
    fn test_nan_distance_is_ignored() {
        let cmp = Comparison {
            matches: vec![false, true],
            distances: vec![f32::NAN, 0.3],
        };
        assert_eq!(cmp.best_match(), Some((1, 0.3)));
    }

    #[test]
    fn test_default_tolerance_accepts_cosine_point_four() {
        // Unit vectors with cos = 0.45
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![0.45, (1.0f32 - 0.45 * 0.45).sqrt()]);
        let cmp = EuclideanMatcher::default().compare(&[known("a", a.values.clone())], &b);
        assert_eq!(cmp.matches, vec![true]);
    }
}
