use std::path::PathBuf;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone)]
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
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// L2-normalised face embedding (512-dimensional for ArcFace).
#[derive(Debug, Clone)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    /// Cosine similarity in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Cosine distance in [0, 2]. Lower = more similar.
    pub fn distance(&self, other: &Embedding) -> f32 {
        1.0 - self.similarity(other)
    }
}

/// An embedded reference photo.
#[derive(Debug, Clone)]
pub struct ReferenceFace {
    /// Uppercased identity label derived from the photo's path.
    pub identity: String,
    pub path: PathBuf,
    pub embedding: Embedding,
}

/// Closest reference to a probe face.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub identity: String,
    pub reference: PathBuf,
    /// Cosine distance to the reference (lower = closer).
    pub distance: f32,
}

impl Candidate {
    /// `1 - distance`, rounded to two decimals for display.
    pub fn confidence(&self) -> f32 {
        ((1.0 - self.distance) * 100.0).round() / 100.0
    }
}

/// Outcome of matching one frame against the reference set.
#[derive(Debug, Clone, PartialEq)]
pub enum Identification {
    /// The reference directory holds no usable photos.
    EmptyReferences,
    /// No face was found in the probe frame.
    NoFace,
    Closest(Candidate),
}

/// Strategy for picking the closest reference to a probe embedding.
pub trait Matcher {
    fn closest(&self, probe: &Embedding, gallery: &[ReferenceFace]) -> Option<Candidate>;
}

/// Cosine-distance matcher. Visits every gallery entry and keeps the first
/// entry with the lowest distance.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn closest(&self, probe: &Embedding, gallery: &[ReferenceFace]) -> Option<Candidate> {
        let mut best: Option<(usize, f32)> = None;

        for (i, face) in gallery.iter().enumerate() {
            let distance = probe.distance(&face.embedding);
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((i, distance)),
            }
        }

        best.map(|(idx, distance)| Candidate {
            identity: gallery[idx].identity.clone(),
            reference: gallery[idx].path.clone(),
            distance,
        })
    }
}

/// Distance threshold for accepting a candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold(pub f32);

impl Threshold {
    /// Strict comparison: a distance equal to the threshold is rejected.
    pub fn accepts(&self, distance: f32) -> bool {
        distance < self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(identity: &str, values: Vec<f32>) -> ReferenceFace {
        ReferenceFace {
            identity: identity.into(),
            path: PathBuf::from(format!("images/{identity}/1.jpg")),
            embedding: Embedding { values },
        }
    }

    #[test]
    fn test_similarity_identical() {
        let a = Embedding { values: vec![1.0, 0.0, 0.0] };
        assert!((a.similarity(&a.clone()) - 1.0).abs() < 1e-6);
        assert!(a.distance(&a.clone()).abs() < 1e-6);
    }

    #[test]
    fn test_distance_orthogonal_and_opposite() {
        let a = Embedding { values: vec![1.0, 0.0] };
        let b = Embedding { values: vec![0.0, 1.0] };
        let c = Embedding { values: vec![-1.0, 0.0] };
        assert!((a.distance(&b) - 1.0).abs() < 1e-6);
        assert!((a.distance(&c) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_zero_vector() {
        let a = Embedding { values: vec![0.0, 0.0] };
        let b = Embedding { values: vec![1.0, 0.0] };
        assert_eq!(a.similarity(&b), 0.0);
        assert_eq!(a.distance(&b), 1.0);
    }

    #[test]
    fn test_closest_scans_whole_gallery() {
        let probe = Embedding { values: vec![1.0, 0.0, 0.0] };
        let gallery = vec![
            face("DECOY1", vec![0.0, 1.0, 0.0]),
            face("DECOY2", vec![0.0, 0.0, 1.0]),
            face("KATRINA", vec![1.0, 0.1, 0.0]),
        ];

        let candidate = CosineMatcher.closest(&probe, &gallery).unwrap();
        assert_eq!(candidate.identity, "KATRINA");
        assert_eq!(candidate.reference, PathBuf::from("images/KATRINA/1.jpg"));
        assert!(candidate.distance < 0.01);
    }

    #[test]
    fn test_closest_keeps_first_on_tie() {
        let probe = Embedding { values: vec![1.0, 0.0] };
        let gallery = vec![face("FIRST", vec![1.0, 0.0]), face("SECOND", vec![2.0, 0.0])];
        let candidate = CosineMatcher.closest(&probe, &gallery).unwrap();
        assert_eq!(candidate.identity, "FIRST");
    }

    #[test]
    fn test_closest_empty_gallery() {
        let probe = Embedding { values: vec![1.0, 0.0] };
        assert!(CosineMatcher.closest(&probe, &[]).is_none());
    }

    #[test]
    fn test_threshold_is_strict() {
        let threshold = Threshold(0.5);
        assert!(threshold.accepts(0.4999));
        assert!(!threshold.accepts(0.5));
        assert!(!threshold.accepts(0.75));
    }

    #[test]
    fn test_confidence_rounds_to_two_decimals() {
        let candidate = Candidate {
            identity: "A".into(),
            reference: PathBuf::from("images/A/1.jpg"),
            distance: 0.1234,
        };
        assert!((candidate.confidence() - 0.88).abs() < 1e-6);
    }
}
