//! Frame → closest reference identity.

use crate::detector::{DetectorError, FaceDetector};
use crate::gallery::{Gallery, GalleryError, ReferenceImage};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{CosineMatcher, Embedding, Identification, Matcher};
use image::GrayImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("gallery error: {0}")]
    Gallery(#[from] GalleryError),
}

/// Locations of the ONNX model files.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub detector: PathBuf,
    pub recognizer: PathBuf,
    pub face_mesh: PathBuf,
}

impl ModelPaths {
    /// Standard file names inside one model directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            detector: dir.join("det_10g.onnx"),
            recognizer: dir.join("w600k_r50.onnx"),
            face_mesh: dir.join("face_landmark.onnx"),
        }
    }
}

/// Identifies the person in a frame against a reference set.
pub trait Identify: Send {
    fn identify(&mut self, frame: &GrayImage) -> Result<Identification, PipelineError>;

    /// Number of embedded reference faces as of the last identification.
    fn reference_count(&self) -> usize;
}

/// Detector + embedder + cached reference gallery.
pub struct ReferenceMatcher {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    gallery: Gallery,
}

impl ReferenceMatcher {
    /// Load both models and embed the current reference photos.
    pub fn load(models: &ModelPaths, reference_dir: &Path) -> Result<Self, PipelineError> {
        let mut matcher = Self {
            detector: FaceDetector::load(&models.detector)?,
            recognizer: FaceRecognizer::load(&models.recognizer)?,
            gallery: Gallery::new(reference_dir),
        };
        matcher.refresh_gallery()?;
        Ok(matcher)
    }

    fn refresh_gallery(&mut self) -> Result<bool, PipelineError> {
        let detector = &mut self.detector;
        let recognizer = &mut self.recognizer;
        self.gallery
            .refresh(|photo| embed_reference(detector, recognizer, photo))
    }

    /// Embed the highest-confidence face in `frame`, if any.
    pub fn embed(&mut self, frame: &GrayImage) -> Result<Option<Embedding>, PipelineError> {
        embed_best_face(&mut self.detector, &mut self.recognizer, frame)
    }
}

impl Identify for ReferenceMatcher {
    fn identify(&mut self, frame: &GrayImage) -> Result<Identification, PipelineError> {
        self.refresh_gallery()?;
        if self.gallery.faces().is_empty() {
            return Ok(Identification::EmptyReferences);
        }

        let Some(probe) = self.embed(frame)? else {
            return Ok(Identification::NoFace);
        };

        Ok(closest(&probe, &self.gallery))
    }

    fn reference_count(&self) -> usize {
        self.gallery.faces().len()
    }
}

fn closest(probe: &Embedding, gallery: &Gallery) -> Identification {
    match CosineMatcher.closest(probe, gallery.faces()) {
        Some(candidate) => {
            tracing::debug!(
                identity = %candidate.identity,
                distance = candidate.distance,
                "closest reference"
            );
            Identification::Closest(candidate)
        }
        None => Identification::EmptyReferences,
    }
}

fn embed_best_face(
    detector: &mut FaceDetector,
    recognizer: &mut FaceRecognizer,
    frame: &GrayImage,
) -> Result<Option<Embedding>, PipelineError> {
    let faces = detector.detect(frame)?;
    let Some(face) = faces.first() else {
        return Ok(None);
    };
    Ok(Some(recognizer.extract(frame, face)?))
}

/// Unreadable photos are skipped rather than failing the whole gallery.
fn embed_reference(
    detector: &mut FaceDetector,
    recognizer: &mut FaceRecognizer,
    photo: &ReferenceImage,
) -> Result<Option<Embedding>, PipelineError> {
    let frame = match image::open(&photo.path) {
        Ok(decoded) => decoded.to_luma8(),
        Err(e) => {
            tracing::warn!(path = %photo.path.display(), error = %e, "cannot decode reference photo");
            return Ok(None);
        }
    };
    embed_best_face(detector, recognizer, &frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_paths_in_dir() {
        let paths = ModelPaths::in_dir(Path::new("/opt/models"));
        assert_eq!(paths.detector, PathBuf::from("/opt/models/det_10g.onnx"));
        assert_eq!(paths.recognizer, PathBuf::from("/opt/models/w600k_r50.onnx"));
        assert_eq!(paths.face_mesh, PathBuf::from("/opt/models/face_landmark.onnx"));
    }

    #[test]
    fn test_closest_on_empty_gallery() {
        let gallery = Gallery::new("images");
        let probe = Embedding { values: vec![1.0] };
        assert_eq!(closest(&probe, &gallery), Identification::EmptyReferences);
    }

    #[test]
    fn test_closest_reports_candidate() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("katrina")).unwrap();
        std::fs::write(dir.path().join("katrina/1.jpg"), b"x").unwrap();

        let mut gallery = Gallery::new(dir.path());
        gallery
            .refresh(|_| -> Result<_, GalleryError> { Ok(Some(Embedding { values: vec![0.6, 0.8] })) })
            .unwrap();

        let probe = Embedding { values: vec![0.6, 0.8] };
        match closest(&probe, &gallery) {
            Identification::Closest(candidate) => {
                assert_eq!(candidate.identity, "KATRINA");
                assert!(candidate.distance.abs() < 1e-6);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
