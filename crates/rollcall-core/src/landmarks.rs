//! Dense face-mesh landmarks (MediaPipe 468-point model) via ONNX Runtime.
//!
//! Only the left-eye lids are consumed: blink detection needs the vertical
//! gap between mesh points 159 (upper lid) and 145 (lower lid).

use crate::alignment::sample;
use crate::types::BoundingBox;
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::{TensorRef, ValueType};
use std::path::Path;
use thiserror::Error;

const MESH_INPUT_SIZE: usize = 192;
const MESH_POINTS: usize = 468;
/// Square ROI side relative to the larger side of the detection box.
const MESH_ROI_SCALE: f32 = 1.5;
const LEFT_EYE_UPPER_LID: usize = 159;
const LEFT_EYE_LOWER_LID: usize = 145;

#[derive(Error, Debug)]
pub enum LandmarkError {
    #[error("model file not found: {0} — export MediaPipe face_landmark to ONNX and place it in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Left-eye lid positions in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeLids {
    pub upper: (f32, f32),
    pub lower: (f32, f32),
}

impl EyeLids {
    /// Lid gap normalised by frame height, comparable across resolutions.
    pub fn openness(&self, frame_height: u32) -> f32 {
        if frame_height == 0 {
            return 0.0;
        }
        (self.lower.1 - self.upper.1) / frame_height as f32
    }
}

/// Square crop around a detected face, in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Roi {
    x0: f32,
    y0: f32,
    size: f32,
}

impl Roi {
    fn around(face: &BoundingBox) -> Self {
        let (cx, cy) = face.center();
        let size = face.width.max(face.height) * MESH_ROI_SCALE;
        Self { x0: cx - size / 2.0, y0: cy - size / 2.0, size }
    }

    /// Map a point in mesh-input pixels back to the frame.
    fn to_frame(self, (x, y): (f32, f32)) -> (f32, f32) {
        let k = self.size / MESH_INPUT_SIZE as f32;
        (self.x0 + x * k, self.y0 + y * k)
    }
}

/// MediaPipe face-mesh landmarker.
pub struct FaceMesh {
    session: Session,
    /// NHWC (TFLite export) versus NCHW input layout.
    channels_last: bool,
}

impl FaceMesh {
    pub fn load(model_path: &Path) -> Result<Self, LandmarkError> {
        if !model_path.exists() {
            return Err(LandmarkError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(1)?
            .commit_from_file(model_path)?;

        let channels_last = session
            .inputs()
            .first()
            .and_then(|input| match input.dtype() {
                ValueType::Tensor { shape, .. } => shape.last().map(|&d| d == 3),
                _ => None,
            })
            .unwrap_or(true);

        tracing::info!(path = %model_path.display(), channels_last, "loaded face-mesh model");

        Ok(Self { session, channels_last })
    }

    /// Locate the left-eye lids of `face` in `frame`.
    pub fn eye_lids(&mut self, frame: &GrayImage, face: &BoundingBox) -> Result<EyeLids, LandmarkError> {
        let roi = Roi::around(face);
        let input = preprocess(frame, roi, self.channels_last);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, mesh) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| LandmarkError::InferenceFailed(format!("mesh extraction: {e}")))?;

        lids_from_mesh(mesh, roi).ok_or_else(|| {
            LandmarkError::InferenceFailed(format!(
                "expected {} mesh values, got {}",
                MESH_POINTS * 3,
                mesh.len()
            ))
        })
    }
}

/// Pick the lid points out of a flat `[x, y, z] × 468` output.
fn lids_from_mesh(mesh: &[f32], roi: Roi) -> Option<EyeLids> {
    if mesh.len() < MESH_POINTS * 3 {
        return None;
    }
    let point = |i: usize| roi.to_frame((mesh[i * 3], mesh[i * 3 + 1]));
    Some(EyeLids {
        upper: point(LEFT_EYE_UPPER_LID),
        lower: point(LEFT_EYE_LOWER_LID),
    })
}

/// Resample the ROI to 192×192 with values in [0, 1], gray replicated to RGB.
fn preprocess(frame: &GrayImage, roi: Roi, channels_last: bool) -> Array4<f32> {
    let size = MESH_INPUT_SIZE;
    let mut tensor = if channels_last {
        Array4::<f32>::zeros((1, size, size, 3))
    } else {
        Array4::<f32>::zeros((1, 3, size, size))
    };

    for y in 0..size {
        for x in 0..size {
            let (fx, fy) = roi.to_frame((x as f32 + 0.5, y as f32 + 0.5));
            let value = sample(frame, fx - 0.5, fy - 0.5) / 255.0;
            for c in 0..3 {
                if channels_last {
                    tensor[[0, y, x, c]] = value;
                } else {
                    tensor[[0, c, y, x]] = value;
                }
            }
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn face(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: 0.9, landmarks: None }
    }

    #[test]
    fn test_roi_is_square_and_centred() {
        let roi = Roi::around(&face(100.0, 50.0, 80.0, 100.0));
        assert_eq!(roi.size, 150.0);
        assert_eq!((roi.x0, roi.y0), (65.0, 25.0));
    }

    #[test]
    fn test_roi_maps_mesh_corners_to_frame() {
        let roi = Roi { x0: 10.0, y0: 20.0, size: 384.0 };
        assert_eq!(roi.to_frame((0.0, 0.0)), (10.0, 20.0));
        assert_eq!(roi.to_frame((192.0, 96.0)), (394.0, 212.0));
    }

    #[test]
    fn test_lids_from_mesh_picks_eyelid_points() {
        let mut mesh = vec![0.0f32; MESH_POINTS * 3];
        mesh[LEFT_EYE_UPPER_LID * 3] = 60.0;
        mesh[LEFT_EYE_UPPER_LID * 3 + 1] = 80.0;
        mesh[LEFT_EYE_LOWER_LID * 3] = 60.0;
        mesh[LEFT_EYE_LOWER_LID * 3 + 1] = 86.0;

        let roi = Roi { x0: 0.0, y0: 0.0, size: 192.0 };
        let lids = lids_from_mesh(&mesh, roi).unwrap();
        assert_eq!(lids.upper, (60.0, 80.0));
        assert_eq!(lids.lower, (60.0, 86.0));
        assert!((lids.openness(480) - 6.0 / 480.0).abs() < 1e-6);
    }

    #[test]
    fn test_lids_from_short_output() {
        let roi = Roi { x0: 0.0, y0: 0.0, size: 192.0 };
        assert!(lids_from_mesh(&[0.0; 30], roi).is_none());
    }

    #[test]
    fn test_openness_zero_height() {
        let lids = EyeLids { upper: (0.0, 1.0), lower: (0.0, 2.0) };
        assert_eq!(lids.openness(0), 0.0);
    }

    #[test]
    fn test_preprocess_layouts() {
        let frame = GrayImage::from_pixel(400, 400, Luma([255]));
        let roi = Roi::around(&face(150.0, 150.0, 100.0, 100.0));

        let nhwc = preprocess(&frame, roi, true);
        assert_eq!(nhwc.shape(), &[1, 192, 192, 3]);
        assert!((nhwc[[0, 96, 96, 1]] - 1.0).abs() < 1e-6);

        let nchw = preprocess(&frame, roi, false);
        assert_eq!(nchw.shape(), &[1, 3, 192, 192]);
        assert!((nchw[[0, 2, 96, 96]] - 1.0).abs() < 1e-6);
    }
}
