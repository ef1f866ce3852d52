//! Face-presence check via an SCRFD detection model on ONNX Runtime.
//!
//! The capture loop only needs one answer per frame: is exactly one face in
//! view? The detector decodes the score and distance heads of each stride,
//! suppresses overlapping candidates, and reports how many faces remain.
//! Landmark heads, when the model has them, are ignored.

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

/// File name of the detection model inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";

const INPUT_SIZE: u32 = 640;
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 128.0;
const SCORE_THRESHOLD: f32 = 0.5;
const NMS_IOU_THRESHOLD: f32 = 0.4;
const STRIDES: [usize; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A detected face in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl FaceBox {
    fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    fn iou(&self, other: &FaceBox) -> f32 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);

        let inter = (right - left).max(0.0) * (bottom - top).max(0.0);
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

/// Result of one presence check.
#[derive(Debug, Clone, PartialEq)]
pub struct Presence {
    /// Number of distinct faces found.
    pub faces: usize,
    /// The most confident face, if any.
    pub face: Option<FaceBox>,
}

impl Presence {
    pub fn none() -> Self {
        Self { faces: 0, face: None }
    }

    /// Build from detections sorted by confidence, highest first.
    pub fn from_faces(faces: &[FaceBox]) -> Self {
        Self {
            faces: faces.len(),
            face: faces.first().copied(),
        }
    }

    /// True when exactly one face is framed.
    pub fn single_face(&self) -> bool {
        self.faces == 1
    }
}

/// Answers "is there a single detectable face in this frame?".
pub trait FacePresence {
    fn detect(&mut self, frame: &RgbImage) -> Result<Presence, DetectorError>;
}

/// SCRFD-backed presence detector.
pub struct ScrfdDetector {
    session: Session,
    /// (score, bbox) output indices for strides 8, 16, 32.
    heads: [(usize, usize); 3],
}

impl ScrfdDetector {
    /// Load the detection model from `model_dir`.
    ///
    /// Must complete before the first call to [`FacePresence::detect`].
    pub fn load(model_dir: &Path) -> Result<Self, DetectorError> {
        let path = model_dir.join(DETECTOR_MODEL_FILE);
        if !path.exists() {
            return Err(DetectorError::ModelNotFound(path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(&path)?;

        let names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();
        if names.len() < 6 {
            return Err(DetectorError::InferenceFailed(format!(
                "detector needs score and bbox outputs for 3 strides, model has {}",
                names.len()
            )));
        }

        let heads = map_heads(&names);
        tracing::info!(path = %path.display(), outputs = ?names, ?heads, "loaded face detector");

        Ok(Self { session, heads })
    }
}

impl FacePresence for ScrfdDetector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Presence, DetectorError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Presence::none());
        }

        let (input, scale) = preprocess(frame);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (slot, &stride) in STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx) = self.heads[slot];
            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, distances) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bbox stride {stride}: {e}")))?;

            candidates.extend(decode_level(scores, distances, stride, scale, SCORE_THRESHOLD));
        }

        let faces = suppress(candidates, NMS_IOU_THRESHOLD);
        tracing::trace!(faces = faces.len(), "presence check");
        Ok(Presence::from_faces(&faces))
    }
}

/// Resolve which outputs carry scores and box distances for each stride.
///
/// Exports either name them `score_8`, `bbox_8`, ... or use opaque numeric
/// names in the order scores (8/16/32), boxes (8/16/32), then keypoints.
fn map_heads(names: &[String]) -> [(usize, usize); 3] {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let named: Option<Vec<(usize, usize)>> = STRIDES
        .iter()
        .map(|&s| Some((find("score", s)?, find("bbox", s)?)))
        .collect();

    match named {
        Some(heads) => [heads[0], heads[1], heads[2]],
        None => [(0, 3), (1, 4), (2, 5)],
    }
}

/// Letterbox `frame` into the top-left corner of the square model input.
///
/// Returns the NCHW tensor and the scale from frame to input pixels. Padding
/// is left at zero, which is the normalized value of the pixel mean.
fn preprocess(frame: &RgbImage) -> (Array4<f32>, f32) {
    let (width, height) = frame.dimensions();
    let side = INPUT_SIZE as f32;
    let scale = (side / width as f32).min(side / height as f32);
    let new_w = ((width as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);

    let resized = imageops::resize(frame, new_w, new_h, FilterType::Triangle);

    let size = INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for channel in 0..3 {
            tensor[[0, channel, y as usize, x as usize]] =
                (pixel[channel] as f32 - PIXEL_MEAN) / PIXEL_STD;
        }
    }

    (tensor, scale)
}

/// Decode one stride's anchors into frame-space boxes above `threshold`.
///
/// Box heads predict distances (left, top, right, bottom) from the anchor
/// centre in units of the stride.
fn decode_level(
    scores: &[f32],
    distances: &[f32],
    stride: usize,
    scale: f32,
    threshold: f32,
) -> Vec<FaceBox> {
    let grid = INPUT_SIZE as usize / stride;
    let anchors = grid * grid * ANCHORS_PER_CELL;
    let step = stride as f32;

    (0..anchors.min(scores.len()))
        .filter(|&idx| scores[idx] > threshold)
        .filter_map(|idx| {
            let d = distances.get(idx * 4..idx * 4 + 4)?;
            let cell = idx / ANCHORS_PER_CELL;
            let cx = (cell % grid) as f32 * step;
            let cy = (cell / grid) as f32 * step;

            let x1 = (cx - d[0] * step) / scale;
            let y1 = (cy - d[1] * step) / scale;
            let x2 = (cx + d[2] * step) / scale;
            let y2 = (cy + d[3] * step) / scale;
            Some(FaceBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: scores[idx],
            })
        })
        .collect()
}

/// Greedy non-maximum suppression. Output is sorted by confidence, highest first.
fn suppress(mut candidates: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<FaceBox> = Vec::new();
    for candidate in candidates {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}
