//! Turn raw per-anchor model outputs into labeled pixel-space detections.
//!
use thiserror::Error;

use crate::{labels::LabelTable, BoundingBox, Detection};

/// Outputs of one detection model run on a single image.
///
/// Index `i` of all three vectors refers to the same candidate anchor.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawDetectionBatch {
    pub scores: Vec<f32>,
    /// Normalized `[y_min, x_min, y_max, x_max]`.
    pub boxes: Vec<[f32; 4]>,
    pub classes: Vec<i64>,
}

impl RawDetectionBatch {
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Pixel size of the surface detections are projected onto.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportDimensions {
    pub width: f32,
    pub height: f32,
}

impl ViewportDimensions {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum FilterError {
    #[error("threshold {0} is outside of [0, 1]")]
    InvalidThreshold(f32),

    #[error("viewport {width}x{height} must have positive dimensions")]
    InvalidViewport { width: f32, height: f32 },

    #[error("batch arrays differ in length: {scores} scores, {boxes} boxes, {classes} classes")]
    LengthMismatch {
        scores: usize,
        boxes: usize,
        classes: usize,
    },
}

/// Reject thresholds that are not a finite value in `[0, 1]`.
pub fn check_threshold(threshold: f32) -> Result<f32, FilterError> {
    match threshold {
        t if (0.0..=1.0).contains(&t) => Ok(t),
        t => Err(FilterError::InvalidThreshold(t)),
    }
}

/// Keep every candidate scoring strictly above `threshold`, in input order.
///
/// Boxes are scaled from normalized coordinates to `viewport` pixels and
/// anchored at their top-left corner. Inverted boxes are passed through with a
/// negative width or height. Classes missing from `labels` are labeled with
/// their numeric id.
pub fn filter_detections(
    batch: &RawDetectionBatch,
    threshold: f32,
    viewport: ViewportDimensions,
    labels: &LabelTable,
) -> Result<Vec<Detection>, FilterError> {
    let threshold = check_threshold(threshold)?;
    if !viewport.is_valid() {
        return Err(FilterError::InvalidViewport {
            width: viewport.width,
            height: viewport.height,
        });
    }
    if batch.boxes.len() != batch.scores.len() || batch.classes.len() != batch.scores.len() {
        return Err(FilterError::LengthMismatch {
            scores: batch.scores.len(),
            boxes: batch.boxes.len(),
            classes: batch.classes.len(),
        });
    }
    if batch.is_empty() {
        return Ok(Vec::new());
    }

    let detections = batch
        .scores
        .iter()
        .zip(batch.boxes.iter())
        .zip(batch.classes.iter())
        .filter(|((score, _), _)| **score > threshold)
        .map(|((score, bbox), class_id)| Detection {
            class_id: *class_id,
            label: labels.resolve(*class_id).into_owned(),
            score: round_score(*score),
            bbox: project(bbox, viewport),
        })
        .collect();

    Ok(detections)
}

/// Scale a normalized `[y_min, x_min, y_max, x_max]` box to viewport pixels.
fn project(bbox: &[f32; 4], viewport: ViewportDimensions) -> BoundingBox {
    let min_y = bbox[0] * viewport.height;
    let min_x = bbox[1] * viewport.width;
    let max_y = bbox[2] * viewport.height;
    let max_x = bbox[3] * viewport.width;

    BoundingBox {
        x: min_x,
        y: min_y,
        width: max_x - min_x,
        height: max_y - min_y,
    }
}

/// Round to 4 decimals based on the exact value of `score`.
///
/// `score * 10_000` is exact in `f64` for every `f32`.
fn round_score(score: f32) -> f32 {
    ((score as f64 * 10_000.0).round() / 10_000.0) as f32
}
