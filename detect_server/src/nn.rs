//! SSD object detection model.
//!
use std::path::Path;

use anyhow::{bail, Result};
use image::RgbImage;
use ndarray::Array4;
use smallvec::SmallVec;
use tract_onnx::prelude::*;

use crate::filter::RawDetectionBatch;

pub(crate) type NnModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;
pub(crate) type NnOut = SmallVec<[TValue; 4]>;

/// Model-zoo SSD MobileNet v1, exported from TensorFlow.
pub const SSD_MOBILENET_URL: &str =
    "https://github.com/onnx/models/raw/main/validated/vision/object_detection_segmentation/ssd-mobilenetv1/model/ssd_mobilenet_v1_10.onnx";

/// Anything that turns a frame into raw per-anchor detections.
pub trait DetectModel: Send + Sync {
    fn detect(&self, frame: &RgbImage) -> Result<RawDetectionBatch>;
}

/// Fixed input resolution the model graph is optimized for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelInput {
    pub width: u32,
    pub height: u32,
}

impl Default for ModelInput {
    fn default() -> Self {
        Self {
            width: 300,
            height: 300,
        }
    }
}

/// Positions of the detection tensors among the model outputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SsdOutputs {
    /// `[1, N, 4]` normalized `[y_min, x_min, y_max, x_max]`.
    pub boxes: usize,
    /// `[1, N]` confidences.
    pub scores: usize,
    /// `[N]` or `[1, N]` class ids, integer or float typed.
    pub classes: usize,
}

impl Default for SsdOutputs {
    fn default() -> Self {
        // Output order of the model-zoo export: num_detections, boxes, scores, classes
        Self {
            boxes: 1,
            scores: 2,
            classes: 3,
        }
    }
}

pub struct SsdModel {
    model: NnModel,
    input: ModelInput,
    outputs: SsdOutputs,
}

impl SsdModel {
    pub fn new(model_path: impl AsRef<Path>, input: ModelInput, outputs: SsdOutputs) -> Result<Self> {
        let model = load_ssd_model(model_path.as_ref(), input)?;
        log::info!(
            "Loaded detection model {} at {}x{}",
            model_path.as_ref().display(),
            input.width,
            input.height
        );

        Ok(Self {
            model,
            input,
            outputs,
        })
    }

    /// Resize to the model input and build a `u8` NHWC tensor with values in `[0, 255]`.
    fn preproc(&self, frame: &RgbImage) -> Tensor {
        let (width, height) = (self.input.width, self.input.height);
        let resized: RgbImage =
            image::imageops::resize(frame, width, height, image::imageops::FilterType::Triangle);

        Array4::from_shape_fn((1, height as usize, width as usize, 3), |(_, y, x, c)| {
            resized[(x as _, y as _)][c]
        })
        .into()
    }

    fn postproc(&self, raw_nn_out: NnOut) -> Result<RawDetectionBatch> {
        let required = self.outputs.boxes.max(self.outputs.scores).max(self.outputs.classes);
        if raw_nn_out.len() <= required {
            bail!(
                "model returned {} outputs, expected at least {}",
                raw_nn_out.len(),
                required + 1
            );
        }

        batch_from_outputs(
            &raw_nn_out[self.outputs.boxes],
            &raw_nn_out[self.outputs.scores],
            &raw_nn_out[self.outputs.classes],
        )
    }
}

impl DetectModel for SsdModel {
    fn detect(&self, frame: &RgbImage) -> Result<RawDetectionBatch> {
        let valid_input = tvec!(self.preproc(frame).into());
        let raw_nn_out = self.model.run(valid_input)?;
        self.postproc(raw_nn_out)
    }
}

fn load_ssd_model(model_path: &Path, input: ModelInput) -> Result<NnModel> {
    let input_fact = InferenceFact::dt_shape(
        u8::datum_type(),
        tvec!(1, input.height as usize, input.width as usize, 3),
    );
    let model = tract_onnx::onnx()
        .model_for_path(model_path)?
        .with_input_fact(0, input_fact)?
        .into_optimized()?
        .into_runnable()?;

    Ok(model)
}

/// Drop the batch dimension of the three detection tensors.
///
/// Lengths are not checked here; mismatches surface when the batch is filtered.
pub fn batch_from_outputs(
    boxes: &Tensor,
    scores: &Tensor,
    classes: &Tensor,
) -> Result<RawDetectionBatch> {
    let boxes = boxes.cast_to::<f32>()?;
    let boxes: Vec<f32> = boxes.to_array_view::<f32>()?.iter().cloned().collect();
    if boxes.len() % 4 != 0 {
        bail!("box tensor of {} values is not a list of 4-tuples", boxes.len());
    }
    let boxes = boxes
        .chunks_exact(4)
        .map(|c| [c[0], c[1], c[2], c[3]])
        .collect();

    let scores = scores.cast_to::<f32>()?;
    let scores = scores.to_array_view::<f32>()?.iter().cloned().collect();

    // Class ids come as floats from TensorFlow exports
    let classes = classes.cast_to::<f32>()?;
    let classes = classes
        .to_array_view::<f32>()?
        .iter()
        .map(|class| class.round() as i64)
        .collect();

    Ok(RawDetectionBatch {
        scores,
        boxes,
        classes,
    })
}
