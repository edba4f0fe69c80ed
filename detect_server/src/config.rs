//! Settings of the detection pipeline.
//!
use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};

use crate::{
    filter::check_threshold,
    labels::LabelTable,
    nn::{ModelInput, SsdOutputs},
};

/// Confidence a candidate has to exceed to be kept.
pub const DEFAULT_THRESHOLD: f32 = 0.65;

#[derive(Clone, Debug)]
pub struct DetectorConfig {
    pub threshold: f32,
    pub labels: Arc<LabelTable>,
    pub input: ModelInput,
    pub outputs: SsdOutputs,
}

impl DetectorConfig {
    /// Validate the threshold and load the label table, falling back to the built-in one.
    pub fn new(
        threshold: f32,
        labels_path: Option<&Path>,
        input: ModelInput,
        outputs: SsdOutputs,
    ) -> Result<Self> {
        let threshold = check_threshold(threshold)?;

        let labels = match labels_path {
            Some(path) => LabelTable::from_json_file(path)
                .with_context(|| format!("loading labels from {}", path.display()))?,
            None => LabelTable::default(),
        };
        if labels.is_empty() {
            log::warn!("Label table is empty, classes are reported by their id");
        }
        log::info!("Using {} class labels, threshold {}", labels.len(), threshold);

        Ok(Self {
            threshold,
            labels: Arc::new(labels),
            input,
            outputs,
        })
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            labels: Arc::new(LabelTable::default()),
            input: ModelInput::default(),
            outputs: SsdOutputs::default(),
        }
    }
}
