//! Class id to display label mapping.
//!
use std::{borrow::Cow, collections::HashMap, fs, path::Path};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("failed to read label file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse label file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("label key {0:?} is not an integer class id")]
    InvalidId(String),
}

/// Read-only lookup of display labels by class id.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelTable {
    labels: HashMap<i64, String>,
}

impl LabelTable {
    pub fn new(labels: HashMap<i64, String>) -> Self {
        Self { labels }
    }

    /// Load a JSON object of the form `{ "1": "person", "2": "bicycle" }`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, LabelError> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, LabelError> {
        let raw: HashMap<String, String> = serde_json::from_str(content)?;
        let labels = raw
            .into_iter()
            .map(|(key, label)| match key.trim().parse::<i64>() {
                Ok(id) => Ok((id, label)),
                Err(_) => Err(LabelError::InvalidId(key)),
            })
            .collect::<Result<_, _>>()?;

        Ok(Self { labels })
    }

    pub fn get(&self, class_id: i64) -> Option<&str> {
        self.labels.get(&class_id).map(String::as_str)
    }

    /// Label of `class_id`, or the id itself when it has no label.
    pub fn resolve(&self, class_id: i64) -> Cow<'_, str> {
        match self.get(class_id) {
            Some(label) => Cow::Borrowed(label),
            None => Cow::Owned(class_id.to_string()),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl Default for LabelTable {
    /// The handful of COCO classes the webcam demo cares about.
    fn default() -> Self {
        let labels = [
            (0, "background"),
            (1, "person"),
            (2, "bicycle"),
            (62, "chair"),
            (70, "toilet"),
            (75, "clock"),
            (77, "phone"),
        ]
        .into_iter()
        .map(|(id, label)| (id, label.to_owned()))
        .collect();

        Self { labels }
    }
}
