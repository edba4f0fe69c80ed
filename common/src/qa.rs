//! JSON bodies of the question answering endpoint.
//!
use serde::{Deserialize, Serialize};

/// Body of `POST /predict`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PredictRequest {
    pub question: String,
    pub context: String,
}

/// Answer span extracted from the context.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PredictResponse {
    /// Inference time in milliseconds.
    pub time: f64,
    pub text: String,
    pub score: f32,
}
