//! Endpoints of HTTP server.
//!
use std::{sync::Arc, time::Instant};

use axum::{
    body::StreamBody,
    extract::Query,
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use common::qa::{PredictRequest, PredictResponse};
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;

use crate::{meter::METER, qa::QaModel, router::FrameRouter, Detection};

/// Search parameters available to streams.
#[derive(Debug, Deserialize)]
pub struct StreamParams {
    #[serde(default)]
    name: Option<String>,
}

impl StreamParams {
    fn name(self) -> String {
        self.name.unwrap_or_else(|| "unknown".into())
    }
}

/// Health check endpoint.
pub async fn healthcheck() -> &'static str {
    "healthy"
}

fn multipart_stream(rx: crate::BroadcastReceiver) -> impl IntoResponse {
    // Lagging subscribers skip frames instead of ending the stream
    let stream =
        BroadcastStream::from(rx).filter_map(|item| async move { item.ok().map(Ok::<_, String>) });

    let body = StreamBody::new(stream);
    let headers = [(
        header::CONTENT_TYPE,
        "multipart/x-mixed-replace; boundary=frame",
    )];

    (headers, body)
}

/// Endpoint of received image streams.
pub async fn named_stream(
    Extension(frame_router): Extension<Arc<FrameRouter>>,
    Query(params): Query<StreamParams>,
) -> impl IntoResponse {
    let name = params.name();
    log::info!("Stream for {} requested", &name);

    multipart_stream(frame_router.get_frames_receiver(&name))
}

/// Endpoint of image streams annotated with detections.
pub async fn detect_stream(
    Extension(frame_router): Extension<Arc<FrameRouter>>,
    Query(params): Query<StreamParams>,
) -> impl IntoResponse {
    let name = params.name();
    log::info!("Detection stream for {} requested", &name);

    multipart_stream(frame_router.get_detect_receiver(&name))
}

/// Detections of the latest inferred frame of a stream.
pub async fn latest_detections(
    Extension(frame_router): Extension<Arc<FrameRouter>>,
    Query(params): Query<StreamParams>,
) -> Json<Vec<Detection>> {
    Json(frame_router.latest_detections(&params.name()))
}

/// Answer a question about a context.
pub async fn predict(
    Extension(model): Extension<Arc<dyn QaModel>>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, (StatusCode, String)> {
    if request.question.trim().is_empty() || request.context.trim().is_empty() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            "question and context must not be empty".into(),
        ));
    }
    METER.tick_prediction();

    let start = Instant::now();
    let answer =
        tokio::task::spawn_blocking(move || model.predict(&request.question, &request.context))
            .await
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
            .map_err(|e| {
                log::warn!("Prediction failed: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
            })?;
    let time = start.elapsed().as_secs_f64() * 1000.0;
    log::debug!("Answered {:?} with score {} in {:.1} ms", &answer.text, answer.score, time);

    Ok(Json(PredictResponse {
        time,
        text: answer.text,
        score: answer.score,
    }))
}
