//! Object detection server binary.
//!
use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Result;
use axum::{routing::get, Extension, Router};
use clap::Parser;
use detect_server::{
    annotate::Annotator,
    config::{DetectorConfig, DEFAULT_THRESHOLD},
    data_socket::spawn_data_socket,
    endpoints::{detect_stream, healthcheck, latest_detections, named_stream},
    frames_channel, infer_jobs_channel,
    inferer::Inferer,
    meter::spawn_meter_logger,
    nn::{ModelInput, SsdModel, SsdOutputs, SSD_MOBILENET_URL},
    router::FrameRouter,
    utils::{local_or_cached, model_cache_dir},
};
use env_logger::TimestampPrecision;

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Address to serve HTTP on
    #[clap(long, default_value = "127.0.0.1:3000")]
    server_address: String,

    /// Address to receive camera frames on
    #[clap(long, default_value = "127.0.0.1:3001")]
    socket_address: String,

    /// Local ONNX detection model, downloaded from `--model-url` if not given
    #[clap(long)]
    model: Option<PathBuf>,

    /// URL of the ONNX detection model
    #[clap(long, default_value = SSD_MOBILENET_URL)]
    model_url: String,

    /// JSON file mapping class ids to labels
    #[clap(long)]
    labels: Option<PathBuf>,

    /// Minimum confidence (exclusive) of a detection
    #[clap(long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f32,

    /// TTF font for captions, boxes are drawn without captions if not given
    #[clap(long)]
    font: Option<PathBuf>,

    /// Width of the model input
    #[clap(long, default_value_t = 300)]
    input_width: u32,

    /// Height of the model input
    #[clap(long, default_value_t = 300)]
    input_height: u32,

    /// Index of the boxes output tensor
    #[clap(long, default_value_t = 1)]
    boxes_output: usize,

    /// Index of the scores output tensor
    #[clap(long, default_value_t = 2)]
    scores_output: usize,

    /// Index of the classes output tensor
    #[clap(long, default_value_t = 3)]
    classes_output: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logger
    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let input = ModelInput {
        width: args.input_width,
        height: args.input_height,
    };
    let outputs = SsdOutputs {
        boxes: args.boxes_output,
        scores: args.scores_output,
        classes: args.classes_output,
    };
    let config = DetectorConfig::new(args.threshold, args.labels.as_deref(), input, outputs)?;

    let model_path = local_or_cached(
        &reqwest::Client::new(),
        args.model,
        Some(args.model_url.as_str()),
        &model_cache_dir()?,
    )
    .await?;
    let model = SsdModel::new(&model_path, config.input, config.outputs)?;

    let annotator = match &args.font {
        Some(path) => Annotator::from_font_file(path)?,
        None => {
            log::warn!("No font given, captions are not drawn");
            Annotator::new(None)
        }
    };

    let (incoming_tx, incoming_rx) = frames_channel();
    let (infer_tx, infer_rx) = infer_jobs_channel();
    let frame_router = Arc::new(FrameRouter::new(infer_tx));

    {
        let frame_router = frame_router.clone();
        tokio::spawn(async move {
            if let Err(e) = frame_router.run(incoming_rx).await {
                log::error!("Frame router stopped: {:#}", e);
            }
        });
    }

    {
        let inferer = Inferer::new(infer_rx, model, config, annotator, frame_router.clone());
        tokio::spawn(Arc::new(inferer).run());
    }

    // Create socket to receive image streams via network
    spawn_data_socket(incoming_tx, &args.socket_address).await?;

    spawn_meter_logger();

    // Build HTTP server with endpoints
    let app = Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/stream", get(named_stream))
        .route("/detect_stream", get(detect_stream))
        .route("/detections", get(latest_detections))
        .layer(Extension(frame_router));

    // Serve HTTP server
    let addr: SocketAddr = args.server_address.parse()?;
    log::info!("Serving HTTP on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
