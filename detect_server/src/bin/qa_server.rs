//! Question answering server binary.
//!
use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Result;
use axum::{
    routing::{get, post},
    Extension, Router,
};
use clap::Parser;
use detect_server::{
    endpoints::{healthcheck, predict},
    meter::spawn_meter_logger,
    qa::{
        model::BertQaModel, tokenizer::WordPieceTokenizer, QaModel, BERT_SQUAD2_VOCAB_URL,
        DEFAULT_MAX_ANSWER_LEN, DEFAULT_MAX_SEQ_LEN,
    },
    utils::{local_or_cached, model_cache_dir},
};
use env_logger::TimestampPrecision;

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Address to serve HTTP on
    #[clap(long, default_value = "127.0.0.1:1234")]
    server_address: String,

    /// Local ONNX export of an extractive question answering model
    #[clap(long, required_unless_present = "model_url")]
    model: Option<PathBuf>,

    /// URL of the ONNX model, downloaded into the model cache
    #[clap(long)]
    model_url: Option<String>,

    /// Local WordPiece vocabulary of the model, one token per line
    #[clap(long)]
    vocab: Option<PathBuf>,

    /// URL of the vocabulary, used if `--vocab` is not given
    #[clap(long, default_value = BERT_SQUAD2_VOCAB_URL)]
    vocab_url: String,

    /// Lower-case input text, for uncased models
    #[clap(long)]
    lower_case: bool,

    /// Sequence length the model is run with
    #[clap(long, default_value_t = DEFAULT_MAX_SEQ_LEN)]
    max_seq_len: usize,

    /// Maximum number of tokens in an answer
    #[clap(long, default_value_t = DEFAULT_MAX_ANSWER_LEN)]
    max_answer_len: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logger
    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let client = reqwest::Client::new();
    let cache_dir = model_cache_dir()?;
    let model_path = local_or_cached(&client, args.model, args.model_url.as_deref(), &cache_dir)
        .await?;
    let vocab_path =
        local_or_cached(&client, args.vocab, Some(args.vocab_url.as_str()), &cache_dir).await?;

    let tokenizer = WordPieceTokenizer::from_vocab_file(&vocab_path, args.lower_case)?;
    let model: Arc<dyn QaModel> = Arc::new(BertQaModel::new(
        &model_path,
        tokenizer,
        args.max_seq_len,
        args.max_answer_len,
    )?);

    spawn_meter_logger();

    let app = Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/predict", post(predict))
        .layer(Extension(model));

    let addr: SocketAddr = args.server_address.parse()?;
    log::info!("Serving question answering on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

