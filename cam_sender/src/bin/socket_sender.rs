use anyhow::{bail, Result};
use cam_sender::sensors::{get_capture_fn, CameraSettings};
use clap::Parser;
use common::protocol::{FrameMsg, ProtoMsg};
use env_logger::TimestampPrecision;
use futures::sink::SinkExt;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// Give up after this many captures in a row fail.
const MAX_FAILED_CAPTURES: u32 = 50;

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Address of the data socket of the detection server
    #[clap(long, default_value = "127.0.0.1:3001")]
    address: String,

    /// Stream name that this sender publishes to
    #[clap(long, default_value = "webcam")]
    channel: String,

    /// Video device to capture from
    #[clap(long, default_value = "/dev/video0")]
    device: String,

    /// Capture width, the largest supported resolution is used if not given
    #[clap(long, requires = "height")]
    width: Option<u32>,

    /// Capture height
    #[clap(long, requires = "width")]
    height: Option<u32>,

    /// Frames per second, the highest supported rate is used if not given
    #[clap(long)]
    fps: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    log::info!("Launching socket sender for channel {}", &args.channel);

    // Initialize webcam to send image stream
    let settings = CameraSettings {
        device: args.device.clone(),
        format: "MJPG".to_owned(),
        resolution: args.width.zip(args.height),
        interval: args.fps.map(|fps| (1, fps)),
    };
    let capture_fn = get_capture_fn(&settings)?;

    let stream = TcpStream::connect(&args.address).await?;
    log::info!("Connected to {} as {}", &args.address, &args.channel);

    // Wrap stream in transport handler with length-delimited codec
    let mut transport = Framed::new(stream, LengthDelimitedCodec::new());

    // Send captured frames in a loop
    let mut failed_captures = 0;
    loop {
        match capture_fn() {
            Some(frame) => {
                failed_captures = 0;
                let msg = ProtoMsg::FrameMsg(FrameMsg::new(args.channel.clone(), frame[..].to_vec()));
                transport.send(bytes::Bytes::from(msg.serialize()?)).await?;
            }
            None => {
                failed_captures += 1;
                if failed_captures >= MAX_FAILED_CAPTURES {
                    bail!("{} captures in a row failed", failed_captures);
                }
                log::error!("Unable to capture frame, trying again...");
            }
        }
    }
}
