use std::{sync::Arc, time::Duration};

use anyhow::Result;
use bytes::Bytes;
use common::protocol::{FrameMsg, ProtoMsg};
use detect_server::{
    annotate::Annotator,
    config::DetectorConfig,
    data_socket::spawn_data_socket,
    filter::RawDetectionBatch,
    frames_channel, infer_jobs_channel,
    inferer::Inferer,
    nn::DetectModel,
    router::FrameRouter,
};
use futures::SinkExt;
use image::RgbImage;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// Sees a person in the left half and a clock that is not confident enough.
struct StaticScene;

impl DetectModel for StaticScene {
    fn detect(&self, _frame: &RgbImage) -> Result<RawDetectionBatch> {
        Ok(RawDetectionBatch {
            scores: vec![0.91, 0.3],
            boxes: vec![[0.25, 0.0, 0.75, 0.5], [0.0, 0.0, 0.1, 0.1]],
            classes: vec![1, 75],
        })
    }
}

#[tokio::test]
async fn test_frames_are_detected_end_to_end() -> Result<()> {
    let (incoming_tx, incoming_rx) = frames_channel();
    let (infer_tx, infer_rx) = infer_jobs_channel();
    let router = Arc::new(FrameRouter::new(infer_tx));

    // Subscribe before any frame arrives so the router forwards to the inferer
    let mut detect_rx = router.get_detect_receiver("desk");

    {
        let router = router.clone();
        tokio::spawn(async move { router.run(incoming_rx).await });
    }
    {
        let inferer = Arc::new(Inferer::new(
            infer_rx,
            StaticScene,
            DetectorConfig::default(),
            Annotator::new(None),
            router.clone(),
        ));
        tokio::spawn(inferer.run());
    }

    let addr = TcpListener::bind("127.0.0.1:0").await?.local_addr()?;
    spawn_data_socket(incoming_tx, &addr.to_string()).await?;

    let frame = RgbImage::new(320, 240);
    let jpeg = turbojpeg::compress_image(&frame, 90, turbojpeg::Subsamp::Sub2x2)?;
    let msg = ProtoMsg::FrameMsg(FrameMsg::new("desk".into(), jpeg.to_vec()));

    let stream = TcpStream::connect(addr).await?;
    let mut transport = Framed::new(stream, LengthDelimitedCodec::new());
    transport.send(Bytes::from(msg.serialize()?)).await?;

    let item = tokio::time::timeout(Duration::from_secs(10), detect_rx.recv()).await??;
    assert!(item.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));

    let detections = router.latest_detections("desk");
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].label, "person");
    assert_eq!(detections[0].score_text(), "0.9100");
    assert_eq!(detections[0].bbox.x, 0.0);
    assert_eq!(detections[0].bbox.y, 60.0);
    assert_eq!(detections[0].bbox.width, 160.0);
    assert_eq!(detections[0].bbox.height, 120.0);

    Ok(())
}
