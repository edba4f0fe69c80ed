use std::sync::Arc;

use anyhow::Result;
use image::RgbImage;

use crate::{
    annotate::Annotator,
    as_jpeg_stream_item,
    config::DetectorConfig,
    filter::{filter_detections, ViewportDimensions},
    meter::METER,
    nn::DetectModel,
    router::FrameRouter,
    Detection, InferJobReceiver,
};

/// JPEG quality of annotated frames.
const JPEG_QUALITY: i32 = 90;

/// Runs the detection model on frames handed over by the router, one at a time.
pub struct Inferer<M> {
    infer_rx: InferJobReceiver,
    model: M,
    config: DetectorConfig,
    annotator: Annotator,
    router: Arc<FrameRouter>,
}

impl<M: DetectModel> Inferer<M> {
    pub fn new(
        infer_rx: InferJobReceiver,
        model: M,
        config: DetectorConfig,
        annotator: Annotator,
        router: Arc<FrameRouter>,
    ) -> Self {
        Self {
            infer_rx,
            model,
            config,
            annotator,
            router,
        }
    }

    /// Process jobs until the router side of the channel is gone.
    ///
    /// Frames are processed on the blocking thread pool so HTTP streams keep
    /// being served during inference.
    pub async fn run(self: Arc<Self>)
    where
        M: 'static,
    {
        loop {
            let (stream_id, jpeg, reply_tx) = match self.infer_rx.recv_ref().await {
                Some(mut job) => {
                    let jpeg = std::mem::take(&mut job.jpeg);
                    (job.stream_id, jpeg, job.reply_tx.take())
                }
                None => break,
            };

            let inferer = self.clone();
            let result = match tokio::task::spawn_blocking(move || inferer.process(&jpeg)).await {
                Ok(result) => result,
                Err(e) => Err(e.into()),
            };

            match result {
                Ok((jpeg, detections)) => {
                    METER.tick_detected();
                    log::debug!("Found {} objects", detections.len());
                    self.router.store_detections(stream_id, detections);

                    if let Some(reply_tx) = reply_tx {
                        reply_tx.send(as_jpeg_stream_item(&jpeg)).ok();
                    }
                }
                Err(e) => log::warn!("Failed to run detection on frame: {:#}", e),
            }
        }
        log::info!("Infer channel closed, stopping inferer");
    }

    /// Decode, detect, filter and annotate one JPEG frame.
    pub fn process(&self, jpeg: &[u8]) -> Result<(Vec<u8>, Vec<Detection>)> {
        let mut frame: RgbImage = turbojpeg::decompress_image(jpeg)?;
        let detections = self.detect(&frame)?;

        self.annotator.draw(&mut frame, &detections);
        let jpeg = turbojpeg::compress_image(&frame, JPEG_QUALITY, turbojpeg::Subsamp::Sub2x2)?;

        Ok((jpeg.to_vec(), detections))
    }

    /// Detections of a decoded frame, projected onto the frame itself.
    pub fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>> {
        let raw = self.model.detect(frame)?;
        log::debug!("Filtering {} candidates", raw.len());
        let viewport = ViewportDimensions::new(frame.width() as f32, frame.height() as f32);

        Ok(filter_detections(
            &raw,
            self.config.threshold,
            viewport,
            &self.config.labels,
        )?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{filter::RawDetectionBatch, infer_jobs_channel};

    /// Returns the same two candidates for every frame.
    struct FixedModel;

    impl DetectModel for FixedModel {
        fn detect(&self, _frame: &RgbImage) -> Result<RawDetectionBatch> {
            Ok(RawDetectionBatch {
                scores: vec![0.9, 0.4],
                boxes: vec![[0.1, 0.2, 0.5, 0.6], [0.0, 0.0, 1.0, 1.0]],
                classes: vec![1, 2],
            })
        }
    }

    fn inferer() -> Inferer<FixedModel> {
        let (infer_tx, infer_rx) = infer_jobs_channel();
        let router = Arc::new(FrameRouter::new(infer_tx));
        Inferer::new(
            infer_rx,
            FixedModel,
            DetectorConfig::default(),
            Annotator::new(None),
            router,
        )
    }

    #[test]
    fn test_detections_follow_frame_size() -> Result<()> {
        let inferer = inferer();

        let detections = inferer.detect(&RgbImage::new(200, 100))?;
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "person");
        assert_eq!(detections[0].bbox.x, 40.0);

        let detections = inferer.detect(&RgbImage::new(400, 200))?;
        assert_eq!(detections[0].bbox.x, 80.0);

        Ok(())
    }

    #[test]
    fn test_process_round_trips_jpeg() -> Result<()> {
        let inferer = inferer();
        let frame = RgbImage::new(200, 100);
        let jpeg = turbojpeg::compress_image(&frame, 90, turbojpeg::Subsamp::Sub2x2)?;

        let (annotated, detections) = inferer.process(&jpeg)?;
        let annotated: RgbImage = turbojpeg::decompress_image(&annotated)?;

        assert_eq!(annotated.dimensions(), (200, 100));
        assert_eq!(detections.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_run_answers_on_reply_channel() -> Result<()> {
        let (infer_tx, infer_rx) = infer_jobs_channel();
        let router = Arc::new(FrameRouter::new(infer_tx.clone()));
        let _detect_rx = router.get_detect_receiver("hall");
        let inferer = Arc::new(Inferer::new(
            infer_rx,
            FixedModel,
            DetectorConfig::default(),
            Annotator::new(None),
            router.clone(),
        ));
        let handle = tokio::spawn(inferer.run());

        let (reply_tx, mut reply_rx) = crate::broadcast_channel();
        let frame = RgbImage::new(200, 100);
        let jpeg = turbojpeg::compress_image(&frame, 90, turbojpeg::Subsamp::Sub2x2)?;
        infer_tx
            .send(crate::InferJob {
                stream_id: crate::hashed("hall"),
                jpeg: jpeg.to_vec(),
                reply_tx: Some(reply_tx),
            })
            .await?;

        let item = reply_rx.recv().await?;
        assert!(item.starts_with(b"--frame\r\n"));
        assert_eq!(router.latest_detections("hall").len(), 1);

        handle.abort();

        Ok(())
    }

    #[test]
    fn test_corrupt_jpeg_is_an_error() {
        assert!(inferer().process(&[0, 1, 2, 3]).is_err());
    }
}
