use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use anyhow::{bail, Result};
use common::protocol::{FrameMsg, ProtoMsg};

use crate::{
    as_jpeg_stream_item, broadcast_channel, hashed, meter::METER, BroadcastReceiver,
    BroadcastSender, Detection, FrameReceiver, InferJobSender,
};

/// Number of frames routed between two refreshes of the subscriber lists.
const FRAMES_PER_REFRESH: usize = 4;

type SenderMap = HashMap<u64, BroadcastSender>;

/// Fans incoming frames out to raw stream subscribers and to the inferer.
///
/// Frames are only handed to the inferer while someone watches the annotated
/// stream of that name.
pub struct FrameRouter {
    frames_broadcast_map: Mutex<SenderMap>,
    detect_broadcast_map: Mutex<SenderMap>,
    latest_detections: Mutex<HashMap<u64, Vec<Detection>>>,
    infer_tx: InferJobSender,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FrameRouter {
    pub fn new(infer_tx: InferJobSender) -> Self {
        Self {
            frames_broadcast_map: Mutex::new(HashMap::new()),
            detect_broadcast_map: Mutex::new(HashMap::new()),
            latest_detections: Mutex::new(HashMap::new()),
            infer_tx,
        }
    }

    pub async fn run(&self, rx: FrameReceiver) -> Result<()> {
        let mut frames_sender_map = HashMap::new();
        let mut detect_sender_map = HashMap::new();

        loop {
            self.refresh(&mut frames_sender_map, &mut detect_sender_map);

            for _ in 0..FRAMES_PER_REFRESH {
                let frame_msg = match rx.recv_ref().await {
                    None => bail!("incoming frames channel closed"),
                    Some(data) => match ProtoMsg::deserialize(&data[..]) {
                        Ok(ProtoMsg::FrameMsg(frame_msg)) => frame_msg,
                        Err(e) => {
                            log::warn!("Dropping malformed frame message: {}", e);
                            continue;
                        }
                    },
                };

                self.route(frame_msg, &frames_sender_map, &detect_sender_map);
            }
        }
    }

    /// Prune subscriptions without receivers, together with the detections of
    /// streams nobody watches annotated anymore.
    fn refresh(&self, frames_senders: &mut SenderMap, detect_senders: &mut SenderMap) {
        refresh_senders(&self.frames_broadcast_map, frames_senders);
        refresh_senders(&self.detect_broadcast_map, detect_senders);

        locked(&self.latest_detections).retain(|id, _detections| detect_senders.contains_key(id));
    }

    fn route(&self, frame_msg: FrameMsg, frames_senders: &SenderMap, detect_senders: &SenderMap) {
        METER.tick_received();
        let id = hashed(&frame_msg.id);

        if let Some(sender) = frames_senders.get(&id) {
            sender.send(as_jpeg_stream_item(&frame_msg.data)).ok();
        }

        if let Some(sender) = detect_senders.get(&id) {
            match self.infer_tx.try_send_ref() {
                Ok(mut job) => {
                    job.stream_id = id;
                    job.jpeg.clear();
                    job.jpeg.extend_from_slice(&frame_msg.data);
                    job.reply_tx = Some(sender.clone());
                }
                Err(_) => {
                    METER.tick_dropped();
                    log::debug!("Inferer busy, dropping frame of {}", &frame_msg.id);
                }
            }
        }
    }

    /// Subscribe to the raw frames of a stream.
    pub fn get_frames_receiver(&self, name: &str) -> BroadcastReceiver {
        subscribe(&self.frames_broadcast_map, hashed(name))
    }

    /// Subscribe to the annotated frames of a stream.
    pub fn get_detect_receiver(&self, name: &str) -> BroadcastReceiver {
        subscribe(&self.detect_broadcast_map, hashed(name))
    }

    pub fn store_detections(&self, stream_id: u64, detections: Vec<Detection>) {
        locked(&self.latest_detections).insert(stream_id, detections);
    }

    /// Detections of the most recent inferred frame of a stream.
    ///
    /// Empty while the annotated stream has no subscribers, since frames of
    /// unwatched streams are not inferred.
    pub fn latest_detections(&self, name: &str) -> Vec<Detection> {
        let id = hashed(name);
        let watched = locked(&self.detect_broadcast_map)
            .get(&id)
            .map_or(false, |sender| sender.receiver_count() > 0);
        if !watched {
            return Vec::new();
        }

        locked(&self.latest_detections)
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }
}

fn subscribe(map: &Mutex<SenderMap>, id: u64) -> BroadcastReceiver {
    let mut map = locked(map);

    if let Some(tx) = map.get(&id) {
        tx.subscribe()
    } else {
        let (tx, rx) = broadcast_channel();
        map.insert(id, tx);

        rx
    }
}

/// Drop subscriptions without receivers and mirror the rest into `local`.
fn refresh_senders(shared: &Mutex<SenderMap>, local: &mut SenderMap) {
    let mut shared = locked(shared);
    shared.retain(|_id, sender| sender.receiver_count() > 0);

    for (id, sender) in shared.iter() {
        local.entry(*id).or_insert_with(|| sender.clone());
    }
    local.retain(|id, _sender| shared.contains_key(id));
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{frames_channel, infer_jobs_channel};

    fn frame_bytes(name: &str, data: &[u8]) -> Vec<u8> {
        ProtoMsg::FrameMsg(FrameMsg::new(name.into(), data.to_vec()))
            .serialize()
            .expect("serialize frame")
    }

    #[tokio::test]
    async fn test_frames_reach_subscribers_and_inferer() -> Result<()> {
        let (infer_tx, infer_rx) = infer_jobs_channel();
        let (frames_tx, frames_rx) = frames_channel();
        let router = Arc::new(FrameRouter::new(infer_tx));

        let mut raw_rx = router.get_frames_receiver("kitchen");
        let _detect_rx = router.get_detect_receiver("kitchen");

        let handle = {
            let router = router.clone();
            tokio::spawn(async move { router.run(frames_rx).await })
        };

        frames_tx.send(vec![0xde, 0xad]).await?;
        frames_tx.send(frame_bytes("kitchen", &[1, 2, 3])).await?;
        drop(frames_tx);

        let item = raw_rx.recv().await?;
        assert_eq!(item, as_jpeg_stream_item(&[1, 2, 3]));

        let job = infer_rx.recv().await.expect("infer job");
        assert_eq!(job.stream_id, hashed("kitchen"));
        assert_eq!(job.jpeg, vec![1, 2, 3]);
        assert!(job.reply_tx.is_some());

        // The router stops once the sender side is gone
        assert!(handle.await?.is_err());

        Ok(())
    }

    #[tokio::test]
    async fn test_unwatched_streams_are_not_inferred() -> Result<()> {
        let (infer_tx, infer_rx) = infer_jobs_channel();
        let (frames_tx, frames_rx) = frames_channel();
        let router = FrameRouter::new(infer_tx);

        let mut raw_rx = router.get_frames_receiver("garage");

        frames_tx.send(frame_bytes("garage", &[9])).await?;
        drop(frames_tx);
        assert!(router.run(frames_rx).await.is_err());

        assert_eq!(raw_rx.recv().await?, as_jpeg_stream_item(&[9]));
        let pending = tokio::time::timeout(Duration::from_millis(50), infer_rx.recv()).await;
        assert!(pending.is_err());

        Ok(())
    }

    fn person() -> Detection {
        Detection {
            class_id: 1,
            label: "person".into(),
            score: 0.9,
            bbox: Default::default(),
        }
    }

    #[test]
    fn test_latest_detections() {
        let (infer_tx, _infer_rx) = infer_jobs_channel();
        let router = FrameRouter::new(infer_tx);
        let _detect_rx = router.get_detect_receiver("kitchen");

        assert!(router.latest_detections("kitchen").is_empty());

        router.store_detections(hashed("kitchen"), vec![person()]);

        assert_eq!(router.latest_detections("kitchen"), vec![person()]);
        assert!(router.latest_detections("garage").is_empty());
    }

    #[test]
    fn test_detections_expire_with_last_viewer() {
        let (infer_tx, _infer_rx) = infer_jobs_channel();
        let router = FrameRouter::new(infer_tx);
        let mut frames_senders = HashMap::new();
        let mut detect_senders = HashMap::new();

        let detect_rx = router.get_detect_receiver("kitchen");
        router.refresh(&mut frames_senders, &mut detect_senders);
        router.store_detections(hashed("kitchen"), vec![person()]);
        assert_eq!(router.latest_detections("kitchen"), vec![person()]);

        drop(detect_rx);
        assert!(router.latest_detections("kitchen").is_empty());

        router.refresh(&mut frames_senders, &mut detect_senders);
        assert!(detect_senders.is_empty());
        assert!(locked(&router.latest_detections).is_empty());

        // A new viewer does not see the detections of the previous one
        let _detect_rx = router.get_detect_receiver("kitchen");
        assert!(router.latest_detections("kitchen").is_empty());
    }

    #[test]
    fn test_refresh_prunes_dropped_subscribers() {
        let shared = Mutex::new(HashMap::new());
        let mut local = HashMap::new();

        let rx = subscribe(&shared, 1);
        refresh_senders(&shared, &mut local);
        assert!(local.contains_key(&1));

        drop(rx);
        refresh_senders(&shared, &mut local);
        assert!(local.is_empty());
        assert!(locked(&shared).is_empty());
    }
}
