//! Object detection and question answering servers.
//!
use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use bytes::Bytes;
use tokio::sync::broadcast;

pub mod annotate;
pub mod config;
pub mod data_socket;
pub mod endpoints;
pub mod filter;
pub mod inferer;
pub mod labels;
pub mod meter;
pub mod nn;
pub mod qa;
pub mod router;
pub mod utils;

pub use common::detection::{BoundingBox, Detection};

/// Capacity of the channel between the data socket and the frame router.
pub const INCOMING_FRAMES_CAPACITY: usize = 32;

/// Capacity of the channel between the frame router and the inferer.
///
/// The router drops frames once this many are waiting.
pub const INFER_JOBS_CAPACITY: usize = 2;

pub type BroadcastSender = broadcast::Sender<Bytes>;
pub type BroadcastReceiver = broadcast::Receiver<Bytes>;

/// Raw serialized `ProtoMsg`s as received on the data socket.
pub type FrameSender = thingbuf::mpsc::Sender<Vec<u8>>;
pub type FrameReceiver = thingbuf::mpsc::Receiver<Vec<u8>>;

pub type InferJobSender = thingbuf::mpsc::Sender<InferJob>;
pub type InferJobReceiver = thingbuf::mpsc::Receiver<InferJob>;

/// A frame waiting for inference, together with the stream it belongs to.
#[derive(Clone, Debug, Default)]
pub struct InferJob {
    pub stream_id: u64,
    pub jpeg: Vec<u8>,
    pub reply_tx: Option<BroadcastSender>,
}

pub fn frames_channel() -> (FrameSender, FrameReceiver) {
    thingbuf::mpsc::channel(INCOMING_FRAMES_CAPACITY)
}

pub fn infer_jobs_channel() -> (InferJobSender, InferJobReceiver) {
    thingbuf::mpsc::channel(INFER_JOBS_CAPACITY)
}

pub fn broadcast_channel() -> (BroadcastSender, BroadcastReceiver) {
    broadcast::channel(4)
}

/// Stable id of a stream name.
pub fn hashed(name: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    hasher.finish()
}

/// Wrap a JPEG as one part of a `multipart/x-mixed-replace` stream.
pub fn as_jpeg_stream_item(data: &[u8]) -> Bytes {
    Bytes::copy_from_slice(
        &[
            "--frame\r\nContent-Type: image/jpeg\r\n\r\n".as_bytes(),
            data,
            "\r\n\r\n".as_bytes(),
        ]
        .concat(),
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_stream_item_framing() {
        let item = as_jpeg_stream_item(&[1, 2, 3]);
        assert!(item.starts_with(b"--frame\r\n"));
        assert!(item.ends_with(&[1, 2, 3, b'\r', b'\n', b'\r', b'\n']));
    }

    #[test]
    fn test_hashed_is_stable() {
        assert_eq!(hashed("kitchen"), hashed("kitchen"));
        assert_ne!(hashed("kitchen"), hashed("garage"));
    }
}
