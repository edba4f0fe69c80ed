//! Protocol definition for the frame socket.
//!
use serde::{Deserialize, Serialize};

/// Messages sent by a camera to the data socket.
#[derive(Debug, Deserialize, Serialize)]
pub enum ProtoMsg {
    FrameMsg(FrameMsg),
}

/// A single JPEG encoded camera frame, tagged with the name of its stream.
#[derive(Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FrameMsg {
    pub id: String,
    pub data: Vec<u8>,
}

impl FrameMsg {
    pub fn new(id: String, data: Vec<u8>) -> Self {
        Self { id, data }
    }
}

impl ProtoMsg {
    pub fn serialize(&self) -> Result<Vec<u8>, Box<bincode::ErrorKind>> {
        bincode::serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, Box<bincode::ErrorKind>> {
        bincode::deserialize(bytes)
    }
}

#[cfg(test)]
mod test {

    use super::*;
    use crate::Error;

    #[test]
    fn test_frame_msg_through_proto() -> Result<(), Error> {
        let msg = ProtoMsg::FrameMsg(FrameMsg::new("kitchen".into(), vec![0xff, 0xd8, 0xff]));

        let serialized = msg.serialize()?;
        let ProtoMsg::FrameMsg(frame_msg) = ProtoMsg::deserialize(&serialized)?;

        assert_eq!(frame_msg.id, "kitchen");
        assert_eq!(frame_msg.data, vec![0xff, 0xd8, 0xff]);

        Ok(())
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(ProtoMsg::deserialize(&[0x07, 0x00]).is_err());
    }
}
