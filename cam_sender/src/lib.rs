//! Push webcam frames to the detection server.
pub mod sensors;
