//! Types shared between `detect_server` and `cam_sender`.
pub mod detection;
pub mod protocol;
pub mod qa;

/// Error type.
pub type Error = Box<dyn std::error::Error>;
