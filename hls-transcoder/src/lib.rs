//! HLS ladder transcoder.
//!
//! Encodes an uploaded source into several HLS renditions with an external
//! encoder, publishes each segment to a remote store as soon as it is fully
//! written, and pushes progress to the requesting client over a WebSocket.

pub mod api;
pub mod channel;
pub mod config;
pub mod encoder;
pub mod error;
pub mod logging;
pub mod probe;
pub mod progress;
pub mod publish;
pub mod tracker;
pub mod utils;

pub use error::{Error, Result};
