//! Encoder invocation and event processing.

pub mod engine;
pub mod ffmpeg;
pub mod orchestrator;
pub mod parser;
pub mod plan;

pub use engine::{EncodeEngine, EncodeEvent, EncodeHandle, EncodeJob};
pub use ffmpeg::FfmpegEngine;
pub use orchestrator::{EncodeOrchestrator, SubmitRequest, TranscodeAck};
pub use plan::{EncodeSettings, Rendition, RenditionPlan};
