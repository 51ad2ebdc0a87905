pub mod channel;
pub mod config;
pub mod decode;
pub mod device;
pub mod engine;
pub mod error;
pub mod event;
pub mod flow;
pub mod pipeline;
pub mod playback;
pub mod progress;
pub mod queue;
pub mod resample;
pub mod transport;

pub use engine::StreamEngine;
pub use error::{DecodeError, EngineError};
pub use event::EngineEvent;
