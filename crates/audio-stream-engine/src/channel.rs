//! Outbound half of the transport channel.
//!
//! The inbound half is just [`crate::event::EngineEvent`]s (`Binary`, `Control`,
//! `ChannelLost`) posted by whatever owns the socket.

use audio_stream_types::ControlRequest;

use crate::error::EngineError;

/// Sends JSON control messages to the server.
pub trait ControlSink {
    /// Transmit one request. A dead channel must report [`EngineError::ChannelLost`].
    fn send(&mut self, request: &ControlRequest) -> Result<(), EngineError>;
}

/// Channel-backed sink: serializes requests and hands the text to a socket writer thread.
#[derive(Clone, Debug)]
pub struct TextFrameSink {
    tx: crossbeam_channel::Sender<String>,
}

impl TextFrameSink {
    pub fn new(tx: crossbeam_channel::Sender<String>) -> Self {
        Self { tx }
    }
}

impl ControlSink for TextFrameSink {
    fn send(&mut self, request: &ControlRequest) -> Result<(), EngineError> {
        let text = request
            .to_json()
            .map_err(|e| EngineError::Encode(e.to_string()))?;
        tracing::debug!(message = %text, "control message out");
        self.tx
            .send(text)
            .map_err(|_| EngineError::ChannelLost("socket writer is gone".to_string()))
    }
}
