//! Messages delivered onto the engine's event loop.
//!
//! Every asynchronous producer (channel reader, decoder workers, audio callback) talks to the
//! engine only through [`EngineEvent`]s on one crossbeam channel, so engine state is touched
//! from a single thread.

use crossbeam_channel::Sender;

use crate::decode::DecodedBuffer;
use crate::error::DecodeError;

#[derive(Debug)]
pub enum EngineEvent {
    /// One opaque audio chunk from the transport channel.
    Binary(Vec<u8>),
    /// One JSON control message from the transport channel.
    Control(String),
    /// The transport channel closed or failed.
    ChannelLost(String),
    /// A decode job finished (successfully or not).
    Decoded(DecodeCompletion),
    /// A scheduled buffer finished playing on the hardware clock.
    BufferEnded { generation: u64 },
}

/// Result of one decode job, tagged with the session it was submitted for.
#[derive(Debug)]
pub struct DecodeCompletion {
    pub generation: u64,
    /// Arrival order of the chunk within its session.
    pub seq: u64,
    pub result: Result<DecodedBuffer, DecodeError>,
}

/// Posts end-of-buffer notifications for one playback session.
///
/// Cloned into the audio callback; sending never blocks.
#[derive(Clone, Debug)]
pub struct BufferEndNotifier {
    tx: Sender<EngineEvent>,
    generation: u64,
}

impl BufferEndNotifier {
    pub fn new(tx: Sender<EngineEvent>, generation: u64) -> Self {
        Self { tx, generation }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn notify(&self) {
        let _ = self.tx.send(EngineEvent::BufferEnded {
            generation: self.generation,
        });
    }
}
