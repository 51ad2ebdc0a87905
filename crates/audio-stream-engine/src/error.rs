//! Engine error taxonomy.
//!
//! Recoverable kinds (`DecodeFailure`, `MalformedControlMessage`, `StaleCompletion`, `Encode`)
//! are absorbed inside the engine and only logged. `ChannelLost` and `UnsupportedAudioApi` are
//! terminal and reach the caller exactly once.

use thiserror::Error;

use audio_stream_types::ControlParseError;

/// Why one chunk could not be turned into a playable buffer.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("probe failed: {0}")]
    Probe(#[source] symphonia::core::errors::Error),
    #[error("chunk has no default audio track")]
    NoTrack,
    #[error("chunk does not declare a sample rate or channel layout")]
    UnknownFormat,
    #[error("decoder setup failed: {0}")]
    Codec(#[source] symphonia::core::errors::Error),
    #[error("chunk decoded to zero frames")]
    Empty,
    #[error("resample failed: {0}")]
    Resample(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// The transport channel dropped; the session cannot continue.
    #[error("transport channel lost: {0}")]
    ChannelLost(String),
    /// One chunk failed to decode; it is dropped and the stream continues.
    #[error("chunk {seq} failed to decode: {source}")]
    DecodeFailure {
        seq: u64,
        #[source]
        source: DecodeError,
    },
    /// An inbound control message was not understood and is ignored.
    #[error("malformed control message: {0}")]
    MalformedControlMessage(#[from] ControlParseError),
    /// A decode or playback completion arrived for a session that already ended.
    #[error("stale completion for generation {generation} (current {current})")]
    StaleCompletion { generation: u64, current: u64 },
    /// No usable audio output on this host; the engine never initializes.
    #[error("audio output not supported: {0}")]
    UnsupportedAudioApi(String),
    /// An outbound control message could not be serialized; nothing was sent.
    #[error("control message encode failed: {0}")]
    Encode(String),
    /// The hardware clock could not be opened or driven for this session.
    #[error("audio output error: {0}")]
    Output(String),
}

impl EngineError {
    /// Terminal errors end the engine; everything else is absorbed locally.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::ChannelLost(_) | EngineError::UnsupportedAudioApi(_)
        )
    }
}
