use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Commands carried by an outbound control message.
///
/// A single request may carry several commands; the server processes them in order.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Command {
    /// Open `source` on the server and prepare it for chunked delivery.
    Stream,
    /// Ask for track metadata (duration and format info).
    Get,
    /// Ask for the next audio chunk.
    Next,
    /// Close the current stream on the server.
    Stop,
}

/// Outbound JSON control message.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControlRequest {
    /// Audio item to stream (only meaningful with [`Command::Stream`]).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source: Option<String>,
    /// Optional descriptive search query.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub q: Option<String>,
    pub commands: Vec<Command>,
}

impl ControlRequest {
    /// `{source, q?, commands: ["STREAM", "GET"]}`
    pub fn stream(source: impl Into<String>, query: Option<String>) -> Self {
        Self {
            source: Some(source.into()),
            q: query,
            commands: vec![Command::Stream, Command::Get],
        }
    }

    /// `{commands: ["NEXT"]}`
    pub fn next() -> Self {
        Self::only(Command::Next)
    }

    /// `{commands: ["STOP"]}`
    pub fn stop() -> Self {
        Self::only(Command::Stop)
    }

    fn only(command: Command) -> Self {
        Self {
            source: None,
            q: None,
            commands: vec![command],
        }
    }

    /// Serialize to the JSON text sent over the channel.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Total track duration as reported by the server.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackDuration {
    #[serde(default)]
    pub hours: u64,
    /// Older servers spell this key `minuets`.
    #[serde(default, alias = "minuets")]
    pub minutes: u64,
    #[serde(default)]
    pub seconds: u64,
}

impl TrackDuration {
    pub fn total_seconds(&self) -> u64 {
        self.hours
            .saturating_mul(3600)
            .saturating_add(self.minutes.saturating_mul(60))
            .saturating_add(self.seconds)
    }
}

/// Track metadata supplied once per stream by the server's `GET` response.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackMetadata {
    #[serde(default)]
    pub duration: TrackDuration,
    /// Channel count of the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nchannels: Option<u16>,
    /// Sample width in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampwidth: Option<u16>,
    /// Source frame rate in Hz.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framerate: Option<u32>,
    /// Total frame count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comptype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compname: Option<String>,
}

impl TrackMetadata {
    pub fn total_seconds(&self) -> u64 {
        self.duration.total_seconds()
    }
}

/// A parsed inbound JSON control message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundControl {
    /// Response to `GET`.
    Metadata(TrackMetadata),
    /// Any command value this client does not understand.
    Unknown(String),
}

/// Why an inbound text message could not be interpreted.
#[derive(Debug, Error)]
pub enum ControlParseError {
    #[error("control message is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("control message has no string `command` field")]
    MissingCommand,
    #[error("invalid payload for command {command}: {source}")]
    InvalidPayload {
        command: String,
        #[source]
        source: serde_json::Error,
    },
}

impl InboundControl {
    /// Parse one inbound text frame.
    ///
    /// Unknown `command` values parse successfully as [`InboundControl::Unknown`] so callers
    /// can ignore them without treating them as errors.
    pub fn parse(text: &str) -> Result<Self, ControlParseError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(ControlParseError::InvalidJson)?;
        let command = value
            .get("command")
            .and_then(|c| c.as_str())
            .ok_or(ControlParseError::MissingCommand)?
            .to_string();

        match command.as_str() {
            "GET" => serde_json::from_value::<TrackMetadata>(value)
                .map(InboundControl::Metadata)
                .map_err(|source| ControlParseError::InvalidPayload { command, source }),
            _ => Ok(InboundControl::Unknown(command)),
        }
    }
}

/// Playback transport state observed by UIs.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    #[default]
    Idle,
    Streaming,
    Paused,
    Stopped,
}

impl TransportState {
    /// Whether a session (and its hardware clock) is live.
    pub fn is_active(self) -> bool {
        matches!(self, TransportState::Streaming | TransportState::Paused)
    }
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TransportState::Idle => "idle",
            TransportState::Streaming => "streaming",
            TransportState::Paused => "paused",
            TransportState::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// Snapshot emitted by the engine for rendering.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PlaybackStatus {
    pub transport: TransportState,
    /// Audio item of the current session.
    pub source: Option<String>,
    /// Whole seconds counted by the progress clock.
    pub elapsed_seconds: u64,
    /// Track length from metadata, `0` while unknown.
    pub total_seconds: u64,
    /// `elapsed / total`, e.g. `1:05 / 2:05`.
    pub elapsed_display: String,
    /// Completion in `[0, 1]`.
    pub progress_fraction: f64,
    /// Chunk requests not yet answered by a decode completion.
    pub in_flight: usize,
    /// Buffers handed to the playback clock that have not finished playing.
    pub scheduled_buffers: usize,
}
