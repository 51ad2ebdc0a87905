use std::time::Duration;

/// Engine tuning parameters shared by the flow controller, pipeline and timers.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Max chunk requests outstanding (requested, not yet decoded or failed).
    pub watermark: usize,
    /// Decoded buffers held back before the first drain.
    pub cold_start_buffers: usize,
    /// Delay added to the clock time for the first buffer of a session.
    pub lead_in: Duration,
    /// Max decoded-but-unplayed buffers before `NEXT` requests pause.
    pub playahead_buffers: usize,
    /// Flow-control tick cadence.
    pub flow_tick: Duration,
    /// Progress tick cadence (one elapsed second per tick).
    pub progress_tick: Duration,
    /// Decoder worker threads.
    pub decode_workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            watermark: 10,
            cold_start_buffers: 2,
            lead_in: Duration::from_millis(50),
            playahead_buffers: 10,
            flow_tick: Duration::from_millis(20),
            progress_tick: Duration::from_secs(1),
            decode_workers: 2,
        }
    }
}

/// Output device selection for the hardware playback clock.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutputConfig {
    /// Substring match against output device names; default device when unset.
    pub device: Option<String>,
    /// Preferred stream sample rate; highest supported when unset.
    pub sample_rate: Option<u32>,
    /// Preferred callback buffer size in frames.
    pub buffer_frames: Option<u32>,
}
