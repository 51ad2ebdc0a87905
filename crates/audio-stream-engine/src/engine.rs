//! The streamed-audio playback engine.
//!
//! [`StreamEngine`] owns every piece of mutable session state (transport state, in-flight
//! count, pipeline, cursor, elapsed seconds) and is driven from a single event loop:
//! - user intent: [`StreamEngine::start`], [`StreamEngine::pause`], [`StreamEngine::resume`],
//!   [`StreamEngine::stop`]
//! - timers: [`StreamEngine::flow_tick`], [`StreamEngine::progress_tick`]
//! - asynchronous completions: [`StreamEngine::handle_event`]
//!
//! Each session gets a fresh generation number. Decode completions and end-of-buffer
//! notifications carry the generation they were issued under; anything from an older
//! generation is discarded without touching state.

use crossbeam_channel::Sender;

use audio_stream_types::{ControlRequest, InboundControl, PlaybackStatus, TrackMetadata};

use crate::channel::ControlSink;
use crate::config::EngineConfig;
use crate::decode::{ChunkDecoder, DecodeJob, ext_hint_from_source};
use crate::error::EngineError;
use crate::event::{BufferEndNotifier, DecodeCompletion, EngineEvent};
use crate::flow::FlowController;
use crate::pipeline::PlaybackPipeline;
use crate::playback::{AudioOutput, PlaybackClock};
use crate::progress::{ProgressClock, TickOutcome};
use crate::transport::{TransportInput, TransportState, transition};

pub struct StreamEngine<O: AudioOutput, D: ChunkDecoder, S: ControlSink> {
    config: EngineConfig,
    output: O,
    decoder: D,
    sink: S,
    events: Sender<EngineEvent>,
    clock: Option<O::Clock>,
    state: TransportState,
    generation: u64,
    next_seq: u64,
    source: Option<String>,
    ext_hint: Option<String>,
    flow: FlowController,
    pipeline: PlaybackPipeline,
    progress: ProgressClock,
    /// The clock has been resumed at least once this session.
    clock_started: bool,
    channel_lost: bool,
}

impl<O: AudioOutput, D: ChunkDecoder, S: ControlSink> StreamEngine<O, D, S> {
    /// `events` is the sender side of the loop's event channel; the engine hands clones to
    /// each session's playback clock for end-of-buffer notifications.
    pub fn new(
        config: EngineConfig,
        output: O,
        decoder: D,
        sink: S,
        events: Sender<EngineEvent>,
    ) -> Self {
        let flow = FlowController::new(config.watermark, config.playahead_buffers);
        let pipeline = PlaybackPipeline::new(config.cold_start_buffers, config.lead_in);
        Self {
            config,
            output,
            decoder,
            sink,
            events,
            clock: None,
            state: TransportState::Idle,
            generation: 0,
            next_seq: 0,
            source: None,
            ext_hint: None,
            flow,
            pipeline,
            progress: ProgressClock::new(),
            clock_started: false,
            channel_lost: false,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn in_flight(&self) -> usize {
        self.flow.in_flight()
    }

    /// Clock time at which the next buffer will start (`0.0` before the first drain).
    pub fn cursor(&self) -> f64 {
        self.pipeline.cursor()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.progress.elapsed()
    }

    pub fn metadata(&self) -> Option<&TrackMetadata> {
        self.progress.metadata()
    }

    /// Whether the channel was lost; the engine ignores all input afterwards.
    pub fn is_terminated(&self) -> bool {
        self.channel_lost
    }

    pub fn status(&self) -> PlaybackStatus {
        PlaybackStatus {
            transport: self.state,
            source: self.source.clone(),
            elapsed_seconds: self.progress.elapsed(),
            total_seconds: self.progress.total(),
            elapsed_display: self.progress.display(),
            progress_fraction: self.progress.fraction(),
            in_flight: self.flow.in_flight(),
            scheduled_buffers: self.pipeline.active_scheduled(),
        }
    }

    /// Begin streaming `source`. Ignored unless the transport is idle.
    pub fn start(&mut self, source: &str, query: Option<String>) -> Result<(), EngineError> {
        if self.channel_lost {
            tracing::warn!("start ignored: transport channel was lost");
            return Ok(());
        }
        let Some(next) = transition(self.state, TransportInput::Start) else {
            tracing::debug!(state = %self.state, "start ignored");
            return Ok(());
        };

        self.generation += 1;
        self.reset_session();

        let notifier = BufferEndNotifier::new(self.events.clone(), self.generation);
        let clock = match self.output.open(notifier) {
            Ok(clock) => clock,
            Err(e) => {
                tracing::error!(error = %e, "could not open playback clock");
                return Err(e);
            }
        };
        self.clock = Some(clock);
        self.source = Some(source.to_string());
        self.ext_hint = ext_hint_from_source(source);
        self.state = next;

        tracing::info!(source, generation = self.generation, "stream start");
        self.send(ControlRequest::stream(source, query))
    }

    /// Suspend the playback clock. Chunk requests stop until resumed.
    pub fn pause(&mut self) -> Result<(), EngineError> {
        let Some(next) = self.legal(TransportInput::Pause) else {
            return Ok(());
        };
        if let Some(clock) = self.clock.as_mut() {
            if let Err(e) = clock.suspend() {
                tracing::warn!(error = %e, "clock suspend failed");
            }
        }
        self.state = next;
        tracing::info!(elapsed = self.progress.elapsed(), "paused");
        Ok(())
    }

    /// Resume the playback clock at the position it was suspended at.
    pub fn resume(&mut self) -> Result<(), EngineError> {
        let Some(next) = self.legal(TransportInput::Resume) else {
            return Ok(());
        };
        if let Some(clock) = self.clock.as_mut() {
            if let Err(e) = clock.resume() {
                tracing::warn!(error = %e, "clock resume failed");
            }
            self.clock_started = true;
        }
        self.state = next;
        tracing::info!(elapsed = self.progress.elapsed(), "resumed");
        Ok(())
    }

    /// Pause when streaming, resume when paused, start `source` when idle.
    pub fn toggle(&mut self, source: &str, query: Option<String>) -> Result<(), EngineError> {
        match self.state {
            TransportState::Idle | TransportState::Stopped => self.start(source, query),
            TransportState::Streaming => self.pause(),
            TransportState::Paused => self.resume(),
        }
    }

    /// Stop the session: close the clock, tell the server, clear all counters.
    ///
    /// A second call is a no-op.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        if self.legal(TransportInput::Stop).is_none() {
            return Ok(());
        }
        tracing::info!(generation = self.generation, "stream stop");
        self.end_session();
        self.send(ControlRequest::stop())
    }

    /// Flow-control tick: request one more chunk if the window allows it.
    pub fn flow_tick(&mut self) -> Result<(), EngineError> {
        if self.channel_lost || self.state != TransportState::Streaming {
            return Ok(());
        }
        if !self.flow.try_acquire(self.pipeline.backlog()) {
            return Ok(());
        }
        let sent = self.send(ControlRequest::next());
        if matches!(sent, Err(EngineError::Encode(_))) {
            self.flow.release();
        }
        sent
    }

    /// Progress tick: advance elapsed seconds and stop at the end of the track.
    pub fn progress_tick(&mut self) -> Result<(), EngineError> {
        if self.channel_lost {
            return Ok(());
        }
        match self.progress.tick(self.state == TransportState::Streaming) {
            TickOutcome::EndOfTrack => {
                if self.legal(TransportInput::EndOfTrack).is_none() {
                    return Ok(());
                }
                tracing::info!(elapsed = self.progress.elapsed(), "end of track");
                self.end_session();
                self.send(ControlRequest::stop())
            }
            TickOutcome::Advanced | TickOutcome::Skipped => Ok(()),
        }
    }

    /// Dispatch one asynchronous event.
    ///
    /// Only fatal errors are returned; recoverable ones are logged and absorbed here.
    pub fn handle_event(&mut self, event: EngineEvent) -> Result<(), EngineError> {
        if self.channel_lost {
            return Ok(());
        }
        match event {
            EngineEvent::Binary(chunk) => {
                self.on_chunk(chunk);
                Ok(())
            }
            EngineEvent::Control(text) => {
                self.on_control(&text);
                Ok(())
            }
            EngineEvent::ChannelLost(reason) => self.lose_channel(reason),
            EngineEvent::Decoded(completion) => self.on_decoded(completion),
            EngineEvent::BufferEnded { generation } => {
                if generation == self.generation && self.state.is_active() {
                    self.pipeline.buffer_ended();
                } else {
                    log_stale(generation, self.generation, "buffer end");
                }
                Ok(())
            }
        }
    }

    fn on_chunk(&mut self, chunk: Vec<u8>) {
        let Some(clock) = self.clock.as_ref().filter(|_| self.state.is_active()) else {
            tracing::debug!(bytes = chunk.len(), "chunk outside a session dropped");
            return;
        };
        let seq = self.next_seq;
        self.next_seq += 1;
        tracing::debug!(seq, bytes = chunk.len(), "chunk in");
        self.decoder.submit(DecodeJob {
            generation: self.generation,
            seq,
            chunk,
            ext_hint: self.ext_hint.clone(),
            target_rate: clock.sample_rate(),
        });
    }

    fn on_control(&mut self, text: &str) {
        match InboundControl::parse(text) {
            Ok(InboundControl::Metadata(metadata)) => {
                if !self.state.is_active() {
                    tracing::debug!("metadata outside a session ignored");
                } else if self.progress.set_metadata(metadata) {
                    tracing::info!(
                        total_secs = self.progress.total(),
                        channels = ?self.progress.metadata().and_then(|m| m.nchannels),
                        framerate = ?self.progress.metadata().and_then(|m| m.framerate),
                        "track metadata"
                    );
                } else {
                    tracing::warn!("duplicate track metadata ignored");
                }
            }
            Ok(InboundControl::Unknown(command)) => {
                tracing::debug!(%command, "unknown control command ignored");
            }
            Err(e) => {
                let err = EngineError::from(e);
                tracing::warn!(error = %err, "control message ignored");
            }
        }
    }

    fn on_decoded(&mut self, completion: DecodeCompletion) -> Result<(), EngineError> {
        let DecodeCompletion {
            generation,
            seq,
            result,
        } = completion;
        if generation != self.generation || !self.state.is_active() {
            log_stale(generation, self.generation, "decode");
            return Ok(());
        }

        self.flow.release();
        let buffer = match result {
            Ok(buffer) => Some(buffer),
            Err(source) => {
                let err = EngineError::DecodeFailure { seq, source };
                tracing::warn!(error = %err, "chunk dropped");
                None
            }
        };

        if self.pipeline.accept(seq, buffer) {
            self.drain()?;
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<(), EngineError> {
        let Some(clock) = self.clock.as_mut() else {
            return Ok(());
        };
        let report = match self.pipeline.drain(clock) {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "scheduling failed; stopping");
                self.end_session();
                self.send(ControlRequest::stop())?;
                return Err(e);
            }
        };
        tracing::debug!(
            scheduled = report.scheduled,
            cursor_secs = report.cursor,
            in_flight = self.flow.in_flight(),
            "drained"
        );

        // One-shot resume per cold start; a user pause wins until the user resumes.
        if report.scheduled > 0 && !self.clock_started && self.state == TransportState::Streaming {
            if let Err(e) = clock.resume() {
                tracing::warn!(error = %e, "clock resume failed");
            }
            self.clock_started = true;
            tracing::info!(cursor_secs = report.cursor, "playback started");
        }
        Ok(())
    }

    fn send(&mut self, request: ControlRequest) -> Result<(), EngineError> {
        match self.sink.send(&request) {
            Ok(()) => Ok(()),
            Err(EngineError::ChannelLost(reason)) => self.lose_channel(reason),
            Err(e) => Err(e),
        }
    }

    /// Tear down locally and surface the loss exactly once.
    fn lose_channel(&mut self, reason: String) -> Result<(), EngineError> {
        if self.channel_lost {
            return Ok(());
        }
        self.channel_lost = true;
        if self.legal(TransportInput::ChannelLost).is_some() {
            self.end_session();
        }
        tracing::error!(%reason, "transport channel lost");
        Err(EngineError::ChannelLost(reason))
    }

    fn legal(&self, input: TransportInput) -> Option<TransportState> {
        let next = transition(self.state, input);
        if next.is_none() {
            tracing::debug!(state = %self.state, ?input, "transition ignored");
        }
        next
    }

    /// Close the clock, clear the session, and move to `Stopped`.
    fn end_session(&mut self) {
        if let Some(mut clock) = self.clock.take() {
            clock.close();
        }
        self.generation += 1;
        self.reset_session();
        self.state = TransportState::Stopped;
    }

    fn reset_session(&mut self) {
        self.flow.reset();
        self.pipeline.reset();
        self.progress.reset();
        self.next_seq = 0;
        self.clock_started = false;
        self.source = None;
        self.ext_hint = None;
    }
}

fn log_stale(generation: u64, current: u64, what: &'static str) {
    let err = EngineError::StaleCompletion {
        generation,
        current,
    };
    tracing::debug!(error = %err, what, "discarded");
}
