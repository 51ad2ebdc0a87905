//! Hardware playback clock (CPAL output stream).
//!
//! A [`PlaybackClock`] accepts decoded buffers together with an absolute start time on its
//! own clock and plays them back-to-back. The CPAL implementation keeps the schedule in a
//! small shared queue; the real-time callback:
//! - renders the head buffer once the clock reaches its start frame, silence otherwise
//! - applies basic channel mapping (mono↔stereo, best-effort otherwise)
//! - converts `f32` samples to the device sample format
//! - posts an end-of-buffer notification when a buffer has been fully rendered

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use cpal::traits::{DeviceTrait, StreamTrait};

use crate::config::OutputConfig;
use crate::decode::DecodedBuffer;
use crate::device;
use crate::error::EngineError;
use crate::event::BufferEndNotifier;

/// One session's hardware clock plus its playback schedule.
pub trait PlaybackClock {
    /// Seconds of audio rendered since the clock was opened (frozen while suspended).
    fn current_time(&self) -> f64;
    /// Sample rate buffers must be decoded to.
    fn sample_rate(&self) -> u32;
    /// Play `buffer` starting at `start_at` seconds on this clock.
    fn schedule(&mut self, buffer: DecodedBuffer, start_at: f64) -> Result<(), EngineError>;
    /// Freeze audible time; scheduled buffers stay scheduled.
    fn suspend(&mut self) -> Result<(), EngineError>;
    fn resume(&mut self) -> Result<(), EngineError>;
    /// Release the underlying resource. Safe to call more than once.
    fn close(&mut self);
}

/// Factory for per-session playback clocks.
pub trait AudioOutput {
    type Clock: PlaybackClock;

    /// Open a fresh clock, initially suspended.
    fn open(&mut self, notifier: BufferEndNotifier) -> Result<Self::Clock, EngineError>;
}

/// CPAL-backed audio output.
pub struct CpalOutput {
    device: cpal::Device,
    config: cpal::SupportedStreamConfig,
    stream_config: cpal::StreamConfig,
    device_name: String,
}

impl CpalOutput {
    /// Resolve the output device and stream config.
    ///
    /// Any failure here means this host cannot play audio at all.
    pub fn new(cfg: &OutputConfig) -> Result<Self, EngineError> {
        let unsupported = |e: anyhow::Error| EngineError::UnsupportedAudioApi(format!("{e:#}"));
        let host = cpal::default_host();
        let device = device::pick_device(&host, cfg.device.as_deref()).map_err(unsupported)?;
        let config = device::pick_output_config(&device, cfg.sample_rate).map_err(unsupported)?;
        let mut stream_config: cpal::StreamConfig = config.clone().into();
        if let Some(buf) = device::pick_buffer_size(&config, cfg.buffer_frames) {
            stream_config.buffer_size = buf;
        }
        let device_name = device
            .description()
            .map(|d| d.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        tracing::info!(
            device = %device_name,
            rate_hz = stream_config.sample_rate,
            channels = stream_config.channels,
            sample_format = ?config.sample_format(),
            buffer_size = ?stream_config.buffer_size,
            "output device"
        );
        Ok(Self {
            device,
            config,
            stream_config,
            device_name,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl AudioOutput for CpalOutput {
    type Clock = CpalClock;

    fn open(&mut self, notifier: BufferEndNotifier) -> Result<CpalClock, EngineError> {
        let schedule = Arc::new(Mutex::new(Schedule::default()));
        let position = Arc::new(AtomicU64::new(0));
        let stream = build_output_stream(
            &self.device,
            &self.stream_config,
            self.config.sample_format(),
            schedule.clone(),
            position.clone(),
            notifier,
        )
        .map_err(|e| EngineError::Output(format!("{e:#}")))?;
        // Some backends start streams on creation.
        let _ = stream.pause();
        Ok(CpalClock {
            stream: Some(stream),
            schedule,
            position,
            sample_rate: self.stream_config.sample_rate,
        })
    }
}

/// A live CPAL output stream acting as the session's playback clock.
pub struct CpalClock {
    stream: Option<cpal::Stream>,
    schedule: Arc<Mutex<Schedule>>,
    position: Arc<AtomicU64>,
    sample_rate: u32,
}

impl PlaybackClock for CpalClock {
    fn current_time(&self) -> f64 {
        frames_to_secs(self.position.load(Ordering::Relaxed), self.sample_rate)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn schedule(&mut self, buffer: DecodedBuffer, start_at: f64) -> Result<(), EngineError> {
        if self.stream.is_none() {
            return Err(EngineError::Output("clock is closed".to_string()));
        }
        if buffer.sample_rate() != self.sample_rate {
            tracing::warn!(
                buffer_rate_hz = buffer.sample_rate(),
                clock_rate_hz = self.sample_rate,
                "buffer rate differs from clock rate"
            );
        }
        let start_frame = secs_to_frames(start_at, self.sample_rate);
        let mut schedule = self
            .schedule
            .lock()
            .map_err(|_| EngineError::Output("schedule lock poisoned".to_string()))?;
        schedule.push(buffer, start_frame);
        Ok(())
    }

    fn suspend(&mut self) -> Result<(), EngineError> {
        match &self.stream {
            Some(stream) => stream
                .pause()
                .map_err(|e| EngineError::Output(format!("pause stream: {e}"))),
            None => Ok(()),
        }
    }

    fn resume(&mut self) -> Result<(), EngineError> {
        match &self.stream {
            Some(stream) => stream
                .play()
                .map_err(|e| EngineError::Output(format!("play stream: {e}"))),
            None => Ok(()),
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
            drop(stream);
            if let Ok(mut schedule) = self.schedule.lock() {
                schedule.clear();
            }
        }
    }
}

impl Drop for CpalClock {
    fn drop(&mut self) {
        self.close();
    }
}

/// Buffers waiting for (or currently in) playback, ordered by start frame.
#[derive(Debug, Default)]
struct Schedule {
    queue: VecDeque<ScheduledBuffer>,
    last_end_frame: Option<u64>,
}

#[derive(Debug)]
struct ScheduledBuffer {
    start_frame: u64,
    buffer: DecodedBuffer,
    /// Frames already rendered.
    pos: usize,
}

impl Schedule {
    /// Queue `buffer` at `start_frame`, snapping to the previous end when the two are within
    /// one frame so rounding never opens a gap.
    fn push(&mut self, buffer: DecodedBuffer, start_frame: u64) -> bool {
        let frames = buffer.frames() as u64;
        if frames == 0 {
            return false;
        }
        let start_frame = match self.last_end_frame {
            Some(end) if start_frame.abs_diff(end) <= 1 => end,
            _ => start_frame,
        };
        self.last_end_frame = Some(start_frame + frames);
        self.queue.push_back(ScheduledBuffer {
            start_frame,
            buffer,
            pos: 0,
        });
        true
    }

    fn clear(&mut self) {
        self.queue.clear();
        self.last_end_frame = None;
    }

    /// Render `frames` output frames starting at clock frame `position`.
    ///
    /// Returns the number of buffers that finished during this call.
    fn render(&mut self, out: &mut [f32], dst_channels: usize, mut position: u64) -> usize {
        let mut finished = 0;
        for frame_out in out.chunks_mut(dst_channels) {
            match self.queue.front_mut() {
                Some(item) if item.start_frame <= position => {
                    let src_channels = item.buffer.channels();
                    let start = item.pos * src_channels;
                    let frame_in = &item.buffer.samples()[start..start + src_channels];
                    for (ch, slot) in frame_out.iter_mut().enumerate() {
                        *slot = map_sample(frame_in, dst_channels, ch);
                    }
                    item.pos += 1;
                    if item.pos >= item.buffer.frames() {
                        self.queue.pop_front();
                        finished += 1;
                    }
                }
                _ => frame_out.fill(0.0),
            }
            position += 1;
        }
        finished
    }
}

/// Build a CPAL output stream rendering `schedule`.
fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    schedule: Arc<Mutex<Schedule>>,
    position: Arc<AtomicU64>,
    notifier: BufferEndNotifier,
) -> anyhow::Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, schedule, position, notifier),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, schedule, position, notifier),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, schedule, position, notifier),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, schedule, position, notifier),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    schedule: Arc<Mutex<Schedule>>,
    position: Arc<AtomicU64>,
    notifier: BufferEndNotifier,
) -> anyhow::Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = (config.channels as usize).max(1);
    let mut scratch: Vec<f32> = Vec::new();
    let generation = notifier.generation();
    let err_fn = move |err| tracing::warn!(generation, "stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let frames = data.len() / channels_out;
            scratch.resize(frames * channels_out, 0.0);

            let pos = position.load(Ordering::Relaxed);
            let finished = match schedule.lock() {
                Ok(mut s) => s.render(&mut scratch, channels_out, pos),
                Err(_) => {
                    scratch.fill(0.0);
                    0
                }
            };
            position.store(pos + frames as u64, Ordering::Relaxed);

            for (dst, src) in data.iter_mut().zip(scratch.iter()) {
                *dst = <T as cpal::Sample>::from_sample::<f32>(*src);
            }
            for _ in 0..finished {
                notifier.notify();
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Read one output sample for `dst_ch` from one interleaved source frame.
///
/// Mapping rules:
/// - mono → stereo: duplicate channel 0
/// - stereo → mono: average L/R
/// - same layout: pass-through
/// - other layouts: clamp to the available channels
fn map_sample(frame: &[f32], dst_channels: usize, dst_ch: usize) -> f32 {
    let src_channels = frame.len();
    if src_channels == 0 {
        return 0.0;
    }
    match (src_channels, dst_channels) {
        (2, 1) => 0.5 * (frame[0] + frame[1]),
        (1, _) => frame[0],
        _ => frame[dst_ch.min(src_channels - 1)],
    }
}

fn secs_to_frames(secs: f64, rate: u32) -> u64 {
    if !secs.is_finite() || secs <= 0.0 {
        return 0;
    }
    (secs * rate as f64).round() as u64
}

fn frames_to_secs(frames: u64, rate: u32) -> f64 {
    if rate == 0 {
        0.0
    } else {
        frames as f64 / rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize, channels: usize, rate: u32) -> DecodedBuffer {
        let samples = (0..frames * channels).map(|i| (i + 1) as f32).collect();
        DecodedBuffer::new(samples, channels, rate)
    }

    #[test]
    fn renders_silence_until_start_frame() {
        let mut s = Schedule::default();
        s.push(ramp(2, 1, 10), 3);
        let mut out = vec![9.0; 6];
        let finished = s.render(&mut out, 1, 0);
        assert_eq!(out, vec![0.0, 0.0, 0.0, 1.0, 2.0, 0.0]);
        assert_eq!(finished, 1);
        assert!(s.queue.is_empty());
    }

    #[test]
    fn contiguous_buffers_render_without_gap() {
        let mut s = Schedule::default();
        s.push(ramp(2, 1, 10), 0);
        s.push(ramp(2, 1, 10), 2);
        let mut out = vec![0.0; 4];
        let finished = s.render(&mut out, 1, 0);
        assert_eq!(out, vec![1.0, 2.0, 1.0, 2.0]);
        assert_eq!(finished, 2);
    }

    #[test]
    fn push_snaps_one_frame_rounding_error() {
        let mut s = Schedule::default();
        s.push(ramp(100, 1, 10), 5);
        s.push(ramp(100, 1, 10), 106);
        assert_eq!(s.queue[1].start_frame, 105);
        s.push(ramp(10, 1, 10), 300);
        assert_eq!(s.queue[2].start_frame, 300);
    }

    #[test]
    fn empty_buffers_are_not_queued() {
        let mut s = Schedule::default();
        assert!(!s.push(DecodedBuffer::new(Vec::new(), 2, 10), 0));
        assert!(s.queue.is_empty());
    }

    #[test]
    fn render_resumes_mid_buffer_across_calls() {
        let mut s = Schedule::default();
        s.push(ramp(3, 2, 10), 0);
        let mut first = vec![0.0; 4];
        assert_eq!(s.render(&mut first, 2, 0), 0);
        assert_eq!(first, vec![1.0, 2.0, 3.0, 4.0]);
        let mut second = vec![0.0; 4];
        assert_eq!(s.render(&mut second, 2, 2), 1);
        assert_eq!(second, vec![5.0, 6.0, 0.0, 0.0]);
    }

    #[test]
    fn map_sample_handles_layouts() {
        assert_eq!(map_sample(&[0.4], 2, 1), 0.4);
        assert_eq!(map_sample(&[0.25, 0.75], 1, 0), 0.5);
        assert_eq!(map_sample(&[0.2, 0.6], 2, 1), 0.6);
        assert_eq!(map_sample(&[0.1, 0.2, 0.3], 6, 5), 0.3);
        assert_eq!(map_sample(&[], 2, 0), 0.0);
    }

    #[test]
    fn time_conversions_round_trip() {
        assert_eq!(secs_to_frames(0.05, 48_000), 2_400);
        assert_eq!(secs_to_frames(-1.0, 48_000), 0);
        assert_eq!(secs_to_frames(f64::NAN, 48_000), 0);
        assert_eq!(frames_to_secs(96_000, 48_000), 2.0);
        assert_eq!(frames_to_secs(10, 0), 0.0);
    }
}
