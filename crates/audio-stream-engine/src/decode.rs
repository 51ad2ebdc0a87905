//! Chunk decode stage.
//!
//! Uses Symphonia to:
//! - probe one self-contained encoded chunk
//! - decode its packets into interleaved `f32` samples
//! - resample to the playback clock's rate
//!
//! Work runs on a small pool of background threads; completions are posted back to the
//! engine's event loop and may arrive in any order.

use std::io::{Cursor, ErrorKind};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::CodecParameters;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::{
    codecs::DecoderOptions, formats::FormatOptions, io::MediaSourceStream, meta::MetadataOptions,
    probe::Hint,
};

use crate::error::DecodeError;
use crate::event::{DecodeCompletion, EngineEvent};
use crate::resample::{RESAMPLE_CHUNK_FRAMES, resample_interleaved};

/// Interleaved PCM ready to be scheduled on the playback clock.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedBuffer {
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
}

impl DecodedBuffer {
    pub fn new(samples: Vec<f32>, channels: usize, sample_rate: u32) -> Self {
        Self {
            samples,
            channels,
            sample_rate,
        }
    }

    /// Silent buffer lasting `frames` frames.
    pub fn silence(frames: usize, channels: usize, sample_rate: u32) -> Self {
        Self::new(vec![0.0; frames * channels], channels, sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    /// Playback length in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.frames() as f64 / self.sample_rate as f64
        }
    }
}

/// One chunk submitted for decoding.
#[derive(Clone, Debug)]
pub struct DecodeJob {
    pub generation: u64,
    pub seq: u64,
    pub chunk: Vec<u8>,
    /// Container/extension hint, e.g. `wav`.
    pub ext_hint: Option<String>,
    /// Rate of the playback clock the result will be scheduled on.
    pub target_rate: u32,
}

/// Asynchronous chunk decoder.
///
/// `submit` must not block the caller; the result arrives later as
/// [`EngineEvent::Decoded`] on the engine's event channel.
pub trait ChunkDecoder {
    fn submit(&self, job: DecodeJob);
}

/// Symphonia-backed decoder running on background worker threads.
pub struct SymphoniaDecoder {
    job_tx: Sender<DecodeJob>,
}

impl SymphoniaDecoder {
    /// Start `workers` decode threads posting completions to `events`.
    ///
    /// Workers exit once the decoder is dropped or the event loop goes away.
    pub fn spawn(workers: usize, events: Sender<EngineEvent>) -> Self {
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<DecodeJob>();
        for idx in 0..workers.max(1) {
            let jobs = job_rx.clone();
            let events = events.clone();
            thread::Builder::new()
                .name(format!("chunk-decode-{idx}"))
                .spawn(move || decode_worker_main(jobs, events))
                .map_err(|e| tracing::error!("decode worker spawn error: {e}"))
                .ok();
        }
        Self { job_tx }
    }
}

impl ChunkDecoder for SymphoniaDecoder {
    fn submit(&self, job: DecodeJob) {
        if self.job_tx.send(job).is_err() {
            tracing::warn!("decode workers are gone; chunk dropped");
        }
    }
}

fn decode_worker_main(jobs: Receiver<DecodeJob>, events: Sender<EngineEvent>) {
    while let Ok(job) = jobs.recv() {
        let result = decode_chunk(job.chunk, job.ext_hint.as_deref(), job.target_rate);
        let completion = DecodeCompletion {
            generation: job.generation,
            seq: job.seq,
            result,
        };
        if events.send(EngineEvent::Decoded(completion)).is_err() {
            break;
        }
    }
}

/// Decode one self-contained chunk and resample it to `target_rate` (`0` keeps the source rate).
pub fn decode_chunk(
    chunk: Vec<u8>,
    ext_hint: Option<&str>,
    target_rate: u32,
) -> Result<DecodedBuffer, DecodeError> {
    let mut hint = Hint::new();
    if let Some(ext) = ext_hint {
        hint.with_extension(ext);
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(chunk)), Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(DecodeError::Probe)?;
    let mut format = probed.format;

    let track = format.default_track().ok_or(DecodeError::NoTrack)?;
    let track_id = track.id;
    let codec_params: CodecParameters = track.codec_params.clone();
    let channels = codec_params
        .channels
        .ok_or(DecodeError::UnknownFormat)?
        .count();
    let rate = codec_params.sample_rate.ok_or(DecodeError::UnknownFormat)?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(DecodeError::Codec)?;

    let mut samples: Vec<f32> = Vec::new();
    let mut dropped_packets = 0usize;
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => {
                tracing::debug!("chunk read stopped early: {e}");
                break;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(e) => {
                dropped_packets += 1;
                tracing::debug!(ts = packet.ts(), "packet dropped: {e}");
                continue;
            }
        };

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    if samples.len() < channels {
        return Err(DecodeError::Empty);
    }

    tracing::trace!(
        codec = codec_name_from_params(&codec_params).unwrap_or("unknown"),
        channels,
        rate_hz = rate,
        frames = samples.len() / channels,
        dropped_packets,
        "chunk decoded"
    );

    if target_rate == 0 || target_rate == rate {
        return Ok(DecodedBuffer::new(samples, channels, rate));
    }

    let resampled =
        resample_interleaved(&samples, channels, rate, target_rate, RESAMPLE_CHUNK_FRAMES)
            .map_err(|e| DecodeError::Resample(format!("{e:#}")))?;
    if resampled.len() < channels {
        return Err(DecodeError::Empty);
    }
    Ok(DecodedBuffer::new(resampled, channels, target_rate))
}

/// Infer a decoder hint from the source name, e.g. `example.wav` -> `wav`.
pub fn ext_hint_from_source(source: &str) -> Option<String> {
    let tail = source.split('?').next().unwrap_or(source);
    let file = tail.rsplit('/').next().unwrap_or(tail);
    let mut parts = file.rsplit('.');
    let ext = parts.next()?;
    if parts.next().is_some() && !ext.is_empty() {
        Some(ext.to_ascii_lowercase())
    } else {
        None
    }
}

/// Best-effort codec label for logs.
fn codec_name_from_params(params: &CodecParameters) -> Option<&'static str> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_OPUS => "OPUS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name)
}
