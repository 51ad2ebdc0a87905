//! Per-buffer resampling.
//!
//! Uses Rubato to convert one decoded chunk of interleaved `f32` audio from its source rate
//! to the playback clock's rate, so every buffer handed to the clock already matches the
//! device.

use anyhow::{Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

/// Input chunk size in frames for the resampling loop.
pub const RESAMPLE_CHUNK_FRAMES: usize = 1024;

/// Resample interleaved `samples` from `src_rate` to `dst_rate`.
///
/// The output holds exactly `round(frames * dst_rate / src_rate)` frames, aligned with the
/// input: the filter delay is skipped at the head and the tail is flushed out of the filter,
/// so consecutive chunks play back-to-back without padding.
///
/// Returns the input unchanged when the rates already match.
pub fn resample_interleaved(
    samples: &[f32],
    channels: usize,
    src_rate: u32,
    dst_rate: u32,
    chunk_frames: usize,
) -> Result<Vec<f32>> {
    if channels == 0 || src_rate == 0 || dst_rate == 0 {
        return Err(anyhow!(
            "invalid resample spec: channels={channels} src={src_rate} dst={dst_rate}"
        ));
    }
    if src_rate == dst_rate {
        return Ok(samples.to_vec());
    }

    let f_ratio = dst_rate as f64 / src_rate as f64;

    let sinc_len = 128;
    let oversampling_factor = 256;
    let interpolation = SincInterpolationType::Cubic;
    let window = WindowFunction::BlackmanHarris2;
    let f_cutoff = calculate_cutoff(sinc_len, window);

    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff,
        interpolation,
        oversampling_factor,
        window,
    };

    let chunk_in_frames = chunk_frames.max(1);
    let mut resampler = Async::<f32>::new_sinc(
        f_ratio,
        1.1,
        &params,
        chunk_in_frames,
        channels,
        FixedAsync::Input,
    )
    .map_err(|e| anyhow!("resampler init error: {e}"))?;

    let total_frames = samples.len() / channels;
    let expected_frames = expected_output_frames(total_frames, f_ratio);
    let delay_frames = resampler.output_delay();
    let wanted_frames = delay_frames + expected_frames;

    let out_capacity_frames = output_capacity_frames(chunk_in_frames, f_ratio);
    let mut out_interleaved = vec![0.0f32; channels * out_capacity_frames];
    let mut out = Vec::with_capacity(wanted_frames * channels);
    let silence = vec![0.0f32; chunk_in_frames * channels];

    let mut indexing = Indexing {
        input_offset: 0,
        output_offset: 0,
        active_channels_mask: None,
        partial_len: None,
    };

    let mut offset_frames = 0usize;
    let mut flush_blocks = 0usize;
    while out.len() < wanted_frames * channels {
        let (input, take) = if offset_frames < total_frames {
            let take = chunk_in_frames.min(total_frames - offset_frames);
            let start = offset_frames * channels;
            (&samples[start..start + take * channels], take)
        } else {
            // Input exhausted: push zeros through to drain the filter tail.
            flush_blocks += 1;
            if flush_blocks > MAX_FLUSH_BLOCKS {
                break;
            }
            (&silence[..], 0)
        };
        let input_frames = input.len() / channels;

        let input_adapter = InterleavedSlice::new(input, channels, input_frames)
            .map_err(|e| anyhow!("interleaved slice (input) error: {e}"))?;
        let mut output_adapter =
            InterleavedSlice::new_mut(&mut out_interleaved, channels, out_capacity_frames)
                .map_err(|e| anyhow!("interleaved slice (output) error: {e}"))?;

        indexing.input_offset = 0;
        indexing.output_offset = 0;
        indexing.partial_len = if take < chunk_in_frames { Some(take) } else { None };

        let (_nbr_in, nbr_out) = resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
            .map_err(|e| anyhow!("resampler process error: {e}"))?;

        out.extend_from_slice(&out_interleaved[..nbr_out * channels]);
        offset_frames += take;
    }

    let head = (delay_frames * channels).min(out.len());
    out.drain(..head);
    out.resize(expected_frames * channels, 0.0);
    Ok(out)
}

/// Upper bound on zero blocks pushed after the input to drain the filter.
const MAX_FLUSH_BLOCKS: usize = 8;

/// Output length in frames for `input_frames` at `f_ratio`.
fn expected_output_frames(input_frames: usize, f_ratio: f64) -> usize {
    (input_frames as f64 * f_ratio).round() as usize
}

fn output_capacity_frames(chunk_in_frames: usize, f_ratio: f64) -> usize {
    let scaled = (chunk_in_frames as f64 * f_ratio * 1.1).ceil() as usize;
    scaled.max(chunk_in_frames * 3) + 64
}
