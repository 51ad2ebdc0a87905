//! Configuration loading and resolution.
//!
//! Values come from three layers: built-in defaults, an optional TOML file, and CLI flags.
//! CLI flags win over the file; the file wins over defaults.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use audio_stream_engine::config::{EngineConfig, OutputConfig};

use crate::cli::Args;

pub const DEFAULT_URL: &str = "ws://127.0.0.1:5000/stream";

/// Client configuration loaded from TOML. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Server WebSocket endpoint.
    pub url: Option<String>,
    /// Output device substring.
    pub device: Option<String>,
    pub sample_rate: Option<u32>,
    pub buffer_frames: Option<u32>,
    pub json_status: Option<bool>,
    pub watermark: Option<usize>,
    pub cold_start_buffers: Option<usize>,
    pub lead_in_ms: Option<u64>,
    pub playahead_buffers: Option<usize>,
    pub flow_tick_ms: Option<u64>,
    pub progress_tick_ms: Option<u64>,
    pub decode_workers: Option<usize>,
}

impl FileConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        toml::from_str::<FileConfig>(&raw).with_context(|| format!("parse config {:?}", path))
    }
}

/// Fully resolved settings for one client run.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub url: String,
    pub json_status: bool,
    pub engine: EngineConfig,
    pub output: OutputConfig,
}

impl ClientConfig {
    /// Merge CLI flags over `file` over defaults.
    pub fn resolve(args: &Args, file: FileConfig) -> Result<Self> {
        let defaults = EngineConfig::default();
        let ms = Duration::from_millis;

        let engine = EngineConfig {
            watermark: args
                .watermark
                .or(file.watermark)
                .unwrap_or(defaults.watermark),
            cold_start_buffers: args
                .cold_start_buffers
                .or(file.cold_start_buffers)
                .unwrap_or(defaults.cold_start_buffers),
            lead_in: args
                .lead_in_ms
                .or(file.lead_in_ms)
                .map(ms)
                .unwrap_or(defaults.lead_in),
            playahead_buffers: args
                .playahead_buffers
                .or(file.playahead_buffers)
                .unwrap_or(defaults.playahead_buffers),
            flow_tick: args
                .flow_tick_ms
                .or(file.flow_tick_ms)
                .map(ms)
                .unwrap_or(defaults.flow_tick),
            progress_tick: args
                .progress_tick_ms
                .or(file.progress_tick_ms)
                .map(ms)
                .unwrap_or(defaults.progress_tick),
            decode_workers: args
                .decode_workers
                .or(file.decode_workers)
                .unwrap_or(defaults.decode_workers),
        };
        if engine.watermark == 0 {
            anyhow::bail!("watermark must be at least 1");
        }
        if engine.flow_tick.is_zero() || engine.progress_tick.is_zero() {
            anyhow::bail!("tick intervals must be non-zero");
        }

        let output = OutputConfig {
            device: normalize_device_name(args.device.clone().or(file.device)),
            sample_rate: args.sample_rate.or(file.sample_rate),
            buffer_frames: args.buffer_frames.or(file.buffer_frames),
        };

        let url = args
            .url
            .clone()
            .or(file.url)
            .unwrap_or_else(|| DEFAULT_URL.to_string());

        Ok(Self {
            url,
            json_status: args.json_status || file.json_status.unwrap_or(false),
            engine,
            output,
        })
    }
}

fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
