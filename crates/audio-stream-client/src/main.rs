//! audio-stream: plays audio streamed chunk-by-chunk from a WebSocket server.
//!
//! ## Pipeline
//! 1. **Request**: the client asks for a source (`STREAM` + `GET`) and then pulls chunks one
//!    `NEXT` at a time, keeping at most a watermark of requests outstanding.
//! 2. **Decode**: each binary chunk is decoded independently by a Symphonia worker and
//!    resampled with Rubato to the output rate.
//! 3. **Playback**: decoded buffers are scheduled back-to-back on the CPAL output clock.
//!
//! Console commands on stdin: `p` pause/resume, `s` stop, `r` restart, `q` quit.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use audio_stream_client::cli::{Args, Command};
use audio_stream_client::config::{ClientConfig, FileConfig};
use audio_stream_client::runtime::{self, PlayRequest};

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "info,audio_stream=info,audio_stream_client=info,audio_stream_engine=info",
            )
        }))
        .init();

    match &args.cmd {
        Command::ListDevices => runtime::list_devices(),
        Command::Play { source, query } => {
            let file = match args.config.as_deref() {
                Some(path) => FileConfig::load(path)?,
                None => FileConfig::default(),
            };
            let config = ClientConfig::resolve(&args, file)?;
            tracing::info!(url = %config.url, source = %source, "audio-stream starting");
            runtime::run_play(
                config,
                PlayRequest {
                    source: source.clone(),
                    query: query.clone(),
                },
            )
        }
    }
}
