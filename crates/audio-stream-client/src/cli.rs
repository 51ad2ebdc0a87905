use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "audio-stream", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// TOML config file (CLI flags override its values)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// WebSocket endpoint of the streaming server, e.g. ws://127.0.0.1:5000/stream
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Use a specific output device by substring match
    #[arg(long, global = true)]
    pub device: Option<String>,

    /// Preferred output sample rate in Hz
    #[arg(long, global = true)]
    pub sample_rate: Option<u32>,

    /// Preferred output callback buffer size in frames
    #[arg(long, global = true)]
    pub buffer_frames: Option<u32>,

    /// Print status as JSON lines instead of a progress line
    #[arg(long, global = true)]
    pub json_status: bool,

    /// Max chunk requests outstanding
    #[arg(long, global = true)]
    pub watermark: Option<usize>,

    /// Decoded buffers held back before playback starts
    #[arg(long, global = true)]
    pub cold_start_buffers: Option<usize>,

    /// Delay before the first buffer of a session (ms)
    #[arg(long, global = true)]
    pub lead_in_ms: Option<u64>,

    /// Max decoded-but-unplayed buffers before chunk requests pause
    #[arg(long, global = true)]
    pub playahead_buffers: Option<usize>,

    /// Flow-control tick interval (ms)
    #[arg(long, global = true)]
    pub flow_tick_ms: Option<u64>,

    /// Progress tick interval (ms)
    #[arg(long, global = true)]
    pub progress_tick_ms: Option<u64>,

    /// Decoder worker threads
    #[arg(long, global = true)]
    pub decode_workers: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream and play one audio item from the server
    Play {
        /// Audio item name as known to the server
        source: String,

        /// Optional search query sent along with the stream request
        #[arg(long)]
        query: Option<String>,
    },

    /// List output devices and exit
    ListDevices,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_play_with_query_and_overrides() {
        let args = Args::try_parse_from([
            "audio-stream",
            "play",
            "rain.wav",
            "--query",
            "storm",
            "--watermark",
            "4",
            "--json-status",
        ])
        .unwrap();
        match args.cmd {
            Command::Play { source, query } => {
                assert_eq!(source, "rain.wav");
                assert_eq!(query.as_deref(), Some("storm"));
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(args.watermark, Some(4));
        assert!(args.json_status);
    }

    #[test]
    fn parses_list_devices() {
        let args = Args::try_parse_from(["audio-stream", "list-devices"]).unwrap();
        assert!(matches!(args.cmd, Command::ListDevices));
    }

    #[test]
    fn play_requires_source() {
        assert!(Args::try_parse_from(["audio-stream", "play"]).is_err());
    }
}
