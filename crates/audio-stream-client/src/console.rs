//! Terminal front end: stdin commands in, status lines out.

use std::io::{BufRead, Write};
use std::thread;

use crossbeam_channel::Sender;

use audio_stream_types::{PlaybackStatus, TransportState};

/// Commands accepted by the event loop from the console and signal handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Pause when streaming, resume when paused, start when idle.
    TogglePause,
    Stop,
    /// Stop (if needed) and start the configured source again.
    Restart,
    Quit,
}

/// Map one stdin line to a command. Unknown input yields `None`.
pub fn parse_command(line: &str) -> Option<ConsoleCommand> {
    match line.trim().to_ascii_lowercase().as_str() {
        "p" | "pause" | "resume" => Some(ConsoleCommand::TogglePause),
        "s" | "stop" => Some(ConsoleCommand::Stop),
        "r" | "restart" => Some(ConsoleCommand::Restart),
        "q" | "quit" | "exit" => Some(ConsoleCommand::Quit),
        _ => None,
    }
}

/// Read commands from stdin on a background thread.
///
/// EOF ends the reader without quitting, so piped runs play to the end of the track.
pub fn spawn_stdin_reader(tx: Sender<ConsoleCommand>) {
    let spawned = thread::Builder::new()
        .name("console-input".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Some(cmd) => {
                        if tx.send(cmd).is_err() {
                            break;
                        }
                    }
                    None => eprintln!("commands: p (pause/resume), s (stop), r (restart), q (quit)"),
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!("console reader spawn error: {e}");
    }
}

/// Writes [`PlaybackStatus`] updates to stdout.
#[derive(Debug)]
pub struct StatusPrinter {
    json: bool,
    line_open: bool,
}

impl StatusPrinter {
    pub fn new(json: bool) -> Self {
        Self {
            json,
            line_open: false,
        }
    }

    pub fn report(&mut self, status: &PlaybackStatus) {
        let mut out = std::io::stdout().lock();
        if self.json {
            match serde_json::to_string(status) {
                Ok(line) => {
                    let _ = writeln!(out, "{line}");
                }
                Err(e) => tracing::warn!("status encode error: {e}"),
            }
            return;
        }
        let _ = write!(out, "\r\x1b[2K{}", render_status_line(status));
        let _ = out.flush();
        self.line_open = true;
    }

    /// Terminate the in-place status line, if any.
    pub fn finish(&mut self) {
        if self.line_open {
            println!();
            self.line_open = false;
        }
    }
}

/// One-line human status, e.g. `[streaming] 1:05 / 2:05 [#####-----]  52%  rain.wav`.
pub fn render_status_line(status: &PlaybackStatus) -> String {
    const BAR_WIDTH: usize = 20;
    let filled = ((status.progress_fraction * BAR_WIDTH as f64).round() as usize).min(BAR_WIDTH);
    let bar: String = std::iter::repeat_n('#', filled)
        .chain(std::iter::repeat_n('-', BAR_WIDTH - filled))
        .collect();
    let mut line = format!(
        "[{}] {} [{}] {:>3.0}%",
        status.transport,
        status.elapsed_display,
        bar,
        status.progress_fraction * 100.0
    );
    if let Some(source) = status.source.as_deref() {
        line.push_str("  ");
        line.push_str(source);
    }
    if status.transport == TransportState::Streaming {
        line.push_str(&format!(
            "  (in-flight {}, scheduled {})",
            status.in_flight, status.scheduled_buffers
        ));
    }
    line
}
