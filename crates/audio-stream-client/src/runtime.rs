//! Client runtime.
//!
//! Wires the WebSocket channel, decoder pool and CPAL output into a [`StreamEngine`] and runs
//! the single-threaded event loop: channel and decoder events, console commands, and the
//! flow-control and progress timers all arrive through one `select!`.

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, select};

use audio_stream_engine::channel::ControlSink;
use audio_stream_engine::decode::{ChunkDecoder, SymphoniaDecoder};
use audio_stream_engine::device;
use audio_stream_engine::playback::{AudioOutput, CpalOutput};
use audio_stream_engine::{EngineError, EngineEvent, StreamEngine};
use audio_stream_types::TransportState;

use crate::config::ClientConfig;
use crate::console::{self, ConsoleCommand, StatusPrinter};
use crate::ws;

/// What to play.
#[derive(Debug, Clone)]
pub struct PlayRequest {
    pub source: String,
    pub query: Option<String>,
}

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host)
}

/// Stream `request` from the configured server until the track ends or the user quits.
pub fn run_play(config: ClientConfig, request: PlayRequest) -> Result<()> {
    let (event_tx, event_rx) = crossbeam_channel::unbounded::<EngineEvent>();
    let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded::<ConsoleCommand>();

    let output = CpalOutput::new(&config.output)?;
    tracing::info!(device = %output.device_name(), "output device");

    let (sink, channel) = ws::connect(&config.url, event_tx.clone())?;
    let decoder = SymphoniaDecoder::spawn(config.engine.decode_workers, event_tx.clone());

    {
        let cmd_tx = cmd_tx.clone();
        ctrlc::set_handler(move || {
            let _ = cmd_tx.send(ConsoleCommand::Quit);
        })
        .context("install ctrl-c handler")?;
    }
    console::spawn_stdin_reader(cmd_tx);

    let mut printer = StatusPrinter::new(config.json_status);
    let mut engine = StreamEngine::new(config.engine.clone(), output, decoder, sink, event_tx);
    let result = run_loop(&mut engine, &event_rx, &cmd_rx, &request, &mut printer);
    printer.finish();

    // Dropping the engine closes the clock and the control sink; the socket thread then
    // flushes any final STOP and closes.
    drop(engine);
    channel.join();
    result
}

/// Drive `engine` until the session ends, the user quits, or a fatal error occurs.
pub fn run_loop<O, D, S>(
    engine: &mut StreamEngine<O, D, S>,
    events: &Receiver<EngineEvent>,
    commands: &Receiver<ConsoleCommand>,
    request: &PlayRequest,
    printer: &mut StatusPrinter,
) -> Result<()>
where
    O: AudioOutput,
    D: ChunkDecoder,
    S: ControlSink,
{
    let flow_tick = crossbeam_channel::tick(engine.config().flow_tick);
    let progress_tick = crossbeam_channel::tick(engine.config().progress_tick);

    engine.start(&request.source, request.query.clone())?;
    printer.report(&engine.status());

    let mut user_stopped = false;
    loop {
        let before = engine.state();
        let step = select! {
            recv(events) -> event => match event {
                Ok(event) => engine.handle_event(event),
                Err(_) => anyhow::bail!("event channel closed"),
            },
            recv(commands) -> cmd => match cmd {
                Ok(ConsoleCommand::Quit) | Err(_) => {
                    tracing::info!("quit");
                    engine.stop()?;
                    return Ok(());
                }
                Ok(cmd) => {
                    user_stopped = matches!(cmd, ConsoleCommand::Stop);
                    apply_command(engine, cmd, request)
                }
            },
            recv(flow_tick) -> _ => engine.flow_tick(),
            recv(progress_tick) -> _ => {
                let ticked = engine.progress_tick();
                printer.report(&engine.status());
                ticked
            },
        };

        if let Err(e) = step {
            if e.is_fatal() {
                printer.report(&engine.status());
                return Err(e.into());
            }
            tracing::warn!("{e}");
        }

        let after = engine.state();
        if after != before {
            tracing::debug!(from = %before, to = %after, "transport");
            printer.report(&engine.status());
        }
        if session_finished(before, after, user_stopped) {
            tracing::info!("playback finished");
            return Ok(());
        }
    }
}

fn apply_command<O, D, S>(
    engine: &mut StreamEngine<O, D, S>,
    cmd: ConsoleCommand,
    request: &PlayRequest,
) -> Result<(), EngineError>
where
    O: AudioOutput,
    D: ChunkDecoder,
    S: ControlSink,
{
    match cmd {
        ConsoleCommand::TogglePause => engine.toggle(&request.source, request.query.clone()),
        ConsoleCommand::Stop => engine.stop(),
        ConsoleCommand::Restart => {
            engine.stop()?;
            engine.start(&request.source, request.query.clone())
        }
        ConsoleCommand::Quit => engine.stop(),
    }
}

/// A session that stops on its own (end of track, scheduling failure) ends the run; a stop
/// the user asked for leaves the client waiting for `r` or `q`.
fn session_finished(before: TransportState, after: TransportState, user_stopped: bool) -> bool {
    before.is_active() && after == TransportState::Stopped && !user_stopped
}
