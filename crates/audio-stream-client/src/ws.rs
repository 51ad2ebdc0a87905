//! WebSocket transport channel.
//!
//! One I/O thread owns the socket. It alternates between flushing queued outbound control
//! messages and reading inbound frames with a short read timeout, and turns whatever arrives
//! into [`EngineEvent`]s for the event loop.

use std::net::TcpStream;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use audio_stream_engine::EngineEvent;
use audio_stream_engine::channel::TextFrameSink;

/// How long a socket read may block before outbound messages get a turn.
const READ_TIMEOUT: Duration = Duration::from_millis(10);

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// Handle to the socket I/O thread.
pub struct WsChannel {
    handle: JoinHandle<()>,
}

impl WsChannel {
    /// Wait for the I/O thread to flush and close the socket.
    ///
    /// The thread exits once every [`TextFrameSink`] clone is dropped or the socket dies.
    pub fn join(self) {
        if self.handle.join().is_err() {
            tracing::warn!("websocket thread panicked");
        }
    }
}

/// Connect to `url` and start the I/O thread.
///
/// Returns the outbound sink for the engine plus the thread handle.
pub fn connect(url: &str, events: Sender<EngineEvent>) -> Result<(TextFrameSink, WsChannel)> {
    let (socket, response) =
        tungstenite::connect(url).with_context(|| format!("connect {url}"))?;
    tracing::info!(url, status = %response.status(), "websocket connected");
    set_read_timeout(&socket, READ_TIMEOUT).context("set socket read timeout")?;

    let (out_tx, out_rx) = crossbeam_channel::unbounded::<String>();
    let handle = thread::Builder::new()
        .name("ws-io".to_string())
        .spawn(move || io_thread_main(socket, out_rx, events))
        .context("spawn websocket thread")?;
    Ok((TextFrameSink::new(out_tx), WsChannel { handle }))
}

fn set_read_timeout(socket: &Socket, timeout: Duration) -> std::io::Result<()> {
    match socket.get_ref() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(Some(timeout)),
        MaybeTlsStream::Rustls(stream) => stream.get_ref().set_read_timeout(Some(timeout)),
        _ => Ok(()),
    }
}

fn io_thread_main(mut socket: Socket, outbound: Receiver<String>, events: Sender<EngineEvent>) {
    let lost = |reason: String| {
        tracing::warn!(%reason, "websocket closed");
        let _ = events.send(EngineEvent::ChannelLost(reason));
    };

    loop {
        loop {
            match outbound.try_recv() {
                Ok(text) => {
                    if let Err(e) = socket.send(Message::text(text)) {
                        lost(format!("send: {e}"));
                        return;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::debug!("control sink dropped; closing websocket");
                    let _ = socket.close(None);
                    let _ = socket.flush();
                    return;
                }
            }
        }

        match socket.read() {
            Ok(message) => match classify(message) {
                Inbound::Event(event) => {
                    if events.send(event).is_err() {
                        let _ = socket.close(None);
                        let _ = socket.flush();
                        return;
                    }
                }
                Inbound::Closed(reason) => {
                    lost(reason);
                    return;
                }
                Inbound::Ignored => {}
            },
            Err(e) if is_timeout(&e) => {}
            Err(e) => {
                lost(format!("read: {e}"));
                return;
            }
        }
    }
}

#[derive(Debug)]
enum Inbound {
    Event(EngineEvent),
    Closed(String),
    Ignored,
}

fn classify(message: Message) -> Inbound {
    match message {
        Message::Binary(bytes) => Inbound::Event(EngineEvent::Binary(bytes.to_vec())),
        Message::Text(text) => Inbound::Event(EngineEvent::Control(text.as_str().to_string())),
        Message::Close(frame) => Inbound::Closed(match frame {
            Some(frame) if !frame.reason.is_empty() => {
                format!(
                    "server closed: {} ({})",
                    frame.reason.as_str(),
                    u16::from(frame.code)
                )
            }
            Some(frame) => format!("server closed ({})", u16::from(frame.code)),
            None => "server closed".to_string(),
        }),
        // Pings are answered by tungstenite on the next read or write.
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Inbound::Ignored,
    }
}

fn is_timeout(err: &tungstenite::Error) -> bool {
    matches!(
        err,
        tungstenite::Error::Io(e)
            if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut)
    )
}

#[cfg(test)]
mod tests {
    use tungstenite::protocol::CloseFrame;
    use tungstenite::protocol::frame::coding::CloseCode;

    use super::*;

    #[test]
    fn binary_frames_become_chunks() {
        match classify(Message::binary(vec![1u8, 2, 3])) {
            Inbound::Event(EngineEvent::Binary(bytes)) => assert_eq!(bytes, vec![1, 2, 3]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn text_frames_become_control_messages() {
        match classify(Message::text(r#"{"command":"GET"}"#)) {
            Inbound::Event(EngineEvent::Control(text)) => assert_eq!(text, r#"{"command":"GET"}"#),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn close_frame_reports_reason() {
        let frame = CloseFrame {
            code: CloseCode::Away,
            reason: "shutting down".into(),
        };
        match classify(Message::Close(Some(frame))) {
            Inbound::Closed(reason) => assert!(reason.contains("shutting down")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(classify(Message::Close(None)), Inbound::Closed(_)));
    }

    #[test]
    fn pings_are_ignored() {
        assert!(matches!(
            classify(Message::Ping(Default::default())),
            Inbound::Ignored
        ));
    }

    #[test]
    fn timeouts_are_not_channel_loss() {
        let timeout = tungstenite::Error::Io(std::io::ErrorKind::WouldBlock.into());
        assert!(is_timeout(&timeout));
        let reset = tungstenite::Error::Io(std::io::ErrorKind::ConnectionReset.into());
        assert!(!is_timeout(&reset));
        assert!(!is_timeout(&tungstenite::Error::ConnectionClosed));
    }
}
