//! Transport state machine.

pub use audio_stream_types::TransportState;

/// Inputs that can move the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportInput {
    Start,
    Pause,
    Resume,
    Stop,
    /// Progress clock reached the track duration.
    EndOfTrack,
    /// Transport channel dropped.
    ChannelLost,
}

/// Target state for `input` in `state`, or `None` when the transition is not legal.
///
/// Illegal transitions are no-ops for the caller, never errors.
pub fn transition(state: TransportState, input: TransportInput) -> Option<TransportState> {
    use TransportInput as I;
    use TransportState as S;

    match (state, input) {
        (S::Idle | S::Stopped, I::Start) => Some(S::Streaming),
        (S::Streaming, I::Pause) => Some(S::Paused),
        (S::Paused, I::Resume) => Some(S::Streaming),
        (S::Streaming | S::Paused, I::Stop | I::EndOfTrack | I::ChannelLost) => Some(S::Stopped),

        (
            S::Idle | S::Stopped,
            I::Pause | I::Resume | I::Stop | I::EndOfTrack | I::ChannelLost,
        ) => None,
        (S::Streaming | S::Paused, I::Start) => None,
        (S::Streaming, I::Resume) => None,
        (S::Paused, I::Pause) => None,
    }
}
