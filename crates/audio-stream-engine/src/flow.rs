//! Sliding-window flow control for `NEXT` requests.

/// Bounds outstanding chunk requests and the decoded-but-unplayed backlog.
///
/// `in_flight` counts requests sent minus decode completions (success or failure) observed.
#[derive(Debug, Clone)]
pub struct FlowController {
    watermark: usize,
    playahead: usize,
    in_flight: usize,
}

impl FlowController {
    pub fn new(watermark: usize, playahead: usize) -> Self {
        Self {
            watermark,
            playahead,
            in_flight: 0,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn watermark(&self) -> usize {
        self.watermark
    }

    /// Whether a tick may issue one more request given the current unplayed `backlog`.
    ///
    /// The in-flight check is strict so a granted request never lifts `in_flight` above the
    /// watermark.
    pub fn can_request(&self, backlog: usize) -> bool {
        self.in_flight < self.watermark && backlog <= self.playahead
    }

    /// Claim one request slot. Returns `false` (and changes nothing) when the window is full.
    pub fn try_acquire(&mut self, backlog: usize) -> bool {
        if !self.can_request(backlog) {
            return false;
        }
        self.in_flight += 1;
        true
    }

    /// Release one slot after a decode completion or failure.
    ///
    /// Saturates at zero so unsolicited chunks can never drive the count negative.
    pub fn release(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    pub fn reset(&mut self) {
        self.in_flight = 0;
    }
}
