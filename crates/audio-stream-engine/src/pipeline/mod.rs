//! Playback buffer pipeline: reorder -> FIFO -> zero-gap scheduling on the playback clock.

use std::collections::VecDeque;
use std::time::Duration;

use crate::decode::DecodedBuffer;
use crate::error::EngineError;
use crate::playback::PlaybackClock;
use crate::queue::ReorderQueue;

/// Ordered queue of decoded buffers plus the playback cursor.
///
/// The cursor is the clock time at which the next buffer must start. It is unset at the start
/// of a session and is seeded from the clock (plus lead-in) by the first drain; after that each
/// scheduled buffer advances it by exactly its own duration.
#[derive(Debug)]
pub struct PlaybackPipeline {
    reorder: ReorderQueue,
    queue: VecDeque<DecodedBuffer>,
    cursor: Option<f64>,
    lead_in: f64,
    cold_start_buffers: usize,
    cold_started: bool,
    active_scheduled: usize,
}

/// Result of one drain pass.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct DrainReport {
    pub scheduled: usize,
    /// Cursor value after the pass.
    pub cursor: f64,
}

impl PlaybackPipeline {
    pub fn new(cold_start_buffers: usize, lead_in: Duration) -> Self {
        Self {
            reorder: ReorderQueue::new(),
            queue: VecDeque::new(),
            cursor: None,
            lead_in: lead_in.as_secs_f64(),
            cold_start_buffers,
            cold_started: false,
            active_scheduled: 0,
        }
    }

    /// Accept the decode outcome for chunk `seq` (`None` for a failed decode).
    ///
    /// Returns `true` when the caller should drain: the cold-start threshold has been passed
    /// at least once this session and there is something queued.
    pub fn accept(&mut self, seq: u64, buffer: Option<DecodedBuffer>) -> bool {
        let buffer = buffer.filter(|b| {
            let keep = b.frames() > 0;
            if !keep {
                tracing::debug!(seq, "zero-length buffer dropped");
            }
            keep
        });
        self.reorder.insert(seq, buffer, &mut self.queue);

        if !self.cold_started && self.queue.len() > self.cold_start_buffers {
            self.cold_started = true;
            tracing::debug!(queued = self.queue.len(), "cold start complete");
        }
        self.cold_started && !self.queue.is_empty()
    }

    /// Schedule every queued buffer back-to-back on `clock`.
    ///
    /// Calling it with an empty queue is a no-op. On a scheduling error the failing buffer is
    /// dropped and the error returned; buffers already scheduled stay scheduled.
    pub fn drain<C: PlaybackClock + ?Sized>(
        &mut self,
        clock: &mut C,
    ) -> Result<DrainReport, EngineError> {
        let mut scheduled = 0;
        while let Some(buffer) = self.queue.pop_front() {
            let start = match self.cursor {
                Some(t) => t,
                None => clock.current_time() + self.lead_in,
            };
            let duration = buffer.duration_secs();
            clock.schedule(buffer, start)?;
            self.cursor = Some(start + duration);
            self.active_scheduled += 1;
            scheduled += 1;
        }
        Ok(DrainReport {
            scheduled,
            cursor: self.cursor(),
        })
    }

    /// One scheduled buffer finished playing.
    pub fn buffer_ended(&mut self) {
        self.active_scheduled = self.active_scheduled.saturating_sub(1);
    }

    /// Playback cursor in clock seconds, `0.0` while unset.
    pub fn cursor(&self) -> f64 {
        self.cursor.unwrap_or(0.0)
    }

    #[cfg(test)]
    pub(crate) fn is_cold_started(&self) -> bool {
        self.cold_started
    }

    #[cfg(test)]
    pub(crate) fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn active_scheduled(&self) -> usize {
        self.active_scheduled
    }

    /// Decoded audio not yet played: waiting for reorder, queued, or scheduled.
    pub fn backlog(&self) -> usize {
        self.reorder.waiting() + self.queue.len() + self.active_scheduled
    }

    /// Drop all buffers and forget the cursor and cold-start progress.
    pub fn reset(&mut self) {
        self.reorder.clear();
        self.queue.clear();
        self.cursor = None;
        self.cold_started = false;
        self.active_scheduled = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingClock {
        now: f64,
        starts: Vec<(f64, f64)>,
        fail: bool,
    }

    impl PlaybackClock for RecordingClock {
        fn current_time(&self) -> f64 {
            self.now
        }
        fn sample_rate(&self) -> u32 {
            10
        }
        fn schedule(&mut self, buffer: DecodedBuffer, start_at: f64) -> Result<(), EngineError> {
            if self.fail {
                return Err(EngineError::Output("boom".into()));
            }
            self.starts.push((start_at, buffer.duration_secs()));
            Ok(())
        }
        fn suspend(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
        fn resume(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
        fn close(&mut self) {}
    }

    fn secs(frames: usize) -> Option<DecodedBuffer> {
        Some(DecodedBuffer::silence(frames, 1, 10))
    }

    #[test]
    fn holds_first_two_buffers_then_drains() {
        let mut p = PlaybackPipeline::new(2, Duration::from_millis(50));
        assert!(!p.accept(0, secs(10)));
        assert!(!p.accept(1, secs(10)));
        assert!(p.accept(2, secs(10)));
        assert!(p.is_cold_started());
    }

    #[test]
    fn after_cold_start_every_buffer_drains() {
        let mut p = PlaybackPipeline::new(2, Duration::ZERO);
        let mut clock = RecordingClock::default();
        p.accept(0, secs(10));
        p.accept(1, secs(10));
        p.accept(2, secs(10));
        p.drain(&mut clock).unwrap();
        assert!(p.accept(3, secs(10)));
    }

    #[test]
    fn first_drain_seeds_cursor_with_lead_in_then_stays_contiguous() {
        let mut p = PlaybackPipeline::new(0, Duration::from_millis(50));
        let mut clock = RecordingClock {
            now: 3.0,
            ..Default::default()
        };
        p.accept(0, secs(5));
        p.accept(1, secs(20));
        let report = p.drain(&mut clock).unwrap();
        assert_eq!(report.scheduled, 2);
        assert!((clock.starts[0].0 - 3.05).abs() < 1e-9);
        assert!((clock.starts[1].0 - (clock.starts[0].0 + 0.5)).abs() < 1e-9);
        assert!((report.cursor - 5.55).abs() < 1e-9);

        clock.now = 100.0;
        p.accept(2, secs(10));
        p.drain(&mut clock).unwrap();
        assert!((clock.starts[2].0 - 5.55).abs() < 1e-9);
    }

    #[test]
    fn drain_with_empty_queue_is_noop() {
        let mut p = PlaybackPipeline::new(0, Duration::ZERO);
        let mut clock = RecordingClock::default();
        assert_eq!(p.drain(&mut clock).unwrap().scheduled, 0);
        assert_eq!(p.cursor(), 0.0);
    }

    #[test]
    fn out_of_order_buffers_are_scheduled_in_arrival_order() {
        let mut p = PlaybackPipeline::new(0, Duration::ZERO);
        let mut clock = RecordingClock::default();
        assert!(!p.accept(1, secs(20)));
        assert!(p.accept(0, secs(10)));
        p.drain(&mut clock).unwrap();
        let durations: Vec<f64> = clock.starts.iter().map(|s| s.1).collect();
        assert_eq!(durations, vec![1.0, 2.0]);
    }

    #[test]
    fn backlog_counts_waiting_queued_and_scheduled() {
        let mut p = PlaybackPipeline::new(5, Duration::ZERO);
        p.accept(1, secs(10));
        p.accept(0, secs(10));
        p.accept(3, secs(10));
        assert_eq!(p.backlog(), 3);
        let mut clock = RecordingClock::default();
        p.drain(&mut clock).unwrap();
        assert_eq!(p.active_scheduled(), 2);
        p.buffer_ended();
        assert_eq!(p.backlog(), 2);
    }

    #[test]
    fn schedule_error_is_reported() {
        let mut p = PlaybackPipeline::new(0, Duration::ZERO);
        let mut clock = RecordingClock {
            fail: true,
            ..Default::default()
        };
        p.accept(0, secs(10));
        assert!(p.drain(&mut clock).is_err());
        assert_eq!(p.active_scheduled(), 0);
        assert_eq!(p.cursor(), 0.0);
    }

    #[test]
    fn reset_forgets_cursor_and_cold_start() {
        let mut p = PlaybackPipeline::new(0, Duration::ZERO);
        let mut clock = RecordingClock::default();
        p.accept(0, secs(10));
        p.drain(&mut clock).unwrap();
        p.reset();
        assert_eq!(p.cursor(), 0.0);
        assert!(!p.is_cold_started());
        assert_eq!(p.backlog(), 0);
    }

    #[test]
    fn zero_length_buffers_are_dropped() {
        let mut p = PlaybackPipeline::new(0, Duration::ZERO);
        assert!(!p.accept(0, Some(DecodedBuffer::new(Vec::new(), 1, 10))));
        assert_eq!(p.queued(), 0);
    }
}
