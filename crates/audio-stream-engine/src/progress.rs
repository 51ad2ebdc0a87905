//! Wall-clock progress and end-of-track detection.
//!
//! The progress clock only counts ticks; it never reads the playback clock, so decode or
//! scheduling jitter cannot move it.

use audio_stream_types::TrackMetadata;

/// What a progress tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not streaming, or no duration known yet.
    Skipped,
    Advanced,
    /// Elapsed time reached the track duration.
    EndOfTrack,
}

#[derive(Debug, Default, Clone)]
pub struct ProgressClock {
    elapsed: u64,
    metadata: Option<TrackMetadata>,
}

impl ProgressClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the session's metadata. Returns `false` if metadata was already set.
    pub fn set_metadata(&mut self, metadata: TrackMetadata) -> bool {
        if self.metadata.is_some() {
            return false;
        }
        self.metadata = Some(metadata);
        true
    }

    pub fn metadata(&self) -> Option<&TrackMetadata> {
        self.metadata.as_ref()
    }

    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    /// Track length in seconds, `0` while unknown.
    pub fn total(&self) -> u64 {
        self.metadata.as_ref().map(|m| m.total_seconds()).unwrap_or(0)
    }

    pub fn tick(&mut self, streaming: bool) -> TickOutcome {
        let total = self.total();
        if !streaming || total == 0 {
            return TickOutcome::Skipped;
        }
        self.elapsed += 1;
        if self.elapsed >= total {
            TickOutcome::EndOfTrack
        } else {
            TickOutcome::Advanced
        }
    }

    /// `elapsed / total` clamped to `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.elapsed as f64 / total as f64).clamp(0.0, 1.0)
    }

    /// `elapsed / total`, e.g. `1:05 / 2:05` or `0:01:05 / 1:02:05`.
    pub fn display(&self) -> String {
        let total = self.total();
        let with_hours = total >= 3600;
        format!(
            "{} / {}",
            format_clock(self.elapsed, with_hours),
            format_clock(total, with_hours)
        )
    }

    pub fn reset(&mut self) {
        self.elapsed = 0;
        self.metadata = None;
    }
}

/// Format seconds as `M:SS`, or `H:MM:SS` when `with_hours` is set or the value needs it.
pub fn format_clock(secs: u64, with_hours: bool) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if with_hours || hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audio_stream_types::TrackDuration;

    fn metadata(hours: u64, minutes: u64, seconds: u64) -> TrackMetadata {
        TrackMetadata {
            duration: TrackDuration {
                hours,
                minutes,
                seconds,
            },
            ..Default::default()
        }
    }

    #[test]
    fn ticks_until_end_of_track() {
        let mut clock = ProgressClock::new();
        clock.set_metadata(metadata(0, 0, 3));
        assert_eq!(clock.tick(true), TickOutcome::Advanced);
        assert_eq!(clock.tick(true), TickOutcome::Advanced);
        assert_eq!(clock.tick(true), TickOutcome::EndOfTrack);
        assert_eq!(clock.fraction(), 1.0);
    }

    #[test]
    fn tick_is_skipped_when_not_streaming_or_duration_unknown() {
        let mut clock = ProgressClock::new();
        assert_eq!(clock.tick(true), TickOutcome::Skipped);
        clock.set_metadata(metadata(0, 1, 0));
        assert_eq!(clock.tick(false), TickOutcome::Skipped);
        assert_eq!(clock.elapsed(), 0);
    }

    #[test]
    fn metadata_is_immutable_once_set() {
        let mut clock = ProgressClock::new();
        assert!(clock.set_metadata(metadata(0, 2, 5)));
        assert!(!clock.set_metadata(metadata(0, 9, 9)));
        assert_eq!(clock.total(), 125);
    }

    #[test]
    fn display_and_fraction() {
        let mut clock = ProgressClock::new();
        assert_eq!(clock.display(), "0:00 / 0:00");
        assert_eq!(clock.fraction(), 0.0);
        clock.set_metadata(metadata(0, 2, 5));
        for _ in 0..65 {
            clock.tick(true);
        }
        assert_eq!(clock.display(), "1:05 / 2:05");
        assert!((clock.fraction() - 0.52).abs() < 1e-9);
    }

    #[test]
    fn display_uses_hours_for_long_tracks() {
        let mut clock = ProgressClock::new();
        clock.set_metadata(metadata(1, 2, 5));
        clock.tick(true);
        assert_eq!(clock.display(), "0:00:01 / 1:02:05");
    }

    #[test]
    fn reset_clears_elapsed_and_metadata() {
        let mut clock = ProgressClock::new();
        clock.set_metadata(metadata(0, 0, 10));
        clock.tick(true);
        clock.reset();
        assert_eq!(clock.elapsed(), 0);
        assert!(clock.metadata().is_none());
    }

    #[test]
    fn format_clock_pads_minutes_and_seconds() {
        assert_eq!(format_clock(0, false), "0:00");
        assert_eq!(format_clock(59, false), "0:59");
        assert_eq!(format_clock(600, false), "10:00");
        assert_eq!(format_clock(3_723, false), "1:02:03");
        assert_eq!(format_clock(5, true), "0:00:05");
    }
}
