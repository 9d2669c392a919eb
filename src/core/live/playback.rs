//! Gapless scheduling of model audio against a playback clock.
//!
//! Times are seconds on the speaker's clock. Buffers queue back to back;
//! a buffer that arrives after the queue drained starts immediately.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSource {
    pub id: u64,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    next_start: f64,
    sources: Vec<ScheduledSource>,
    next_id: u64,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `duration` seconds of audio at `max(next_start, now)`.
    pub fn schedule(&mut self, duration: f64, now: f64) -> ScheduledSource {
        let start = self.next_start.max(now);
        let source = ScheduledSource {
            id: self.next_id,
            start,
            end: start + duration,
        };
        self.next_id += 1;
        self.next_start = source.end;
        self.sources.push(source);
        source
    }

    /// Drops sources whose end time has passed. Returns `true` when the
    /// queue went from busy to empty.
    pub fn reap(&mut self, now: f64) -> bool {
        let was_playing = self.is_playing();
        self.sources.retain(|source| source.end > now);
        was_playing && !self.is_playing()
    }

    pub fn is_playing(&self) -> bool {
        !self.sources.is_empty()
    }

    /// Stops every pending source and rewinds the clock.
    pub fn stop_all(&mut self) -> Vec<ScheduledSource> {
        self.next_start = 0.0;
        std::mem::take(&mut self.sources)
    }

    pub fn next_start(&self) -> f64 {
        self.next_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_queue_back_to_back() {
        let mut scheduler = PlaybackScheduler::new();
        let first = scheduler.schedule(0.5, 1.0);
        let second = scheduler.schedule(0.25, 1.1);
        assert_eq!(first.start, 1.0);
        assert_eq!(second.start, 1.5);
        assert_eq!(scheduler.next_start(), 1.75);
    }

    #[test]
    fn late_buffer_starts_now() {
        let mut scheduler = PlaybackScheduler::new();
        scheduler.schedule(0.5, 0.0);
        let late = scheduler.schedule(0.5, 3.0);
        assert_eq!(late.start, 3.0);
    }

    #[test]
    fn reaping_clears_playing_once_all_sources_end() {
        let mut scheduler = PlaybackScheduler::new();
        scheduler.schedule(1.0, 0.0);
        scheduler.schedule(1.0, 0.0);
        assert!(!scheduler.reap(1.5));
        assert!(scheduler.is_playing());
        assert!(scheduler.reap(2.0));
        assert!(!scheduler.is_playing());
        assert!(!scheduler.reap(3.0));
    }

    #[test]
    fn stop_all_rewinds_clock() {
        let mut scheduler = PlaybackScheduler::new();
        scheduler.schedule(1.0, 2.0);
        scheduler.schedule(1.0, 2.0);
        assert_eq!(scheduler.stop_all().len(), 2);
        assert_eq!(scheduler.next_start(), 0.0);
        assert!(!scheduler.is_playing());
    }
}
