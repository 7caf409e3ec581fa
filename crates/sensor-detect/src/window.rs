//! C1: Rolling Window Store — a bounded per-session ring of recent
//! samples with O(1) append and linear (bounded by ring capacity)
//! aggregate queries.

use std::collections::VecDeque;

use crate::model::{Direction, Event, EventType, Sample};

/// Default ring capacity (spec.md §4.1).
pub const DEFAULT_CAPACITY: usize = 100;

/// One ring slot: the spec-mandated `Sample` plus the event-type/size
/// tags needed for the per-type feature aggregates (§4.2 features 8 and
/// 10), carried alongside rather than folded into `Sample` itself since
/// `Sample` is the exact wire/payload shape from spec.md §3. Entries
/// appended via the plain `Sample` API (most unit tests, and the sink's
/// wire-replay path, whose `recent_samples` schema carries no
/// event_type per §6) are tagged `Unknown` and simply don't contribute
/// to the per-type aggregates.
#[derive(Debug, Clone, Copy)]
struct Entry {
    sample: Sample,
    event_type: EventType,
    size_mb: f64,
}

/// Bounded ring of recent `Sample`s for one session.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    capacity: usize,
    entries: VecDeque<Entry>,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: VecDeque::with_capacity(capacity) }
    }

    fn push(&mut self, entry: Entry) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Appends a sample, evicting the oldest one on overflow. O(1).
    pub fn append(&mut self, sample: Sample) {
        self.push(Entry { sample, event_type: EventType::Unknown, size_mb: 0.0 });
    }

    /// Appends a sample tagged with the event that produced it, so the
    /// per-event-type aggregates (§4.2 features 8, 10) can be computed
    /// over the window's own history instead of being permanently zero.
    pub fn append_event(&mut self, event: &Event) {
        self.push(Entry { sample: event.sample(), event_type: event.event_type, size_mb: event.size_mb });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sums `bytes` of stored samples matching `direction` whose age
    /// `now - timestamp <= window_seconds`.
    pub fn sum_bytes(&self, direction: Direction, window_seconds: f64, now: f64) -> u64 {
        self.entries
            .iter()
            .filter(|e| e.sample.direction == direction && now - e.sample.timestamp <= window_seconds)
            .map(|e| e.sample.bytes)
            .sum()
    }

    /// Counts stored samples matching `direction` within `window_seconds`
    /// of `now`.
    pub fn count(&self, direction: Direction, window_seconds: f64, now: f64) -> usize {
        self.entries.iter().filter(|e| e.sample.direction == direction && now - e.sample.timestamp <= window_seconds).count()
    }

    /// Sums `bytes` of samples matching `direction` among the last `n`
    /// stored samples overall (irrespective of direction), mirroring
    /// the original prototype's `recent_samples[-n:]` slice-then-filter
    /// behavior used by the clipboard-burst rule (R1), which is a
    /// sample-count window rather than a time window.
    pub fn sum_bytes_last_n(&self, direction: Direction, n: usize) -> u64 {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).filter(|e| e.sample.direction == direction).map(|e| e.sample.bytes).sum()
    }

    /// Counts entries tagged with `event_type` within `window_seconds`
    /// of `now` (§4.2 features 8 source).
    pub fn count_event_type(&self, event_type: EventType, window_seconds: f64, now: f64) -> usize {
        self.entries.iter().filter(|e| e.event_type == event_type && now - e.sample.timestamp <= window_seconds).count()
    }

    /// Sums `size_mb` of entries tagged with `event_type` within
    /// `window_seconds` of `now` (§4.2 feature 10 source).
    pub fn sum_event_size_mb(&self, event_type: EventType, window_seconds: f64, now: f64) -> f64 {
        self.entries
            .iter()
            .filter(|e| e.event_type == event_type && now - e.sample.timestamp <= window_seconds)
            .map(|e| e.size_mb)
            .sum()
    }

    /// Returns up to the last `n` samples in insertion order.
    pub fn tail(&self, n: usize) -> Vec<Sample> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).map(|e| e.sample).collect()
    }

    /// Immutable snapshot of the whole ring, in insertion order.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.entries.iter().map(|e| e.sample).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(t: f64, dir: Direction, bytes: u64) -> Sample {
        Sample { timestamp: t, direction: dir, bytes }
    }

    #[test]
    fn append_evicts_oldest_on_overflow() {
        let mut w = RollingWindow::new(3);
        for i in 0..5 {
            w.append(sample(i as f64, Direction::ClientToServer, i));
        }
        assert_eq!(w.len(), 3);
        let tail = w.tail(10);
        assert_eq!(tail.iter().map(|s| s.bytes).collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn sum_bytes_respects_direction_and_window() {
        let mut w = RollingWindow::new(10);
        w.append(sample(0.0, Direction::ClientToServer, 100));
        w.append(sample(1.0, Direction::ServerToClient, 500));
        w.append(sample(2.0, Direction::ClientToServer, 50));

        assert_eq!(w.sum_bytes(Direction::ClientToServer, 10.0, 2.0), 150);
        assert_eq!(w.sum_bytes(Direction::ServerToClient, 10.0, 2.0), 500);
        // window excludes the sample at t=0 when now - t > window
        assert_eq!(w.sum_bytes(Direction::ClientToServer, 1.5, 2.0), 50);
    }

    #[test]
    fn sum_bytes_last_n_counts_overall_samples_not_per_direction() {
        let mut w = RollingWindow::new(20);
        // 9 client->server samples of 0 bytes, then one of 204801
        for i in 0..9 {
            w.append(sample(i as f64, Direction::ClientToServer, 0));
        }
        w.append(sample(9.0, Direction::ClientToServer, 204_801));
        assert_eq!(w.sum_bytes_last_n(Direction::ClientToServer, 10), 204_801);
    }

    #[test]
    fn tail_default_returns_requested_count_or_fewer() {
        let mut w = RollingWindow::new(100);
        for i in 0..5 {
            w.append(sample(i as f64, Direction::ClientToServer, 1));
        }
        assert_eq!(w.tail(20).len(), 5);
        assert_eq!(w.tail(3).len(), 3);
    }

    #[test]
    fn append_event_tracks_per_event_type_aggregates() {
        let mut w = RollingWindow::new(100);
        let ft1 = Event::generated(0.0, Direction::ClientToServer, 0, EventType::FileTransfer, 0.0, 20.0);
        let ft2 = Event::generated(1.0, Direction::ClientToServer, 0, EventType::FileTransfer, 0.0, 30.0);
        let clip = Event::generated(2.0, Direction::ClientToServer, 0, EventType::ClipboardCopy, 5.0, 0.0);
        w.append_event(&ft1);
        w.append_event(&ft2);
        w.append_event(&clip);

        assert_eq!(w.count_event_type(EventType::FileTransfer, 60.0, 2.0), 2);
        assert_eq!(w.count_event_type(EventType::ClipboardCopy, 60.0, 2.0), 1);
        assert_eq!(w.sum_event_size_mb(EventType::FileTransfer, 60.0, 2.0), 50.0);
    }

    #[test]
    fn plain_append_tags_unknown_event_type() {
        let mut w = RollingWindow::new(100);
        w.append(sample(0.0, Direction::ClientToServer, 1024));
        assert_eq!(w.count_event_type(EventType::FileTransfer, 60.0, 0.0), 0);
        assert_eq!(w.sum_event_size_mb(EventType::FileTransfer, 60.0, 0.0), 0.0);
    }
}
