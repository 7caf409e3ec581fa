//! C3: Feature Extractor — a fixed-arity, named, ordered feature vector
//! built from one Event plus one-minute window aggregates (spec.md
//! §4.2). Layout and normalization constants are part of the
//! training/inference contract and must not drift.

use crate::model::{Direction, Event, EventType};
use crate::window::RollingWindow;

/// Feature vector length, fixed by spec.md §4.2.
pub const FEATURE_COUNT: usize = 11;

/// Feature names, in the exact order features are emitted.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "is_clipboard",
    "is_screenshot",
    "is_file_transfer",
    "clipboard_size_mb",
    "file_size_mb",
    "time_of_day",
    "clipboard_count_1min",
    "screenshot_count_1min",
    "file_transfer_count_1min",
    "clipboard_total_kb_1min",
    "file_transfer_total_mb_1min",
];

const ONE_MINUTE: f64 = 60.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Builds the 11-element feature vector for `event`, given the window
/// it was appended to. Deterministic in `(event, window snapshot)`.
pub fn extract(event: &Event, window: &RollingWindow) -> [f64; FEATURE_COUNT] {
    let is_clipboard = matches!(event.event_type, EventType::ClipboardCopy);
    let is_screenshot = matches!(event.event_type, EventType::Screenshot);
    let is_file_transfer = matches!(event.event_type, EventType::FileTransfer);

    let clipboard_size_mb = if is_clipboard { event.size_kb / 1000.0 } else { 0.0 };
    let file_size_mb = if is_file_transfer { event.size_mb } else { 0.0 };

    let time_of_day = (event.timestamp.rem_euclid(SECONDS_PER_DAY)) / SECONDS_PER_DAY;

    // Clipboard/screenshot counts read server->client samples as
    // screenshot-shaped and client->server samples as clipboard-shaped,
    // matching how `Event::from_chunk` tags proxy-observed traffic; this
    // direction-based approximation is what the proxy's live path can
    // actually observe (it never emits a `FileTransfer`-typed Event).
    let clipboard_count_1min = window.count(Direction::ClientToServer, ONE_MINUTE, event.timestamp) as f64 / 10.0;
    let screenshot_count_1min = window.count(Direction::ServerToClient, ONE_MINUTE, event.timestamp) as f64 / 10.0;
    // File transfers aren't distinguishable by direction alone (they
    // share client->server with clipboard bursts), so these two
    // aggregates are tracked from the window's own per-event-type tags
    // (`RollingWindow::append_event`) rather than approximated from
    // direction. Entries appended via the plain `Sample` API — the
    // sink's wire-replay path, whose §6 `recent_samples` schema carries
    // no event_type — are tagged `Unknown` and don't contribute here;
    // that is an inherent wire-format limitation, not a bug in this
    // extractor.
    let file_transfer_count_1min = window.count_event_type(EventType::FileTransfer, ONE_MINUTE, event.timestamp) as f64 / 10.0;

    let clipboard_total_kb_1min =
        window.sum_bytes(Direction::ClientToServer, ONE_MINUTE, event.timestamp) as f64 / 1024.0 / 1000.0;
    let file_transfer_total_mb_1min = window.sum_event_size_mb(EventType::FileTransfer, ONE_MINUTE, event.timestamp);

    [
        bool_to_f64(is_clipboard),
        bool_to_f64(is_screenshot),
        bool_to_f64(is_file_transfer),
        clipboard_size_mb,
        file_size_mb,
        time_of_day,
        clipboard_count_1min,
        screenshot_count_1min,
        file_transfer_count_1min,
        clipboard_total_kb_1min,
        file_transfer_total_mb_1min,
    ]
}

fn bool_to_f64(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sample;

    #[test]
    fn feature_vector_has_fixed_length_and_names() {
        assert_eq!(FEATURE_NAMES.len(), FEATURE_COUNT);
    }

    #[test]
    fn clipboard_event_sets_expected_flags() {
        let window = RollingWindow::new(100);
        let event = Event::generated(0.0, Direction::ClientToServer, 0, EventType::ClipboardCopy, 50.0, 0.0);
        let f = extract(&event, &window);
        assert_eq!(f[0], 1.0); // is_clipboard
        assert_eq!(f[1], 0.0); // is_screenshot
        assert_eq!(f[3], 0.05); // clipboard_size_mb = 50/1000
        assert_eq!(f[4], 0.0); // file_size_mb
    }

    #[test]
    fn file_transfer_event_sets_expected_flags() {
        let window = RollingWindow::new(100);
        let event = Event::generated(0.0, Direction::ClientToServer, 0, EventType::FileTransfer, 0.0, 75.0);
        let f = extract(&event, &window);
        assert_eq!(f[2], 1.0); // is_file_transfer
        assert_eq!(f[4], 75.0); // file_size_mb
        assert_eq!(f[3], 0.0); // clipboard_size_mb
    }

    #[test]
    fn time_of_day_is_normalized_to_unit_interval() {
        let window = RollingWindow::new(100);
        let event = Event::generated(3600.0 * 12.0, Direction::ClientToServer, 0, EventType::Unknown, 0.0, 0.0);
        let f = extract(&event, &window);
        assert!((f[5] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn history_counts_are_normalized_by_ten() {
        let mut window = RollingWindow::new(100);
        for i in 0..5 {
            window.append(Sample { timestamp: i as f64, direction: Direction::ClientToServer, bytes: 1000 });
        }
        let event = Event::generated(4.0, Direction::ClientToServer, 1000, EventType::ClipboardCopy, 1.0, 0.0);
        let f = extract(&event, &window);
        assert_eq!(f[6], 0.5); // 5 samples / 10
    }

    #[test]
    fn deterministic_for_same_event_and_window() {
        let mut window = RollingWindow::new(100);
        window.append(Sample { timestamp: 0.0, direction: Direction::ClientToServer, bytes: 1024 });
        let event = Event::generated(0.0, Direction::ClientToServer, 1024, EventType::ClipboardCopy, 1.0, 0.0);
        assert_eq!(extract(&event, &window), extract(&event, &window));
    }

    #[test]
    fn file_transfer_aggregates_are_tracked_from_event_type_history() {
        let mut window = RollingWindow::new(100);
        for i in 0..3 {
            window.append_event(&Event::generated(i as f64, Direction::ClientToServer, 0, EventType::FileTransfer, 0.0, 10.0));
        }
        let event = Event::generated(3.0, Direction::ClientToServer, 0, EventType::FileTransfer, 0.0, 10.0);
        window.append_event(&event);

        let f = extract(&event, &window);
        assert_eq!(f[8], 0.4); // 4 file_transfer events / 10
        assert_eq!(f[10], 40.0); // 4 * 10MB
    }

    #[test]
    fn file_transfer_aggregates_stay_zero_for_plain_sample_history() {
        // Mirrors the sink's wire-replay path, whose recent_samples carry
        // no event_type (spec.md §6).
        let mut window = RollingWindow::new(100);
        window.append(Sample { timestamp: 0.0, direction: Direction::ClientToServer, bytes: 1024 });
        let event = Event::generated(0.0, Direction::ClientToServer, 1024, EventType::FileTransfer, 0.0, 5.0);
        let f = extract(&event, &window);
        // The current event itself was never appended to the window, so
        // even its own size doesn't show up in the 1-minute aggregate.
        assert_eq!(f[8], 0.0);
        assert_eq!(f[10], 0.0);
    }
}
