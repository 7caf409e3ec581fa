//! Shared data-model types consumed by the detection engine, the proxy,
//! and the alert sink: samples, sessions' traffic direction, events,
//! and detection verdicts (spec.md §3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Direction of a forwarded chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

/// A single observation of a forwarded chunk. Immutable once created.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Sample {
    /// Monotonic seconds, fractional.
    pub timestamp: f64,
    pub direction: Direction,
    pub bytes: u64,
}

/// The kind of activity an event represents, used by the feature
/// extractor (§4.2). `Unknown` covers opaque proxy chunks that were not
/// classified into one of the three named categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ClipboardCopy,
    Screenshot,
    FileTransfer,
    Unknown,
}

/// Unit consumed by the Detection Engine. One Event per forwarded chunk
/// or per synthetic attack-generator record; the two paths share this
/// shape, with the size fields defaulting to zero when absent (spec.md
/// §9 design note).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: f64,
    pub direction: Direction,
    pub bytes: u64,
    pub event_type: EventType,
    /// Clipboard payload size in KB, as the event-generator reports it.
    #[serde(default)]
    pub size_kb: f64,
    /// File transfer size in MB, as the event-generator reports it.
    #[serde(default)]
    pub size_mb: f64,
}

impl Event {
    /// Builds an Event from a proxy-observed chunk. Client->server
    /// traffic is treated as clipboard-shaped, server->client as
    /// screenshot-shaped (spec.md §3: "event_type derived from direction
    /// + context"); the chunk's own byte count stands in for the
    /// generator's explicit size_kb/size_mb field, since a bare proxy
    /// chunk carries no separate payload-size metadata.
    pub fn from_chunk(direction: Direction, bytes: u64, timestamp: f64) -> Self {
        match direction {
            Direction::ClientToServer => Event {
                timestamp,
                direction,
                bytes,
                event_type: EventType::ClipboardCopy,
                size_kb: bytes as f64 / 1024.0,
                size_mb: 0.0,
            },
            Direction::ServerToClient => Event {
                timestamp,
                direction,
                bytes,
                event_type: EventType::Screenshot,
                size_kb: 0.0,
                size_mb: bytes as f64 / (1024.0 * 1024.0),
            },
        }
    }

    /// Builds an Event explicitly, as the attack-event generator does,
    /// with `event_type` and size fields set directly.
    pub fn generated(
        timestamp: f64,
        direction: Direction,
        bytes: u64,
        event_type: EventType,
        size_kb: f64,
        size_mb: f64,
    ) -> Self {
        Event { timestamp, direction, bytes, event_type, size_kb, size_mb }
    }

    pub fn sample(&self) -> Sample {
        Sample { timestamp: self.timestamp, direction: self.direction, bytes: self.bytes }
    }
}

/// Which detection methods contributed to a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DetectionMethod {
    Rule,
    Ml,
}

/// Verdict severity. `Low` always means `is_alert = false`. Ordered so
/// `severity >= Severity::High` reads naturally (spec.md §4.5/§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Result of one Detection Engine evaluation (spec.md §3/§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub is_alert: bool,
    pub detection_methods: Vec<DetectionMethod>,
    pub reasons: Vec<String>,
    pub severity: Severity,
    pub ml_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_importance: Option<HashMap<String, f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_matches_spec_table() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn from_chunk_maps_direction_to_event_type() {
        let c2s = Event::from_chunk(Direction::ClientToServer, 2048, 1.0);
        assert_eq!(c2s.event_type, EventType::ClipboardCopy);
        assert_eq!(c2s.size_kb, 2.0);

        let s2c = Event::from_chunk(Direction::ServerToClient, 1024 * 1024, 1.0);
        assert_eq!(s2c.event_type, EventType::Screenshot);
        assert_eq!(s2c.size_mb, 1.0);
    }
}
