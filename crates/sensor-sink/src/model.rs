//! Persisted record shapes owned by the sink: Alert, Forensic Record,
//! and Anchor (spec.md §3).

use sensor_detect::{Event, Verdict};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Open,
    Investigating,
    Contained,
    Resolved,
}

/// Persisted record of an affirmative verdict (spec.md §3 "Alert").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: String,
    pub session_id: String,
    pub client_ip: String,
    pub upstream_ip: String,
    pub event: Event,
    pub verdict: Verdict,
    pub status: AlertStatus,
    pub contained: bool,
    pub contained_at: Option<f64>,
    pub forensic_hash: Option<String>,
    pub anchor_root: Option<String>,
}

/// Canonical, immutable document written by the Forensic Writer (C8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForensicRecord {
    pub forensic_id: String,
    pub session_id: String,
    pub event: Event,
    pub verdict: Verdict,
    /// SHA-256 hex of the canonicalized record with this field removed.
    #[serde(default)]
    pub hash: String,
}

/// Batch proof for a set of Forensic Records (spec.md §3 "Anchor").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anchor {
    pub anchor_id: String,
    pub created_at: f64,
    pub merkle_root: String,
    pub leaf_count: usize,
    pub leaf_hashes: Vec<String>,
    pub signature: String,
    pub signer_id: String,
}
