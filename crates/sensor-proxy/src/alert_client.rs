//! HTTP client for the C6 -> C7 alert POST (spec.md §6). Bounded by
//! `alert_timeout`; timeout or transport error is treated as "no
//! containment action received" (spec.md §4.5 step 4, §7).

use std::time::Duration;

use sensor_detect::{Direction, Sample, Verdict};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{Session, SessionCounters};

#[derive(Debug, Error)]
pub enum AlertClientError {
    #[error("alert POST timed out or failed transport: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentSamplePayload {
    pub timestamp: f64,
    pub direction: &'static str,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatsPayload {
    pub client_to_server_bytes: u64,
    pub server_to_client_bytes: u64,
    pub client_to_server_packets: u64,
    pub server_to_client_packets: u64,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertPayload {
    pub session_id: String,
    pub client_ip: String,
    pub upstream_ip: String,
    pub timestamp: f64,
    pub heuristic: &'static str,
    pub bytes: u64,
    pub recent_samples: Vec<RecentSamplePayload>,
    pub session_stats: SessionStatsPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertResponse {
    pub action: String,
    pub alert_id: String,
    pub severity: String,
    pub forensic_hash: String,
}

/// The heuristic label a verdict's reasons map to, for the wire payload.
/// Spec.md §6 fixes the enum to the three rule-named heuristics; an
/// ML-only alert (no rule reason) is classified by traffic direction as
/// the closest analogue.
pub fn heuristic_for(verdict: &Verdict, direction: Direction) -> &'static str {
    if verdict.reasons.iter().any(|r| r.contains("Rule 1")) {
        "clipboard_exfiltration"
    } else if verdict.reasons.iter().any(|r| r.contains("Rule 2")) {
        "frameburst"
    } else if verdict.reasons.iter().any(|r| r.contains("Rule 3")) {
        "file_transfer_like"
    } else {
        match direction {
            Direction::ClientToServer => "clipboard_exfiltration",
            Direction::ServerToClient => "frameburst",
        }
    }
}

fn direction_label(direction: Direction) -> &'static str {
    match direction {
        Direction::ClientToServer => "client_to_server",
        Direction::ServerToClient => "server_to_client",
    }
}

pub fn build_payload(
    session: &Session,
    direction: Direction,
    bytes: u64,
    verdict: &Verdict,
    timestamp: f64,
    recent_samples: &[Sample],
    counters: SessionCounters,
) -> AlertPayload {
    AlertPayload {
        session_id: session.session_id.clone(),
        client_ip: session.client_endpoint.clone(),
        upstream_ip: session.upstream_endpoint.clone(),
        timestamp,
        heuristic: heuristic_for(verdict, direction),
        bytes,
        recent_samples: recent_samples
            .iter()
            .map(|s| RecentSamplePayload { timestamp: s.timestamp, direction: direction_label(s.direction), bytes: s.bytes })
            .collect(),
        session_stats: SessionStatsPayload {
            client_to_server_bytes: counters.c2s_bytes,
            server_to_client_bytes: counters.s2c_bytes,
            client_to_server_packets: counters.c2s_packets,
            server_to_client_packets: counters.s2c_packets,
            duration_seconds: timestamp,
        },
    }
}

/// Posts an alert payload to C7, bounded by `alert_timeout_sec`.
pub struct AlertClient {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl AlertClient {
    pub fn new(url: impl Into<String>, timeout_sec: f64) -> Self {
        Self { http: reqwest::Client::new(), url: url.into(), timeout: Duration::from_secs_f64(timeout_sec) }
    }

    pub async fn post_alert(&self, payload: &AlertPayload) -> Result<AlertResponse, AlertClientError> {
        let response = self.http.post(&self.url).timeout(self.timeout).json(payload).send().await?;
        let body: AlertResponse = response.error_for_status()?.json().await?;
        Ok(body)
    }
}
