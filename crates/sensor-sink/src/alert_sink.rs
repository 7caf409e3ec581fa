//! C7: Alert Sink — receives verdicts from the proxy, re-runs the
//! Detection Engine for idempotent replay, persists the Alert, and
//! decides the containment action (spec.md §4.6).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sensor_detect::{Direction, Event, MlModel, RollingWindow, Sample, Severity, SinkConfig, Verdict};
use sensor_storage::JsonLinesLog;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::anchor::AnchorService;
use crate::forensic::{ForensicError, ForensicWriter};
use crate::model::{Alert, AlertStatus};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Forensic(#[from] ForensicError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingSample {
    pub timestamp: f64,
    pub direction: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingSessionStats {
    pub client_to_server_bytes: u64,
    pub server_to_client_bytes: u64,
    pub client_to_server_packets: u64,
    pub server_to_client_packets: u64,
    pub duration_seconds: f64,
}

/// Wire shape of the proxy -> sink alert POST (spec.md §6).
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingAlertPayload {
    pub session_id: String,
    pub client_ip: String,
    pub upstream_ip: String,
    pub timestamp: f64,
    pub heuristic: String,
    pub bytes: u64,
    pub recent_samples: Vec<IncomingSample>,
    #[allow(dead_code)]
    pub session_stats: IncomingSessionStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct SinkResponse {
    pub action: String,
    pub alert_id: String,
    pub severity: String,
    pub forensic_hash: String,
}

/// Health snapshot surfaced on `/healthz`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SinkHealth {
    pub anchor_queue_depth: usize,
    pub model_loaded: bool,
}

fn parse_direction(s: &str) -> Direction {
    if s == "server_to_client" {
        Direction::ServerToClient
    } else {
        Direction::ClientToServer
    }
}

/// Same mapping the proxy uses in reverse: an ML-only verdict carries
/// no rule-named heuristic, so the payload's heuristic falls back to
/// the triggering chunk's direction (see `sensor-proxy::alert_client`).
fn direction_for_heuristic(heuristic: &str) -> Direction {
    match heuristic {
        "frameburst" => Direction::ServerToClient,
        _ => Direction::ClientToServer,
    }
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Low => "low",
        Severity::Medium => "medium",
        Severity::High => "high",
        Severity::Critical => "critical",
    }
}

pub struct AlertSink {
    config: SinkConfig,
    model: Arc<dyn MlModel>,
    forensic_writer: ForensicWriter,
    anchor_service: Arc<AnchorService>,
    replay_log: Option<JsonLinesLog>,
    alert_counter: AtomicU64,
}

impl AlertSink {
    pub fn new(
        config: SinkConfig,
        model: Arc<dyn MlModel>,
        forensic_writer: ForensicWriter,
        anchor_service: Arc<AnchorService>,
        replay_log: Option<JsonLinesLog>,
    ) -> Self {
        Self { config, model, forensic_writer, anchor_service, replay_log, alert_counter: AtomicU64::new(0) }
    }

    /// Snapshot used by the `/healthz` route (SPEC_FULL.md §6 ambient):
    /// pending anchor-queue depth and whether a real model is loaded.
    pub async fn health(&self) -> SinkHealth {
        SinkHealth { anchor_queue_depth: self.anchor_service.pending_count().await, model_loaded: self.model.is_loaded() }
    }

    fn next_alert_id(&self) -> String {
        let ms = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_millis();
        let seq = self.alert_counter.fetch_add(1, Ordering::SeqCst);
        format!("ALERT_{ms}_{seq}")
    }

    /// Processes one alert payload end to end: re-evaluate, persist,
    /// enqueue for anchoring, decide containment.
    pub async fn process_alert(&self, payload: IncomingAlertPayload) -> Result<SinkResponse, SinkError> {
        let direction = direction_for_heuristic(&payload.heuristic);
        let mut window = RollingWindow::new(self.config.detection.clipboard_burst_samples.max(payload.recent_samples.len()).max(1));
        for sample in &payload.recent_samples {
            window.append(Sample { timestamp: sample.timestamp, direction: parse_direction(&sample.direction), bytes: sample.bytes });
        }
        let event = Event::from_chunk(direction, payload.bytes, payload.timestamp);
        let verdict = sensor_detect::evaluate(&window, &event, &self.config.detection, self.model.as_ref());

        if !verdict.is_alert {
            if let Some(log) = &self.replay_log {
                let _ = log.append(&serde_json::json!({
                    "session_id": payload.session_id,
                    "downgraded": true,
                    "verdict": verdict,
                }))
                .await;
            }
            return Ok(SinkResponse {
                action: "no-op".to_string(),
                alert_id: "DOWNGRADED".to_string(),
                severity: severity_label(verdict.severity).to_string(),
                forensic_hash: String::new(),
            });
        }

        let alert = Alert {
            alert_id: self.next_alert_id(),
            session_id: payload.session_id,
            client_ip: payload.client_ip,
            upstream_ip: payload.upstream_ip,
            event,
            verdict: verdict.clone(),
            status: AlertStatus::Open,
            contained: false,
            contained_at: None,
            forensic_hash: None,
            anchor_root: None,
        };

        let forensic_record = self.forensic_writer.write(&alert).await?;

        if let Some(log) = &self.replay_log {
            let _ = log.append(&alert).await;
        }

        self.anchor_service.enqueue(forensic_record.hash.clone()).await;

        let action = if verdict.severity >= Severity::High || self.config.auto_contain_on_alert { "contain" } else { "no-op" };

        Ok(SinkResponse {
            action: action.to_string(),
            alert_id: alert.alert_id,
            severity: severity_label(verdict.severity).to_string(),
            forensic_hash: forensic_record.hash,
        })
    }
}

/// Result of a containment command, mirroring the idempotent-race
/// handling spec.md §7 requires.
#[derive(Debug, Clone, Serialize)]
pub struct ContainResponse {
    pub success: bool,
    pub session_id: String,
    pub message: String,
}
