//! C2: Rule Evaluator — three heuristics applied in strict order,
//! each pure over `(sample, window snapshot, config)` (spec.md §4.2).

use crate::config::DetectionConfig;
use crate::model::{Direction, Sample};
use crate::window::RollingWindow;

/// Result of evaluating all three rules against one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleVerdict {
    pub is_alert: bool,
    pub reasons: Vec<String>,
}

/// Evaluates R1, R2 and R3 in order against `sample`, given the window
/// it was just appended to and the current time `now`. All three rules
/// are always evaluated; any that trigger contribute a reason, in
/// R1/R2/R3 order (spec.md §9: both R1 and R3 firing on the same chunk
/// is expected and both reasons are kept).
pub fn evaluate(window: &RollingWindow, sample: Sample, config: &DetectionConfig, now: f64) -> RuleVerdict {
    let mut reasons = Vec::with_capacity(3);

    if let Some(reason) = rule1_clipboard_burst(window, config) {
        reasons.push(reason);
    }
    if let Some(reason) = rule2_frameburst(sample, config) {
        reasons.push(reason);
    }
    if let Some(reason) = rule3_sustained_transfer(window, config, now) {
        reasons.push(reason);
    }

    RuleVerdict { is_alert: !reasons.is_empty(), reasons }
}

/// R1 — clipboard-style client->server burst: sum of client->server
/// bytes over the last `clipboard_burst_samples` samples (any direction)
/// exceeds `clipboard_threshold_bytes`.
fn rule1_clipboard_burst(window: &RollingWindow, config: &DetectionConfig) -> Option<String> {
    let observed = window.sum_bytes_last_n(Direction::ClientToServer, config.clipboard_burst_samples);
    if observed > config.clipboard_threshold_bytes {
        let threshold_kb = config.clipboard_threshold_bytes / 1024;
        Some(format!(
            "Rule 1: clipboard-style client->server burst of {:.1}KB exceeds threshold of {}KB",
            observed as f64 / 1024.0,
            threshold_kb
        ))
    } else {
        None
    }
}

/// R2 — server->client frameburst: the current sample alone exceeds
/// `frameburst_threshold_bytes`.
fn rule2_frameburst(sample: Sample, config: &DetectionConfig) -> Option<String> {
    if sample.direction == Direction::ServerToClient && sample.bytes > config.frameburst_threshold_bytes {
        let threshold_mb = config.frameburst_threshold_bytes as f64 / (1024.0 * 1024.0);
        Some(format!(
            "Rule 2: server_to_client frameburst of {:.1}MB exceeds threshold of {:.0}MB",
            sample.bytes as f64 / (1024.0 * 1024.0),
            threshold_mb
        ))
    } else {
        None
    }
}

/// R3 — sustained client->server transfer: bytes over the last
/// `file_transfer_window_sec` seconds, converted to kbps, exceed
/// `file_transfer_rate_kbps`.
fn rule3_sustained_transfer(window: &RollingWindow, config: &DetectionConfig, now: f64) -> Option<String> {
    let observed = window.sum_bytes(Direction::ClientToServer, config.file_transfer_window_sec, now);
    let rate_kbps = (observed as f64 * 8.0) / (config.file_transfer_window_sec * 1024.0);
    if rate_kbps > config.file_transfer_rate_kbps {
        Some(format!(
            "Rule 3: sustained client->server rate of {:.1}kbps exceeds threshold of {:.0}kbps over {:.0}s",
            rate_kbps, config.file_transfer_rate_kbps, config.file_transfer_window_sec
        ))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_samples(window: &mut RollingWindow, n: usize, dir: Direction, bytes: u64, start_t: f64, step: f64) {
        for i in 0..n {
            window.append(Sample { timestamp: start_t + i as f64 * step, direction: dir, bytes });
        }
    }

    #[test]
    fn s1_clipboard_burst_fires_rule1() {
        let config = DetectionConfig::default();
        let mut window = RollingWindow::new(100);
        push_samples(&mut window, 9, Direction::ClientToServer, 0, 0.0, 0.1);
        let sample = Sample { timestamp: 1.0, direction: Direction::ClientToServer, bytes: 204_801 };
        window.append(sample);

        let verdict = evaluate(&window, sample, &config, 1.0);
        assert!(verdict.is_alert);
        assert!(verdict.reasons.iter().any(|r| r.contains("Rule 1") && r.contains("200")));
    }

    #[test]
    fn s2_frameburst_fires_rule2() {
        let config = DetectionConfig::default();
        let mut window = RollingWindow::new(100);
        let sample = Sample { timestamp: 0.0, direction: Direction::ServerToClient, bytes: 10_485_761 };
        window.append(sample);

        let verdict = evaluate(&window, sample, &config, 0.0);
        assert!(verdict.is_alert);
        assert!(verdict.reasons.iter().any(|r| r.contains("Rule 2") && r.contains("server_to_client")));
    }

    #[test]
    fn s3_sustained_rate_fires_rule3() {
        let config = DetectionConfig::default();
        let mut window = RollingWindow::new(100);
        let mut last = Sample { timestamp: 0.0, direction: Direction::ClientToServer, bytes: 0 };
        for i in 0..10 {
            let t = i as f64 * 0.4;
            last = Sample { timestamp: t, direction: Direction::ClientToServer, bytes: 80_000 };
            window.append(last);
        }

        let verdict = evaluate(&window, last, &config, last.timestamp);
        assert!(verdict.is_alert);
        assert!(verdict.reasons.iter().any(|r| r.contains("Rule 3")));
    }

    #[test]
    fn s4_small_clipboard_with_empty_history_does_not_alert() {
        let config = DetectionConfig::default();
        let mut window = RollingWindow::new(100);
        let sample = Sample { timestamp: 0.0, direction: Direction::ClientToServer, bytes: 50 * 1024 };
        window.append(sample);

        let verdict = evaluate(&window, sample, &config, 0.0);
        assert!(!verdict.is_alert);
        assert!(verdict.reasons.is_empty());
    }

    #[test]
    fn both_r1_and_r3_can_fire_on_the_same_chunk() {
        let config = DetectionConfig::default();
        let mut window = RollingWindow::new(100);
        let mut last = Sample { timestamp: 0.0, direction: Direction::ClientToServer, bytes: 0 };
        // 9 prior big samples within both the 10-sample and 5s windows.
        for i in 0..9 {
            let t = i as f64 * 0.2;
            last = Sample { timestamp: t, direction: Direction::ClientToServer, bytes: 30_000 };
            window.append(last);
        }
        last = Sample { timestamp: 1.8, direction: Direction::ClientToServer, bytes: 30_000 };
        window.append(last);

        let verdict = evaluate(&window, last, &config, last.timestamp);
        assert!(verdict.reasons.iter().any(|r| r.contains("Rule 1")));
        assert!(verdict.reasons.iter().any(|r| r.contains("Rule 3")));
    }

    #[test]
    fn rule_evaluation_is_pure() {
        let config = DetectionConfig::default();
        let mut window = RollingWindow::new(100);
        let sample = Sample { timestamp: 0.0, direction: Direction::ServerToClient, bytes: 20_000_000 };
        window.append(sample);

        let v1 = evaluate(&window, sample, &config, 0.0);
        let v2 = evaluate(&window, sample, &config, 0.0);
        assert_eq!(v1, v2);
    }
}
