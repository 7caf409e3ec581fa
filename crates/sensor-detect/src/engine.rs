//! C5: Detection Engine — the stateless orchestrator tying C1-C4
//! together. All history lives in the caller-owned `RollingWindow`; the
//! engine itself holds no per-session state (spec.md §4.4).

use crate::config::DetectionConfig;
use crate::features;
use crate::model::{DetectionMethod, Event, Severity, Verdict};
use crate::rules;
use crate::scorer::MlModel;
use crate::window::RollingWindow;

/// Evaluates one event against `window` (already appended to by the
/// caller, per spec.md §4.5 step 2-3 ordering) using `model` for
/// scoring. Has no side effects; calling it twice with the same
/// arguments returns the same verdict.
pub fn evaluate(window: &RollingWindow, event: &Event, config: &DetectionConfig, model: &dyn MlModel) -> Verdict {
    let rule_verdict = rules::evaluate(window, event.sample(), config, event.timestamp);

    let feature_vector = features::extract(event, window);
    let score_result = model.predict(&feature_vector);
    let ml_alert = score_result.score > config.ml_threshold;

    let mut detection_methods = Vec::with_capacity(2);
    if rule_verdict.is_alert {
        detection_methods.push(DetectionMethod::Rule);
    }
    if ml_alert {
        detection_methods.push(DetectionMethod::Ml);
    }

    let mut reasons = rule_verdict.reasons.clone();
    if ml_alert {
        reasons.push(format!("ML score {:.2} exceeds threshold {:.2}", score_result.score, config.ml_threshold));
    }

    let severity = match (rule_verdict.is_alert, ml_alert) {
        (false, false) => Severity::Low,
        (true, false) | (false, true) => Severity::Medium,
        (true, true) => Severity::High,
    };

    Verdict {
        is_alert: rule_verdict.is_alert || ml_alert,
        detection_methods,
        reasons,
        severity,
        ml_score: score_result.score,
        feature_importance: score_result.feature_importance,
    }
}
