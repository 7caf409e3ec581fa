//! Shared configuration, loaded by both `sensor-proxy` and `sensor-sink`
//! from CLI flags / environment variables, layered CLI > env > default
//! (spec.md §6; grounded on `bpi-core/src/commands/config.rs`'s
//! load-from-env-with-default pattern, simplified since there is no
//! interactive `config set` surface here).

use serde::{Deserialize, Serialize};

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Rule thresholds and detection-engine knobs (spec.md §4.2, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// R1: clipboard-style burst threshold, in bytes.
    pub clipboard_threshold_bytes: u64,
    /// R2: single-sample server->client frameburst threshold, in bytes.
    pub frameburst_threshold_bytes: u64,
    /// R3: sustained client->server rate threshold, in kbps.
    pub file_transfer_rate_kbps: f64,
    /// R3: sustained-transfer evaluation window, in seconds.
    pub file_transfer_window_sec: f64,
    /// R1: sample-count window used for the clipboard-burst sum.
    pub clipboard_burst_samples: usize,
    /// ML alert threshold: `ml_alert iff ml_score > ml_threshold`.
    pub ml_threshold: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            clipboard_threshold_bytes: 200 * 1024,
            frameburst_threshold_bytes: 10 * 1024 * 1024,
            file_transfer_rate_kbps: 1000.0,
            file_transfer_window_sec: 5.0,
            clipboard_burst_samples: 10,
            ml_threshold: 0.5,
        }
    }
}

impl DetectionConfig {
    pub fn from_env(mut self) -> Self {
        self.ml_threshold = env_or("ML_THRESHOLD", self.ml_threshold);
        self
    }
}

/// Proxy-side (C6) configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub listen_addr: String,
    pub server_addr: String,
    pub alert_url: String,
    pub contain_on_alert: bool,
    pub detection: DetectionConfig,
    /// Max bytes read per forwarder iteration.
    pub max_chunk: usize,
    /// Ring capacity per session.
    pub window_capacity: usize,
    /// Bound on the upstream dial.
    pub connect_timeout_sec: u64,
    /// Bound on socket reads/writes.
    pub io_timeout_sec: u64,
    /// Bound on the synchronous alert POST.
    pub alert_timeout_sec: f64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:5900".to_string(),
            server_addr: "localhost:5901".to_string(),
            alert_url: "http://localhost:8000/api/v1/alerts".to_string(),
            contain_on_alert: false,
            detection: DetectionConfig::default().from_env(),
            max_chunk: 4096,
            window_capacity: crate::window::DEFAULT_CAPACITY,
            connect_timeout_sec: 30,
            io_timeout_sec: 30,
            alert_timeout_sec: env_or("ALERT_TIMEOUT_SEC", 5.0),
        }
    }
}

/// Sink-side (C7/C8/C9) configuration.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub detection: DetectionConfig,
    pub auto_contain_on_alert: bool,
    pub model_path: Option<String>,
    pub forensic_dir: String,
    pub anchor_dir: String,
    pub anchor_batch_size: usize,
    pub anchor_interval_sec: u64,
    /// Soft limit multiplier: force an out-of-schedule batch once the
    /// queue exceeds `anchor_batch_size * backpressure_multiplier`.
    pub backpressure_multiplier: usize,
    pub forensic_write_retries: u32,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default().from_env(),
            auto_contain_on_alert: false,
            model_path: std::env::var("MODEL_PATH").ok(),
            forensic_dir: env_or("FORENSIC_DIR", "forensic".to_string()),
            anchor_dir: env_or("ANCHOR_DIR", "anchors".to_string()),
            anchor_batch_size: env_or("ANCHOR_BATCH_SIZE", 100),
            anchor_interval_sec: env_or("ANCHOR_INTERVAL_SEC", 60),
            backpressure_multiplier: 10,
            forensic_write_retries: 5,
        }
    }
}
