//! Detection-side building blocks shared by the proxy and the alert
//! sink: the rolling window store (C1), rule evaluator (C2), feature
//! extractor (C3), ML scorer (C4) and the orchestrating detection
//! engine (C5).

pub mod config;
pub mod engine;
pub mod features;
pub mod model;
pub mod rules;
pub mod scorer;
pub mod window;

pub use config::{DetectionConfig, ProxyConfig, SinkConfig};
pub use engine::evaluate;
pub use model::{DetectionMethod, Direction, Event, EventType, Sample, Severity, Verdict};
pub use scorer::{ForestModel, MlModel, NullModel, ScoreResult, ScorerError};
pub use window::RollingWindow;
