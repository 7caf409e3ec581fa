//! Session Proxy (C6): transparent TCP bridge with inline rule+ML
//! monitoring and the containment half-close protocol.

pub mod alert_client;
pub mod forwarder;
pub mod session;

pub use alert_client::{AlertClient, AlertClientError, AlertPayload, AlertResponse};
pub use forwarder::{run, ProxyError};
pub use session::{Session, SessionCounters, SessionState};
