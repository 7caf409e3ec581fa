//! Alert Sink (C7), Forensic Writer (C8), and Merkle Anchor Service
//! (C9): the alert-handling core that fuses verdict replay with
//! tamper-evident persistence.

pub mod alert_sink;
pub mod anchor;
pub mod forensic;
pub mod http;
pub mod model;
pub mod registry;

pub use alert_sink::{AlertSink, ContainResponse, IncomingAlertPayload, SinkError, SinkResponse};
pub use anchor::{recompute_leaf_hashes, verify_anchor, AnchorError, AnchorService, VerifyOutcome};
pub use forensic::{ForensicError, ForensicWriter};
pub use model::{Alert, AlertStatus, Anchor, ForensicRecord};
pub use registry::SessionRegistry;
