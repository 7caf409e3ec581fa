//! Tracks which sessions the sink has already asked to be contained, so
//! a concurrent external containment command and a natural verdict
//! containment race resolve idempotently (spec.md §7 "containment
//! race").

use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    contained: DashMap<String, ()>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `session_id` contained. Returns `true` the first time,
    /// `false` if it was already marked.
    pub fn mark_contained(&self, session_id: &str) -> bool {
        self.contained.insert(session_id.to_string(), ()).is_none()
    }

    pub fn is_contained(&self, session_id: &str) -> bool {
        self.contained.contains_key(session_id)
    }
}
