//! Per-connection Session state (spec.md §3, §4.5): endpoints, traffic
//! counters, the rolling window, and the CONTAINED state transition.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

use sensor_detect::{DetectionConfig, Direction, Event, MlModel, RollingWindow, Sample, Verdict};
use tokio::sync::{Mutex, Notify};

const STATE_ACTIVE: u8 = 0;
const STATE_CONTAINED: u8 = 1;
const STATE_CLOSED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Contained,
    Closed,
}

impl From<u8> for SessionState {
    fn from(v: u8) -> Self {
        match v {
            STATE_CONTAINED => SessionState::Contained,
            STATE_CLOSED => SessionState::Closed,
            _ => SessionState::Active,
        }
    }
}

/// Traffic counters mirrored into alert payloads (spec.md §6
/// `session_stats`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionCounters {
    pub c2s_bytes: u64,
    pub s2c_bytes: u64,
    pub c2s_packets: u64,
    pub s2c_packets: u64,
}

struct SessionInner {
    window: RollingWindow,
    counters: SessionCounters,
}

/// One client TCP connection. Owned by the accept loop; mutated only by
/// the two forwarder tasks sharing it (spec.md §3).
pub struct Session {
    pub session_id: String,
    pub client_endpoint: String,
    pub upstream_endpoint: String,
    start: Instant,
    state: AtomicU8,
    inner: Mutex<SessionInner>,
    /// Signals both forwarder tasks the instant `contain()` succeeds, so
    /// the direction that did NOT detect containment wakes from a
    /// blocked read immediately instead of on its next natural read
    /// timeout (spec.md §4.5: "also close both sockets to end the peer
    /// loop"; §4.5 "Both read loops detect the state change and close").
    contained_notify: Notify,
}

impl Session {
    pub fn new(session_id: String, client_endpoint: String, upstream_endpoint: String, window_capacity: usize) -> Self {
        Self {
            session_id,
            client_endpoint,
            upstream_endpoint,
            start: Instant::now(),
            state: AtomicU8::new(STATE_ACTIVE),
            inner: Mutex::new(SessionInner { window: RollingWindow::new(window_capacity), counters: SessionCounters::default() }),
            contained_notify: Notify::new(),
        }
    }

    /// Future that resolves the next time `contain()` succeeds. Callers
    /// must obtain this *before* re-checking `state()` so a containment
    /// that lands between the check and the wait is not missed (tokio's
    /// documented `Notify` race-free pattern).
    pub fn contained(&self) -> impl std::future::Future<Output = ()> + '_ {
        self.contained_notify.notified()
    }

    /// Seconds elapsed since the session was created, monotonic and
    /// fractional as spec.md §3 requires of `Sample.timestamp`.
    pub fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn state(&self) -> SessionState {
        SessionState::from(self.state.load(Ordering::SeqCst))
    }

    /// Atomically transitions ACTIVE -> CONTAINED. Idempotent: returns
    /// `true` only the first time, `false` on every subsequent call
    /// (spec.md §7 "containment race" — second caller sees
    /// already-contained).
    pub fn contain(&self) -> bool {
        let won = self.state.compare_exchange(STATE_ACTIVE, STATE_CONTAINED, Ordering::SeqCst, Ordering::SeqCst).is_ok();
        if won {
            self.contained_notify.notify_waiters();
        }
        won
    }

    pub fn close(&self) {
        let _ = self.state.compare_exchange(STATE_ACTIVE, STATE_CLOSED, Ordering::SeqCst, Ordering::SeqCst);
    }

    pub async fn counters(&self) -> SessionCounters {
        self.inner.lock().await.counters
    }

    /// Appends a sample and runs the detection engine against it, all
    /// under the session's exclusive lock so C2/C4 read a consistent
    /// window snapshot (spec.md §5 "ordering guarantees").
    pub async fn observe_chunk(
        &self,
        direction: Direction,
        bytes: u64,
        config: &DetectionConfig,
        model: &dyn MlModel,
    ) -> (Verdict, SessionCounters) {
        let timestamp = self.now();
        let event = Event::from_chunk(direction, bytes, timestamp);
        let mut inner = self.inner.lock().await;
        inner.window.append_event(&event);
        match direction {
            Direction::ClientToServer => {
                inner.counters.c2s_bytes += bytes;
                inner.counters.c2s_packets += 1;
            }
            Direction::ServerToClient => {
                inner.counters.s2c_bytes += bytes;
                inner.counters.s2c_packets += 1;
            }
        }
        let verdict = sensor_detect::evaluate(&inner.window, &event, config, model);
        (verdict, inner.counters)
    }

    pub async fn recent_samples(&self, n: usize) -> Vec<Sample> {
        self.inner.lock().await.window.tail(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensor_detect::NullModel;
    use std::sync::Arc;

    #[tokio::test]
    async fn contain_is_one_shot() {
        let session = Session::new("s1".to_string(), "c".to_string(), "u".to_string(), 100);
        assert!(session.contain());
        assert!(!session.contain());
        assert_eq!(session.state(), SessionState::Contained);
    }

    #[tokio::test]
    async fn contain_wakes_a_peer_parked_on_contained() {
        let session = Arc::new(Session::new("s1".to_string(), "c".to_string(), "u".to_string(), 100));
        let waiter = session.clone();
        let parked = tokio::spawn(async move {
            waiter.contained().await;
        });
        // give the spawned task a chance to start waiting
        tokio::task::yield_now().await;
        assert!(session.contain());
        tokio::time::timeout(std::time::Duration::from_secs(1), parked).await.expect("peer should wake promptly").unwrap();
    }

    #[tokio::test]
    async fn observe_chunk_updates_counters_and_window() {
        let session = Session::new("s1".to_string(), "c".to_string(), "u".to_string(), 100);
        let config = DetectionConfig::default();
        let (_, counters) = session.observe_chunk(Direction::ClientToServer, 1024, &config, &NullModel).await;
        assert_eq!(counters.c2s_bytes, 1024);
        assert_eq!(counters.c2s_packets, 1);
        assert_eq!(session.recent_samples(10).await.len(), 1);
    }
}
