//! C8: Forensic Writer — canonicalizes an Alert into an immutable
//! on-disk record with a content hash (spec.md §4.7).

use sensor_storage::{FsStorage, StorageError};
use thiserror::Error;

use crate::model::{Alert, ForensicRecord};

#[derive(Debug, Error)]
pub enum ForensicError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to canonicalize forensic record: {0}")]
    Canonicalize(#[from] sensor_crypto::CryptoError),
}

pub struct ForensicWriter {
    storage: FsStorage,
    retries: u32,
}

impl ForensicWriter {
    pub async fn new(dir: impl Into<std::path::PathBuf>, retries: u32) -> Result<Self, StorageError> {
        Ok(Self { storage: FsStorage::new(dir).await?, retries })
    }

    /// Writes `alert`'s forensic record, retrying transient storage
    /// failures with exponential backoff (spec.md §7). The returned
    /// record's `hash` is SHA-256 of the canonical bytes with the hash
    /// field itself removed.
    pub async fn write(&self, alert: &Alert) -> Result<ForensicRecord, ForensicError> {
        let mut record = ForensicRecord {
            forensic_id: alert.alert_id.clone(),
            session_id: alert.session_id.clone(),
            event: alert.event.clone(),
            verdict: alert.verdict.clone(),
            hash: String::new(),
        };
        record.hash = sensor_crypto::hash_excluding_field(&record, "hash")?;
        self.storage.put_with_retry(&record.forensic_id, &record, self.retries).await?;
        Ok(record)
    }

    pub async fn read(&self, forensic_id: &str) -> Result<Option<ForensicRecord>, ForensicError> {
        match sensor_storage::StorageBackend::get(&self.storage, forensic_id).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(sensor_crypto::CryptoError::Canonicalize)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AlertStatus;
    use sensor_detect::{DetectionMethod, Direction, Event, Severity, Verdict};

    fn sample_alert() -> Alert {
        Alert {
            alert_id: "ALERT_1".to_string(),
            session_id: "SESSION_1".to_string(),
            client_ip: "10.0.0.1:1".to_string(),
            upstream_ip: "10.0.0.2:2".to_string(),
            event: Event::from_chunk(Direction::ClientToServer, 204_801, 1.0),
            verdict: Verdict {
                is_alert: true,
                detection_methods: vec![DetectionMethod::Rule],
                reasons: vec!["Rule 1: clipboard-style client->server burst".to_string()],
                severity: Severity::Medium,
                ml_score: 0.0,
                feature_importance: None,
            },
            status: AlertStatus::Open,
            contained: false,
            contained_at: None,
            forensic_hash: None,
            anchor_root: None,
        }
    }

    #[tokio::test]
    async fn write_produces_hash_excluding_itself_and_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ForensicWriter::new(dir.path(), 3).await.unwrap();
        let record = writer.write(&sample_alert()).await.unwrap();
        assert_eq!(record.hash.len(), 64);

        let read_back = writer.read(&record.forensic_id).await.unwrap().unwrap();
        assert_eq!(read_back.hash, record.hash);
    }

    #[tokio::test]
    async fn writing_the_same_alert_twice_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ForensicWriter::new(dir.path(), 3).await.unwrap();
        let a = writer.write(&sample_alert()).await.unwrap();
        let b = writer.write(&sample_alert()).await.unwrap();
        assert_eq!(a.hash, b.hash);
    }
}
