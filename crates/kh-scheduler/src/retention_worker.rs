//! Retention Worker (§4.10): periodically deletes hashlists past a
//! client's retention window and any hash left orphaned by that delete.
//! A thin orchestration layer over [`kh_store::RetentionStore`] — the
//! transactional cascade itself lives in the store implementation; this
//! module only owns the sweep loop and per-hashlist error isolation so one
//! bad delete doesn't abort the whole cycle (§7).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kh_store::RetentionStore;
use tracing::warn;

/// Outcome of one sweep: hashlists actually deleted versus ones that
/// failed and were skipped, each tagged with the error that caused the
/// skip.
#[derive(Debug, Default)]
pub struct RetentionSweepSummary {
    pub deleted_hashlist_ids: Vec<i64>,
    pub failed: Vec<(i64, String)>,
}

pub struct RetentionWorker {
    store: Arc<dyn RetentionStore>,
}

impl RetentionWorker {
    pub fn new(store: Arc<dyn RetentionStore>) -> Self {
        Self { store }
    }

    /// One sweep across every client with retention enabled. A failure to
    /// list a given client's expired hashlists, or to delete one of them,
    /// is recorded and the sweep continues with the next client/hashlist
    /// rather than aborting (§7: a single bad row must not block the
    /// whole worker).
    pub async fn sweep(&self, now: DateTime<Utc>) -> kh_core::error::KrakenResult<RetentionSweepSummary> {
        let mut summary = RetentionSweepSummary::default();

        let candidates = self.store.list_retention_candidates(now).await?;
        for candidate in candidates {
            let expired = match self
                .store
                .list_expired_hashlists(candidate.client_id, candidate.cutoff)
                .await
            {
                Ok(ids) => ids,
                Err(err) => {
                    warn!(client_id = candidate.client_id, error = %err, "failed to list expired hashlists");
                    summary.failed.push((candidate.client_id, err.to_string()));
                    continue;
                }
            };

            for hashlist_id in expired {
                match self.store.delete_hashlist_cascade(hashlist_id).await {
                    Ok(()) => summary.deleted_hashlist_ids.push(hashlist_id),
                    Err(err) => {
                        warn!(hashlist_id, error = %err, "failed to delete expired hashlist");
                        summary.failed.push((hashlist_id, err.to_string()));
                    }
                }
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kh_core::error::{KrakenError, KrakenResult};
    use kh_store::RetentionCandidate;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeRetentionStore {
        candidates: Vec<RetentionCandidate>,
        expired: Vec<(i64, Vec<i64>)>,
        fail_delete: Vec<i64>,
        deleted: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl RetentionStore for FakeRetentionStore {
        async fn list_retention_candidates(&self, _now: DateTime<Utc>) -> KrakenResult<Vec<RetentionCandidate>> {
            Ok(self.candidates.clone())
        }

        async fn list_expired_hashlists(&self, client_id: i64, _cutoff: DateTime<Utc>) -> KrakenResult<Vec<i64>> {
            Ok(self
                .expired
                .iter()
                .find(|(id, _)| *id == client_id)
                .map(|(_, ids)| ids.clone())
                .unwrap_or_default())
        }

        async fn delete_hashlist_cascade(&self, hashlist_id: i64) -> KrakenResult<()> {
            if self.fail_delete.contains(&hashlist_id) {
                return Err(KrakenError::InternalError("simulated delete failure".into()));
            }
            self.deleted.lock().unwrap().push(hashlist_id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn deletes_every_expired_hashlist_across_clients() {
        let store = Arc::new(FakeRetentionStore {
            candidates: vec![
                RetentionCandidate { client_id: 1, cutoff: Utc::now() },
                RetentionCandidate { client_id: 2, cutoff: Utc::now() },
            ],
            expired: vec![(1, vec![10, 11]), (2, vec![20])],
            ..Default::default()
        });
        let worker = RetentionWorker::new(store);
        let summary = worker.sweep(Utc::now()).await.unwrap();
        assert_eq!(summary.deleted_hashlist_ids, vec![10, 11, 20]);
        assert!(summary.failed.is_empty());
    }

    #[tokio::test]
    async fn one_failed_delete_does_not_block_the_rest() {
        let store = Arc::new(FakeRetentionStore {
            candidates: vec![RetentionCandidate { client_id: 1, cutoff: Utc::now() }],
            expired: vec![(1, vec![10, 11, 12])],
            fail_delete: vec![11],
            ..Default::default()
        });
        let worker = RetentionWorker::new(store);
        let summary = worker.sweep(Utc::now()).await.unwrap();
        assert_eq!(summary.deleted_hashlist_ids, vec![10, 12]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, 11);
    }

    #[tokio::test]
    async fn no_candidates_is_a_clean_no_op_sweep() {
        let store = Arc::new(FakeRetentionStore::default());
        let worker = RetentionWorker::new(store);
        let summary = worker.sweep(Utc::now()).await.unwrap();
        assert!(summary.deleted_hashlist_ids.is_empty());
        assert!(summary.failed.is_empty());
    }
}
