//! Crack Accounting (§4.7): thin orchestration atop
//! [`HashlistStore::apply_crack`], which owns the actual transaction. This
//! module adds the two things that sit just outside that transaction: the
//! task's own `crack_count` and the potfile-append decision.

use kh_core::error::KrakenResult;
use kh_store::{HashlistStore, JobStore};
use uuid::Uuid;

/// What callers need after recording a crack: whether it was new, which
/// hashlists had their counters bumped, and whether it should be appended
/// to the owning client's potfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrackOutcome {
    pub newly_cracked: bool,
    pub affected_hashlist_ids: Vec<i64>,
    pub append_to_potfile: bool,
}

/// Records one `task_crack` report. Idempotent: replaying the same crack
/// twice leaves every counter unchanged (the law in §8), since
/// `apply_crack` only reports `newly_cracked = true` once per hash.
pub async fn record_crack(
    hashlists: &dyn HashlistStore,
    jobs: &dyn JobStore,
    task_id: Uuid,
    hashlist_id: i64,
    hash_value: &str,
    hash_type_id: i32,
    password: &str,
    username: Option<&str>,
) -> KrakenResult<CrackOutcome> {
    let application = hashlists
        .apply_crack(hash_value, hash_type_id, password, username)
        .await?;

    if application.newly_cracked {
        jobs.record_task_crack(task_id).await?;
    }

    let exclude = hashlists.exclude_from_potfile(hashlist_id).await?;

    Ok(CrackOutcome {
        newly_cracked: application.newly_cracked,
        affected_hashlist_ids: application.affected_hashlist_ids,
        append_to_potfile: application.newly_cracked && !exclude,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockAgentStore, MockHashlistStore, MockJobStore};
    use kh_core::domain::{Hash, Hashlist, HashlistStatus};
    use std::sync::Arc;

    fn hashlist(id: i64, exclude: bool) -> Hashlist {
        Hashlist {
            id,
            name: format!("L{id}"),
            owner_id: 1,
            client_id: 1,
            hash_type_id: 0,
            file_path: "/tmp/h".into(),
            total_hashes: 1,
            cracked_hashes: 0,
            status: HashlistStatus::Ready,
            exclude_from_potfile: exclude,
            created_at: chrono::Utc::now(),
        }
    }

    fn hash(value: &str) -> Hash {
        Hash {
            id: Uuid::new_v4(),
            hash_type_id: 0,
            hash_value: value.into(),
            original_hash: None,
            username: None,
            domain: None,
            is_cracked: false,
            password: None,
        }
    }

    #[tokio::test]
    async fn first_crack_bumps_task_and_is_not_excluded() {
        let hashlists = MockHashlistStore::new();
        hashlists.seed_hashlist(hashlist(1, false));
        hashlists.seed_hash(1, hash("e"));
        let jobs = Arc::new(MockJobStore::new());
        let _agents = MockAgentStore::new();

        let task_id = jobs.seed_running_task(Uuid::new_v4(), 1);

        let outcome = record_crack(&hashlists, jobs.as_ref(), task_id, 1, "e", 0, "pw", None)
            .await
            .unwrap();
        assert!(outcome.newly_cracked);
        assert!(outcome.append_to_potfile);
        assert_eq!(jobs.crack_count(task_id), 1);
    }

    #[tokio::test]
    async fn duplicate_crack_leaves_counters_unchanged() {
        let hashlists = MockHashlistStore::new();
        hashlists.seed_hashlist(hashlist(1, false));
        hashlists.seed_hash(1, hash("e"));
        let jobs = Arc::new(MockJobStore::new());
        let task_id = jobs.seed_running_task(Uuid::new_v4(), 1);

        record_crack(&hashlists, jobs.as_ref(), task_id, 1, "e", 0, "pw", None)
            .await
            .unwrap();
        let second = record_crack(&hashlists, jobs.as_ref(), task_id, 1, "e", 0, "pw", None)
            .await
            .unwrap();

        assert!(!second.newly_cracked);
        assert!(!second.append_to_potfile);
        assert_eq!(jobs.crack_count(task_id), 1);
    }

    #[tokio::test]
    async fn excluded_hashlist_never_appends_to_potfile() {
        let hashlists = MockHashlistStore::new();
        hashlists.seed_hashlist(hashlist(1, true));
        hashlists.seed_hash(1, hash("e"));
        let jobs = Arc::new(MockJobStore::new());
        let task_id = jobs.seed_running_task(Uuid::new_v4(), 1);

        let outcome = record_crack(&hashlists, jobs.as_ref(), task_id, 1, "e", 0, "pw", None)
            .await
            .unwrap();
        assert!(!outcome.append_to_potfile);
    }

    #[tokio::test]
    async fn crack_propagates_to_every_hashlist_referencing_the_hash() {
        // S6: L1 and L2 both contain H.
        let hashlists = MockHashlistStore::new();
        hashlists.seed_hashlist(hashlist(1, false));
        hashlists.seed_hashlist(hashlist(2, false));
        let h = hash("shared");
        hashlists.seed_hash(1, h.clone());
        hashlists.seed_hash(2, h);
        let jobs = Arc::new(MockJobStore::new());
        let task_id = jobs.seed_running_task(Uuid::new_v4(), 1);

        let outcome = record_crack(&hashlists, jobs.as_ref(), task_id, 1, "shared", 0, "pw", None)
            .await
            .unwrap();
        let mut ids = outcome.affected_hashlist_ids.clone();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(hashlists.cracked_hashes(1), 1);
        assert_eq!(hashlists.cracked_hashes(2), 1);

        let dup = record_crack(&hashlists, jobs.as_ref(), task_id, 1, "shared", 0, "pw", None)
            .await
            .unwrap();
        assert!(!dup.newly_cracked);
        assert_eq!(hashlists.cracked_hashes(1), 1);
        assert_eq!(hashlists.cracked_hashes(2), 1);
    }
}
