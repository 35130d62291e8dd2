use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::map_sqlx_error;

/// A client with retention enabled, and the cutoff below which its
/// hashlists are eligible for deletion (§4.10).
#[derive(Debug, Clone, Copy)]
pub struct RetentionCandidate {
    pub client_id: i64,
    pub cutoff: DateTime<Utc>,
}

/// Persistence boundary for the Retention Worker. Kept separate from
/// [`crate::HashlistStore`] since its deletes span `clients`,
/// `hashlists`, `hashlist_hashes`, and `hashes` rather than the
/// single-hashlist operations the rest of the scheduler needs.
#[async_trait]
pub trait RetentionStore: Send + Sync {
    /// Every client with `data_retention_months > 0`, paired with the
    /// cutoff timestamp computed against `now`.
    async fn list_retention_candidates(
        &self,
        now: DateTime<Utc>,
    ) -> kh_core::error::KrakenResult<Vec<RetentionCandidate>>;

    /// Hashlist ids belonging to `client_id` created before `cutoff`.
    async fn list_expired_hashlists(
        &self,
        client_id: i64,
        cutoff: DateTime<Utc>,
    ) -> kh_core::error::KrakenResult<Vec<i64>>;

    /// Deletes one hashlist and cascades per §3/§4.10: the `hashlist_hashes`
    /// rows disappear via `ON DELETE CASCADE`, and any hash left with no
    /// remaining `hashlist_hashes` reference is deleted too. Runs as one
    /// transaction so a crash mid-sweep cannot leave an orphaned hash
    /// pointing at a deleted hashlist.
    async fn delete_hashlist_cascade(&self, hashlist_id: i64) -> kh_core::error::KrakenResult<()>;
}

pub struct PgRetentionStore {
    pool: PgPool,
}

impl PgRetentionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RetentionStore for PgRetentionStore {
    async fn list_retention_candidates(
        &self,
        now: DateTime<Utc>,
    ) -> kh_core::error::KrakenResult<Vec<RetentionCandidate>> {
        let rows: Vec<(i64, i32)> = sqlx::query_as(
            "SELECT id, data_retention_months FROM clients WHERE data_retention_months > 0",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("retention candidates", e))?;

        Ok(rows
            .into_iter()
            .map(|(client_id, months)| RetentionCandidate {
                client_id,
                cutoff: now - chrono::Duration::days(30 * months as i64),
            })
            .collect())
    }

    async fn list_expired_hashlists(
        &self,
        client_id: i64,
        cutoff: DateTime<Utc>,
    ) -> kh_core::error::KrakenResult<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT id FROM hashlists WHERE client_id = $1 AND created_at < $2",
        )
        .bind(client_id)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("expired hashlists for client {client_id}"), e))?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn delete_hashlist_cascade(&self, hashlist_id: i64) -> kh_core::error::KrakenResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin retention delete", e))?;

        let hash_ids: Vec<(uuid::Uuid,)> = sqlx::query_as(
            "SELECT hash_id FROM hashlist_hashes WHERE hashlist_id = $1",
        )
        .bind(hashlist_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(&format!("hash ids for hashlist {hashlist_id}"), e))?;

        sqlx::query("DELETE FROM hashlists WHERE id = $1")
            .bind(hashlist_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(&format!("delete hashlist {hashlist_id}"), e))?;

        for (hash_id,) in hash_ids {
            sqlx::query(
                r#"
                DELETE FROM hashes
                WHERE id = $1
                  AND NOT EXISTS (SELECT 1 FROM hashlist_hashes WHERE hash_id = $1)
                "#,
            )
            .bind(hash_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(&format!("orphan hash cleanup {hash_id}"), e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit retention delete", e))?;
        Ok(())
    }
}
