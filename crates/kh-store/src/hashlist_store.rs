use async_trait::async_trait;
use kh_core::error::KrakenResult;
use sqlx::PgPool;
use uuid::Uuid;

use crate::map_sqlx_error;
use crate::models::{HashRow, HashlistRow};
use kh_core::domain::{Hash, Hashlist};

/// Result of [`HashlistStore::apply_crack`]: which hashlists had their
/// `cracked_hashes` counter bumped because they reference the hash that
/// just transitioned from uncracked to cracked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrackApplication {
    pub hash_id: Uuid,
    pub newly_cracked: bool,
    pub affected_hashlist_ids: Vec<i64>,
}

#[async_trait]
pub trait HashlistStore: Send + Sync {
    async fn get_hashlist(&self, hashlist_id: i64) -> KrakenResult<Hashlist>;
    async fn get_hash(&self, hashlist_id: i64, hash_value: &str) -> KrakenResult<Option<Hash>>;

    /// Upserts the crack onto the hash row and, if it is the hash's first
    /// crack, increments `cracked_hashes` on every hashlist that contains
    /// it — not just the hashlist the originating task targeted. Runs as
    /// one transaction so a crash between the hash upsert and the counter
    /// propagation can never be observed.
    async fn apply_crack(
        &self,
        hash_value: &str,
        hash_type_id: i32,
        password: &str,
        username: Option<&str>,
    ) -> KrakenResult<CrackApplication>;

    /// Recomputes `cracked_hashes` from a live `COUNT` over `hashlist_hashes`
    /// joined to `hashes`, correcting any drift from the incremental
    /// counter (invariant 4).
    async fn sync_cracked_count(&self, hashlist_id: i64) -> KrakenResult<i64>;

    async fn exclude_from_potfile(&self, hashlist_id: i64) -> KrakenResult<bool>;
}

pub struct PgHashlistStore {
    pool: PgPool,
}

impl PgHashlistStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HashlistStore for PgHashlistStore {
    async fn get_hashlist(&self, hashlist_id: i64) -> KrakenResult<Hashlist> {
        let row: HashlistRow = sqlx::query_as(
            r#"
            SELECT id, name, owner_id, client_id, hash_type_id, file_path, total_hashes,
                   cracked_hashes, status, exclude_from_potfile, created_at
            FROM hashlists
            WHERE id = $1
            "#,
        )
        .bind(hashlist_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("hashlist {hashlist_id}"), e))?;
        Ok(row.into())
    }

    async fn get_hash(&self, hashlist_id: i64, hash_value: &str) -> KrakenResult<Option<Hash>> {
        let row: Option<HashRow> = sqlx::query_as(
            r#"
            SELECT h.id, h.hash_type_id, h.hash_value, h.original_hash, h.username,
                   h.domain, h.is_cracked, h.password
            FROM hashes h
            JOIN hashlist_hashes hh ON hh.hash_id = h.id
            WHERE hh.hashlist_id = $1 AND h.hash_value = $2
            "#,
        )
        .bind(hashlist_id)
        .bind(hash_value)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("hash lookup in hashlist {hashlist_id}"), e))?;
        Ok(row.map(Into::into))
    }

    async fn apply_crack(
        &self,
        hash_value: &str,
        hash_type_id: i32,
        password: &str,
        username: Option<&str>,
    ) -> KrakenResult<CrackApplication> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin crack transaction", e))?;

        let row: HashRow = sqlx::query_as(
            r#"
            SELECT id, hash_type_id, hash_value, original_hash, username, domain,
                   is_cracked, password
            FROM hashes
            WHERE hash_type_id = $1 AND hash_value = $2
            FOR UPDATE
            "#,
        )
        .bind(hash_type_id)
        .bind(hash_value)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(&format!("lock hash {hash_value}"), e))?;

        let mut hash: Hash = row.into();
        let newly_cracked = hash.apply_crack(password, username);

        sqlx::query(
            "UPDATE hashes SET is_cracked = true, password = $2, username = $3 WHERE id = $1",
        )
        .bind(hash.id)
        .bind(&hash.password)
        .bind(&hash.username)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(&format!("update hash {}", hash.id), e))?;

        let mut affected_hashlist_ids = Vec::new();
        if newly_cracked {
            let ids: Vec<(i64,)> = sqlx::query_as(
                "SELECT hashlist_id FROM hashlist_hashes WHERE hash_id = $1",
            )
            .bind(hash.id)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(&format!("find hashlists for hash {}", hash.id), e))?;
            affected_hashlist_ids = ids.into_iter().map(|(id,)| id).collect();

            sqlx::query(
                r#"
                UPDATE hashlists
                SET cracked_hashes = cracked_hashes + 1
                WHERE id = ANY($1)
                "#,
            )
            .bind(&affected_hashlist_ids)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("increment cracked_hashes counters", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit crack transaction", e))?;

        Ok(CrackApplication {
            hash_id: hash.id,
            newly_cracked,
            affected_hashlist_ids,
        })
    }

    async fn sync_cracked_count(&self, hashlist_id: i64) -> KrakenResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM hashlist_hashes hh
            JOIN hashes h ON h.id = hh.hash_id
            WHERE hh.hashlist_id = $1 AND h.is_cracked = true
            "#,
        )
        .bind(hashlist_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("count cracked hashes for hashlist {hashlist_id}"), e))?;

        sqlx::query("UPDATE hashlists SET cracked_hashes = $2 WHERE id = $1")
            .bind(hashlist_id)
            .bind(count)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(&format!("sync cracked_hashes for hashlist {hashlist_id}"), e))?;

        Ok(count)
    }

    async fn exclude_from_potfile(&self, hashlist_id: i64) -> KrakenResult<bool> {
        let (exclude,): (bool,) =
            sqlx::query_as("SELECT exclude_from_potfile FROM hashlists WHERE id = $1")
                .bind(hashlist_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_sqlx_error(&format!("hashlist {hashlist_id}"), e))?;
        Ok(exclude)
    }
}
