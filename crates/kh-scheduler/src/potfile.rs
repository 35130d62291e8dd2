//! Potfile writer (§4.7 `crack()`, spec.md "(d) append to the owning
//! client's potfile" / "writes are serialised by a per-client file lock"):
//! appends newly-cracked `hash:password` lines to one append-only file per
//! client. Writes for the same client are serialized through a
//! `tokio::sync::Mutex` kept in a `DashMap` keyed by client id — the same
//! concurrent-map idiom `AgentSessionTracker` uses for per-agent state —
//! so concurrent cracks belonging to different clients never block each
//! other, while cracks for the same client never interleave mid-line.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use kh_core::error::{KrakenError, KrakenResult};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

pub struct PotfileWriter {
    root: PathBuf,
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl PotfileWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, client_id: i64) -> Arc<Mutex<()>> {
        self.locks.entry(client_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    fn path_for(&self, client_id: i64) -> PathBuf {
        self.root.join(format!("{client_id}.potfile"))
    }

    /// Appends one line for a newly-cracked hash. Holds the client's lock
    /// for the duration of the file open-and-write so two cracks for the
    /// same client can never produce an interleaved line.
    pub async fn append(
        &self,
        client_id: i64,
        hash_value: &str,
        username: Option<&str>,
        password: &str,
    ) -> KrakenResult<()> {
        let lock = self.lock_for(client_id);
        let _guard = lock.lock().await;

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| KrakenError::InternalError(format!("create potfile directory: {e}")))?;

        let line = match username {
            Some(u) if !u.is_empty() => format!("{hash_value}:{u}:{password}\n"),
            _ => format!("{hash_value}:{password}\n"),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(client_id))
            .await
            .map_err(|e| KrakenError::InternalError(format!("open potfile for client {client_id}: {e}")))?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| KrakenError::InternalError(format!("write potfile for client {client_id}: {e}")))?;
        Ok(())
    }
}
