use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashlistStatus {
    Uploading,
    Ready,
    Processing,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hashlist {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
    pub client_id: i64,
    pub hash_type_id: i32,
    pub file_path: String,
    pub total_hashes: i64,
    /// Denormalised counter; maintained by Crack Accounting (§4.7) and
    /// reconcilable from a `COUNT` query via `SyncCrackedCount`.
    pub cracked_hashes: i64,
    pub status: HashlistStatus,
    pub exclude_from_potfile: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hash {
    pub id: Uuid,
    pub hash_type_id: i32,
    pub hash_value: String,
    pub original_hash: Option<String>,
    pub username: Option<String>,
    pub domain: Option<String>,
    pub is_cracked: bool,
    pub password: Option<String>,
}

impl Hash {
    /// Applies a crack result, returning whether the hash transitioned from
    /// uncracked to cracked (the signal that drives counter propagation in
    /// §4.4 and §4.7). Idempotent: re-applying the same password on an
    /// already-cracked hash is a no-op that returns `false`.
    pub fn apply_crack(&mut self, password: &str, username: Option<&str>) -> bool {
        let was_cracked = self.is_cracked;
        self.is_cracked = true;
        self.password = Some(password.to_string());
        if self.username.is_none() {
            self.username = username.map(|u| u.to_string());
        }
        !was_cracked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uncracked_hash() -> Hash {
        Hash {
            id: Uuid::new_v4(),
            hash_type_id: 0,
            hash_value: "abc123".into(),
            original_hash: None,
            username: None,
            domain: None,
            is_cracked: false,
            password: None,
        }
    }

    #[test]
    fn first_crack_transitions_and_reports_true() {
        let mut hash = uncracked_hash();
        assert!(hash.apply_crack("hunter2", Some("alice")));
        assert!(hash.is_cracked);
        assert_eq!(hash.password.as_deref(), Some("hunter2"));
        assert_eq!(hash.username.as_deref(), Some("alice"));
    }

    #[test]
    fn duplicate_crack_is_idempotent() {
        let mut hash = uncracked_hash();
        assert!(hash.apply_crack("hunter2", None));
        assert!(!hash.apply_crack("hunter2", None));
        assert_eq!(hash.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn username_is_not_overwritten_once_set() {
        let mut hash = uncracked_hash();
        hash.apply_crack("hunter2", Some("alice"));
        hash.apply_crack("hunter2", Some("bob"));
        assert_eq!(hash.username.as_deref(), Some("alice"));
    }
}
