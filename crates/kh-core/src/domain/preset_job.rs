use serde::{Deserialize, Serialize};

/// Attack mode identifiers, preserving hashcat's own numbering so stored
/// values match what the agent protocol and hashcat command line expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum AttackMode {
    Straight = 0,
    Combination = 1,
    BruteForce = 3,
    HybridWordlistMask = 6,
    HybridMaskWordlist = 7,
}

impl AttackMode {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Straight),
            1 => Some(Self::Combination),
            3 => Some(Self::BruteForce),
            6 => Some(Self::HybridWordlistMask),
            7 => Some(Self::HybridMaskWordlist),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetJob {
    pub id: i64,
    pub name: String,
    pub attack_mode: AttackMode,
    pub wordlist_ids: Vec<i64>,
    pub rule_ids: Vec<i64>,
    pub mask: Option<String>,
    pub priority: i32,
    pub chunk_duration_seconds: u64,
    pub is_small_job: bool,
    pub allow_high_priority_override: bool,
    pub binary_version_id: i64,
    pub additional_args: Option<String>,
}
