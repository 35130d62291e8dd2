//! The agent ↔ server WebSocket envelope and payloads (§6.1). This crate
//! defines only the wire types — opening the socket, authenticating the
//! upgrade, and routing bytes onto a live connection are out of scope (§1)
//! and left to a `SessionAuthenticator`/transport layer above this crate.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `{ "type": ..., "payload": ... }`, sent by the server to one agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    TaskDispatch(TaskDispatchPayload),
    TaskCancel(TaskCancelPayload),
    BenchmarkRequest(BenchmarkRequestPayload),
    FileSync(FileSyncPayload),
    AgentConfig(AgentConfigPayload),
}

/// `{ "type": ..., "payload": ... }`, sent by an agent to the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum AgentMessage {
    Heartbeat(HeartbeatPayload),
    TaskStarted(TaskStartedPayload),
    TaskProgress(TaskProgressPayload),
    TaskCrack(TaskCrackPayload),
    TaskCracks(TaskCracksPayload),
    TaskCompleted(TaskCompletedPayload),
    TaskFailed(TaskFailedPayload),
    BenchmarkResult(BenchmarkResultPayload),
    FileAck(FileAckPayload),
    DeviceReport(DeviceReportPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceStatus {
    pub device_index: i32,
    pub name: String,
    pub enabled: bool,
}

// --- Server -> Agent payloads ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDispatchPayload {
    pub task_id: Uuid,
    pub attack_cmd: String,
    pub hashlist_id: i64,
    pub hashlist_path: String,
    pub wordlist_paths: Vec<String>,
    pub rule_paths: Vec<String>,
    pub binary_version_id: i64,
    pub keyspace_start: i64,
    pub keyspace_end: i64,
    pub rule_chunk_path: Option<String>,
    pub devices: Vec<i32>,
    pub chunk_duration_seconds: u64,
    pub report_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskCancelPayload {
    pub task_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BenchmarkRequestPayload {
    pub attack_mode: i32,
    pub hash_type: i32,
    pub hashlist_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileSyncPayload {
    pub file_type: String,
    pub id: i64,
    pub path: String,
    pub md5: String,
    pub size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfigPayload {
    pub settings: serde_json::Map<String, serde_json::Value>,
}

// --- Agent -> Server payloads ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeartbeatPayload {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub devices: Vec<DeviceStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskStartedPayload {
    pub task_id: Uuid,
    pub pid: i64,
    pub actual_keyspace: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskProgressPayload {
    pub task_id: Uuid,
    pub keyspace_processed: i64,
    pub effective_keyspace_processed: i64,
    pub hash_rate: f64,
    pub progress_percent: f64,
    pub eta_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskCrackPayload {
    pub task_id: Uuid,
    pub hash: String,
    pub password: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskCracksPayload {
    pub task_id: Uuid,
    pub cracks: Vec<TaskCrackPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskCompletedPayload {
    pub task_id: Uuid,
    pub keyspace_processed: i64,
    pub actual_keyspace: Option<i64>,
    pub average_speed: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskFailedPayload {
    pub task_id: Uuid,
    pub error: String,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BenchmarkResultPayload {
    pub attack_mode: i32,
    pub hash_type: i32,
    pub speed: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileAckPayload {
    pub file_type: String,
    pub id: i64,
    pub md5: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceReportPayload {
    pub devices: Vec<DeviceStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_dispatch_serializes_with_tagged_envelope() {
        let msg = ServerMessage::TaskDispatch(TaskDispatchPayload {
            task_id: Uuid::nil(),
            attack_cmd: "hashcat -m 0".into(),
            hashlist_id: 1,
            hashlist_path: "/data/hashlists/1.txt".into(),
            wordlist_paths: vec!["/data/wordlists/rockyou.txt".into()],
            rule_paths: vec![],
            binary_version_id: 1,
            keyspace_start: 0,
            keyspace_end: 100,
            rule_chunk_path: None,
            devices: vec![0],
            chunk_duration_seconds: 600,
            report_interval_seconds: 5,
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "task_dispatch");
        assert_eq!(json["payload"]["task_id"], Uuid::nil().to_string());
    }

    #[test]
    fn agent_message_round_trips_through_json() {
        let msg = AgentMessage::TaskProgress(TaskProgressPayload {
            task_id: Uuid::new_v4(),
            keyspace_processed: 50,
            effective_keyspace_processed: 50,
            hash_rate: 123.4,
            progress_percent: 50.0,
            eta_seconds: Some(30),
        });
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: AgentMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn unknown_type_tag_fails_to_parse() {
        let raw = r#"{"type":"not_a_real_message","payload":{}}"#;
        assert!(serde_json::from_str::<AgentMessage>(raw).is_err());
    }
}
