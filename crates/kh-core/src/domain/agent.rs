use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a compute agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Inactive,
    Error,
}

/// The kind of compute device an agent exposes to hashcat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Gpu,
    Cpu,
}

/// One hashcat-visible device on an agent (`-d` index, name, type, and
/// whether the operator has enabled it for scheduling).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub device_index: i32,
    pub name: String,
    pub kind: DeviceKind,
    pub enabled: bool,
    /// Vendor-specific fields (VRAM, driver version, temperature, ...) that
    /// do not have a stable typed shape across agent hardware. Kept as an
    /// opaque bag rather than spread through typed fields (§9 design notes).
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
    pub status: AgentStatus,
    pub enabled: bool,
    pub scheduling_enabled: bool,
    pub consecutive_failures: i32,
    pub timezone: chrono_tz::Tz,
    pub devices: Vec<Device>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub current_task_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// Whether the agent has at least one device enabled for scheduling.
    pub fn has_enabled_device(&self) -> bool {
        self.devices.iter().any(|d| d.enabled)
    }

    /// Whether `now` falls within `heartbeat_timeout` of the last heartbeat.
    pub fn is_alive(&self, now: DateTime<Utc>, heartbeat_timeout: chrono::Duration) -> bool {
        match self.last_heartbeat {
            Some(hb) => now - hb <= heartbeat_timeout,
            None => false,
        }
    }

    /// Base eligibility, independent of schedule windows and per-job
    /// gating handled elsewhere (§4.3 step 3, §4.8).
    pub fn is_eligible_base(&self, now: DateTime<Utc>, heartbeat_timeout: chrono::Duration) -> bool {
        self.status == AgentStatus::Active
            && self.enabled
            && self.current_task_id.is_none()
            && self.has_enabled_device()
            && self.is_alive(now, heartbeat_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_agent() -> Agent {
        Agent {
            id: 1,
            name: "agent-1".into(),
            owner_id: 1,
            status: AgentStatus::Active,
            enabled: true,
            scheduling_enabled: true,
            consecutive_failures: 0,
            timezone: chrono_tz::UTC,
            devices: vec![Device {
                device_index: 0,
                name: "GPU0".into(),
                kind: DeviceKind::Gpu,
                enabled: true,
                extra: Default::default(),
            }],
            last_heartbeat: Some(Utc::now()),
            current_task_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn agent_with_no_enabled_devices_is_ineligible() {
        let mut agent = base_agent();
        agent.devices[0].enabled = false;
        assert!(!agent.has_enabled_device());
        assert!(!agent.is_eligible_base(Utc::now(), chrono::Duration::seconds(90)));
    }

    #[test]
    fn agent_past_heartbeat_timeout_is_not_alive() {
        let mut agent = base_agent();
        agent.last_heartbeat = Some(Utc::now() - chrono::Duration::seconds(200));
        assert!(!agent.is_alive(Utc::now(), chrono::Duration::seconds(90)));
    }

    #[test]
    fn agent_already_assigned_a_task_is_ineligible() {
        let mut agent = base_agent();
        agent.current_task_id = Some(Uuid::new_v4());
        assert!(!agent.is_eligible_base(Utc::now(), chrono::Duration::seconds(90)));
    }
}
