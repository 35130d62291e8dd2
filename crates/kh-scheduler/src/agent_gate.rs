use chrono::{DateTime, Utc};
use kh_core::domain::schedule::agent_schedule_permits;
use kh_core::domain::{Agent, Schedule};

/// Full per-tick eligibility check for one agent (status/liveness/devices
/// from `Agent::is_eligible_base`, plus the schedule-window gate). A
/// benchmark check is deliberately not included here: a missing benchmark
/// means "send a benchmark_request first", not "this agent is ineligible".
pub fn agent_is_eligible(
    agent: &Agent,
    schedules: &[Schedule],
    now: DateTime<Utc>,
    heartbeat_timeout: chrono::Duration,
) -> bool {
    if !agent.is_eligible_base(now, heartbeat_timeout) {
        return false;
    }
    if !agent.scheduling_enabled {
        return true;
    }
    if schedules.is_empty() {
        return false;
    }
    agent_schedule_permits(schedules, now, agent.timezone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use kh_core::domain::{AgentStatus, Device, DeviceKind};

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

    fn always_on_schedule() -> Schedule {
        Schedule {
            agent_id: 1,
            weekday: Utc::now().weekday(),
            start_time: chrono::NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            end_time: chrono::NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
            timezone: chrono_tz::UTC,
            active: true,
        }
    }

    #[test]
    fn agent_with_no_schedule_rows_is_ineligible_when_scheduling_enabled() {
        let agent = base_agent();
        assert!(!agent_is_eligible(&agent, &[], Utc::now(), chrono::Duration::seconds(90)));
    }

    #[test]
    fn agent_with_scheduling_disabled_ignores_schedule_rows() {
        let mut agent = base_agent();
        agent.scheduling_enabled = false;
        assert!(agent_is_eligible(&agent, &[], Utc::now(), chrono::Duration::seconds(90)));
    }

    #[test]
    fn agent_outside_its_schedule_window_is_ineligible() {
        let agent = base_agent();
        let schedule = Schedule {
            start_time: chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: chrono::NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            ..always_on_schedule()
        };
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap();
        assert!(!agent_is_eligible(&agent, &[schedule], now, chrono::Duration::seconds(90)));
    }

    #[test]
    fn dead_agent_is_ineligible_regardless_of_schedule() {
        let mut agent = base_agent();
        agent.last_heartbeat = Some(Utc::now() - chrono::Duration::seconds(500));
        assert!(!agent_is_eligible(
            &agent,
            &[always_on_schedule()],
            Utc::now(),
            chrono::Duration::seconds(90)
        ));
    }
}
