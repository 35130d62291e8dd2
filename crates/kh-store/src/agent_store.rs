use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kh_core::domain::{Agent, AgentStatus, Benchmark, ClaimVoucher, Device, Schedule};
use kh_core::error::KrakenResult;
use sqlx::PgPool;
use uuid::Uuid;

use crate::map_sqlx_error;
use crate::models::{AgentRow, AgentStatusRow, BenchmarkRow, ClaimVoucherRow, DeviceRow, ScheduleRow};

#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn get_agent(&self, agent_id: i64) -> KrakenResult<Agent>;

    /// Agents with `enabled`, `scheduling_enabled`, and an active status —
    /// the base candidate pool the Scheduler Loop narrows with liveness,
    /// device, and schedule checks.
    async fn list_eligible_agents(&self) -> KrakenResult<Vec<Agent>>;

    async fn list_schedules_for_agent(&self, agent_id: i64) -> KrakenResult<Vec<Schedule>>;

    async fn get_benchmark(
        &self,
        agent_id: i64,
        attack_mode: i32,
        hash_type: i32,
    ) -> KrakenResult<Option<Benchmark>>;

    async fn upsert_benchmark(
        &self,
        agent_id: i64,
        attack_mode: i32,
        hash_type: i32,
        hashes_per_second: f64,
        recorded_at: DateTime<Utc>,
    ) -> KrakenResult<()>;

    async fn record_heartbeat(&self, agent_id: i64, devices: &[Device], at: DateTime<Utc>) -> KrakenResult<()>;

    async fn set_agent_status(&self, agent_id: i64, status: AgentStatus) -> KrakenResult<()>;

    async fn assign_current_task(&self, agent_id: i64, task_id: Option<Uuid>) -> KrakenResult<()>;

    async fn increment_consecutive_failures(&self, agent_id: i64) -> KrakenResult<i32>;
    async fn reset_consecutive_failures(&self, agent_id: i64) -> KrakenResult<()>;

    async fn get_claim_voucher(&self, code: &str) -> KrakenResult<ClaimVoucher>;
    async fn consume_claim_voucher(&self, code: &str, agent_id: i64, at: DateTime<Utc>) -> KrakenResult<()>;
}

pub struct PgAgentStore {
    pool: PgPool,
}

impl PgAgentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn devices_for(&self, agent_id: i64) -> KrakenResult<Vec<Device>> {
        let rows: Vec<DeviceRow> = sqlx::query_as(
            "SELECT device_index, name, kind, enabled, extra FROM agent_devices WHERE agent_id = $1 ORDER BY device_index ASC",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("devices for agent {agent_id}"), e))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn hydrate(&self, row: AgentRow) -> KrakenResult<Agent> {
        let devices = self.devices_for(row.id).await?;
        row.into_domain(devices)
    }
}

#[async_trait]
impl AgentStore for PgAgentStore {
    async fn get_agent(&self, agent_id: i64) -> KrakenResult<Agent> {
        let row: AgentRow = sqlx::query_as(
            r#"
            SELECT id, name, owner_id, status, enabled, scheduling_enabled,
                   consecutive_failures, timezone, last_heartbeat, current_task_id,
                   created_at, updated_at
            FROM agents
            WHERE id = $1
            "#,
        )
        .bind(agent_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("agent {agent_id}"), e))?;
        self.hydrate(row).await
    }

    async fn list_eligible_agents(&self) -> KrakenResult<Vec<Agent>> {
        let rows: Vec<AgentRow> = sqlx::query_as(
            r#"
            SELECT id, name, owner_id, status, enabled, scheduling_enabled,
                   consecutive_failures, timezone, last_heartbeat, current_task_id,
                   created_at, updated_at
            FROM agents
            WHERE enabled = true AND scheduling_enabled = true AND status = 'active'
              AND current_task_id IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list eligible agents", e))?;
        let mut agents = Vec::with_capacity(rows.len());
        for row in rows {
            agents.push(self.hydrate(row).await?);
        }
        Ok(agents)
    }

    async fn list_schedules_for_agent(&self, agent_id: i64) -> KrakenResult<Vec<Schedule>> {
        let rows: Vec<ScheduleRow> = sqlx::query_as(
            "SELECT agent_id, weekday, start_time, end_time, timezone, active FROM agent_schedules WHERE agent_id = $1",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("schedules for agent {agent_id}"), e))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn get_benchmark(
        &self,
        agent_id: i64,
        attack_mode: i32,
        hash_type: i32,
    ) -> KrakenResult<Option<Benchmark>> {
        let row: Option<BenchmarkRow> = sqlx::query_as(
            r#"
            SELECT agent_id, attack_mode, hash_type, hashes_per_second, recorded_at
            FROM agent_benchmarks
            WHERE agent_id = $1 AND attack_mode = $2 AND hash_type = $3
            "#,
        )
        .bind(agent_id)
        .bind(attack_mode)
        .bind(hash_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("benchmark for agent {agent_id}"), e))?;
        Ok(row.map(Into::into))
    }

    async fn upsert_benchmark(
        &self,
        agent_id: i64,
        attack_mode: i32,
        hash_type: i32,
        hashes_per_second: f64,
        recorded_at: DateTime<Utc>,
    ) -> KrakenResult<()> {
        sqlx::query(
            r#"
            INSERT INTO agent_benchmarks (agent_id, attack_mode, hash_type, hashes_per_second, recorded_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (agent_id, attack_mode, hash_type)
            DO UPDATE SET hashes_per_second = EXCLUDED.hashes_per_second, recorded_at = EXCLUDED.recorded_at
            "#,
        )
        .bind(agent_id)
        .bind(attack_mode)
        .bind(hash_type)
        .bind(hashes_per_second)
        .bind(recorded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("upsert benchmark for agent {agent_id}"), e))?;
        Ok(())
    }

    async fn record_heartbeat(&self, agent_id: i64, devices: &[Device], at: DateTime<Utc>) -> KrakenResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin heartbeat transaction", e))?;

        sqlx::query("UPDATE agents SET last_heartbeat = $2, updated_at = now() WHERE id = $1")
            .bind(agent_id)
            .bind(at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(&format!("update heartbeat for agent {agent_id}"), e))?;

        for device in devices {
            let kind = match device.kind {
                kh_core::domain::DeviceKind::Gpu => "gpu",
                kh_core::domain::DeviceKind::Cpu => "cpu",
            };
            sqlx::query(
                r#"
                INSERT INTO agent_devices (agent_id, device_index, name, kind, enabled, extra)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (agent_id, device_index)
                DO UPDATE SET name = EXCLUDED.name, kind = EXCLUDED.kind,
                              enabled = EXCLUDED.enabled, extra = EXCLUDED.extra
                "#,
            )
            .bind(agent_id)
            .bind(device.device_index)
            .bind(&device.name)
            .bind(kind)
            .bind(device.enabled)
            .bind(serde_json::Value::Object(device.extra.clone()))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(&format!("upsert device for agent {agent_id}"), e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit heartbeat transaction", e))?;
        Ok(())
    }

    async fn set_agent_status(&self, agent_id: i64, status: AgentStatus) -> KrakenResult<()> {
        let status_row: AgentStatusRow = status.into();
        sqlx::query("UPDATE agents SET status = $2, updated_at = now() WHERE id = $1")
            .bind(agent_id)
            .bind(status_row)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(&format!("set status for agent {agent_id}"), e))?;
        Ok(())
    }

    async fn assign_current_task(&self, agent_id: i64, task_id: Option<Uuid>) -> KrakenResult<()> {
        sqlx::query("UPDATE agents SET current_task_id = $2, updated_at = now() WHERE id = $1")
            .bind(agent_id)
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(&format!("assign current task for agent {agent_id}"), e))?;
        Ok(())
    }

    async fn increment_consecutive_failures(&self, agent_id: i64) -> KrakenResult<i32> {
        let (count,): (i32,) = sqlx::query_as(
            r#"
            UPDATE agents
            SET consecutive_failures = consecutive_failures + 1, updated_at = now()
            WHERE id = $1
            RETURNING consecutive_failures
            "#,
        )
        .bind(agent_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("increment failures for agent {agent_id}"), e))?;
        Ok(count)
    }

    async fn reset_consecutive_failures(&self, agent_id: i64) -> KrakenResult<()> {
        sqlx::query("UPDATE agents SET consecutive_failures = 0, updated_at = now() WHERE id = $1")
            .bind(agent_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(&format!("reset failures for agent {agent_id}"), e))?;
        Ok(())
    }

    async fn get_claim_voucher(&self, code: &str) -> KrakenResult<ClaimVoucher> {
        let row: ClaimVoucherRow = sqlx::query_as(
            "SELECT code, created_by, is_continuous, consumed_at, consumed_by_agent_id FROM claim_vouchers WHERE code = $1",
        )
        .bind(code)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("claim voucher {code}"), e))?;
        Ok(row.into())
    }

    async fn consume_claim_voucher(&self, code: &str, agent_id: i64, at: DateTime<Utc>) -> KrakenResult<()> {
        sqlx::query(
            r#"
            UPDATE claim_vouchers
            SET consumed_at = $2, consumed_by_agent_id = $3
            WHERE code = $1 AND is_continuous = false
            "#,
        )
        .bind(code)
        .bind(at)
        .bind(agent_id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("consume claim voucher {code}"), e))?;
        Ok(())
    }
}
