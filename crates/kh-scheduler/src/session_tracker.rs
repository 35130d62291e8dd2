//! Agent Session Tracker (§4.9): the in-memory socket ↔ agent map, the
//! reconnect grace timer, and the connect/disconnect/heartbeat bookkeeping
//! that drives a task into and out of `reconnect_pending`.
//!
//! Per §9 design notes, the socket map is the only piece of global mutable
//! state this crate owns besides the scheduler's ready-queue view, and it
//! is rebuildable from incoming reconnects after a crash/restart — nothing
//! here is itself durable.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use kh_core::domain::Device;
use kh_core::error::KrakenResult;
use kh_store::AgentStore;
use uuid::Uuid;

use crate::task_lifecycle::TaskLifecycle;

#[derive(Debug, Clone)]
struct Session {
    socket_id: String,
    last_heartbeat: DateTime<Utc>,
    task_id: Option<Uuid>,
}

/// One task that moved to `reconnect_pending` and the instant its grace
/// window expires.
#[derive(Debug, Clone, Copy)]
struct PendingReconnect {
    agent_id: i64,
    deadline: DateTime<Utc>,
}

pub struct AgentSessionTracker {
    agents: Arc<dyn AgentStore>,
    lifecycle: Arc<TaskLifecycle>,
    sessions: DashMap<i64, Session>,
    pending_reconnects: DashMap<Uuid, PendingReconnect>,
    reconnect_grace: chrono::Duration,
}

impl AgentSessionTracker {
    pub fn new(agents: Arc<dyn AgentStore>, lifecycle: Arc<TaskLifecycle>, reconnect_grace: chrono::Duration) -> Self {
        Self {
            agents,
            lifecycle,
            sessions: DashMap::new(),
            pending_reconnects: DashMap::new(),
            reconnect_grace,
        }
    }

    /// A new authenticated WebSocket upgrade for `agent_id`. Replaces any
    /// prior session record for the same agent (a stale socket from a
    /// crashed connection is simply superseded).
    pub fn on_connect(&self, agent_id: i64, socket_id: String, at: DateTime<Utc>, task_id: Option<Uuid>) {
        self.sessions.insert(
            agent_id,
            Session {
                socket_id,
                last_heartbeat: at,
                task_id,
            },
        );
    }

    /// `heartbeat`: updates `last_heartbeat` and the agent's live device
    /// set. Triggers nothing else (§4.9).
    pub async fn on_heartbeat(&self, agent_id: i64, devices: &[Device], at: DateTime<Utc>) -> KrakenResult<()> {
        if let Some(mut session) = self.sessions.get_mut(&agent_id) {
            session.last_heartbeat = at;
        }
        self.agents.record_heartbeat(agent_id, devices, at).await
    }

    /// The agent's socket dropped. If it had a live task, moves that task
    /// to `reconnect_pending` and starts the grace timer; otherwise this
    /// is a no-op beyond forgetting the socket.
    pub async fn on_disconnect(&self, agent_id: i64, at: DateTime<Utc>) -> KrakenResult<Option<Uuid>> {
        let task_id = self.sessions.remove(&agent_id).and_then(|(_, s)| s.task_id);
        let Some(task_id) = task_id else {
            return Ok(None);
        };
        self.lifecycle.mark_reconnect_pending(task_id).await?;
        self.pending_reconnects.insert(
            task_id,
            PendingReconnect {
                agent_id,
                deadline: at + self.reconnect_grace,
            },
        );
        Ok(Some(task_id))
    }

    /// The agent reconnected and claims task `task_id` is still running.
    /// Within grace: resume in place. Past grace: the task has already
    /// been (or is about to be) reset for retry; resuming it here would
    /// race the stale monitor, so this returns `false` and leaves the
    /// task's fate to [`Self::sweep_expired_grace`].
    pub async fn on_reconnect(
        &self,
        agent_id: i64,
        socket_id: String,
        task_id: Uuid,
        at: DateTime<Utc>,
    ) -> KrakenResult<bool> {
        let within_grace = self
            .pending_reconnects
            .get(&task_id)
            .map(|p| at <= p.deadline)
            .unwrap_or(false);

        self.sessions.insert(
            agent_id,
            Session {
                socket_id,
                last_heartbeat: at,
                task_id: Some(task_id),
            },
        );

        if within_grace {
            self.lifecycle.resume_after_reconnect(task_id).await?;
            self.pending_reconnects.remove(&task_id);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Drives every `reconnect_pending` task whose grace window has
    /// expired back into the retry pool. Called on the session tracker's
    /// own tick (independent of the stale-task monitor's tick, since a
    /// disconnect should not have to wait for the next stale sweep).
    pub async fn sweep_expired_grace(&self, now: DateTime<Utc>) -> KrakenResult<Vec<Uuid>> {
        let expired: Vec<Uuid> = self
            .pending_reconnects
            .iter()
            .filter(|entry| now > entry.value().deadline)
            .map(|entry| *entry.key())
            .collect();

        let mut reset = Vec::new();
        for task_id in expired {
            self.lifecycle.reset_for_retry(task_id).await?;
            self.pending_reconnects.remove(&task_id);
            reset.push(task_id);
        }
        Ok(reset)
    }

    pub fn is_connected(&self, agent_id: i64) -> bool {
        self.sessions.contains_key(&agent_id)
    }

    pub fn socket_id_for(&self, agent_id: i64) -> Option<String> {
        self.sessions.get(&agent_id).map(|s| s.socket_id.clone())
    }
}
