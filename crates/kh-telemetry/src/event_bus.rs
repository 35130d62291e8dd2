use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Domain-level events the scheduler's components publish for observers
/// (metrics, audit logging, a future notification surface) to consume
/// without coupling the scheduler itself to any one sink.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    TaskDispatched {
        task_id: Uuid,
        job_id: Uuid,
        agent_id: i64,
        at: DateTime<Utc>,
    },
    TaskCompleted {
        task_id: Uuid,
        job_id: Uuid,
        agent_id: i64,
        at: DateTime<Utc>,
    },
    TaskFailed {
        task_id: Uuid,
        job_id: Uuid,
        agent_id: i64,
        retriable: bool,
        at: DateTime<Utc>,
    },
    JobPreempted {
        job_id: Uuid,
        preempted_by: Uuid,
        at: DateTime<Utc>,
    },
    JobCompleted {
        job_id: Uuid,
        at: DateTime<Utc>,
    },
    CrackRecorded {
        task_id: Uuid,
        hashlist_id: i64,
        at: DateTime<Utc>,
    },
    AgentLost {
        agent_id: i64,
        at: DateTime<Utc>,
    },
}

/// A broadcast-style event bus built on flume channels. Each [`subscribe`]
/// call returns a new receiver that sees every event published from that
/// point forward; disconnected subscribers are pruned lazily on publish.
///
/// [`subscribe`]: EventBus::subscribe
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<Vec<flume::Sender<DomainEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> flume::Receiver<DomainEvent> {
        let (tx, rx) = flume::unbounded();
        let mut senders = self.inner.lock().expect("EventBus lock poisoned");
        senders.push(tx);
        rx
    }

    pub fn publish(&self, event: DomainEvent) {
        let mut senders = self.inner.lock().expect("EventBus lock poisoned");
        senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().expect("EventBus lock poisoned").len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> DomainEvent {
        DomainEvent::TaskDispatched {
            task_id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            agent_id: 1,
            at: Utc::now(),
        }
    }

    #[test]
    fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        let event = sample_event();
        bus.publish(event.clone());
        assert_eq!(rx.try_recv().unwrap(), event);
    }

    #[test]
    fn dropped_subscriber_is_pruned_on_next_publish() {
        let bus = EventBus::new();
        {
            let _rx = bus.subscribe();
        }
        assert_eq!(bus.subscriber_count(), 1);
        bus.publish(sample_event());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn multiple_subscribers_all_receive_the_same_event() {
        let bus = EventBus::new();
        let rx1 = bus.subscribe();
        let rx2 = bus.subscribe();
        bus.publish(sample_event());
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }
}
