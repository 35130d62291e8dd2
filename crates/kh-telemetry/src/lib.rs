//! Logging, metrics, and the domain event bus shared by the scheduler and
//! daemon crates.

pub mod event_bus;
pub mod logging;
pub mod metrics;
pub mod shutdown;

pub use event_bus::{DomainEvent, EventBus};
pub use logging::{init_logging, init_logging_json};
pub use metrics::{global_metrics, MetricsCollector};
pub use shutdown::{DrainResult, ShutdownGuard, ShutdownSignal};
