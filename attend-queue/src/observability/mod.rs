pub mod hub;
pub mod metrics;
pub mod tracing;

pub use hub::{BoxStream, EventHub, EventListener, ListenerId};
pub use metrics::{MetricsSnapshot, QueueMetrics};

#[cfg(feature = "tracing-basic")]
pub use self::tracing::init_tracing;
