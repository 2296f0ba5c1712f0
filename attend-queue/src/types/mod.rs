pub mod ids;
pub mod options;
pub mod record;
pub mod events;
pub mod stats;

pub use ids::JobId;
pub use options::{Backoff, BackoffKind, JobOptions, JobOptionsPatch};
pub use record::{JobRecord, JobStatus};
pub use events::JobEvent;
pub use stats::QueueStats;
