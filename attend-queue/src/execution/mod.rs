pub mod context;
pub mod processor;
pub(crate) mod worker;

pub use context::{JobContext, ProgressReporter, ProgressSink};
pub use processor::Processor;
