mod job;
mod retry;
mod runner;

pub use job::{Batch, BatchParams, DEFAULT_TASK, Job, JobFile, LogEvent, Progress, StartInfo};
pub use retry::RetryPolicy;
pub use runner::BatchRunner;
