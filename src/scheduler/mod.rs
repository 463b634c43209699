//! Scheduling and query engines.
//!
//! [`Scheduler`] registers, replaces and removes jobs in a trigger store;
//! [`JobQuery`] derives fire times and job summaries from the same store.

mod engine;
mod query;
mod types;

pub use engine::Scheduler;
pub use query::{DATE_FORMAT, JobQuery};
pub use types::{JobActivity, JobBasicInfo, JobDetailedInfo, JobStatus, SchedulerError};
