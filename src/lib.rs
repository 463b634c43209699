//! cadence - time-based job scheduling core.
//!
//! Jobs are registered with a [`Scheduler`] as a [`TriggerSpec`] plus the
//! [`EventPayload`] to deliver on every fire, and are read back through
//! [`JobQuery`].

pub mod config;
pub mod core;
pub mod events;
pub mod scheduler;
pub mod storage;
pub mod testing;

pub use config::{
    ConfigError, JobDefinition, JobRequest, JobRequestBuilder, SchedulerConfig, SettingsSource,
    YamlLoader,
};
pub use core::clock::{Clock, FakeClock, SystemClock};
pub use core::misfire::{CronMisfirePolicy, IntervalMisfirePolicy, MisfirePolicy, TriggerFamily};
pub use core::payload::EventPayload;
pub use core::schedule::{CronExpression, ScheduleError};
pub use core::trigger::{
    CronSpec, OneShotSpec, RepeatingSpec, TimeOfDay, Trigger, TriggerError, TriggerSpec,
    WeeklyPatternSpec,
};
pub use core::types::{IdentityError, JobIdentity, JobKey, JobKind};
pub use events::{Event, EventBus, EventHandler};
pub use scheduler::{
    JobActivity, JobBasicInfo, JobDetailedInfo, JobQuery, JobStatus, Scheduler, SchedulerError,
};
pub use storage::{InMemoryTriggerStore, StorageError, StoredTrigger, TriggerState, TriggerStore};
