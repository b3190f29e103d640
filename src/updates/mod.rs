// src/updates/mod.rs

//! Background update checks.
//!
//! - [`core`] is the pure state machine (throttling, backoff table).
//! - [`scheduler`] is the single serialized worker and the process-wide
//!   instance.
//! - [`store`] persists the last-success timestamp and the failure counter.
//! - [`checker`] defines what a check is; `CommandUpdateChecker` runs one
//!   through the process runner.

pub mod checker;
pub mod core;
pub mod scheduler;
pub mod store;

pub use checker::{AvailableVersion, CheckError, CommandUpdateChecker, UpdateChecker};
pub use core::{
    CheckOutcome, FailureKind, PersistedState, SchedulePolicy, SchedulerCommand, SchedulerCore,
    SchedulerEvent, SchedulerPhase, SchedulerStep, retry_delay,
};
pub use scheduler::{
    Clock, PreferenceFn, SchedulerDeps, SchedulerSnapshot, SystemClock, UpdateScheduler,
};
pub use store::{FAILURE_COUNT_KEY, FileStore, KeyValueStore, LAST_CHECK_KEY, MemoryStore};
