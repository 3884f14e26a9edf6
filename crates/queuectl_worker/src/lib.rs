#![doc = include_str!("../README.md")]

mod errors;
mod executor;
mod job;
mod lifecycle;
mod retry;
mod runner;
pub mod schema;
pub mod settings;
pub mod storage;
mod worker;

pub use self::errors::{EnqueueError, InvalidJob, InvalidSetting, RequeueError, TransitionError};
pub use self::executor::run_command;
pub use self::job::{DEFAULT_MAX_RETRIES, EnqueueRequest, Job, JobState, NewJob, ParseJobStateError};
pub use self::lifecycle::{Outcome, Transition};
pub use self::retry::{DEFAULT_RETRY_BASE, RetryPolicy};
pub use self::runner::{RunHandle, Runner};
pub use self::storage::StateCounts;
