use crate::job::JobState;

/// An error occurred queueing the job
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EnqueueError {
    /// A job with the same id already exists. The existing row is left
    /// untouched.
    #[error("Job with ID {0} already exists.")]
    Conflict(String),

    /// An error occurred inserting the job into the database
    #[error(transparent)]
    DatabaseError(#[from] diesel::result::Error),
}

/// An error occurred moving a job out of the dead letter queue
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RequeueError {
    #[error("Job ID '{0}' not found.")]
    NotFound(String),

    #[error("Job '{id}' is in state '{state}', not 'dead'.")]
    NotDead { id: String, state: JobState },

    #[error(transparent)]
    DatabaseError(#[from] diesel::result::Error),
}

/// The enqueue payload was rejected before reaching the database
#[derive(Debug, thiserror::Error)]
pub enum InvalidJob {
    #[error("Invalid JSON format for job data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Job data must contain a non-empty 'id'.")]
    EmptyId,

    #[error("Job data must contain a non-empty 'command'.")]
    EmptyCommand,

    #[error("'max_retries' must be at least 1, got {0}.")]
    InvalidMaxRetries(i64),
}

/// A lifecycle transition was requested from a state that does not allow it
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("Job '{id}' is in state '{actual}', expected '{expected}'.")]
pub struct TransitionError {
    pub id: String,
    pub expected: JobState,
    pub actual: JobState,
}

/// A setting value was rejected before being written
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("Value for '{key}' must be a positive integer, got '{value}'.")]
pub struct InvalidSetting {
    pub key: String,
    pub value: String,
}
