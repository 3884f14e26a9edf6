//! Legal state transitions of a [`Job`].
//!
//! ```text
//!            claim                 exit 0
//! pending ──────────► processing ──────────► completed
//!    ▲                    │
//!    │  failure,          │ failure,
//!    │  attempts < max    │ attempts >= max
//!    └────────────────────┤
//!                         ▼
//!    pending ◄─────────  dead
//!             requeue
//! ```
//!
//! A failure is never stored. It is folded into the attempt counter and
//! immediately mapped to either `pending` with a backoff or `dead`.

use crate::errors::TransitionError;
use crate::job::{Job, JobState};
use crate::retry::RetryPolicy;
use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// Result of running a job's command once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The command exited with status `0`.
    Success,
    /// The command exited with any other status, was killed, or could not be
    /// started at all.
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Completed,
    Retry {
        attempts: i32,
        delay: Duration,
        retry_after: DateTime<Utc>,
    },
    Dead {
        attempts: i32,
    },
}

impl Job {
    /// Records the outcome of an attempt on a job the caller has claimed.
    pub fn apply_outcome(
        &mut self,
        outcome: Outcome,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<Transition, TransitionError> {
        self.expect_state(JobState::Processing)?;

        let transition = match outcome {
            Outcome::Success => {
                self.state = JobState::Completed;
                self.retry_after_time = None;
                Transition::Completed
            }
            Outcome::Failure => {
                self.attempts = self.attempts.saturating_add(1);

                if self.attempts >= self.max_retries {
                    self.state = JobState::Dead;
                    self.retry_after_time = None;
                    Transition::Dead {
                        attempts: self.attempts,
                    }
                } else {
                    let delay = policy.delay(self.attempts.unsigned_abs());
                    let retry_after = add_delay(now, delay);

                    self.state = JobState::Pending;
                    self.retry_after_time = Some(retry_after);
                    Transition::Retry {
                        attempts: self.attempts,
                        delay,
                        retry_after,
                    }
                }
            }
        };

        self.updated_at = now;
        Ok(transition)
    }

    /// `dead → pending` with a fresh attempt budget.
    pub fn requeue(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.expect_state(JobState::Dead)?;
        self.state = JobState::Pending;
        self.attempts = 0;
        self.retry_after_time = None;
        self.updated_at = now;
        Ok(())
    }

    fn expect_state(&self, expected: JobState) -> Result<(), TransitionError> {
        if self.state == expected {
            return Ok(());
        }

        Err(TransitionError {
            id: self.id.clone(),
            expected,
            actual: self.state,
        })
    }
}

fn add_delay(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(delay)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
