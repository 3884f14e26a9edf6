use crate::executor::run_command;
use crate::lifecycle::Transition;
use crate::retry::RetryPolicy;
use crate::{settings, storage};
use chrono::Utc;
use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::deadpool::Pool;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

pub(crate) struct Worker {
    pub(crate) connection_pool: Pool<AsyncPgConnection>,
    pub(crate) retry_policy: Option<RetryPolicy>,
    pub(crate) shutdown_when_queue_empty: bool,
    pub(crate) poll_interval: Duration,
    pub(crate) cancellation: CancellationToken,
}

impl Worker {
    /// Run jobs until the cancellation token fires, or until the queue is
    /// empty if `shutdown_when_queue_empty` is set.
    ///
    /// The token is only checked between jobs. A running command is always
    /// waited for.
    pub(crate) async fn run(&self) {
        let policy = self.resolve_retry_policy().await;
        info!(retry.base = policy.base(), "Worker started");

        while !self.cancellation.is_cancelled() {
            match self.run_next_job(&policy).await {
                Ok(Some(_)) => {}
                Ok(None) if self.shutdown_when_queue_empty => {
                    debug!("No eligible jobs found. Shutting down the worker…");
                    break;
                }
                Ok(None) => {
                    debug!(
                        "No eligible jobs found. Polling again in {:?}…",
                        self.poll_interval
                    );
                    self.idle().await;
                }
                Err(error) => {
                    error!("Failed to run job: {error:#}");
                    self.idle().await;
                }
            }
        }

        info!("Worker stopped");
    }

    /// The retry policy is resolved once per worker and not re-read while it
    /// runs.
    async fn resolve_retry_policy(&self) -> RetryPolicy {
        if let Some(policy) = self.retry_policy {
            return policy;
        }

        let result = async {
            let mut conn = self.connection_pool.get().await?;
            Ok::<_, anyhow::Error>(settings::retry_policy(&mut conn).await?)
        }
        .await;

        result.unwrap_or_else(|error| {
            warn!("Failed to read retry settings, using defaults: {error:#}");
            RetryPolicy::default()
        })
    }

    async fn idle(&self) {
        tokio::select! {
            _ = sleep(self.poll_interval) => {}
            _ = self.cancellation.cancelled() => {}
        }
    }

    /// Claim and run the next eligible job, if there is one.
    ///
    /// Returns:
    /// - `Ok(Some(job_id))` if a job was run
    /// - `Ok(None)` if no jobs were eligible
    /// - `Err(...)` if the job could not be claimed or its result not stored
    async fn run_next_job(&self, policy: &RetryPolicy) -> anyhow::Result<Option<String>> {
        let mut conn = self.connection_pool.get().await?;

        debug!("Looking for next job…");
        let Some(mut job) = storage::claim_next(&mut conn).await? else {
            return Ok(None);
        };

        // The connection is not needed while the command runs.
        drop(conn);

        let span = info_span!("job", job.id = %job.id);
        async move {
            debug!(job.command = %job.command, "Running job…");
            let outcome = run_command(&job.command).await;

            let transition = job.apply_outcome(outcome, policy, Utc::now())?;
            match transition {
                Transition::Completed => info!("Job completed successfully"),
                Transition::Retry {
                    attempts, delay, ..
                } => warn!(
                    job.attempts = attempts,
                    "Job failed, retrying in {} seconds",
                    delay.as_secs()
                ),
                Transition::Dead { attempts } => {
                    warn!(job.attempts = attempts, "Job failed, moving to the dead letter queue")
                }
            }

            let mut conn = self.connection_pool.get().await?;
            storage::update_state(&mut conn, &mut job).await?;

            Ok(Some(job.id))
        }
        .instrument(span)
        .await
    }
}
