use crate::retry::RetryPolicy;
use crate::worker::Worker;
use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::deadpool::Pool;
use futures_util::future::join_all;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// The core runner responsible for spawning workers and owning their
/// shared cancellation token.
pub struct Runner {
    connection_pool: Pool<AsyncPgConnection>,
    num_workers: usize,
    poll_interval: Duration,
    retry_policy: Option<RetryPolicy>,
    shutdown_when_queue_empty: bool,
}

impl Runner {
    pub fn new(connection_pool: Pool<AsyncPgConnection>) -> Self {
        Self {
            connection_pool,
            num_workers: 1,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_policy: None,
            shutdown_when_queue_empty: false,
        }
    }

    /// Set the number of workers to spawn.
    pub fn num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    /// Set the interval after which an idle worker polls for new jobs.
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Use `retry_policy` instead of resolving it from the `settings` table
    /// when each worker starts.
    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = Some(retry_policy);
        self
    }

    /// Stop each worker as soon as it finds no eligible job.
    pub fn shutdown_when_queue_empty(mut self) -> Self {
        self.shutdown_when_queue_empty = true;
        self
    }

    /// Start the workers.
    ///
    /// This returns a [`RunHandle`] which can be used to stop the workers or
    /// to wait for them to shut down.
    pub fn start(&self) -> RunHandle {
        let cancellation = CancellationToken::new();

        let handles = (0..self.num_workers)
            .map(|i| {
                let name = format!("worker-{}", i + 1);
                info!(worker.name = %name, "Starting worker…");

                let worker = Worker {
                    connection_pool: self.connection_pool.clone(),
                    retry_policy: self.retry_policy,
                    shutdown_when_queue_empty: self.shutdown_when_queue_empty,
                    poll_interval: self.poll_interval,
                    cancellation: cancellation.clone(),
                };

                let span = info_span!("worker", worker.name = %name);
                tokio::spawn(async move { worker.run().instrument(span).await })
            })
            .collect();

        RunHandle {
            handles,
            cancellation,
        }
    }
}

pub struct RunHandle {
    handles: Vec<JoinHandle<()>>,
    cancellation: CancellationToken,
}

impl RunHandle {
    /// The token shared by all workers. Cancelling it asks them to stop after
    /// their current job.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Wait for all workers to shut down.
    pub async fn wait_for_shutdown(self) {
        join_all(self.handles).await.into_iter().for_each(|result| {
            if let Err(error) = result {
                warn!(%error, "Worker task panicked");
            }
        });
    }

    /// Ask all workers to stop and wait up to `grace_period` for them to
    /// finish their current job. Workers still running afterwards are
    /// aborted, which also kills the command they were running.
    ///
    /// Returns the number of workers that had to be aborted.
    pub async fn shutdown(self, grace_period: Duration) -> usize {
        info!("Initiating graceful worker shutdown…");
        self.cancellation.cancel();

        let deadline = Instant::now() + grace_period;
        let mut aborted = 0;

        for (i, mut handle) in self.handles.into_iter().enumerate() {
            match timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => warn!(%error, "Worker task panicked"),
                Err(_) => {
                    warn!(
                        worker.name = %format!("worker-{}", i + 1),
                        "Worker did not stop within {grace_period:?}, terminating it"
                    );
                    handle.abort();
                    let _ = handle.await;
                    aborted += 1;
                }
            }
        }

        aborted
    }
}
