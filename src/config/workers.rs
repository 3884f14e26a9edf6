use queuectl_env_vars::{var_millis, var_secs};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    /// How long an idle worker sleeps before looking for jobs again.
    pub poll_interval: Duration,
    /// How long `worker start` waits for running jobs to finish after it
    /// was asked to stop. Workers still busy afterwards are terminated.
    pub grace_period: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            grace_period: Duration::from_secs(10),
        }
    }
}

impl WorkerConfig {
    pub fn from_environment() -> anyhow::Result<Self> {
        let default = Self::default();

        Ok(Self {
            poll_interval: var_millis("WORKER_POLL_INTERVAL_MS")?
                .unwrap_or(default.poll_interval),
            grace_period: var_secs("WORKER_SHUTDOWN_GRACE_SECONDS")?
                .unwrap_or(default.grace_period),
        })
    }
}
