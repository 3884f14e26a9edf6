use std::time::Duration;

pub const DEFAULT_RETRY_BASE: u32 = 2;

/// Exponential backoff between failed attempts.
///
/// The delay after the `n`-th failed attempt is `base ^ n` seconds, so with
/// the default base of 2 a job is retried after 2, 4, 8, … seconds. The
/// exponent is the attempt count *after* the failure has been recorded, the
/// first retry waits `base ^ 1` seconds.
///
/// An optional `max_delay` clamps the result. Without it the delay grows
/// unbounded, saturating at `u64::MAX` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base: u32,
    max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_BASE)
    }
}

impl RetryPolicy {
    /// A `base` of zero is treated as one, so that every retry waits a second.
    pub fn new(base: u32) -> Self {
        Self {
            base: base.max(1),
            max_delay: None,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay
    }

    /// How long a job has to wait after its `attempts`-th failure.
    pub fn delay(&self, attempts: u32) -> Duration {
        let seconds = u64::from(self.base).saturating_pow(attempts);
        let delay = Duration::from_secs(seconds);

        match self.max_delay {
            Some(max_delay) => delay.min(max_delay),
            None => delay,
        }
    }
}
