//! Configuration for the sync engine.

use std::time::Duration;

/// Default quiet period before a scheduled push fires.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(30);

/// Default interval between idle remote checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Quiet period after the last local change before pushing.
    pub debounce: Duration,
    /// Interval for idle remote checks. `None` disables the poller.
    pub poll_interval: Option<Duration>,
    /// Request timeout applied to every transport call.
    pub request_timeout: Duration,
    /// Maximum number of tasks held while offline. Oldest are dropped first.
    pub max_queue_len: usize,
    /// Re-fetch remote metadata before a "keep local" override push.
    ///
    /// When false (the default) the override is last-writer-wins: a write
    /// that lands between conflict detection and resolution is overwritten.
    pub recheck_before_override: bool,
}

impl SyncConfig {
    /// Creates a configuration with default timings.
    pub fn new() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            poll_interval: Some(DEFAULT_POLL_INTERVAL),
            request_timeout: Duration::from_secs(30),
            max_queue_len: 100,
            recheck_before_override: false,
        }
    }

    /// Sets the debounce quiet period.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Disables the poller.
    pub fn without_polling(mut self) -> Self {
        self.poll_interval = None;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the offline queue capacity.
    pub fn with_max_queue_len(mut self, len: usize) -> Self {
        self.max_queue_len = len.max(1);
        self
    }

    /// Re-checks the server before overriding it with local data.
    pub fn with_recheck_before_override(mut self, recheck: bool) -> Self {
        self.recheck_before_override = recheck;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
