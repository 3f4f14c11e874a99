//! Coalescing timer for local mutations.

use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A single re-armable timer.
///
/// Every [`schedule`](Debouncer::schedule) aborts the previously armed timer
/// before arming a new one, so a burst of calls runs the action once, a
/// quiet period after the last call. Once the timer fires, the action runs
/// on its own task and is no longer affected by re-arming or cancelling.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    armed: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    /// Creates a debouncer with the given quiet period.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            armed: Mutex::new(None),
        }
    }

    /// Returns the quiet period.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// (Re)arms the timer. Must be called within a Tokio runtime.
    pub fn schedule<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let mut armed = self.armed.lock();
        if let Some(previous) = armed.take() {
            previous.abort();
        }
        *armed = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tracing::debug!("debounce timer fired");
            tokio::spawn(action());
        }));
    }

    /// Cancels the armed timer. Returns true if one was pending.
    pub fn cancel(&self) -> bool {
        match self.armed.lock().take() {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            }
            None => false,
        }
    }

    /// Returns true if a timer is armed and has not fired yet.
    pub fn is_armed(&self) -> bool {
        self.armed
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
