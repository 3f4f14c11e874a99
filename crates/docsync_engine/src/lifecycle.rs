//! Host lifecycle signals.
//!
//! A browser tab, a desktop window, a mobile app and a headless service all
//! lose focus, come back, lose the network and shut down in their own way.
//! The engine only sees the four events below.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// A host environment signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The host is going to the background (tab hidden, window blurred).
    Suspend,
    /// The host is visible again.
    Resume,
    /// Connectivity changed; `true` means online.
    NetworkChange(bool),
    /// The host is shutting down.
    Terminate,
}

/// Source of lifecycle events for an engine.
pub trait LifecycleSignal: Send + Sync {
    /// Connectivity at the time of the call.
    fn is_online(&self) -> bool;

    /// Returns a new receiver for future events.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<LifecycleEvent>;
}

/// Lifecycle adapter for headless hosts and tests: events are emitted by
/// calling its methods.
#[derive(Debug)]
pub struct ChannelLifecycle {
    online: AtomicBool,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<LifecycleEvent>>>,
}

impl ChannelLifecycle {
    /// Creates an adapter with the given initial connectivity.
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Delivers `event` to every live subscriber.
    pub fn emit(&self, event: LifecycleEvent) {
        if let LifecycleEvent::NetworkChange(online) = event {
            self.online.store(online, Ordering::SeqCst);
        }
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(event).is_ok());
    }

    /// Emits [`LifecycleEvent::Suspend`].
    pub fn suspend(&self) {
        self.emit(LifecycleEvent::Suspend);
    }

    /// Emits [`LifecycleEvent::Resume`].
    pub fn resume(&self) {
        self.emit(LifecycleEvent::Resume);
    }

    /// Emits [`LifecycleEvent::NetworkChange`].
    pub fn set_online(&self, online: bool) {
        self.emit(LifecycleEvent::NetworkChange(online));
    }

    /// Emits [`LifecycleEvent::Terminate`].
    pub fn terminate(&self) {
        self.emit(LifecycleEvent::Terminate);
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|subscriber| !subscriber.is_closed());
        subscribers.len()
    }
}

impl Default for ChannelLifecycle {
    fn default() -> Self {
        Self::new(true)
    }
}

impl LifecycleSignal for ChannelLifecycle {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<LifecycleEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }
}
