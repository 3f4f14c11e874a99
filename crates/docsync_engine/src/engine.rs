//! The sync engine.
//!
//! One [`SyncEngine`] keeps one app's document in step with the server.
//! Handles are cheap clones of a shared core; every state transition goes
//! through a single mutex that is never held across an `.await`.

use crate::adapter::{is_empty_document, DataAdapter, DocumentAdapter};
use crate::config::SyncConfig;
use crate::credentials::{CredentialProvider, StaticCredentials};
use crate::debounce::Debouncer;
use crate::diagnostics::{DebugSnapshot, DiagnosticEvent, Diagnostics, TracingDiagnostics};
use crate::error::{SyncError, SyncResult};
use crate::identity::DeviceIdentity;
use crate::lifecycle::{LifecycleEvent, LifecycleSignal};
use crate::metadata::LocalMetadataStore;
use crate::poller;
use crate::queue::OfflineQueue;
use crate::reconcile::{decide, ReconcileAction};
use crate::state::{StateMachine, SyncState, SyncStatus, Ticket};
use crate::storage::{KeyValueStore, MemoryStore};
use crate::transport::{PushOutcome, SyncTransport};
use chrono::{DateTime, Utc};
use docsync_protocol::{ConflictChoice, PushRequest, PushResponse, SyncApp, SyncConflict};
use parking_lot::Mutex;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

/// What an operation ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The local document was stored under this server version.
    Pushed {
        /// Server-confirmed version.
        version: u64,
    },
    /// The remote document overwrote the local one.
    Pulled {
        /// Version now held locally.
        version: u64,
    },
    /// The push was rejected; the engine is now in conflict.
    Conflict(SyncConflict),
    /// Local and remote already agree.
    UpToDate,
    /// Offline: the operation waits in the offline queue.
    Deferred,
    /// No credential: nothing was attempted.
    Skipped,
}

/// What [`SyncEngine::force_push`] did with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A push was sent on a detached task.
    Sent,
    /// Offline: the push went to the offline queue.
    Queued,
    /// Nothing to send, or sending is not allowed right now.
    Skipped,
}

/// Handle to a best-effort push: attempted, not confirmed.
///
/// Dropping the handle never cancels the send, and neither does
/// [`SyncEngine::destroy`]. Awaiting it only tells whether the attempt
/// finished, not whether the server stored anything.
#[derive(Debug)]
pub struct BestEffort {
    dispatch: Dispatch,
    handle: Option<JoinHandle<()>>,
}

impl BestEffort {
    fn not_sent(dispatch: Dispatch) -> Self {
        Self {
            dispatch,
            handle: None,
        }
    }

    /// What happened to the request.
    pub fn dispatch(&self) -> Dispatch {
        self.dispatch
    }

    /// Waits up to `timeout` for the attempt to finish.
    ///
    /// Returns true if it finished (or nothing was sent).
    pub async fn wait(self, timeout: Duration) -> bool {
        match self.handle {
            Some(handle) => tokio::time::timeout(timeout, handle).await.is_ok(),
            None => true,
        }
    }
}

/// Identifies a state listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type StateListener = Arc<dyn Fn(&SyncState) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub(crate) enum Op {
    Push,
    Pull,
    CheckAndSync,
}

impl Op {
    fn name(self) -> &'static str {
        match self {
            Op::Push => "push",
            Op::Pull => "pull",
            Op::CheckAndSync => "check_and_sync",
        }
    }
}

pub(crate) struct EngineInner {
    app: SyncApp,
    config: SyncConfig,
    device_id: String,
    transport: Arc<dyn SyncTransport>,
    adapter: Arc<dyn DocumentAdapter>,
    credentials: Arc<dyn CredentialProvider>,
    metadata: LocalMetadataStore,
    diagnostics: Arc<dyn Diagnostics>,
    machine: Mutex<StateMachine>,
    queue: OfflineQueue,
    debounce: Debouncer,
    poller: Mutex<Option<JoinHandle<()>>>,
    lifecycle: Mutex<Option<JoinHandle<()>>>,
    pending_lifecycle: Mutex<Option<Arc<dyn LifecycleSignal>>>,
    listeners: Mutex<Vec<(ListenerId, StateListener)>>,
    next_listener: AtomicU64,
    available_versions: Mutex<Vec<u64>>,
    destroyed: AtomicBool,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        if let Some(handle) = self.poller.get_mut().take() {
            handle.abort();
        }
        if let Some(handle) = self.lifecycle.get_mut().take() {
            handle.abort();
        }
    }
}

/// Builds a [`SyncEngine`].
pub struct EngineBuilder {
    app: SyncApp,
    transport: Arc<dyn SyncTransport>,
    adapter: Arc<dyn DocumentAdapter>,
    config: SyncConfig,
    store: Option<Arc<dyn KeyValueStore>>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    diagnostics: Option<Arc<dyn Diagnostics>>,
    lifecycle: Option<Arc<dyn LifecycleSignal>>,
    online: bool,
}

impl EngineBuilder {
    /// Sets the configuration.
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the store for the device id and local metadata.
    ///
    /// Defaults to a [`MemoryStore`], which does not survive restarts.
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the credential source. Defaults to signed out.
    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Uses a fixed bearer token.
    pub fn with_token(self, token: impl Into<String>) -> Self {
        self.with_credentials(Arc::new(StaticCredentials::new(token)))
    }

    /// Sets the diagnostics sink. Defaults to [`TracingDiagnostics`].
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// Attaches a lifecycle signal on [`SyncEngine::start`]. Its current
    /// connectivity sets the initial status.
    pub fn with_lifecycle(mut self, lifecycle: Arc<dyn LifecycleSignal>) -> Self {
        self.online = lifecycle.is_online();
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Sets the initial connectivity when no lifecycle signal is attached.
    pub fn online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }

    /// Builds the engine. No task is spawned until [`SyncEngine::start`].
    pub fn build(self) -> SyncEngine {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>);
        let diagnostics = self
            .diagnostics
            .unwrap_or_else(|| Arc::new(TracingDiagnostics) as Arc<dyn Diagnostics>);
        let credentials = self
            .credentials
            .unwrap_or_else(|| Arc::new(StaticCredentials::signed_out()) as Arc<dyn CredentialProvider>);

        let identity = DeviceIdentity::new(Arc::clone(&store));
        let device_id = identity.device_id(&self.app);
        if identity.is_ephemeral(&self.app) {
            diagnostics.record(
                &self.app,
                &DiagnosticEvent::PersistenceDegraded {
                    message: "device id is not persisted".into(),
                },
            );
        }

        let metadata = LocalMetadataStore::new(store);
        let local = metadata.get_local(&self.app);
        tracing::debug!(
            app = %self.app,
            device_id = %device_id,
            local_version = local.map(|m| m.version).unwrap_or(0),
            online = self.online,
            "sync engine created"
        );

        SyncEngine {
            inner: Arc::new(EngineInner {
                machine: Mutex::new(StateMachine::new(self.online, local)),
                queue: OfflineQueue::new(self.config.max_queue_len),
                debounce: Debouncer::new(self.config.debounce),
                app: self.app,
                config: self.config,
                device_id,
                transport: self.transport,
                adapter: self.adapter,
                credentials,
                metadata,
                diagnostics,
                poller: Mutex::new(None),
                lifecycle: Mutex::new(None),
                pending_lifecycle: Mutex::new(self.lifecycle),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
                available_versions: Mutex::new(Vec::new()),
                destroyed: AtomicBool::new(false),
            }),
        }
    }
}

/// Keeps one app's document in sync with the server.
///
/// Operations are serialized: while a push, pull or reconciliation is in
/// flight, starting another fails with [`SyncError::InProgress`].
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    /// Starts building an engine for `app`.
    pub fn builder<T, A>(app: SyncApp, transport: Arc<T>, adapter: Arc<A>) -> EngineBuilder
    where
        T: SyncTransport + 'static,
        A: DataAdapter,
    {
        EngineBuilder {
            app,
            transport,
            adapter,
            config: SyncConfig::default(),
            store: None,
            credentials: None,
            diagnostics: None,
            lifecycle: None,
            online: true,
        }
    }

    pub(crate) fn from_inner(inner: Arc<EngineInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<EngineInner> {
        Arc::downgrade(&self.inner)
    }

    /// Spawns the poller and lifecycle listener. Idempotent.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(&self) {
        if let Some(period) = self.inner.config.poll_interval {
            let mut poller = self.inner.poller.lock();
            if poller.is_none() {
                *poller = Some(poller::spawn(self.downgrade(), period));
            }
        }
        let lifecycle = self.inner.pending_lifecycle.lock().take();
        if let Some(signal) = lifecycle {
            self.attach_lifecycle(signal);
        }
    }

    /// The synced app.
    pub fn app(&self) -> &SyncApp {
        &self.inner.app
    }

    /// This device's id for the app.
    pub fn device_id(&self) -> &str {
        &self.inner.device_id
    }

    /// The engine configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Snapshot of the observable state.
    pub fn state(&self) -> SyncState {
        self.read(|m| m.snapshot())
    }

    /// Current status.
    pub fn status(&self) -> SyncStatus {
        self.read(|m| m.status())
    }

    /// Whether the host last reported connectivity.
    pub fn is_online(&self) -> bool {
        self.read(|m| m.is_online())
    }

    /// Whether a credential is available.
    pub fn is_authenticated(&self) -> bool {
        self.inner.credentials.bearer_token().is_some()
    }

    /// Number of operations waiting for connectivity.
    pub fn queue_len(&self) -> usize {
        self.inner.queue.len()
    }

    /// Versions the server last reported as retained, newest first.
    pub fn available_versions(&self) -> Vec<u64> {
        self.inner.available_versions.lock().clone()
    }

    /// Point-in-time view for debugging.
    pub fn debug_snapshot(&self) -> DebugSnapshot {
        DebugSnapshot {
            app: self.inner.app.clone(),
            device_id: self.inner.device_id.clone(),
            state: self.state(),
            queue_len: self.queue_len(),
            debounce_armed: self.inner.debounce.is_armed(),
            poller_running: self
                .inner
                .poller
                .lock()
                .as_ref()
                .map(|h| !h.is_finished())
                .unwrap_or(false),
            lifecycle_attached: self
                .inner
                .lifecycle
                .lock()
                .as_ref()
                .map(|h| !h.is_finished())
                .unwrap_or(false),
            available_versions: self.available_versions(),
        }
    }

    /// Registers a listener called with every new state.
    ///
    /// A panicking listener is logged and skipped; the others still run.
    pub fn subscribe(&self, listener: impl Fn(&SyncState) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::SeqCst));
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns true if it was registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Pushes the local document.
    pub async fn push(&self) -> SyncResult<SyncOutcome> {
        self.submit(Op::Push).await
    }

    /// Pulls the remote document, overwriting the local one.
    pub async fn pull(&self) -> SyncResult<SyncOutcome> {
        self.submit(Op::Pull).await
    }

    /// Compares local and remote versions and pushes or pulls as needed.
    pub async fn check_and_sync(&self) -> SyncResult<SyncOutcome> {
        self.submit(Op::CheckAndSync).await
    }

    /// Records a local change and (re)arms the debounced push.
    ///
    /// Must be called within a Tokio runtime.
    pub fn schedule_push(&self) {
        self.update(|m| m.mark_pending());
        let weak = self.downgrade();
        self.inner.debounce.schedule(move || async move {
            if let Some(inner) = weak.upgrade() {
                SyncEngine::from_inner(inner).fire_scheduled_push().await;
            }
        });
    }

    /// Cancels the debounce timer and immediately sends pending changes on
    /// a detached task. See [`BestEffort`].
    pub fn force_push(&self) -> BestEffort {
        self.inner.debounce.cancel();

        let (pending, online, conflicted, in_flight) =
            self.read(|m| (m.pending(), m.is_online(), m.conflict().is_some(), m.in_flight()));
        if !pending {
            return BestEffort::not_sent(Dispatch::Skipped);
        }
        if conflicted {
            tracing::debug!(app = %self.inner.app, "forced push skipped: conflict outstanding");
            return BestEffort::not_sent(Dispatch::Skipped);
        }
        if !online {
            self.enqueue(Op::Push);
            return BestEffort::not_sent(Dispatch::Queued);
        }
        if in_flight {
            tracing::debug!(app = %self.inner.app, "forced push skipped: operation in flight");
            return BestEffort::not_sent(Dispatch::Skipped);
        }
        let Some(token) = self.inner.credentials.bearer_token() else {
            return BestEffort::not_sent(Dispatch::Skipped);
        };
        let Ok(ticket) = self.update(|m| m.begin()) else {
            return BestEffort::not_sent(Dispatch::Skipped);
        };

        self.record(DiagnosticEvent::BestEffortSent);
        let engine = self.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = engine.push_inner(ticket, &token).await {
                tracing::debug!(app = %engine.inner.app, error = %e, "best-effort push failed");
            }
        });

        BestEffort {
            dispatch: Dispatch::Sent,
            handle: Some(handle),
        }
    }

    /// Resolves the outstanding conflict.
    ///
    /// `Remote` discards local changes and pulls. `Local` adopts the
    /// server's version and pushes the local document over it.
    pub async fn resolve_conflict(&self, choice: ConflictChoice) -> SyncResult<SyncOutcome> {
        let conflict = self
            .read(|m| m.conflict().cloned())
            .ok_or(SyncError::NoActiveConflict)?;

        if choice == ConflictChoice::Local && self.inner.config.recheck_before_override {
            if let Some(outcome) = self.recheck_remote(&conflict).await? {
                return Ok(outcome);
            }
        }

        if !self.is_online() {
            self.update(|m| m.resolve(choice))
                .ok_or(SyncError::NoActiveConflict)?;
            self.record(DiagnosticEvent::ConflictResolved { choice });
            let op = match choice {
                ConflictChoice::Remote => Op::Pull,
                ConflictChoice::Local => Op::Push,
            };
            return Ok(self.enqueue(op));
        }

        let Some(token) = self.inner.credentials.bearer_token() else {
            tracing::debug!(app = %self.inner.app, "not authenticated, conflict left open");
            return Ok(SyncOutcome::Skipped);
        };

        // The conflict is only cleared once the follow-up operation is admitted.
        let ticket = self.update(|m| {
            let ticket = m.begin()?;
            if m.resolve(choice).is_none() {
                m.cancelled();
                return Err(SyncError::NoActiveConflict);
            }
            Ok(ticket)
        })?;
        self.record(DiagnosticEvent::ConflictResolved { choice });

        match choice {
            ConflictChoice::Remote => self.pull_inner(&token).await,
            ConflictChoice::Local => self.push_inner(ticket, &token).await,
        }
    }

    /// Applies a host connectivity change.
    ///
    /// Going online drains the offline queue in order, then reconciles.
    pub async fn set_online(&self, online: bool) {
        if self.apply_connectivity(online) {
            self.reconnect().await;
        }
    }

    /// Records a connectivity change. Returns true if the engine just came
    /// back online.
    fn apply_connectivity(&self, online: bool) -> bool {
        self.update(|m| {
            if !online {
                m.go_offline();
                return false;
            }
            let was_offline = !m.is_online();
            m.go_online();
            was_offline
        })
    }

    async fn reconnect(&self) {
        if !self.inner.queue.is_empty() {
            let report = self
                .inner
                .queue
                .drain_while(|| self.read(|m| m.is_online()))
                .await;
            self.record(DiagnosticEvent::QueueDrained {
                succeeded: report.succeeded,
                failed: report.failed,
            });
        }

        if self.may_sync_automatically() {
            if let Err(e) = self.check_and_sync().await {
                tracing::debug!(app = %self.inner.app, error = %e, "reconnect sync failed");
            }
        }
    }

    /// Reacts to one lifecycle event.
    pub async fn handle_lifecycle(&self, event: LifecycleEvent) {
        tracing::debug!(app = %self.inner.app, ?event, "lifecycle event");
        match event {
            LifecycleEvent::Suspend | LifecycleEvent::Terminate => {
                self.force_push();
            }
            LifecycleEvent::Resume => {
                if self.may_sync_automatically() {
                    if let Err(e) = self.check_and_sync().await {
                        tracing::debug!(app = %self.inner.app, error = %e, "resume sync failed");
                    }
                }
            }
            LifecycleEvent::NetworkChange(online) => self.set_online(online).await,
        }
    }

    /// Listens to `signal` on a background task, replacing any previous one.
    ///
    /// Must be called within a Tokio runtime.
    pub fn attach_lifecycle(&self, signal: Arc<dyn LifecycleSignal>) {
        let online = signal.is_online();
        if online != self.is_online() {
            self.update(|m| if online { m.go_online() } else { m.go_offline() });
        }

        let mut events = signal.subscribe();
        let weak = self.downgrade();
        let handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                SyncEngine::from_inner(inner).dispatch_lifecycle(event);
                if event == LifecycleEvent::Terminate {
                    break;
                }
            }
        });

        if let Some(previous) = self.inner.lifecycle.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Applies the immediate part of `event` and spawns any network work,
    /// so a later event is never held up behind an earlier one.
    fn dispatch_lifecycle(&self, event: LifecycleEvent) {
        tracing::debug!(app = %self.inner.app, ?event, "lifecycle event");
        match event {
            LifecycleEvent::NetworkChange(online) => {
                if self.apply_connectivity(online) {
                    let engine = self.clone();
                    tokio::spawn(async move { engine.reconnect().await });
                }
            }
            LifecycleEvent::Resume => {
                let engine = self.clone();
                tokio::spawn(async move { engine.handle_lifecycle(LifecycleEvent::Resume).await });
            }
            LifecycleEvent::Suspend | LifecycleEvent::Terminate => {
                self.force_push();
            }
        }
    }

    /// Tears down timers, background tasks, listeners and queued work.
    ///
    /// No state transition happens. A best-effort push already sent keeps
    /// running.
    pub fn destroy(&self) {
        self.inner.destroyed.store(true, Ordering::SeqCst);
        self.inner.debounce.cancel();
        if let Some(handle) = self.inner.poller.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.inner.lifecycle.lock().take() {
            handle.abort();
        }
        self.inner.listeners.lock().clear();
        self.inner.queue.clear();
        tracing::debug!(app = %self.inner.app, "sync engine destroyed");
    }

    /// Returns true once [`destroy`](Self::destroy) was called.
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Whether the poller may run a reconciliation now.
    pub(crate) fn may_poll(&self) -> bool {
        self.read(|m| {
            matches!(m.status(), SyncStatus::Idle | SyncStatus::Error)
                && m.conflict().is_none()
                && !m.in_flight()
        })
            && self.is_authenticated()
            && !self.is_destroyed()
    }

    fn may_sync_automatically(&self) -> bool {
        self.read(|m| m.is_online() && m.conflict().is_none() && !m.in_flight())
            && self.is_authenticated()
            && !self.is_destroyed()
    }

    async fn fire_scheduled_push(&self) {
        let ready = self.read(|m| m.pending() && m.is_online() && m.conflict().is_none() && !m.in_flight());
        if !ready || !self.is_authenticated() || self.is_destroyed() {
            tracing::debug!(app = %self.inner.app, "scheduled push deferred");
            return;
        }
        if let Err(e) = self.run_online(Op::Push).await {
            tracing::debug!(app = %self.inner.app, error = %e, "scheduled push failed");
        }
    }

    async fn submit(&self, op: Op) -> SyncResult<SyncOutcome> {
        if !self.is_online() {
            return Ok(self.enqueue(op));
        }
        self.run_online(op).await
    }

    fn enqueue(&self, op: Op) -> SyncOutcome {
        let weak = self.downgrade();
        let queue_len = self.inner.queue.enqueue(
            op.name(),
            Box::new(move || {
                Box::pin(async move {
                    match weak.upgrade() {
                        Some(inner) => SyncEngine::from_inner(inner).run_online(op).await.map(|_| ()),
                        None => Ok(()),
                    }
                })
            }),
        );
        self.record(DiagnosticEvent::Queued {
            operation: op.name(),
            queue_len,
        });
        SyncOutcome::Deferred
    }

    async fn run_online(&self, op: Op) -> SyncResult<SyncOutcome> {
        let Some(token) = self.inner.credentials.bearer_token() else {
            tracing::debug!(app = %self.inner.app, op = op.name(), "not authenticated, skipping");
            return Ok(SyncOutcome::Skipped);
        };

        let ticket = self.update(|m| m.begin())?;
        match op {
            Op::Push => self.push_inner(ticket, &token).await,
            Op::Pull => self.pull_inner(&token).await,
            Op::CheckAndSync => self.reconcile_inner(ticket, &token).await,
        }
    }

    async fn reconcile_inner(&self, ticket: Ticket, token: &str) -> SyncResult<SyncOutcome> {
        let meta = match self
            .call(self.inner.transport.fetch_meta(&self.inner.app, token))
            .await
        {
            Ok(meta) => meta,
            Err(e) => return self.fail(e),
        };
        *self.inner.available_versions.lock() = meta.available_versions.clone();

        let remote_version = meta.remote().map(|m| m.version);
        let has_local_data = if remote_version.is_none() {
            match self.inner.adapter.read_document() {
                Ok(document) => !is_empty_document(&document),
                Err(e) => return self.fail(e),
            }
        } else {
            false
        };

        let (local_version, pending) = self.read(|m| (m.local_version(), m.pending()));
        let action = decide(remote_version, local_version, pending, has_local_data);
        tracing::debug!(
            app = %self.inner.app,
            ?remote_version,
            local_version,
            pending,
            ?action,
            "reconciling"
        );

        match action {
            ReconcileAction::Bootstrap | ReconcileAction::Push => self.push_inner(ticket, token).await,
            ReconcileAction::Pull => self.pull_inner(token).await,
            ReconcileAction::Nothing => {
                if let Some(server) = remote_version.filter(|server| *server < local_version) {
                    tracing::warn!(
                        app = %self.inner.app,
                        server,
                        local_version,
                        "server is behind local version"
                    );
                }
                self.update(|m| m.up_to_date(remote_version));
                Ok(SyncOutcome::UpToDate)
            }
        }
    }

    async fn push_inner(&self, ticket: Ticket, token: &str) -> SyncResult<SyncOutcome> {
        let data = match self.inner.adapter.read_document() {
            Ok(data) => data,
            Err(e) => return self.fail(e),
        };
        let local_version = self.read(|m| m.local_version());
        let request = PushRequest::new(data, self.inner.device_id.clone(), local_version);
        self.record(DiagnosticEvent::PushStarted { local_version });

        let outcome = self
            .call(self.inner.transport.push(&self.inner.app, token, &request))
            .await;
        match outcome {
            Ok(PushOutcome::Accepted(response)) => Ok(self.apply_accepted(ticket, &response)),
            Ok(PushOutcome::Conflict(response)) => {
                let local_modified = self.read(|m| m.local_modified());
                let conflict = SyncConflict::from_response(&response, local_modified);
                self.update(|m| m.conflict_detected(conflict.clone()));
                self.record(DiagnosticEvent::ConflictDetected {
                    local_version: conflict.local_version,
                    server_version: conflict.server_version,
                });
                Ok(SyncOutcome::Conflict(conflict))
            }
            Err(e) => self.fail(e),
        }
    }

    fn apply_accepted(&self, ticket: Ticket, response: &PushResponse) -> SyncOutcome {
        self.update(|m| m.push_succeeded(ticket, response.version, response.timestamp));
        self.persist(response.version, response.timestamp);
        self.record(DiagnosticEvent::PushCompleted {
            version: response.version,
        });
        SyncOutcome::Pushed {
            version: response.version,
        }
    }

    async fn pull_inner(&self, token: &str) -> SyncResult<SyncOutcome> {
        let response = match self
            .call(self.inner.transport.pull(&self.inner.app, token))
            .await
        {
            Ok(response) => response,
            Err(e) => return self.fail(e),
        };

        if let Err(e) = self.inner.adapter.write_document(response.data) {
            return self.fail(e);
        }

        let version = response.meta.version;
        let previous = self.read(|m| m.local_version());
        if version < previous {
            tracing::warn!(
                app = %self.inner.app,
                version,
                previous,
                "pulled version is older than local, adopting server copy"
            );
        }

        *self.inner.available_versions.lock() = response.available_versions;
        self.update(|m| m.pull_succeeded(version, response.meta.last_modified));
        self.persist(version, response.meta.last_modified);
        self.record(DiagnosticEvent::PullCompleted { version });
        Ok(SyncOutcome::Pulled { version })
    }

    /// Re-fetches meta before a "keep local" override. Returns a fresh
    /// conflict if the server moved past the one being resolved.
    async fn recheck_remote(&self, conflict: &SyncConflict) -> SyncResult<Option<SyncOutcome>> {
        if !self.is_online() {
            return Ok(None);
        }
        let Some(token) = self.inner.credentials.bearer_token() else {
            return Ok(None);
        };

        self.update(|m| m.begin())?;
        let meta = match self
            .call(self.inner.transport.fetch_meta(&self.inner.app, &token))
            .await
        {
            Ok(meta) => meta,
            Err(e) => return self.fail(e),
        };

        match meta.remote() {
            Some(remote) if remote.version > conflict.server_version => {
                let fresh = SyncConflict {
                    local_version: conflict.server_version,
                    server_version: remote.version,
                    local_modified: conflict.local_modified,
                    server_modified: remote.last_modified,
                    server_device_id: remote.device_id.clone(),
                };
                tracing::info!(
                    app = %self.inner.app,
                    server_version = remote.version,
                    "server moved during conflict resolution"
                );
                self.update(|m| m.conflict_detected(fresh.clone()));
                self.record(DiagnosticEvent::ConflictDetected {
                    local_version: fresh.local_version,
                    server_version: fresh.server_version,
                });
                Ok(Some(SyncOutcome::Conflict(fresh)))
            }
            _ => {
                self.update(|m| m.cancelled());
                Ok(None)
            }
        }
    }

    async fn call<T>(&self, request: impl Future<Output = SyncResult<T>>) -> SyncResult<T> {
        tokio::time::timeout(self.inner.config.request_timeout, request)
            .await
            .unwrap_or(Err(SyncError::Timeout))
    }

    fn fail<T>(&self, err: SyncError) -> SyncResult<T> {
        let message = err.to_string();
        self.update(|m| m.failed(message.clone()));
        self.record(DiagnosticEvent::TransportError {
            message,
            retryable: err.is_retryable(),
        });
        Err(err)
    }

    fn persist(&self, version: u64, last_modified: DateTime<Utc>) {
        if let Err(e) = self
            .inner
            .metadata
            .save_local(&self.inner.app, version, last_modified)
        {
            self.record(DiagnosticEvent::PersistenceDegraded {
                message: e.to_string(),
            });
        }
    }

    fn record(&self, event: DiagnosticEvent) {
        self.inner.diagnostics.record(&self.inner.app, &event);
    }

    fn read<R>(&self, f: impl FnOnce(&StateMachine) -> R) -> R {
        f(&self.inner.machine.lock())
    }

    fn update<R>(&self, f: impl FnOnce(&mut StateMachine) -> R) -> R {
        let (result, before, after) = {
            let mut machine = self.inner.machine.lock();
            let before = machine.snapshot();
            let result = f(&mut machine);
            (result, before, machine.snapshot())
        };
        if before != after {
            self.publish(&before, &after);
        }
        result
    }

    fn publish(&self, before: &SyncState, after: &SyncState) {
        if before.status != after.status {
            self.record(DiagnosticEvent::StatusChanged {
                from: before.status,
                to: after.status,
            });
        }

        let listeners: Vec<StateListener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(after))).is_err() {
                self.record(DiagnosticEvent::ListenerPanicked);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MemoryAdapter;
    use crate::diagnostics::RecordingDiagnostics;
    use crate::lifecycle::ChannelLifecycle;
    use crate::transport::{MockPush, MockTransport};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    struct Harness {
        engine: SyncEngine,
        transport: Arc<MockTransport>,
        adapter: Arc<MemoryAdapter>,
        store: Arc<MemoryStore>,
        diagnostics: Arc<RecordingDiagnostics>,
    }

    fn harness_with(config: SyncConfig, local_version: Option<u64>, online: bool) -> Harness {
        let app = SyncApp::new("tasks").unwrap();
        let transport = Arc::new(MockTransport::new());
        let adapter = Arc::new(MemoryAdapter::new(json!({"tasks": ["a"]})));
        let store = Arc::new(MemoryStore::new());
        let diagnostics = Arc::new(RecordingDiagnostics::new());

        if let Some(version) = local_version {
            LocalMetadataStore::new(store.clone())
                .save_local(&app, version, Utc::now())
                .unwrap();
        }

        let engine = SyncEngine::builder(app, transport.clone(), adapter.clone())
            .with_config(config)
            .with_store(store.clone())
            .with_diagnostics(diagnostics.clone())
            .with_token("token")
            .online(online)
            .build();

        Harness {
            engine,
            transport,
            adapter,
            store,
            diagnostics,
        }
    }

    fn harness(local_version: Option<u64>) -> Harness {
        harness_with(SyncConfig::new().without_polling(), local_version, true)
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn initial_state() {
        let h = harness(Some(3));
        let state = h.engine.state();
        assert_eq!(state.status, SyncStatus::Idle);
        assert_eq!(state.local_version, 3);
        assert!(!state.pending_changes);
        assert!(state.conflict.is_none());
        assert!(!h.engine.device_id().is_empty());
        // Device id and metadata share the store.
        assert_eq!(h.store.len(), 2);
    }

    #[tokio::test]
    async fn starts_offline_when_host_is_disconnected() {
        let h = harness_with(SyncConfig::new().without_polling(), None, false);
        assert_eq!(h.engine.status(), SyncStatus::Offline);
    }

    #[tokio::test]
    async fn no_op_reconciliation() {
        let h = harness(Some(4));
        h.transport.set_remote(json!({"tasks": []}), 4, "other");

        let outcome = h.engine.check_and_sync().await.unwrap();
        assert_eq!(outcome, SyncOutcome::UpToDate);
        assert_eq!(h.transport.pull_count(), 0);
        assert_eq!(h.transport.push_count(), 0);
        assert_eq!(h.engine.status(), SyncStatus::Idle);
        assert_eq!(h.engine.state().server_version, Some(4));
    }

    #[tokio::test]
    async fn server_ahead_pulls_once_and_never_pushes() {
        let h = harness(Some(2));
        h.transport.set_remote(json!({"tasks": ["remote"]}), 5, "other");
        h.engine.update(|m| m.mark_pending());

        let outcome = h.engine.check_and_sync().await.unwrap();
        assert_eq!(outcome, SyncOutcome::Pulled { version: 5 });
        assert_eq!(h.transport.pull_count(), 1);
        assert_eq!(h.transport.push_count(), 0);

        let state = h.engine.state();
        assert_eq!(state.local_version, 5);
        assert!(!state.pending_changes);
        assert_eq!(h.adapter.get(), json!({"tasks": ["remote"]}));
    }

    #[tokio::test]
    async fn equal_versions_with_pending_changes_push() {
        let h = harness(Some(3));
        h.transport.set_remote(json!({}), 3, "other");
        h.engine.update(|m| m.mark_pending());

        let outcome = h.engine.check_and_sync().await.unwrap();
        assert_eq!(outcome, SyncOutcome::Pushed { version: 4 });
        assert_eq!(h.transport.pushes()[0].local_version, 3);
    }

    #[tokio::test]
    async fn bootstrap_pushes_local_data() {
        let h = harness(None);
        let outcome = h.engine.check_and_sync().await.unwrap();
        assert_eq!(outcome, SyncOutcome::Pushed { version: 1 });
        assert_eq!(h.transport.remote_data(), Some(json!({"tasks": ["a"]})));
    }

    #[tokio::test]
    async fn bootstrap_skips_empty_local_data() {
        let h = harness(None);
        h.adapter.set(json!({}));
        let outcome = h.engine.check_and_sync().await.unwrap();
        assert_eq!(outcome, SyncOutcome::UpToDate);
        assert_eq!(h.transport.push_count(), 0);
    }

    #[tokio::test]
    async fn push_success_clears_pending_and_persists() {
        let h = harness(Some(1));
        h.transport.set_remote(json!({}), 1, "other");
        h.engine.update(|m| m.mark_pending());

        let outcome = h.engine.push().await.unwrap();
        assert_eq!(outcome, SyncOutcome::Pushed { version: 2 });

        let state = h.engine.state();
        assert!(!state.pending_changes);
        assert_eq!(state.local_version, 2);
        assert!(state.last_synced_at.is_some());

        let saved = LocalMetadataStore::new(h.store.clone())
            .get_local(h.engine.app())
            .unwrap();
        assert_eq!(saved.version, 2);
        assert!(h
            .diagnostics
            .any(|e| *e == DiagnosticEvent::PushCompleted { version: 2 }));
    }

    #[tokio::test]
    async fn push_sends_device_id_and_version() {
        let h = harness(Some(7));
        h.transport.set_remote(json!({}), 7, "other");
        h.engine.push().await.unwrap();

        let pushed = &h.transport.pushes()[0];
        assert_eq!(pushed.device_id, h.engine.device_id());
        assert_eq!(pushed.local_version, 7);
        assert_eq!(pushed.data, json!({"tasks": ["a"]}));
    }

    #[tokio::test]
    async fn transport_failure_sets_error() {
        let h = harness(Some(1));
        h.transport.set_failing(true);

        let result = h.engine.check_and_sync().await;
        assert!(result.is_err());

        let state = h.engine.state();
        assert_eq!(state.status, SyncStatus::Error);
        assert!(state.last_error.unwrap().contains("unreachable"));
        assert!(h
            .diagnostics
            .any(|e| matches!(e, DiagnosticEvent::TransportError { retryable: true, .. })));

        // The next trigger may try again.
        h.transport.set_failing(false);
        h.transport.set_remote(json!({}), 1, "other");
        h.engine.check_and_sync().await.unwrap();
        assert_eq!(h.engine.status(), SyncStatus::Idle);
        assert!(h.engine.state().last_error.is_none());
    }

    #[tokio::test]
    async fn no_credential_means_no_network() {
        let h = harness(Some(1));
        let engine = SyncEngine::builder(
            SyncApp::new("tasks").unwrap(),
            h.transport.clone(),
            h.adapter.clone(),
        )
        .build();

        assert_eq!(engine.check_and_sync().await.unwrap(), SyncOutcome::Skipped);
        assert_eq!(engine.push().await.unwrap(), SyncOutcome::Skipped);
        assert_eq!(h.transport.meta_count(), 0);
        assert_eq!(h.transport.push_count(), 0);
        assert_eq!(engine.status(), SyncStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn operations_are_single_flight() {
        let h = harness(Some(1));
        h.transport.set_remote(json!({}), 1, "other");
        h.transport.set_latency(Some(Duration::from_secs(1)));

        let engine = h.engine.clone();
        let first = tokio::spawn(async move { engine.push().await });
        settle().await;
        assert_eq!(h.engine.status(), SyncStatus::Syncing);

        assert!(matches!(h.engine.pull().await, Err(SyncError::InProgress)));
        assert!(first.await.unwrap().is_ok());
        assert_eq!(h.transport.pull_count(), 0);
    }

    #[tokio::test]
    async fn conflict_halts_and_records() {
        let h = harness(Some(4));
        h.transport.set_remote(json!({"tasks": ["theirs"]}), 6, "desktop");
        h.engine.update(|m| m.mark_pending());

        let outcome = h.engine.push().await.unwrap();
        let SyncOutcome::Conflict(conflict) = outcome else {
            panic!("expected conflict, got {outcome:?}");
        };
        assert_eq!(conflict.local_version, 4);
        assert_eq!(conflict.server_version, 6);
        assert_eq!(conflict.server_device_id, "desktop");

        let state = h.engine.state();
        assert_eq!(state.status, SyncStatus::Conflict);
        assert_eq!(state.local_version, 4);
        assert!(state.pending_changes);
        assert_eq!(h.transport.push_count(), 1);
    }

    #[tokio::test]
    async fn resolve_remote_takes_server_copy() {
        let h = harness(Some(4));
        h.transport.set_remote(json!({"tasks": ["theirs"]}), 6, "desktop");
        h.engine.update(|m| m.mark_pending());
        h.engine.push().await.unwrap();

        let outcome = h.engine.resolve_conflict(ConflictChoice::Remote).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Pulled { version: 6 });

        let state = h.engine.state();
        assert_eq!(state.local_version, 6);
        assert!(state.conflict.is_none());
        assert!(!state.pending_changes);
        assert_eq!(state.status, SyncStatus::Idle);
        assert_eq!(h.adapter.get(), json!({"tasks": ["theirs"]}));
    }

    #[tokio::test]
    async fn resolve_local_overrides_server_version() {
        let h = harness(Some(4));
        h.transport.set_remote(json!({"tasks": ["theirs"]}), 6, "desktop");
        h.engine.update(|m| m.mark_pending());
        h.engine.push().await.unwrap();

        let outcome = h.engine.resolve_conflict(ConflictChoice::Local).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Pushed { version: 7 });
        assert_eq!(h.transport.pushes()[1].local_version, 6);

        let state = h.engine.state();
        assert_eq!(state.local_version, 7);
        assert!(state.conflict.is_none());
        assert_eq!(h.transport.remote_data(), Some(json!({"tasks": ["a"]})));
    }

    #[tokio::test]
    async fn resolve_without_conflict_fails() {
        let h = harness(Some(1));
        let result = h.engine.resolve_conflict(ConflictChoice::Local).await;
        assert!(matches!(result, Err(SyncError::NoActiveConflict)));
    }

    #[tokio::test]
    async fn recheck_raises_fresh_conflict_when_server_moved() {
        let h = harness_with(
            SyncConfig::new()
                .without_polling()
                .with_recheck_before_override(true),
            Some(4),
            true,
        );
        h.transport.set_remote(json!({}), 6, "desktop");
        h.engine.push().await.unwrap();

        // A third device writes before the user decides.
        h.transport.set_remote(json!({"tasks": ["third"]}), 7, "tablet");

        let outcome = h.engine.resolve_conflict(ConflictChoice::Local).await.unwrap();
        let SyncOutcome::Conflict(fresh) = outcome else {
            panic!("expected a fresh conflict, got {outcome:?}");
        };
        assert_eq!(fresh.server_version, 7);
        assert_eq!(fresh.server_device_id, "tablet");
        assert_eq!(h.engine.status(), SyncStatus::Conflict);
        assert_eq!(h.transport.push_count(), 1);
    }

    #[tokio::test]
    async fn recheck_overrides_when_server_is_unchanged() {
        let h = harness_with(
            SyncConfig::new()
                .without_polling()
                .with_recheck_before_override(true),
            Some(4),
            true,
        );
        h.transport.set_remote(json!({}), 6, "desktop");
        h.engine.push().await.unwrap();

        let outcome = h.engine.resolve_conflict(ConflictChoice::Local).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Pushed { version: 7 });
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_push_coalesces_bursts() {
        let h = harness_with(
            SyncConfig::new()
                .without_polling()
                .with_debounce(Duration::from_secs(30)),
            Some(1),
            true,
        );
        h.transport.set_remote(json!({}), 1, "other");

        for _ in 0..4 {
            h.engine.schedule_push();
            assert!(h.engine.state().pending_changes);
            tokio::time::sleep(Duration::from_secs(20)).await;
        }
        settle().await;
        assert_eq!(h.transport.push_count(), 0);

        tokio::time::sleep(Duration::from_secs(11)).await;
        settle().await;
        assert_eq!(h.transport.push_count(), 1);
        assert!(!h.engine.state().pending_changes);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_push_defers_while_offline() {
        let h = harness_with(
            SyncConfig::new()
                .without_polling()
                .with_debounce(Duration::from_secs(1)),
            Some(1),
            false,
        );
        h.engine.schedule_push();
        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;

        assert_eq!(h.transport.push_count(), 0);
        assert!(h.engine.state().pending_changes);
    }

    #[tokio::test]
    async fn offline_operations_are_queued_and_drained_in_order() {
        let h = harness_with(SyncConfig::new().without_polling(), Some(1), false);
        h.transport.set_remote(json!({}), 1, "other");
        h.transport.script_push(MockPush::Fail("flaky".into()));
        h.engine.update(|m| m.mark_pending());

        for _ in 0..3 {
            assert_eq!(h.engine.push().await.unwrap(), SyncOutcome::Deferred);
        }
        assert_eq!(h.engine.queue_len(), 3);
        assert_eq!(h.transport.push_count(), 0);

        h.engine.set_online(true).await;

        // First failed, second and third were still attempted.
        assert_eq!(h.transport.push_count(), 3);
        assert_eq!(h.engine.queue_len(), 0);
        assert!(h.diagnostics.any(|e| matches!(
            e,
            DiagnosticEvent::QueueDrained {
                succeeded: 2,
                failed: 1
            }
        )));
        assert_eq!(h.engine.status(), SyncStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_override_keeps_conflict_from_poller() {
        let h = harness_with(
            SyncConfig::new()
                .with_poll_interval(Duration::from_secs(60))
                .with_recheck_before_override(true),
            Some(4),
            true,
        );
        h.transport.set_remote(json!({"tasks": ["theirs"]}), 6, "desktop");
        h.engine.update(|m| m.mark_pending());
        h.engine.start();
        h.engine.push().await.unwrap();

        h.transport.set_failing(true);
        assert!(h.engine.resolve_conflict(ConflictChoice::Local).await.is_err());
        let state = h.engine.state();
        assert_eq!(state.status, SyncStatus::Conflict);
        assert!(state.conflict.is_some());
        assert!(state.last_error.is_some());

        h.transport.set_failing(false);
        tokio::time::sleep(Duration::from_secs(61)).await;
        settle().await;

        assert_eq!(h.transport.pull_count(), 0);
        assert_eq!(h.engine.status(), SyncStatus::Conflict);
        assert!(h.engine.state().pending_changes);
        assert_eq!(h.adapter.get(), json!({"tasks": ["a"]}));
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_while_busy_keeps_conflict() {
        let h = harness(Some(4));
        h.transport.set_remote(json!({"tasks": ["theirs"]}), 6, "desktop");
        h.engine.push().await.unwrap();

        h.transport.set_latency(Some(Duration::from_secs(1)));
        let engine = h.engine.clone();
        let busy = tokio::spawn(async move { engine.push().await });
        settle().await;

        let result = h.engine.resolve_conflict(ConflictChoice::Local).await;
        assert!(matches!(result, Err(SyncError::InProgress)));
        let state = h.engine.state();
        assert_eq!(state.conflict.map(|c| c.server_version), Some(6));
        assert_eq!(state.local_version, 4);

        busy.await.unwrap().unwrap();
        assert!(h.engine.state().conflict.is_some());
    }

    #[tokio::test]
    async fn force_push_in_conflict_is_not_queued() {
        let h = harness(Some(4));
        h.transport.set_remote(json!({}), 6, "desktop");
        h.engine.update(|m| m.mark_pending());
        h.engine.push().await.unwrap();
        h.engine.set_online(false).await;

        assert_eq!(h.engine.force_push().dispatch(), Dispatch::Skipped);
        assert_eq!(h.engine.queue_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn offline_signal_interrupts_reconnect_sync() {
        let h = harness(Some(1));
        h.transport.set_remote(json!({}), 1, "other");
        let lifecycle = Arc::new(ChannelLifecycle::new(false));
        h.engine.attach_lifecycle(lifecycle.clone());
        assert_eq!(h.engine.status(), SyncStatus::Offline);

        h.engine.update(|m| m.mark_pending());
        h.transport.set_latency(Some(Duration::from_secs(20)));
        lifecycle.set_online(true);
        settle().await;
        assert_eq!(h.engine.status(), SyncStatus::Syncing);

        lifecycle.set_online(false);
        settle().await;
        assert_eq!(h.engine.status(), SyncStatus::Offline);

        // The request in flight still lands; the status stays offline.
        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(h.engine.status(), SyncStatus::Offline);
        assert!(!h.engine.read(|m| m.in_flight()));
        assert_eq!(h.transport.push_count(), 1);
    }

    #[tokio::test]
    async fn going_offline_overrides_status() {
        let h = harness(Some(1));
        h.engine.set_online(false).await;
        assert_eq!(h.engine.status(), SyncStatus::Offline);
        assert_eq!(h.engine.check_and_sync().await.unwrap(), SyncOutcome::Deferred);
        assert_eq!(h.transport.meta_count(), 0);
    }

    #[tokio::test]
    async fn force_push_sends_pending_changes() {
        let h = harness(Some(1));
        h.transport.set_remote(json!({}), 1, "other");
        h.engine.update(|m| m.mark_pending());

        let attempt = h.engine.force_push();
        assert_eq!(attempt.dispatch(), Dispatch::Sent);
        assert!(attempt.wait(Duration::from_secs(5)).await);

        assert_eq!(h.transport.push_count(), 1);
        assert_eq!(h.engine.state().local_version, 2);
        assert!(h.diagnostics.any(|e| *e == DiagnosticEvent::BestEffortSent));
    }

    #[tokio::test]
    async fn force_push_without_changes_is_skipped() {
        let h = harness(Some(1));
        assert_eq!(h.engine.force_push().dispatch(), Dispatch::Skipped);
        assert_eq!(h.transport.push_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn force_push_cancels_debounce() {
        let h = harness(Some(1));
        h.transport.set_remote(json!({}), 1, "other");
        h.engine.schedule_push();
        assert!(h.engine.debug_snapshot().debounce_armed);

        h.engine.force_push().wait(Duration::from_secs(5)).await;
        assert!(!h.engine.debug_snapshot().debounce_armed);

        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(h.transport.push_count(), 1);
    }

    #[tokio::test]
    async fn force_push_while_offline_is_queued() {
        let h = harness_with(SyncConfig::new().without_polling(), Some(1), false);
        h.engine.update(|m| m.mark_pending());
        assert_eq!(h.engine.force_push().dispatch(), Dispatch::Queued);
        assert_eq!(h.engine.queue_len(), 1);
    }

    #[tokio::test]
    async fn force_push_survives_destroy() {
        let h = harness(Some(1));
        h.transport.set_remote(json!({}), 1, "other");
        h.engine.update(|m| m.mark_pending());

        let attempt = h.engine.force_push();
        h.engine.destroy();
        assert!(attempt.wait(Duration::from_secs(5)).await);
        assert_eq!(h.transport.remote_version(), Some(2));
    }

    #[tokio::test]
    async fn listeners_are_isolated_from_panics() {
        let h = harness(Some(1));
        h.transport.set_remote(json!({}), 1, "other");
        let seen = Arc::new(AtomicUsize::new(0));

        h.engine.subscribe(|_| panic!("bad listener"));
        let counter = Arc::clone(&seen);
        h.engine.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        h.engine.check_and_sync().await.unwrap();
        // idle -> syncing -> idle
        assert!(seen.load(Ordering::SeqCst) >= 2);
        assert!(h.diagnostics.any(|e| *e == DiagnosticEvent::ListenerPanicked));
    }

    #[tokio::test]
    async fn unsubscribe_stops_notifications() {
        let h = harness(Some(1));
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let id = h.engine.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(h.engine.unsubscribe(id));
        assert!(!h.engine.unsubscribe(id));
        h.engine.update(|m| m.mark_pending());
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn lifecycle_events_drive_the_engine() {
        let h = harness(Some(1));
        h.transport.set_remote(json!({}), 1, "other");
        let lifecycle = Arc::new(ChannelLifecycle::new(true));
        h.engine.attach_lifecycle(lifecycle.clone());

        lifecycle.set_online(false);
        settle().await;
        assert_eq!(h.engine.status(), SyncStatus::Offline);

        h.engine.update(|m| m.mark_pending());
        lifecycle.set_online(true);
        settle().await;
        // Reconnect reconciliation pushed the pending change.
        assert_eq!(h.transport.push_count(), 1);
        assert_eq!(h.engine.status(), SyncStatus::Idle);

        h.transport.set_remote(json!({"tasks": ["new"]}), 9, "other");
        lifecycle.resume();
        settle().await;
        assert_eq!(h.engine.state().local_version, 9);
    }

    #[tokio::test]
    async fn lifecycle_suspend_forces_push() {
        let h = harness(Some(1));
        h.transport.set_remote(json!({}), 1, "other");
        let lifecycle = Arc::new(ChannelLifecycle::new(true));
        h.engine.attach_lifecycle(lifecycle.clone());

        h.engine.update(|m| m.mark_pending());
        lifecycle.suspend();
        settle().await;
        assert_eq!(h.transport.push_count(), 1);
    }

    #[tokio::test]
    async fn destroy_tears_down_without_transition() {
        let h = harness_with(
            SyncConfig::new().with_poll_interval(Duration::from_secs(10)),
            Some(1),
            true,
        );
        h.engine.start();
        h.engine.schedule_push();
        let status = h.engine.status();

        h.engine.destroy();
        let snapshot = h.engine.debug_snapshot();
        assert!(!snapshot.debounce_armed);
        assert!(!snapshot.poller_running);
        assert_eq!(h.engine.status(), status);
        assert!(h.engine.is_destroyed());
    }

    #[tokio::test]
    async fn persistence_failure_does_not_fail_sync() {
        struct ReadOnly;
        impl KeyValueStore for ReadOnly {
            fn get(&self, _key: &str) -> SyncResult<Option<String>> {
                Ok(None)
            }
            fn set(&self, _key: &str, _value: &str) -> SyncResult<()> {
                Err(SyncError::Persistence("disk full".into()))
            }
        }

        let transport = Arc::new(MockTransport::new());
        let diagnostics = Arc::new(RecordingDiagnostics::new());
        let engine = SyncEngine::builder(
            SyncApp::new("tasks").unwrap(),
            transport.clone(),
            Arc::new(MemoryAdapter::new(json!({"a": 1}))),
        )
        .with_store(Arc::new(ReadOnly))
        .with_diagnostics(diagnostics.clone())
        .with_token("token")
        .build();

        assert_eq!(
            engine.check_and_sync().await.unwrap(),
            SyncOutcome::Pushed { version: 1 }
        );
        assert_eq!(engine.state().local_version, 1);
        assert!(diagnostics.any(|e| matches!(e, DiagnosticEvent::PersistenceDegraded { .. })));
    }

    #[tokio::test]
    async fn restart_resumes_from_persisted_version() {
        let h = harness(None);
        h.engine.check_and_sync().await.unwrap();

        let restarted = SyncEngine::builder(
            h.engine.app().clone(),
            h.transport.clone(),
            h.adapter.clone(),
        )
        .with_store(h.store.clone())
        .with_token("token")
        .build();

        assert_eq!(restarted.state().local_version, 1);
        assert_eq!(restarted.device_id(), h.engine.device_id());
        assert_eq!(restarted.check_and_sync().await.unwrap(), SyncOutcome::UpToDate);
    }
}
