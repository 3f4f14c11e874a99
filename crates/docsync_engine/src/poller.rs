//! Periodic reconciliation.

use crate::engine::{EngineInner, SyncEngine};
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Spawns the poll loop for an engine.
///
/// Each tick runs `check_and_sync` if the engine is settled, online and
/// authenticated; it never fires into an in-flight operation or an open
/// conflict. The loop ends once the engine is dropped.
pub(crate) fn spawn(engine: Weak<EngineInner>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(inner) = engine.upgrade() else { break };
            let engine = SyncEngine::from_inner(inner);
            if !engine.may_poll() {
                tracing::trace!(app = %engine.app(), status = %engine.status(), "poll skipped");
                continue;
            }
            if let Err(e) = engine.check_and_sync().await {
                tracing::debug!(app = %engine.app(), error = %e, "poll failed");
            }
        }
    })
}
