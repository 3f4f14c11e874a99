//! Long-running sync of one file.

use super::{Connection, Session};
use docsync_engine::{ChannelLifecycle, Dispatch, SyncConfig, SyncStatus};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// How long shutdown waits for the final push.
pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Timing options for `run`.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Quiet period before pushing local edits.
    pub debounce: Duration,
    /// Interval between remote checks.
    pub poll_interval: Duration,
    /// Interval between file modification checks.
    pub watch_interval: Duration,
}

/// Keeps `file` in sync until Ctrl-C.
pub async fn run(
    connection: &Connection,
    file: &Path,
    options: RunOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = SyncConfig::new()
        .with_debounce(options.debounce)
        .with_poll_interval(options.poll_interval);
    let session = Session::open(connection, file, config)?;
    let engine = &session.engine;

    let lifecycle = Arc::new(ChannelLifecycle::new(true));
    engine.attach_lifecycle(lifecycle.clone());
    engine.start();

    engine.subscribe(|state| match state.status {
        SyncStatus::Conflict => {
            if let Some(conflict) = &state.conflict {
                tracing::warn!(
                    local_version = conflict.local_version,
                    server_version = conflict.server_version,
                    "conflict: run `docsync resolve` to continue"
                );
            }
        }
        SyncStatus::Error => {
            if let Some(error) = &state.last_error {
                tracing::warn!(error = %error, "sync error");
            }
        }
        _ => {}
    });

    println!(
        "Syncing {} as '{}' (device {}). Press Ctrl-C to stop.",
        file.display(),
        engine.app(),
        engine.device_id()
    );

    if let Err(e) = engine.check_and_sync().await {
        tracing::warn!(error = %e, "initial sync failed");
    }

    let mut watch = tokio::time::interval(options.watch_interval);
    loop {
        tokio::select! {
            _ = watch.tick() => {
                if session.adapter.poll_change() {
                    tracing::debug!(file = %file.display(), "local change detected");
                    engine.schedule_push();
                }
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
        }
    }

    println!("Stopping...");
    let flush = engine.force_push();
    lifecycle.terminate();
    match flush.dispatch() {
        Dispatch::Sent => {
            if flush.wait(FLUSH_TIMEOUT).await {
                println!("✓ Pending changes sent");
            } else {
                println!("⚠ Final push did not finish within {}s", FLUSH_TIMEOUT.as_secs());
            }
        }
        Dispatch::Queued => println!("⚠ Offline: pending changes were not sent"),
        Dispatch::Skipped => {}
    }

    engine.destroy();
    Ok(())
}
