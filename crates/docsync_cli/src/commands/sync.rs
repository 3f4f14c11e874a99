//! One-shot pull, push and resolve commands.

use super::{Connection, Session};
use docsync_engine::{ConflictChoice, SyncConfig, SyncConflict, SyncOutcome};
use std::path::Path;

fn one_shot() -> SyncConfig {
    SyncConfig::new().without_polling()
}

/// Pulls the remote document into `file`.
pub async fn pull(connection: &Connection, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(connection, file, one_shot())?;
    let outcome = session.engine.pull().await?;
    report(&outcome, file)
}

/// Pushes `file` to the server.
pub async fn push(connection: &Connection, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(connection, file, one_shot())?;
    let outcome = session.engine.push().await?;
    report(&outcome, file)
}

/// Pushes `file` and resolves a conflict by keeping `keep`.
pub async fn resolve(
    connection: &Connection,
    file: &Path,
    keep: ConflictChoice,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(connection, file, one_shot())?;
    let outcome = session.engine.push().await?;

    let SyncOutcome::Conflict(conflict) = outcome else {
        println!("No conflict to resolve.");
        return report(&outcome, file);
    };
    print_conflict(&conflict);
    println!("Keeping {keep} copy...");

    let outcome = session.engine.resolve_conflict(keep).await?;
    report(&outcome, file)
}

/// Prints an outcome. A conflict is returned as an error.
pub fn report(outcome: &SyncOutcome, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    match outcome {
        SyncOutcome::Pushed { version } => println!("✓ Pushed {} as version {version}", file.display()),
        SyncOutcome::Pulled { version } => println!("✓ Pulled version {version} into {}", file.display()),
        SyncOutcome::UpToDate => println!("✓ Already up to date"),
        SyncOutcome::Deferred => println!("Offline: operation queued"),
        SyncOutcome::Skipped => return Err("not authenticated: nothing was synced".into()),
        SyncOutcome::Conflict(conflict) => {
            print_conflict(conflict);
            return Err("version conflict: run `docsync resolve <file> --keep local|remote`".into());
        }
    }
    Ok(())
}

fn print_conflict(conflict: &SyncConflict) {
    println!("⚠ Version conflict");
    println!("  Local version:  {}", conflict.local_version);
    println!(
        "  Server version: {} ({} behind, written by {} at {})",
        conflict.server_version,
        conflict.versions_behind(),
        conflict.server_device_id,
        conflict.server_modified.to_rfc3339()
    );
}
