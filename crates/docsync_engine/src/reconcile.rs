//! The three-way version comparison behind `check_and_sync`.

/// What a reconciliation pass should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// No remote document yet and local data exists: upload it.
    Bootstrap,
    /// The server is ahead: overwrite local with the remote document.
    Pull,
    /// Versions match and local changes are unpushed.
    Push,
    /// Nothing to transfer.
    Nothing,
}

/// Decides the reconciliation step.
///
/// `remote_version` is `None` when the server has no document. A server
/// behind the local version (restored or reset) is left alone.
pub fn decide(
    remote_version: Option<u64>,
    local_version: u64,
    pending_changes: bool,
    has_local_data: bool,
) -> ReconcileAction {
    match remote_version {
        None if has_local_data => ReconcileAction::Bootstrap,
        None => ReconcileAction::Nothing,
        Some(server) if server > local_version => ReconcileAction::Pull,
        Some(server) if server == local_version && pending_changes => ReconcileAction::Push,
        Some(_) => ReconcileAction::Nothing,
    }
}
