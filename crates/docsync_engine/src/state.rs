//! Sync state machine.

use crate::error::{SyncError, SyncResult};
use crate::metadata::LocalMeta;
use chrono::{DateTime, Utc};
use docsync_protocol::{ConflictChoice, SyncConflict};
use std::fmt;

/// The current status of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncStatus {
    /// Nothing in flight.
    Idle,
    /// A push, pull or reconciliation is in flight.
    Syncing,
    /// The last operation failed; the next trigger may try again.
    Error,
    /// The host reported no network; operations are queued.
    Offline,
    /// A push was rejected for a stale version and awaits a decision.
    Conflict,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Error => "error",
            SyncStatus::Offline => "offline",
            SyncStatus::Conflict => "conflict",
        };
        f.write_str(name)
    }
}

/// Externally observable snapshot of an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    /// Current status.
    pub status: SyncStatus,
    /// When the last push or pull succeeded.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Message of the last failure, cleared on success.
    pub last_error: Option<String>,
    /// Outstanding conflict, if any.
    pub conflict: Option<SyncConflict>,
    /// True while a local change has not been pushed.
    pub pending_changes: bool,
    /// Last server version seen, if any.
    pub server_version: Option<u64>,
    /// Last server-confirmed version held locally.
    pub local_version: u64,
}

/// Proof that an operation was admitted by [`StateMachine::begin`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct Ticket {
    change_seq: u64,
}

/// Transition logic behind the engine's single mutex.
///
/// `in_flight` is the single-flight guard. It is tracked apart from the
/// status because going offline overrides `Syncing` while the request is
/// still running.
#[derive(Debug)]
pub(crate) struct StateMachine {
    state: SyncState,
    online: bool,
    in_flight: bool,
    change_seq: u64,
    local_modified: Option<DateTime<Utc>>,
}

impl StateMachine {
    pub(crate) fn new(online: bool, local: Option<LocalMeta>) -> Self {
        Self {
            state: SyncState {
                status: if online {
                    SyncStatus::Idle
                } else {
                    SyncStatus::Offline
                },
                last_synced_at: local.map(|m| m.last_modified),
                last_error: None,
                conflict: None,
                pending_changes: false,
                server_version: None,
                local_version: local.map(|m| m.version).unwrap_or(0),
            },
            online,
            in_flight: false,
            change_seq: 0,
            local_modified: local.map(|m| m.last_modified),
        }
    }

    pub(crate) fn snapshot(&self) -> SyncState {
        self.state.clone()
    }

    pub(crate) fn status(&self) -> SyncStatus {
        self.state.status
    }

    pub(crate) fn is_online(&self) -> bool {
        self.online
    }

    pub(crate) fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub(crate) fn pending(&self) -> bool {
        self.state.pending_changes
    }

    pub(crate) fn local_version(&self) -> u64 {
        self.state.local_version
    }

    pub(crate) fn local_modified(&self) -> Option<DateTime<Utc>> {
        self.local_modified
    }

    pub(crate) fn conflict(&self) -> Option<&SyncConflict> {
        self.state.conflict.as_ref()
    }

    /// Admits an operation, `idle/error/conflict → syncing`.
    pub(crate) fn begin(&mut self) -> SyncResult<Ticket> {
        if self.in_flight {
            return Err(SyncError::InProgress);
        }
        self.in_flight = true;
        if self.online {
            self.state.status = SyncStatus::Syncing;
        }
        Ok(Ticket {
            change_seq: self.change_seq,
        })
    }

    /// Records a local mutation.
    pub(crate) fn mark_pending(&mut self) {
        self.change_seq += 1;
        self.state.pending_changes = true;
    }

    /// Clears the outstanding conflict in favour of `choice`.
    ///
    /// `Remote` drops unpushed local state; `Local` adopts the server's
    /// version so the next push overwrites it.
    pub(crate) fn resolve(&mut self, choice: ConflictChoice) -> Option<SyncConflict> {
        let conflict = self.take_conflict()?;
        match choice {
            ConflictChoice::Remote => self.state.pending_changes = false,
            ConflictChoice::Local => self.state.local_version = conflict.server_version,
        }
        Some(conflict)
    }

    pub(crate) fn push_succeeded(&mut self, ticket: Ticket, version: u64, timestamp: DateTime<Utc>) {
        self.state.local_version = version;
        self.state.server_version = Some(version);
        self.state.last_synced_at = Some(timestamp);
        self.state.last_error = None;
        self.state.conflict = None;
        // A mutation that landed mid-flight is not in the pushed snapshot.
        self.state.pending_changes = self.change_seq != ticket.change_seq;
        self.local_modified = Some(timestamp);
        self.finish(SyncStatus::Idle);
    }

    pub(crate) fn pull_succeeded(&mut self, version: u64, last_modified: DateTime<Utc>) {
        self.state.local_version = version;
        self.state.server_version = Some(version);
        self.state.last_synced_at = Some(Utc::now());
        self.state.last_error = None;
        self.state.conflict = None;
        self.state.pending_changes = false;
        self.local_modified = Some(last_modified);
        self.finish(SyncStatus::Idle);
    }

    /// Ends a reconciliation that needed no transfer.
    pub(crate) fn up_to_date(&mut self, server_version: Option<u64>) {
        self.state.server_version = server_version;
        self.state.last_error = None;
        let target = if self.state.conflict.is_some() {
            SyncStatus::Conflict
        } else {
            SyncStatus::Idle
        };
        self.finish(target);
    }

    pub(crate) fn conflict_detected(&mut self, conflict: SyncConflict) {
        self.state.server_version = Some(conflict.server_version);
        self.state.conflict = Some(conflict);
        self.finish(SyncStatus::Conflict);
    }

    /// Records a failure. An outstanding conflict keeps the engine in
    /// `conflict`; only the user can leave it.
    pub(crate) fn failed(&mut self, message: String) {
        self.state.last_error = Some(message);
        let target = if self.state.conflict.is_some() {
            SyncStatus::Conflict
        } else {
            SyncStatus::Error
        };
        self.finish(target);
    }

    /// Ends an admitted operation that was abandoned before any I/O.
    pub(crate) fn cancelled(&mut self) {
        let target = if self.state.conflict.is_some() {
            SyncStatus::Conflict
        } else if self.state.last_error.is_some() {
            SyncStatus::Error
        } else {
            SyncStatus::Idle
        };
        self.finish(target);
    }

    /// Takes the outstanding conflict, `conflict → idle`.
    pub(crate) fn take_conflict(&mut self) -> Option<SyncConflict> {
        let conflict = self.state.conflict.take()?;
        if self.state.status == SyncStatus::Conflict {
            self.state.status = SyncStatus::Idle;
        }
        Some(conflict)
    }

    /// `* → offline`.
    pub(crate) fn go_offline(&mut self) {
        self.online = false;
        self.state.status = SyncStatus::Offline;
    }

    /// `offline → idle/conflict/syncing`.
    pub(crate) fn go_online(&mut self) {
        self.online = true;
        if self.state.status != SyncStatus::Offline {
            return;
        }
        self.state.status = if self.in_flight {
            SyncStatus::Syncing
        } else if self.state.conflict.is_some() {
            SyncStatus::Conflict
        } else {
            SyncStatus::Idle
        };
    }

    fn finish(&mut self, target: SyncStatus) {
        self.in_flight = false;
        // Offline overrides the outcome; the result is kept, the status is not.
        if self.state.status != SyncStatus::Offline {
            self.state.status = target;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict(local: u64, server: u64) -> SyncConflict {
        SyncConflict {
            local_version: local,
            server_version: server,
            local_modified: None,
            server_modified: Utc::now(),
            server_device_id: "other".into(),
        }
    }

    #[test]
    fn status_display() {
        assert_eq!(SyncStatus::Conflict.to_string(), "conflict");
        assert_eq!(SyncStatus::Offline.to_string(), "offline");
    }

    #[test]
    fn initial_state_follows_connectivity() {
        assert_eq!(StateMachine::new(true, None).status(), SyncStatus::Idle);
        assert_eq!(StateMachine::new(false, None).status(), SyncStatus::Offline);

        let local = LocalMeta {
            version: 9,
            last_modified: Utc::now(),
        };
        let machine = StateMachine::new(true, Some(local));
        assert_eq!(machine.local_version(), 9);
        assert!(!machine.pending());
    }

    #[test]
    fn single_flight_guard() {
        let mut machine = StateMachine::new(true, None);
        let _ticket = machine.begin().unwrap();
        assert_eq!(machine.status(), SyncStatus::Syncing);
        assert!(matches!(machine.begin(), Err(SyncError::InProgress)));
    }

    #[test]
    fn push_success_clears_pending() {
        let mut machine = StateMachine::new(true, None);
        machine.mark_pending();
        let ticket = machine.begin().unwrap();
        machine.push_succeeded(ticket, 3, Utc::now());

        let state = machine.snapshot();
        assert_eq!(state.status, SyncStatus::Idle);
        assert!(!state.pending_changes);
        assert_eq!(state.local_version, 3);
        assert_eq!(state.server_version, Some(3));
    }

    #[test]
    fn mutation_during_push_stays_pending() {
        let mut machine = StateMachine::new(true, None);
        machine.mark_pending();
        let ticket = machine.begin().unwrap();
        machine.mark_pending();
        machine.push_succeeded(ticket, 1, Utc::now());
        assert!(machine.pending());
    }

    #[test]
    fn failure_records_error() {
        let mut machine = StateMachine::new(true, None);
        machine.begin().unwrap();
        machine.failed("boom".into());

        let state = machine.snapshot();
        assert_eq!(state.status, SyncStatus::Error);
        assert_eq!(state.last_error.as_deref(), Some("boom"));
        // Error is not sticky.
        assert!(machine.begin().is_ok());
    }

    #[test]
    fn conflict_lifecycle() {
        let mut machine = StateMachine::new(true, None);
        machine.begin().unwrap();
        machine.conflict_detected(conflict(4, 6));
        assert_eq!(machine.status(), SyncStatus::Conflict);
        assert_eq!(machine.snapshot().server_version, Some(6));

        let taken = machine.take_conflict().unwrap();
        assert_eq!(taken.server_version, 6);
        assert_eq!(machine.status(), SyncStatus::Idle);
        assert!(machine.take_conflict().is_none());
    }

    #[test]
    fn failure_during_conflict_keeps_conflict() {
        let mut machine = StateMachine::new(true, None);
        machine.begin().unwrap();
        machine.conflict_detected(conflict(4, 6));

        machine.begin().unwrap();
        machine.failed("timeout".into());

        let state = machine.snapshot();
        assert_eq!(state.status, SyncStatus::Conflict);
        assert_eq!(state.last_error.as_deref(), Some("timeout"));
        assert_eq!(state.conflict.map(|c| c.server_version), Some(6));
    }

    #[test]
    fn resolve_applies_choice() {
        let mut machine = StateMachine::new(true, None);
        machine.mark_pending();
        machine.begin().unwrap();
        machine.conflict_detected(conflict(4, 6));

        let taken = machine.resolve(ConflictChoice::Local).unwrap();
        assert_eq!(taken.local_version, 4);
        assert_eq!(machine.local_version(), 6);
        assert!(machine.pending());
        assert!(machine.resolve(ConflictChoice::Local).is_none());

        machine.begin().unwrap();
        machine.conflict_detected(conflict(6, 8));
        machine.resolve(ConflictChoice::Remote).unwrap();
        assert!(!machine.pending());
        assert_eq!(machine.local_version(), 6);
    }

    #[test]
    fn offline_overrides_in_flight_outcome() {
        let mut machine = StateMachine::new(true, None);
        let ticket = machine.begin().unwrap();
        machine.go_offline();
        machine.push_succeeded(ticket, 2, Utc::now());

        let state = machine.snapshot();
        assert_eq!(state.status, SyncStatus::Offline);
        assert_eq!(state.local_version, 2);
        assert!(!machine.in_flight());
    }

    #[test]
    fn going_online_restores_conflict() {
        let mut machine = StateMachine::new(true, None);
        machine.begin().unwrap();
        machine.go_offline();
        machine.conflict_detected(conflict(1, 2));
        assert_eq!(machine.status(), SyncStatus::Offline);

        machine.go_online();
        assert_eq!(machine.status(), SyncStatus::Conflict);
    }

    #[test]
    fn going_online_while_in_flight_is_syncing() {
        let mut machine = StateMachine::new(false, None);
        machine.begin().unwrap();
        assert_eq!(machine.status(), SyncStatus::Offline);
        machine.go_online();
        assert_eq!(machine.status(), SyncStatus::Syncing);
    }
}
