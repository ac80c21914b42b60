//! Committing a volume to WORM protection.
//!
//! Order of operations:
//!
//! 1. Make sure the catalog will never write the volume again (mark it Used
//!    unless its status already guarantees that). A rejected update aborts the
//!    commit for this volume.
//! 2. Compute the protection deadline from `lastwritten + volretention`.
//! 3. Move the file's access time to the deadline, keeping its modification
//!    time, then drop write permission. Dropping write permission is what
//!    makes the filesystem enforce the lock. An access time already further
//!    in the future than both `now` and the deadline is kept.
//!
//! Step 3 failing is not an error: the file stays writable, so the volume is
//! classified for commit again on the next run.

use std::time::SystemTime;

use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::CatalogClient;
use crate::console::ConsoleGateway;
use crate::error::{Result, StoreError};
use crate::store::{WORM_MODE, VolumeStore, epoch_to_system_time};
use crate::volume::{CatalogTimeZone, VolStatus, VolumeRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitOutcome {
    /// File locked until `locked_until` (epoch seconds).
    Committed { locked_until: i64 },
    /// Filesystem update failed; retried next run.
    Deferred,
}

/// Commit one volume selected for WORM protection.
///
/// Returns `Err` only for catalog rejections and records with no computable
/// deadline. Filesystem failures are logged and reported as
/// [`CommitOutcome::Deferred`].
pub fn commit_volume<G, S>(
    catalog: &CatalogClient<G>,
    store: &S,
    record: &VolumeRecord,
    tz: CatalogTimeZone,
    now: SystemTime,
) -> Result<CommitOutcome>
where
    G: ConsoleGateway,
    S: VolumeStore,
{
    let volume = record.volume_name();

    if !record.vol_status().is_write_closed() {
        catalog.update_status(volume, &VolStatus::Used)?;
        info!(volume, from = %record.vol_status(), "Marked volume Used in the catalog");
    }

    let deadline = record.protection_deadline(tz)?;

    match lock_file(store, volume, deadline, now) {
        Ok(locked_until) => {
            info!(volume, locked_until, "Volume committed to WORM");
            Ok(CommitOutcome::Committed { locked_until })
        }
        Err(e) => {
            warn!(volume, error = %e, "WORM commit failed; will retry next run");
            Ok(CommitOutcome::Deferred)
        }
    }
}

fn lock_file<S: VolumeStore>(
    store: &S,
    volume: &str,
    deadline: i64,
    now: SystemTime,
) -> std::result::Result<i64, StoreError> {
    let probe = store.probe(volume)?;
    if !probe.exists {
        return Err(StoreError::Unavailable {
            volume: volume.to_string(),
            what: "file",
        });
    }
    let modified = probe.modified.ok_or_else(|| StoreError::Unavailable {
        volume: volume.to_string(),
        what: "modification time",
    })?;

    // A past access time is only the last read; a future one is a live lock.
    let locked_until = probe
        .locked_until(now)
        .filter(|&current| current > deadline)
        .unwrap_or(deadline);

    store.set_times(volume, epoch_to_system_time(locked_until), modified)?;
    store.set_mode(volume, WORM_MODE)?;
    Ok(locked_until)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::ConsoleOutput;
    use crate::console::test_support::ScriptedConsole;
    use crate::error::{ConsoleError, Error, VolumeError};
    use crate::store::test_support::MemoryStore;
    use crate::value::ValueCoercer;
    use crate::volume::test_support::volume;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    // 2024-01-01 00:00:00 + 30 days, UTC.
    const DEADLINE: i64 = 1_706_659_200;

    /// Ten days before the deadline.
    fn now() -> SystemTime {
        epoch_to_system_time(DEADLINE - 10 * 86_400)
    }

    fn old_atime() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    fn catalog(console: &ScriptedConsole) -> CatalogClient<&ScriptedConsole> {
        CatalogClient::new(console, ValueCoercer::default())
    }

    #[test]
    fn used_volume_is_locked_without_catalog_update() {
        let console = ScriptedConsole::new();
        let store = MemoryStore::new().with_file("Full-0001", true, old_atime());
        let vol = volume("Full-0001", "Used", "2024-01-01 00:00:00", "2,592,000");

        let outcome = commit_volume(&catalog(&console), &store, &vol, CatalogTimeZone::Utc, now()).unwrap();

        assert_eq!(outcome, CommitOutcome::Committed { locked_until: DEADLINE });
        assert!(console.commands().is_empty());
        let file = store.file("Full-0001").unwrap();
        assert_eq!(file.accessed, epoch_to_system_time(DEADLINE));
        assert_eq!(file.modified, UNIX_EPOCH + Duration::from_secs(1_700_000_000));
        assert_eq!(file.mode, WORM_MODE);
        assert!(!file.writable);
    }

    #[test]
    fn other_status_is_marked_used_first() {
        let console = ScriptedConsole::new().expect(
            "update volume=v VolStatus=Used",
            ConsoleOutput::ok("New Volume status is: Used\n"),
        );
        let store = MemoryStore::new().with_file("v", true, old_atime());
        let vol = volume("v", "Full", "2024-01-01 00:00:00", "2,592,000");

        commit_volume(&catalog(&console), &store, &vol, CatalogTimeZone::Utc, now()).unwrap();
        assert_eq!(console.commands(), vec!["update volume=v VolStatus=Used"]);
        assert_eq!(store.file("v").unwrap().mode, WORM_MODE);
    }

    #[test]
    fn rejected_status_update_leaves_file_alone() {
        let console = ScriptedConsole::new().expect(
            "update volume=v VolStatus=Used",
            ConsoleOutput::ok("Volume not found\n"),
        );
        let store = MemoryStore::new().with_file("v", true, old_atime());
        let vol = volume("v", "Append", "2024-01-01 00:00:00", "2,592,000");

        let err = commit_volume(&catalog(&console), &store, &vol, CatalogTimeZone::Utc, now()).unwrap_err();
        assert!(matches!(err, Error::Console(ConsoleError::Unexpected { .. })));
        let file = store.file("v").unwrap();
        assert!(file.writable);
        assert_eq!(file.accessed, old_atime());
    }

    #[test]
    fn later_existing_lock_is_kept() {
        let later = epoch_to_system_time(DEADLINE + 86_400);
        let store = MemoryStore::new().with_file("v", true, later);
        let vol = volume("v", "Read-Only", "2024-01-01 00:00:00", "2,592,000");

        let outcome =
            commit_volume(&catalog(&ScriptedConsole::new()), &store, &vol, CatalogTimeZone::Utc, now())
                .unwrap();
        assert_eq!(
            outcome,
            CommitOutcome::Committed {
                locked_until: DEADLINE + 86_400
            }
        );
        assert_eq!(store.file("v").unwrap().accessed, later);
    }

    #[test]
    fn past_access_time_is_replaced_by_deadline() {
        let last_read = epoch_to_system_time(1_710_000_000);
        let store = MemoryStore::new().with_file("v", true, last_read);
        let vol = volume("v", "Used", "2024-01-01 00:00:00", "2,592,000");
        let later_now = epoch_to_system_time(1_715_000_000);

        let outcome = commit_volume(
            &catalog(&ScriptedConsole::new()),
            &store,
            &vol,
            CatalogTimeZone::Utc,
            later_now,
        )
        .unwrap();

        assert_eq!(outcome, CommitOutcome::Committed { locked_until: DEADLINE });
        assert_eq!(store.file("v").unwrap().accessed, epoch_to_system_time(DEADLINE));
    }

    #[test]
    fn future_access_time_before_deadline_is_extended() {
        let soon = epoch_to_system_time(DEADLINE - 86_400);
        let store = MemoryStore::new().with_file("v", true, soon);
        let vol = volume("v", "Used", "2024-01-01 00:00:00", "2,592,000");

        let outcome =
            commit_volume(&catalog(&ScriptedConsole::new()), &store, &vol, CatalogTimeZone::Utc, now())
                .unwrap();
        assert_eq!(outcome, CommitOutcome::Committed { locked_until: DEADLINE });
    }

    #[test]
    fn filesystem_failure_defers() {
        let store = MemoryStore {
            fail_set_times: true,
            ..MemoryStore::new()
        }
        .with_file("v", true, old_atime());
        let vol = volume("v", "Used", "2024-01-01 00:00:00", "2,592,000");

        let outcome =
            commit_volume(&catalog(&ScriptedConsole::new()), &store, &vol, CatalogTimeZone::Utc, now())
                .unwrap();
        assert_eq!(outcome, CommitOutcome::Deferred);
        assert!(store.file("v").unwrap().writable);
    }

    #[test]
    fn vanished_file_defers() {
        let vol = volume("gone", "Used", "2024-01-01 00:00:00", "2,592,000");
        let outcome = commit_volume(
            &catalog(&ScriptedConsole::new()),
            &MemoryStore::new(),
            &vol,
            CatalogTimeZone::Utc,
            now(),
        )
        .unwrap();
        assert_eq!(outcome, CommitOutcome::Deferred);
    }

    #[test]
    fn never_written_volume_is_an_error() {
        let store = MemoryStore::new().with_file("v", true, old_atime());
        let vol = volume("v", "Used", "0000-00-00 00:00:00", "2,592,000");

        let err = commit_volume(&catalog(&ScriptedConsole::new()), &store, &vol, CatalogTimeZone::Utc, now())
            .unwrap_err();
        assert!(matches!(err, Error::Volume(VolumeError::NeverWritten { .. })));
        assert!(store.file("v").unwrap().writable);
    }
}
