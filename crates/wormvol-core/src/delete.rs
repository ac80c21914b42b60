//! Destroying volumes whose retention has ended.
//!
//! The file's access time is checked again right before anything is removed:
//! whatever the catalog says, a file still locked by the filesystem is left
//! alone. The catalog record goes first, so an interruption between the two
//! steps leaves an orphaned file rather than a catalog entry without data.

use std::time::SystemTime;

use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::CatalogClient;
use crate::console::ConsoleGateway;
use crate::error::Result;
use crate::store::VolumeStore;
use crate::volume::VolumeRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// Catalog record and file removed.
    Deleted,
    /// No file existed; only the catalog record was removed.
    CatalogOnly,
    /// Catalog record removed but the file could not be unlinked.
    Orphaned,
    /// The file is still locked; nothing was touched.
    Protected { locked_until: i64 },
}

/// Delete one volume selected for deletion.
///
/// `now` is compared against the file's access time at whole-second
/// resolution. A catalog rejection is returned as `Err` and leaves the file
/// in place.
pub fn delete_volume<G, S>(
    catalog: &CatalogClient<G>,
    store: &S,
    record: &VolumeRecord,
    now: SystemTime,
) -> Result<DeleteOutcome>
where
    G: ConsoleGateway,
    S: VolumeStore,
{
    let volume = record.volume_name();
    let probe = store.probe(volume)?;

    if !probe.exists {
        catalog.delete_volume(volume)?;
        info!(volume, "Deleted catalog record; volume had no file");
        return Ok(DeleteOutcome::CatalogOnly);
    }

    if let Some(locked_until) = probe.locked_until(now) {
        warn!(
            volume,
            status = %record.vol_status(),
            locked_until,
            "Volume is still WORM protected; not deleting"
        );
        return Ok(DeleteOutcome::Protected { locked_until });
    }

    info!(volume, status = %record.vol_status(), "Destroying volume");
    catalog.delete_volume(volume)?;

    match store.remove(volume) {
        Ok(()) => Ok(DeleteOutcome::Deleted),
        Err(e) => {
            warn!(volume, error = %e, "Catalog record deleted but file removal failed");
            Ok(DeleteOutcome::Orphaned)
        }
    }
}
