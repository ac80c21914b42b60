//! One reconciliation pass over the WORM retention pools.
//!
//! A pass has two phases:
//!
//! 1. **Plan**: list every pool, probe every volume file and classify. Any
//!    listing failure aborts the whole pass before anything is touched,
//!    since a partial or garbled catalog view cannot be trusted.
//! 2. **Execute**: commit or delete volume by volume. Failures are recorded
//!    per volume and never stop the remaining volumes.
//!
//! Nothing is cached between passes; re-running on a settled device is a
//! no-op.

use std::time::SystemTime;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::catalog::CatalogClient;
use crate::classify::{Action, Decision, classify};
use crate::commit::{CommitOutcome, commit_volume};
use crate::console::ConsoleGateway;
use crate::delete::{DeleteOutcome, delete_volume};
use crate::error::Result;
use crate::store::{FileProbe, VolumeStore};
use crate::volume::{CatalogTimeZone, VolumeRecord};

/// Pools holding volumes on the WORM device.
pub const WORM_POOLS: [&str; 3] = ["FullWorm", "DiffWorm", "IncrWorm"];

/// One volume and what the pass intends to do with it.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedVolume {
    pub pool: String,
    pub volume: String,
    pub status: String,
    #[serde(flatten)]
    pub decision: Decision,
    #[serde(skip)]
    pub record: VolumeRecord,
    #[serde(skip)]
    pub probe: FileProbe,
}

/// Classified view of every volume in the configured pools.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcilePlan {
    /// Wall-clock time, in the catalog zone, the plan was computed against.
    pub now: NaiveDateTime,
    pub volumes: Vec<PlannedVolume>,
}

impl ReconcilePlan {
    /// Number of volumes planned for `action`.
    #[must_use]
    pub fn count(&self, action: Action) -> usize {
        self.volumes
            .iter()
            .filter(|v| v.decision.action == action)
            .count()
    }

    /// Total warnings raised during classification.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.volumes.iter().map(|v| v.decision.warnings.len()).sum()
    }
}

/// A volume whose action failed.
#[derive(Debug, Clone, Serialize)]
pub struct VolumeFailure {
    pub pool: String,
    pub volume: String,
    pub action: Action,
    pub error: String,
}

/// Counts for one pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    /// True when no action was taken.
    pub dry_run: bool,
    pub examined: usize,
    pub commit_candidates: usize,
    pub delete_candidates: usize,
    pub warnings: usize,
    pub committed: usize,
    /// Commits whose filesystem step failed; retried next pass.
    pub commit_deferred: usize,
    pub deleted: usize,
    /// Catalog records removed for volumes with no file.
    pub catalog_only: usize,
    /// Catalog records removed but files left behind.
    pub orphaned: usize,
    /// Delete candidates still locked by the filesystem.
    pub protected: usize,
    pub errors: Vec<VolumeFailure>,
}

impl ReconcileReport {
    fn from_plan(plan: &ReconcilePlan, dry_run: bool) -> Self {
        Self {
            dry_run,
            examined: plan.volumes.len(),
            commit_candidates: plan.count(Action::CommitToWorm),
            delete_candidates: plan.count(Action::Delete),
            warnings: plan.warning_count(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Drives plan and execute over a catalog and a volume store.
#[derive(Debug)]
pub struct Reconciler<G, S> {
    catalog: CatalogClient<G>,
    store: S,
    tz: CatalogTimeZone,
    pools: Vec<String>,
}

impl<G: ConsoleGateway, S: VolumeStore> Reconciler<G, S> {
    pub fn new(catalog: CatalogClient<G>, store: S, tz: CatalogTimeZone) -> Self {
        Self {
            catalog,
            store,
            tz,
            pools: WORM_POOLS.iter().map(ToString::to_string).collect(),
        }
    }

    /// Replace the pools to reconcile.
    #[cfg(test)]
    #[must_use]
    pub(crate) fn with_pools<I, P>(mut self, pools: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.pools = pools.into_iter().map(Into::into).collect();
        self
    }

    /// List every pool. Fails on the first listing error.
    pub fn fetch(&self) -> Result<Vec<VolumeRecord>> {
        let mut records = Vec::new();
        for pool in &self.pools {
            let listed = self.catalog.list_media(pool)?;
            info!(pool = %pool, volumes = listed.len(), "Listed pool");
            records.extend(listed);
        }
        Ok(records)
    }

    /// Fetch, probe and classify without changing anything.
    pub fn plan(&self) -> Result<ReconcilePlan> {
        let records = self.fetch()?;
        let now = self.tz.now();

        let volumes = records
            .into_iter()
            .map(|record| self.plan_volume(record, now))
            .collect();

        Ok(ReconcilePlan { now, volumes })
    }

    fn plan_volume(&self, record: VolumeRecord, now: NaiveDateTime) -> PlannedVolume {
        let (probe, decision) = match self.store.probe(record.volume_name()) {
            Ok(probe) => (probe, classify(&record, &probe, now)),
            Err(e) => (
                FileProbe::missing(),
                Decision {
                    action: Action::None,
                    reason: "probe failed",
                    warnings: vec![format!("cannot inspect volume file: {e}")],
                },
            ),
        };

        for warning in &decision.warnings {
            warn!(
                pool = record.pool(),
                volume = record.volume_name(),
                status = %record.vol_status(),
                "{warning}"
            );
        }

        PlannedVolume {
            pool: record.pool().to_string(),
            volume: record.volume_name().to_string(),
            status: record.vol_status().to_string(),
            decision,
            record,
            probe,
        }
    }

    /// Carry out a plan, isolating failures per volume.
    pub fn execute(&self, plan: &ReconcilePlan) -> ReconcileReport {
        let mut report = ReconcileReport::from_plan(plan, false);
        let now = SystemTime::now();

        for planned in &plan.volumes {
            let action = planned.decision.action;
            let result = match action {
                Action::CommitToWorm => {
                    info!(
                        pool = %planned.pool,
                        volume = %planned.volume,
                        status = %planned.status,
                        "Committing volume to WORM"
                    );
                    commit_volume(&self.catalog, &self.store, &planned.record, self.tz, now).map(
                        |outcome| match outcome {
                            CommitOutcome::Committed { .. } => report.committed += 1,
                            CommitOutcome::Deferred => report.commit_deferred += 1,
                        },
                    )
                }
                Action::Delete => {
                    delete_volume(&self.catalog, &self.store, &planned.record, now).map(
                        |outcome| match outcome {
                            DeleteOutcome::Deleted => report.deleted += 1,
                            DeleteOutcome::CatalogOnly => report.catalog_only += 1,
                            DeleteOutcome::Orphaned => report.orphaned += 1,
                            DeleteOutcome::Protected { .. } => report.protected += 1,
                        },
                    )
                }
                Action::None => Ok(()),
            };

            if let Err(e) = result {
                error!(
                    pool = %planned.pool,
                    volume = %planned.volume,
                    action = %action,
                    error = %e,
                    "Volume action failed"
                );
                report.errors.push(VolumeFailure {
                    pool: planned.pool.clone(),
                    volume: planned.volume.clone(),
                    action,
                    error: e.to_string(),
                });
            }
        }

        info!(
            examined = report.examined,
            committed = report.committed,
            deleted = report.deleted + report.catalog_only + report.orphaned,
            protected = report.protected,
            failed = report.errors.len(),
            "Reconcile pass finished"
        );
        report
    }

    /// Plan, then execute unless `dry_run`.
    pub fn run(&self, dry_run: bool) -> Result<ReconcileReport> {
        let plan = self.plan()?;
        if dry_run {
            return Ok(ReconcileReport::from_plan(&plan, true));
        }
        Ok(self.execute(&plan))
    }
}
