//! Lifecycle decision for one volume.
//!
//! Two independent rules are evaluated against the catalog record and the
//! file probe:
//!
//! - **commit**: the status says the catalog will not write again (Used,
//!   Read-Only, or Error after at least one write) and the file is still
//!   writable.
//! - **delete**: the status is Purged, or Error with either no write at all or
//!   a retention window that has run out. The catalog never purges Error
//!   volumes itself, so their retention is evaluated here.
//!
//! When both match, the volume is an expired Error volume: its deadline is
//! already past, so locking it would protect nothing and delete wins. The
//! deleter re-checks the file's lock before removing anything.

use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::store::FileProbe;
use crate::volume::{VolStatus, VolumeRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    CommitToWorm,
    Delete,
    None,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CommitToWorm => "commit",
            Self::Delete => "delete",
            Self::None => "none",
        })
    }
}

/// Outcome of classifying one volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub action: Action,
    /// Short rule name explaining the action.
    pub reason: &'static str,
    pub warnings: Vec<String>,
}

impl Decision {
    fn new(action: Action, reason: &'static str, warnings: Vec<String>) -> Self {
        Self {
            action,
            reason,
            warnings,
        }
    }
}

/// Decide what to do with a volume.
///
/// `now` is the current wall-clock time in the catalog's time zone. The
/// result depends only on the arguments.
#[must_use]
pub fn classify(record: &VolumeRecord, probe: &FileProbe, now: NaiveDateTime) -> Decision {
    let status = record.vol_status();
    let written = record.last_written().is_some();
    let mut warnings = Vec::new();

    let write_closed = match status {
        VolStatus::Used | VolStatus::ReadOnly => true,
        // Never-written Error volumes stay writable so they can be purged.
        VolStatus::Error => written,
        _ => false,
    };

    let delete_reason = match status {
        VolStatus::Purged => Some("purged"),
        VolStatus::Error if !written => Some("error volume never written"),
        VolStatus::Error => match record.retention_expiry() {
            Ok(expiry) if expiry < now => Some("error volume past retention"),
            Ok(_) => None,
            Err(e) => {
                warnings.push(format!("cannot evaluate retention: {e}"));
                None
            }
        },
        _ => None,
    };

    if let Some(reason) = delete_reason {
        return Decision::new(Action::Delete, reason, warnings);
    }

    if write_closed && !probe.exists {
        warnings.push(format!("{status} volume has no file on the device"));
        return Decision::new(Action::None, "file missing", warnings);
    }

    if write_closed && probe.writable {
        if let Err(e) = record.retention_expiry() {
            if warnings.is_empty() {
                warnings.push(format!("not committing: {e}"));
            }
            return Decision::new(Action::None, "no deadline", warnings);
        }
        return Decision::new(Action::CommitToWorm, "write-closed and writable", warnings);
    }

    let reason = if write_closed {
        "already committed"
    } else {
        "no rule applies"
    };
    Decision::new(Action::None, reason, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::test_support::volume;
    use chrono::NaiveDate;
    use std::time::{Duration, UNIX_EPOCH};

    const NEVER: &str = "0000-00-00 00:00:00";
    const THIRTY_DAYS: &str = "2,592,000";

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn file(writable: bool) -> FileProbe {
        FileProbe {
            exists: true,
            writable,
            accessed: Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000)),
            modified: Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000)),
        }
    }

    #[test]
    fn used_writable_commits() {
        let vol = volume("v", "Used", "2024-05-01 00:00:00", THIRTY_DAYS);
        assert_eq!(classify(&vol, &file(true), now()).action, Action::CommitToWorm);
    }

    #[test]
    fn used_read_only_file_does_nothing() {
        let vol = volume("v", "Used", "2024-05-01 00:00:00", THIRTY_DAYS);
        let decision = classify(&vol, &file(false), now());
        assert_eq!(decision.action, Action::None);
        assert!(decision.warnings.is_empty());
    }

    #[test]
    fn read_only_status_commits() {
        let vol = volume("v", "Read-Only", "2024-05-01 00:00:00", THIRTY_DAYS);
        assert_eq!(classify(&vol, &file(true), now()).action, Action::CommitToWorm);
    }

    #[test]
    fn error_never_written_deletes() {
        let vol = volume("v", "Error", NEVER, THIRTY_DAYS);
        for writable in [true, false] {
            let decision = classify(&vol, &file(writable), now());
            assert_eq!(decision.action, Action::Delete);
            assert_eq!(decision.reason, "error volume never written");
        }
    }

    #[test]
    fn error_within_retention_commits() {
        let vol = volume("v", "Error", "2024-05-20 00:00:00", THIRTY_DAYS);
        assert_eq!(classify(&vol, &file(true), now()).action, Action::CommitToWorm);
        assert_eq!(classify(&vol, &file(false), now()).action, Action::None);
    }

    #[test]
    fn error_past_retention_deletes_even_when_writable() {
        let vol = volume("v", "Error", "2024-01-01 00:00:00", THIRTY_DAYS);
        let decision = classify(&vol, &file(true), now());
        assert_eq!(decision.action, Action::Delete);
        assert_eq!(decision.reason, "error volume past retention");
    }

    #[test]
    fn purged_always_deletes() {
        for (last, retention) in [(NEVER, THIRTY_DAYS), ("2024-05-31 00:00:00", "31,536,000")] {
            let vol = volume("v", "Purged", last, retention);
            assert_eq!(classify(&vol, &file(true), now()).action, Action::Delete);
            assert_eq!(
                classify(&vol, &FileProbe::missing(), now()).action,
                Action::Delete
            );
        }
    }

    #[test]
    fn inert_statuses_do_nothing() {
        for status in ["Append", "Full", "Recycle", "Archive", "Something-New"] {
            let vol = volume("v", status, "2020-01-01 00:00:00", THIRTY_DAYS);
            let decision = classify(&vol, &file(true), now());
            assert_eq!(decision.action, Action::None, "{status}");
            assert!(decision.warnings.is_empty());
        }
    }

    #[test]
    fn used_never_written_is_flagged_not_committed() {
        let vol = volume("v", "Used", NEVER, THIRTY_DAYS);
        let decision = classify(&vol, &file(true), now());
        assert_eq!(decision.action, Action::None);
        assert_eq!(decision.reason, "no deadline");
        assert_eq!(decision.warnings.len(), 1);
        assert!(decision.warnings[0].contains("never written"));
    }

    #[test]
    fn commit_candidate_without_file_warns() {
        let vol = volume("v", "Used", "2024-05-01 00:00:00", THIRTY_DAYS);
        let decision = classify(&vol, &FileProbe::missing(), now());
        assert_eq!(decision.action, Action::None);
        assert_eq!(decision.warnings.len(), 1);
    }

    #[test]
    fn expiry_boundary_is_strict() {
        // lastwritten + 30 days == now: not yet past retention.
        let vol = volume("v", "Error", "2024-05-02 12:00:00", THIRTY_DAYS);
        assert_eq!(classify(&vol, &file(false), now()).action, Action::None);
    }

    #[test]
    fn classification_is_repeatable() {
        let vol = volume("v", "Error", "2024-01-01 00:00:00", THIRTY_DAYS);
        let probe = file(true);
        assert_eq!(classify(&vol, &probe, now()), classify(&vol, &probe, now()));
    }
}
