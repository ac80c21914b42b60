//! Typed volume records and protection deadline arithmetic.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Local, LocalResult, NaiveDateTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ParseError, VolumeError};
use crate::listing::{MEDIA_DESIGNATOR, RawRecord};
use crate::value::{Value, ValueCoercer};

pub const KEY_VOLUME_NAME: &str = "volumename";
pub const KEY_VOL_STATUS: &str = "volstatus";
pub const KEY_LAST_WRITTEN: &str = "lastwritten";
pub const KEY_VOL_RETENTION: &str = "volretention";

/// Catalog volume status.
///
/// Only Used, Read-Only, Error and Purged drive lifecycle decisions; the
/// other known statuses and anything unrecognized are inert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VolStatus {
    Append,
    Full,
    Used,
    ReadOnly,
    Error,
    Purged,
    Recycle,
    Archive,
    Cleaning,
    Disabled,
    Busy,
    Other(String),
}

impl VolStatus {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "Append" => Self::Append,
            "Full" => Self::Full,
            "Used" => Self::Used,
            "Read-Only" => Self::ReadOnly,
            "Error" => Self::Error,
            "Purged" => Self::Purged,
            "Recycle" => Self::Recycle,
            "Archive" => Self::Archive,
            "Cleaning" => Self::Cleaning,
            "Disabled" => Self::Disabled,
            "Busy" => Self::Busy,
            other => Self::Other(other.to_string()),
        }
    }

    /// Catalog spelling of the status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Append => "Append",
            Self::Full => "Full",
            Self::Used => "Used",
            Self::ReadOnly => "Read-Only",
            Self::Error => "Error",
            Self::Purged => "Purged",
            Self::Recycle => "Recycle",
            Self::Archive => "Archive",
            Self::Cleaning => "Cleaning",
            Self::Disabled => "Disabled",
            Self::Busy => "Busy",
            Self::Other(s) => s,
        }
    }

    /// Statuses under which the catalog will not write the volume again.
    #[must_use]
    pub fn is_write_closed(&self) -> bool {
        matches!(self, Self::Used | Self::ReadOnly | Self::Error)
    }
}

impl fmt::Display for VolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time zone the catalog's wall-clock timestamps are expressed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogTimeZone {
    /// The host's local time zone, as the director normally reports.
    #[default]
    Local,
    Utc,
}

impl CatalogTimeZone {
    /// Current wall-clock time in this zone.
    #[must_use]
    pub fn now(self) -> NaiveDateTime {
        match self {
            Self::Local => Local::now().naive_local(),
            Self::Utc => Utc::now().naive_utc(),
        }
    }

    /// Seconds since the Unix epoch for a wall-clock time in this zone.
    ///
    /// Ambiguous local times (clocks turned back) resolve to the later
    /// instant. Returns `None` for local times skipped by a DST jump.
    #[must_use]
    pub fn epoch_seconds(self, wall: NaiveDateTime) -> Option<i64> {
        match self {
            Self::Utc => Some(wall.and_utc().timestamp()),
            Self::Local => match Local.from_local_datetime(&wall) {
                LocalResult::Single(t) => Some(t.timestamp()),
                LocalResult::Ambiguous(_, later) => Some(later.timestamp()),
                LocalResult::None => None,
            },
        }
    }
}

impl fmt::Display for CatalogTimeZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Utc => f.write_str("utc"),
        }
    }
}

/// One catalog volume, built fresh from a listing on every run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeRecord {
    pool: String,
    volume_name: String,
    vol_status: VolStatus,
    last_written: Option<NaiveDateTime>,
    vol_retention: Option<u64>,
    attributes: BTreeMap<String, Value>,
}

impl VolumeRecord {
    /// Build a record from parsed listing attributes.
    ///
    /// The volume name is taken verbatim so that numeric-looking names keep
    /// their leading zeros. A last-written or retention value of the wrong
    /// type is rejected: guessing would risk destroying a protected volume.
    pub fn from_raw(
        pool: &str,
        raw: &RawRecord,
        coercer: &ValueCoercer,
    ) -> Result<Self, ParseError> {
        let media_id = raw
            .get(MEDIA_DESIGNATOR)
            .cloned()
            .unwrap_or_else(|| "?".to_string());
        let require = |key: &'static str| {
            raw.get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| ParseError::MissingKey {
                    media_id: media_id.clone(),
                    key,
                })
        };

        let volume_name = require(KEY_VOLUME_NAME)?;
        let vol_status = VolStatus::parse(&require(KEY_VOL_STATUS)?);

        let attributes: BTreeMap<String, Value> = raw
            .iter()
            .map(|(key, value)| (key.clone(), coercer.coerce(value)))
            .collect();

        let invalid = |key: &'static str, value: &Value| ParseError::InvalidValue {
            media_id: media_id.clone(),
            key,
            value: value.to_string(),
        };

        let last_written = match attributes.get(KEY_LAST_WRITTEN) {
            None | Some(Value::Null) => None,
            Some(Value::Timestamp(ts)) => Some(*ts),
            Some(other) => return Err(invalid(KEY_LAST_WRITTEN, other)),
        };

        let vol_retention = match attributes.get(KEY_VOL_RETENTION) {
            None | Some(Value::Null) => None,
            Some(value @ Value::Integer(secs)) => Some(
                u64::try_from(*secs).map_err(|_| invalid(KEY_VOL_RETENTION, value))?,
            ),
            // Directors running without digit grouping print bare digits.
            Some(value @ Value::Text(text)) if is_plain_digits(text) => Some(
                text.parse()
                    .map_err(|_| invalid(KEY_VOL_RETENTION, value))?,
            ),
            Some(other) => return Err(invalid(KEY_VOL_RETENTION, other)),
        };

        Ok(Self {
            pool: pool.to_string(),
            volume_name,
            vol_status,
            last_written,
            vol_retention,
            attributes,
        })
    }

    /// Pool the record was listed from.
    #[must_use]
    pub fn pool(&self) -> &str {
        &self.pool
    }

    #[must_use]
    pub fn volume_name(&self) -> &str {
        &self.volume_name
    }

    #[must_use]
    pub fn vol_status(&self) -> &VolStatus {
        &self.vol_status
    }

    /// `None` when the volume was never written.
    #[must_use]
    pub fn last_written(&self) -> Option<NaiveDateTime> {
        self.last_written
    }

    /// Retention in seconds, counted from the last write.
    #[must_use]
    pub fn vol_retention(&self) -> Option<u64> {
        self.vol_retention
    }

    /// Any attribute by lowercase key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    #[must_use]
    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    /// Wall-clock time at which catalog retention runs out.
    pub fn retention_expiry(&self) -> Result<NaiveDateTime, VolumeError> {
        let last_written = self.last_written.ok_or_else(|| VolumeError::NeverWritten {
            volume: self.volume_name.clone(),
        })?;
        let secs = self
            .vol_retention
            .ok_or_else(|| VolumeError::MissingRetention {
                volume: self.volume_name.clone(),
            })?;
        let overflow = || VolumeError::DeadlineOverflow {
            volume: self.volume_name.clone(),
        };
        let delta = i64::try_from(secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(overflow)?;
        last_written.checked_add_signed(delta).ok_or_else(overflow)
    }

    /// Protection deadline as whole seconds since the Unix epoch.
    ///
    /// This is the value written into the file's access time.
    pub fn protection_deadline(&self, tz: CatalogTimeZone) -> Result<i64, VolumeError> {
        let expiry = self.retention_expiry()?;
        tz.epoch_seconds(expiry)
            .ok_or_else(|| VolumeError::NonexistentLocalTime {
                volume: self.volume_name.clone(),
                timestamp: expiry,
            })
    }
}

fn is_plain_digits(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Build a record the way a listing would, from `(key, raw value)` pairs.
    pub(crate) fn record(pool: &str, pairs: &[(&str, &str)]) -> VolumeRecord {
        let raw: RawRecord = pairs
            .iter()
            .map(|(k, v)| ((*k).to_ascii_lowercase(), (*v).to_string()))
            .collect();
        VolumeRecord::from_raw(pool, &raw, &ValueCoercer::default()).unwrap()
    }

    pub(crate) fn volume(name: &str, status: &str, last_written: &str, retention: &str) -> VolumeRecord {
        record(
            "FullWorm",
            &[
                ("MediaId", "1"),
                ("VolumeName", name),
                ("VolStatus", status),
                ("LastWritten", last_written),
                ("VolRetention", retention),
            ],
        )
    }
}
