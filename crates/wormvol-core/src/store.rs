//! Volume files on the WORM device.
//!
//! The compliance filesystem treats a future access time as a retention
//! lock: until that moment passes the file cannot be modified or removed.
//! [`VolumeStore`] exposes exactly the operations the lifecycle needs, so the
//! decision logic can be exercised against an in-memory store.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use filetime::FileTime;
use nix::unistd::{AccessFlags, access};
use serde::Serialize;

use crate::error::StoreError;

/// Mode applied when a volume is committed: owner and group read-only.
pub const WORM_MODE: u32 = 0o440;

/// Filesystem state of one volume file at the moment it was probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileProbe {
    pub exists: bool,
    /// Write access for the running account.
    pub writable: bool,
    pub accessed: Option<SystemTime>,
    pub modified: Option<SystemTime>,
}

impl FileProbe {
    #[must_use]
    pub fn missing() -> Self {
        Self {
            exists: false,
            writable: false,
            accessed: None,
            modified: None,
        }
    }

    /// Access time in epoch seconds when it still lies in the future at
    /// `now`, compared at whole-second resolution.
    #[must_use]
    pub fn locked_until(&self, now: SystemTime) -> Option<i64> {
        if !self.exists {
            return None;
        }
        let now_secs = system_time_to_epoch(now);
        self.accessed
            .map(system_time_to_epoch)
            .filter(|&atime| atime > now_secs)
    }
}

/// Convert whole epoch seconds to a `SystemTime`.
#[must_use]
pub fn epoch_to_system_time(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

/// Whole epoch seconds for a `SystemTime`, truncated toward the past.
#[must_use]
pub fn system_time_to_epoch(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_secs() as i64,
        Err(e) => {
            let before = e.duration();
            let secs = before.as_secs() as i64;
            if before.subsec_nanos() > 0 {
                -secs - 1
            } else {
                -secs
            }
        }
    }
}

/// File operations on volume files, addressed by volume name.
pub trait VolumeStore {
    fn probe(&self, volume: &str) -> Result<FileProbe, StoreError>;

    /// Set access and modification times together.
    fn set_times(
        &self,
        volume: &str,
        accessed: SystemTime,
        modified: SystemTime,
    ) -> Result<(), StoreError>;

    fn set_mode(&self, volume: &str, mode: u32) -> Result<(), StoreError>;

    fn remove(&self, volume: &str) -> Result<(), StoreError>;
}

impl<S: VolumeStore + ?Sized> VolumeStore for &S {
    fn probe(&self, volume: &str) -> Result<FileProbe, StoreError> {
        (**self).probe(volume)
    }

    fn set_times(
        &self,
        volume: &str,
        accessed: SystemTime,
        modified: SystemTime,
    ) -> Result<(), StoreError> {
        (**self).set_times(volume, accessed, modified)
    }

    fn set_mode(&self, volume: &str, mode: u32) -> Result<(), StoreError> {
        (**self).set_mode(volume, mode)
    }

    fn remove(&self, volume: &str) -> Result<(), StoreError> {
        (**self).remove(volume)
    }
}

/// Volume files stored directly under a device root directory.
#[derive(Debug, Clone)]
pub struct LocalVolumeStore {
    root: OsString,
}

impl LocalVolumeStore {
    /// `root` is joined to volume names by plain concatenation, so it must
    /// end with a path separator (checked by config validation).
    pub fn new(root: impl Into<OsString>) -> Self {
        Self { root: root.into() }
    }

    /// Full path of a volume's file.
    pub fn path_for(&self, volume: &str) -> Result<PathBuf, StoreError> {
        if !is_plain_file_name(volume) {
            return Err(StoreError::InvalidName {
                name: volume.to_string(),
            });
        }
        let mut path = self.root.clone();
        path.push(volume);
        Ok(PathBuf::from(path))
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\0'])
}

fn io_error<'a>(op: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> StoreError + 'a {
    move |source| StoreError::Io {
        op,
        path: path.to_path_buf(),
        source,
    }
}

impl VolumeStore for LocalVolumeStore {
    fn probe(&self, volume: &str) -> Result<FileProbe, StoreError> {
        let path = self.path_for(volume)?;
        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(FileProbe::missing()),
            Err(e) => return Err(io_error("stat", &path)(e)),
        };

        Ok(FileProbe {
            exists: true,
            writable: access(path.as_path(), AccessFlags::W_OK).is_ok(),
            accessed: meta.accessed().ok(),
            modified: meta.modified().ok(),
        })
    }

    fn set_times(
        &self,
        volume: &str,
        accessed: SystemTime,
        modified: SystemTime,
    ) -> Result<(), StoreError> {
        let path = self.path_for(volume)?;
        filetime::set_file_times(
            &path,
            FileTime::from_system_time(accessed),
            FileTime::from_system_time(modified),
        )
        .map_err(io_error("utime", &path))
    }

    fn set_mode(&self, volume: &str, mode: u32) -> Result<(), StoreError> {
        let path = self.path_for(volume)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(mode))
            .map_err(io_error("chmod", &path))
    }

    fn remove(&self, volume: &str) -> Result<(), StoreError> {
        let path = self.path_for(volume)?;
        fs::remove_file(&path).map_err(io_error("unlink", &path))
    }
}
