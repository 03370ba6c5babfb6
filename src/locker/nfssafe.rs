/*
 * mailbox - NFS-safe locker.
 *
 * Copyright 2024 Manos Pitsidianakis
 *
 * This file is part of mailbox.
 *
 * mailbox is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * mailbox is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with mailbox. If not, see <http://www.gnu.org/licenses/>.
 */

//! Hard-link based dot-lock safe on NFS, where `O_EXCL` create is not
//! reliably atomic: write a unique temp file, `link()` it to the lock
//! path, then check the temp file's link count reached 2.

use crate::error::{Error, ErrorKind, Result};
use crate::locker::{LockTiming, Locker, POLL_INTERVAL};
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};
use uuid::Uuid;

#[derive(Debug)]
pub struct NfsSafeLock {
    path: PathBuf,
    lock_path: PathBuf,
    timing: LockTiming,
    held: bool,
}

impl NfsSafeLock {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_timing(path, LockTiming::default())
    }

    pub fn with_timing(path: impl AsRef<Path>, timing: LockTiming) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");
        NfsSafeLock {
            path,
            lock_path: PathBuf::from(lock_path),
            timing,
            held: false,
        }
    }

    fn break_if_stale(&self) {
        if let Ok(meta) = fs::metadata(&self.lock_path) {
            if let Ok(modified) = meta.modified() {
                if SystemTime::now()
                    .duration_since(modified)
                    .map(|age| age > self.timing.stale_after)
                    .unwrap_or(false)
                {
                    let _ = fs::remove_file(&self.lock_path);
                }
            }
        }
    }

    fn try_once(&self) -> Result<bool> {
        let unique = self.path.with_extension(format!("lock.{}", Uuid::new_v4()));
        fs::write(&unique, std::process::id().to_string())?;
        let link_result = fs::hard_link(&unique, &self.lock_path);
        let acquired = match link_result {
            Ok(()) => fs::metadata(&unique).map(|m| m.nlink() == 2).unwrap_or(false),
            Err(_) => false,
        };
        let _ = fs::remove_file(&unique);
        Ok(acquired)
    }
}

impl Locker for NfsSafeLock {
    fn lock(&mut self) -> Result<()> {
        let start = Instant::now();
        loop {
            if self.try_once()? {
                self.held = true;
                return Ok(());
            }
            self.break_if_stale();
            if start.elapsed() >= self.timing.timeout {
                return Err(Error::new(
                    ErrorKind::LockTimeout,
                    format!("timed out locking {}", self.path.display()),
                ));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn unlock(&mut self) -> Result<()> {
        if self.held {
            fs::remove_file(&self.lock_path)?;
            self.held = false;
        }
        Ok(())
    }

    fn has_lock(&self) -> bool {
        self.held
    }

    fn is_locked(&self) -> bool {
        self.lock_path.exists()
    }

    fn filename(&self) -> &Path {
        &self.path
    }

    fn name(&self) -> &str {
        "nfssafe"
    }
}

impl Drop for NfsSafeLock {
    fn drop(&mut self) {
        let _ = self.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquires_via_hardlink_and_releases() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("box");
        fs::write(&target, b"").unwrap();
        let mut lock = NfsSafeLock::new(&target);
        lock.lock().unwrap();
        assert!(lock.is_locked());
        lock.unlock().unwrap();
        assert!(!lock.is_locked());
    }
}
