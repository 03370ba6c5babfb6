/*
 * mailbox - dot-lock locker.
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

//! Classic `<path>.lock` dot-lock: atomic create, age-based staleness.

use crate::error::{Error, ErrorKind, Result};
use crate::locker::{LockTiming, Locker, POLL_INTERVAL};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};

#[derive(Debug)]
pub struct DotLock {
    path: PathBuf,
    lock_path: PathBuf,
    timing: LockTiming,
    held: bool,
}

impl DotLock {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_timing(path, LockTiming::default())
    }

    pub fn with_timing(path: impl AsRef<Path>, timing: LockTiming) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");
        DotLock {
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
}

impl Locker for DotLock {
    fn lock(&mut self) -> Result<()> {
        let start = Instant::now();
        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.lock_path)
            {
                Ok(_) => {
                    self.held = true;
                    return Ok(());
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    self.break_if_stale();
                    if start.elapsed() >= self.timing.timeout {
                        return Err(Error::new(
                            ErrorKind::LockTimeout,
                            format!("timed out locking {}", self.path.display()),
                        ));
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
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
        "dotlock"
    }
}

impl Drop for DotLock {
    fn drop(&mut self) {
        let _ = self.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn acquires_and_releases() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("box");
        fs::write(&target, b"").unwrap();
        let mut lock = DotLock::new(&target);
        lock.lock().unwrap();
        assert!(lock.has_lock());
        assert!(lock.is_locked());
        lock.unlock().unwrap();
        assert!(!lock.is_locked());
    }

    #[test]
    fn second_locker_times_out_then_breaks_stale_lock() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("box");
        fs::write(&target, b"").unwrap();
        let mut first = DotLock::new(&target);
        first.lock().unwrap();

        let timing = LockTiming {
            timeout: Duration::from_millis(50),
            stale_after: Duration::from_secs(300),
        };
        let mut second = DotLock::with_timing(&target, timing);
        assert!(matches!(
            second.lock(),
            Err(e) if e.kind() == ErrorKind::LockTimeout
        ));
    }
}
