/*
 * mailbox - flock locker.
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

//! BSD `flock(2)` whole-file lock, via `nix`.

use crate::error::{Error, ErrorKind, Result};
use crate::locker::{LockTiming, Locker, POLL_INTERVAL};
use nix::fcntl::{flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Debug)]
pub struct FlockLock {
    path: PathBuf,
    timing: LockTiming,
    file: Option<File>,
    held: bool,
}

impl FlockLock {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_timing(path, LockTiming::default())
    }

    pub fn with_timing(path: impl AsRef<Path>, timing: LockTiming) -> Self {
        FlockLock {
            path: path.as_ref().to_path_buf(),
            timing,
            file: None,
            held: false,
        }
    }
}

impl Locker for FlockLock {
    fn lock(&mut self) -> Result<()> {
        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        let start = Instant::now();
        loop {
            match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
                Ok(()) => {
                    self.file = Some(file);
                    self.held = true;
                    return Ok(());
                }
                Err(_) => {
                    if start.elapsed() >= self.timing.timeout {
                        return Err(Error::new(
                            ErrorKind::LockTimeout,
                            format!("timed out flock-locking {}", self.path.display()),
                        ));
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
            }
        }
    }

    fn unlock(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            let _ = flock(file.as_raw_fd(), FlockArg::Unlock);
            self.held = false;
        }
        Ok(())
    }

    fn has_lock(&self) -> bool {
        self.held
    }

    fn is_locked(&self) -> bool {
        self.held
    }

    fn filename(&self) -> &Path {
        &self.path
    }

    fn name(&self) -> &str {
        "flock"
    }
}

impl Drop for FlockLock {
    fn drop(&mut self) {
        let _ = self.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn acquires_and_releases() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("box");
        fs::write(&target, b"").unwrap();
        let mut lock = FlockLock::new(&target);
        lock.lock().unwrap();
        assert!(lock.has_lock());
        lock.unlock().unwrap();
        assert!(!lock.has_lock());
    }
}
