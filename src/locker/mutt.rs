/*
 * mailbox - mutt_dotlock locker.
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

//! Delegates locking to the external `mutt_dotlock` helper, for
//! interoperability with mailboxes also touched by mutt itself.

use crate::error::{Error, ErrorKind, Result};
use crate::locker::{LockTiming, Locker};
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug)]
pub struct MuttDotlock {
    path: PathBuf,
    binary: PathBuf,
    timing: LockTiming,
    held: bool,
}

impl MuttDotlock {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_binary(path, "mutt_dotlock")
    }

    pub fn with_binary(path: impl AsRef<Path>, binary: impl AsRef<Path>) -> Self {
        MuttDotlock {
            path: path.as_ref().to_path_buf(),
            binary: binary.as_ref().to_path_buf(),
            timing: LockTiming::default(),
            held: false,
        }
    }

    fn run(&self, args: &[&str]) -> Result<bool> {
        let status = Command::new(&self.binary)
            .args(args)
            .arg(&self.path)
            .status()
            .map_err(|e| {
                Error::with_source(ErrorKind::IoError, "failed to spawn mutt_dotlock", e)
            })?;
        Ok(status.success())
    }
}

impl Locker for MuttDotlock {
    fn lock(&mut self) -> Result<()> {
        let timeout_secs = self.timing.timeout.as_secs().to_string();
        if self.run(&["-t", &timeout_secs])? {
            self.held = true;
            Ok(())
        } else {
            Err(Error::new(
                ErrorKind::LockTimeout,
                format!("mutt_dotlock could not lock {}", self.path.display()),
            ))
        }
    }

    fn unlock(&mut self) -> Result<()> {
        if self.held {
            self.run(&["-u"])?;
            self.held = false;
        }
        Ok(())
    }

    fn has_lock(&self) -> bool {
        self.held
    }

    fn is_locked(&self) -> bool {
        let mut lock_path = self.path.clone().into_os_string();
        lock_path.push(".lock");
        Path::new(&lock_path).exists()
    }

    fn filename(&self) -> &Path {
        &self.path
    }

    fn name(&self) -> &str {
        "mutt"
    }
}

impl Drop for MuttDotlock {
    fn drop(&mut self) {
        let _ = self.unlock();
    }
}
