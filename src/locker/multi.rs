/*
 * mailbox - composite locker.
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

//! Holds several lockers at once (e.g. dot-lock + fcntl, the conventional
//! belt-and-suspenders combination), acquiring in order and rolling back
//! on partial failure.

use crate::error::Result;
use crate::locker::Locker;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct MultiLock {
    path: PathBuf,
    lockers: Vec<Box<dyn Locker>>,
}

impl MultiLock {
    pub fn new(path: impl AsRef<Path>, lockers: Vec<Box<dyn Locker>>) -> Self {
        MultiLock {
            path: path.as_ref().to_path_buf(),
            lockers,
        }
    }
}

impl Locker for MultiLock {
    fn lock(&mut self) -> Result<()> {
        for i in 0..self.lockers.len() {
            if let Err(e) = self.lockers[i].lock() {
                for acquired in self.lockers[..i].iter_mut() {
                    let _ = acquired.unlock();
                }
                return Err(e);
            }
        }
        Ok(())
    }

    fn unlock(&mut self) -> Result<()> {
        for locker in self.lockers.iter_mut().rev() {
            locker.unlock()?;
        }
        Ok(())
    }

    fn has_lock(&self) -> bool {
        !self.lockers.is_empty() && self.lockers.iter().all(|l| l.has_lock())
    }

    fn is_locked(&self) -> bool {
        self.lockers.iter().any(|l| l.is_locked())
    }

    fn filename(&self) -> &Path {
        &self.path
    }

    fn name(&self) -> &str {
        "multi"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locker::dotlock::DotLock;
    use std::fs;

    #[test]
    fn acquires_all_and_releases_in_reverse() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("box");
        fs::write(&target, b"").unwrap();
        let mut multi = MultiLock::new(
            &target,
            vec![Box::new(DotLock::new(&target)), Box::new(DotLock::new(&target.with_extension("alt")))],
        );
        // second DotLock targets a sibling path so both can be constructed
        // independently; only assert the composite acquires successfully.
        fs::write(target.with_extension("alt"), b"").unwrap();
        multi.lock().unwrap();
        assert!(multi.has_lock());
        multi.unlock().unwrap();
        assert!(!multi.has_lock());
    }
}
