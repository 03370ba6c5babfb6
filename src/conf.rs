/*
 * mailbox - configuration module.
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

//! Per-folder and per-account settings (§4.15 addendum): path, backend
//! kind, locker choice, timing, and the handful of behavior switches
//! `FolderCore` reads at open time.

use crate::folder::{FolderKind, LineSeparator};
use crate::locker::LockTiming;
use crate::shellexpand::{default_folder_from_env, default_mail_dir};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Which `Locker` implementation a folder should use, by name — kept as
/// data (rather than a boxed trait object) so it round-trips through
/// `serde`/config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockerKind {
    Dotlock,
    NfsSafe,
    Fcntl,
    Flock,
    Mutt,
    None,
}

impl Default for LockerKind {
    fn default() -> Self {
        LockerKind::Dotlock
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractPolicy {
    /// Parse the full body at open time.
    Eager,
    /// Keep bodies `Delayed` until explicitly requested (§9 lazy-loading
    /// design note) — the default, matching the source library's
    /// IMAP-friendly behavior.
    Lazy,
}

impl Default for ExtractPolicy {
    fn default() -> Self {
        ExtractPolicy::Lazy
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderConfig {
    pub path: PathBuf,
    pub kind: Option<FolderKind>,
    pub locker: LockerKind,
    #[serde(with = "duration_secs")]
    pub lock_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub lock_stale_after: Duration,
    pub wrap_length: usize,
    pub keep_duplicates: bool,
    pub extract_policy: ExtractPolicy,
    pub save_on_exit: bool,
    pub line_separator: LineSeparatorConfig,
}

/// `serde`-friendly mirror of `folder::LineSeparator` (that type has no
/// `Serialize`/`Deserialize` derive since it's a copy-type enum used
/// purely internally).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineSeparatorConfig {
    Lf,
    Cr,
    CrLf,
}

impl From<LineSeparatorConfig> for LineSeparator {
    fn from(c: LineSeparatorConfig) -> Self {
        match c {
            LineSeparatorConfig::Lf => LineSeparator::Lf,
            LineSeparatorConfig::Cr => LineSeparator::Cr,
            LineSeparatorConfig::CrLf => LineSeparator::CrLf,
        }
    }
}

impl Default for LineSeparatorConfig {
    fn default() -> Self {
        LineSeparatorConfig::Lf
    }
}

impl Default for FolderConfig {
    fn default() -> Self {
        FolderConfig {
            path: default_folder_from_env().unwrap_or_else(default_mail_dir),
            kind: None,
            locker: LockerKind::default(),
            lock_timeout: LockTiming::default().timeout,
            lock_stale_after: LockTiming::default().stale_after,
            wrap_length: 78,
            keep_duplicates: false,
            extract_policy: ExtractPolicy::default(),
            save_on_exit: true,
            line_separator: LineSeparatorConfig::default(),
        }
    }
}

impl FolderConfig {
    pub fn lock_timing(&self) -> LockTiming {
        LockTiming {
            timeout: self.lock_timeout,
            stale_after: self.lock_stale_after,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountSettings {
    pub name: String,
    pub folders: Vec<FolderConfig>,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_lazy_and_dotlock() {
        let cfg = FolderConfig::default();
        assert_eq!(cfg.locker, LockerKind::Dotlock);
        assert_eq!(cfg.extract_policy, ExtractPolicy::Lazy);
    }
}
