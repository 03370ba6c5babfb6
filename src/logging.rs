/*
 * mailbox - logging module.
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

//! Replaces the dynamic `AUTOLOAD`-style log delegation of the source
//! library with an explicit, pluggable `Reporter` trait (§9 design notes).

use std::sync::Arc;

#[derive(Copy, Clone, PartialEq, PartialOrd, Eq, Ord, Hash, Debug)]
pub enum Level {
    Trace,
    Progress,
    Notice,
    Warning,
    Error,
    Internal,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            Level::Trace => "TRACE",
            Level::Progress => "PROGRESS",
            Level::Notice => "NOTICE",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Internal => "INTERNAL",
        };
        write!(f, "{}", s)
    }
}

/// A pluggable sink for folder/message/field diagnostics.
pub trait Reporter: std::fmt::Debug + Send + Sync {
    fn report(&self, level: Level, scope: &str, message: &str);
}

/// Default `Reporter` that forwards onto the `log` crate's global logger,
/// which is the ecosystem-standard facade the rest of this crate (and its
/// teacher) depends on.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, level: Level, scope: &str, message: &str) {
        match level {
            Level::Trace => log::trace!(target: "mailbox", "[{}] {}", scope, message),
            Level::Progress | Level::Notice => {
                log::info!(target: "mailbox", "[{}] {}", scope, message)
            }
            Level::Warning => log::warn!(target: "mailbox", "[{}] {}", scope, message),
            Level::Error | Level::Internal => {
                log::error!(target: "mailbox", "[{}] {}", scope, message)
            }
        }
    }
}

pub fn default_reporter() -> Arc<dyn Reporter> {
    Arc::new(LogReporter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct CountingReporter {
        count: std::sync::atomic::AtomicUsize,
    }

    impl Reporter for CountingReporter {
        fn report(&self, _level: Level, _scope: &str, _message: &str) {
            self.count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn reporter_is_pluggable() {
        let r = CountingReporter::default();
        r.report(Level::Notice, "folder:inbox", "opened");
        r.report(Level::Warning, "folder:inbox", "stale lock");
        assert_eq!(r.count.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn level_ordering_matches_severity() {
        assert!(Level::Trace < Level::Notice);
        assert!(Level::Warning < Level::Error);
        assert!(Level::Error < Level::Internal);
    }
}
