/*
 * mailbox - shellexpand module.
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

use std::path::{Path, PathBuf};

pub trait ShellExpandTrait {
    /// Expand a leading `~` to `$HOME` and a leading `=` to `folder_dir`
    /// (the mbox "leading `=`" convention of §4.7).
    fn expand(&self) -> PathBuf;
    fn expand_in(&self, folder_dir: &Path) -> PathBuf;
}

impl<T: AsRef<Path>> ShellExpandTrait for T {
    fn expand(&self) -> PathBuf {
        self.expand_in(&default_mail_dir())
    }

    fn expand_in(&self, folder_dir: &Path) -> PathBuf {
        let path = self.as_ref();
        let s = path.to_string_lossy();
        if let Some(rest) = s.strip_prefix('=') {
            return folder_dir.join(rest.trim_start_matches('/'));
        }
        if s == "~" || s.starts_with("~/") {
            if let Some(home) = std::env::var_os("HOME") {
                let rest = s.trim_start_matches('~').trim_start_matches('/');
                return PathBuf::from(home).join(rest);
            }
        }
        path.to_path_buf()
    }
}

/// `$HOME/Mail`, the default folder directory (§6 "Environment").
pub fn default_mail_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Mail")
}

/// `$MAIL`, the default folder when none is supplied (§6 "Environment").
pub fn default_folder_from_env() -> Option<PathBuf> {
    std::env::var_os("MAIL").map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_equals_sign_against_folder_dir() {
        let dir = PathBuf::from("/home/u/Mail");
        assert_eq!(
            "=work/inbox".expand_in(&dir),
            PathBuf::from("/home/u/Mail/work/inbox")
        );
    }

    #[test]
    fn leaves_absolute_paths_alone() {
        let dir = PathBuf::from("/home/u/Mail");
        assert_eq!(
            "/var/mail/u".expand_in(&dir),
            PathBuf::from("/var/mail/u")
        );
    }
}
