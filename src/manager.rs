/*
 * mailbox - folder manager module.
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

//! Registry of open folders: type-directed or autodetected `open`,
//! cross-folder `copy_message`/`move_message`, and the thread-manager
//! list over all participating folders. §4.10.

use crate::conf::FolderConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::folder::{AccessMode, ClosePolicy, Folder, FolderKind};
#[cfg(feature = "maildir_backend")]
use crate::folder::maildir::MaildirFolder;
#[cfg(feature = "mbox_backend")]
use crate::folder::mbox::MboxFolder;
#[cfg(feature = "mh_backend")]
use crate::folder::mh::MhFolder;
use crate::logging::Level;
use crate::shellexpand::ShellExpandTrait;
use crate::thread::ThreadManager;
use std::collections::HashMap;
use std::path::PathBuf;

/// A handle into `Manager`'s open-folder set.
pub type FolderId = u64;

pub struct Manager {
    folders: HashMap<FolderId, Box<dyn Folder>>,
    /// Expanded path -> handle, so a repeat `open` of the same folder
    /// returns the existing handle instead of a second independent one
    /// (§7 `AlreadyOpen`).
    open_paths: HashMap<PathBuf, FolderId>,
    next_id: FolderId,
    threads: ThreadManager,
}

impl Default for Manager {
    fn default() -> Self {
        Manager {
            folders: HashMap::new(),
            open_paths: HashMap::new(),
            next_id: 0,
            threads: ThreadManager::new(),
        }
    }
}

impl Manager {
    pub fn new() -> Self {
        Manager::default()
    }

    pub fn folder(&self, id: FolderId) -> Option<&dyn Folder> {
        self.folders.get(&id).map(|b| b.as_ref())
    }

    pub fn folder_mut(&mut self, id: FolderId) -> Option<&mut (dyn Folder + 'static)> {
        self.folders.get_mut(&id).map(|b| b.as_mut())
    }

    pub fn threads(&self) -> &ThreadManager {
        &self.threads
    }

    pub fn rebuild_threads(&mut self) {
        self.threads = ThreadManager::new();
        for folder in self.folders.values() {
            self.threads.add_folder(folder.as_ref());
        }
    }

    fn insert(&mut self, folder: Box<dyn Folder>) -> FolderId {
        let id = self.next_id;
        self.next_id += 1;
        self.folders.insert(id, folder);
        id
    }

    /// `open(spec)` — §4.10: instantiate the named type directly, or walk
    /// backend kinds in registry order (Mbox, MH, Maildir) and take the
    /// first whose on-disk shape matches, creating a new folder of the
    /// requested (or default) kind if `create` is set and nothing matched.
    ///
    /// A repeat `open` of a path already tracked by this `Manager`
    /// returns the existing handle rather than opening a second,
    /// independent one (§7 `AlreadyOpen`).
    pub fn open(&mut self, config: &FolderConfig, access_mode: AccessMode, create: bool) -> Result<FolderId> {
        let expanded = config.path.expand();
        if let Some(&existing) = self.open_paths.get(&expanded) {
            if let Some(folder) = self.folders.get(&existing) {
                folder.core().report(
                    Level::Notice,
                    &format!("{} is already open, reusing existing handle", expanded.display()),
                );
            }
            return Ok(existing);
        }
        let id = self.open_new(config, access_mode, create)?;
        self.open_paths.insert(expanded, id);
        Ok(id)
    }

    fn open_new(&mut self, config: &FolderConfig, access_mode: AccessMode, create: bool) -> Result<FolderId> {
        if let Some(kind) = config.kind {
            return self.open_as(kind, config, access_mode, create);
        }
        for kind in [FolderKind::Mbox, FolderKind::Mh, FolderKind::Maildir] {
            if Self::found_in(kind, &config.path) {
                return self.open_as(kind, config, access_mode, create);
            }
        }
        if create {
            return self.open_as(FolderKind::Mbox, config, access_mode, true);
        }
        Err(Error::new(
            ErrorKind::FolderTypeUnknown,
            format!("no backend recognizes {}", config.path.display()),
        ))
    }

    fn found_in(kind: FolderKind, path: &std::path::Path) -> bool {
        match kind {
            FolderKind::Mbox => path.is_file(),
            FolderKind::Mh => path.is_dir() && !path.join("cur").is_dir(),
            FolderKind::Maildir => {
                path.join("cur").is_dir() && path.join("new").is_dir() && path.join("tmp").is_dir()
            }
        }
    }

    fn open_as(
        &mut self,
        kind: FolderKind,
        config: &FolderConfig,
        access_mode: AccessMode,
        create: bool,
    ) -> Result<FolderId> {
        let folder: Box<dyn Folder> = match kind {
            #[cfg(feature = "mbox_backend")]
            FolderKind::Mbox => {
                if create && !config.path.exists() {
                    MboxFolder::create(&config.path)?;
                }
                Box::new(MboxFolder::open(&config.path, access_mode)?)
            }
            #[cfg(feature = "mh_backend")]
            FolderKind::Mh => {
                if create && !config.path.is_dir() {
                    MhFolder::create(&config.path)?;
                }
                Box::new(MhFolder::open(&config.path, access_mode)?)
            }
            #[cfg(feature = "maildir_backend")]
            FolderKind::Maildir => {
                if create && !config.path.join("cur").is_dir() {
                    MaildirFolder::create(&config.path)?;
                }
                Box::new(MaildirFolder::open(&config.path, access_mode)?)
            }
            #[allow(unreachable_patterns)]
            _ => {
                return Err(Error::new(
                    ErrorKind::FolderTypeUnknown,
                    "backend disabled by crate features",
                ))
            }
        };
        Ok(self.insert(folder))
    }

    /// Clones `message_idx` from `source` into `target`, coercing across
    /// backend kinds as needed.
    pub fn copy_message(&mut self, source: FolderId, target: FolderId, message_idx: usize, raw: Option<&[u8]>) -> Result<()> {
        if source == target {
            return Err(Error::new(ErrorKind::CoerceError, "source and target are the same folder"));
        }
        // HashMap has no order-respecting split_at_mut; take both handles
        // out, operate, and put them back.
        let mut src_folder = self
            .folders
            .remove(&source)
            .ok_or_else(|| Error::new(ErrorKind::FolderMissing, "unknown source folder id"))?;
        let mut dst_folder = self.folders.remove(&target);
        let result = match dst_folder.as_mut() {
            Some(dst) => src_folder.copy_to(dst.as_mut(), message_idx, raw),
            None => Err(Error::new(ErrorKind::FolderMissing, "unknown target folder id")),
        };
        self.folders.insert(source, src_folder);
        if let Some(dst) = dst_folder {
            self.folders.insert(target, dst);
        }
        result
    }

    /// `move_message = copy_message + delete source` (§4.10).
    pub fn move_message(&mut self, source: FolderId, target: FolderId, message_idx: usize, raw: Option<&[u8]>) -> Result<()> {
        self.copy_message(source, target, message_idx, raw)?;
        if let Some(folder) = self.folder_mut(source) {
            if let Some(message) = folder.core_mut().messages.get_mut(message_idx) {
                message.delete();
            }
        }
        Ok(())
    }

    /// `append_messages(target, msgs, opts)`: adds each message to an
    /// already-open target folder (opening/reuse is the caller's
    /// responsibility via `open`, since `Manager` only tracks handles it
    /// was given).
    pub fn append_messages(&mut self, target: FolderId, messages: Vec<crate::message::Message>) -> Result<()> {
        let folder = self
            .folder_mut(target)
            .ok_or_else(|| Error::new(ErrorKind::FolderMissing, "unknown target folder id"))?;
        for message in messages {
            folder.add_message(message)?;
        }
        Ok(())
    }

    /// Closes every open folder with `ClosePolicy::Modified`, honoring
    /// each folder's configured `save_on_exit` (§5 "Destructors").
    pub fn close_all(&mut self) {
        for folder in self.folders.values_mut() {
            if folder.core().save_on_exit {
                let _ = folder.close(ClosePolicy::Modified);
            }
        }
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_unknown_path_without_create_fails() {
        let mut manager = Manager::new();
        let config = FolderConfig {
            path: "/nonexistent/path/for/test".into(),
            ..Default::default()
        };
        let result = manager.open(&config, AccessMode::ReadOnly, false);
        assert!(result.is_err());
    }

    #[test]
    #[cfg(feature = "mbox_backend")]
    fn opening_the_same_path_twice_returns_the_same_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox");
        std::fs::write(&path, b"").unwrap();

        let mut manager = Manager::new();
        let config = FolderConfig {
            path,
            kind: Some(FolderKind::Mbox),
            ..Default::default()
        };
        let first = manager.open(&config, AccessMode::ReadOnly, false).unwrap();
        let second = manager.open(&config, AccessMode::ReadOnly, false).unwrap();
        assert_eq!(first, second);
        assert_eq!(manager.folders.len(), 1);
    }
}
