/*
 * mailbox - MH folder backend.
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

//! One-message-per-file, decimal filenames, optional mtime-checked index
//! cache. Renumbering only happens through explicit `compact()`. §4.8.

use crate::error::{Error, ErrorKind, Result};
use crate::folder::{AccessMode, Folder, FolderCore, FolderKind, Organization, WritePolicy};
use crate::head::Head;
use crate::locker::Locker;
use crate::logging::Level;
use crate::message::Message;
use crate::parser::Parser;
use crate::shellexpand::ShellExpandTrait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

const INDEX_FILE_NAME: &str = ".mailbox-index";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    mtime: u64,
    raw: Vec<u8>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Index {
    entries: HashMap<String, IndexEntry>,
}

pub struct MhFolder {
    core: FolderCore,
    path: PathBuf,
    locker: Option<Box<dyn Locker>>,
    use_index: bool,
}

impl MhFolder {
    pub fn open(path: impl AsRef<Path>, access_mode: AccessMode) -> Result<Self> {
        Self::open_in(path, access_mode, &crate::shellexpand::default_mail_dir())
    }

    pub fn open_in(path: impl AsRef<Path>, access_mode: AccessMode, folder_dir: &Path) -> Result<Self> {
        let path = path.as_ref().expand_in(folder_dir);
        if !path.is_dir() {
            return Err(Error::new(
                ErrorKind::FolderMissing,
                format!("MH directory {} does not exist", path.display()),
            ));
        }
        let name = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut folder = MhFolder {
            core: FolderCore::new(name, access_mode),
            path,
            locker: None,
            use_index: true,
        };
        folder.read_messages()?;
        Ok(folder)
    }

    pub fn create(path: impl AsRef<Path>) -> Result<()> {
        fs::create_dir_all(path.as_ref())?;
        Ok(())
    }

    pub fn set_locker(&mut self, locker: Box<dyn Locker>) {
        self.locker = Some(locker);
    }

    pub fn set_use_index(&mut self, use_index: bool) {
        self.use_index = use_index;
    }

    fn index_path(&self) -> PathBuf {
        self.path.join(INDEX_FILE_NAME)
    }

    fn load_index(&self) -> Index {
        if !self.use_index {
            return Index::default();
        }
        match fs::read(self.index_path()) {
            Ok(bytes) => bincode::deserialize(&bytes).unwrap_or_default(),
            Err(_) => Index::default(),
        }
    }

    fn save_index(&self, index: &Index) {
        if !self.use_index {
            return;
        }
        if let Ok(bytes) = bincode::serialize(index) {
            let _ = fs::write(self.index_path(), bytes);
        }
    }

    /// Lists numeric message filenames (decimal integers >= 1), ignoring
    /// dotfiles such as `.mh_sequences` and this backend's own index cache.
    fn numbered_entries(&self) -> Result<Vec<(u32, PathBuf)>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            if name.starts_with('.') {
                continue;
            }
            if let Ok(number) = name.parse::<u32>() {
                if number >= 1 && entry.path().is_file() {
                    out.push((number, entry.path()));
                }
            }
        }
        out.sort_by_key(|(n, _)| *n);
        Ok(out)
    }

    fn next_number(&self) -> u32 {
        self.core
            .messages
            .iter()
            .filter_map(|m| m.unique_id.as_ref().and_then(|id| id.parse::<u32>().ok()))
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Explicit compaction: renumbers active messages `1..N` in their
    /// current order. §4.8 "renumbering is never implicit".
    pub fn compact(&mut self) -> Result<()> {
        if self.access_mode() == AccessMode::ReadOnly {
            return Err(Error::new(ErrorKind::AccessDenied, "folder is read-only"));
        }
        self.core
            .messages
            .retain(|m| !m.has_label("deleted"));
        let renames: Vec<(PathBuf, PathBuf)> = self
            .core
            .messages
            .iter()
            .enumerate()
            .filter_map(|(i, m)| {
                let old = m.unique_id.as_ref()?;
                let new_number = (i + 1).to_string();
                if old == &new_number {
                    None
                } else {
                    Some((self.path.join(old), self.path.join(&new_number)))
                }
            })
            .collect();
        // Two-phase: stage into temp names first so a cyclic renumbering
        // (e.g. swapping 1 and 2) can't clobber a not-yet-moved file.
        let mut staged = Vec::with_capacity(renames.len());
        for (old, new) in &renames {
            let staging = old.with_extension("compact-tmp");
            fs::rename(old, &staging)?;
            staged.push((staging, new.clone()));
        }
        for (staging, new) in staged {
            fs::rename(staging, &new)?;
        }
        for (i, message) in self.core.messages.iter_mut().enumerate() {
            message.unique_id = Some((i + 1).to_string());
        }
        self.save_index(&self.load_index());
        Ok(())
    }
}

impl Folder for MhFolder {
    fn core(&self) -> &FolderCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut FolderCore {
        &mut self.core
    }

    fn kind(&self) -> FolderKind {
        FolderKind::Mh
    }

    fn organization(&self) -> Organization {
        Organization::Directory
    }

    fn list_sub_folders(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            if entry.path().is_dir() && !name.starts_with('.') {
                names.push(name.into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn read_messages(&mut self) -> Result<()> {
        self.core.messages.clear();
        self.core.msgid_index.clear();
        self.core.modified_count = 0;

        let mut index = self.load_index();
        let mut index_dirty = false;

        for (number, path) in self.numbered_entries()? {
            let mtime = fs::metadata(&path)?
                .modified()?
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            let key = number.to_string();
            let raw = match index.entries.get(&key) {
                Some(cached) if cached.mtime == mtime => cached.raw.clone(),
                _ => {
                    let bytes = fs::read(&path)?;
                    index.entries.insert(
                        key.clone(),
                        IndexEntry {
                            mtime,
                            raw: bytes.clone(),
                        },
                    );
                    index_dirty = true;
                    bytes
                }
            };

            let mut parser = Parser::new(&raw);
            let (head_begin, head_end, fields) = parser.read_header()?;
            let (body_begin, body_end, lines) = parser.read_body_until_separator()?;
            let _ = (head_begin, body_begin);

            let mut head = Head::with_location(0, head_end);
            for field in fields {
                head.add(field);
            }
            head.clear_modified();
            let mut body = crate::body::Body::from_lines(lines);
            body.meta.modified = false;
            if let Some(ct) = head.get("content-type", None) {
                body.meta.mime_type = ct.body().to_string();
                if let Some(cs) = ct.attribute("charset") {
                    body.meta.charset = Some(cs.to_string());
                }
            }
            let _ = body_end;

            let mut message = Message {
                head,
                body,
                unique_id: Some(key),
                ..Default::default()
            };
            message.label("current", Some(crate::message::LabelValue::Bool(true)));
            self.core.add_message(message)?;
        }

        // Stale cache entries for files that no longer exist are dropped.
        let live: std::collections::HashSet<String> =
            self.numbered_entries()?.into_iter().map(|(n, _)| n.to_string()).collect();
        let before = index.entries.len();
        index.entries.retain(|k, _| live.contains(k));
        if index.entries.len() != before {
            index_dirty = true;
        }
        if index_dirty {
            self.save_index(&index);
        }
        self.core.modified_count = 0;
        Ok(())
    }

    fn write(&mut self, _policy: WritePolicy) -> Result<bool> {
        if !self.is_modified() {
            return Ok(false);
        }
        if self.access_mode() == AccessMode::ReadOnly {
            return Err(Error::new(ErrorKind::AccessDenied, "folder is read-only"));
        }
        if let Some(locker) = self.locker.as_mut() {
            locker.lock()?;
        }
        let result = self.write_each();
        if let Some(locker) = self.locker.as_mut() {
            locker.unlock()?;
        }
        result?;
        self.core.modified_count = 0;
        self.core.report(Level::Notice, "write complete");
        Ok(true)
    }

    fn delete(&mut self) -> Result<()> {
        fs::remove_dir_all(&self.path)?;
        Ok(())
    }
}

impl MhFolder {
    /// Each message is its own file: deleted ones are unlinked, new ones
    /// get the next free number, modified ones are rewritten in place.
    fn write_each(&mut self) -> Result<()> {
        let mut next = self.next_number();
        let mut index = self.load_index();
        for message in &mut self.core.messages {
            if message.has_label("deleted") {
                if let Some(id) = &message.unique_id {
                    let path = self.path.join(id);
                    if path.exists() {
                        fs::remove_file(&path)?;
                    }
                    index.entries.remove(id);
                }
                continue;
            }
            if !message.is_modified() && message.unique_id.is_some() {
                continue;
            }
            let id = message.unique_id.clone().unwrap_or_else(|| {
                let assigned = next.to_string();
                next += 1;
                assigned
            });
            let path = self.path.join(&id);
            let mut f = fs::File::create(&path)?;
            let raw = format!("{}\r\n{}", message.head.print(), message.body.text());
            f.write_all(raw.as_bytes())?;
            index.entries.insert(
                id.clone(),
                IndexEntry {
                    mtime: fs::metadata(&path)?
                        .modified()?
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_secs())
                        .unwrap_or(0),
                    raw: raw.into_bytes(),
                },
            );
            message.unique_id = Some(id);
            message.head.clear_modified();
            message.body.meta.modified = false;
            message.labels_modified = false;
        }
        self.save_index(&index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_fixture(dir: &tempfile::TempDir, messages: &[&str]) -> PathBuf {
        let path = dir.path().join("inbox");
        fs::create_dir_all(&path).unwrap();
        for (i, body) in messages.iter().enumerate() {
            let mut f = fs::File::create(path.join((i + 1).to_string())).unwrap();
            writeln!(f, "Subject: msg {}", i + 1).unwrap();
            writeln!(f, "Message-ID: <{}@example.com>", i + 1).unwrap();
            writeln!(f).unwrap();
            writeln!(f, "{}", body).unwrap();
        }
        path
    }

    #[test]
    fn reads_numeric_files_ignoring_dotfiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, &["a", "b"]);
        fs::write(path.join(".mh_sequences"), b"unseen: 1-2\n").unwrap();
        let folder = MhFolder::open(&path, AccessMode::ReadWrite).unwrap();
        assert_eq!(folder.core.messages.len(), 2);
        assert_eq!(folder.core.messages[0].unique_id.as_deref(), Some("1"));
    }

    #[test]
    fn write_assigns_next_number_to_new_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, &["a"]);
        let mut folder = MhFolder::open(&path, AccessMode::ReadWrite).unwrap();
        folder
            .add_message(Message::build(vec![("Subject", "new")], "body\n").unwrap())
            .unwrap();
        folder.write(WritePolicy::Default).unwrap();
        assert!(path.join("2").exists());
    }

    #[test]
    fn compact_renumbers_and_skips_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, &["a", "b", "c"]);
        let mut folder = MhFolder::open(&path, AccessMode::ReadWrite).unwrap();
        folder.core_mut().messages[0].delete();
        folder.write(WritePolicy::Default).unwrap();
        folder.compact().unwrap();
        assert_eq!(folder.core.messages.len(), 2);
        assert_eq!(folder.core.messages[0].unique_id.as_deref(), Some("1"));
        assert_eq!(folder.core.messages[1].unique_id.as_deref(), Some("2"));
        assert!(!path.join("3").exists());
    }

    #[test]
    fn index_cache_avoids_reread_of_unchanged_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, &["a"]);
        let mut folder = MhFolder::open(&path, AccessMode::ReadOnly).unwrap();
        folder.read_messages().unwrap();
        assert!(path.join(INDEX_FILE_NAME).exists());
        assert_eq!(folder.core.messages.len(), 1);
    }
}
