/*
 * mailbox - Maildir folder backend.
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

//! `tmp/new/cur` layout; `:2,<FLAGS>` suffix naming; new→cur is a rename,
//! flag changes are atomic renames. §4.9.

use crate::error::{Error, ErrorKind, Result};
use crate::folder::{AccessMode, Folder, FolderCore, FolderKind, Organization, WritePolicy};
use crate::head::Head;
use crate::locker::Locker;
use crate::logging::Level;
use crate::message::{LabelValue, Message};
use crate::parser::Parser;
use crate::shellexpand::ShellExpandTrait;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Fixed alphabet, already in the alphabetic order the suffix requires.
const FLAG_ALPHABET: &[(char, &str)] = &[
    ('D', "draft"),
    ('F', "flagged"),
    ('R', "replied"),
    ('S', "seen"),
    ('T', "deleted"),
];

static UNIQUIFIER_COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct MaildirFolder {
    core: FolderCore,
    path: PathBuf,
    locker: Option<Box<dyn Locker>>,
    /// `unique_id -> current on-disk path`, since flag-renames move the
    /// file and the base filename alone no longer resolves it.
    locations: HashMap<String, PathBuf>,
}

impl MaildirFolder {
    pub fn open(path: impl AsRef<Path>, access_mode: AccessMode) -> Result<Self> {
        Self::open_in(path, access_mode, &crate::shellexpand::default_mail_dir())
    }

    pub fn open_in(path: impl AsRef<Path>, access_mode: AccessMode, folder_dir: &Path) -> Result<Self> {
        let path = path.as_ref().expand_in(folder_dir);
        for sub in ["tmp", "new", "cur"] {
            if !path.join(sub).is_dir() {
                return Err(Error::new(
                    ErrorKind::FolderMissing,
                    format!("{} is missing maildir subdirectory {:?}", path.display(), sub),
                ));
            }
        }
        let name = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut folder = MaildirFolder {
            core: FolderCore::new(name, access_mode),
            path,
            locker: None,
            locations: HashMap::new(),
        };
        folder.read_messages()?;
        Ok(folder)
    }

    pub fn create(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        for sub in ["tmp", "new", "cur"] {
            fs::create_dir_all(path.join(sub))?;
        }
        Ok(())
    }

    pub fn set_locker(&mut self, locker: Box<dyn Locker>) {
        self.locker = Some(locker);
    }

    fn sub_folder_dir(&self) -> Option<&Path> {
        self.path.parent()
    }
}

fn flags_from_labels(message: &Message) -> String {
    let mut flags = String::new();
    for (ch, label) in FLAG_ALPHABET {
        if message.has_label(label) {
            flags.push(*ch);
        }
    }
    flags
}

fn apply_flags_to_labels(message: &mut Message, flags: &str) {
    let present: std::collections::HashSet<char> = flags.chars().collect();
    for (ch, label) in FLAG_ALPHABET {
        message.labels.insert(label.to_string(), LabelValue::Bool(present.contains(ch)));
    }
}

/// Splits `<time>.<uniquifier>.<fqdn>[:2,<FLAGS>]` into `(base, flags)`.
fn parse_filename(name: &str) -> (&str, &str) {
    match name.find(":2,") {
        Some(idx) => (&name[..idx], &name[idx + 3..]),
        None => (name, ""),
    }
}

fn local_hostname() -> String {
    let mut buf = vec![0u8; 256];
    let ret = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if ret != 0 {
        return "localhost".to_string();
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..len]).replace(['/', ':'], "_")
}

/// `<time>.<uniquifier>.<fqdn>`, per §6 "External interfaces".
fn generate_base_name() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let counter = UNIQUIFIER_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}.{}P{}Q{}.{}", secs, "M", std::process::id(), counter, local_hostname())
}

impl Folder for MaildirFolder {
    fn core(&self) -> &FolderCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut FolderCore {
        &mut self.core
    }

    fn kind(&self) -> FolderKind {
        FolderKind::Maildir
    }

    fn organization(&self) -> Organization {
        Organization::Directory
    }

    fn list_sub_folders(&self) -> Result<Vec<String>> {
        let Some(parent) = self.sub_folder_dir() else {
            return Ok(Vec::new());
        };
        let mut names = Vec::new();
        for entry in fs::read_dir(parent)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            if name.starts_with('.') && entry.path().join("cur").is_dir() {
                names.push(name.trim_start_matches('.').to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn read_messages(&mut self) -> Result<()> {
        self.core.messages.clear();
        self.core.msgid_index.clear();
        self.core.modified_count = 0;
        self.locations.clear();

        // "Moving a message from new/ to cur/ on first access" (§4.9):
        // oldest-mtime-first, by rename only, no content change, no flags.
        let mut new_entries: Vec<(SystemTime, PathBuf)> = Vec::new();
        for entry in fs::read_dir(self.path.join("new"))? {
            let entry = entry?;
            if entry.path().is_file() {
                let mtime = entry.metadata()?.modified().unwrap_or(UNIX_EPOCH);
                new_entries.push((mtime, entry.path()));
            }
        }
        new_entries.sort_by_key(|(mtime, _)| *mtime);
        for (_, old_path) in new_entries {
            let Some(file_name) = old_path.file_name().map(|f| f.to_string_lossy().into_owned()) else {
                continue;
            };
            let new_path = self.path.join("cur").join(format!("{}:2,", file_name));
            fs::rename(&old_path, &new_path)?;
        }

        let mut cur_entries: Vec<PathBuf> = fs::read_dir(self.path.join("cur"))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        cur_entries.sort();

        for path in cur_entries {
            let file_name = path.file_name().map(|f| f.to_string_lossy().into_owned()).unwrap_or_default();
            let (base, flags) = parse_filename(&file_name);
            let base = base.to_string();
            let raw = fs::read(&path)?;

            let mut parser = Parser::new(&raw);
            let (head_begin, head_end, fields) = parser.read_header()?;
            let (body_begin, body_end, lines) = parser.read_body_until_separator()?;
            let _ = (head_begin, body_begin, body_end);

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

            let mut message = Message {
                head,
                body,
                unique_id: Some(base.clone()),
                ..Default::default()
            };
            apply_flags_to_labels(&mut message, flags);
            self.locations.insert(base, path);
            self.core.add_message(message)?;
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

impl MaildirFolder {
    fn write_each(&mut self) -> Result<()> {
        for message in &mut self.core.messages {
            if message.has_label("deleted") {
                if let Some(id) = &message.unique_id {
                    if let Some(path) = self.locations.remove(id) {
                        if path.exists() {
                            fs::remove_file(&path)?;
                        }
                    }
                }
                continue;
            }
            match message.unique_id.clone() {
                Some(id) => {
                    let flags = flags_from_labels(message);
                    let new_path = self.path.join("cur").join(format!("{}:2,{}", id, flags));
                    match self.locations.get(&id).cloned() {
                        Some(old_path) if old_path != new_path => {
                            fs::rename(&old_path, &new_path)?;
                            self.locations.insert(id, new_path);
                        }
                        Some(_) => {}
                        None => {
                            let raw = format!("{}\r\n{}", message.head.print(), message.body.text());
                            fs::write(&new_path, raw.as_bytes())?;
                            self.locations.insert(id, new_path);
                        }
                    }
                }
                None => {
                    // Cross-folder arrival (§4.10 copy/move): stage in
                    // tmp/, then rename into new/ unconditionally.
                    let base = generate_base_name();
                    let tmp_path = self.path.join("tmp").join(&base);
                    let raw = format!("{}\r\n{}", message.head.print(), message.body.text());
                    {
                        let mut f = fs::File::create(&tmp_path)?;
                        f.write_all(raw.as_bytes())?;
                        f.sync_all()?;
                    }
                    let new_path = self.path.join("new").join(&base);
                    fs::rename(&tmp_path, &new_path)?;
                    message.unique_id = Some(base.clone());
                    self.locations.insert(base, new_path);
                }
            }
            message.head.clear_modified();
            message.body.meta.modified = false;
            message.labels_modified = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_fixture(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("inbox");
        MaildirFolder::create(&path).unwrap();
        let mut f = fs::File::create(path.join("new").join("110000013.l.43")).unwrap();
        write!(
            f,
            "Subject: hi\r\nMessage-ID: <1@x>\r\n\r\nbody\r\n"
        )
        .unwrap();
        path
    }

    #[test]
    fn moves_new_into_cur_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir);
        let folder = MaildirFolder::open(&path, AccessMode::ReadWrite).unwrap();
        assert_eq!(folder.core.messages.len(), 1);
        assert!(fs::read_dir(path.join("new")).unwrap().next().is_none());
        assert!(folder.locations.values().next().unwrap().starts_with(path.join("cur")));
    }

    #[test]
    fn flag_set_label_round_trips_via_filename_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox");
        MaildirFolder::create(&path).unwrap();
        fs::write(
            path.join("cur").join("110000013.l.43:2,FRS"),
            b"Subject: hi\r\nMessage-ID: <1@x>\r\n\r\nbody\r\n",
        )
        .unwrap();
        let mut folder = MaildirFolder::open(&path, AccessMode::ReadWrite).unwrap();
        assert!(folder.core.messages[0].has_label("flagged"));
        assert!(folder.core.messages[0].has_label("replied"));
        assert!(folder.core.messages[0].has_label("seen"));
        assert!(!folder.core.messages[0].has_label("draft"));

        folder.core_mut().messages[0].label("flagged", Some(LabelValue::Bool(false)));
        folder.write(WritePolicy::Default).unwrap();

        let reopened = MaildirFolder::open(&path, AccessMode::ReadOnly).unwrap();
        assert!(!reopened.core.messages[0].has_label("flagged"));
        assert!(reopened.core.messages[0].has_label("seen"));
    }

    #[test]
    fn deleted_message_file_is_unlinked_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir);
        let mut folder = MaildirFolder::open(&path, AccessMode::ReadWrite).unwrap();
        folder.core_mut().messages[0].delete();
        folder.write(WritePolicy::Default).unwrap();
        assert_eq!(fs::read_dir(path.join("cur")).unwrap().count(), 0);
    }
}
