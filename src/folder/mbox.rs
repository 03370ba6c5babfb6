/*
 * mailbox - mbox folder backend.
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

//! One-file backend; write-policies REPLACE and INPLACE. §4.7.
//!
//! https://wiki2.dovecot.org/MailboxFormat/mbox

use crate::body::Body;
use crate::error::{Error, ErrorKind, Result};
use crate::folder::{
    AccessMode, Folder, FolderCore, FolderKind, LineSeparator, Organization, WritePolicy,
};
use crate::head::Head;
use crate::locker::Locker;
use crate::logging::Level;
use crate::message::Message;
use crate::parser::Parser;
use crate::shellexpand::ShellExpandTrait;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const SEPARATOR: &[u8] = b"From ";

pub struct MboxFolder {
    core: FolderCore,
    path: PathBuf,
    raw: Vec<u8>,
    locker: Option<Box<dyn Locker>>,
    line_separator: LineSeparator,
}

impl MboxFolder {
    pub fn open(path: impl AsRef<Path>, access_mode: AccessMode) -> Result<Self> {
        Self::open_in(path, access_mode, &crate::shellexpand::default_mail_dir())
    }

    pub fn open_in(path: impl AsRef<Path>, access_mode: AccessMode, folder_dir: &Path) -> Result<Self> {
        let path = path.as_ref().expand_in(folder_dir);
        if !path.exists() {
            return Err(Error::new(
                ErrorKind::FolderMissing,
                format!("mbox file {} does not exist", path.display()),
            ));
        }
        let raw = fs::read(&path)?;
        let name = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut folder = MboxFolder {
            core: FolderCore::new(name, access_mode),
            path,
            raw,
            locker: None,
            line_separator: LineSeparator::Lf,
        };
        folder.read_messages()?;
        Ok(folder)
    }

    pub fn create(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::write(path, b"")?;
        }
        Ok(())
    }

    pub fn set_locker(&mut self, locker: Box<dyn Locker>) {
        self.locker = Some(locker);
    }

    fn subfolder_dir(&self) -> PathBuf {
        let mut dir = self.path.clone();
        let name = dir
            .file_name()
            .map(|n| format!("{}.sbd", n.to_string_lossy()))
            .unwrap_or_else(|| "inbox.sbd".to_string());
        dir.set_file_name(name);
        dir
    }
}

impl Folder for MboxFolder {
    fn core(&self) -> &FolderCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut FolderCore {
        &mut self.core
    }

    fn kind(&self) -> FolderKind {
        FolderKind::Mbox
    }

    fn organization(&self) -> Organization {
        Organization::File
    }

    fn list_sub_folders(&self) -> Result<Vec<String>> {
        let dir = self.subfolder_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.path().is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn read_messages(&mut self) -> Result<()> {
        self.core.messages.clear();
        self.core.msgid_index.clear();
        self.core.modified_count = 0;

        let mut parser = Parser::new(&self.raw);
        parser.push_separator(SEPARATOR);
        while parser.has_more() {
            let envelope_begin = parser.tell();
            let envelope_line_end = match parser.skip_separator_line() {
                Some(end) => end,
                None => break,
            };
            let (head_begin, head_end, fields) = parser.read_header()?;
            let (body_begin, body_end, lines) = parser.read_body_until_separator()?;
            let _ = envelope_line_end;

            let mut head = Head::with_location(head_begin, head_end);
            for field in fields {
                head.add(field);
            }
            head.clear_modified();
            let unescaped: Vec<String> = lines.iter().map(|l| unescape_from_line(l)).collect();
            let mut body = Body::from_lines(unescaped);
            body.meta.modified = false;
            if let Some(ct) = head.get("content-type", None) {
                body.meta.mime_type = ct.body().to_string();
                if let Some(cs) = ct.attribute("charset") {
                    body.meta.charset = Some(cs.to_string());
                }
            }

            let mut flags_source = String::new();
            if let Some(status) = head.get("status", None) {
                flags_source.push_str(status.body());
            }
            if let Some(status) = head.get("x-status", None) {
                flags_source.push_str(status.body());
            }

            let mut message = Message {
                head,
                body,
                location: Some((envelope_begin, body_end)),
                ..Default::default()
            };
            apply_status_flags(&mut message, &flags_source);
            self.core.add_message(message)?;
            let _ = (head_end, body_begin);
        }
        self.core.modified_count = 0;
        Ok(())
    }

    fn write(&mut self, policy: WritePolicy) -> Result<bool> {
        if !self.is_modified() {
            return Ok(false);
        }
        if self.access_mode() == AccessMode::ReadOnly {
            return Err(Error::new(ErrorKind::AccessDenied, "folder is read-only"));
        }
        if let Some(locker) = self.locker.as_mut() {
            locker.lock()?;
        }
        let result = match policy {
            WritePolicy::Inplace => self.write_inplace(),
            WritePolicy::Replace => self.write_replace(),
            WritePolicy::Default => self
                .write_replace()
                .or_else(|_| self.write_inplace()),
        };
        if let Some(locker) = self.locker.as_mut() {
            locker.unlock()?;
        }
        result?;
        self.core.modified_count = 0;
        for message in &mut self.core.messages {
            message.head.clear_modified();
            message.body.meta.modified = false;
            message.labels_modified = false;
        }
        self.core.report(Level::Notice, "write complete");
        Ok(true)
    }

    fn delete(&mut self) -> Result<()> {
        fs::remove_file(&self.path)?;
        Ok(())
    }
}

impl MboxFolder {
    /// REPLACE: write to `<file>.tmp`, byte-copy unmodified spans,
    /// re-serialize modified messages, atomically move into place.
    /// `message.location` spans from the `From ` envelope line (not the
    /// header) through the body end, so an unmodified byte-copy carries
    /// its envelope line along rather than losing it.
    fn write_replace(&mut self) -> Result<()> {
        let tmp_path = self.path.with_extension("tmp");
        let mut out: Vec<u8> = Vec::with_capacity(self.raw.len());
        let sep = self.line_separator.as_bytes();

        for message in &mut self.core.messages {
            if message.has_label("deleted") {
                continue;
            }
            let old_begin = message.location.map(|(b, _)| b);
            let new_begin = out.len();
            if !message.is_modified() {
                if let Some((b, e)) = message.location {
                    out.extend_from_slice(&self.raw[b..e]);
                    if !out.ends_with(b"\n") {
                        out.extend_from_slice(sep);
                    }
                    message.location = Some((new_begin, out.len()));
                    continue;
                }
            }
            serialize_message(&mut out, message, sep);
            if let Some(old_begin) = old_begin {
                let _ = crate::folder::location_delta(old_begin, new_begin);
            }
            message.location = Some((new_begin, out.len()));
        }

        {
            let mut f = fs::File::create(&tmp_path)?;
            f.write_all(&out)?;
            f.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        self.raw = out;
        Ok(())
    }

    /// INPLACE: truncate at the first modified/reordered message's old
    /// envelope-line offset, re-serialize from there to EOF. Truncating
    /// at the envelope line (rather than the header) drops that
    /// message's original `From ` line along with its body, so
    /// `serialize_message`'s fresh `From ` line doesn't end up doubled.
    fn write_inplace(&mut self) -> Result<()> {
        let first_modified = self
            .core
            .messages
            .iter()
            .position(|m| m.is_modified() || m.has_label("deleted"));
        let Some(first_modified) = first_modified else {
            return Ok(());
        };
        let truncate_at = self.core.messages[first_modified]
            .location
            .map(|(b, _)| b)
            .unwrap_or(self.raw.len());

        let file = fs::OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(truncate_at as u64).map_err(|e| {
            Error::with_source(ErrorKind::IoError, "truncate unavailable for INPLACE write", e)
        })?;
        drop(file);

        let mut out: Vec<u8> = self.raw[..truncate_at].to_vec();
        let sep = self.line_separator.as_bytes();
        for message in &mut self.core.messages[first_modified..] {
            if message.has_label("deleted") {
                continue;
            }
            let new_begin = out.len();
            serialize_message(&mut out, message, sep);
            message.location = Some((new_begin, out.len()));
        }
        let mut f = fs::OpenOptions::new().write(true).append(true).open(&self.path)?;
        f.write_all(&out[truncate_at..])?;
        self.raw = out;
        Ok(())
    }
}

fn serialize_message(out: &mut Vec<u8>, message: &Message, sep: &[u8]) {
    let from_line = format!(
        "From - {}{}",
        crate::datetime::timestamp_to_rfc822(crate::datetime::now()),
        String::from_utf8_lossy(sep)
    );
    out.extend_from_slice(from_line.as_bytes());

    let mut head = message.head.clone();
    let status = status_string_from_labels(message);
    if status.is_empty() {
        head.remove("status");
    } else {
        head.set("Status", &status);
    }
    out.extend_from_slice(head.print().as_bytes());
    out.extend_from_slice(sep);
    for line in message.body.lines() {
        out.extend_from_slice(escape_from_line(line).as_bytes());
    }
    if !out.ends_with(sep) {
        out.extend_from_slice(sep);
    }
}

/// Inverse of `apply_status_flags`: folds current labels back into a
/// `Status` header value.
fn status_string_from_labels(message: &Message) -> String {
    let mut s = String::new();
    for (ch, label) in [('F', "flagged"), ('A', "replied"), ('R', "seen"), ('D', "draft"), ('T', "deleted")] {
        if message.has_label(label) {
            s.push(ch);
        }
    }
    s
}

/// Escapes a `From ` at line start by prepending `>`, on write.
fn escape_from_line(line: &str) -> String {
    if line.starts_with("From ") || line.starts_with(">From ") {
        format!(">{}", line)
    } else {
        line.to_string()
    }
}

/// Unescapes a line-leading `>From ` back to `From ` (the inverse of
/// `escape_from_line`), on read.
fn unescape_from_line(line: &str) -> String {
    let mut rest = line;
    let mut gt_count = 0;
    while let Some(stripped) = rest.strip_prefix('>') {
        if stripped.starts_with("From ") || (stripped.starts_with('>') ) {
            gt_count += 1;
            rest = stripped;
        } else {
            break;
        }
    }
    if rest.starts_with("From ") && gt_count > 0 {
        format!("{}{}", ">".repeat(gt_count - 1), rest)
    } else {
        line.to_string()
    }
}

fn apply_status_flags(message: &mut Message, status: &str) {
    use crate::message::LabelValue;
    for c in status.chars() {
        let label = match c {
            'F' => "flagged",
            'A' => "replied",
            'R' => "seen",
            'D' => "draft",
            'T' => "deleted",
            _ => continue,
        };
        message.labels.insert(label.to_string(), LabelValue::Bool(true));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_fixture(dir: &tempfile::TempDir, messages: &[&str]) -> PathBuf {
        let path = dir.path().join("mbox.src");
        let mut f = fs::File::create(&path).unwrap();
        for (i, body) in messages.iter().enumerate() {
            writeln!(f, "From user{} Mon Jan  1 00:00:0{} 1996", i, i).unwrap();
            writeln!(f, "Subject: msg {}", i).unwrap();
            writeln!(f, "Message-ID: <{}@example.com>", i).unwrap();
            writeln!(f).unwrap();
            writeln!(f, "{}", body).unwrap();
        }
        path
    }

    #[test]
    fn reads_all_messages_and_escapes_from() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, &["body one", ">From escaped inside body"]);
        let folder = MboxFolder::open(&path, AccessMode::ReadWrite).unwrap();
        assert_eq!(folder.core.messages.len(), 2);
        assert_eq!(
            folder.core.messages[0].head.get("subject", None).unwrap().body(),
            "msg 0"
        );
    }

    #[test]
    fn delete_and_close_never_preserves_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, &["a", "b", "c"]);
        let mut folder = MboxFolder::open(&path, AccessMode::ReadWrite).unwrap();
        folder.core_mut().messages[1].delete();
        assert_eq!(
            folder.messages(crate::folder::Selector::Active).len(),
            2
        );
        assert_eq!(
            folder.messages(crate::folder::Selector::Deleted).len(),
            1
        );
        folder.close(crate::folder::ClosePolicy::Never).unwrap();
        let reopened = MboxFolder::open(&path, AccessMode::ReadOnly).unwrap();
        assert_eq!(reopened.core.messages.len(), 3);
    }

    #[test]
    fn message_id_lookup_after_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, &["x"]);
        let folder = MboxFolder::open(&path, AccessMode::ReadOnly).unwrap();
        assert!(folder.message_id("<0@example.com>").is_some());
    }
}
