/*
 * mailbox - folder module.
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

//! Message container contract: open/read/write/append/close; name/id
//! lookup; label queries; sub-folder enumeration. §4.6, with concrete
//! backends in `mbox`, `mh`, `maildir`.

#[cfg(feature = "maildir_backend")]
pub mod maildir;
#[cfg(feature = "mbox_backend")]
pub mod mbox;
#[cfg(feature = "mh_backend")]
pub mod mh;

use crate::error::{Error, ErrorKind, Result};
use crate::logging::{self, Level, Reporter};
use crate::message::{EnvelopeHash, Message};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FolderKind {
    Mbox,
    Mh,
    Maildir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    AppendOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Organization {
    File,
    Directory,
    Remote,
}

/// `close(policy)` write policy, §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClosePolicy {
    Always,
    Never,
    #[default]
    Modified,
}

/// `messages(selector)` grammar, §4.6.
pub enum Selector<'a> {
    All,
    Active,
    Deleted,
    /// An inclusive `(begin, end)` range; negative indices count from the
    /// end, as in `messages[-3..]`.
    Range(isize, isize),
    Label(&'a str),
    NotLabel(&'a str),
    Predicate(Box<dyn Fn(&Message) -> bool + 'a>),
}

fn resolve_index(idx: isize, len: usize) -> usize {
    if idx < 0 {
        (len as isize + idx).max(0) as usize
    } else {
        (idx as usize).min(len)
    }
}

fn selector_matches(sel: &Selector, m: &Message, idx: usize, len: usize) -> bool {
    match sel {
        Selector::All => true,
        Selector::Active => !m.has_label("deleted"),
        Selector::Deleted => m.has_label("deleted"),
        Selector::Range(b, e) => {
            let b = resolve_index(*b, len);
            let e = resolve_index(*e, len);
            idx >= b && idx <= e.min(len.saturating_sub(1))
        }
        Selector::Label(name) => m.has_label(name),
        Selector::NotLabel(name) => !m.has_label(name),
        Selector::Predicate(f) => f(m),
    }
}

/// `write(opts)` — how unmodified vs. modified spans should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritePolicy {
    Replace,
    Inplace,
    #[default]
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSeparator {
    Lf,
    Cr,
    CrLf,
}

impl LineSeparator {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            LineSeparator::Lf => b"\n",
            LineSeparator::Cr => b"\r",
            LineSeparator::CrLf => b"\r\n",
        }
    }
}

impl Default for LineSeparator {
    fn default() -> Self {
        LineSeparator::Lf
    }
}

/// Shared bookkeeping every concrete backend embeds: the message arena,
/// per-folder flags, and the `Message-ID -> index` dedup index (§3
/// Folder invariants). Concrete backends delegate the trait-default
/// methods below to this core via `FolderCore`'s accessors.
#[derive(Debug)]
pub struct FolderCore {
    pub name: String,
    pub access_mode: AccessMode,
    pub messages: Vec<Message>,
    pub msgid_index: std::collections::HashMap<EnvelopeHash, usize>,
    pub modified_count: usize,
    pub keep_duplicates: bool,
    pub wrap_length: usize,
    pub remove_when_empty: bool,
    pub save_on_exit: bool,
    pub is_closed: bool,
    pub reporter: Arc<dyn Reporter>,
}

impl FolderCore {
    pub fn new(name: String, access_mode: AccessMode) -> Self {
        FolderCore {
            name,
            access_mode,
            messages: Vec::new(),
            msgid_index: std::collections::HashMap::new(),
            modified_count: 0,
            keep_duplicates: false,
            wrap_length: 78,
            remove_when_empty: false,
            save_on_exit: true,
            is_closed: false,
            reporter: logging::default_reporter(),
        }
    }

    /// Appends a message, rejecting one that already belongs to another
    /// folder and deduplicating by `Message-ID` unless `keep_duplicates`.
    pub fn add_message(&mut self, mut message: Message) -> Result<()> {
        if message.folder_ref.is_some() {
            return Err(Error::new(
                ErrorKind::CoerceError,
                "message already belongs to another folder",
            ));
        }
        let hash = message.hash();
        if !self.keep_duplicates && self.msgid_index.contains_key(&hash) {
            return Ok(());
        }
        message.sequence_nr = self.messages.len();
        message.folder_ref = Some(hash_name(&self.name));
        self.msgid_index.insert(hash, self.messages.len());
        self.messages.push(message);
        self.modified_count += 1;
        Ok(())
    }

    pub fn message(&self, i: usize) -> Option<&Message> {
        self.messages.get(i)
    }

    pub fn message_by_id(&self, msgid: &str) -> Option<&Message> {
        let hash = crate::message::hash_message_id(msgid);
        self.msgid_index.get(&hash).and_then(|&i| self.messages.get(i))
    }

    pub fn select<'a>(&'a self, selector: &Selector) -> Vec<&'a Message> {
        let len = self.messages.len();
        self.messages
            .iter()
            .enumerate()
            .filter(|(i, m)| selector_matches(selector, m, *i, len))
            .map(|(_, m)| m)
            .collect()
    }

    /// A folder is modified iff any message is modified, any message is
    /// deleted, or messages were added after open (§4.6 "Modified flag").
    pub fn is_modified(&self) -> bool {
        self.modified_count > 0 || self.messages.iter().any(|m| m.is_modified() || m.has_label("deleted"))
    }

    pub fn report(&self, level: Level, message: &str) {
        self.reporter.report(level, &self.name, message);
    }
}

pub fn hash_name(name: &str) -> u64 {
    crate::message::hash_bytes(name.as_bytes())
}

/// The abstract contract every concrete backend (`MboxFolder`, `MhFolder`,
/// `MaildirFolder`) implements. Default methods cover the
/// backend-agnostic operations named in §9's "Inheritance across folder
/// backends" design note (selector filtering, modified propagation,
/// copyTo) in terms of the two required `core`/`core_mut` accessors.
pub trait Folder {
    fn core(&self) -> &FolderCore;
    fn core_mut(&mut self) -> &mut FolderCore;
    fn kind(&self) -> FolderKind;
    fn organization(&self) -> Organization;

    /// Re-reads the on-disk representation into `core_mut().messages`.
    fn read_messages(&mut self) -> Result<()>;

    /// Serializes modified/new messages and persists them, per the
    /// backend's write-policy. Returns whether a write actually happened.
    fn write(&mut self, policy: WritePolicy) -> Result<bool>;

    fn list_sub_folders(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        &self.core().name
    }

    fn access_mode(&self) -> AccessMode {
        self.core().access_mode
    }

    fn is_modified(&self) -> bool {
        self.core().is_modified()
    }

    fn message(&self, i: usize) -> Option<&Message> {
        self.core().message(i)
    }

    fn message_id(&self, msgid: &str) -> Option<&Message> {
        self.core().message_by_id(msgid)
    }

    /// Forces a back-scan into delayed messages if a plain index lookup
    /// misses (§4.6 `find`). The base implementation has no delayed tier
    /// to scan (all messages are already resident), so it degrades to
    /// `message_id`; backends with a lazy tier override this.
    fn find(&mut self, msgid: &str) -> Result<Option<&Message>> {
        Ok(self.core().message_by_id(msgid))
    }

    fn messages(&self, selector: Selector) -> Vec<&Message> {
        self.core().select(&selector)
    }

    fn add_message(&mut self, message: Message) -> Result<()> {
        if self.access_mode() == AccessMode::ReadOnly {
            return Err(Error::new(ErrorKind::AccessDenied, "folder is read-only"));
        }
        self.core_mut().add_message(message)
    }

    /// `close(policy)` — see §4.6 "Close protocol".
    fn close(&mut self, policy: ClosePolicy) -> Result<()> {
        let should_write = match policy {
            ClosePolicy::Always => true,
            ClosePolicy::Never => false,
            ClosePolicy::Modified => self.is_modified(),
        };
        if should_write {
            if self.access_mode() == AccessMode::ReadOnly {
                self.core().report(Level::Warning, "refused write on read-only folder at close");
                return Err(Error::new(
                    ErrorKind::AccessDenied,
                    "cannot write read-only folder on close",
                ));
            }
            self.write(WritePolicy::Default)?;
        }
        self.core_mut().is_closed = true;
        Ok(())
    }

    fn delete(&mut self) -> Result<()>;

    /// Clones `message` into `other`, coercing across backend kinds if
    /// their `FolderKind`s differ (§9 "Coercion on addMessage").
    fn copy_to(&mut self, other: &mut dyn Folder, message_idx: usize, raw: Option<&[u8]>) -> Result<()> {
        let kind = other.kind();
        let source_kind = self.kind();
        let message = self
            .core()
            .message(message_idx)
            .ok_or_else(|| Error::new(ErrorKind::FolderMissing, "no such message index"))?;
        let coerced = if kind == source_kind {
            message.clone_detached()
        } else {
            message.coerce(raw, kind)?
        };
        other.add_message(coerced)
    }
}

/// Shared location-tracking helper: computes the delta a message's
/// `location` should shift by after a REPLACE write, per §4.7.
pub fn location_delta(old_begin: usize, new_begin: usize) -> isize {
    new_begin as isize - old_begin as isize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    fn msg_with_label(label: &str) -> Message {
        let mut m = Message::build(vec![], "x").unwrap();
        m.labels.insert(label.to_string(), crate::message::LabelValue::Bool(true));
        m
    }

    #[test]
    fn selector_active_excludes_deleted() {
        let mut core = FolderCore::new("t".into(), AccessMode::ReadWrite);
        core.add_message(msg_with_label("seen")).unwrap();
        core.add_message(msg_with_label("deleted")).unwrap();
        assert_eq!(core.select(&Selector::Active).len(), 1);
        assert_eq!(core.select(&Selector::Deleted).len(), 1);
        assert_eq!(core.select(&Selector::All).len(), 2);
    }

    #[test]
    fn dedup_by_message_id_unless_keep_duplicates() {
        let mut core = FolderCore::new("t".into(), AccessMode::ReadWrite);
        let m1 = Message::build(vec![("Message-ID", "<a@b>")], "x").unwrap();
        let m2 = Message::build(vec![("Message-ID", "<a@b>")], "y").unwrap();
        core.add_message(m1).unwrap();
        core.add_message(m2).unwrap();
        assert_eq!(core.messages.len(), 1);

        core.keep_duplicates = true;
        let m3 = Message::build(vec![("Message-ID", "<a@b>")], "z").unwrap();
        core.add_message(m3).unwrap();
        assert_eq!(core.messages.len(), 2);
    }

    #[test]
    fn range_selector_supports_negative_indices() {
        let mut core = FolderCore::new("t".into(), AccessMode::ReadWrite);
        for i in 0..5 {
            core.add_message(Message::build(vec![("X-N", &i.to_string())], "x").unwrap())
                .unwrap();
        }
        let last_two = core.select(&Selector::Range(-2, -1));
        assert_eq!(last_two.len(), 2);
    }
}
