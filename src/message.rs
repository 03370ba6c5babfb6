/*
 * mailbox - message module.
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

//! Head + Body + per-folder metadata (labels, sequence, file-location,
//! unique-id). §4.5.

use crate::body::Body;
use crate::datetime::now;
use crate::error::Result;
use crate::field::Field;
use crate::head::Head;
use indexmap::IndexMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub type FolderHash = u64;

/// 64-bit key derived from a message's `Message-ID` (or, lacking one, its
/// raw bytes) — the arena index that binds folder location records, the
/// manager's dedup-by-Message-ID check, and thread-graph node keys.
pub type EnvelopeHash = u64;

pub fn hash_message_id(message_id: &str) -> EnvelopeHash {
    let mut hasher = DefaultHasher::new();
    message_id.hash(&mut hasher);
    hasher.finish()
}

pub fn hash_bytes(bytes: &[u8]) -> EnvelopeHash {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LabelValue {
    Bool(bool),
    Int(i64),
}

impl LabelValue {
    pub fn as_bool(self) -> bool {
        match self {
            LabelValue::Bool(b) => b,
            LabelValue::Int(n) => n != 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Message {
    pub head: Head,
    pub body: Body,
    pub labels: IndexMap<String, LabelValue>,
    pub sequence_nr: usize,
    pub folder_ref: Option<FolderHash>,
    pub unique_id: Option<String>,
    pub size_hint: Option<usize>,
    pub location: Option<(usize, usize)>,
    pub deleted_at: Option<crate::datetime::UnixTimestamp>,
    pub is_dummy: bool,
    /// Set whenever a label changes (e.g. a Maildir flag flip) that
    /// `head`/`body` alone wouldn't reflect.
    pub labels_modified: bool,
}

pub const STANDARD_LABELS: &[&str] = &["current", "seen", "flagged", "replied", "draft", "deleted"];

impl Message {
    /// Builds a message from caller-supplied fields and body text (§4.5
    /// `build`).
    pub fn build(fields: Vec<(&str, &str)>, data: &str) -> Result<Self> {
        let mut head = Head::new();
        for (name, body) in fields {
            head.add(Field::new(name, body, None)?);
        }
        let mut message = Message {
            head,
            body: Body::from_lines(crate::parser::split_lines(data)),
            ..Default::default()
        };
        message.head.clear_modified();
        message.body.meta.modified = false;
        Ok(message)
    }

    pub fn message_id(&self) -> Option<&str> {
        self.head.get("message-id", None).map(|f| f.body())
    }

    pub fn hash(&self) -> EnvelopeHash {
        match self.message_id() {
            Some(id) => hash_message_id(id),
            None => hash_bytes(self.head.print().as_bytes()),
        }
    }

    pub fn head(&self) -> &Head {
        &self.head
    }

    pub fn head_mut(&mut self) -> &mut Head {
        &mut self.head
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn body_set(&mut self, new_body: Body) {
        self.body = new_body;
        self.body.meta.modified = true;
    }

    pub fn is_modified(&self) -> bool {
        self.head.is_modified() || self.body.meta.modified || self.labels_modified
    }

    pub fn label(&mut self, name: &str, value: Option<LabelValue>) -> Option<LabelValue> {
        match value {
            Some(v) => {
                self.labels.insert(name.to_string(), v);
                self.labels_modified = true;
                Some(v)
            }
            None => self.labels.get(name).copied(),
        }
    }

    pub fn has_label(&self, name: &str) -> bool {
        self.labels
            .get(name)
            .map(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn deleted(&mut self, flag: Option<bool>) -> bool {
        match flag {
            Some(true) => {
                self.labels.insert("deleted".to_string(), LabelValue::Bool(true));
                self.deleted_at = Some(now());
                self.labels_modified = true;
                true
            }
            Some(false) => {
                self.labels.insert("deleted".to_string(), LabelValue::Bool(false));
                self.deleted_at = None;
                self.labels_modified = true;
                false
            }
            None => self.has_label("deleted"),
        }
    }

    pub fn delete(&mut self) {
        self.deleted(Some(true));
    }

    /// Clones this message detached from any folder (§3 Message
    /// invariant: a message belongs to at most one folder at a time).
    pub fn clone_detached(&self) -> Self {
        let mut copy = self.clone();
        copy.folder_ref = None;
        copy.unique_id = None;
        copy.location = None;
        copy
    }

    pub fn size(&self) -> usize {
        self.head.size() + self.body.size()
    }

    pub fn print(&self) -> String {
        format!("{}\r\n{}", self.head.print(), self.body.text())
    }

    /// Converts a message arriving from a different backend into the form
    /// expected by the target, per §9's coercion rules: always fully
    /// materializes the body first.
    pub fn coerce(&self, raw: Option<&[u8]>, target_kind: crate::folder::FolderKind) -> Result<Self> {
        let mut out = self.clone_detached();
        if let Some(raw) = raw {
            out.body.materialize(raw)?;
        }
        match target_kind {
            crate::folder::FolderKind::Mbox => {
                // Status flags become an mbox `Status`/`X-Status` header pair.
                let status = mbox_status_string(&out);
                if !status.is_empty() {
                    out.head.set("Status", &status);
                }
            }
            crate::folder::FolderKind::Maildir => {
                // An mbox `From ` envelope has no maildir equivalent; any
                // `Status`/`X-Status` headers are merged into labels then
                // the headers themselves are dropped.
                if let Some(status) = out.head.get("status", None).map(|f| f.body().to_string()) {
                    apply_mbox_status_to_labels(&mut out, &status);
                }
                out.head.remove("status");
                out.head.remove("x-status");
            }
            crate::folder::FolderKind::Mh => {}
        }
        Ok(out)
    }

    /// Default prelude/body/postlude construction for `forward`. Never
    /// reads the whole source body unless `quote` is set.
    pub fn forward(&self, quote: bool, prelude: Option<&str>) -> Result<Self> {
        let default_prelude = format!(
            "---- BEGIN forwarded message\nFrom: {}\nSubject: {}\nDate: {}\n\n",
            self.head.get("from", None).map(|f| f.body()).unwrap_or(""),
            self.head.get("subject", None).map(|f| f.body()).unwrap_or(""),
            self.head.get("date", None).map(|f| f.body()).unwrap_or(""),
        );
        let mut text = prelude.unwrap_or(&default_prelude).to_string();
        if quote {
            for line in self.body.text().lines() {
                text.push_str("> ");
                text.push_str(line);
                text.push('\n');
            }
        }
        let subject = format!(
            "Fwd: {}",
            self.head.get("subject", None).map(|f| f.body()).unwrap_or("")
        );
        Message::build(vec![("Subject", &subject)], &text)
    }

    /// Quoted reply construction, each body line prefixed with `> `.
    pub fn reply(&self, prelude: Option<&str>, postlude: Option<&str>) -> Result<Self> {
        let default_prelude = format!(
            "On {}, {} wrote:\n",
            self.head.get("date", None).map(|f| f.body()).unwrap_or(""),
            self.head.get("from", None).map(|f| f.body()).unwrap_or(""),
        );
        let mut text = prelude.unwrap_or(&default_prelude).to_string();
        for line in self.body.text().lines() {
            text.push_str("> ");
            text.push_str(line);
            text.push('\n');
        }
        if let Some(postlude) = postlude {
            text.push_str(postlude);
        }
        let subject = self.head.get("subject", None).map(|f| f.body()).unwrap_or("");
        let subject = if subject.to_ascii_lowercase().starts_with("re:") {
            subject.to_string()
        } else {
            format!("Re: {}", subject)
        };
        let in_reply_to = self.message_id().unwrap_or("").to_string();
        let mut fields = vec![("Subject", subject.as_str())];
        if !in_reply_to.is_empty() {
            fields.push(("In-Reply-To", in_reply_to.as_str()));
        }
        Message::build(fields, &text)
    }

    /// Bounce construction: a minimal envelope wrapping the original
    /// message unmodified, per the deterministic forward/reply/bounce
    /// contract of §4.5.
    pub fn bounce(&self, to: &str, raw: Option<&[u8]>) -> Result<Self> {
        let mut out = self.clone_detached();
        out.head.set("To", to);
        out.head.set("X-Bounced-From", out.head.get("from", None).map(|f| f.body()).unwrap_or("").to_string().as_str());
        if let Some(raw) = raw {
            out.body.materialize(raw)?;
        }
        Ok(out)
    }
}

fn mbox_status_string(message: &Message) -> String {
    let mut s = String::new();
    if message.has_label("seen") {
        s.push('R');
    }
    if message.has_label("replied") {
        s.push('A');
    }
    if message.has_label("flagged") {
        s.push('F');
    }
    s
}

fn apply_mbox_status_to_labels(message: &mut Message, status: &str) {
    for c in status.chars() {
        match c {
            'R' => {
                message.labels.insert("seen".to_string(), LabelValue::Bool(true));
            }
            'A' => {
                message.labels.insert("replied".to_string(), LabelValue::Bool(true));
            }
            'F' => {
                message.labels.insert("flagged".to_string(), LabelValue::Bool(true));
            }
            'D' => {
                message.labels.insert("draft".to_string(), LabelValue::Bool(true));
            }
            'T' => {
                message.labels.insert("deleted".to_string(), LabelValue::Bool(true));
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_hash() {
        let m = Message::build(vec![("Message-ID", "<abc@x>")], "body\n").unwrap();
        assert_eq!(m.message_id(), Some("<abc@x>"));
        assert_eq!(m.hash(), hash_message_id("<abc@x>"));
    }

    #[test]
    fn delete_sets_label_and_timestamp() {
        let mut m = Message::build(vec![], "x").unwrap();
        assert!(!m.deleted(None));
        m.delete();
        assert!(m.deleted(None));
        assert!(m.deleted_at.is_some());
    }

    #[test]
    fn clone_detached_drops_folder_linkage() {
        let mut m = Message::build(vec![], "x").unwrap();
        m.folder_ref = Some(42);
        m.unique_id = Some("7".into());
        let copy = m.clone_detached();
        assert!(copy.folder_ref.is_none());
        assert!(copy.unique_id.is_none());
    }

    #[test]
    fn reply_quotes_body_and_prefixes_subject() {
        let original = Message::build(
            vec![("Subject", "hello"), ("From", "a@b"), ("Message-ID", "<1@x>")],
            "line one\nline two\n",
        )
        .unwrap();
        let reply = original.reply(None, None).unwrap();
        assert_eq!(reply.head.get("subject", None).unwrap().body(), "Re: hello");
        assert!(reply.body.text().contains("> line one"));
        assert_eq!(reply.head.get("in-reply-to", None).unwrap().body(), "<1@x>");
    }

    #[test]
    fn coerce_maildir_to_mbox_emits_status_header() {
        let mut m = Message::build(vec![], "x").unwrap();
        m.labels.insert("seen".to_string(), LabelValue::Bool(true));
        let coerced = m.coerce(None, crate::folder::FolderKind::Mbox).unwrap();
        assert_eq!(coerced.head.get("status", None).unwrap().body(), "R");
    }
}
