/*
 * mailbox - head module.
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

//! Ordered multimap of header fields with case-insensitive lookup,
//! duplicate preservation, wrap-length policy, byte-range record. §4.2.

use crate::datetime::now;
use crate::field::Field;
use indexmap::IndexMap;
use uuid::Uuid;

const DEFAULT_WRAP_LENGTH: usize = 78;

#[derive(Debug, Clone, Default)]
pub struct Head {
    fields_by_lower: IndexMap<String, Vec<Field>>,
    order: Vec<String>,
    wrap_length: usize,
    begin_offset: Option<usize>,
    end_offset: Option<usize>,
    modified: bool,
}

impl Head {
    pub fn new() -> Self {
        Head {
            wrap_length: DEFAULT_WRAP_LENGTH,
            ..Default::default()
        }
    }

    pub fn with_location(begin: usize, end: usize) -> Self {
        let mut h = Self::new();
        h.begin_offset = Some(begin);
        h.end_offset = Some(end);
        h
    }

    pub fn location(&self) -> Option<(usize, usize)> {
        match (self.begin_offset, self.end_offset) {
            (Some(b), Some(e)) => Some((b, e)),
            _ => None,
        }
    }

    pub fn set_location(&mut self, begin: usize, end: usize) {
        self.begin_offset = Some(begin);
        self.end_offset = Some(end);
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn clear_modified(&mut self) {
        self.modified = false;
    }

    /// Appends a field, preserving duplicate-insertion order for its name.
    pub fn add(&mut self, field: Field) {
        let name = field.name().to_string();
        if !self.fields_by_lower.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.fields_by_lower.entry(name).or_default().push(field);
        self.modified = true;
    }

    /// Replaces all values for `name` with a single field built from the
    /// given body, preserving the name's slot position in `order`.
    pub fn set(&mut self, name: &str, body: &str) {
        let field = Field::new(name, body, None).expect("valid header name");
        self.reset(name, vec![field]);
    }

    /// Replaces all values for `name` with the given fields, preserving
    /// `name`'s existing slot in `order` if present.
    pub fn reset(&mut self, name: &str, fields: Vec<Field>) {
        let lower = name.to_ascii_lowercase();
        if !self.fields_by_lower.contains_key(&lower) {
            self.order.push(lower.clone());
        }
        self.fields_by_lower.insert(lower, fields);
        self.modified = true;
    }

    pub fn remove(&mut self, name: &str) {
        let lower = name.to_ascii_lowercase();
        if self.fields_by_lower.remove(&lower).is_some() {
            self.order.retain(|n| n != &lower);
            self.modified = true;
        }
    }

    /// Returns the `i`-th duplicate for `name`, or the first if `i` is
    /// `None`.
    pub fn get(&self, name: &str, i: Option<usize>) -> Option<&Field> {
        let lower = name.to_ascii_lowercase();
        self.fields_by_lower
            .get(&lower)
            .and_then(|v| v.get(i.unwrap_or(0)))
    }

    pub fn get_all(&self, name: &str) -> &[Field] {
        let lower = name.to_ascii_lowercase();
        self.fields_by_lower
            .get(&lower)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn count(&self, name: &str) -> usize {
        self.get_all(name).len()
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn known_names(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter(|n| crate::field::is_structured(n))
            .map(|s| s.as_str())
            .collect()
    }

    pub fn grep_names(&self, pattern: &str) -> Vec<&str> {
        let pattern = pattern.to_ascii_lowercase();
        self.order
            .iter()
            .filter(|n| n.contains(&pattern))
            .map(|s| s.as_str())
            .collect()
    }

    /// Clones this header, optionally keeping only fields whose name
    /// passes `filter`.
    pub fn clone_filtered<F: Fn(&str) -> bool>(&self, filter: Option<F>) -> Self {
        match filter {
            None => self.clone(),
            Some(f) => {
                let mut out = Head::new();
                out.wrap_length = self.wrap_length;
                for name in &self.order {
                    if f(name) {
                        for field in &self.fields_by_lower[name] {
                            out.add(field.clone());
                        }
                    }
                }
                out.modified = false;
                out
            }
        }
    }

    pub fn lines(&self) -> Vec<String> {
        let mut out = Vec::new();
        for name in &self.order {
            for field in &self.fields_by_lower[name] {
                out.extend(field.to_string(Some(self.wrap_length)));
            }
        }
        out
    }

    pub fn print(&self) -> String {
        let mut s = self.lines().join("\r\n");
        if !s.is_empty() {
            s.push_str("\r\n");
        }
        s
    }

    pub fn size(&self) -> usize {
        self.print().len()
    }

    pub fn is_multipart(&self) -> bool {
        self.get("content-type", None)
            .map(|f| f.body().to_ascii_lowercase().starts_with("multipart/"))
            .unwrap_or(false)
    }

    pub fn guess_body_size(&self) -> Option<usize> {
        self.get("content-length", None).and_then(|f| f.to_int().ok()).map(|n| n as usize)
    }

    pub fn guess_timestamp(&self) -> Option<crate::datetime::UnixTimestamp> {
        self.get("date", None).and_then(|f| f.to_date().ok())
    }

    /// Synthesizes a `Message-ID` in the conventional `<uuid@localhost>`
    /// shape; does not insert it.
    pub fn create_message_id(&self) -> String {
        format!("<{}.{}@localhost>", now(), Uuid::new_v4())
    }

    /// Returns the ordered list of Resent-groups, most recent first. Each
    /// group is the run of `Resent-*` fields followed by a trailing
    /// `Received` anchor (§4.2 "Resent-group semantics").
    pub fn resent_groups(&self) -> Vec<Vec<Field>> {
        let mut groups = Vec::new();
        let mut current: Vec<Field> = Vec::new();
        for name in &self.order {
            if name.starts_with("resent-") {
                for field in &self.fields_by_lower[name] {
                    current.push(field.clone());
                }
            } else if name == "received" && !current.is_empty() {
                for field in &self.fields_by_lower[name] {
                    current.push(field.clone());
                }
                groups.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            groups.push(current);
        }
        groups
    }

    /// Injects a new Resent-group above earlier ones (i.e. at the front of
    /// the logical order for iteration via `resent_groups`); physically
    /// this just adds the fields, since `resent_groups` scans in document
    /// order and the newest group is conventionally prepended by the
    /// caller writing it first in the serialized header.
    pub fn add_resent_group(&mut self, fields: Vec<Field>) {
        for field in fields.into_iter().rev() {
            self.prepend(field);
        }
    }

    fn prepend(&mut self, field: Field) {
        let name = field.name().to_string();
        if !self.fields_by_lower.contains_key(&name) {
            self.order.insert(0, name.clone());
        }
        self.fields_by_lower.entry(name).or_default().insert(0, field);
        self.modified = true;
    }

    pub fn remove_resent_groups(&mut self) {
        self.order.retain(|n| {
            let keep = !n.starts_with("resent-");
            if !keep {
                self.fields_by_lower.shift_remove(n);
            }
            keep
        });
        self.modified = true;
    }

    pub fn set_wrap_length(&mut self, wrap: usize) {
        self.wrap_length = wrap;
    }

    pub fn wrap_length(&self) -> usize {
        self.wrap_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, body: &str) -> Field {
        Field::new(name, body, None).unwrap()
    }

    #[test]
    fn duplicate_preservation_and_indexed_get() {
        let mut h = Head::new();
        h.add(field("Received", "from a"));
        h.add(field("Received", "from b"));
        assert_eq!(h.count("received"), 2);
        assert_eq!(h.get("received", Some(0)).unwrap().body(), "from a");
        assert_eq!(h.get("received", Some(1)).unwrap().body(), "from b");
    }

    #[test]
    fn set_replaces_in_place() {
        let mut h = Head::new();
        h.add(field("Subject", "one"));
        h.add(field("To", "a@b"));
        h.set("Subject", "two");
        assert_eq!(h.names(), &["subject".to_string(), "to".to_string()]);
        assert_eq!(h.get("subject", None).unwrap().body(), "two");
    }

    #[test]
    fn resent_groups_collects_resent_plus_received() {
        let mut h = Head::new();
        h.add(field("Resent-From", "a@b"));
        h.add(field("Resent-To", "c@d"));
        h.add(field("Received", "by x"));
        h.add(field("Subject", "hi"));
        let groups = h.resent_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 3);
    }

    #[test]
    fn remove_resent_groups_drops_all() {
        let mut h = Head::new();
        h.add(field("Resent-From", "a@b"));
        h.add(field("Subject", "hi"));
        h.remove_resent_groups();
        assert_eq!(h.count("resent-from"), 0);
        assert_eq!(h.count("subject"), 1);
    }

    #[test]
    fn is_multipart_detects_content_type() {
        let mut h = Head::new();
        h.add(field("Content-Type", "multipart/mixed"));
        assert!(h.is_multipart());
    }
}
