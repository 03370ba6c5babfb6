/*
 * mailbox - thread reconstruction module.
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

//! Cross-folder reply-tree reconstruction from `Message-ID`/`In-Reply-To`/
//! `References`, with dummy placeholders for messages not yet seen and a
//! backward scan-back protocol to fill them in. §4.11.

use crate::folder::{Folder, Selector};
use crate::message::{EnvelopeHash, FolderHash};
use indexmap::IndexMap;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Quality {
    Guess,
    Reference,
    Reply,
}

#[derive(Debug, Clone)]
pub struct ThreadNode {
    pub message_id: String,
    pub instances: Vec<(FolderHash, EnvelopeHash)>,
    pub parent: Option<String>,
    pub parent_quality: Option<Quality>,
    pub children: Vec<String>,
    pub subject: String,
    pub date: i64,
}

impl ThreadNode {
    fn new(message_id: &str) -> Self {
        ThreadNode {
            message_id: message_id.to_string(),
            instances: Vec::new(),
            parent: None,
            parent_quality: None,
            children: Vec::new(),
            subject: String::new(),
            date: 0,
        }
    }

    /// §3: dummy iff it has no surviving instance, or every instance is
    /// itself a placeholder.
    pub fn is_dummy(&self) -> bool {
        self.instances.is_empty()
    }
}

#[derive(Default)]
pub struct ThreadManager {
    nodes: IndexMap<String, ThreadNode>,
    /// Earliest message-id seen per normalized subject, for GUESS linking.
    subject_index: IndexMap<String, String>,
}

fn normalize_subject(subject: &str) -> String {
    let mut s = subject.trim();
    loop {
        let lower = s.to_ascii_lowercase();
        if let Some(rest) = lower.strip_prefix("re:") {
            s = s[s.len() - rest.len()..].trim_start();
        } else if let Some(rest) = lower.strip_prefix("fwd:") {
            s = s[s.len() - rest.len()..].trim_start();
        } else {
            break;
        }
    }
    s.to_ascii_lowercase()
}

impl ThreadManager {
    pub fn new() -> Self {
        ThreadManager::default()
    }

    fn ensure_node(&mut self, message_id: &str) -> &mut ThreadNode {
        self.nodes
            .entry(message_id.to_string())
            .or_insert_with(|| ThreadNode::new(message_id))
    }

    /// Links `child` under `parent`, honoring REPLY > REFERENCE > GUESS
    /// precedence: a parent is only replaced by a strictly higher-quality
    /// edge, and self-parenting is ignored to keep the graph acyclic.
    fn link(&mut self, child: &str, parent: &str, quality: Quality) {
        if child == parent {
            return;
        }
        // Refuse to introduce a cycle: if `child` is already an ancestor
        // of `parent`, linking parent under child would loop.
        let mut cursor = Some(parent.to_string());
        let mut hops = 0;
        while let Some(id) = cursor {
            if id == child {
                return;
            }
            cursor = self.nodes.get(&id).and_then(|n| n.parent.clone());
            hops += 1;
            if hops > 10_000 {
                return;
            }
        }
        self.ensure_node(parent);
        self.ensure_node(child);
        let replace = match self.nodes[child].parent_quality {
            None => true,
            Some(existing) => quality > existing,
        };
        if replace {
            self.nodes.get_mut(child).unwrap().parent = Some(parent.to_string());
            self.nodes.get_mut(child).unwrap().parent_quality = Some(quality);
        }
        let parent_node = self.nodes.get_mut(parent).unwrap();
        if !parent_node.children.iter().any(|c| c == child) {
            parent_node.children.push(child.to_string());
        }
    }

    /// Folds every message currently loaded in `folder` into the graph.
    pub fn add_folder(&mut self, folder: &dyn Folder) {
        let folder_hash = crate::folder::hash_name(folder.name());
        let messages = folder.messages(Selector::All);
        for message in &messages {
            let msgid = match message.message_id() {
                Some(id) => id.to_string(),
                None => continue,
            };
            let subject = message
                .head()
                .get("subject", None)
                .map(|f| f.body().to_string())
                .unwrap_or_default();
            let date = message.head().guess_timestamp().unwrap_or(0);
            {
                let node = self.ensure_node(&msgid);
                node.instances.push((folder_hash, message.hash()));
                node.subject = subject.clone();
                node.date = date;
            }

            if let Some(in_reply_to) = message.head().get("in-reply-to", None) {
                if let Some(parent_id) = extract_first_msgid(in_reply_to.body()) {
                    self.link(&msgid, &parent_id, Quality::Reply);
                    continue;
                }
            }
            if let Some(references) = message.head().get("references", None) {
                let chain = extract_all_msgids(references.body());
                if !chain.is_empty() {
                    for pair in chain.windows(2) {
                        self.link(&pair[1], &pair[0], Quality::Reference);
                    }
                    self.link(&msgid, chain.last().unwrap(), Quality::Reference);
                    continue;
                }
            }

            let normalized = normalize_subject(&subject);
            if normalized.is_empty() {
                continue;
            }
            match self.subject_index.get(&normalized).cloned() {
                Some(earlier) if earlier != msgid => self.link(&msgid, &earlier, Quality::Guess),
                Some(_) => {}
                None => {
                    self.subject_index.insert(normalized, msgid.clone());
                }
            }
        }
    }

    /// Finds `message_id`'s node and walks up to its thread root.
    pub fn thread(&self, message_id: &str) -> Option<&ThreadNode> {
        let mut current = self.nodes.get(message_id)?;
        while let Some(parent_id) = &current.parent {
            current = self.nodes.get(parent_id)?;
        }
        Some(current)
    }

    /// Recursively collects the message-ids of every dummy node reachable
    /// from `root_id`'s subtree.
    pub fn collect_dummies(&self, root_id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![root_id.to_string()];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get(&id) {
                if node.is_dummy() {
                    out.push(id.clone());
                }
                stack.extend(node.children.iter().cloned());
            }
        }
        out
    }

    /// Backward scan of `folder`'s already-loaded messages (local backends
    /// keep headers resident; there is no separate delayed-header tier to
    /// page in), starting at `start_id`, looking for `missing_ids`. Stops
    /// once every id is found, the optional timestamp window is exceeded,
    /// or the optional count window is exhausted (`None` means unbounded —
    /// the `ALL` count window of §4.11).
    pub fn scan_for_messages(
        &mut self,
        folder: &dyn Folder,
        start_id: &str,
        missing_ids: &HashSet<String>,
        timestamp_window: Option<i64>,
        count_window: Option<usize>,
    ) {
        let messages = folder.messages(Selector::All);
        let Some(start_idx) = messages.iter().position(|m| m.message_id() == Some(start_id)) else {
            return;
        };
        let start_date = messages[start_idx].head().guess_timestamp().unwrap_or(0);
        let mut still_missing: HashSet<&str> = missing_ids.iter().map(|s| s.as_str()).collect();
        let mut scanned = 0usize;

        for message in messages[..start_idx].iter().rev() {
            if still_missing.is_empty() {
                break;
            }
            if let Some(limit) = count_window {
                if scanned >= limit {
                    break;
                }
            }
            scanned += 1;
            let date = message.head().guess_timestamp().unwrap_or(start_date);
            if let Some(window) = timestamp_window {
                if (start_date - date).abs() > window {
                    break;
                }
            }
            if let Some(msgid) = message.message_id() {
                if still_missing.remove(msgid) {
                    self.add_folder(folder);
                }
            }
        }
    }

    /// Already-threaded roots, without triggering a scan-back.
    pub fn known(&self) -> Vec<&ThreadNode> {
        self.nodes.values().filter(|n| n.parent.is_none()).collect()
    }

    /// Forces a full backward scan of `folders` to resolve every
    /// reachable dummy before returning the root set.
    pub fn all(&mut self, folders: &[&dyn Folder]) -> Vec<String> {
        let roots: Vec<String> = self
            .nodes
            .values()
            .filter(|n| n.parent.is_none())
            .map(|n| n.message_id.clone())
            .collect();
        for root in &roots {
            let dummies = self.collect_dummies(root);
            if dummies.is_empty() {
                continue;
            }
            let missing: HashSet<String> = dummies.into_iter().collect();
            for folder in folders {
                self.scan_for_messages(*folder, root, &missing, None, None);
            }
        }
        roots
    }
}

fn extract_first_msgid(body: &str) -> Option<String> {
    extract_all_msgids(body).into_iter().next()
}

fn extract_all_msgids(body: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find('<') {
        let after = &rest[start..];
        if let Some(end) = after.find('>') {
            out.push(after[..end + 1].to_string());
            rest = &after[end + 1..];
        } else {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::folder::{AccessMode, FolderCore, FolderKind, Organization};
    use crate::message::Message;

    struct FakeFolder(FolderCore);
    impl Folder for FakeFolder {
        fn core(&self) -> &FolderCore {
            &self.0
        }
        fn core_mut(&mut self) -> &mut FolderCore {
            &mut self.0
        }
        fn kind(&self) -> FolderKind {
            FolderKind::Mbox
        }
        fn organization(&self) -> Organization {
            Organization::File
        }
        fn read_messages(&mut self) -> crate::error::Result<()> {
            Ok(())
        }
        fn write(&mut self, _policy: crate::folder::WritePolicy) -> crate::error::Result<bool> {
            Ok(false)
        }
        fn delete(&mut self) -> crate::error::Result<()> {
            Ok(())
        }
    }

    fn folder_with(messages: Vec<Message>) -> FakeFolder {
        let mut core = FolderCore::new("t".into(), AccessMode::ReadWrite);
        for m in messages {
            core.add_message(m).unwrap();
        }
        FakeFolder(core)
    }

    #[test]
    fn reply_edge_wins_over_reference_and_guess() {
        let root = Message::build(vec![("Message-ID", "<1@x>"), ("Subject", "hi")], "a").unwrap();
        let reply = Message::build(
            vec![
                ("Message-ID", "<2@x>"),
                ("In-Reply-To", "<1@x>"),
                ("References", "<1@x>"),
                ("Subject", "Re: hi"),
            ],
            "b",
        )
        .unwrap();
        let folder = folder_with(vec![root, reply]);
        let mut tm = ThreadManager::new();
        tm.add_folder(&folder);
        let node = tm.thread("<2@x>").unwrap();
        assert_eq!(node.message_id, "<1@x>");
    }

    #[test]
    fn missing_parent_creates_dummy_node() {
        let reply = Message::build(
            vec![("Message-ID", "<2@x>"), ("In-Reply-To", "<missing@x>")],
            "b",
        )
        .unwrap();
        let folder = folder_with(vec![reply]);
        let mut tm = ThreadManager::new();
        tm.add_folder(&folder);
        let dummies = tm.collect_dummies("<missing@x>");
        assert_eq!(dummies, vec!["<missing@x>".to_string()]);
    }

    #[test]
    fn subject_guess_links_unrelated_messages() {
        let a = Message::build(vec![("Message-ID", "<1@x>"), ("Subject", "weekly sync")], "a").unwrap();
        let b = Message::build(vec![("Message-ID", "<2@x>"), ("Subject", "Re: weekly sync")], "b").unwrap();
        let folder = folder_with(vec![a, b]);
        let mut tm = ThreadManager::new();
        tm.add_folder(&folder);
        let node = tm.thread("<2@x>").unwrap();
        assert_eq!(node.message_id, "<1@x>");
    }
}
