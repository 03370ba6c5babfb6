//! Mbox integration coverage for §8 scenarios 1 and 2.

use mailbox::folder::mbox::MboxFolder;
use mailbox::folder::{AccessMode, ClosePolicy, Selector, WritePolicy};
use mailbox::Folder;
use std::fs;
use std::io::Write;

fn fixture(dir: &tempfile::TempDir, count: usize) -> std::path::PathBuf {
    let path = dir.path().join("mbox.src");
    let mut f = fs::File::create(&path).unwrap();
    for i in 0..count {
        writeln!(f, "From user{} Mon Jan  1 00:00:00 1996", i).unwrap();
        writeln!(f, "Subject: msg {}", i).unwrap();
        writeln!(f, "Message-ID: <{}@example.com>", i).unwrap();
        writeln!(f).unwrap();
        writeln!(f, "body {}", i).unwrap();
    }
    path
}

#[test]
fn read_delete_close_never_round_trips_full_count() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(&dir, 45);

    let mut folder = MboxFolder::open(&path, AccessMode::ReadWrite).unwrap();
    assert_eq!(folder.messages(Selector::All).len(), 45);
    for idx in [2, 6, 8] {
        folder.core_mut().messages[idx].delete();
    }
    assert_eq!(folder.messages(Selector::Active).len(), 42);
    assert_eq!(folder.messages(Selector::Deleted).len(), 3);

    folder.close(ClosePolicy::Never).unwrap();

    let reopened = MboxFolder::open(&path, AccessMode::ReadOnly).unwrap();
    assert_eq!(reopened.messages(Selector::All).len(), 45);
}

#[test]
fn replace_write_keeps_messages_contiguous() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(&dir, 10);

    let mut folder = MboxFolder::open(&path, AccessMode::ReadWrite).unwrap();
    // Mark modified without editing content.
    folder.core_mut().messages[0].head.set("Subject", "msg 0");
    folder.write(WritePolicy::Replace).unwrap();

    let reopened = MboxFolder::open(&path, AccessMode::ReadOnly).unwrap();
    assert_eq!(reopened.messages(Selector::All).len(), 10);
    let locations: Vec<(usize, usize)> = reopened
        .messages(Selector::All)
        .iter()
        .map(|m| m.location.unwrap())
        .collect();
    for pair in locations.windows(2) {
        let (_, prev_end) = pair[0];
        let (next_begin, _) = pair[1];
        assert!(next_begin >= prev_end);
    }
}
