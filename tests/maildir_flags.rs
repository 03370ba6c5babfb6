//! Maildir integration coverage for §8 scenario 4.

use mailbox::folder::maildir::MaildirFolder;
use mailbox::folder::{AccessMode, ClosePolicy};
use mailbox::message::LabelValue;
use mailbox::Folder;
use std::fs;

#[test]
fn label_flag_mapping_and_rename_on_flag_change() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("inbox");
    MaildirFolder::create(&path).unwrap();
    fs::write(
        path.join("cur").join("110000013.l.43:2,FRS"),
        b"Subject: hi\r\nMessage-ID: <1@x>\r\n\r\nbody\r\n",
    )
    .unwrap();

    let mut folder = MaildirFolder::open(&path, AccessMode::ReadWrite).unwrap();
    let m = &folder.core().messages[0];
    assert!(m.has_label("flagged"));
    assert!(m.has_label("replied"));
    assert!(m.has_label("seen"));
    assert!(!m.has_label("draft"));
    assert!(!m.has_label("deleted"));

    folder.core_mut().messages[0].label("flagged", Some(LabelValue::Bool(false)));
    folder.close(ClosePolicy::Modified).unwrap();

    let entries: Vec<_> = fs::read_dir(path.join("cur")).unwrap().map(|e| e.unwrap().file_name()).collect();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].to_string_lossy().ends_with(":2,RS"));

    let reopened = MaildirFolder::open(&path, AccessMode::ReadOnly).unwrap();
    let m = &reopened.core().messages[0];
    assert!(!m.has_label("flagged"));
    assert!(m.has_label("seen"));
}
