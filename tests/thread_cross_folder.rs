//! Thread reconstruction across folders for §8 scenario 3.

use mailbox::conf::FolderConfig;
use mailbox::folder::{AccessMode, Selector};
use mailbox::manager::Manager;
use std::fs;
use std::io::Write;

fn write_mbox(path: &std::path::Path, messages: &[(&str, &str, &str)]) {
    let mut f = fs::File::create(path).unwrap();
    for (i, (msgid, in_reply_to, subject)) in messages.iter().enumerate() {
        writeln!(f, "From user{} Mon Jan  1 00:00:0{} 1996", i, i).unwrap();
        writeln!(f, "Subject: {}", subject).unwrap();
        writeln!(f, "Message-ID: {}", msgid).unwrap();
        if !in_reply_to.is_empty() {
            writeln!(f, "In-Reply-To: {}", in_reply_to).unwrap();
        }
        writeln!(f).unwrap();
        writeln!(f, "body").unwrap();
    }
}

#[test]
fn cross_folder_thread_has_no_dummy_for_known_ids() {
    let dir = tempfile::tempdir().unwrap();

    let inbox_path = dir.path().join("inbox");
    write_mbox(&inbox_path, &[("<1@x>", "", "root"), ("<2@x>", "<1@x>", "Re: root")]);

    let sent_path = dir.path().join("sent");
    write_mbox(&sent_path, &[("<3@x>", "<2@x>", "Re: root")]);

    let mut manager = Manager::new();
    let inbox_id = manager
        .open(&FolderConfig { path: inbox_path, ..Default::default() }, AccessMode::ReadOnly, false)
        .unwrap();
    let sent_id = manager
        .open(&FolderConfig { path: sent_path, ..Default::default() }, AccessMode::ReadOnly, false)
        .unwrap();

    manager.rebuild_threads();

    let mut known_ids = std::collections::HashSet::new();
    for id in [inbox_id, sent_id] {
        let folder = manager.folder(id).unwrap();
        for message in folder.messages(Selector::All) {
            if let Some(msgid) = message.message_id() {
                known_ids.insert(msgid.to_string());
            }
        }
    }

    let root = manager.threads().thread("<3@x>").expect("thread root for <3@x>");
    assert_eq!(root.message_id, "<1@x>");

    let dummies = manager.threads().collect_dummies(&root.message_id);
    for dummy_id in &dummies {
        assert!(
            !known_ids.contains(dummy_id),
            "dummy node {} has a surviving instance in one of the open folders",
            dummy_id
        );
    }
}
