//! Locker integration coverage for §8 scenario 5.

use mailbox::locker::dotlock::DotLock;
use mailbox::locker::{LockTiming, Locker};
use mailbox::ErrorKind;
use std::time::{Duration, Instant};

#[test]
fn second_locker_times_out_then_succeeds_after_release() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("folder");
    std::fs::write(&target, b"").unwrap();

    let mut first = DotLock::new(&target);
    first.lock().unwrap();

    let short_timing = LockTiming {
        timeout: Duration::from_secs(1),
        stale_after: Duration::from_secs(300),
    };
    let mut second = DotLock::with_timing(&target, short_timing);
    let start = Instant::now();
    let err = second.lock().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LockTimeout);
    assert!(start.elapsed() >= Duration::from_secs(1));

    first.unlock().unwrap();
    second.lock().unwrap();
    assert!(second.has_lock());
}
