// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

#[derive(Debug)]
struct MockDoner(Arc<AtomicBool>);

impl Doner for MockDoner {
    fn done(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[test]
fn follower_reads_appended_output_then_eof_when_done() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(tmp.path(), b"Hello").unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let owner = Arc::new(MockDoner(Arc::clone(&done)));
    let mut follower = LogFollower::open(tmp.path(), owner).unwrap();

    let path = tmp.path().to_path_buf();
    let done_writer = Arc::clone(&done);
    let writer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(200));
        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap();
        f.write_all(b"World").unwrap();
        f.sync_all().unwrap();
        done_writer.store(true, Ordering::SeqCst);
    });

    let mut collected = Vec::new();
    let mut buf = [0u8; 64];
    loop {
        let n = follower.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        collected.extend_from_slice(&buf[..n]);
    }
    writer.join().unwrap();
    assert_eq!(collected, b"HelloWorld");
}

#[test]
fn cancel_unblocks_a_pending_read_without_waiting_for_more_output() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(tmp.path(), b"Hello").unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let owner = Arc::new(MockDoner(done));
    let mut follower = LogFollower::open(tmp.path(), owner).unwrap();

    let mut buf = [0u8; 64];
    let n = follower.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"Hello");

    let canceller = follower.canceller();
    let reader = std::thread::spawn(move || {
        let mut buf = [0u8; 64];
        follower.read(&mut buf)
    });

    std::thread::sleep(Duration::from_millis(100));
    canceller.cancel();

    let n = reader.join().unwrap().unwrap();
    assert_eq!(n, 0);
}