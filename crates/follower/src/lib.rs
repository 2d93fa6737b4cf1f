// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `tjob-follower`: tail a job's combined stdout/stderr log file,
//! blocking for more output while the job is still running and
//! returning EOF once it's done or the read is cancelled.
//!
//! On Linux, catching up on a still-running job registers an inotify
//! watch lazily — only once an actual read catches up with the writer —
//! rather than eagerly at construction, and lets the watch instance drop
//! (closing its fd, which removes the watch) before the next read
//! attempt instead of reusing one instance across the whole follow.
//! Non-Linux builds fall back to polling every 200ms.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tjob_core::Doner;

#[cfg(not(target_os = "linux"))]
const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, thiserror::Error)]
pub enum FollowError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Handle used to interrupt a [`LogFollower::read`] in progress,
/// whichever thread it's blocked on.
#[derive(Clone)]
pub struct Canceller {
    cancelled: Arc<AtomicBool>,
    #[cfg(target_os = "linux")]
    blocked_fd: Arc<std::sync::atomic::AtomicI32>,
}

impl Canceller {
    /// Mark the follower cancelled. On Linux, if a read is currently
    /// blocked inside an inotify wait, also closes that watch's file
    /// descriptor out from under it so the blocking syscall returns
    /// immediately rather than waiting for the next log write.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        #[cfg(target_os = "linux")]
        {
            let fd = self.blocked_fd.swap(-1, Ordering::SeqCst);
            if fd >= 0 {
                // SAFETY: `fd` was published by the follower immediately
                // before it parked in a blocking inotify read and is
                // swapped out here atomically, so at most one canceller
                // closes it; the follower detects the resulting error and
                // forgets its `Inotify` rather than closing `fd` again.
                unsafe {
                    libc::close(fd);
                }
            }
        }
    }
}

/// Tails a single job's log file.
pub struct LogFollower {
    file: std::fs::File,
    path: PathBuf,
    owner: Arc<dyn Doner>,
    cancelled: Arc<AtomicBool>,
    #[cfg(target_os = "linux")]
    blocked_fd: Arc<std::sync::atomic::AtomicI32>,
}

impl LogFollower {
    pub fn open(path: impl Into<PathBuf>, owner: Arc<dyn Doner>) -> Result<Self, FollowError> {
        let path = path.into();
        Ok(Self {
            file: std::fs::File::open(&path)?,
            path,
            owner,
            cancelled: Arc::new(AtomicBool::new(false)),
            #[cfg(target_os = "linux")]
            blocked_fd: Arc::new(std::sync::atomic::AtomicI32::new(-1)),
        })
    }

    pub fn canceller(&self) -> Canceller {
        Canceller {
            cancelled: Arc::clone(&self.cancelled),
            #[cfg(target_os = "linux")]
            blocked_fd: Arc::clone(&self.blocked_fd),
        }
    }

    /// Read the next chunk of output. Blocks while caught up with a
    /// still-running job; returns `Ok(0)` once the owning job is done and
    /// fully drained, or once cancelled.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, FollowError> {
        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                return Ok(0);
            }

            let n = self.file.read(buf)?;
            if n > 0 {
                return Ok(n);
            }

            // Caught up. If the job is already done, there is nothing
            // more to ever read; otherwise wait for the next write.
            if self.owner.done() {
                return Ok(0);
            }

            self.wait_for_more()?;
        }
    }

    #[cfg(target_os = "linux")]
    fn wait_for_more(&mut self) -> Result<(), FollowError> {
        use inotify::{Inotify, WatchMask};
        use std::os::fd::AsRawFd;

        let mut inotify = Inotify::init()?;
        inotify
            .watches()
            .add(&self.path, WatchMask::MODIFY | WatchMask::CLOSE)?;

        self.blocked_fd
            .store(inotify.as_raw_fd(), Ordering::SeqCst);
        let mut events_buf = [0u8; 1024];
        let result = inotify.read_events_blocking(&mut events_buf);
        self.blocked_fd.store(-1, Ordering::SeqCst);

        match result {
            Ok(_events) => Ok(()),
            Err(_) if self.cancelled.load(Ordering::SeqCst) => {
                // The canceller already closed this fd; let `inotify`
                // forget it instead of attempting a second close.
                std::mem::forget(inotify);
                Ok(())
            }
            Err(e) => Err(FollowError::from(e)),
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn wait_for_more(&mut self) -> Result<(), FollowError> {
        std::thread::sleep(POLL_INTERVAL);
        Ok(())
    }
}

#[cfg(test)]
#[path = "follower_tests.rs"]
mod tests;