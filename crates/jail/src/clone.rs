// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The clone3 syscall that places the re-entry launcher inside fresh PID,
//! mount, and network namespaces and atomically attaches it to the job's
//! cgroup, grounded on the kernel's `clone3(2)` `cgroup` argument — the
//! only way to put a new process into a cgroup with no window where it
//! briefly exists outside it.

use std::ffi::CString;
use std::os::fd::RawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use tjob_core::JobError;

// Not yet exposed by the `libc` crate at the version pinned here; value
// from the clone3(2) man page.
const CLONE_INTO_CGROUP: u64 = 0x200_000_000;

#[repr(C)]
struct Clone3Args {
    flags: u64,
    pidfd: u64,
    child_tid: u64,
    parent_tid: u64,
    exit_signal: u64,
    stack: u64,
    stack_size: u64,
    tls: u64,
    set_tid: u64,
    set_tid_size: u64,
    cgroup: u64,
}

/// Clone the re-entry launcher into fresh PID/mount/net namespaces,
/// attached to `cgroup_fd`, with stdout/stderr redirected to `log_fd`.
/// Returns the child's pid to the parent; in the child this never
/// returns (it execs, or calls `_exit` on failure to do so).
pub(crate) fn clone_into_jail(
    launcher: &Path,
    argv: &[String],
    cgroup_fd: RawFd,
    log_fd: RawFd,
) -> Result<i32, JobError> {
    let flags = (libc::CLONE_NEWPID as u64)
        | (libc::CLONE_NEWNS as u64)
        | (libc::CLONE_NEWNET as u64)
        | CLONE_INTO_CGROUP;

    let mut args = Clone3Args {
        flags,
        pidfd: 0,
        child_tid: 0,
        parent_tid: 0,
        exit_signal: libc::SIGCHLD as u64,
        stack: 0,
        stack_size: 0,
        tls: 0,
        set_tid: 0,
        set_tid_size: 0,
        cgroup: cgroup_fd as u64,
    };

    // SAFETY: `args` is a valid, fully-initialized Clone3Args for the
    // duration of the syscall; its address and size are passed exactly as
    // the kernel's clone3(2) expects.
    let ret = unsafe {
        libc::syscall(
            libc::SYS_clone3,
            &mut args as *mut Clone3Args,
            std::mem::size_of::<Clone3Args>(),
        )
    };

    match ret {
        0 => exec_in_child(launcher, argv, log_fd),
        pid if pid > 0 => Ok(pid as i32),
        _ => Err(JobError::from(std::io::Error::last_os_error())),
    }
}

/// Runs only in the freshly cloned child, already inside the new
/// namespaces and cgroup. Redirects stdio to the log file and execs the
/// re-entry launcher with the `.tjob` sentinel prepended; never returns.
fn exec_in_child(launcher: &Path, argv: &[String], log_fd: RawFd) -> ! {
    // SAFETY: we are the sole thread of a just-cloned child about to
    // exec; dup2 onto the standard fds is the only way to redirect the
    // launcher's inherited stdio before the image is replaced.
    unsafe {
        libc::dup2(log_fd, libc::STDOUT_FILENO);
        libc::dup2(log_fd, libc::STDERR_FILENO);
    }

    let path = match CString::new(launcher.as_os_str().as_bytes()) {
        Ok(p) => p,
        Err(_) => libc::_exit(127),
    };
    let mut c_argv: Vec<CString> = Vec::with_capacity(argv.len() + 1);
    c_argv.push(path.clone());
    for a in argv {
        match CString::new(a.as_str()) {
            Ok(c) => c_argv.push(c),
            Err(_) => libc::_exit(127),
        }
    }

    let _ = nix::unistd::execv(&path, &c_argv);
    // execv only returns on failure.
    libc::_exit(127)
}