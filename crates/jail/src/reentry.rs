// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The re-entry launcher: the same binary acts as the top-level server
//! and, when re-invoked with the `.tjob` sentinel as its first argument,
//! as the jailed child that mounts a fresh `/proc` and execs the real
//! target program.

use tjob_core::{set_process_state, JobError, ProcessState};

/// Sentinel token distinguishing a re-entered jail invocation from a
/// normal top-level run of the binary.
pub const JAIL_OP: &str = ".tjob";

/// Must be called exactly once, as the very first thing `main` does,
/// before any [`tjob_core::Job`] is constructed.
///
/// On a normal invocation this marks the process [`ProcessState::Startable`]
/// and returns. On a re-entered invocation (`argv[1] == ".tjob"`) it marks
/// the process [`ProcessState::Jailed`], mounts a fresh `/proc` (Linux
/// only), and execs the target program named by the remaining arguments —
/// which, on success, never returns because the process image is
/// replaced.
pub fn init() -> Result<(), JobError> {
    let args: Vec<String> = std::env::args().collect();

    if args.get(1).map(String::as_str) != Some(JAIL_OP) {
        set_process_state(ProcessState::Startable)?;
        return Ok(());
    }

    set_process_state(ProcessState::Jailed)?;

    if args.len() < 3 {
        return Err(JobError::InvalidArgs(
            "re-entered process requires a target path after the jail sentinel".into(),
        ));
    }

    #[cfg(target_os = "linux")]
    mount_proc()?;

    exec_target(&args[2..])
}

#[cfg(target_os = "linux")]
fn mount_proc() -> Result<(), JobError> {
    use nix::mount::{mount, MsFlags};
    mount(
        Some("proc"),
        "/proc",
        Some("proc"),
        MsFlags::empty(),
        None::<&str>,
    )
    .map_err(|e| JobError::Io(format!("mounting /proc: {e}")))
}

#[cfg(unix)]
fn exec_target(target_argv: &[String]) -> Result<(), JobError> {
    use std::os::unix::process::CommandExt;
    // `Command::exec` replaces this process's image outright: it only
    // returns if the execve itself failed. That is exactly what we want
    // here, since clone3 already placed this process inside the target
    // namespaces and cgroup; a further fork+wait would be redundant and
    // would leave the wrong process holding those resources.
    let err = std::process::Command::new(&target_argv[0])
        .args(&target_argv[1..])
        .exec();
    Err(JobError::from(err))
}

#[cfg(not(unix))]
fn exec_target(_target_argv: &[String]) -> Result<(), JobError> {
    Err(JobError::Unexpected(
        "re-entry exec is only supported on unix targets".into(),
    ))
}