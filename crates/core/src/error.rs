// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared by the job-execution stack.

use std::fmt;

/// Errors surfaced by [`crate::job::Job`] and the process-wide init gate.
///
/// Cloneable so a terminal error can be read from [`crate::job::JobStatus`]
/// repeatedly (by `Status`, `Wait`, and the background waiter) without
/// consuming it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobError {
    /// `init()` was called more than once for this process.
    #[error("init already called for this process")]
    AlreadyInited,

    /// A job was started before `init()` marked the process startable.
    #[error("process is not startable; call init() before starting jobs")]
    NotStartable,

    /// The process is the re-entered jailed child; it may not start further jobs.
    #[error("process is jailed; cannot start jobs from inside a jail")]
    AlreadyJailed,

    /// `Start` was called on a job that has already been started.
    #[error("job already started")]
    AlreadyStarted,

    /// `Status`/`Stop`/`Wait`/`Logs` were called before `Start`.
    #[error("job has not been started")]
    NotStarted,

    /// The re-entry launcher was invoked without the path argument it needs.
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    /// The job was killed via `Stop` rather than exiting on its own.
    #[error("job was force-stopped")]
    ForceStop,

    /// The child process exited with a non-zero status.
    #[error("process exited with status {0}")]
    Exited(i32),

    /// Wraps an I/O failure (mount, cgroup file write, log file, wait syscall, ...).
    #[error("{0}")]
    Io(String),

    /// Catch-all for conditions that should be unreachable in a correct caller.
    #[error("{0}")]
    Unexpected(String),

    /// Two errors that both apply to the same terminal job: a pre-existing
    /// error (usually [`JobError::ForceStop`]) merged with whatever the wait
    /// syscall or exit status additionally reported.
    #[error("{0}; {1}")]
    Combined(Box<JobError>, Box<JobError>),
}

impl JobError {
    /// Merge a newly observed error onto a possibly pre-existing one,
    /// mirroring the original implementation's `errors.Join` at job
    /// completion: the earlier cause (e.g. a `Stop`-induced `ForceStop`)
    /// is kept as context rather than overwritten.
    pub fn merge(existing: Option<JobError>, new: JobError) -> JobError {
        match existing {
            Some(existing) => JobError::Combined(Box::new(existing), Box::new(new)),
            None => new,
        }
    }
}

impl From<std::io::Error> for JobError {
    fn from(err: std::io::Error) -> Self {
        JobError::Io(err.to_string())
    }
}

/// Identity used by the log follower to ask "has the owning job finished?"
/// without depending on the full `Job` type. Named after the original
/// implementation's `Doner` interface.
pub trait Doner: fmt::Debug + Send + Sync {
    fn done(&self) -> bool;
}
