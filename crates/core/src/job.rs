// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job lifecycle: the process-wide init gate, the jailed-command
//! abstraction a jail builder hands back to us, and the `Job` object
//! itself (`Start` / `Wait` / `Stop` / `Status` / `Logs`).

use crate::error::{Doner, JobError};
use parking_lot::{Condvar, Mutex, RwLock};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

crate::define_id! {
    /// Unique identifier for a job instance, a UUID rendered as a string.
    pub struct JobId;
}

impl JobId {
    /// First hyphen-delimited segment of the UUID, the handle returned to
    /// RPC callers and used to key the registry.
    pub fn short_id(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }
}

/// Process-wide state of the `init()` gate. Every `Job` construction and
/// `Start` call checks this; only the re-entry launcher transitions it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    NotInited,
    Startable,
    Jailed,
}

const NOT_INITED: u8 = 0;
const STARTABLE: u8 = 1;
const JAILED: u8 = 2;

static PROCESS_STATE: AtomicU8 = AtomicU8::new(NOT_INITED);

pub fn process_state() -> ProcessState {
    match PROCESS_STATE.load(Ordering::SeqCst) {
        STARTABLE => ProcessState::Startable,
        JAILED => ProcessState::Jailed,
        _ => ProcessState::NotInited,
    }
}

/// Transition the process-wide init gate. Callable exactly once per
/// process; intended to be called only by `tjob_jail::init`, never
/// directly by job-execution callers.
pub fn set_process_state(state: ProcessState) -> Result<(), JobError> {
    let target = match state {
        ProcessState::NotInited => NOT_INITED,
        ProcessState::Startable => STARTABLE,
        ProcessState::Jailed => JAILED,
    };
    PROCESS_STATE
        .compare_exchange(NOT_INITED, target, Ordering::SeqCst, Ordering::SeqCst)
        .map(|_| ())
        .map_err(|_| JobError::AlreadyInited)
}

/// Parameters for a job the caller wants jailed and run.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub path: String,
    pub args: Vec<String>,
    pub mnt: String,
    pub cpu_percent: u32,
    pub memory_mb: u32,
    pub read_bps: u64,
    pub write_bps: u64,
}

/// A point-in-time snapshot of a job's lifecycle state.
#[derive(Debug, Clone)]
pub struct JobStatus {
    pub pid: i32,
    pub cmd: String,
    pub started_at: Option<SystemTime>,
    pub stopped_at: Option<SystemTime>,
    pub ran: Duration,
    pub exit: i32,
    pub error: Option<JobError>,
}

impl JobStatus {
    pub fn started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn stopped(&self) -> bool {
        self.stopped_at.is_some()
    }
}

/// A spawned child process, abstracted so a jail builder that creates its
/// child via a raw `clone3` (rather than `std::process::Command`) can
/// still hand `Job` something it can wait on by pid.
pub trait ChildProcess: Send {
    fn pid(&self) -> i32;

    /// Blocks until the child exits. Returns its exit code, or the
    /// negated signal number if it was killed by one.
    fn wait_for_exit(&mut self) -> std::io::Result<i32>;
}

impl ChildProcess for std::process::Child {
    fn pid(&self) -> i32 {
        self.id() as i32
    }

    #[cfg(unix)]
    fn wait_for_exit(&mut self) -> std::io::Result<i32> {
        use std::os::unix::process::ExitStatusExt;
        let status = std::process::Child::wait(self)?;
        Ok(status.code().unwrap_or_else(|| -status.signal().unwrap_or(0)))
    }

    #[cfg(not(unix))]
    fn wait_for_exit(&mut self) -> std::io::Result<i32> {
        let status = std::process::Child::wait(self)?;
        Ok(status.code().unwrap_or(-1))
    }
}

/// A handle a [`JailBuilder`] hands back once the jailed child is running.
pub struct JailedChild {
    pub child: Box<dyn ChildProcess>,
    pub cgroup: Option<Box<dyn CgroupHandle>>,
}

/// A still-open cgroup directory handle, closed and removed when the job
/// that owns it finishes.
pub trait CgroupHandle: Send + Sync {
    /// Close the directory handle and remove the cgroup directory. Best
    /// effort: implementations log failures rather than propagate them,
    /// since nothing downstream can act on a failed cleanup.
    fn close(self: Box<Self>);
}

/// Builds and spawns the re-entered, namespaced, cgrouped child process
/// for a job. Implemented by `tjob-jail`; injected here so `tjob-core`
/// stays free of any `nix`/`libc` namespace or cgroup plumbing.
pub trait JailBuilder: fmt::Debug + Send + Sync {
    fn build(
        &self,
        id: &JobId,
        config: &JobConfig,
        log_file: &std::fs::File,
    ) -> Result<JailedChild, JobError>;
}

const NEW: u8 = 0;
const STARTED: u8 = 1;
const STOPPED: u8 = 2;

struct JobCleanup {
    log_file: std::fs::File,
    cgroup: Option<Box<dyn CgroupHandle>>,
}

/// A single jailed job: one re-entered, namespaced, cgrouped child process
/// and the state needed to start it, wait on it, stop it early, read its
/// status, and follow its combined stdout/stderr log.
pub struct Job {
    id: JobId,
    config: JobConfig,
    jail: Arc<dyn JailBuilder>,
    state: AtomicU8,
    status: RwLock<JobStatus>,
    log_path: Mutex<Option<PathBuf>>,
    cleanup: Mutex<Option<JobCleanup>>,
    done: (Mutex<bool>, Condvar),
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("state", &self.state.load(Ordering::Relaxed))
            .finish()
    }
}

impl Job {
    /// Construct a new, not-yet-started job. Does not touch the OS; no
    /// process exists until [`Job::start`] is called.
    pub fn new(config: JobConfig, jail: Arc<dyn JailBuilder>) -> Arc<Self> {
        let cmd = std::iter::once(config.path.as_str())
            .chain(config.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        Arc::new(Self {
            id: JobId::new(uuid::Uuid::new_v4().to_string()),
            config,
            jail,
            state: AtomicU8::new(NEW),
            status: RwLock::new(JobStatus {
                pid: 0,
                cmd,
                started_at: None,
                stopped_at: None,
                ran: Duration::ZERO,
                exit: -1,
                error: None,
            }),
            log_path: Mutex::new(None),
            cleanup: Mutex::new(None),
            done: (Mutex::new(false), Condvar::new()),
        })
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Start the job: build the jailed child via the injected
    /// [`JailBuilder`] and spawn the background waiter that owns
    /// completion cleanup. Idempotent once started; returns the job's
    /// terminal error (if any) when called after the job has already run
    /// to completion.
    #[tracing::instrument(skip(self), fields(job_id = %self.id))]
    pub fn start(self: &Arc<Self>) -> Result<(), JobError> {
        match process_state() {
            ProcessState::Startable => {}
            ProcessState::Jailed => return Err(JobError::AlreadyJailed),
            ProcessState::NotInited => return Err(JobError::NotStartable),
        }

        if self
            .state
            .compare_exchange(NEW, STARTED, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            if self.state.load(Ordering::SeqCst) == STOPPED {
                let status = self.status.read();
                return match &status.error {
                    Some(e) => Err(e.clone()),
                    None => Ok(()),
                };
            }
            return Ok(());
        }

        let log_file = tempfile::NamedTempFile::new()?;
        let (file, path) = log_file
            .keep()
            .map_err(|e| JobError::Io(e.to_string()))?;

        let built = match self.jail.build(&self.id, &self.config, &file) {
            Ok(built) => built,
            Err(err) => {
                self.state.store(STOPPED, Ordering::SeqCst);
                self.status.write().error = Some(err.clone());
                let (lock, cvar) = &self.done;
                *lock.lock() = true;
                cvar.notify_all();
                return Err(err);
            }
        };
        let pid = built.child.pid();

        tracing::info!(pid, "job started");
        {
            let mut status = self.status.write();
            status.pid = pid;
            status.started_at = Some(SystemTime::now());
        }
        *self.log_path.lock() = Some(path);
        *self.cleanup.lock() = Some(JobCleanup {
            log_file: file,
            cgroup: built.cgroup,
        });

        self.spawn_waiter(built.child);
        Ok(())
    }

    fn spawn_waiter(self: &Arc<Self>, mut child: Box<dyn ChildProcess>) {
        let job = Arc::clone(self);
        std::thread::spawn(move || {
            let wait_result = child.wait_for_exit();

            let new_err = {
                let mut status = job.status.write();
                status.stopped_at = Some(SystemTime::now());
                if let Some(started) = status.started_at {
                    status.ran = SystemTime::now()
                        .duration_since(started)
                        .unwrap_or_default();
                }
                match wait_result {
                    Ok(code) => {
                        status.exit = code;
                        if code == 0 {
                            None
                        } else {
                            Some(JobError::Exited(code))
                        }
                    }
                    Err(e) => Some(JobError::from(e)),
                }
            };
            if let Some(new_err) = new_err {
                let mut status = job.status.write();
                status.error = Some(JobError::merge(status.error.take(), new_err));
            }

            if let Some(cleanup) = job.cleanup.lock().take() {
                drop(cleanup.log_file);
                if let Some(cgroup) = cleanup.cgroup {
                    cgroup.close();
                }
            }

            job.state.store(STOPPED, Ordering::SeqCst);
            tracing::info!(job_id = %job.id, "job finished");
            let (lock, cvar) = &job.done;
            *lock.lock() = true;
            cvar.notify_all();
        });
    }

    /// Block until the job has run to completion, returning its terminal
    /// error, if any.
    pub fn wait(&self) -> Result<(), JobError> {
        if self.state.load(Ordering::SeqCst) == NEW {
            return Err(JobError::NotStarted);
        }
        let (lock, cvar) = &self.done;
        let mut done = lock.lock();
        while !*done {
            cvar.wait(&mut done);
        }
        let status = self.status.read();
        match &status.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// Force-stop a running job. Idempotent: stopping an already-stopped
    /// job is a no-op.
    #[tracing::instrument(skip(self), fields(job_id = %self.id))]
    pub fn stop(&self) -> Result<(), JobError> {
        let pid = {
            let mut status = self.status.write();
            if status.stopped() {
                return Ok(());
            }
            if !status.started() {
                return Err(JobError::NotStarted);
            }
            status.error = Some(JobError::merge(status.error.take(), JobError::ForceStop));
            status.pid
        };
        tracing::info!(pid, "stopping job");
        kill_process(pid)
    }

    /// Snapshot of the job's current status. `ran` is computed live while
    /// the job is still running.
    pub fn status(&self) -> Result<JobStatus, JobError> {
        if self.state.load(Ordering::SeqCst) == NEW {
            return Err(JobError::NotStarted);
        }
        let mut status = self.status.read().clone();
        if status.started() && !status.stopped() {
            if let Some(started) = status.started_at {
                status.ran = SystemTime::now().duration_since(started).unwrap_or_default();
            }
        }
        Ok(status)
    }

    /// Path of the job's combined stdout/stderr log file, once started.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.log_path.lock().clone()
    }

    /// Non-blocking check of whether the job has finished.
    pub fn is_done(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STOPPED
    }
}

impl Doner for Job {
    fn done(&self) -> bool {
        self.is_done()
    }
}

#[cfg(unix)]
fn kill_process(pid: i32) -> Result<(), JobError> {
    // SAFETY: pid was returned by the OS for a child this job spawned and
    // has not been reaped yet (status hasn't transitioned to Stopped).
    let rc = unsafe { libc::kill(pid, libc::SIGKILL) };
    if rc != 0 {
        return Err(JobError::from(std::io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(not(unix))]
fn kill_process(_pid: i32) -> Result<(), JobError> {
    Ok(())
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
