// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `tjob-jail`: the Linux-specific half of the job-execution stack — the
//! re-entry launcher, the cgroup v2 jail, and the `clone3`-based spawn
//! that puts a job's process inside fresh namespaces and its cgroup with
//! no gap between the two. Non-Linux builds fall back to a no-op jail
//! for local development, matching the original implementation's
//! darwin build.

pub mod cgroup;
#[cfg(target_os = "linux")]
mod clone;
pub mod reentry;

use std::sync::Arc;
use tjob_core::{JailBuilder, JailedChild, JobConfig, JobError, JobId};

/// Production [`JailBuilder`]: cgroup v2 + namespaces + `clone3` on
/// Linux, a direct unjailed exec everywhere else.
#[derive(Debug, Default)]
pub struct Jail;

impl JailBuilder for Jail {
    #[cfg(target_os = "linux")]
    fn build(
        &self,
        id: &JobId,
        config: &JobConfig,
        log_file: &std::fs::File,
    ) -> Result<JailedChild, JobError> {
        linux::build(id, config, log_file)
    }

    #[cfg(not(target_os = "linux"))]
    fn build(
        &self,
        _id: &JobId,
        config: &JobConfig,
        log_file: &std::fs::File,
    ) -> Result<JailedChild, JobError> {
        no_isolation::build(config, log_file)
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use super::cgroup::Cgroup;
    use super::{clone, reentry};
    use std::os::fd::AsRawFd;
    use tjob_core::{ChildProcess, JailedChild, JobConfig, JobError, JobId};

    struct PidChild(i32);

    impl ChildProcess for PidChild {
        fn pid(&self) -> i32 {
            self.0
        }

        fn wait_for_exit(&mut self) -> std::io::Result<i32> {
            use nix::sys::wait::{waitpid, WaitStatus};
            use nix::unistd::Pid;
            loop {
                match waitpid(Pid::from_raw(self.0), None) {
                    Ok(WaitStatus::Exited(_, code)) => return Ok(code),
                    Ok(WaitStatus::Signaled(_, sig, _)) => return Ok(-(sig as i32)),
                    Ok(_) => continue,
                    Err(nix::Error::EINTR) => continue,
                    Err(e) => return Err(std::io::Error::from_raw_os_error(e as i32)),
                }
            }
        }
    }

    pub(super) fn build(
        id: &JobId,
        config: &JobConfig,
        log_file: &std::fs::File,
    ) -> Result<JailedChild, JobError> {
        let cgroup = Cgroup::create(id.as_str(), config)?;
        let launcher = std::env::current_exe()?;

        let mut argv = vec![reentry::JAIL_OP.to_string(), config.path.clone()];
        argv.extend(config.args.iter().cloned());

        let pid = clone::clone_into_jail(&launcher, &argv, cgroup.as_raw_fd(), log_file.as_raw_fd())?;

        tracing::debug!(job_id = %id, pid, "cloned jailed child");

        Ok(JailedChild {
            child: Box::new(PidChild(pid)),
            cgroup: Some(Box::new(cgroup)),
        })
    }
}

#[cfg(not(target_os = "linux"))]
mod no_isolation {
    use tjob_core::{JailedChild, JobConfig, JobError};

    /// No namespaces, no cgroup: a plain child process for local
    /// development on platforms without Linux's jail primitives.
    pub(super) fn build(
        config: &JobConfig,
        log_file: &std::fs::File,
    ) -> Result<JailedChild, JobError> {
        let mut cmd = std::process::Command::new(&config.path);
        cmd.args(&config.args);
        cmd.stdout(std::process::Stdio::from(log_file.try_clone()?));
        cmd.stderr(std::process::Stdio::from(log_file.try_clone()?));
        let child = cmd.spawn()?;
        Ok(JailedChild {
            child: Box::new(child),
            cgroup: None,
        })
    }
}

/// Convenience alias used by the server crate to construct the default
/// production jail as a trait object.
pub fn default_jail() -> Arc<dyn JailBuilder> {
    Arc::new(Jail)
}