// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cgroup v2 unified-hierarchy jail for a single job: one directory per
//! job directly under [`CGROUP_ROOT`], with `cpu`, `io`, and `memory`
//! controllers enabled and bounded by the job's config.

use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tjob_core::{CgroupHandle, JobConfig, JobError};

/// Flat cgroup root. The original implementation this is grounded on
/// nests an extra `tjobs/` path segment under here; we place job
/// directories directly under the root, a resolved simplification.
pub const CGROUP_ROOT: &str = "/sys/fs/cgroup";

const CPU_PERIOD_US: u64 = 100_000;
const CGROUP_DIR_MODE: u32 = 0o500;

/// An open, still-attached cgroup directory for a running job.
pub struct Cgroup {
    dir: std::fs::File,
    path: PathBuf,
}

impl Cgroup {
    /// Create the job's cgroup directory, enable controllers, and write
    /// the resource limits from `config`. Returns the directory held
    /// open read-only, ready to hand to `clone3`'s `cgroup` argument.
    pub fn create(job_id: &str, config: &JobConfig) -> Result<Self, JobError> {
        let path = Path::new(CGROUP_ROOT).join(job_id);
        std::fs::create_dir(&path)?;
        std::fs::set_permissions(&path, Permissions::from_mode(CGROUP_DIR_MODE))?;

        write_control_file(&path.join("cgroup.subtree_control"), "+cpu +io +memory")?;

        if config.cpu_percent > 0 {
            let quota = cpu_quota_us(config.cpu_percent);
            write_control_file(&path.join("cpu.max"), &format!("{quota} {CPU_PERIOD_US}"))?;
        }

        if config.memory_mb > 0 {
            write_control_file(&path.join("memory.max"), &format!("{}M", config.memory_mb))?;
        }

        if !config.mnt.is_empty() {
            // `mnt` is expected to already be a "major:minor" cgroup
            // device specifier, not a filesystem path, matching the
            // original implementation's io.max write.
            write_control_file(
                &path.join("io.max"),
                &format!(
                    "{} rbps={} wbps={} riops=max wiops=max",
                    config.mnt, config.read_bps, config.write_bps
                ),
            )?;
        }

        let dir = std::fs::File::open(&path)?;
        Ok(Self { dir, path })
    }

    /// Raw fd suitable for `clone3`'s `cgroup` argument.
    pub fn as_raw_fd(&self) -> std::os::fd::RawFd {
        use std::os::fd::AsRawFd;
        self.dir.as_raw_fd()
    }
}

impl CgroupHandle for Cgroup {
    fn close(self: Box<Self>) {
        drop(self.dir);
        if let Err(err) = std::fs::remove_dir(&self.path) {
            tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "failed to remove cgroup directory",
            );
        }
    }
}

/// `floor(cpu_percent / 100 * period)`, the `cpu.max` quota in
/// microseconds for a [`CPU_PERIOD_US`]-microsecond period.
fn cpu_quota_us(cpu_percent: u32) -> u64 {
    (cpu_percent as u64 * CPU_PERIOD_US) / 100
}

fn write_control_file(path: &Path, contents: &str) -> Result<(), JobError> {
    std::fs::write(path, contents)
        .map_err(|e| JobError::Io(format!("writing {}: {e}", path.display())))
}

#[cfg(test)]
#[path = "cgroup_tests.rs"]
mod tests;