// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Simulates a re-entered jailed child: the launcher has set the gate to
//! `Jailed` rather than `Startable`, so no further job may be started
//! from inside it.

use std::sync::Arc;
use tjob_core::{JailBuilder, JailedChild, Job, JobConfig, JobError, JobId, ProcessState};

#[derive(Debug, Default)]
struct UnreachableJail;

impl JailBuilder for UnreachableJail {
    fn build(
        &self,
        _id: &JobId,
        _config: &JobConfig,
        _log_file: &std::fs::File,
    ) -> Result<JailedChild, JobError> {
        panic!("jail builder should never run inside an already-jailed process");
    }
}

#[test]
fn start_inside_jail_fails_already_jailed() {
    tjob_core::set_process_state(ProcessState::Jailed).unwrap();
    let job = Job::new(
        JobConfig {
            path: "/bin/echo".into(),
            args: vec!["hi".into()],
            mnt: "/".into(),
            cpu_percent: 0,
            memory_mb: 0,
            read_bps: 0,
            write_bps: 0,
        },
        Arc::new(UnreachableJail),
    );
    assert!(matches!(job.start(), Err(JobError::AlreadyJailed)));
}