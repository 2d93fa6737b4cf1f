// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Each file under `tests/` is its own process, which is what makes this
//! a meaningful test of the process-wide init gate: `set_process_state`
//! is never called here, so the gate is in its fresh `NotInited` state.

use std::sync::Arc;
use tjob_core::{JailBuilder, JailedChild, Job, JobConfig, JobError, JobId};

#[derive(Debug, Default)]
struct UnreachableJail;

impl JailBuilder for UnreachableJail {
    fn build(
        &self,
        _id: &JobId,
        _config: &JobConfig,
        _log_file: &std::fs::File,
    ) -> Result<JailedChild, JobError> {
        panic!("jail builder should never run before init()");
    }
}

#[test]
fn start_before_init_fails_not_startable() {
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
    assert!(matches!(job.start(), Err(JobError::NotStartable)));
}