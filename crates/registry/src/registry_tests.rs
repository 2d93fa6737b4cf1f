// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::Once;
use tjob_core::{set_process_state, JailBuilder, JailedChild, JobConfig, JobError, ProcessState};

static INIT: Once = Once::new();

fn ensure_startable() {
    INIT.call_once(|| {
        let _ = set_process_state(ProcessState::Startable);
    });
}

#[derive(Debug, Default)]
struct FakeJail;

impl JailBuilder for FakeJail {
    fn build(
        &self,
        _id: &JobId,
        config: &JobConfig,
        log_file: &std::fs::File,
    ) -> Result<JailedChild, JobError> {
        let mut cmd = std::process::Command::new(&config.path);
        cmd.args(&config.args);
        cmd.stdout(log_file.try_clone()?);
        cmd.stderr(log_file.try_clone()?);
        Ok(JailedChild {
            child: Box::new(cmd.spawn()?),
            cgroup: None,
        })
    }
}

fn new_job() -> Arc<Job> {
    Job::new(
        JobConfig {
            path: "/bin/echo".into(),
            args: vec!["hi".into()],
            mnt: "/".into(),
            cpu_percent: 0,
            memory_mb: 0,
            read_bps: 0,
            write_bps: 0,
        },
        Arc::new(FakeJail),
    )
}

#[test]
fn owner_can_look_up_their_own_job() {
    ensure_startable();
    let registry = Registry::new();
    let job = new_job();
    let short_id = registry.insert("alice".into(), Arc::clone(&job)).unwrap();

    let found = registry.get("alice", &short_id).unwrap();
    assert_eq!(found.id(), job.id());
}

#[test]
fn other_caller_is_unauthorized_not_told_it_is_missing() {
    ensure_startable();
    let registry = Registry::new();
    let job = new_job();
    let short_id = registry.insert("alice".into(), job).unwrap();

    let err = registry.get("mallory", &short_id).unwrap_err();
    assert!(matches!(err, RegistryError::Unauthorized(_)));
}

#[test]
fn unknown_short_id_is_not_found() {
    let registry = Registry::new();
    let err = registry.get("alice", "doesnotexist").unwrap_err();
    assert!(matches!(err, RegistryError::NotFound(_)));
}

#[test]
fn re_registering_the_same_job_is_a_duplicate() {
    ensure_startable();
    let registry = Registry::new();
    let job = new_job();
    registry.insert("alice".into(), Arc::clone(&job)).unwrap();
    let err = registry.insert("alice".into(), job).unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateShortId(_)));
}