// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::Once;

static INIT: Once = Once::new();

/// The init gate is process-wide and can only be set once per test
/// binary; every lifecycle test shares it via this helper. The
/// not-yet-inited and already-jailed cases are exercised in
/// `tests/init_gate.rs`, where each case gets its own fresh process.
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
        let child = cmd.spawn()?;
        Ok(JailedChild {
            child: Box::new(child),
            cgroup: None,
        })
    }
}

#[derive(Debug, Default)]
struct FailingJail;

impl JailBuilder for FailingJail {
    fn build(
        &self,
        _id: &JobId,
        _config: &JobConfig,
        _log_file: &std::fs::File,
    ) -> Result<JailedChild, JobError> {
        Err(JobError::Unexpected("jail construction failed".into()))
    }
}

fn config(path: &str, args: &[&str]) -> JobConfig {
    JobConfig {
        path: path.to_string(),
        args: args.iter().map(|s| s.to_string()).collect(),
        mnt: "/".to_string(),
        cpu_percent: 0,
        memory_mb: 0,
        read_bps: 0,
        write_bps: 0,
    }
}

#[test]
fn job_id_short_id_is_first_hyphen_segment() {
    let id = JobId::new("abcd1234-5678-90ab-cdef-000000000000");
    assert_eq!(id.short_id(), "abcd1234");
}

#[test]
fn job_id_short_id_returns_whole_string_without_hyphens() {
    let id = JobId::new("noseparator");
    assert_eq!(id.short_id(), "noseparator");
}

#[test]
fn process_state_cannot_be_set_twice() {
    ensure_startable();
    assert_eq!(process_state(), ProcessState::Startable);
    assert!(matches!(
        set_process_state(ProcessState::Startable),
        Err(JobError::AlreadyInited)
    ));
}

#[test]
fn new_job_is_not_started() {
    let job = Job::new(config("/bin/echo", &["hi"]), Arc::new(FakeJail));
    assert!(matches!(job.status(), Err(JobError::NotStarted)));
    assert!(!job.is_done());
}

#[test]
fn start_runs_the_command_and_wait_observes_success() {
    ensure_startable();
    let job = Job::new(config("/bin/echo", &["hello"]), Arc::new(FakeJail));
    job.start().unwrap();
    job.wait().unwrap();
    let status = job.status().unwrap();
    assert!(status.stopped());
    assert_eq!(status.exit, 0);
    assert!(status.error.is_none());
}

#[test]
fn start_twice_is_a_no_op() {
    ensure_startable();
    let job = Job::new(config("/bin/sleep", &["1"]), Arc::new(FakeJail));
    job.start().unwrap();
    job.start().unwrap();
    job.stop().unwrap();
    let _ = job.wait();
}

#[test]
fn start_after_stopped_replays_the_terminal_error() {
    ensure_startable();
    let job = Job::new(config("/bin/sleep", &["5"]), Arc::new(FakeJail));
    job.start().unwrap();
    job.stop().unwrap();
    job.wait().unwrap_err();
    let replayed = job.start().unwrap_err();
    assert!(matches!(replayed, JobError::Combined(_, _)));
}

#[test]
fn start_failure_surfaces_the_jail_error_and_terminates_the_job() {
    ensure_startable();
    let job = Job::new(config("/bin/echo", &["hi"]), Arc::new(FailingJail));
    let err = job.start().unwrap_err();
    assert!(matches!(err, JobError::Unexpected(_)));
    assert!(job.is_done());
    let status = job.status().unwrap();
    assert!(status.error.is_some());
    job.wait().unwrap_err();
}

#[test]
fn stop_is_idempotent() {
    ensure_startable();
    let job = Job::new(config("/bin/sleep", &["5"]), Arc::new(FakeJail));
    job.start().unwrap();
    job.stop().unwrap();
    job.stop().unwrap();
    let err = job.wait().unwrap_err();
    assert!(matches!(err, JobError::Combined(_, _)));
}

#[test]
fn stop_before_start_fails() {
    let job = Job::new(config("/bin/echo", &["hi"]), Arc::new(FakeJail));
    assert!(matches!(job.stop(), Err(JobError::NotStarted)));
}

#[test]
fn started_at_never_exceeds_stopped_at() {
    ensure_startable();
    let job = Job::new(config("/bin/echo", &["hi"]), Arc::new(FakeJail));
    job.start().unwrap();
    job.wait().unwrap();
    let status = job.status().unwrap();
    assert!(status.started_at.unwrap() <= status.stopped_at.unwrap());
}

#[test]
fn log_path_is_set_after_start_and_readable() {
    ensure_startable();
    let job = Job::new(config("/bin/echo", &["logged output"]), Arc::new(FakeJail));
    assert!(job.log_path().is_none());
    job.start().unwrap();
    job.wait().unwrap();
    let path = job.log_path().expect("log path set after start");
    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("logged output"));
    let _ = std::fs::remove_file(&path);
}
