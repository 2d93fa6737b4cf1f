// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn cpu_quota_is_floor_of_percent_times_period() {
    assert_eq!(cpu_quota_us(20), 20_000);
    assert_eq!(cpu_quota_us(100), 100_000);
    assert_eq!(cpu_quota_us(0), 0);
}

#[test]
fn cpu_quota_rounds_down_on_uneven_percent() {
    // 33% of 100000us floors to 33000, not 33000.3.
    assert_eq!(cpu_quota_us(33), 33_000);
}

/// Creating a real cgroup directory, enabling controllers, and writing
/// `cpu.max`/`memory.max`/`io.max` requires root and a mounted cgroup v2
/// unified hierarchy; this is exercised outside CI via a manual run.
#[test]
#[ignore = "requires root and a real cgroup v2 mount at /sys/fs/cgroup"]
fn create_writes_controller_files() {
    let config = JobConfig {
        path: "/bin/true".into(),
        args: vec![],
        mnt: String::new(),
        cpu_percent: 20,
        memory_mb: 64,
        read_bps: 0,
        write_bps: 0,
    };
    let job_id = format!("tjob-test-{}", std::process::id());
    let cgroup = Cgroup::create(&job_id, &config).expect("create cgroup");
    let path = PathBuf::from(CGROUP_ROOT).join(&job_id);
    assert!(std::fs::read_to_string(path.join("cpu.max"))
        .unwrap()
        .starts_with("20000"));
    Box::new(cgroup).close();
    assert!(!path.exists());
}