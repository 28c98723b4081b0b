//! End-to-end tests for the `minibox` binary.
//!
//! Tests marked `#[ignore]` create namespaces, mounts and cgroups; run them
//! as root with `MINIBOX_TEST_ROOTFS` pointing at a directory containing a
//! static `/bin/sh`, `/bin/true` and `/bin/sleep`:
//!
//! ```text
//! MINIBOX_TEST_ROOTFS=/srv/rootfs cargo test -p minibox-cli -- --ignored
//! ```

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{Duration, Instant};

const ROOT_ONLY: &str = "needs root, cgroup v2 and MINIBOX_TEST_ROOTFS";

fn minibox() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_minibox"));
    let _ = cmd.env_remove("MINIBOX_CONFIG").env("RUST_LOG", "warn");
    cmd
}

fn rootfs() -> PathBuf {
    PathBuf::from(std::env::var_os("MINIBOX_TEST_ROOTFS").expect("MINIBOX_TEST_ROOTFS"))
}

fn run(args: &[&str]) -> Output {
    let rootfs = format!("--rootfs={}", rootfs().display());
    minibox()
        .arg("run")
        .arg(rootfs)
        .args(args)
        .output()
        .expect("spawn minibox")
}

fn report(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("json report")
}

// ── Argument and Config Validation ───────────────────────────────────

#[test]
fn missing_rootfs_fails_before_spawn() {
    let output = minibox()
        .args(["run", "--rootfs=/nonexistent/minibox/rootfs", "/bin/true"])
        .output()
        .expect("spawn minibox");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not a directory"), "stderr: {stderr}");
}

#[test]
fn unknown_config_key_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = dir.path().join("minibox.json");
    std::fs::write(&config, r#"{ "cgroup_prefx": "typo" }"#).unwrap();

    let output = minibox()
        .arg("--config")
        .arg(&config)
        .args(["run", "--rootfs", dir.path().to_str().unwrap(), "/bin/true"])
        .output()
        .expect("spawn minibox");
    assert!(!output.status.success());
}

#[test]
fn help_does_not_list_init() {
    let output = minibox().arg("--help").output().expect("spawn minibox");
    assert!(output.status.success());
    let help = String::from_utf8_lossy(&output.stdout);
    assert!(help.contains("run"));
    assert!(!help.contains("init"));
}

// ── Container Runs ───────────────────────────────────────────────────

#[test]
#[ignore = "needs root, cgroup v2 and MINIBOX_TEST_ROOTFS"]
fn true_exits_cleanly() {
    let output = run(&["--propagate-exit", "/bin/true"]);
    assert!(output.status.success(), "{ROOT_ONLY}: {output:?}");
}

#[test]
#[ignore = "needs root, cgroup v2 and MINIBOX_TEST_ROOTFS"]
fn exit_status_is_propagated_on_request() {
    let output = run(&["--propagate-exit", "/bin/sh", "-c", "exit 7"]);
    assert_eq!(output.status.code(), Some(7));

    let output = run(&["/bin/sh", "-c", "exit 7"]);
    assert!(output.status.success());
}

#[test]
#[ignore = "needs root, cgroup v2 and MINIBOX_TEST_ROOTFS"]
fn time_limit_stops_long_command() {
    let begin = Instant::now();
    let output = run(&["--time-limit=500000", "--json", "/bin/sleep", "5"]);
    let elapsed = begin.elapsed();

    assert!(output.status.success());
    assert!(elapsed >= Duration::from_millis(500));
    assert!(elapsed < Duration::from_secs(3), "took {elapsed:?}");
    let report = report(&output);
    assert_eq!(report["timed_out"], true);
    assert_eq!(report["exit"]["kind"], "signaled");
}

#[test]
#[ignore = "needs root, cgroup v2 and MINIBOX_TEST_ROOTFS"]
fn hostname_is_isolated() {
    let output = run(&[
        "/bin/sh",
        "-c",
        "read h < /proc/sys/kernel/hostname; echo $h",
    ]);
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "container");
}

#[test]
#[ignore = "needs root, cgroup v2 and MINIBOX_TEST_ROOTFS"]
fn box_is_working_directory_and_writable() {
    let work = tempfile::tempdir().expect("tempdir");
    let box_arg = format!("--box={}", work.path().display());
    let output = run(&[&box_arg, "/bin/sh", "-c", "echo hi > marker"]);
    assert!(output.status.success());
    let marker = std::fs::read_to_string(work.path().join("marker")).expect("marker");
    assert_eq!(marker, "hi\n");
}

#[test]
#[ignore = "needs root, cgroup v2 and MINIBOX_TEST_ROOTFS"]
fn resource_group_is_removed_after_run() {
    let output = run(&[
        "--cgroup",
        "--pid-limit=8",
        "--run-id=itest-cleanup",
        "--json",
        "/bin/true",
    ]);
    assert!(output.status.success());
    let report = report(&output);
    assert!(report["stats"].is_object());
    assert!(!PathBuf::from("/sys/fs/cgroup/minibox-itest-cleanup").exists());
}

#[test]
#[ignore = "needs root, cgroup v2 and MINIBOX_TEST_ROOTFS"]
fn memory_limit_kills_runaway_allocation() {
    let output = run(&[
        "--cgroup",
        "--mem-limit=8388608",
        "--time-limit=10000000",
        "--json",
        "/bin/sh",
        "-c",
        "s=x; while :; do s=$s$s; done",
    ]);
    let report = report(&output);
    assert_eq!(report["timed_out"], false);
    assert_ne!(
        report["exit"],
        serde_json::json!({ "kind": "exited", "code": 0 })
    );
}

#[test]
#[ignore = "needs root, cgroup v2 and MINIBOX_TEST_ROOTFS"]
fn jail_mounts_do_not_leak_to_host() {
    let output = run(&["/bin/true"]);
    assert!(output.status.success());
    let mounts = std::fs::read_to_string("/proc/self/mountinfo").unwrap();
    for target in ["proc", "sys", "dev"] {
        let in_rootfs = rootfs().join(target);
        assert!(
            !mounts.contains(in_rootfs.to_str().unwrap()),
            "{} still mounted on the host",
            in_rootfs.display()
        );
    }
}
