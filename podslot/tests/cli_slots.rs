//! CLI tests for the podslot binary.
//!
//! The runtime is pointed at a program that does not exist, so these only
//! exercise paths that never need a live container runtime (or that must
//! degrade or fail cleanly without one).

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use podslot::core::identity::ProjectIdentity;
use podslot::exit_codes;

fn podslot(home: &Path, args: &[&str]) -> Output {
    fs::write(
        home.join("config.toml"),
        "runtime = \"podslot-test-missing-runtime\"\nprobe_timeout_secs = 2\n",
    )
    .expect("write config");
    Command::new(env!("CARGO_BIN_EXE_podslot"))
        .env("PODSLOT_HOME", home)
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("run podslot")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

#[test]
fn id_prints_chain_checksum() {
    let home = tempfile::tempdir().expect("home");
    let project = tempfile::tempdir().expect("project");
    let canonical = fs::canonicalize(project.path()).expect("canonical");
    let identity = ProjectIdentity::new(&canonical).expect("identity");
    let project_arg = canonical.to_str().expect("utf8");

    let out = podslot(home.path(), &["id", project_arg, "--index", "3"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout(&out).trim(), identity.slot(3).hex());
}

#[test]
fn allocate_then_list_without_runtime() {
    let home = tempfile::tempdir().expect("home");
    let project = tempfile::tempdir().expect("project");
    let project_arg = project.path().to_str().expect("utf8");

    let out = podslot(home.path(), &["allocate", project_arg]);
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");
    let slot_dir = stdout(&out).trim().to_string();
    assert!(Path::new(&slot_dir).is_dir());

    let out = podslot(home.path(), &["list", project_arg, "--json"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");
    let records: serde_json::Value = serde_json::from_str(&stdout(&out)).expect("json");
    assert_eq!(records[0]["index"], 1);
    assert_eq!(records[0]["running"], "unknown");
    assert_eq!(records[0]["status"], "unknown");
}

#[test]
fn select_fails_cleanly_when_runtime_missing() {
    let home = tempfile::tempdir().expect("home");
    let project = tempfile::tempdir().expect("project");
    let project_arg = project.path().to_str().expect("utf8");

    let out = podslot(home.path(), &["select", project_arg]);
    assert_eq!(out.status.code(), Some(exit_codes::NOT_FOUND), "no slots yet");

    podslot(home.path(), &["allocate", project_arg]);
    let out = podslot(home.path(), &["select", project_arg]);
    assert_eq!(out.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("container runtime unavailable"), "{stderr}");
}

#[test]
fn revoke_rejects_malformed_slot() {
    let home = tempfile::tempdir().expect("home");
    let project = tempfile::tempdir().expect("project");
    let project_arg = project.path().to_str().expect("utf8");

    let out = podslot(home.path(), &["revoke", project_arg, "--slot", "zero"]);
    assert_eq!(out.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&out.stderr).contains("invalid input"));
}

#[test]
fn cache_check_and_commit_round() {
    let home = tempfile::tempdir().expect("home");
    let project = tempfile::tempdir().expect("project");
    fs::write(project.path().join("Dockerfile"), "FROM scratch\n").expect("dockerfile");
    let project_arg = project.path().to_str().expect("utf8");

    let out = podslot(
        home.path(),
        &["cache", "check", project_arg, "--image-exists", "true"],
    );
    assert_eq!(out.status.code(), Some(exit_codes::REBUILD));
    assert!(stdout(&out).contains("profile-config"));

    let out = podslot(home.path(), &["cache", "commit", project_arg]);
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");

    let out = podslot(
        home.path(),
        &["cache", "check", project_arg, "--image-exists", "true"],
    );
    assert_eq!(out.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout(&out).trim(), "up to date");
}

#[test]
fn projects_lists_recorded_paths() {
    let home = tempfile::tempdir().expect("home");
    let project = tempfile::tempdir().expect("project");
    let canonical = fs::canonicalize(project.path()).expect("canonical");
    let project_arg = canonical.to_str().expect("utf8");
    podslot(home.path(), &["allocate", project_arg]);

    let out = podslot(home.path(), &["projects"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK));
    assert!(stdout(&out).starts_with(project_arg));
}

#[test]
fn list_of_unused_project_leaves_no_state() {
    let home = tempfile::tempdir().expect("home");
    let project = tempfile::tempdir().expect("project");
    let project_arg = project.path().to_str().expect("utf8");

    let out = podslot(home.path(), &["list", project_arg, "--json"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");
    assert_eq!(stdout(&out).trim(), "[]");
    assert!(!home.path().join("projects").exists());

    let out = podslot(home.path(), &["projects"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK));
    assert!(stdout(&out).is_empty());
}

#[test]
fn id_rejects_index_past_scan_bound() {
    let home = tempfile::tempdir().expect("home");
    let project = tempfile::tempdir().expect("project");
    let project_arg = project.path().to_str().expect("utf8");

    let out = podslot(home.path(), &["id", project_arg, "--index", "4000000000"]);
    assert_eq!(out.status.code(), Some(2));
}
