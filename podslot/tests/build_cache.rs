//! Build-cache gate decisions across commit / edit cycles.

use std::collections::BTreeSet;
use std::path::PathBuf;

use podslot::cache::BuildCacheGate;
use podslot::core::layers::{Layer, RebuildDecision};
use podslot::error::SlotError;
use podslot::io::config::BuildConfig;
use podslot::test_support::{FakeRuntime, TestProject};

fn inputs() -> BuildConfig {
    BuildConfig {
        base_definition: vec![PathBuf::from("Dockerfile")],
        support_scripts: vec![PathBuf::from("scripts")],
        profile_config: vec![PathBuf::from(".podslot/profile.toml")],
    }
}

fn seeded() -> (TestProject, BuildCacheGate) {
    let fixture = TestProject::new().expect("fixture");
    fixture
        .write_input("Dockerfile", "FROM debian:stable\n")
        .expect("dockerfile");
    fixture
        .write_input("scripts/entry.sh", "#!/bin/sh\nexec \"$@\"\n")
        .expect("script");
    fixture
        .write_input(".podslot/profile.toml", "packages = [\"git\"]\n")
        .expect("profile");
    let gate =
        BuildCacheGate::open(fixture.home(), fixture.project_path(), &inputs()).expect("gate");
    (fixture, gate)
}

fn only(layer: Layer) -> RebuildDecision {
    RebuildDecision {
        rebuild: true,
        changed_layers: BTreeSet::from([layer]),
    }
}

#[test]
fn first_check_without_snapshot_rebuilds_everything() {
    let (_fixture, gate) = seeded();
    assert_eq!(
        gate.needs_rebuild(true).expect("check"),
        RebuildDecision::all_layers()
    );
}

#[test]
fn missing_image_rebuilds_everything_even_after_commit() {
    let (_fixture, gate) = seeded();
    gate.commit_current().expect("commit");
    assert_eq!(
        gate.needs_rebuild(false).expect("check"),
        RebuildDecision::all_layers()
    );
}

#[test]
fn unchanged_inputs_after_commit_need_no_rebuild() {
    let (_fixture, gate) = seeded();
    gate.commit_current().expect("commit");
    let decision = gate.needs_rebuild(true).expect("check");
    assert!(!decision.rebuild);
    assert!(decision.changed_layers.is_empty());
}

#[test]
fn profile_edit_is_attributed_to_profile_layer() {
    let (fixture, gate) = seeded();
    gate.commit_current().expect("commit");
    fixture
        .write_input(".podslot/profile.toml", "packages = [\"git\", \"jq\"]\n")
        .expect("edit profile");

    assert_eq!(
        gate.needs_rebuild(true).expect("check"),
        only(Layer::ProfileConfig)
    );
}

#[test]
fn new_support_script_is_attributed_to_scripts_layer() {
    let (fixture, gate) = seeded();
    gate.commit_current().expect("commit");
    fixture
        .write_input("scripts/extra.sh", "echo extra\n")
        .expect("add script");

    assert_eq!(
        gate.needs_rebuild(true).expect("check"),
        only(Layer::SupportScripts)
    );
}

/// A snapshot computed but never committed (build failed) must not hide changes.
#[test]
fn uncommitted_snapshot_does_not_mask_rebuild() {
    let (fixture, gate) = seeded();
    gate.commit_current().expect("commit");
    fixture
        .write_input("Dockerfile", "FROM debian:testing\n")
        .expect("edit dockerfile");
    let _computed = gate.compute_snapshot().expect("compute");

    assert_eq!(
        gate.needs_rebuild(true).expect("check"),
        only(Layer::BaseDefinition)
    );

    gate.commit_current().expect("commit after build");
    assert!(!gate.needs_rebuild(true).expect("check").rebuild);
}

#[test]
fn snapshot_file_uses_layer_name_and_hex_lines() {
    let (_fixture, gate) = seeded();
    let snapshot = gate.commit_current().expect("commit");
    let contents = std::fs::read_to_string(gate.snapshot_path()).expect("read");
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 3);
    for (line, layer) in lines.iter().zip(Layer::ALL) {
        let (name, hex) = line.split_once(':').expect("name:hex");
        assert_eq!(name, layer.name());
        assert_eq!(hex, format!("{:08x}", snapshot.get(layer).expect("layer")));
    }
}

#[test]
fn image_lookup_drives_rebuild_decision() {
    let (_fixture, gate) = seeded();
    gate.commit_current().expect("commit");
    let runtime = FakeRuntime::new();

    let exists = gate.image_exists(&runtime, "podslot").expect("inspect");
    assert!(!exists);
    assert_eq!(
        gate.needs_rebuild(exists).expect("check"),
        RebuildDecision::all_layers()
    );

    let image = format!("podslot-{}", gate.project().slug());
    runtime.add_image(&image);
    let exists = gate.image_exists(&runtime, "podslot").expect("inspect");
    assert!(exists);
    assert!(!gate.needs_rebuild(exists).expect("check").rebuild);
    assert!(!gate.image_exists(&runtime, "other").expect("inspect"));
}

#[test]
fn image_lookup_failure_is_reported() {
    let (_fixture, gate) = seeded();
    let runtime = FakeRuntime::new();
    runtime.add_image(&format!("podslot-{}", gate.project().slug()));

    runtime.fail_with("daemon down");
    assert!(matches!(
        gate.image_exists(&runtime, "podslot"),
        Err(SlotError::RuntimeUnavailable(_))
    ));

    runtime.recover();
    assert!(gate.image_exists(&runtime, "podslot").expect("inspect"));
}
