//! Cross-crate tracing tests: fixtures loaded by `gridphase-data`, phases
//! traced by `gridphase-core`.
//!
//! Each test writes its fixture into a private temp directory, loads it back
//! through the public loaders and checks the traced phases terminal by
//! terminal.

use std::fs;
use std::path::{Path, PathBuf};

use gridphase_core::config::PhaseQueue;
use gridphase_core::network::{Network, StateView};
use gridphase_core::phase::{PhaseCode, SinglePhaseKind as P};
use gridphase_core::remove_phases::RemovePhases;
use gridphase_core::set_phases::SetPhases;
use gridphase_core::test_utils::*;
use gridphase_data::{DataLoadError, load_network, load_study};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Create a temporary directory with a unique name for test isolation.
fn make_test_dir(suffix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "gridphase_integration_{suffix}_{}",
        std::process::id()
    ));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn cleanup(dir: &Path) {
    let _ = fs::remove_dir_all(dir);
}

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn traced(network: &Network, mrid: &str, sequence: usize) -> [Vec<P>; 2] {
    StateView::ALL.map(|view| traced_phases(network, view, mrid, sequence))
}

// ===========================================================================
// Fixtures
// ===========================================================================

/// s0 - b1 (feeder) - c2 - j3, with clamps k2 @2 and m6 @6 and a cut @4 that
/// is open in the current view. Attachments precede their segment on purpose.
const CUT_FEEDER_RON: &str = r#"
(equipment: [
    (mrid: "k2", kind: Clamp(segment: "c2", length_from_t1: Some(2.0)), terminals: [(phases: ABC, node: "n3")]),
    (mrid: "cut", kind: Cut(segment: "c2", length_from_t1: Some(4.0), open: true),
        terminals: [(phases: ABC), (phases: ABC)]),
    (mrid: "m6", kind: Clamp(segment: "c2", length_from_t1: Some(6.0)), terminals: [(phases: ABC, node: "n4")]),
    (mrid: "s0", kind: EnergySource(phases: [A, B, C]), terminals: [(phases: ABC, node: "n0")]),
    (mrid: "b1", kind: Switch(feeder_breaker: true),
        terminals: [(phases: ABC, node: "n0"), (phases: ABC, node: "n1")]),
    (mrid: "c2", kind: AcLineSegment(length: Some(10.0)),
        terminals: [(phases: ABC, node: "n1"), (phases: ABC, node: "n2")]),
    (mrid: "j3", kind: Plain, terminals: [(phases: ABC, node: "n2")]),
    (mrid: "jk", kind: Plain, terminals: [(phases: ABC, node: "n3")]),
    (mrid: "jm", kind: Plain, terminals: [(phases: ABC, node: "n4")]),
])
"#;

const CUT_FEEDER_JSON: &str = r#"{
    "equipment": [
        { "mrid": "s0", "kind": { "EnergySource": { "phases": ["A", "B", "C"] } },
          "terminals": [{ "phases": "ABC", "node": "n0" }] },
        { "mrid": "b1", "kind": { "Switch": { "feeder_breaker": true } },
          "terminals": [{ "phases": "ABC", "node": "n0" }, { "phases": "ABC", "node": "n1" }] },
        { "mrid": "c2", "kind": { "AcLineSegment": { "length": 10.0 } },
          "terminals": [{ "phases": "ABC", "node": "n1" }, { "phases": "ABC", "node": "n2" }] },
        { "mrid": "k2", "kind": { "Clamp": { "segment": "c2", "length_from_t1": 2.0 } },
          "terminals": [{ "phases": "ABC", "node": "n3" }] },
        { "mrid": "cut", "kind": { "Cut": { "segment": "c2", "length_from_t1": 4.0, "open": true } },
          "terminals": [{ "phases": "ABC" }, { "phases": "ABC" }] },
        { "mrid": "m6", "kind": { "Clamp": { "segment": "c2", "length_from_t1": 6.0 } },
          "terminals": [{ "phases": "ABC", "node": "n4" }] },
        { "mrid": "j3", "kind": "Plain", "terminals": [{ "phases": "ABC", "node": "n2" }] },
        { "mrid": "jk", "kind": "Plain", "terminals": [{ "phases": "ABC", "node": "n3" }] },
        { "mrid": "jm", "kind": "Plain", "terminals": [{ "phases": "ABC", "node": "n4" }] }
    ]
}"#;

/// s0 - b1 (feeder) - tx (ABC to ABCN) - c3 - j4.
const TRANSFORMER_TOML: &str = r#"
[[equipment]]
mrid = "s0"
kind = { EnergySource = { phases = ["A", "B", "C"] } }
terminals = [{ phases = "ABC", node = "n0" }]

[[equipment]]
mrid = "b1"
kind = { Switch = { feeder_breaker = true } }
terminals = [{ phases = "ABC", node = "n0" }, { phases = "ABC", node = "n1" }]

[[equipment]]
mrid = "tx"
kind = "PowerTransformer"
terminals = [{ phases = "ABC", node = "n1" }, { phases = "ABCN", node = "n2" }]

[[equipment]]
mrid = "c3"
kind = { AcLineSegment = { length = 250.0 } }
terminals = [{ phases = "ABCN", node = "n2" }, { phases = "ABCN", node = "n3" }]

[[equipment]]
mrid = "j4"
kind = "Plain"
terminals = [{ phases = "ABCN", node = "n3" }]
"#;

// ===========================================================================
// Loading then tracing
// ===========================================================================

#[test]
fn cut_open_in_current_view_stops_the_trace() {
    init_logging();
    let dir = make_test_dir("cut_feeder");
    let mut network = load_network(&write(&dir, "network.ron", CUT_FEEDER_RON)).unwrap();

    let report = SetPhases::default().run(&mut network).unwrap();
    assert!(report.conflicts.is_empty());

    let abc = vec![P::A, P::B, P::C];
    let none = vec![P::None; 3];

    // Before the cut, both views agree.
    assert_eq!(traced(&network, "jk", 1), [abc.clone(), abc.clone()]);
    assert_eq!(traced(&network, "cut", 1), [abc.clone(), abc.clone()]);

    // Past the cut, only the normal view is energised.
    for (mrid, sequence) in [("cut", 2), ("m6", 1), ("jm", 1), ("c2", 2), ("j3", 1)] {
        assert_eq!(
            traced(&network, mrid, sequence),
            [abc.clone(), none.clone()],
            "{mrid}-t{sequence}"
        );
    }

    cleanup(&dir);
}

#[test]
fn ron_and_json_fixtures_trace_identically() {
    let dir = make_test_dir("ron_vs_json");
    let mut from_ron = load_network(&write(&dir, "feeder.ron", CUT_FEEDER_RON)).unwrap();
    let mut from_json = load_network(&write(&dir, "feeder.json", CUT_FEEDER_JSON)).unwrap();

    SetPhases::default().run(&mut from_ron).unwrap();
    SetPhases::default().run(&mut from_json).unwrap();

    for (id, equipment) in from_ron.graph().iter_equipment() {
        let other = from_json.graph().equipment_by_mrid(&equipment.mrid).unwrap();
        assert_eq!(
            equipment.num_terminals(),
            from_json.graph().equipment(other).unwrap().num_terminals()
        );
        for sequence in 1..=from_ron.graph().equipment(id).unwrap().num_terminals() {
            assert_eq!(
                traced(&from_ron, &equipment.mrid, sequence),
                traced(&from_json, &equipment.mrid, sequence),
                "{}-t{sequence}",
                equipment.mrid
            );
        }
    }

    cleanup(&dir);
}

#[test]
fn transformer_fixture_from_toml_adds_neutral() {
    let dir = make_test_dir("transformer");
    let mut network = load_network(&write(&dir, "network.toml", TRANSFORMER_TOML)).unwrap();

    SetPhases::default().run(&mut network).unwrap();

    let abcn = vec![P::A, P::B, P::C, P::N];
    assert_eq!(traced(&network, "tx", 2), [abcn.clone(), abcn.clone()]);
    assert_eq!(traced(&network, "j4", 1), [abcn.clone(), abcn]);

    cleanup(&dir);
}

#[test]
fn loaded_fixture_matches_builder_network() {
    let dir = make_test_dir("builder_match");
    let fixture = r#"
    (equipment: [
        (mrid: "s0", kind: EnergySource(phases: [A, B, C, N]), terminals: [(phases: ABCN, node: "a")]),
        (mrid: "b1", kind: Switch(feeder_breaker: true),
            terminals: [(phases: ABCN, node: "a"), (phases: ABCN, node: "b")]),
        (mrid: "c2", kind: AcLineSegment(length: None), terminals: [(phases: ABCN, node: "b"), (phases: ABCN, node: "c")]),
        (mrid: "j3", kind: Plain, terminals: [(phases: ABCN, node: "c")]),
    ])
    "#;
    let mut loaded = load_network(&write(&dir, "network.ron", fixture)).unwrap();
    let mut built = TestNetworkBuilder::new()
        .from_source(PhaseCode::ABCN) // s0
        .to_feeder_breaker(PhaseCode::ABCN) // b1
        .to_acls(PhaseCode::ABCN) // c2
        .to_junction(PhaseCode::ABCN, 1) // j3
        .build();

    SetPhases::default().run(&mut loaded).unwrap();
    SetPhases::default().run(&mut built).unwrap();

    for (mrid, sequence) in [("b1", 2), ("c2", 1), ("c2", 2), ("j3", 1)] {
        assert_eq!(
            traced(&loaded, mrid, sequence),
            traced(&built, mrid, sequence),
            "{mrid}-t{sequence}"
        );
    }

    cleanup(&dir);
}

#[test]
fn phases_removed_after_loading_clear_downstream() {
    let dir = make_test_dir("remove");
    let mut network = load_network(&write(&dir, "network.toml", TRANSFORMER_TOML)).unwrap();
    SetPhases::default().run(&mut network).unwrap();

    let c3 = terminal(network.graph(), "c3", 1);
    RemovePhases::new().run(&mut network, c3, None).unwrap();

    for (mrid, sequence) in [("c3", 1), ("c3", 2), ("j4", 1)] {
        assert_eq!(
            traced(&network, mrid, sequence),
            [vec![P::None; 4], vec![P::None; 4]],
            "{mrid}-t{sequence}"
        );
    }

    cleanup(&dir);
}

// ===========================================================================
// Study directories
// ===========================================================================

#[test]
fn study_directory_carries_its_configuration() {
    let dir = make_test_dir("study");
    write(&dir, "network.ron", CUT_FEEDER_RON);
    write(
        &dir,
        "set_phases.toml",
        "discipline = \"DepthFirst\"\nmax_reconciliation_rounds = 8\n",
    );

    let mut study = load_study(&dir).unwrap();
    assert_eq!(study.config.discipline, PhaseQueue::DepthFirst);
    assert_eq!(study.config.max_reconciliation_rounds, Some(8));

    let report = SetPhases::new(study.config.clone())
        .run(&mut study.network)
        .unwrap();
    assert!(report.conflicts.is_empty());
    assert!(!report.round_limit_hit);
    assert_eq!(
        traced(&study.network, "j3", 1),
        [vec![P::A, P::B, P::C], vec![P::None; 3]]
    );

    cleanup(&dir);
}

#[test]
fn study_with_two_network_formats_is_rejected() {
    let dir = make_test_dir("study_conflict");
    write(&dir, "network.ron", CUT_FEEDER_RON);
    write(&dir, "network.json", CUT_FEEDER_JSON);

    assert!(matches!(
        load_study(&dir),
        Err(DataLoadError::ConflictingFormats { .. })
    ));

    cleanup(&dir);
}
