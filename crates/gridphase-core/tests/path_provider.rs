//! Next-hop rules of the step path provider on hand-built networks.

use gridphase_core::connectivity::NominalPhasePath;
use gridphase_core::network::{EquipmentKind, Network, NetworkGraph, StateView};
use gridphase_core::phase::{PhaseCode, SinglePhaseKind as SPK};
use gridphase_core::step_path::{StepPath, StepPathProvider};
use gridphase_core::test_utils::*;
use std::collections::HashSet;

// ===========================================================================
// Helpers
// ===========================================================================

/// A hop between two terminals that did not walk along a segment.
fn hop(graph: &NetworkGraph, from: (&str, usize), to: (&str, usize)) -> StepPath {
    StepPath::new(terminal(graph, from.0, from.1), terminal(graph, to.0, to.1))
}

/// A hop made by walking along the segment `from` is on (or is).
fn along(graph: &NetworkGraph, from: (&str, usize), to: (&str, usize)) -> StepPath {
    let id = graph.equipment_by_mrid(from.0).unwrap();
    let segment = match &graph.equipment(id).unwrap().kind {
        EquipmentKind::AcLineSegment(_) => id,
        EquipmentKind::Cut(cut) => cut.segment,
        EquipmentKind::Clamp(clamp) => clamp.segment,
        other => panic!("{} cannot traverse a segment", other.name()),
    };
    StepPath::traversed(terminal(graph, from.0, from.1), terminal(graph, to.0, to.1), segment)
}

fn next(network: &Network, path: &StepPath) -> Vec<StepPath> {
    StepPathProvider::new(network.graph(), StateView::Normal).next_paths(path)
}

#[track_caller]
fn assert_paths(actual: Vec<StepPath>, expected: Vec<StepPath>) {
    assert_eq!(actual.len(), expected.len(), "{actual:#?}");
    let actual: HashSet<StepPath> = actual.into_iter().collect();
    let expected: HashSet<StepPath> = expected.into_iter().collect();
    assert_eq!(actual, expected);
}

fn breaker_segment_breaker() -> TestNetworkBuilder {
    TestNetworkBuilder::new()
        .from_breaker(PhaseCode::ABC) // b0
        .to_acls(PhaseCode::ABC) // c1
}

// ===========================================================================
// Plain equipment
// ===========================================================================

#[test]
fn external_path_steps_internally() {
    //            2
    // 1--c0--2 1 j1
    //            3
    let network = TestNetworkBuilder::new()
        .from_acls(PhaseCode::ABC)
        .to_junction(PhaseCode::ABC, 3)
        .build();
    let g = network.graph();

    assert_paths(
        next(&network, &hop(g, ("c0", 2), ("j1", 1))),
        vec![hop(g, ("j1", 1), ("j1", 2)), hop(g, ("j1", 1), ("j1", 3))],
    );
}

fn junction_with_two_segments(c2_in_service: bool) -> Network {
    // 1 j0 21--c1--2
    //      1
    //      c2
    let builder = TestNetworkBuilder::new()
        .from_junction(PhaseCode::ABC, 2)
        .to_acls(PhaseCode::ABC)
        .from_acls(PhaseCode::ABC);
    let builder = if c2_in_service {
        builder
    } else {
        builder.out_of_service(StateView::Normal)
    };
    builder.connect("j0", "c2", 2, 1).build()
}

#[test]
fn internal_path_steps_externally() {
    let network = junction_with_two_segments(true);
    let g = network.graph();

    assert_paths(
        next(&network, &hop(g, ("j0", 1), ("j0", 2))),
        vec![hop(g, ("j0", 2), ("c1", 1)), hop(g, ("j0", 2), ("c2", 1))],
    );
}

#[test]
fn only_steps_to_in_service_equipment() {
    let network = junction_with_two_segments(false);
    let g = network.graph();

    assert_paths(
        next(&network, &hop(g, ("j0", 1), ("j0", 2))),
        vec![hop(g, ("j0", 2), ("c1", 1))],
    );
}

#[test]
fn only_includes_followed_phases() {
    //            2 (A)
    // 1--c0--21 tx1 3 (B)
    //            4 (C)
    let network = TestNetworkBuilder::new()
        .from_acls(PhaseCode::ABC)
        .to_power_transformer(&[PhaseCode::ABC, PhaseCode::A, PhaseCode::B, PhaseCode::C])
        .build();
    let g = network.graph();

    let current = hop(g, ("c0", 2), ("tx1", 1)).with_phase_paths(vec![
        NominalPhasePath::new(SPK::A, SPK::A),
        NominalPhasePath::new(SPK::B, SPK::B),
    ]);

    assert_paths(
        next(&network, &current),
        vec![
            hop(g, ("tx1", 1), ("tx1", 2)).with_phase_paths(vec![NominalPhasePath::new(SPK::A, SPK::A)]),
            hop(g, ("tx1", 1), ("tx1", 3)).with_phase_paths(vec![NominalPhasePath::new(SPK::B, SPK::B)]),
        ],
    );
}

// ===========================================================================
// Busbars
// ===========================================================================

#[test]
fn stepping_onto_a_busbar_node_only_goes_to_busbars() {
    let network = busbar_network();
    let g = network.graph();

    assert_paths(
        next(&network, &hop(g, ("b0", 1), ("b0", 2))),
        vec![hop(g, ("b0", 2), ("bbs1", 1)), hop(g, ("b0", 2), ("bbs2", 1))],
    );
}

#[test]
fn stepping_off_a_busbar_skips_busbars_and_the_origin() {
    let network = busbar_network();
    let g = network.graph();

    assert_paths(
        next(&network, &hop(g, ("b0", 2), ("bbs1", 1))),
        ["b3", "b4", "b5", "b6"]
            .into_iter()
            .map(|b| hop(g, ("bbs1", 1), (b, 1)))
            .collect(),
    );
}

// ===========================================================================
// Clamps only
// ===========================================================================

#[test]
fn traversing_from_t1_includes_every_clamp() {
    let network = clamps_network();
    let g = network.graph();

    assert_paths(
        next(&network, &hop(g, ("b0", 2), ("c1", 1))),
        vec![
            along(g, ("c1", 1), ("clamp1", 1)),
            along(g, ("c1", 1), ("clamp2", 1)),
            along(g, ("c1", 1), ("c1", 2)),
        ],
    );
}

#[test]
fn traversing_from_t2_includes_every_clamp() {
    let network = clamps_network();
    let g = network.graph();

    assert_paths(
        next(&network, &hop(g, ("b2", 1), ("c1", 2))),
        vec![
            along(g, ("c1", 2), ("clamp2", 1)),
            along(g, ("c1", 2), ("clamp1", 1)),
            along(g, ("c1", 2), ("c1", 1)),
        ],
    );
}

// ===========================================================================
// Cuts and clamps
// ===========================================================================

#[test]
fn entering_segment_t1_stops_at_first_cut() {
    let network = multi_cut_and_clamp_network();
    let g = network.graph();

    assert_paths(
        next(&network, &hop(g, ("b0", 2), ("c1", 1))),
        vec![along(g, ("c1", 1), ("clamp1", 1)), along(g, ("c1", 1), ("cut1", 1))],
    );
}

#[test]
fn entering_segment_t2_stops_at_last_cut() {
    let network = multi_cut_and_clamp_network();
    let g = network.graph();

    assert_paths(
        next(&network, &hop(g, ("b2", 1), ("c1", 2))),
        vec![along(g, ("c1", 2), ("clamp4", 1)), along(g, ("c1", 2), ("cut2", 2))],
    );
}

#[test]
fn arriving_at_cut_along_segment_steps_out_and_across() {
    let network = multi_cut_and_clamp_network();
    let g = network.graph();

    assert_paths(
        next(&network, &along(g, ("c1", 1), ("cut1", 1))),
        vec![hop(g, ("cut1", 1), ("cut1", 2)), hop(g, ("cut1", 1), ("c4", 1))],
    );
    assert_paths(
        next(&network, &along(g, ("c1", 2), ("cut2", 2))),
        vec![hop(g, ("cut2", 2), ("cut2", 1)), hop(g, ("cut2", 2), ("c9", 1))],
    );
}

#[test]
fn external_step_onto_cut_t1_walks_towards_t1_and_across() {
    let network = multi_cut_and_clamp_network();
    let g = network.graph();

    assert_paths(
        next(&network, &hop(g, ("c4", 1), ("cut1", 1))),
        vec![
            along(g, ("cut1", 1), ("clamp1", 1)),
            along(g, ("cut1", 1), ("c1", 1)),
            hop(g, ("cut1", 1), ("cut1", 2)),
        ],
    );
}

#[test]
fn external_step_onto_cut_t2_walks_towards_t2_and_across() {
    let network = multi_cut_and_clamp_network();
    let g = network.graph();

    assert_paths(
        next(&network, &hop(g, ("c9", 1), ("cut2", 2))),
        vec![
            along(g, ("cut2", 2), ("clamp4", 1)),
            along(g, ("cut2", 2), ("c1", 2)),
            hop(g, ("cut2", 2), ("cut2", 1)),
        ],
    );
}

#[test]
fn external_step_onto_clamp_walks_both_ways() {
    let network = multi_cut_and_clamp_network();
    let g = network.graph();

    assert_paths(
        next(&network, &hop(g, ("c3", 1), ("clamp1", 1))),
        vec![along(g, ("clamp1", 1), ("c1", 1)), along(g, ("clamp1", 1), ("cut1", 1))],
    );
}

#[test]
fn arriving_at_clamp_along_segment_only_steps_out() {
    let network = multi_cut_and_clamp_network();
    let g = network.graph();

    assert_paths(
        next(&network, &along(g, ("c1", 1), ("clamp1", 1))),
        vec![hop(g, ("clamp1", 1), ("c3", 1))],
    );
}

#[test]
fn clamp_between_cuts_stops_at_both_cuts() {
    let network = multi_cut_and_clamp_network();
    let g = network.graph();

    assert_paths(
        next(&network, &hop(g, ("c6", 1), ("clamp2", 1))),
        vec![
            along(g, ("clamp2", 1), ("cut1", 2)),
            along(g, ("clamp2", 1), ("clamp3", 1)),
            along(g, ("clamp2", 1), ("cut2", 1)),
        ],
    );
}

#[test]
fn cut_t2_between_cuts_walks_to_next_cut() {
    let network = multi_cut_and_clamp_network();
    let g = network.graph();
    let walked = vec![
        along(g, ("cut1", 2), ("clamp2", 1)),
        along(g, ("cut1", 2), ("clamp3", 1)),
        along(g, ("cut1", 2), ("cut2", 1)),
    ];

    let mut external = walked.clone();
    external.push(hop(g, ("cut1", 2), ("cut1", 1)));
    assert_paths(next(&network, &hop(g, ("c5", 1), ("cut1", 2))), external);

    let mut internal = walked;
    internal.push(hop(g, ("cut1", 2), ("c5", 1)));
    assert_paths(next(&network, &hop(g, ("cut1", 1), ("cut1", 2))), internal);
}

#[test]
fn cut_t1_between_cuts_walks_to_previous_cut() {
    let network = multi_cut_and_clamp_network();
    let g = network.graph();
    let walked = vec![
        along(g, ("cut2", 1), ("clamp3", 1)),
        along(g, ("cut2", 1), ("clamp2", 1)),
        along(g, ("cut2", 1), ("cut1", 2)),
    ];

    let mut external = walked.clone();
    external.push(hop(g, ("cut2", 1), ("cut2", 2)));
    assert_paths(next(&network, &hop(g, ("c8", 1), ("cut2", 1))), external);

    let mut internal = walked;
    internal.push(hop(g, ("cut2", 1), ("c8", 1)));
    assert_paths(next(&network, &hop(g, ("cut2", 2), ("cut2", 1))), internal);
}

#[test]
fn start_on_clamp_flagged_as_traversed_only_steps_out() {
    let network = multi_cut_and_clamp_network();
    let g = network.graph();

    let start = along(g, ("clamp1", 1), ("clamp1", 1));
    assert_paths(next(&network, &start), vec![hop(g, ("clamp1", 1), ("c3", 1))]);
}

#[test]
fn start_on_clamp_steps_out_and_walks() {
    let network = multi_cut_and_clamp_network();
    let g = network.graph();

    let start = StepPath::start(terminal(g, "clamp1", 1));
    assert_paths(
        next(&network, &start),
        vec![
            hop(g, ("clamp1", 1), ("c3", 1)),
            along(g, ("clamp1", 1), ("c1", 1)),
            along(g, ("clamp1", 1), ("cut1", 1)),
        ],
    );
}

#[test]
fn out_of_service_attachments_are_ignored() {
    let network = {
        let mut network = multi_cut_and_clamp_network();
        let graph = network.graph_mut();
        let cut1 = graph.equipment_by_mrid("cut1").unwrap();
        let clamp1 = graph.equipment_by_mrid("clamp1").unwrap();
        graph.set_in_service(cut1, StateView::Normal, false).unwrap();
        graph.set_in_service(clamp1, StateView::Normal, false).unwrap();
        network
    };
    let g = network.graph();

    assert_paths(
        next(&network, &hop(g, ("b0", 2), ("c1", 1))),
        vec![
            along(g, ("c1", 1), ("clamp2", 1)),
            along(g, ("c1", 1), ("clamp3", 1)),
            along(g, ("c1", 1), ("cut2", 1)),
        ],
    );

    // The current view still sees them.
    let current = StepPathProvider::new(g, StateView::Current).next_paths(&hop(g, ("b0", 2), ("c1", 1)));
    assert_paths(
        current,
        vec![along(g, ("c1", 1), ("clamp1", 1)), along(g, ("c1", 1), ("cut1", 1))],
    );
}

// ===========================================================================
// Unknown and shared positions
// ===========================================================================

#[test]
fn cut_with_unknown_position_hides_clamp_beyond_it_from_t1() {
    // 1 b0 21*1 cut1 2*-c1-*-21 b2 2
    //                      1
    //                      clamp1
    let network = breaker_segment_breaker()
        .with_clamp("clamp1", Some(1.0))
        .with_cut("cut1", None)
        .to_breaker(PhaseCode::ABC)
        .build();
    let g = network.graph();

    assert_paths(
        next(&network, &hop(g, ("b0", 2), ("c1", 1))),
        vec![along(g, ("c1", 1), ("cut1", 1))],
    );
    assert_paths(
        next(&network, &hop(g, ("b2", 1), ("c1", 2))),
        vec![along(g, ("c1", 2), ("clamp1", 1)), along(g, ("c1", 2), ("cut1", 2))],
    );
}

#[test]
fn cuts_at_the_same_position_are_all_reached() {
    let network = breaker_segment_breaker()
        .with_cut("cut1", Some(1.0))
        .with_cut("cut2", Some(1.0))
        .to_breaker(PhaseCode::ABC)
        .build();
    let g = network.graph();

    assert_paths(
        next(&network, &hop(g, ("b0", 2), ("c1", 1))),
        vec![along(g, ("c1", 1), ("cut1", 1)), along(g, ("c1", 1), ("cut2", 1))],
    );
    assert_paths(
        next(&network, &hop(g, ("b2", 1), ("c1", 2))),
        vec![along(g, ("c1", 2), ("cut1", 2)), along(g, ("c1", 2), ("cut2", 2))],
    );
    assert_paths(
        next(&network, &hop(g, ("cut1", 1), ("cut1", 2))),
        vec![along(g, ("cut1", 2), ("c1", 2)), along(g, ("cut1", 2), ("cut2", 2))],
    );
    assert_paths(
        next(&network, &hop(g, ("cut1", 2), ("cut1", 1))),
        vec![along(g, ("cut1", 1), ("c1", 1)), along(g, ("cut1", 1), ("cut2", 1))],
    );
}

#[test]
fn clamp_without_position_sits_on_t1_side_of_cut_without_position() {
    let network = breaker_segment_breaker()
        .with_clamp("clamp1", None)
        .with_cut("cut1", None)
        .to_breaker(PhaseCode::ABC)
        .build();
    let g = network.graph();

    assert_paths(
        next(&network, &hop(g, ("b0", 2), ("c1", 1))),
        vec![along(g, ("c1", 1), ("cut1", 1)), along(g, ("c1", 1), ("clamp1", 1))],
    );
    assert_paths(
        next(&network, &hop(g, ("b2", 1), ("c1", 2))),
        vec![along(g, ("c1", 2), ("cut1", 2))],
    );
    assert_paths(
        next(&network, &hop(g, ("cut1", 1), ("cut1", 2))),
        vec![along(g, ("cut1", 2), ("c1", 2))],
    );
    assert_paths(
        next(&network, &hop(g, ("cut1", 2), ("cut1", 1))),
        vec![along(g, ("cut1", 1), ("c1", 1)), along(g, ("cut1", 1), ("clamp1", 1))],
    );
}

#[test]
fn clamps_at_the_same_position_are_returned_once() {
    let network = breaker_segment_breaker()
        .with_clamp("clamp1", None)
        .with_clamp("clamp2", None)
        .with_cut("cut1", None)
        .to_breaker(PhaseCode::ABC)
        .build();
    let g = network.graph();

    let start = StepPath::start(terminal(g, "clamp1", 1));
    assert_paths(
        next(&network, &start),
        vec![
            along(g, ("clamp1", 1), ("c1", 1)),
            along(g, ("clamp1", 1), ("clamp2", 1)),
            along(g, ("clamp1", 1), ("cut1", 1)),
        ],
    );
}

#[test]
fn attachments_stacked_at_shared_positions() {
    let network = same_position_network();
    let g = network.graph();
    let a = |from: (&str, usize), to: (&str, usize)| along(g, from, to);
    let h = |from: (&str, usize), to: (&str, usize)| hop(g, from, to);

    // Into c1.t1: start clamps, stopping at both start cuts.
    assert_paths(
        next(&network, &h(("b0", 2), ("c1", 1))),
        vec![
            a(("c1", 1), ("clamp1", 1)),
            a(("c1", 1), ("clamp2", 1)),
            a(("c1", 1), ("cut1", 1)),
            a(("c1", 1), ("cut2", 1)),
        ],
    );

    // From a start clamp.
    assert_paths(
        next(&network, &h(("c-clamp1", 1), ("clamp1", 1))),
        vec![
            a(("clamp1", 1), ("clamp2", 1)),
            a(("clamp1", 1), ("c1", 1)),
            a(("clamp1", 1), ("cut1", 1)),
            a(("clamp1", 1), ("cut2", 1)),
        ],
    );

    // Onto cut1.t1, externally then internally.
    let towards_t1 = vec![
        a(("cut1", 1), ("cut2", 1)),
        a(("cut1", 1), ("clamp1", 1)),
        a(("cut1", 1), ("clamp2", 1)),
        a(("cut1", 1), ("c1", 1)),
    ];
    let mut external = towards_t1.clone();
    external.push(h(("cut1", 1), ("cut1", 2)));
    assert_paths(next(&network, &h(("c-cut1t1", 1), ("cut1", 1))), external);
    let mut internal = towards_t1;
    internal.push(h(("cut1", 1), ("c-cut1t1", 1)));
    assert_paths(next(&network, &h(("cut1", 2), ("cut1", 1))), internal);

    // Onto cut1.t2 walks into the middle group.
    let towards_t2 = vec![
        a(("cut1", 2), ("cut2", 2)),
        a(("cut1", 2), ("clamp3", 1)),
        a(("cut1", 2), ("clamp4", 1)),
        a(("cut1", 2), ("cut3", 1)),
        a(("cut1", 2), ("cut4", 1)),
    ];
    let mut external = towards_t2.clone();
    external.push(h(("cut1", 2), ("cut1", 1)));
    assert_paths(next(&network, &h(("c-cut1t2", 1), ("cut1", 2))), external);
    let mut internal = towards_t2;
    internal.push(h(("cut1", 2), ("c-cut1t2", 1)));
    assert_paths(next(&network, &h(("cut1", 1), ("cut1", 2))), internal);

    // A middle clamp reaches both neighbouring cut groups.
    assert_paths(
        next(&network, &h(("c-clamp3", 1), ("clamp3", 1))),
        vec![
            a(("clamp3", 1), ("cut1", 2)),
            a(("clamp3", 1), ("cut2", 2)),
            a(("clamp3", 1), ("cut3", 1)),
            a(("clamp3", 1), ("cut4", 1)),
            a(("clamp3", 1), ("clamp4", 1)),
        ],
    );

    // Middle cuts.
    assert_paths(
        next(&network, &h(("c-cut3t1", 1), ("cut3", 1))),
        vec![
            a(("cut3", 1), ("cut4", 1)),
            a(("cut3", 1), ("cut1", 2)),
            a(("cut3", 1), ("cut2", 2)),
            a(("cut3", 1), ("clamp3", 1)),
            a(("cut3", 1), ("clamp4", 1)),
            h(("cut3", 1), ("cut3", 2)),
        ],
    );
    assert_paths(
        next(&network, &h(("cut3", 1), ("cut3", 2))),
        vec![
            a(("cut3", 2), ("cut4", 2)),
            a(("cut3", 2), ("cut5", 1)),
            a(("cut3", 2), ("cut6", 1)),
            a(("cut3", 2), ("clamp5", 1)),
            a(("cut3", 2), ("clamp6", 1)),
            h(("cut3", 2), ("c-cut3t2", 1)),
        ],
    );

    // An end clamp.
    assert_paths(
        next(&network, &h(("c-clamp5", 1), ("clamp5", 1))),
        vec![
            a(("clamp5", 1), ("cut3", 2)),
            a(("clamp5", 1), ("cut4", 2)),
            a(("clamp5", 1), ("cut5", 1)),
            a(("clamp5", 1), ("cut6", 1)),
            a(("clamp5", 1), ("clamp6", 1)),
        ],
    );

    // End cuts.
    assert_paths(
        next(&network, &h(("c-cut5t1", 1), ("cut5", 1))),
        vec![
            a(("cut5", 1), ("cut6", 1)),
            a(("cut5", 1), ("cut3", 2)),
            a(("cut5", 1), ("cut4", 2)),
            a(("cut5", 1), ("clamp5", 1)),
            a(("cut5", 1), ("clamp6", 1)),
            h(("cut5", 1), ("cut5", 2)),
        ],
    );
    assert_paths(
        next(&network, &h(("cut5", 1), ("cut5", 2))),
        vec![
            a(("cut5", 2), ("cut6", 2)),
            a(("cut5", 2), ("c1", 2)),
            h(("cut5", 2), ("c-cut5t2", 1)),
        ],
    );

    // Into c1.t2 stops at both end cuts.
    assert_paths(
        next(&network, &h(("b2", 1), ("c1", 2))),
        vec![a(("c1", 2), ("cut5", 2)), a(("c1", 2), ("cut6", 2))],
    );
}

// ===========================================================================
// Ordering along a segment
// ===========================================================================

/// Length 10 with clamps at 2 and 5 and cuts at 5 and 8.
fn ordering_network() -> Network {
    breaker_segment_breaker()
        .with_length(10.0)
        .with_clamp("clamp2", Some(2.0))
        .with_clamp("clamp5", Some(5.0))
        .with_cut("cut5", Some(5.0))
        .with_cut("cut8", Some(8.0))
        .to_breaker(PhaseCode::ABC)
        .build()
}

#[test]
fn walking_towards_t2_meets_clamp_before_cut_at_same_position() {
    let network = ordering_network();
    let g = network.graph();

    assert_eq!(
        next(&network, &hop(g, ("b0", 2), ("c1", 1))),
        vec![
            along(g, ("c1", 1), ("clamp2", 1)),
            along(g, ("c1", 1), ("clamp5", 1)),
            along(g, ("c1", 1), ("cut5", 1)),
        ]
    );
    assert_eq!(
        next(&network, &hop(g, ("cut5", 1), ("cut5", 2))),
        vec![along(g, ("cut5", 2), ("cut8", 1))]
    );
    assert_eq!(
        next(&network, &hop(g, ("cut8", 1), ("cut8", 2))),
        vec![along(g, ("cut8", 2), ("c1", 2))]
    );
}

#[test]
fn walking_towards_t1_meets_cut_before_clamp_at_same_position() {
    let network = ordering_network();
    let g = network.graph();

    assert_eq!(
        next(&network, &hop(g, ("b2", 1), ("c1", 2))),
        vec![along(g, ("c1", 2), ("cut8", 2))]
    );
    assert_eq!(
        next(&network, &hop(g, ("cut8", 2), ("cut8", 1))),
        vec![along(g, ("cut8", 1), ("cut5", 2))]
    );
    assert_eq!(
        next(&network, &hop(g, ("cut5", 2), ("cut5", 1))),
        vec![
            along(g, ("cut5", 1), ("clamp2", 1)),
            along(g, ("cut5", 1), ("clamp5", 1)),
            along(g, ("cut5", 1), ("c1", 1)),
        ]
    );
}
