//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::id::{EquipmentId, TerminalId};
use crate::network::{EquipmentKind, Network, NetworkGraph, StateView, SwitchState};
use crate::phase::{Direction, PhaseCode, SinglePhaseKind};

// ===========================================================================
// TestNetworkBuilder
// ===========================================================================

/// Fluent builder for small test networks.
///
/// Equipment without an explicit mRID is named by kind prefix plus a running
/// counter (`s0`, `c1`, `b2`, `bbs3`, ...). `to_*` methods connect the new
/// equipment's terminal 1 to the current equipment's last terminal (or the
/// terminal chosen with [`branch_from`](Self::branch_from)) and make it
/// current; `from_*` methods start a new island.
///
/// Misuse panics: this is test code.
#[derive(Debug, Default)]
pub struct TestNetworkBuilder {
    graph: NetworkGraph,
    count: usize,
    current: Option<EquipmentId>,
    current_terminal: Option<usize>,
}

impl TestNetworkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Islands ---

    pub fn from_source(self, phases: PhaseCode) -> Self {
        self.start("s", source(phases), &[phases])
    }

    pub fn from_acls(self, phases: PhaseCode) -> Self {
        self.start("c", EquipmentKind::line_segment(None), &[phases, phases])
    }

    pub fn from_breaker(self, phases: PhaseCode) -> Self {
        self.start("b", EquipmentKind::Switch(SwitchState::closed()), &[phases, phases])
    }

    pub fn from_feeder_breaker(self, phases: PhaseCode) -> Self {
        self.start(
            "b",
            EquipmentKind::Switch(SwitchState::feeder_breaker()),
            &[phases, phases],
        )
    }

    pub fn from_junction(self, phases: PhaseCode, num_terminals: usize) -> Self {
        self.start("j", EquipmentKind::Plain, &vec![phases; num_terminals])
    }

    pub fn from_busbar(self, phases: PhaseCode) -> Self {
        self.start("bbs", EquipmentKind::BusbarSection, &[phases])
    }

    pub fn from_power_transformer(self, phases: &[PhaseCode]) -> Self {
        self.start("tx", EquipmentKind::PowerTransformer, phases)
    }

    pub fn from_other(mut self, mrid: &str, kind: EquipmentKind, phases: &[PhaseCode]) -> Self {
        let id = self.add(mrid.to_owned(), kind, phases);
        self.current = Some(id);
        self.current_terminal = None;
        self
    }

    // --- Chains ---

    pub fn to_source(self, phases: PhaseCode) -> Self {
        self.chain("s", source(phases), &[phases])
    }

    pub fn to_acls(self, phases: PhaseCode) -> Self {
        self.chain("c", EquipmentKind::line_segment(None), &[phases, phases])
    }

    pub fn to_breaker(self, phases: PhaseCode) -> Self {
        self.chain("b", EquipmentKind::Switch(SwitchState::closed()), &[phases, phases])
    }

    pub fn to_feeder_breaker(self, phases: PhaseCode) -> Self {
        self.chain(
            "b",
            EquipmentKind::Switch(SwitchState::feeder_breaker()),
            &[phases, phases],
        )
    }

    pub fn to_junction(self, phases: PhaseCode, num_terminals: usize) -> Self {
        self.chain("j", EquipmentKind::Plain, &vec![phases; num_terminals])
    }

    pub fn to_busbar(self, phases: PhaseCode) -> Self {
        self.chain("bbs", EquipmentKind::BusbarSection, &[phases])
    }

    pub fn to_power_transformer(self, phases: &[PhaseCode]) -> Self {
        self.chain("tx", EquipmentKind::PowerTransformer, phases)
    }

    pub fn to_other(mut self, mrid: &str, kind: EquipmentKind, phases: &[PhaseCode]) -> Self {
        let id = self.add(mrid.to_owned(), kind, phases);
        self.link_current_to(id);
        self
    }

    // --- Modifiers on the current equipment ---

    pub fn with_length(mut self, length: f64) -> Self {
        let id = self.current();
        self.graph
            .set_length(id, Some(length))
            .expect("current equipment is not an AC line segment");
        self
    }

    /// Open every core of the current switch in `view`.
    pub fn open(mut self, view: StateView) -> Self {
        let id = self.current();
        self.graph
            .set_open(id, view, None, true)
            .expect("current equipment is not a switch");
        self
    }

    /// Open one core of the current switch in `view`.
    pub fn open_core(mut self, view: StateView, core: usize) -> Self {
        let id = self.current();
        self.graph
            .set_open(id, view, Some(core), true)
            .expect("current equipment is not a switch");
        self
    }

    pub fn out_of_service(mut self, view: StateView) -> Self {
        let id = self.current();
        self.graph
            .set_in_service(id, view, false)
            .expect("current equipment exists");
        self
    }

    /// Clamp the current segment at `length_from_t1`.
    pub fn with_clamp(mut self, mrid: &str, length_from_t1: Option<f64>) -> Self {
        let segment = self.current();
        let phases = self.graph.phases_of(self.terminal(segment, 1));
        self.graph
            .add_equipment(mrid, EquipmentKind::clamp(segment, length_from_t1), &[phases])
            .expect("clamp could not be added");
        self
    }

    /// Cut the current segment at `length_from_t1`. The cut starts closed.
    pub fn with_cut(mut self, mrid: &str, length_from_t1: Option<f64>) -> Self {
        let segment = self.current();
        let phases = self.graph.phases_of(self.terminal(segment, 1));
        self.graph
            .add_equipment(mrid, EquipmentKind::cut(segment, length_from_t1), &[phases, phases])
            .expect("cut could not be added");
        self
    }

    // --- Wiring ---

    /// Make `mrid` current, continuing from `terminal` (its last by default).
    pub fn branch_from(mut self, mrid: &str, terminal: Option<usize>) -> Self {
        self.current = Some(self.id(mrid));
        self.current_terminal = terminal;
        self
    }

    /// Join two terminals without moving the current pointer.
    pub fn connect(mut self, from: &str, to: &str, from_terminal: usize, to_terminal: usize) -> Self {
        let a = self.terminal(self.id(from), from_terminal);
        let b = self.terminal(self.id(to), to_terminal);
        self.graph.connect(a, b).expect("terminals exist");
        self
    }

    pub fn graph(&self) -> &NetworkGraph {
        &self.graph
    }

    pub fn build(self) -> Network {
        Network::from_graph(self.graph)
    }

    // --- Internals ---

    fn next_id(&mut self, prefix: &str) -> String {
        let id = format!("{prefix}{}", self.count);
        self.count += 1;
        id
    }

    fn add(&mut self, mrid: String, kind: EquipmentKind, phases: &[PhaseCode]) -> EquipmentId {
        self.graph
            .add_equipment(mrid, kind, phases)
            .expect("equipment could not be added")
    }

    fn start(mut self, prefix: &str, kind: EquipmentKind, phases: &[PhaseCode]) -> Self {
        let mrid = self.next_id(prefix);
        let id = self.add(mrid, kind, phases);
        self.current = Some(id);
        self.current_terminal = None;
        self
    }

    fn chain(mut self, prefix: &str, kind: EquipmentKind, phases: &[PhaseCode]) -> Self {
        let mrid = self.next_id(prefix);
        let id = self.add(mrid, kind, phases);
        self.link_current_to(id);
        self
    }

    fn link_current_to(&mut self, id: EquipmentId) {
        let from = self.current();
        let sequence = self.current_terminal.unwrap_or_else(|| {
            self.graph
                .equipment(from)
                .map_or(1, |e| e.num_terminals())
        });
        let a = self.terminal(from, sequence);
        let b = self.terminal(id, 1);
        self.graph.connect(a, b).expect("terminals exist");
        self.current = Some(id);
        self.current_terminal = None;
    }

    fn current(&self) -> EquipmentId {
        self.current.expect("no current equipment, start with a from_* call")
    }

    fn id(&self, mrid: &str) -> EquipmentId {
        self.graph
            .equipment_by_mrid(mrid)
            .unwrap_or_else(|| panic!("no equipment named '{mrid}'"))
    }

    fn terminal(&self, id: EquipmentId, sequence: usize) -> TerminalId {
        self.graph
            .terminal_by_sequence(id, sequence)
            .unwrap_or_else(|| panic!("no terminal {sequence} on {id:?}"))
    }
}

fn source(phases: PhaseCode) -> EquipmentKind {
    EquipmentKind::EnergySource {
        phases: phases.single_phases().to_vec(),
    }
}

// ===========================================================================
// Lookup helpers
// ===========================================================================

/// Terminal `sequence` of the equipment named `mrid`. Panics if missing.
pub fn terminal(graph: &NetworkGraph, mrid: &str, sequence: usize) -> TerminalId {
    graph
        .terminal_of(mrid, sequence)
        .unwrap_or_else(|| panic!("no terminal {mrid}-t{sequence}"))
}

/// Traced phase of every nominal core on `mrid`-t`sequence` in `view`.
pub fn traced_phases(
    network: &Network,
    view: StateView,
    mrid: &str,
    sequence: usize,
) -> Vec<SinglePhaseKind> {
    let t = terminal(network.graph(), mrid, sequence);
    let state = network.phases(view).get(t);
    (0..network.graph().phases_of(t).num_phases())
        .map(|core| state.phase(core))
        .collect()
}

/// Traced direction of every nominal core on `mrid`-t`sequence` in `view`.
pub fn traced_directions(
    network: &Network,
    view: StateView,
    mrid: &str,
    sequence: usize,
) -> Vec<Direction> {
    let t = terminal(network.graph(), mrid, sequence);
    let state = network.phases(view).get(t);
    (0..network.graph().phases_of(t).num_phases())
        .map(|core| state.direction(core))
        .collect()
}

/// Assert the traced phases of every terminal of `mrid` in both views.
#[track_caller]
pub fn assert_phases(
    network: &Network,
    mrid: &str,
    normal: &[SinglePhaseKind],
    current: &[SinglePhaseKind],
) {
    let id = network
        .graph()
        .equipment_by_mrid(mrid)
        .unwrap_or_else(|| panic!("no equipment named '{mrid}'"));
    let count = network.graph().equipment(id).map_or(0, |e| e.num_terminals());
    for sequence in 1..=count {
        assert_eq!(
            traced_phases(network, StateView::Normal, mrid, sequence),
            normal,
            "normal phases of {mrid}-t{sequence}"
        );
        assert_eq!(
            traced_phases(network, StateView::Current, mrid, sequence),
            current,
            "current phases of {mrid}-t{sequence}"
        );
    }
}

// ===========================================================================
// Fixture networks
// ===========================================================================

/// A breaker whose terminal 2 feeds two busbars, each with two breakers.
///
/// ```text
///        1
///        b0
/// bbs1 1-2-1 bbs2
/// -----|   |-----
/// 1    1   1    1
/// b3   b4  b5   b6
/// ```
pub fn busbar_network() -> Network {
    TestNetworkBuilder::new()
        .from_breaker(PhaseCode::ABC) // b0
        .to_busbar(PhaseCode::ABC) // bbs1
        .branch_from("b0", Some(2))
        .to_busbar(PhaseCode::ABC) // bbs2
        .branch_from("bbs1", Some(1))
        .to_breaker(PhaseCode::ABC) // b3
        .branch_from("bbs1", Some(1))
        .to_breaker(PhaseCode::ABC) // b4
        .branch_from("bbs2", Some(1))
        .to_breaker(PhaseCode::ABC) // b5
        .branch_from("bbs2", Some(1))
        .to_breaker(PhaseCode::ABC) // b6
        .build()
}

/// `b0 - c1 - b2` with an unknown-length segment clamped at 1.0 and 2.0.
pub fn clamps_network() -> Network {
    TestNetworkBuilder::new()
        .from_breaker(PhaseCode::ABC) // b0
        .to_acls(PhaseCode::ABC) // c1
        .with_clamp("clamp1", Some(1.0))
        .with_clamp("clamp2", Some(2.0))
        .to_breaker(PhaseCode::ABC) // b2
        .build()
}

/// `b0 - c1 - b2` where c1 (length 10) carries, from terminal 1:
/// clamp1 at 1, cut1 at 2, clamp2 at 3, clamp3 at 4, cut2 at 5, clamp4 at 6.
///
/// Every attachment terminal has its own segment connected to it:
/// c3 on clamp1, c4 and c5 on cut1, c6 on clamp2, c7 on clamp3, c8 and c9
/// on cut2, c10 on clamp4.
pub fn multi_cut_and_clamp_network() -> Network {
    let builder = TestNetworkBuilder::new()
        .from_breaker(PhaseCode::ABC) // b0
        .to_acls(PhaseCode::ABC) // c1
        .with_length(10.0)
        .with_clamp("clamp1", Some(1.0))
        .with_cut("cut1", Some(2.0))
        .with_clamp("clamp2", Some(3.0))
        .with_clamp("clamp3", Some(4.0))
        .with_cut("cut2", Some(5.0))
        .with_clamp("clamp4", Some(6.0))
        .to_breaker(PhaseCode::ABC); // b2

    let taps = [
        ("clamp1", 1),
        ("cut1", 1),
        ("cut1", 2),
        ("clamp2", 1),
        ("clamp3", 1),
        ("cut2", 1),
        ("cut2", 2),
        ("clamp4", 1),
    ];
    taps.into_iter()
        .fold(builder, |builder, (attachment, sequence)| {
            let builder = builder.from_acls(PhaseCode::ABC);
            let tap = format!("c{}", builder.count - 1);
            builder.connect(attachment, &tap, sequence, 1)
        })
        .build()
}

/// `b0 - c1 - b2` with c1 (length 2) carrying two clamps and two cuts at
/// each of 0.0 (or unknown), 1.0 and 2.0. Every attachment terminal has its
/// own segment (`c-clampN`, `c-cutNtM`).
pub fn same_position_network() -> Network {
    let mut builder = TestNetworkBuilder::new()
        .from_breaker(PhaseCode::ABC) // b0
        .to_acls(PhaseCode::ABC) // c1
        .with_length(2.0)
        .with_clamp("clamp1", Some(0.0))
        .with_clamp("clamp2", None)
        .with_cut("cut1", Some(0.0))
        .with_cut("cut2", None)
        .with_clamp("clamp3", Some(1.0))
        .with_clamp("clamp4", Some(1.0))
        .with_cut("cut3", Some(1.0))
        .with_cut("cut4", Some(1.0))
        .with_clamp("clamp5", Some(2.0))
        .with_clamp("clamp6", Some(2.0))
        .with_cut("cut5", Some(2.0))
        .with_cut("cut6", Some(2.0))
        .to_breaker(PhaseCode::ABC); // b2

    for n in 1..=6 {
        let clamp = format!("clamp{n}");
        let tap = format!("c-{clamp}");
        builder = builder
            .from_other(&tap, EquipmentKind::line_segment(None), &[PhaseCode::ABC; 2])
            .connect(&clamp, &tap, 1, 1);
        for sequence in 1..=2 {
            let cut = format!("cut{n}");
            let tap = format!("c-{cut}t{sequence}");
            builder = builder
                .from_other(&tap, EquipmentKind::line_segment(None), &[PhaseCode::ABC; 2])
                .connect(&cut, &tap, sequence, 1);
        }
    }
    builder.build()
}

/// `s0 - b1 (feeder breaker) - c2 - c3 - ... ` with `segments` segments.
pub fn long_feeder(segments: usize, phases: PhaseCode) -> Network {
    (0..segments)
        .fold(
            TestNetworkBuilder::new()
                .from_source(phases)
                .to_feeder_breaker(phases),
            |builder, _| builder.to_acls(phases),
        )
        .build()
}

/// A feeder that splits into `fan_out` parallel runs of `depth` segments
/// through a junction after the breaker.
pub fn fanned_feeder(fan_out: usize, depth: usize) -> Network {
    let mut builder = TestNetworkBuilder::new()
        .from_source(PhaseCode::ABCN) // s0
        .to_feeder_breaker(PhaseCode::ABCN) // b1
        .to_junction(PhaseCode::ABCN, fan_out + 1); // j2
    for branch in 0..fan_out {
        builder = builder.branch_from("j2", Some(branch + 2));
        for _ in 0..depth {
            builder = builder.to_acls(PhaseCode::ABCN);
        }
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_names_by_prefix_and_counter() {
        let network = TestNetworkBuilder::new()
            .from_source(PhaseCode::ABC)
            .to_acls(PhaseCode::ABC)
            .to_breaker(PhaseCode::ABC)
            .build();
        let graph = network.graph();
        for mrid in ["s0", "c1", "b2"] {
            assert!(graph.equipment_by_mrid(mrid).is_some(), "{mrid}");
        }
        assert_eq!(
            graph.connected_terminals(terminal(graph, "s0", 1)),
            vec![terminal(graph, "c1", 1)]
        );
        assert_eq!(
            graph.connected_terminals(terminal(graph, "c1", 2)),
            vec![terminal(graph, "b2", 1)]
        );
    }

    #[test]
    fn islands_and_custom_equipment_link_up() {
        let network = TestNetworkBuilder::new()
            .from_feeder_breaker(PhaseCode::AB) // b0
            .to_source(PhaseCode::AB) // s1
            .from_power_transformer(&[PhaseCode::AB, PhaseCode::AN]) // tx2
            .to_other("load", EquipmentKind::Plain, &[PhaseCode::AN])
            .build();
        let graph = network.graph();

        let b0 = graph.equipment_by_mrid("b0").unwrap();
        assert!(graph.equipment(b0).unwrap().is_substation_breaker());
        assert_eq!(
            graph.connected_terminals(terminal(graph, "b0", 2)),
            vec![terminal(graph, "s1", 1)]
        );
        assert_eq!(
            graph.connected_terminals(terminal(graph, "tx2", 2)),
            vec![terminal(graph, "load", 1)]
        );
        assert!(graph.connected_terminals(terminal(graph, "tx2", 1)).is_empty());
    }

    #[test]
    fn busbar_network_shares_one_node() {
        let network = busbar_network();
        let graph = network.graph();
        let node = graph.terminal(terminal(graph, "b0", 2)).unwrap().node().unwrap();
        assert_eq!(graph.node(node).unwrap().terminals().len(), 7);
    }

    #[test]
    fn multi_cut_network_has_taps_on_every_attachment() {
        let network = multi_cut_and_clamp_network();
        let graph = network.graph();
        let tap = |mrid: &str, n: usize| graph.connected_terminals(terminal(graph, mrid, n));
        assert_eq!(tap("clamp1", 1), vec![terminal(graph, "c3", 1)]);
        assert_eq!(tap("cut1", 2), vec![terminal(graph, "c5", 1)]);
        assert_eq!(tap("clamp4", 1), vec![terminal(graph, "c10", 1)]);

        let segment = graph.equipment_by_mrid("c1").unwrap();
        let EquipmentKind::AcLineSegment(line) = &graph.equipment(segment).unwrap().kind else {
            panic!("c1 is not a segment");
        };
        assert_eq!(line.cuts().len(), 2);
        assert_eq!(line.clamps().len(), 4);
    }
}
