//! Next-hop discovery for walking a power network terminal by terminal.
//!
//! [`StepPathProvider`] knows how energy moves between terminals: through
//! equipment, across connectivity nodes (preferring busbars), and along line
//! segments that carry cuts and clamps at positions measured from terminal 1.

use crate::connectivity::{NominalPhasePath, internal_connectivity, terminal_connectivity};
use crate::id::{EquipmentId, TerminalId};
use crate::network::{Equipment, EquipmentKind, NetworkGraph, StateView};
use crate::phase::SinglePhaseKind;
use crate::queue::QueueDiscipline;
use crate::traversal::{StepContext, StepQueue, Traversal};
use std::collections::HashSet;
use std::convert::Infallible;

// ---------------------------------------------------------------------------
// StepPath
// ---------------------------------------------------------------------------

/// One hop between two terminals.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StepPath {
    pub from_terminal: TerminalId,
    pub to_terminal: TerminalId,
    /// The segment walked along to make this hop, if any.
    pub traversed_segment: Option<EquipmentId>,
    /// Phases carried by the hop. Empty means phases are not followed.
    pub phase_paths: Vec<NominalPhasePath>,
}

impl StepPath {
    pub fn new(from_terminal: TerminalId, to_terminal: TerminalId) -> Self {
        Self {
            from_terminal,
            to_terminal,
            traversed_segment: None,
            phase_paths: Vec::new(),
        }
    }

    /// A hop made by walking along `segment`.
    pub fn traversed(from_terminal: TerminalId, to_terminal: TerminalId, segment: EquipmentId) -> Self {
        Self {
            traversed_segment: Some(segment),
            ..Self::new(from_terminal, to_terminal)
        }
    }

    /// A zero-length internal path used to start a walk on `terminal`.
    pub fn start(terminal: TerminalId) -> Self {
        Self::new(terminal, terminal)
    }

    pub fn with_phase_paths(mut self, phase_paths: Vec<NominalPhasePath>) -> Self {
        self.phase_paths = phase_paths;
        self
    }

    /// Both terminals belong to the same equipment.
    pub fn traced_internally(&self, graph: &NetworkGraph) -> bool {
        graph.equipment_id_of(self.from_terminal) == graph.equipment_id_of(self.to_terminal)
    }

    pub fn did_traverse_segment(&self) -> bool {
        self.traversed_segment.is_some()
    }

    /// Phases arriving at `to_terminal`, without duplicates.
    pub fn to_phases(&self) -> Vec<SinglePhaseKind> {
        let mut phases = Vec::with_capacity(self.phase_paths.len());
        for path in &self.phase_paths {
            if !phases.contains(&path.to) {
                phases.push(path.to);
            }
        }
        phases
    }
}

/// Tracker key for walks over [`StepPath`]s.
pub fn to_terminal(path: &StepPath) -> TerminalId {
    path.to_terminal
}

// ---------------------------------------------------------------------------
// Segment traversal parameters
// ---------------------------------------------------------------------------

/// Where and how to walk along a segment.
struct SegmentWalk {
    segment: EquipmentId,
    from_terminal: TerminalId,
    position: f64,
    towards_t2: bool,
    can_stop_at_same_position: bool,
    /// Terminal of same-position cuts to emit (1 or 2).
    same_position_terminal: usize,
}

// ---------------------------------------------------------------------------
// StepPathProvider
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct StepPathProvider<'g> {
    graph: &'g NetworkGraph,
    view: StateView,
}

impl<'g> StepPathProvider<'g> {
    pub fn new(graph: &'g NetworkGraph, view: StateView) -> Self {
        Self { graph, view }
    }

    pub fn graph(&self) -> &'g NetworkGraph {
        self.graph
    }

    pub fn view(&self) -> StateView {
        self.view
    }

    /// Every hop leading on from `path.to_terminal` to in-service equipment.
    pub fn next_paths(&self, path: &StepPath) -> Vec<StepPath> {
        let Some(to_id) = self.graph.equipment_id_of(path.to_terminal) else {
            return Vec::new();
        };
        let Some(to_equipment) = self.graph.equipment(to_id) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        match &to_equipment.kind {
            EquipmentKind::AcLineSegment(line) => {
                if path.traced_internally(self.graph) || path.did_traverse_segment() {
                    self.external(path, &mut out);
                } else if self.sequence_of(path.to_terminal) == 1 {
                    self.walk_segment(path, self.segment_walk(to_id, path.to_terminal, 0.0, true, true, 1), &mut out);
                } else {
                    let position = line.length_or_max();
                    self.walk_segment(path, self.segment_walk(to_id, path.to_terminal, position, false, true, 2), &mut out);
                }
            }
            EquipmentKind::BusbarSection => self.from_busbar(path, &mut out),
            EquipmentKind::Clamp(clamp) => {
                if path.did_traverse_segment() {
                    self.external(path, &mut out);
                } else {
                    if path.traced_internally(self.graph) {
                        self.external(path, &mut out);
                    }
                    self.walk_from_clamp(path, clamp.segment, to_equipment, &mut out);
                }
            }
            EquipmentKind::Cut(cut) => {
                let sequence = self.sequence_of(path.to_terminal);
                if path.did_traverse_segment() {
                    self.external(path, &mut out);
                } else {
                    let walk = self.segment_walk(
                        cut.segment,
                        path.to_terminal,
                        to_equipment.length_from_t1_or_0(),
                        sequence != 1,
                        false,
                        sequence,
                    );
                    self.walk_segment(path, walk, &mut out);
                }

                if path.traced_internally(self.graph) {
                    self.external(path, &mut out);
                } else {
                    let across = self
                        .graph
                        .terminal_by_sequence(to_id, if sequence == 1 { 2 } else { 1 });
                    self.emit(path, across, None, &mut out);
                }
            }
            EquipmentKind::Plain
            | EquipmentKind::Switch(_)
            | EquipmentKind::PowerTransformer
            | EquipmentKind::EnergySource { .. } => {
                if path.traced_internally(self.graph) {
                    self.external(path, &mut out);
                } else {
                    self.emit(path, self.graph.other_terminals(path.to_terminal), None, &mut out);
                }
            }
        }

        out.retain(|p| {
            self.graph
                .equipment_of(p.to_terminal)
                .is_some_and(|e| e.is_in_service(self.view))
        });
        out
    }

    fn sequence_of(&self, terminal: TerminalId) -> usize {
        self.graph
            .terminal(terminal)
            .map_or(0, |t| t.sequence_number())
    }

    fn segment_walk(
        &self,
        segment: EquipmentId,
        from_terminal: TerminalId,
        position: f64,
        towards_t2: bool,
        can_stop_at_same_position: bool,
        same_position_terminal: usize,
    ) -> SegmentWalk {
        SegmentWalk {
            segment,
            from_terminal,
            position,
            towards_t2,
            can_stop_at_same_position,
            same_position_terminal,
        }
    }

    // --- Hop construction ---

    /// Build the hop from `path.to_terminal` to `next`.
    ///
    /// When phases are followed, the hop keeps only the phases that connect
    /// and is dropped if none do.
    fn hop(&self, path: &StepPath, next: TerminalId, traversed: Option<EquipmentId>) -> Option<StepPath> {
        let from = path.to_terminal;
        let hop = StepPath {
            from_terminal: from,
            to_terminal: next,
            traversed_segment: traversed,
            phase_paths: Vec::new(),
        };
        if path.phase_paths.is_empty() {
            return Some(hop);
        }

        let include = path.to_phases();
        let internal = traversed.is_some()
            || self.graph.equipment_id_of(from) == self.graph.equipment_id_of(next);
        let result = if internal {
            internal_connectivity(self.graph, from, next, Some(include.as_slice()))
        } else {
            terminal_connectivity(self.graph, from, next, &include)
        };
        (!result.is_empty()).then(|| hop.with_phase_paths(result.paths))
    }

    fn emit(
        &self,
        path: &StepPath,
        terminals: impl IntoIterator<Item = TerminalId>,
        traversed: Option<EquipmentId>,
        out: &mut Vec<StepPath>,
    ) {
        out.extend(
            terminals
                .into_iter()
                .filter_map(|t| self.hop(path, t, traversed)),
        );
    }

    // --- External stepping ---

    fn external(&self, path: &StepPath, out: &mut Vec<StepPath>) {
        let to = path.to_terminal;
        if self.graph.equipment_of(to).is_some_and(Equipment::is_busbar) {
            self.from_busbar(path, out);
        } else if self.graph.has_connected_busbars(to) {
            let busbars = self
                .graph
                .connected_terminals(to)
                .into_iter()
                .filter(|t| self.is_busbar_terminal(*t));
            self.emit(path, busbars, None, out);
        } else {
            self.emit(path, self.graph.connected_terminals(to), None, out);
        }
    }

    fn from_busbar(&self, path: &StepPath, out: &mut Vec<StepPath>) {
        let others = self
            .graph
            .connected_terminals(path.to_terminal)
            .into_iter()
            .filter(|t| *t != path.from_terminal && !self.is_busbar_terminal(*t));
        self.emit(path, others, None, out);
    }

    fn is_busbar_terminal(&self, terminal: TerminalId) -> bool {
        self.graph
            .equipment_of(terminal)
            .is_some_and(Equipment::is_busbar)
    }

    // --- Segment walking ---

    fn walk_from_clamp(
        &self,
        path: &StepPath,
        segment: EquipmentId,
        clamp: &Equipment,
        out: &mut Vec<StepPath>,
    ) {
        let position = clamp.length_from_t1_or_0();
        let mut towards_t1 = Vec::new();
        self.walk_segment(
            path,
            self.segment_walk(segment, path.to_terminal, position, false, false, 1),
            &mut towards_t1,
        );
        let mut towards_t2 = Vec::new();
        self.walk_segment(
            path,
            self.segment_walk(segment, path.to_terminal, position, true, true, 1),
            &mut towards_t2,
        );

        let mut seen: HashSet<TerminalId> = towards_t1.iter().map(|p| p.to_terminal).collect();
        out.extend(towards_t1);
        out.extend(towards_t2.into_iter().filter(|p| seen.insert(p.to_terminal)));
    }

    /// Emit the terminals reached walking along a segment: same-position
    /// cuts, then clamps up to the next stop, then the stop itself.
    fn walk_segment(&self, path: &StepPath, walk: SegmentWalk, out: &mut Vec<StepPath>) {
        let Some(segment) = self.graph.equipment(walk.segment) else {
            return;
        };
        let EquipmentKind::AcLineSegment(line) = &segment.kind else {
            return;
        };
        let traversed = Some(walk.segment);

        if line.cuts().is_empty() && line.clamps().is_empty() {
            self.emit(path, self.graph.other_terminals(walk.from_terminal), traversed, out);
            return;
        }

        let from_equipment = self.graph.equipment_id_of(walk.from_terminal);
        let positioned = |ids: &[EquipmentId]| -> Vec<(EquipmentId, f64)> {
            ids.iter()
                .copied()
                .filter(|id| Some(*id) != from_equipment)
                .filter_map(|id| {
                    let equipment = self.graph.equipment(id)?;
                    equipment
                        .is_in_service(self.view)
                        .then(|| (id, equipment.length_from_t1_or_0()))
                })
                .collect()
        };
        let cuts = positioned(line.cuts());
        let clamps = positioned(line.clamps());

        let same_position: Vec<EquipmentId> = cuts
            .iter()
            .filter(|(_, at)| *at == walk.position)
            .map(|(id, _)| *id)
            .collect();
        let stop_at_same_position = walk.can_stop_at_same_position && !same_position.is_empty();

        let next_cut_position = if stop_at_same_position {
            Some(walk.position)
        } else if walk.towards_t2 {
            cuts.iter()
                .map(|(_, at)| *at)
                .filter(|at| *at > walk.position)
                .reduce(f64::min)
        } else {
            cuts.iter()
                .map(|(_, at)| *at)
                .filter(|at| *at < walk.position)
                .reduce(f64::max)
        };
        let next_cuts: Vec<EquipmentId> = match next_cut_position {
            Some(next) => cuts
                .iter()
                .filter(|(_, at)| *at == next)
                .map(|(id, _)| *id)
                .collect(),
            None => Vec::new(),
        };
        let next_position = next_cut_position.unwrap_or(if walk.towards_t2 {
            line.length_or_max()
        } else {
            0.0
        });

        // A clamp sharing a cut's position sits on the cut's terminal 1 side.
        let from_segment = from_equipment == Some(walk.segment);
        let before_next_stop = |at: f64| {
            if from_segment && walk.towards_t2 {
                walk.position <= at && at <= next_position
            } else if walk.towards_t2 {
                walk.position < at && at <= next_position
            } else if next_position == 0.0 && next_cuts.is_empty() {
                0.0 <= at && at <= walk.position
            } else {
                next_position < at && at <= walk.position
            }
        };

        let same_position_terminals = same_position
            .iter()
            .filter_map(|id| self.graph.terminal_by_sequence(*id, walk.same_position_terminal));
        self.emit(path, same_position_terminals, traversed, out);

        let clamp_terminals = clamps
            .iter()
            .filter(|(_, at)| before_next_stop(*at))
            .filter_map(|(id, _)| self.graph.terminal_by_sequence(*id, 1));
        self.emit(path, clamp_terminals, traversed, out);

        if stop_at_same_position {
            return;
        }
        if next_cuts.is_empty() {
            let far_end = self
                .graph
                .terminal_by_sequence(walk.segment, if walk.towards_t2 { 2 } else { 1 });
            self.emit(path, far_end, traversed, out);
        } else {
            let facing = if walk.towards_t2 { 1 } else { 2 };
            let stops = next_cuts
                .iter()
                .filter_map(|id| self.graph.terminal_by_sequence(*id, facing));
            self.emit(path, stops, traversed, out);
        }
    }
}

// ---------------------------------------------------------------------------
// Ready-made topology walk
// ---------------------------------------------------------------------------

/// A traversal over [`StepPath`]s driven by [`StepPathProvider`], tracked by
/// the terminal each path arrives at.
pub fn network_trace<'g>(
    graph: &'g NetworkGraph,
    view: StateView,
    discipline: QueueDiscipline<StepPath>,
) -> Traversal<'g, StepPath, TerminalId, Infallible> {
    let provider = StepPathProvider::new(graph, view);
    Traversal::keyed(
        discipline,
        to_terminal,
        move |path: &StepPath, _: &StepContext, queue: &mut StepQueue<'_, StepPath, TerminalId>| {
            for next in provider.next_paths(path) {
                queue.queue(next);
            }
            Ok(())
        },
    )
}
