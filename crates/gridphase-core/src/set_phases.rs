//! Phase propagation from energy sources.
//!
//! [`SetPhases`] seeds every feeder breaker found upstream of an energy
//! source with the source's phases, then walks the network once per
//! [`StateView`] with the step path provider. Each hop carries the phases
//! still flowing; a hop is only continued while it changes the traced state
//! of the terminal it reaches.
//!
//! Flow never passes through a feeder breaker during a walk. Once the walks
//! have settled, two-terminal feeder breakers are reconciled in rounds: a
//! side that was energised from downstream feeds the untraced side, and the
//! walk continues from there.

use crate::config::SetPhasesConfig;
use crate::connectivity::{NominalPhasePath, internal_connectivity};
use crate::id::{EquipmentId, TerminalId};
use crate::network::{Equipment, EquipmentKind, Network, NetworkError, NetworkGraph, StateView};
use crate::phase::{Direction, SinglePhaseKind};
use crate::phase_state::{PhaseStateError, TerminalPhases};
use crate::queue::QueueDiscipline;
use crate::step_path::{StepPath, StepPathProvider};
use crate::traversal::{StepContext, StepQueue, Traversal, TraversalError};
use std::cell::Cell;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// A phase arriving on a core that already carries a different one.
///
/// Only the hop that hit it is dropped; the rest of the walk carries on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "{view:?} view: core {core} of '{to_equipment}' already carries {existing}, \
     {attempted} arriving from '{from_equipment}'"
)]
pub struct PhaseConflict {
    pub view: StateView,
    pub from_terminal: TerminalId,
    pub to_terminal: TerminalId,
    pub from_equipment: String,
    pub to_equipment: String,
    pub core: usize,
    pub existing: SinglePhaseKind,
    pub attempted: SinglePhaseKind,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SetPhasesError {
    #[error("energy source '{mrid}' declares {declared} phases but has {cores} cores")]
    SourcePhaseMismatch {
        mrid: String,
        declared: usize,
        cores: usize,
    },

    #[error("no feeder breaker is reachable from energy source '{mrid}'")]
    NoFeederBreaker { mrid: String },

    #[error("terminal {sequence} of '{mrid}' has {expected} nominal phases, {found} were given")]
    PhaseCountMismatch {
        mrid: String,
        sequence: usize,
        found: usize,
        expected: usize,
    },

    #[error(transparent)]
    Traversal(#[from] TraversalError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    PhaseState(#[from] PhaseStateError),
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// What a run did, beyond the phases it wrote.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhasingReport {
    /// Terminals the walks started from.
    pub seeded_terminals: Vec<TerminalId>,
    /// Conflicts from both views, each of which dropped one hop.
    pub conflicts: Vec<PhaseConflict>,
    /// Reconciliation rounds summed over both views.
    pub reconciliation_rounds: usize,
    /// Whether a view stopped reconciling at `max_reconciliation_rounds`.
    pub round_limit_hit: bool,
}

impl PhasingReport {
    fn absorb(&mut self, pass: PassOutcome) {
        self.conflicts.extend(pass.conflicts);
        self.reconciliation_rounds += pass.rounds;
        self.round_limit_hit |= pass.round_limit_hit;
    }
}

#[derive(Debug, Default)]
struct PassOutcome {
    conflicts: Vec<PhaseConflict>,
    walks: usize,
    rounds: usize,
    round_limit_hit: bool,
}

// ---------------------------------------------------------------------------
// SetPhases
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct SetPhases {
    config: SetPhasesConfig,
}

impl SetPhases {
    pub fn new(config: SetPhasesConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SetPhasesConfig {
        &self.config
    }

    /// Trace phases from every energy source into both views.
    ///
    /// Existing traced phases are kept and added to.
    pub fn run(&self, network: &mut Network) -> Result<PhasingReport, SetPhasesError> {
        let (graph, normal, current) = network.split_mut();
        let mut report = PhasingReport::default();
        report.seeded_terminals = seed_feeders(graph, normal, current, &mut report.conflicts)?;

        let seeds = report.seeded_terminals.clone();
        let (normal_pass, current_pass) = self.run_passes(graph, normal, current, &seeds);
        report.absorb(normal_pass?);
        report.absorb(current_pass?);
        Ok(report)
    }

    /// Apply `phases` to `terminal` in both views and trace on from it.
    ///
    /// `phases` lines up with the terminal's cores. Positional phases are
    /// stored as untraced.
    pub fn run_with_terminal(
        &self,
        network: &mut Network,
        terminal: TerminalId,
        phases: &[SinglePhaseKind],
    ) -> Result<PhasingReport, SetPhasesError> {
        let (graph, normal, current) = network.split_mut();
        let equipment = graph
            .equipment_of(terminal)
            .ok_or(NetworkError::TerminalNotFound(terminal))?;
        let expected = graph.phases_of(terminal).num_phases();
        if phases.len() != expected {
            return Err(SetPhasesError::PhaseCountMismatch {
                mrid: equipment.mrid.clone(),
                sequence: graph.terminal(terminal).map_or(0, |t| t.sequence_number()),
                found: phases.len(),
                expected,
            });
        }

        for view_phases in [&mut *normal, &mut *current] {
            let Some(state) = view_phases.get_mut(terminal) else {
                continue;
            };
            for (core, phase) in phases.iter().enumerate() {
                state.set(core, traceable(*phase), Direction::Out)?;
            }
        }
        log::debug!("applied {phases:?} to terminal of '{}'", equipment.mrid);

        let mut report = PhasingReport {
            seeded_terminals: vec![terminal],
            ..PhasingReport::default()
        };
        let (normal_pass, current_pass) = self.run_passes(graph, normal, current, &[terminal]);
        report.absorb(normal_pass?);
        report.absorb(current_pass?);
        Ok(report)
    }

    /// Flow the traced phases of `from` across its equipment onto `to`.
    ///
    /// `phases_to_flow` restricts the nominal phases of `from` that flow.
    /// Returns the nominal phases of `to` that changed.
    pub fn spread_phases(
        graph: &NetworkGraph,
        view: StateView,
        phases: &mut TerminalPhases,
        from: TerminalId,
        to: TerminalId,
        phases_to_flow: Option<&[SinglePhaseKind]>,
    ) -> Result<Vec<SinglePhaseKind>, PhaseConflict> {
        let connectivity = internal_connectivity(graph, from, to, phases_to_flow);
        let changed = Flow::new(graph, view, from, to).apply(
            phases,
            &connectivity.paths,
            Direction::Out,
            true,
        )?;
        Ok(changed.into_iter().map(|p| p.to).collect())
    }

    // --- Passes ---

    fn run_passes(
        &self,
        graph: &NetworkGraph,
        normal: &mut TerminalPhases,
        current: &mut TerminalPhases,
        seeds: &[TerminalId],
    ) -> (
        Result<PassOutcome, TraversalError>,
        Result<PassOutcome, TraversalError>,
    ) {
        #[cfg(feature = "parallel")]
        if self.config.concurrent_passes {
            return rayon::join(
                || self.run_pass(graph, StateView::Normal, normal, seeds),
                || self.run_pass(graph, StateView::Current, current, seeds),
            );
        }

        (
            self.run_pass(graph, StateView::Normal, normal, seeds),
            self.run_pass(graph, StateView::Current, current, seeds),
        )
    }

    fn run_pass(
        &self,
        graph: &NetworkGraph,
        view: StateView,
        phases: &mut TerminalPhases,
        seeds: &[TerminalId],
    ) -> Result<PassOutcome, TraversalError> {
        let mut outcome = PassOutcome::default();
        for &seed in seeds {
            let start = start_path(graph, phases, seed);
            if start.phase_paths.is_empty() {
                continue;
            }
            outcome.conflicts.extend(self.walk(graph, view, phases, start)?);
            outcome.walks += 1;
        }
        self.reconcile(graph, view, phases, &mut outcome)?;

        for conflict in &outcome.conflicts {
            log::warn!("{conflict}");
        }
        log::info!(
            "{view:?} pass: {} walks, {} reconciliation rounds, {} conflicts",
            outcome.walks,
            outcome.rounds,
            outcome.conflicts.len()
        );
        Ok(outcome)
    }

    /// Walk on from `start`, writing phases as hops are queued.
    ///
    /// A conflicting hop is recorded and dropped; its siblings carry on.
    fn walk(
        &self,
        graph: &NetworkGraph,
        view: StateView,
        phases: &mut TerminalPhases,
        start: StepPath,
    ) -> Result<Vec<PhaseConflict>, TraversalError> {
        let provider = StepPathProvider::new(graph, view);
        let mut conflicts = Vec::new();
        let mut traversal = Traversal::keyed(
            self.config.discipline.discipline(),
            arrival_key,
            |path: &StepPath,
             _: &StepContext,
             queue: &mut StepQueue<'_, StepPath, ArrivalKey>|
             -> Result<(), PhaseConflict> {
                let mut changed = Vec::new();
                for hop in provider.next_paths(path) {
                    match flow_hop(graph, view, phases, hop) {
                        Ok(Some(hop)) => changed.push(hop),
                        Ok(None) => {}
                        Err(conflict) => conflicts.push(conflict),
                    }
                }
                if changed.len() > 1 {
                    changed.into_iter().for_each(|hop| queue.branch(hop));
                } else {
                    changed.into_iter().for_each(|hop| queue.queue(hop));
                }
                Ok(())
            },
        );
        traversal.add_start_item(start);
        traversal.run(true)?;
        let failures = traversal.take_failures();
        drop(traversal);
        conflicts.extend(failures);
        Ok(conflicts)
    }

    // --- Feeder breaker reconciliation ---

    fn reconcile(
        &self,
        graph: &NetworkGraph,
        view: StateView,
        phases: &mut TerminalPhases,
        outcome: &mut PassOutcome,
    ) -> Result<(), TraversalError> {
        let mut pending: Vec<EquipmentId> = graph
            .iter_equipment()
            .filter(|(_, e)| e.is_substation_breaker())
            .filter_map(|(id, e)| match e.num_terminals() {
                2 => Some(id),
                1 => None,
                n => {
                    log::warn!("skipping feeder breaker '{}' with {n} terminals", e.mrid);
                    None
                }
            })
            .collect();

        loop {
            let mut crossings = Vec::new();
            for &id in &pending {
                let Some(breaker) = graph.equipment(id) else {
                    continue;
                };
                let &[a, b] = breaker.terminals() else {
                    continue;
                };
                crossings.extend(breaker_crossing(graph, view, phases, breaker, a, b));
                crossings.extend(breaker_crossing(graph, view, phases, breaker, b, a));
            }

            if crossings.is_empty() {
                break;
            }
            if let Some(max) = self.config.max_reconciliation_rounds
                && outcome.rounds >= max
            {
                log::warn!("{view:?} pass: stopped reconciling feeder breakers after {max} rounds");
                outcome.round_limit_hit = true;
                break;
            }

            outcome.rounds += 1;
            log::debug!(
                "{view:?} reconciliation round {}: {} breaker crossings",
                outcome.rounds,
                crossings.len()
            );
            for crossing in crossings {
                let flow = Flow::new(graph, view, crossing.from_terminal, crossing.to_terminal);
                let applied = flow.apply(phases, &crossing.phase_paths, Direction::Out, false);
                let changed = match applied {
                    Ok(changed) => changed,
                    Err(conflict) => {
                        outcome.conflicts.push(conflict);
                        continue;
                    }
                };
                if changed.is_empty() {
                    continue;
                }
                let start = crossing.with_phase_paths(changed);
                outcome.conflicts.extend(self.walk(graph, view, phases, start)?);
                outcome.walks += 1;
            }

            pending.retain(|id| {
                graph
                    .equipment(*id)
                    .is_some_and(|breaker| !is_fully_traced(graph, phases, breaker))
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Seeding
// ---------------------------------------------------------------------------

/// Write each source's phases onto the outward terminals of its nearest
/// feeder breaker, in both views. Returns the seeded terminals.
fn seed_feeders(
    graph: &NetworkGraph,
    normal: &mut TerminalPhases,
    current: &mut TerminalPhases,
    conflicts: &mut Vec<PhaseConflict>,
) -> Result<Vec<TerminalId>, SetPhasesError> {
    let mut seeds = Vec::new();
    for source_id in graph.energy_sources() {
        let Some(source) = graph.equipment(source_id) else {
            continue;
        };
        let EquipmentKind::EnergySource { phases } = &source.kind else {
            continue;
        };
        if phases.is_empty() {
            log::debug!("energy source '{}' declares no phases, skipping", source.mrid);
            continue;
        }

        let cores = source
            .terminals()
            .first()
            .map_or(0, |t| graph.phases_of(*t).num_phases());
        if cores != phases.len() {
            return Err(SetPhasesError::SourcePhaseMismatch {
                mrid: source.mrid.clone(),
                declared: phases.len(),
                cores,
            });
        }

        let reached = nearest_feeder_breaker(graph, source)?.ok_or_else(|| {
            SetPhasesError::NoFeederBreaker {
                mrid: source.mrid.clone(),
            }
        })?;
        let mut outward = graph.other_terminals(reached);
        if outward.is_empty() {
            outward.push(reached);
        }

        for terminal in outward {
            for (view, view_phases) in [(StateView::Normal, &mut *normal), (StateView::Current, &mut *current)] {
                let Some(state) = view_phases.get_mut(terminal) else {
                    continue;
                };
                for (core, phase) in phases.iter().enumerate() {
                    match state.add(core, traceable(*phase), Direction::Out) {
                        Ok(_) => {}
                        Err(PhaseStateError::CrossingPhases {
                            core,
                            existing,
                            attempted,
                        }) => conflicts.push(PhaseConflict {
                            view,
                            from_terminal: terminal,
                            to_terminal: terminal,
                            from_equipment: source.mrid.clone(),
                            to_equipment: mrid_of(graph, terminal),
                            core,
                            existing,
                            attempted,
                        }),
                        Err(e) => return Err(e.into()),
                    }
                }
            }
            log::debug!(
                "seeded {phases:?} from '{}' at '{}'",
                source.mrid,
                mrid_of(graph, terminal)
            );
            seeds.push(terminal);
        }
    }
    Ok(seeds)
}

/// Terminal of the first substation breaker a breadth-first walk from
/// `source` reaches, ignoring phases and switch state.
fn nearest_feeder_breaker(
    graph: &NetworkGraph,
    source: &Equipment,
) -> Result<Option<TerminalId>, TraversalError> {
    let found = Cell::new(None);
    let is_breaker =
        |t: &TerminalId| graph.equipment_of(*t).is_some_and(Equipment::is_substation_breaker);

    let mut traversal: Traversal<'_, TerminalId> = Traversal::new(
        QueueDiscipline::BreadthFirst,
        |terminal: &TerminalId, _: &StepContext, queue: &mut StepQueue<'_, TerminalId, TerminalId>| {
            graph
                .other_terminals(*terminal)
                .into_iter()
                .chain(graph.connected_terminals(*terminal))
                .for_each(|t| queue.queue(t));
            Ok(())
        },
    );
    traversal
        .add_stop_condition(|terminal, _| {
            let stop = is_breaker(terminal);
            if stop && found.get().is_none() {
                found.set(Some(*terminal));
            }
            stop
        })
        .add_queue_condition(|_, _, _, _| found.get().is_none());
    for terminal in source.terminals() {
        traversal.add_start_item(*terminal);
    }
    traversal.run(true)?;
    Ok(found.get())
}

// ---------------------------------------------------------------------------
// Flow
// ---------------------------------------------------------------------------

type ArrivalKey = (TerminalId, Vec<SinglePhaseKind>);

/// Walks are tracked by the terminal reached and the phases arriving there,
/// so a terminal reached again with other phases is expanded again.
fn arrival_key(path: &StepPath) -> ArrivalKey {
    let mut phases = path.to_phases();
    phases.sort_unstable();
    (path.to_terminal, phases)
}

fn start_path(graph: &NetworkGraph, phases: &TerminalPhases, terminal: TerminalId) -> StepPath {
    let state = phases.get(terminal);
    let paths = graph
        .phases_of(terminal)
        .single_phases()
        .iter()
        .enumerate()
        .filter(|(core, _)| state.phase(*core) != SinglePhaseKind::None)
        .map(|(_, nominal)| NominalPhasePath::new(*nominal, *nominal))
        .collect();
    StepPath::start(terminal).with_phase_paths(paths)
}

/// Apply `hop` to the traced state. Returns the hop cut down to the paths
/// that changed something, or `None` when nothing changed.
fn flow_hop(
    graph: &NetworkGraph,
    view: StateView,
    phases: &mut TerminalPhases,
    hop: StepPath,
) -> Result<Option<StepPath>, PhaseConflict> {
    let internal = hop.traced_internally(graph);
    if internal
        && graph
            .equipment_of(hop.from_terminal)
            .is_some_and(Equipment::is_substation_breaker)
    {
        return Ok(None);
    }

    let direction = if internal || hop.did_traverse_segment() {
        Direction::Out
    } else {
        Direction::In
    };
    let changed = Flow::new(graph, view, hop.from_terminal, hop.to_terminal).apply(
        phases,
        &hop.phase_paths,
        direction,
        internal,
    )?;
    if changed.is_empty() {
        return Ok(None);
    }
    log::debug!(
        "{view:?}: {changed:?} from '{}' to '{}'",
        mrid_of(graph, hop.from_terminal),
        mrid_of(graph, hop.to_terminal)
    );
    Ok(Some(hop.with_phase_paths(changed)))
}

/// One hop between two terminals in one view.
#[derive(Clone, Copy)]
struct Flow<'g> {
    graph: &'g NetworkGraph,
    view: StateView,
    from: TerminalId,
    to: TerminalId,
}

impl<'g> Flow<'g> {
    fn new(graph: &'g NetworkGraph, view: StateView, from: TerminalId, to: TerminalId) -> Self {
        Self {
            graph,
            view,
            from,
            to,
        }
    }

    /// Add the phase traced on each path's source core to its target core.
    ///
    /// With `check_open`, cores the equipment holds open in the view are
    /// skipped.
    fn apply(
        &self,
        phases: &mut TerminalPhases,
        paths: &[NominalPhasePath],
        direction: Direction,
        check_open: bool,
    ) -> Result<Vec<NominalPhasePath>, PhaseConflict> {
        let graph = self.graph;
        let from_state = phases.get(self.from);
        let equipment = graph.equipment_of(self.to);
        let mut changed = Vec::new();

        for path in paths {
            let Some(to_core) = graph.core_of(self.to, path.to) else {
                continue;
            };
            let (traced, gate_core) = if path.from == SinglePhaseKind::None {
                (traceable(path.to), to_core)
            } else {
                let Some(from_core) = graph.core_of(self.from, path.from) else {
                    continue;
                };
                (from_state.phase(from_core), from_core)
            };
            if traced == SinglePhaseKind::None {
                continue;
            }
            if check_open && equipment.is_some_and(|e| e.is_open(self.view, gate_core)) {
                continue;
            }

            let Some(state) = phases.get_mut(self.to) else {
                continue;
            };
            match state.add(to_core, traced, direction) {
                Ok(true) => changed.push(*path),
                Ok(false) | Err(PhaseStateError::InvalidCore { .. }) => {}
                Err(PhaseStateError::CrossingPhases {
                    core,
                    existing,
                    attempted,
                }) => return Err(self.conflict(core, existing, attempted)),
            }
        }
        Ok(changed)
    }

    fn conflict(
        &self,
        core: usize,
        existing: SinglePhaseKind,
        attempted: SinglePhaseKind,
    ) -> PhaseConflict {
        PhaseConflict {
            view: self.view,
            from_terminal: self.from,
            to_terminal: self.to,
            from_equipment: mrid_of(self.graph, self.from),
            to_equipment: mrid_of(self.graph, self.to),
            core,
            existing,
            attempted,
        }
    }
}

/// The paths from cores of `from` that were energised from downstream,
/// across a closed feeder breaker, onto untraced cores of `to`. Nothing is
/// written here.
fn breaker_crossing(
    graph: &NetworkGraph,
    view: StateView,
    phases: &TerminalPhases,
    breaker: &Equipment,
    from: TerminalId,
    to: TerminalId,
) -> Option<StepPath> {
    let from_state = phases.get(from);
    let to_state = phases.get(to);
    let paths: Vec<NominalPhasePath> = internal_connectivity(graph, from, to, None)
        .paths
        .into_iter()
        .filter(|p| {
            let Some(from_core) = graph.core_of(from, p.from) else {
                return false;
            };
            let Some(to_core) = graph.core_of(to, p.to) else {
                return false;
            };
            from_state.phase(from_core) != SinglePhaseKind::None
                && from_state.direction(from_core).has(Direction::In)
                && !breaker.is_open(view, from_core)
                && to_state.phase(to_core) == SinglePhaseKind::None
        })
        .collect();
    (!paths.is_empty()).then(|| StepPath::new(from, to).with_phase_paths(paths))
}

fn is_fully_traced(graph: &NetworkGraph, phases: &TerminalPhases, equipment: &Equipment) -> bool {
    equipment.terminals().iter().all(|t| {
        let state = phases.get(*t);
        (0..graph.phases_of(*t).num_phases()).all(|core| state.phase(core) != SinglePhaseKind::None)
    })
}

/// Positional phases carry no traced meaning.
fn traceable(phase: SinglePhaseKind) -> SinglePhaseKind {
    if phase.is_positional() {
        SinglePhaseKind::None
    } else {
        phase
    }
}

fn mrid_of(graph: &NetworkGraph, terminal: TerminalId) -> String {
    graph
        .equipment_of(terminal)
        .map_or_else(String::new, |e| e.mrid.clone())
}
