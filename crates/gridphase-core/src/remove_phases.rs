//! Removal of traced phases.
//!
//! [`RemovePhases`] ebbs phases outward from a terminal: every terminal the
//! removed phases connect to loses them too, until a terminal is reached that
//! had nothing left to lose.

use crate::connectivity::{connected_terminals, internal_connectivity};
use crate::id::TerminalId;
use crate::network::{Network, NetworkGraph, StateView};
use crate::phase::SinglePhaseKind;
use crate::phase_state::TerminalPhases;
use crate::queue::QueueDiscipline;
use crate::traversal::{StepContext, StepQueue, Traversal, TraversalError};

/// Phases to strip from one terminal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Ebb {
    terminal: TerminalId,
    phases: Vec<SinglePhaseKind>,
}

impl Ebb {
    fn new(terminal: TerminalId, phases: impl IntoIterator<Item = SinglePhaseKind>) -> Self {
        let mut phases: Vec<_> = phases.into_iter().collect();
        phases.sort_unstable();
        phases.dedup();
        Self { terminal, phases }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RemovePhases;

impl RemovePhases {
    pub fn new() -> Self {
        Self
    }

    /// Remove `nominal_phases` (all of the terminal's by default) from
    /// `terminal` and everything they spread to, in both views.
    ///
    /// Returns how many terminal states changed, counted per view.
    pub fn run(
        &self,
        network: &mut Network,
        terminal: TerminalId,
        nominal_phases: Option<&[SinglePhaseKind]>,
    ) -> Result<usize, TraversalError> {
        let phases: Vec<SinglePhaseKind> = match nominal_phases {
            Some(phases) => phases.to_vec(),
            None => network.graph().phases_of(terminal).single_phases().to_vec(),
        };

        let mut changed = 0;
        for view in StateView::ALL {
            let (graph, view_phases) = network.view_mut(view);
            changed += ebb(graph, view, view_phases, Ebb::new(terminal, phases.iter().copied()))?;
        }
        log::debug!("removed phases from {changed} terminal states");
        Ok(changed)
    }
}

/// Clear every traced phase in both views.
pub fn remove_all_traced_phases(network: &mut Network) {
    for view in StateView::ALL {
        network.phases_mut(view).clear();
    }
}

fn ebb(
    graph: &NetworkGraph,
    view: StateView,
    phases: &mut TerminalPhases,
    start: Ebb,
) -> Result<usize, TraversalError> {
    let mut changed = 0;
    let mut traversal: Traversal<'_, Ebb> = Traversal::new(
        QueueDiscipline::BreadthFirst,
        |ebb: &Ebb, _: &StepContext, queue: &mut StepQueue<'_, Ebb, Ebb>| {
            let removed = strip(graph, phases, ebb);
            if removed.is_empty() {
                return Ok(());
            }
            changed += 1;

            for result in connected_terminals(graph, ebb.terminal, Some(removed.as_slice())) {
                queue.queue(Ebb::new(result.to_terminal, result.to_phases()));
            }
            let equipment = graph.equipment_of(ebb.terminal);
            for other in graph.other_terminals(ebb.terminal) {
                let result = internal_connectivity(graph, ebb.terminal, other, Some(removed.as_slice()));
                let through = result.paths.iter().filter(|p| {
                    let core = graph.core_of(ebb.terminal, p.from);
                    !core.is_some_and(|core| equipment.is_some_and(|e| e.is_open(view, core)))
                });
                queue.queue(Ebb::new(other, through.map(|p| p.to)));
            }
            Ok(())
        },
    );
    traversal.add_start_item(start);
    traversal.run(true)?;
    drop(traversal);
    Ok(changed)
}

/// Clear the cores carrying `ebb.phases`. Returns the nominal phases that
/// were cleared.
fn strip(graph: &NetworkGraph, phases: &mut TerminalPhases, ebb: &Ebb) -> Vec<SinglePhaseKind> {
    let Some(state) = phases.get_mut(ebb.terminal) else {
        return Vec::new();
    };
    ebb.phases
        .iter()
        .copied()
        .filter(|nominal| {
            graph
                .core_of(ebb.terminal, *nominal)
                .is_some_and(|core| matches!(state.remove_all(core), Ok(true)))
        })
        .collect()
}
