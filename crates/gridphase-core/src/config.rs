//! Tunables for phase propagation.
//!
//! [`SetPhasesConfig`] is plain serde data so it can be loaded from a file by
//! `gridphase-data`. Missing fields fall back to [`Default`].

use crate::queue::QueueDiscipline;
use crate::step_path::StepPath;
use serde::{Deserialize, Serialize};

/// Order in which pending hops are expanded during a phase trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PhaseQueue {
    DepthFirst,
    BreadthFirst,
    /// Hops carrying the most phases first.
    #[default]
    MostPhasesFirst,
}

impl PhaseQueue {
    pub fn discipline(self) -> QueueDiscipline<StepPath> {
        match self {
            Self::DepthFirst => QueueDiscipline::DepthFirst,
            Self::BreadthFirst => QueueDiscipline::BreadthFirst,
            Self::MostPhasesFirst => {
                QueueDiscipline::priority(|a: &StepPath, b: &StepPath| {
                    a.phase_paths.len().cmp(&b.phase_paths.len())
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetPhasesConfig {
    pub discipline: PhaseQueue,
    /// Run the normal and current passes on two threads. Needs the
    /// `parallel` feature, otherwise ignored.
    pub concurrent_passes: bool,
    /// Upper bound on feeder breaker reconciliation rounds per pass.
    pub max_reconciliation_rounds: Option<usize>,
}

impl Default for SetPhasesConfig {
    fn default() -> Self {
        Self {
            discipline: PhaseQueue::default(),
            concurrent_passes: false,
            max_reconciliation_rounds: Some(64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::NominalPhasePath;
    use crate::id::TerminalId;
    use crate::phase::SinglePhaseKind;
    use crate::queue::TraversalQueue;
    use slotmap::SlotMap;

    #[test]
    fn most_phases_first_pops_widest_path() {
        let mut queue: TraversalQueue<StepPath> = PhaseQueue::MostPhasesFirst.discipline().queue();
        let mut slots = SlotMap::<TerminalId, ()>::with_key();
        let t = slots.insert(());

        let narrow = StepPath::start(t).with_phase_paths(vec![NominalPhasePath::new(SinglePhaseKind::A, SinglePhaseKind::A)]);
        queue.put(narrow.clone());
        queue.put(StepPath::start(t));
        let wide = StepPath::start(t).with_phase_paths(vec![narrow.phase_paths[0]; 3]);
        queue.put(wide.clone());

        assert_eq!(queue.get(), Some(wide));
        assert_eq!(queue.get(), Some(narrow));
    }
}
