//! Gridphase Core -- phase tracing for electrical distribution networks.
//!
//! This crate provides the network arena, packed per-terminal phase state,
//! a reusable branching traversal engine, terminal connectivity mapping and
//! the step path provider that together work out which phases energise
//! every terminal of a network.
//!
//! # Two State Views
//!
//! Every network carries two switch configurations. The *normal* view holds
//! planned positions and the *current* view actual ones. Traced phases are
//! kept separately for each, and [`set_phases::SetPhases`] runs one pass per
//! view:
//!
//! 1. **Seed** -- Each energy source writes its phases onto the outward
//!    terminals of its nearest feeder breaker.
//! 2. **Trace** -- A [`traversal::Traversal`] driven by
//!    [`step_path::StepPathProvider`] flows phases terminal by terminal,
//!    stopping where nothing changes or a switch core is open.
//! 3. **Reconcile** -- Feeder breakers energised from downstream pass their
//!    phases across, in rounds, until nothing more flows.
//!
//! # Building and Tracing
//!
//! ```rust,ignore
//! let mut graph = NetworkGraph::new();
//! let source = graph.add_equipment("src", EquipmentKind::EnergySource { phases }, &[PhaseCode::ABC])?;
//! // ... add breakers and segments, connect terminals ...
//! let mut network = Network::from_graph(graph);
//! let report = SetPhases::default().run(&mut network)?;
//! let state = network.phases(StateView::Normal).get(terminal);
//! ```
//!
//! # Key Types
//!
//! - [`network::Network`] -- Equipment/terminal/node arena plus the traced
//!   phases of both views.
//! - [`phase_state::PhaseState`] -- Phase and direction of up to four cores,
//!   packed into one word.
//! - [`traversal::Traversal`] -- Queue-driven walker with stop and queue
//!   conditions, step actions, context values and branching.
//! - [`connectivity`] -- Nominal phase paths between terminals, including
//!   power transformer windings.
//! - [`step_path::StepPathProvider`] -- Next hops through equipment, across
//!   busbars and along segments carrying cuts and clamps.
//! - [`set_phases::SetPhases`] / [`remove_phases::RemovePhases`] -- Phase
//!   propagation and removal.
//! - [`config::SetPhasesConfig`] -- Serde-loadable tunables.

pub mod config;
pub mod connectivity;
pub mod id;
pub mod network;
pub mod phase;
pub mod phase_state;
pub mod queue;
pub mod remove_phases;
pub mod set_phases;
pub mod step_path;
pub mod tracker;
pub mod traversal;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
