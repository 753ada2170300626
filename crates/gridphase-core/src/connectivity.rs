//! Which nominal phases on one terminal feed which on another.
//!
//! External connectivity joins terminals sharing a connectivity node.
//! Internal connectivity joins two terminals of the same equipment, and for
//! power transformers follows a fixed winding table.

use crate::id::TerminalId;
use crate::network::{EquipmentKind, NetworkGraph};
use crate::phase::{PhaseCode, SinglePhaseKind};
use serde::{Deserialize, Serialize};

/// One conductor-to-conductor link.
///
/// A `from` of [`SinglePhaseKind::None`] means the link energises `to` by
/// itself, as a transformer does for its secondary neutral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NominalPhasePath {
    pub from: SinglePhaseKind,
    pub to: SinglePhaseKind,
}

impl NominalPhasePath {
    pub const fn new(from: SinglePhaseKind, to: SinglePhaseKind) -> Self {
        Self { from, to }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectivityResult {
    pub from_terminal: TerminalId,
    pub to_terminal: TerminalId,
    pub paths: Vec<NominalPhasePath>,
}

impl ConnectivityResult {
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn from_phases(&self) -> impl Iterator<Item = SinglePhaseKind> + '_ {
        self.paths.iter().map(|p| p.from)
    }

    pub fn to_phases(&self) -> impl Iterator<Item = SinglePhaseKind> + '_ {
        self.paths.iter().map(|p| p.to)
    }
}

// ---------------------------------------------------------------------------
// Generic mapping
// ---------------------------------------------------------------------------

/// Identity on every phase both codes carry.
fn straight_paths(from: PhaseCode, to: PhaseCode) -> Vec<NominalPhasePath> {
    from.single_phases()
        .iter()
        .copied()
        .filter(|p| to.contains(*p))
        .map(|p| NominalPhasePath::new(p, p))
        .collect()
}

/// Non-neutral phases paired by slot, plus N to N when both sides have it.
fn positional_paths(from: PhaseCode, to: PhaseCode) -> Vec<NominalPhasePath> {
    let mut paths: Vec<NominalPhasePath> = from
        .without_neutral()
        .single_phases()
        .iter()
        .zip(to.without_neutral().single_phases())
        .map(|(f, t)| NominalPhasePath::new(*f, *t))
        .collect();
    if from.contains(SinglePhaseKind::N) && to.contains(SinglePhaseKind::N) {
        paths.push(NominalPhasePath::new(SinglePhaseKind::N, SinglePhaseKind::N));
    }
    paths
}

/// Paths across a shared connectivity node.
pub fn external_paths(from: PhaseCode, to: PhaseCode) -> Vec<NominalPhasePath> {
    if from.is_positional() == to.is_positional() {
        straight_paths(from, to)
    } else {
        positional_paths(from, to)
    }
}

/// Paths through equipment without a winding table.
pub fn internal_paths(from: PhaseCode, to: PhaseCode) -> Vec<NominalPhasePath> {
    if from.is_positional() || to.is_positional() {
        positional_paths(from, to)
    } else {
        straight_paths(from, to)
    }
}

// ---------------------------------------------------------------------------
// Terminal-level queries
// ---------------------------------------------------------------------------

/// Connectivity from `from` to a terminal on the same node, restricted to
/// source phases in `include`.
pub fn terminal_connectivity(
    graph: &NetworkGraph,
    from: TerminalId,
    to: TerminalId,
    include: &[SinglePhaseKind],
) -> ConnectivityResult {
    let paths = external_paths(graph.phases_of(from), graph.phases_of(to))
        .into_iter()
        .filter(|p| include.contains(&p.from))
        .collect();
    ConnectivityResult {
        from_terminal: from,
        to_terminal: to,
        paths,
    }
}

/// Every terminal on `terminal`'s node that at least one of `phases` reaches.
///
/// `phases` defaults to the terminal's nominal phases and is always
/// intersected with them.
pub fn connected_terminals(
    graph: &NetworkGraph,
    terminal: TerminalId,
    phases: Option<&[SinglePhaseKind]>,
) -> Vec<ConnectivityResult> {
    let nominal = graph.phases_of(terminal).single_phases();
    let include: Vec<SinglePhaseKind> = match phases {
        Some(phases) => nominal
            .iter()
            .copied()
            .filter(|p| phases.contains(p))
            .collect(),
        None => nominal.to_vec(),
    };

    graph
        .connected_terminals(terminal)
        .into_iter()
        .map(|other| terminal_connectivity(graph, terminal, other, &include))
        .filter(|result| !result.is_empty())
        .collect()
}

/// Connectivity between two terminals of the same equipment.
///
/// Paths sourced from `None` are always kept; the rest are restricted to
/// `include` when given.
pub fn internal_connectivity(
    graph: &NetworkGraph,
    from: TerminalId,
    to: TerminalId,
    include: Option<&[SinglePhaseKind]>,
) -> ConnectivityResult {
    let from_code = graph.phases_of(from);
    let to_code = graph.phases_of(to);
    let is_transformer = graph
        .equipment_of(from)
        .is_some_and(|e| matches!(e.kind, EquipmentKind::PowerTransformer));

    let paths = match transformer_paths(from_code, to_code).filter(|_| is_transformer) {
        Some(table) => table.to_vec(),
        None => internal_paths(from_code, to_code),
    };
    let paths = paths
        .into_iter()
        .filter(|p| {
            p.from == SinglePhaseKind::None || include.is_none_or(|phases| phases.contains(&p.from))
        })
        .collect();

    ConnectivityResult {
        from_terminal: from,
        to_terminal: to,
        paths,
    }
}

// ---------------------------------------------------------------------------
// Transformer winding table
// ---------------------------------------------------------------------------

macro_rules! paths {
    ($($from:ident => $to:ident),* $(,)?) => {
        &[$(NominalPhasePath {
            from: SinglePhaseKind::$from,
            to: SinglePhaseKind::$to,
        }),*]
    };
}

/// Primary-to-secondary links for a transformer between two phase codes.
///
/// SWER primaries (one phase plus neutral) and partial-phase windings energise
/// secondary phases the primary does not carry, written as `None => phase`.
pub fn transformer_paths(from: PhaseCode, to: PhaseCode) -> Option<&'static [NominalPhasePath]> {
    use PhaseCode as P;
    let table: &'static [NominalPhasePath] = match (from, to) {
        (P::ABCN, P::ABCN) => paths![A => A, B => B, C => C, N => N],
        (P::ABCN, P::ABC) => paths![A => A, B => B, C => C],

        (P::AN, P::AN) => paths![A => A, N => N],
        (P::AN, P::XN) => paths![A => X, N => N],
        (P::AN, P::AB) => paths![A => A, None => B],
        (P::AN, P::XY) => paths![A => X, None => Y],
        (P::AN, P::X) => paths![A => X],
        (P::AN, P::A) => paths![A => A],

        (P::BN, P::BN) => paths![B => B, N => N],
        (P::BN, P::XN) => paths![B => X, N => N],
        (P::BN, P::BC) => paths![B => B, None => C],
        (P::BN, P::XY) => paths![B => X, None => Y],
        (P::BN, P::B) => paths![B => B],
        (P::BN, P::X) => paths![B => X],

        (P::CN, P::CN) => paths![C => C, N => N],
        (P::CN, P::XN) => paths![C => X, N => N],
        (P::CN, P::AC) => paths![C => C, None => A],
        (P::CN, P::XY) => paths![C => X, None => Y],
        (P::CN, P::C) => paths![C => C],
        (P::CN, P::X) => paths![C => X],

        (P::XN, P::AN) => paths![X => A, N => N],
        (P::XN, P::BN) => paths![X => B, N => N],
        (P::XN, P::CN) => paths![X => C, N => N],
        (P::XN, P::XN) => paths![X => X, N => N],
        (P::XN, P::AB) => paths![X => A, None => B],
        (P::XN, P::BC) => paths![X => B, None => C],
        (P::XN, P::AC) => paths![X => C, None => A],
        (P::XN, P::XY) => paths![X => X, None => Y],
        (P::XN, P::A) => paths![X => A],
        (P::XN, P::B) => paths![X => B],
        (P::XN, P::C) => paths![X => C],
        (P::XN, P::X) => paths![X => X],

        (P::ABC, P::ABCN) => paths![A => A, B => B, C => C, None => N],
        (P::ABC, P::ABC) => paths![A => A, B => B, C => C],

        (P::AB, P::AN) => paths![A => A, None => N],
        (P::AB, P::XN) => paths![A => X, None => N],
        (P::AB, P::AB) => paths![A => A, B => B],
        (P::AB, P::XY) => paths![A => X, B => Y],
        (P::AB, P::A) => paths![A => A],
        (P::AB, P::X) => paths![A => X],

        (P::BC, P::BN) => paths![B => B, None => N],
        (P::BC, P::XN) => paths![B => X, None => N],
        (P::BC, P::BC) => paths![B => B, C => C],
        (P::BC, P::XY) => paths![B => X, C => Y],
        (P::BC, P::B) => paths![B => B],
        (P::BC, P::X) => paths![B => X],

        (P::AC, P::CN) => paths![C => C, None => N],
        (P::AC, P::XN) => paths![C => X, None => N],
        (P::AC, P::AC) => paths![A => A, C => C],
        (P::AC, P::XY) => paths![A => X, C => Y],
        (P::AC, P::C) => paths![C => C],
        (P::AC, P::X) => paths![C => X],

        (P::XY, P::AN) => paths![X => A, None => N],
        (P::XY, P::BN) => paths![X => B, None => N],
        (P::XY, P::CN) => paths![X => C, None => N],
        (P::XY, P::XN) => paths![X => X, None => N],
        (P::XY, P::AB) => paths![X => A, Y => B],
        (P::XY, P::BC) => paths![X => B, Y => C],
        (P::XY, P::AC) => paths![X => A, Y => C],
        (P::XY, P::XY) => paths![X => X, Y => Y],
        (P::XY, P::A) => paths![X => A],
        (P::XY, P::B) => paths![X => B],
        (P::XY, P::C) => paths![X => C],
        (P::XY, P::X) => paths![X => X],

        (P::A, P::AN) => paths![A => A, None => N],
        (P::A, P::XN) => paths![A => X, None => N],
        (P::A, P::AB) => paths![A => A, None => B],
        (P::A, P::XY) => paths![A => X, None => Y],
        (P::A, P::A) => paths![A => A],
        (P::A, P::X) => paths![A => X],

        (P::B, P::BN) => paths![B => B, None => N],
        (P::B, P::XN) => paths![B => X, None => N],
        (P::B, P::BC) => paths![B => B, None => C],
        (P::B, P::XY) => paths![B => X, None => Y],
        (P::B, P::B) => paths![B => B],
        (P::B, P::X) => paths![B => X],

        (P::C, P::CN) => paths![C => C, None => N],
        (P::C, P::XN) => paths![C => X, None => N],
        (P::C, P::AC) => paths![C => C, None => A],
        (P::C, P::XY) => paths![C => X, None => Y],
        (P::C, P::C) => paths![C => C],
        (P::C, P::X) => paths![C => X],

        (P::X, P::AN) => paths![X => A, None => N],
        (P::X, P::BN) => paths![X => B, None => N],
        (P::X, P::CN) => paths![X => C, None => N],
        (P::X, P::XN) => paths![X => X, None => N],
        (P::X, P::AB) => paths![X => A, None => B],
        (P::X, P::BC) => paths![X => B, None => C],
        (P::X, P::AC) => paths![X => C, None => A],
        (P::X, P::XY) => paths![X => X, None => Y],
        (P::X, P::A) => paths![X => A],
        (P::X, P::B) => paths![X => B],
        (P::X, P::C) => paths![X => C],
        (P::X, P::X) => paths![X => X],

        _ => return None,
    };
    Some(table)
}
