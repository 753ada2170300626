//! Arena model of an electrical network.
//!
//! Equipment owns its terminals; connectivity nodes and terminals refer to
//! each other only by id, so the cyclic electrical graph never forms owning
//! reference cycles. Traced phases live beside the graph in [`Network`], one
//! [`TerminalPhases`] table per [`StateView`], which lets the two views be
//! borrowed mutably at the same time over a shared `&NetworkGraph`.

use crate::id::{EquipmentId, NodeId, TerminalId};
use crate::phase::{PhaseCode, SinglePhaseKind};
use crate::phase_state::{MAX_CORES, PhaseState, TerminalPhases};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NetworkError {
    #[error("equipment '{0}' already exists")]
    DuplicateMrid(String),

    #[error("equipment not found: {0:?}")]
    EquipmentNotFound(EquipmentId),

    #[error("terminal not found: {0:?}")]
    TerminalNotFound(TerminalId),

    #[error("node not found: {0:?}")]
    NodeNotFound(NodeId),

    #[error("{kind} '{mrid}' needs {expected} terminals, got {found}")]
    TerminalCount {
        mrid: String,
        kind: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("'{mrid}' has {found} cores on one terminal, at most {MAX_CORES} are supported")]
    TooManyCores { mrid: String, found: usize },

    #[error("'{mrid}' is not an AC line segment")]
    NotALineSegment { mrid: String },

    #[error("'{mrid}' is not a switch")]
    NotASwitch { mrid: String },

    #[error("core {core} is out of range for '{mrid}'")]
    InvalidCore { mrid: String, core: usize },
}

// ---------------------------------------------------------------------------
// State views
// ---------------------------------------------------------------------------

/// Which of the two parallel network configurations is being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateView {
    /// Planned switch positions.
    Normal,
    /// Actual switch positions.
    Current,
}

impl StateView {
    pub const ALL: [StateView; 2] = [StateView::Normal, StateView::Current];
}

// ---------------------------------------------------------------------------
// Equipment kinds
// ---------------------------------------------------------------------------

/// Per-core open flags of a switch, for both views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SwitchState {
    /// A breaker housed in a substation. Feeders are energised from these.
    pub is_substation_breaker: bool,
    normally_open: u8,
    open: u8,
}

impl SwitchState {
    /// A closed switch that is not a feeder breaker.
    pub fn closed() -> Self {
        Self::default()
    }

    /// A closed substation breaker.
    pub fn feeder_breaker() -> Self {
        Self {
            is_substation_breaker: true,
            ..Self::default()
        }
    }

    fn mask(&self, view: StateView) -> u8 {
        match view {
            StateView::Normal => self.normally_open,
            StateView::Current => self.open,
        }
    }

    fn mask_mut(&mut self, view: StateView) -> &mut u8 {
        match view {
            StateView::Normal => &mut self.normally_open,
            StateView::Current => &mut self.open,
        }
    }

    /// Whether `core` is open in `view`.
    pub fn is_open(&self, view: StateView, core: usize) -> bool {
        core < MAX_CORES && self.mask(view) & (1 << core) != 0
    }

    /// Whether any core is open in `view`.
    pub fn is_any_open(&self, view: StateView) -> bool {
        self.mask(view) != 0
    }

    /// Open or close every core in `view`.
    pub fn set_open(&mut self, view: StateView, open: bool) {
        *self.mask_mut(view) = if open { (1 << MAX_CORES) - 1 } else { 0 };
    }

    /// Open or close one core in `view`. Returns false for an out-of-range core.
    pub fn set_core_open(&mut self, view: StateView, core: usize, open: bool) -> bool {
        if core >= MAX_CORES {
            return false;
        }
        let mask = self.mask_mut(view);
        if open {
            *mask |= 1 << core;
        } else {
            *mask &= !(1 << core);
        }
        true
    }
}

/// An AC line segment's length and the attachments placed along it.
///
/// Attachment lists are maintained by [`NetworkGraph::add_equipment`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LineSegment {
    pub length: Option<f64>,
    cuts: Vec<EquipmentId>,
    clamps: Vec<EquipmentId>,
}

impl LineSegment {
    pub fn new(length: Option<f64>) -> Self {
        Self {
            length,
            cuts: Vec::new(),
            clamps: Vec::new(),
        }
    }

    pub fn cuts(&self) -> &[EquipmentId] {
        &self.cuts
    }

    pub fn clamps(&self) -> &[EquipmentId] {
        &self.clamps
    }

    /// Position of terminal 2. Unknown lengths place it at infinity.
    pub fn length_or_max(&self) -> f64 {
        self.length.unwrap_or(f64::INFINITY)
    }
}

/// A cut splitting a line segment. It switches like any other switch.
#[derive(Debug, Clone, PartialEq)]
pub struct CutAttachment {
    pub segment: EquipmentId,
    pub length_from_t1: Option<f64>,
    pub switch: SwitchState,
}

/// A clamp tapping a line segment at a point.
#[derive(Debug, Clone, PartialEq)]
pub struct ClampAttachment {
    pub segment: EquipmentId,
    pub length_from_t1: Option<f64>,
}

/// What a piece of conducting equipment is, as far as tracing cares.
#[derive(Debug, Clone, PartialEq)]
pub enum EquipmentKind {
    /// Junctions, consumers and anything else without internal structure.
    Plain,
    Switch(SwitchState),
    BusbarSection,
    AcLineSegment(LineSegment),
    Cut(CutAttachment),
    Clamp(ClampAttachment),
    PowerTransformer,
    EnergySource { phases: Vec<SinglePhaseKind> },
}

impl EquipmentKind {
    /// A segment with no attachments yet.
    pub fn line_segment(length: Option<f64>) -> Self {
        Self::AcLineSegment(LineSegment::new(length))
    }

    pub fn cut(segment: EquipmentId, length_from_t1: Option<f64>) -> Self {
        Self::Cut(CutAttachment {
            segment,
            length_from_t1,
            switch: SwitchState::closed(),
        })
    }

    pub fn clamp(segment: EquipmentId, length_from_t1: Option<f64>) -> Self {
        Self::Clamp(ClampAttachment {
            segment,
            length_from_t1,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Plain => "equipment",
            Self::Switch(_) => "switch",
            Self::BusbarSection => "busbar section",
            Self::AcLineSegment(_) => "AC line segment",
            Self::Cut(_) => "cut",
            Self::Clamp(_) => "clamp",
            Self::PowerTransformer => "power transformer",
            Self::EnergySource { .. } => "energy source",
        }
    }

    fn required_terminals(&self) -> Option<usize> {
        match self {
            Self::AcLineSegment(_) | Self::Cut(_) => Some(2),
            Self::Clamp(_) | Self::BusbarSection => Some(1),
            _ => None,
        }
    }

    fn attached_segment(&self) -> Option<EquipmentId> {
        match self {
            Self::Cut(cut) => Some(cut.segment),
            Self::Clamp(clamp) => Some(clamp.segment),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Equipment {
    pub mrid: String,
    pub kind: EquipmentKind,
    terminals: Vec<TerminalId>,
    pub in_service: bool,
    pub normally_in_service: bool,
}

impl Equipment {
    /// Owned terminals, ordered by sequence number.
    pub fn terminals(&self) -> &[TerminalId] {
        &self.terminals
    }

    pub fn num_terminals(&self) -> usize {
        self.terminals.len()
    }

    pub fn is_in_service(&self, view: StateView) -> bool {
        match view {
            StateView::Normal => self.normally_in_service,
            StateView::Current => self.in_service,
        }
    }

    /// Switching state for switches and cuts.
    pub fn switch(&self) -> Option<&SwitchState> {
        match &self.kind {
            EquipmentKind::Switch(switch) => Some(switch),
            EquipmentKind::Cut(cut) => Some(&cut.switch),
            _ => None,
        }
    }

    fn switch_mut(&mut self) -> Option<&mut SwitchState> {
        match &mut self.kind {
            EquipmentKind::Switch(switch) => Some(switch),
            EquipmentKind::Cut(cut) => Some(&mut cut.switch),
            _ => None,
        }
    }

    /// Whether energy is blocked on `core` in `view`.
    ///
    /// Equipment out of service in the view is open on every core.
    pub fn is_open(&self, view: StateView, core: usize) -> bool {
        !self.is_in_service(view) || self.switch().is_some_and(|s| s.is_open(view, core))
    }

    pub fn is_substation_breaker(&self) -> bool {
        matches!(&self.kind, EquipmentKind::Switch(s) if s.is_substation_breaker)
    }

    pub fn is_busbar(&self) -> bool {
        matches!(self.kind, EquipmentKind::BusbarSection)
    }

    /// Distance from the hosting segment's terminal 1, for cuts and clamps.
    /// Unknown positions are treated as 0.0.
    pub fn length_from_t1_or_0(&self) -> f64 {
        match &self.kind {
            EquipmentKind::Cut(cut) => cut.length_from_t1.unwrap_or(0.0),
            EquipmentKind::Clamp(clamp) => clamp.length_from_t1.unwrap_or(0.0),
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Terminal {
    equipment: EquipmentId,
    sequence_number: usize,
    pub phases: PhaseCode,
    node: Option<NodeId>,
}

impl Terminal {
    pub fn equipment(&self) -> EquipmentId {
        self.equipment
    }

    /// 1-based position within the owning equipment.
    pub fn sequence_number(&self) -> usize {
        self.sequence_number
    }

    pub fn node(&self) -> Option<NodeId> {
        self.node
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectivityNode {
    terminals: Vec<TerminalId>,
}

impl ConnectivityNode {
    pub fn terminals(&self) -> &[TerminalId] {
        &self.terminals
    }
}

// ---------------------------------------------------------------------------
// NetworkGraph
// ---------------------------------------------------------------------------

/// Equipment, terminals and connectivity nodes of one network.
#[derive(Debug, Clone, Default)]
pub struct NetworkGraph {
    equipment: SlotMap<EquipmentId, Equipment>,
    terminals: SlotMap<TerminalId, Terminal>,
    nodes: SlotMap<NodeId, ConnectivityNode>,
    by_mrid: HashMap<String, EquipmentId>,
}

impl NetworkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Construction ---

    /// Add equipment with one terminal per entry of `terminal_phases`.
    ///
    /// Cuts and clamps are registered on their segment. Segments, cuts,
    /// clamps and busbars must have their fixed terminal counts.
    pub fn add_equipment(
        &mut self,
        mrid: impl Into<String>,
        kind: EquipmentKind,
        terminal_phases: &[PhaseCode],
    ) -> Result<EquipmentId, NetworkError> {
        let mrid = mrid.into();
        if self.by_mrid.contains_key(&mrid) {
            return Err(NetworkError::DuplicateMrid(mrid));
        }
        if let Some(expected) = kind.required_terminals()
            && expected != terminal_phases.len()
        {
            return Err(NetworkError::TerminalCount {
                mrid,
                kind: kind.name(),
                expected,
                found: terminal_phases.len(),
            });
        }
        if let Some(found) = terminal_phases
            .iter()
            .map(|p| p.num_phases())
            .find(|n| *n > MAX_CORES)
        {
            return Err(NetworkError::TooManyCores { mrid, found });
        }

        let segment = kind.attached_segment();
        if let Some(segment) = segment {
            let host = self
                .equipment
                .get(segment)
                .ok_or(NetworkError::EquipmentNotFound(segment))?;
            if !matches!(host.kind, EquipmentKind::AcLineSegment(_)) {
                return Err(NetworkError::NotALineSegment {
                    mrid: host.mrid.clone(),
                });
            }
        }
        let is_cut = matches!(kind, EquipmentKind::Cut(_));
        let kind = match kind {
            EquipmentKind::AcLineSegment(line) => EquipmentKind::line_segment(line.length),
            other => other,
        };

        let terminals = &mut self.terminals;
        let id = self.equipment.insert_with_key(|id| Equipment {
            mrid: mrid.clone(),
            kind,
            terminals: terminal_phases
                .iter()
                .enumerate()
                .map(|(i, phases)| {
                    terminals.insert(Terminal {
                        equipment: id,
                        sequence_number: i + 1,
                        phases: *phases,
                        node: None,
                    })
                })
                .collect(),
            in_service: true,
            normally_in_service: true,
        });
        self.by_mrid.insert(mrid, id);

        if let Some(segment) = segment
            && let Some(EquipmentKind::AcLineSegment(line)) =
                self.equipment.get_mut(segment).map(|e| &mut e.kind)
        {
            if is_cut {
                line.cuts.push(id);
            } else {
                line.clamps.push(id);
            }
        }

        Ok(id)
    }

    /// Create an empty connectivity node.
    pub fn add_node(&mut self) -> NodeId {
        self.nodes.insert(ConnectivityNode::default())
    }

    /// Electrically join two terminals, merging their nodes if both have one.
    pub fn connect(&mut self, a: TerminalId, b: TerminalId) -> Result<NodeId, NetworkError> {
        let node_a = self.terminal(a).ok_or(NetworkError::TerminalNotFound(a))?.node;
        let node_b = self.terminal(b).ok_or(NetworkError::TerminalNotFound(b))?.node;

        let node = match (node_a, node_b) {
            (Some(na), Some(nb)) if na == nb => na,
            (Some(na), Some(nb)) => {
                self.merge_nodes(na, nb);
                na
            }
            (Some(n), None) => {
                self.attach(b, n);
                n
            }
            (None, Some(n)) => {
                self.attach(a, n);
                n
            }
            (None, None) => {
                let n = self.add_node();
                self.attach(a, n);
                self.attach(b, n);
                n
            }
        };
        Ok(node)
    }

    /// Move `terminal` onto `node`.
    pub fn connect_to_node(&mut self, terminal: TerminalId, node: NodeId) -> Result<(), NetworkError> {
        if !self.nodes.contains_key(node) {
            return Err(NetworkError::NodeNotFound(node));
        }
        let current = self
            .terminal(terminal)
            .ok_or(NetworkError::TerminalNotFound(terminal))?
            .node;
        if current == Some(node) {
            return Ok(());
        }
        self.disconnect(terminal)?;
        self.attach(terminal, node);
        Ok(())
    }

    /// Detach `terminal` from its node. Empty nodes are removed.
    pub fn disconnect(&mut self, terminal: TerminalId) -> Result<(), NetworkError> {
        let record = self
            .terminals
            .get_mut(terminal)
            .ok_or(NetworkError::TerminalNotFound(terminal))?;
        let Some(node) = record.node.take() else {
            return Ok(());
        };
        if let Some(n) = self.nodes.get_mut(node) {
            n.terminals.retain(|t| *t != terminal);
            if n.terminals.is_empty() {
                self.nodes.remove(node);
            }
        }
        Ok(())
    }

    fn attach(&mut self, terminal: TerminalId, node: NodeId) {
        if let (Some(t), Some(n)) = (self.terminals.get_mut(terminal), self.nodes.get_mut(node)) {
            t.node = Some(node);
            n.terminals.push(terminal);
        }
    }

    fn merge_nodes(&mut self, keep: NodeId, absorbed: NodeId) {
        let Some(gone) = self.nodes.remove(absorbed) else {
            return;
        };
        for terminal in gone.terminals {
            self.attach(terminal, keep);
        }
    }

    // --- State flags ---

    pub fn set_in_service(
        &mut self,
        id: EquipmentId,
        view: StateView,
        in_service: bool,
    ) -> Result<(), NetworkError> {
        let equipment = self
            .equipment
            .get_mut(id)
            .ok_or(NetworkError::EquipmentNotFound(id))?;
        match view {
            StateView::Normal => equipment.normally_in_service = in_service,
            StateView::Current => equipment.in_service = in_service,
        }
        Ok(())
    }

    /// Open or close a switch in `view`, on one core or all of them.
    pub fn set_open(
        &mut self,
        id: EquipmentId,
        view: StateView,
        core: Option<usize>,
        open: bool,
    ) -> Result<(), NetworkError> {
        let equipment = self
            .equipment
            .get_mut(id)
            .ok_or(NetworkError::EquipmentNotFound(id))?;
        let mrid = equipment.mrid.clone();
        let switch = equipment
            .switch_mut()
            .ok_or_else(|| NetworkError::NotASwitch { mrid: mrid.clone() })?;
        match core {
            None => switch.set_open(view, open),
            Some(core) => {
                if !switch.set_core_open(view, core, open) {
                    return Err(NetworkError::InvalidCore { mrid, core });
                }
            }
        }
        Ok(())
    }

    /// Change an AC line segment's length. Attachments keep their positions.
    pub fn set_length(&mut self, id: EquipmentId, length: Option<f64>) -> Result<(), NetworkError> {
        let equipment = self
            .equipment
            .get_mut(id)
            .ok_or(NetworkError::EquipmentNotFound(id))?;
        match &mut equipment.kind {
            EquipmentKind::AcLineSegment(line) => {
                line.length = length;
                Ok(())
            }
            _ => Err(NetworkError::NotALineSegment {
                mrid: equipment.mrid.clone(),
            }),
        }
    }

    // --- Lookup ---

    pub fn equipment(&self, id: EquipmentId) -> Option<&Equipment> {
        self.equipment.get(id)
    }

    pub fn equipment_by_mrid(&self, mrid: &str) -> Option<EquipmentId> {
        self.by_mrid.get(mrid).copied()
    }

    pub fn terminal(&self, id: TerminalId) -> Option<&Terminal> {
        self.terminals.get(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&ConnectivityNode> {
        self.nodes.get(id)
    }

    pub fn equipment_count(&self) -> usize {
        self.equipment.len()
    }

    pub fn terminal_count(&self) -> usize {
        self.terminals.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Every equipment in insertion order.
    pub fn iter_equipment(&self) -> impl Iterator<Item = (EquipmentId, &Equipment)> {
        self.equipment.iter()
    }

    pub fn terminal_ids(&self) -> impl Iterator<Item = TerminalId> + '_ {
        self.terminals.keys()
    }

    /// Equipment owning `terminal`.
    pub fn equipment_id_of(&self, terminal: TerminalId) -> Option<EquipmentId> {
        self.terminals.get(terminal).map(|t| t.equipment)
    }

    pub fn equipment_of(&self, terminal: TerminalId) -> Option<&Equipment> {
        self.equipment_id_of(terminal)
            .and_then(|id| self.equipment.get(id))
    }

    /// Terminal `sequence_number` (1-based) of `equipment`.
    pub fn terminal_by_sequence(
        &self,
        equipment: EquipmentId,
        sequence_number: usize,
    ) -> Option<TerminalId> {
        self.equipment
            .get(equipment)?
            .terminals
            .get(sequence_number.checked_sub(1)?)
            .copied()
    }

    /// Terminal `sequence_number` of the equipment named `mrid`.
    pub fn terminal_of(&self, mrid: &str, sequence_number: usize) -> Option<TerminalId> {
        self.terminal_by_sequence(self.equipment_by_mrid(mrid)?, sequence_number)
    }

    /// The other terminals of the equipment owning `terminal`.
    pub fn other_terminals(&self, terminal: TerminalId) -> Vec<TerminalId> {
        self.equipment_of(terminal)
            .map(|e| {
                e.terminals
                    .iter()
                    .copied()
                    .filter(|t| *t != terminal)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Terminals sharing `terminal`'s connectivity node, excluding itself.
    pub fn connected_terminals(&self, terminal: TerminalId) -> Vec<TerminalId> {
        self.terminals
            .get(terminal)
            .and_then(|t| t.node)
            .and_then(|n| self.nodes.get(n))
            .map(|n| {
                n.terminals
                    .iter()
                    .copied()
                    .filter(|t| *t != terminal)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether any other terminal on `terminal`'s node belongs to a busbar.
    pub fn has_connected_busbars(&self, terminal: TerminalId) -> bool {
        self.connected_terminals(terminal)
            .into_iter()
            .any(|t| self.equipment_of(t).is_some_and(Equipment::is_busbar))
    }

    /// Equipment declared as energy sources, in insertion order.
    pub fn energy_sources(&self) -> Vec<EquipmentId> {
        self.equipment
            .iter()
            .filter(|(_, e)| matches!(e.kind, EquipmentKind::EnergySource { .. }))
            .map(|(id, _)| id)
            .collect()
    }

    /// Core index of the nominal `phase` on `terminal`.
    pub fn core_of(&self, terminal: TerminalId, phase: SinglePhaseKind) -> Option<usize> {
        self.terminals.get(terminal)?.phases.index_of(phase)
    }

    /// Nominal phase code of `terminal`, `None` for unknown terminals.
    pub fn phases_of(&self, terminal: TerminalId) -> PhaseCode {
        self.terminals
            .get(terminal)
            .map(|t| t.phases)
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// A graph plus the traced phases of both state views.
#[derive(Debug, Clone, Default)]
pub struct Network {
    graph: NetworkGraph,
    normal: TerminalPhases,
    current: TerminalPhases,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_graph(graph: NetworkGraph) -> Self {
        Self {
            graph,
            ..Self::default()
        }
    }

    pub fn graph(&self) -> &NetworkGraph {
        &self.graph
    }

    /// Mutable graph access. Traced phases are not invalidated.
    pub fn graph_mut(&mut self) -> &mut NetworkGraph {
        &mut self.graph
    }

    pub fn phases(&self, view: StateView) -> &TerminalPhases {
        match view {
            StateView::Normal => &self.normal,
            StateView::Current => &self.current,
        }
    }

    pub fn phases_mut(&mut self, view: StateView) -> &mut TerminalPhases {
        match view {
            StateView::Normal => &mut self.normal,
            StateView::Current => &mut self.current,
        }
    }

    pub fn normal_phases(&self, terminal: TerminalId) -> PhaseState {
        self.normal.get(terminal)
    }

    pub fn current_phases(&self, terminal: TerminalId) -> PhaseState {
        self.current.get(terminal)
    }

    /// The graph and one view's phases, borrowed together.
    pub fn view_mut(&mut self, view: StateView) -> (&NetworkGraph, &mut TerminalPhases) {
        match view {
            StateView::Normal => (&self.graph, &mut self.normal),
            StateView::Current => (&self.graph, &mut self.current),
        }
    }

    /// The graph with both views' phases, borrowed together.
    pub fn split_mut(&mut self) -> (&NetworkGraph, &mut TerminalPhases, &mut TerminalPhases) {
        (&self.graph, &mut self.normal, &mut self.current)
    }
}
