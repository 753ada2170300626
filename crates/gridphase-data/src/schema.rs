//! Serde data file structs for network fixtures.
//!
//! A fixture lists equipment by mRID. Terminals name the connectivity node
//! they sit on, and terminals naming the same node are joined. Cuts and
//! clamps name the AC line segment that hosts them. These structs are
//! deserialized from RON, JSON or TOML and then resolved into a
//! [`gridphase_core::network::Network`] by the loader.

use gridphase_core::phase::{PhaseCode, SinglePhaseKind};
use serde::Deserialize;

// ===========================================================================
// Network
// ===========================================================================

/// A whole network fixture.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkData {
    pub equipment: Vec<EquipmentData>,
}

/// One piece of conducting equipment.
#[derive(Debug, Clone, Deserialize)]
pub struct EquipmentData {
    pub mrid: String,
    pub kind: EquipmentKindData,
    /// Ordered by sequence number, starting at terminal 1.
    pub terminals: Vec<TerminalData>,
    #[serde(default = "default_true")]
    pub in_service: bool,
    #[serde(default = "default_true")]
    pub normally_in_service: bool,
}

fn default_true() -> bool {
    true
}

/// A terminal and the node it connects to, if any.
#[derive(Debug, Clone, Deserialize)]
pub struct TerminalData {
    pub phases: PhaseCode,
    #[serde(default)]
    pub node: Option<String>,
}

// ===========================================================================
// Equipment kinds
// ===========================================================================

/// What the equipment is.
#[derive(Debug, Clone, Deserialize)]
pub enum EquipmentKindData {
    Plain,
    Switch {
        #[serde(default)]
        feeder_breaker: bool,
        #[serde(default)]
        normally_open: OpenData,
        #[serde(default)]
        open: OpenData,
    },
    BusbarSection,
    AcLineSegment {
        #[serde(default)]
        length: Option<f64>,
    },
    Cut {
        segment: String,
        #[serde(default)]
        length_from_t1: Option<f64>,
        #[serde(default)]
        normally_open: OpenData,
        #[serde(default)]
        open: OpenData,
    },
    Clamp {
        segment: String,
        #[serde(default)]
        length_from_t1: Option<f64>,
    },
    PowerTransformer,
    EnergySource {
        phases: Vec<SinglePhaseKind>,
    },
}

impl EquipmentKindData {
    /// The hosting segment of a cut or clamp.
    pub fn segment(&self) -> Option<&str> {
        match self {
            Self::Cut { segment, .. } | Self::Clamp { segment, .. } => Some(segment),
            _ => None,
        }
    }
}

/// Open state of a switch in one view: every core, or a list of open cores.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OpenData {
    /// `true` opens every core.
    All(bool),
    /// Zero-based indices of the open cores.
    Cores(Vec<usize>),
}

impl Default for OpenData {
    fn default() -> Self {
        Self::All(false)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
