//! Nominal phase vocabulary: single phases, phase codes and flow direction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

// ---------------------------------------------------------------------------
// SinglePhaseKind
// ---------------------------------------------------------------------------

/// One conductor's phase label.
///
/// `X` and `Y` are positional placeholders for single and two phase wiring
/// whose real phase is unknown at the terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum SinglePhaseKind {
    #[default]
    None,
    A,
    B,
    C,
    N,
    X,
    Y,
}

impl SinglePhaseKind {
    /// Every non-`None` phase, in encoding order.
    pub const ALL: [SinglePhaseKind; 6] = [Self::A, Self::B, Self::C, Self::N, Self::X, Self::Y];

    pub(crate) fn bits(self) -> u8 {
        match self {
            Self::None => 0,
            Self::A => 1,
            Self::B => 2,
            Self::C => 3,
            Self::N => 4,
            Self::X => 5,
            Self::Y => 6,
        }
    }

    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits {
            1 => Self::A,
            2 => Self::B,
            3 => Self::C,
            4 => Self::N,
            5 => Self::X,
            6 => Self::Y,
            _ => Self::None,
        }
    }

    /// True for the positional placeholders `X` and `Y`.
    pub fn is_positional(self) -> bool {
        matches!(self, Self::X | Self::Y)
    }

    pub fn is_neutral(self) -> bool {
        self == Self::N
    }
}

impl fmt::Display for SinglePhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "NONE",
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::N => "N",
            Self::X => "X",
            Self::Y => "Y",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// PhaseCode
// ---------------------------------------------------------------------------

/// The ordered set of nominal phases a terminal presents.
///
/// The position of a phase within [`PhaseCode::single_phases`] is the core
/// index used by [`PhaseState`](crate::phase_state::PhaseState).
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PhaseCode {
    #[default]
    None,
    A,
    B,
    C,
    N,
    AB,
    AC,
    AN,
    BC,
    BN,
    CN,
    ABC,
    ABN,
    ACN,
    BCN,
    ABCN,
    X,
    XN,
    XY,
    XYN,
    Y,
    YN,
}

impl PhaseCode {
    pub const ALL: [PhaseCode; 22] = [
        Self::None,
        Self::A,
        Self::B,
        Self::C,
        Self::N,
        Self::AB,
        Self::AC,
        Self::AN,
        Self::BC,
        Self::BN,
        Self::CN,
        Self::ABC,
        Self::ABN,
        Self::ACN,
        Self::BCN,
        Self::ABCN,
        Self::X,
        Self::XN,
        Self::XY,
        Self::XYN,
        Self::Y,
        Self::YN,
    ];

    /// The phases of this code in core order.
    pub fn single_phases(self) -> &'static [SinglePhaseKind] {
        use SinglePhaseKind as P;
        match self {
            Self::None => &[],
            Self::A => &[P::A],
            Self::B => &[P::B],
            Self::C => &[P::C],
            Self::N => &[P::N],
            Self::AB => &[P::A, P::B],
            Self::AC => &[P::A, P::C],
            Self::AN => &[P::A, P::N],
            Self::BC => &[P::B, P::C],
            Self::BN => &[P::B, P::N],
            Self::CN => &[P::C, P::N],
            Self::ABC => &[P::A, P::B, P::C],
            Self::ABN => &[P::A, P::B, P::N],
            Self::ACN => &[P::A, P::C, P::N],
            Self::BCN => &[P::B, P::C, P::N],
            Self::ABCN => &[P::A, P::B, P::C, P::N],
            Self::X => &[P::X],
            Self::XN => &[P::X, P::N],
            Self::XY => &[P::X, P::Y],
            Self::XYN => &[P::X, P::Y, P::N],
            Self::Y => &[P::Y],
            Self::YN => &[P::Y, P::N],
        }
    }

    /// Find the code whose phases are exactly `phases`, in order.
    pub fn from_phases(phases: &[SinglePhaseKind]) -> Option<PhaseCode> {
        Self::ALL
            .into_iter()
            .find(|code| code.single_phases() == phases)
    }

    pub fn num_phases(self) -> usize {
        self.single_phases().len()
    }

    pub fn contains(self, phase: SinglePhaseKind) -> bool {
        self.single_phases().contains(&phase)
    }

    /// Core index of `phase` on a terminal with this code.
    pub fn index_of(self, phase: SinglePhaseKind) -> Option<usize> {
        self.single_phases().iter().position(|p| *p == phase)
    }

    /// This code with the neutral removed.
    pub fn without_neutral(self) -> PhaseCode {
        let phases: Vec<SinglePhaseKind> = self
            .single_phases()
            .iter()
            .copied()
            .filter(|p| !p.is_neutral())
            .collect();
        Self::from_phases(&phases).unwrap_or(Self::None)
    }

    /// True when any phase of this code is a positional placeholder.
    pub fn is_positional(self) -> bool {
        self.single_phases().iter().any(|p| p.is_positional())
    }
}

impl fmt::Display for PhaseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Direction of energy flow on a core, relative to its terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    None,
    In,
    Out,
    Both,
}

impl Direction {
    pub(crate) fn bits(self) -> u8 {
        match self {
            Self::None => 0b00,
            Self::In => 0b01,
            Self::Out => 0b10,
            Self::Both => 0b11,
        }
    }

    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b01 => Self::In,
            0b10 => Self::Out,
            0b11 => Self::Both,
            _ => Self::None,
        }
    }

    /// Whether this direction includes `other`.
    ///
    /// `Both` has every direction except `None`.
    pub fn has(self, other: Direction) -> bool {
        if self == Self::Both {
            other != Self::None
        } else {
            self == other
        }
    }

    /// This direction with the bits of `other` cleared.
    pub fn without(self, other: Direction) -> Direction {
        Self::from_bits(self.bits() & !other.bits())
    }
}

impl BitOr for Direction {
    type Output = Direction;

    fn bitor(self, rhs: Direction) -> Direction {
        Direction::from_bits(self.bits() | rhs.bits())
    }
}
