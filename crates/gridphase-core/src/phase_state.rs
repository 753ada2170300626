//! Packed per-core phase and direction state for a terminal.
//!
//! Each terminal stores one [`PhaseState`] per state view. A state holds up
//! to [`MAX_CORES`] cores, one byte each: the traced phase in the low nibble
//! and the direction bits above it.

use crate::id::TerminalId;
use crate::phase::{Direction, SinglePhaseKind};
use serde::{Deserialize, Serialize};
use slotmap::SecondaryMap;

/// Number of cores a single terminal can carry.
pub const MAX_CORES: usize = 4;

const CORE_BITS: u32 = 8;
const PHASE_MASK: u32 = 0x0F;
const DIRECTION_SHIFT: u32 = 4;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhaseStateError {
    #[error("core {core} is out of range, terminals carry at most {MAX_CORES} cores")]
    InvalidCore { core: usize },

    #[error("core {core} already carries phase {existing}, cannot add {attempted}")]
    CrossingPhases {
        core: usize,
        existing: SinglePhaseKind,
        attempted: SinglePhaseKind,
    },
}

// ---------------------------------------------------------------------------
// PhaseState
// ---------------------------------------------------------------------------

/// Traced phase and direction of every core on one terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PhaseState(u32);

fn check_core(core: usize) -> Result<(), PhaseStateError> {
    if core < MAX_CORES {
        Ok(())
    } else {
        Err(PhaseStateError::InvalidCore { core })
    }
}

impl PhaseState {
    pub fn new() -> Self {
        Self::default()
    }

    fn core_byte(self, core: usize) -> u32 {
        if core < MAX_CORES {
            (self.0 >> (core as u32 * CORE_BITS)) & 0xFF
        } else {
            0
        }
    }

    fn write_core(&mut self, core: usize, phase: SinglePhaseKind, direction: Direction) {
        let shift = core as u32 * CORE_BITS;
        let byte = if phase == SinglePhaseKind::None || direction == Direction::None {
            0
        } else {
            u32::from(phase.bits()) | (u32::from(direction.bits()) << DIRECTION_SHIFT)
        };
        self.0 = (self.0 & !(0xFF << shift)) | (byte << shift);
    }

    /// Traced phase on `core`. Cores outside the supported range read as `None`.
    pub fn phase(self, core: usize) -> SinglePhaseKind {
        SinglePhaseKind::from_bits((self.core_byte(core) & PHASE_MASK) as u8)
    }

    /// Flow direction on `core`. Cores outside the supported range read as `None`.
    pub fn direction(self, core: usize) -> Direction {
        Direction::from_bits((self.core_byte(core) >> DIRECTION_SHIFT) as u8)
    }

    /// True when no core carries a phase.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Add `direction` for `phase` on `core`.
    ///
    /// Returns `Ok(true)` when the state changed. Adding `None` for either
    /// argument, or a direction that is already present, returns `Ok(false)`.
    /// A core already carrying a different phase is a
    /// [`PhaseStateError::CrossingPhases`] and the state is left untouched.
    pub fn add(
        &mut self,
        core: usize,
        phase: SinglePhaseKind,
        direction: Direction,
    ) -> Result<bool, PhaseStateError> {
        check_core(core)?;
        if phase == SinglePhaseKind::None || direction == Direction::None {
            return Ok(false);
        }

        let existing = self.phase(core);
        if existing != SinglePhaseKind::None && existing != phase {
            return Err(PhaseStateError::CrossingPhases {
                core,
                existing,
                attempted: phase,
            });
        }

        let current = self.direction(core);
        if current.has(direction) {
            return Ok(false);
        }

        self.write_core(core, phase, current | direction);
        Ok(true)
    }

    /// Replace the phase and direction of `core` outright.
    ///
    /// Setting `None` for either argument clears the core. Returns whether the
    /// stored value changed.
    pub fn set(
        &mut self,
        core: usize,
        phase: SinglePhaseKind,
        direction: Direction,
    ) -> Result<bool, PhaseStateError> {
        check_core(core)?;
        let before = *self;
        self.write_core(core, phase, direction);
        Ok(before != *self)
    }

    /// Clear the `direction` bits of `core` if it carries `phase`.
    ///
    /// Once no direction remains the phase is cleared as well.
    pub fn remove(
        &mut self,
        core: usize,
        phase: SinglePhaseKind,
        direction: Direction,
    ) -> Result<bool, PhaseStateError> {
        check_core(core)?;
        if phase == SinglePhaseKind::None || self.phase(core) != phase {
            return Ok(false);
        }

        let current = self.direction(core);
        let remaining = current.without(direction);
        if remaining == current {
            return Ok(false);
        }

        self.write_core(core, phase, remaining);
        Ok(true)
    }

    /// Clear `core` entirely.
    pub fn remove_all(&mut self, core: usize) -> Result<bool, PhaseStateError> {
        check_core(core)?;
        let changed = self.core_byte(core) != 0;
        self.write_core(core, SinglePhaseKind::None, Direction::None);
        Ok(changed)
    }

    /// Clear every core.
    pub fn clear(&mut self) {
        self.0 = 0;
    }

    /// `(phase, direction)` of each core in index order.
    pub fn cores(self) -> impl Iterator<Item = (SinglePhaseKind, Direction)> {
        (0..MAX_CORES).map(move |core| (self.phase(core), self.direction(core)))
    }
}

// ---------------------------------------------------------------------------
// TerminalPhases
// ---------------------------------------------------------------------------

/// One state view's [`PhaseState`] for every terminal.
///
/// Terminals that were never written read as an empty state.
#[derive(Debug, Clone, Default)]
pub struct TerminalPhases {
    states: SecondaryMap<TerminalId, PhaseState>,
}

impl TerminalPhases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of `terminal`.
    pub fn get(&self, terminal: TerminalId) -> PhaseState {
        self.states.get(terminal).copied().unwrap_or_default()
    }

    /// Mutable state of `terminal`, inserting an empty state on first use.
    ///
    /// Returns `None` only for a key whose terminal slot has been reused.
    pub fn get_mut(&mut self, terminal: TerminalId) -> Option<&mut PhaseState> {
        Some(self.states.entry(terminal)?.or_insert_with(PhaseState::default))
    }

    /// Drop every stored state.
    pub fn clear(&mut self) {
        self.states.clear();
    }

    /// Terminals with at least one traced core.
    pub fn traced_terminals(&self) -> impl Iterator<Item = TerminalId> + '_ {
        self.states
            .iter()
            .filter(|(_, state)| !state.is_empty())
            .map(|(terminal, _)| terminal)
    }
}
