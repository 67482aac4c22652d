//! Behaviour state machine.
//!
//! The state is what presentation draws (idle, walking or swinging in one of
//! eight facings, dead) and it also gates logic: a destroyed agent ignores
//! everything except teardown.
//!
//! # Facing convention
//!
//! Screen projection with `y` growing downward: `dy = -1` faces north,
//! `dx = +1` faces east, and diagonals combine the two (`(1, 1)` is
//! south-east). Movement and attack facings share this single mapping.

use serde::{Deserialize, Serialize};

use crate::grid::TilePos;

/// One of the eight compass facings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Up the screen.
    North,
    /// Up and right.
    NorthEast,
    /// Right.
    East,
    /// Down and right.
    SouthEast,
    /// Down the screen.
    South,
    /// Down and left.
    SouthWest,
    /// Left.
    West,
    /// Up and left.
    NorthWest,
}

impl Direction {
    /// Facing for a per-axis step sign pair. `None` for `(0, 0)`.
    #[must_use]
    pub const fn from_signs(dx: i32, dy: i32) -> Option<Self> {
        match (dx.signum(), dy.signum()) {
            (0, -1) => Some(Self::North),
            (1, -1) => Some(Self::NorthEast),
            (1, 0) => Some(Self::East),
            (1, 1) => Some(Self::SouthEast),
            (0, 1) => Some(Self::South),
            (-1, 1) => Some(Self::SouthWest),
            (-1, 0) => Some(Self::West),
            (-1, -1) => Some(Self::NorthWest),
            _ => None,
        }
    }

    /// Facing from one tile toward another, comparing each axis.
    #[must_use]
    pub fn toward(from: TilePos, to: TilePos) -> Option<Self> {
        let (dx, dy) = from.step_toward(to);
        Self::from_signs(dx, dy)
    }

    /// The step sign pair this facing stands for.
    #[must_use]
    pub const fn signs(self) -> (i32, i32) {
        match self {
            Self::North => (0, -1),
            Self::NorthEast => (1, -1),
            Self::East => (1, 0),
            Self::SouthEast => (1, 1),
            Self::South => (0, 1),
            Self::SouthWest => (-1, 1),
            Self::West => (-1, 0),
            Self::NorthWest => (-1, -1),
        }
    }
}

/// Logical and displayed state of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BehaviorState {
    /// Standing still.
    #[default]
    Idle,
    /// Translating along a path.
    Moving(Direction),
    /// Engaging a target.
    Attacking(Direction),
    /// Dead. Terminal.
    Destroyed,
}

impl BehaviorState {
    /// Whether this is the terminal state.
    #[must_use]
    pub const fn is_destroyed(self) -> bool {
        matches!(self, Self::Destroyed)
    }

    /// Move to `next`. Refused (returns `false`) once destroyed.
    pub fn transition(&mut self, next: Self) -> bool {
        if self.is_destroyed() {
            return false;
        }
        *self = next;
        true
    }

    /// Attack facing from attacker tile to target tile.
    ///
    /// Attacks on the attacker's own tile face south.
    #[must_use]
    pub fn attacking(attacker: TilePos, target: TilePos) -> Self {
        Self::Attacking(Direction::toward(attacker, target).unwrap_or(Direction::South))
    }
}
