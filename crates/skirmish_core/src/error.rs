//! Error types for the simulation API.
//!
//! Only calls made *into* the simulation can fail. A tick never does:
//! contention, unreachable goals, invalid displacement and stale targets
//! all degrade to "do nothing this tick".

use thiserror::Error;

use crate::agent::{AgentId, AgentKind};
use crate::grid::TilePos;
use crate::production::ProductionError;

/// Result type alias using [`SimError`].
pub type Result<T> = std::result::Result<T, SimError>;

/// Top-level error type for simulation commands and data loading.
#[derive(Debug, Error)]
pub enum SimError {
    /// No live agent with this id.
    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    /// The agent exists but has already been destroyed.
    #[error("Agent {0} is destroyed")]
    AgentDestroyed(AgentId),

    /// The agent's kind cannot perform the requested action.
    #[error("Agent {agent} ({kind:?}) cannot {action}")]
    Unsupported {
        /// Agent the command was addressed to.
        agent: AgentId,
        /// Its kind.
        kind: AgentKind,
        /// What was asked of it.
        action: &'static str,
    },

    /// A kind is missing from the kind table.
    #[error("No profile for agent kind {0:?}")]
    UnknownKind(AgentKind),

    /// Spawn or placement on tiles that cannot hold the agent.
    #[error("Cannot place {kind:?} at {tile}")]
    InvalidPlacement {
        /// Kind being placed.
        kind: AgentKind,
        /// Anchor tile of the placement.
        tile: TilePos,
    },

    /// Build-queue admission failed.
    #[error(transparent)]
    Production(#[from] ProductionError),

    /// Data file parsing error.
    #[error("Failed to parse {what}: {message}")]
    DataParse {
        /// What was being parsed.
        what: String,
        /// Error message.
        message: String,
    },

    /// Snapshot encode/decode failure.
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Invalid configuration or state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}
