//! Asynchronous notifications between agents and systems.
//!
//! Nothing mutates another agent directly. Damage, spawns, payouts and the
//! like are published here and delivered in FIFO order at the start of the
//! next tick.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::agent::{AgentId, AgentKind, Faction};
use crate::economy::StatDelta;
use crate::grid::TilePos;

/// Win or loss for a faction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// The faction lost.
    Defeat,
    /// The faction won.
    Victory,
}

/// Message delivered at the start of a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notification {
    /// Reduce a target's health.
    Damage {
        /// Agent taking damage.
        target: AgentId,
        /// Health points removed.
        amount: u32,
        /// Attacker, if any.
        source: Option<AgentId>,
        /// Attacker kind, if any.
        source_kind: Option<AgentKind>,
    },
    /// Create a unit.
    SpawnUnit {
        /// Kind to create.
        kind: AgentKind,
        /// Where it appears.
        tile: TilePos,
        /// Producing faction.
        faction: Faction,
    },
    /// Adjust a faction statistic.
    StatDelta(StatDelta),
    /// Loot paid out for a death. Published exactly once per death.
    DeathPayout {
        /// Agent that died.
        agent: AgentId,
        /// Its kind.
        kind: AgentKind,
        /// Stat changes to apply.
        deltas: Vec<StatDelta>,
    },
    /// An agent entered its terminal state.
    Destroyed {
        /// Agent that died.
        agent: AgentId,
        /// Its kind.
        kind: AgentKind,
        /// Its faction.
        faction: Faction,
    },
    /// Game over for a faction.
    GameOutcome {
        /// Faction concerned.
        faction: Faction,
        /// Result.
        outcome: Outcome,
    },
    /// Player selected an agent.
    Selected {
        /// Agent selected.
        agent: AgentId,
    },
    /// Player deselected an agent.
    Deselected {
        /// Agent deselected.
        agent: AgentId,
    },
    /// Recompute an agent's route to its current goal.
    Repath {
        /// Agent to repath.
        agent: AgentId,
    },
}

/// FIFO notification queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationBus {
    pending: VecDeque<Notification>,
}

impl NotificationBus {
    /// Empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a notification for the next delivery.
    pub fn publish(&mut self, notification: Notification) {
        self.pending.push_back(notification);
    }

    /// Take the oldest pending notification.
    pub fn pop(&mut self) -> Option<Notification> {
        self.pending.pop_front()
    }

    /// Pending notifications, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = &Notification> {
        self.pending.iter()
    }

    /// Number of pending notifications.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
