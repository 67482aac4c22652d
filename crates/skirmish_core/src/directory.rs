//! Agent directory: id allocation and lookup.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::agent::{Agent, AgentId};
use crate::collision::BodyPositions;
use crate::combat::TargetLookup;
use crate::error::{Result, SimError};
use crate::grid::TilePos;
use crate::math::{Fixed, Vec2Fixed};

/// Every agent in the simulation, keyed by id.
///
/// Ids start at 1 and are never reused, so a stale id can only ever miss.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDirectory {
    agents: BTreeMap<AgentId, Agent>,
    next_id: AgentId,
}

impl Default for AgentDirectory {
    fn default() -> Self {
        Self {
            agents: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl AgentDirectory {
    /// Empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next id.
    pub fn allocate_id(&mut self) -> AgentId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Store an agent under its id.
    pub fn insert(&mut self, agent: Agent) {
        self.agents.insert(agent.id, agent);
    }

    /// Look up an agent.
    #[must_use]
    pub fn get(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(&id)
    }

    /// Look up an agent mutably.
    pub fn get_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.agents.get_mut(&id)
    }

    /// A live agent, or why there is none.
    pub fn live(&self, id: AgentId) -> Result<&Agent> {
        let agent = self.agents.get(&id).ok_or(SimError::AgentNotFound(id))?;
        if agent.is_destroyed() {
            return Err(SimError::AgentDestroyed(id));
        }
        Ok(agent)
    }

    /// A live agent, mutably.
    pub fn live_mut(&mut self, id: AgentId) -> Result<&mut Agent> {
        let agent = self.agents.get_mut(&id).ok_or(SimError::AgentNotFound(id))?;
        if agent.is_destroyed() {
            return Err(SimError::AgentDestroyed(id));
        }
        Ok(agent)
    }

    /// Remove an agent.
    pub fn remove(&mut self, id: AgentId) -> Option<Agent> {
        self.agents.remove(&id)
    }

    /// Whether `id` is present (alive or awaiting removal).
    #[must_use]
    pub fn contains(&self, id: AgentId) -> bool {
        self.agents.contains_key(&id)
    }

    /// Number of agents present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Check if empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// All ids in ascending order. Use this for any order-sensitive work.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<AgentId> {
        self.agents.keys().copied().collect()
    }

    /// Agents in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    /// Agents in ascending id order, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Agent> {
        self.agents.values_mut()
    }

    /// Missing agents count as destroyed.
    #[must_use]
    pub fn is_destroyed(&self, id: AgentId) -> bool {
        self.agents.get(&id).map_or(true, Agent::is_destroyed)
    }

    /// Live agents whose position lies within `range` tiles of `center`,
    /// nearest first, ties by id.
    #[must_use]
    pub fn in_range(&self, center: Vec2Fixed, range: Fixed) -> Vec<AgentId> {
        let limit = range.saturating_mul(range);
        let mut hits: Vec<(Fixed, AgentId)> = self
            .agents
            .values()
            .filter(|agent| !agent.is_destroyed())
            .map(|agent| (agent.position.distance_squared(center), agent.id))
            .filter(|&(distance, _)| distance <= limit)
            .collect();
        hits.sort_unstable();
        hits.into_iter().map(|(_, id)| id).collect()
    }
}

impl TargetLookup for AgentDirectory {
    fn target_tile(&self, id: AgentId) -> Option<TilePos> {
        self.agents
            .get(&id)
            .filter(|agent| !agent.is_destroyed())
            .map(Agent::tile)
    }
}

impl BodyPositions for AgentDirectory {
    fn body_position(&self, agent: AgentId) -> Option<Vec2Fixed> {
        self.agents.get(&agent).map(|a| a.position)
    }

    fn set_body_position(&mut self, agent: AgentId, position: Vec2Fixed) {
        if let Some(a) = self.agents.get_mut(&agent) {
            a.position = position;
        }
    }
}
