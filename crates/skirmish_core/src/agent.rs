//! Agents: the units and structures the simulation advances.
//!
//! Kind-specific behaviour is data-driven. An [`AgentKind`] is looked up in
//! the [`KindTable`](crate::data::KindTable) to get a capability profile,
//! and an agent's [`Role`] carries the per-role state (path follower for
//! units, footprint and build queue for structures).

use serde::{Deserialize, Serialize};

use crate::behavior::BehaviorState;
use crate::collision::ColliderId;
use crate::combat::CombatArbiter;
use crate::data::KindProfile;
use crate::error::{Result, SimError};
use crate::grid::TilePos;
use crate::math::{fixed_serde, option_fixed_serde, Fixed, Vec2Fixed};
use crate::movement::PathFollower;
use crate::production::BuildQueue;

/// Stable agent identifier. Never reused within one simulation.
pub type AgentId = u64;

/// Every unit and structure variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgentKind {
    /// Friendly worker; harvests resource nodes on order.
    Gatherer,
    /// Friendly close-combat unit.
    Melee,
    /// Friendly ranged unit.
    Ranged,
    /// Friendly heavy unit.
    Heavy,
    /// Hostile close-combat unit.
    HostileMelee,
    /// Hostile ranged unit.
    HostileRanged,
    /// Hostile special unit.
    HostileSpecial,
    /// Hostile heavy unit.
    HostileHeavy,
    /// Friendly headquarters. Losing it loses the game.
    BaseCenter,
    /// Friendly combat-unit factory.
    Barracks,
    /// Friendly stationary defence.
    Tower,
    /// Neutral harvestable node.
    ResourceNode,
}

impl AgentKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 12] = [
        Self::Gatherer,
        Self::Melee,
        Self::Ranged,
        Self::Heavy,
        Self::HostileMelee,
        Self::HostileRanged,
        Self::HostileSpecial,
        Self::HostileHeavy,
        Self::BaseCenter,
        Self::Barracks,
        Self::Tower,
        Self::ResourceNode,
    ];
}

/// Allegiance of an agent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum Faction {
    /// Player-controlled.
    #[default]
    Friendly,
    /// Autonomous enemies.
    Hostile,
    /// Inert world objects such as resource nodes.
    Neutral,
}

impl Faction {
    /// Whether sensors of this faction engage bodies of `other`.
    ///
    /// Friendly sensors engage hostile and neutral bodies; hostile sensors
    /// engage friendly bodies only.
    #[must_use]
    pub const fn targets(self, other: Self) -> bool {
        matches!(
            (self, other),
            (Self::Friendly, Self::Hostile) | (Self::Friendly, Self::Neutral) | (Self::Hostile, Self::Friendly)
        )
    }
}

/// Health pool. `current` never exceeds `max` and is 0 once dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Health {
    /// Current health points.
    pub current: u32,
    /// Maximum health points.
    pub max: u32,
}

impl Health {
    /// Create new health at full.
    #[must_use]
    pub const fn new(max: u32) -> Self {
        Self { current: max, max }
    }

    /// Check if dead (health == 0).
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.current == 0
    }

    /// Apply damage, returning actual damage dealt.
    /// Saturates at zero.
    pub fn apply_damage(&mut self, amount: u32) -> u32 {
        let actual = amount.min(self.current);
        self.current -= actual;
        actual
    }

    /// Raise both max and current health.
    pub fn raise_max(&mut self, bonus: u32) {
        self.max = self.max.saturating_add(bonus);
        self.current = self.current.saturating_add(bonus).min(self.max);
    }

    /// Set current health, clamped to `[0, max]`.
    pub fn set_current(&mut self, value: u32) {
        self.current = value.min(self.max);
    }

    /// Health as a percentage (0-100).
    #[must_use]
    pub fn percentage(&self) -> u32 {
        if self.max == 0 {
            0
        } else {
            (self.current * 100) / self.max
        }
    }
}

/// Per-agent combat and movement stats, copied from the kind profile at
/// spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStats {
    /// Damage per strike.
    pub damage: u32,
    /// Attack sensor reach in tiles.
    #[serde(with = "fixed_serde")]
    pub attack_range: Fixed,
    /// Vision sensor reach in tiles.
    #[serde(with = "option_fixed_serde")]
    pub vision_range: Option<Fixed>,
    /// Tiles per second. `None` for structures.
    #[serde(with = "option_fixed_serde")]
    pub speed: Option<Fixed>,
    /// Seconds between strikes.
    #[serde(with = "fixed_serde")]
    pub attack_cooldown: Fixed,
}

impl From<&KindProfile> for AgentStats {
    fn from(profile: &KindProfile) -> Self {
        Self {
            damage: profile.damage,
            attack_range: profile.attack_range,
            vision_range: profile.vision_range,
            speed: profile.speed,
            attack_cooldown: profile.attack_cooldown,
        }
    }
}

/// State owned by a stationary structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureRole {
    /// Tiles the structure occupies on the walkability map.
    pub footprint: Vec<TilePos>,
    /// Production queue, for producing structures.
    pub queue: Option<BuildQueue>,
}

/// Mobile unit or stationary structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Follows paths across the grid.
    Unit(PathFollower),
    /// Sits on a footprint, maybe producing.
    Structure(StructureRole),
}

/// One simulated unit or structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    /// Unique identifier.
    pub id: AgentId,
    /// Kind variant.
    pub kind: AgentKind,
    /// Allegiance.
    pub faction: Faction,
    /// Health pool.
    pub health: Health,
    /// Upgrade level, starting at 1.
    pub level: u8,
    /// Continuous tile-space position (structures: footprint anchor).
    pub position: Vec2Fixed,
    /// Combat and movement stats.
    pub stats: AgentStats,
    /// Behaviour state.
    pub state: BehaviorState,
    /// Role-specific state.
    pub role: Role,
    /// Target bookkeeping for agents that can attack.
    pub combat: Option<CombatArbiter>,
    /// Colliders registered for this agent.
    pub colliders: Vec<ColliderId>,
    /// Selected by the player (presentation only).
    pub selected: bool,
    /// Seconds left before a destroyed agent is removed.
    #[serde(with = "option_fixed_serde")]
    pub removal_timer: Option<Fixed>,
}

impl Agent {
    /// Whether the agent has entered its terminal state.
    #[must_use]
    pub const fn is_destroyed(&self) -> bool {
        self.state.is_destroyed()
    }

    /// Tile containing the agent's position.
    #[must_use]
    pub fn tile(&self) -> TilePos {
        TilePos::containing(self.position)
    }

    /// Path follower, for units.
    #[must_use]
    pub fn follower(&self) -> Option<&PathFollower> {
        match &self.role {
            Role::Unit(follower) => Some(follower),
            Role::Structure(_) => None,
        }
    }

    /// Mutable path follower, for units.
    pub fn follower_mut(&mut self) -> Option<&mut PathFollower> {
        match &mut self.role {
            Role::Unit(follower) => Some(follower),
            Role::Structure(_) => None,
        }
    }

    /// Structure state, for structures.
    #[must_use]
    pub fn structure(&self) -> Option<&StructureRole> {
        match &self.role {
            Role::Structure(structure) => Some(structure),
            Role::Unit(_) => None,
        }
    }

    /// Current attack target id.
    #[must_use]
    pub fn attack_target(&self) -> Option<AgentId> {
        self.combat.as_ref().and_then(CombatArbiter::attack_target)
    }

    /// Current chase target id.
    #[must_use]
    pub fn chase_target(&self) -> Option<AgentId> {
        self.combat.as_ref().and_then(CombatArbiter::chase_target)
    }

    /// Persisted form of this agent.
    #[must_use]
    pub fn save(&self) -> AgentRecord {
        AgentRecord {
            kind: self.kind,
            current_health: self.health.current,
        }
    }

    /// Restore persisted health. The record must describe the same kind.
    pub fn load(&mut self, record: &AgentRecord) -> Result<()> {
        if self.is_destroyed() {
            return Err(SimError::AgentDestroyed(self.id));
        }
        if record.kind != self.kind {
            return Err(SimError::InvalidState(format!(
                "record for {:?} cannot load into agent {} ({:?})",
                record.kind, self.id, self.kind
            )));
        }
        self.health.set_current(record.current_health);
        Ok(())
    }
}

/// The narrow persistence contract: kind and current health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Agent kind.
    pub kind: AgentKind,
    /// Current health points.
    pub current_health: u32,
}
