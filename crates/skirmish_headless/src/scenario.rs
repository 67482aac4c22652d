//! Scenario loading and validation.
//!
//! A scenario is a RON document describing the map, optional tuning and
//! kind overrides, starting resources, initial placements and a list of
//! orders to issue at fixed ticks.
//!
//! ```ron
//! Scenario(
//!     name: "Hold the gap",
//!     map: [
//!         "........",
//!         "...##...",
//!         "........",
//!     ],
//!     placements: [
//!         (label: Some("base"), kind: BaseCenter, at: (0, 0)),
//!         (label: Some("guard"), kind: Melee, at: (4, 2)),
//!     ],
//!     orders: [
//!         (tick: 10, order: Move(agent: "guard", to: (7, 0))),
//!     ],
//! )
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::result::Result;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use skirmish_core::prelude::*;

/// Ticks run when neither the scenario nor the command line says otherwise.
pub const DEFAULT_TICKS: u64 = 1200;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// The scenario parsed but does not make sense.
    #[error("Invalid scenario: {0}")]
    Invalid(String),
    /// The simulation rejected part of the setup.
    #[error("Simulation error: {0}")]
    Simulation(#[from] SimError),
}

/// One agent present at tick 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Name orders use to refer to this agent.
    #[serde(default)]
    pub label: Option<String>,
    /// Kind to spawn.
    pub kind: AgentKind,
    /// Unit tile, or a structure's top-left footprint tile.
    pub at: (i32, i32),
}

/// A command issued to a labelled agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScenarioOrder {
    /// Walk to a tile.
    Move {
        /// Agent label.
        agent: String,
        /// Goal tile.
        to: (i32, i32),
    },
    /// Chase another agent.
    Chase {
        /// Chaser label.
        agent: String,
        /// Target label.
        target: String,
    },
    /// Stop moving and forget targets.
    Stop {
        /// Agent label.
        agent: String,
    },
    /// Queue production at a structure.
    Enqueue {
        /// Structure label.
        structure: String,
        /// Kind to produce.
        kind: AgentKind,
    },
    /// Upgrade one level.
    Upgrade {
        /// Agent label.
        agent: String,
    },
}

impl ScenarioOrder {
    fn labels(&self) -> Vec<&str> {
        match self {
            Self::Move { agent, .. } | Self::Stop { agent } | Self::Upgrade { agent } => vec![agent],
            Self::Chase { agent, target } => vec![agent, target],
            Self::Enqueue { structure, .. } => vec![structure],
        }
    }
}

/// An order and the tick before which it is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedOrder {
    /// Applied just before this tick runs.
    pub tick: u64,
    /// What to do.
    pub order: ScenarioOrder,
}

/// A complete scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// ASCII map rows: `#` blocked, `.` open.
    pub map: Vec<String>,
    /// Ticks to run unless overridden.
    #[serde(default)]
    pub ticks: Option<u64>,
    /// Simulation tuning. Defaults apply when absent.
    #[serde(default)]
    pub config: Option<SimConfig>,
    /// Profiles replacing the built-in ones.
    #[serde(default)]
    pub kinds: BTreeMap<AgentKind, KindProfile>,
    /// Starting resources per faction. Replaces the config's resource
    /// entries for every faction listed.
    #[serde(default)]
    pub starting_resources: BTreeMap<Faction, i64>,
    /// Agents present at tick 0, spawned in order.
    #[serde(default)]
    pub placements: Vec<Placement>,
    /// Orders to issue, in any order.
    #[serde(default)]
    pub orders: Vec<TimedOrder>,
}

/// A built simulation plus the label table its orders use.
#[derive(Debug)]
pub struct Prepared {
    /// Simulation at tick 0.
    pub sim: Simulation,
    /// Label to agent id.
    pub labels: BTreeMap<String, AgentId>,
    /// Orders sorted by tick, stable within a tick.
    pub orders: Vec<TimedOrder>,
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string.
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Self = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// The tuning this scenario runs with, starting resources folded in.
    pub fn effective_config(&self) -> SimConfig {
        let mut config = self.config.clone().unwrap_or_default();
        if !self.starting_resources.is_empty() {
            config.starting_stats.retain(|delta| {
                delta.stat != Stat::Resources || !self.starting_resources.contains_key(&delta.faction)
            });
            config.starting_stats.extend(
                self.starting_resources
                    .iter()
                    .map(|(&faction, &amount)| StatDelta::new(faction, Stat::Resources, amount)),
            );
        }
        config
    }

    /// The kind table with overrides applied.
    pub fn effective_kinds(&self) -> KindTable {
        let mut kinds = KindTable::standard();
        for (&kind, profile) in &self.kinds {
            kinds.insert(kind, profile.clone());
        }
        kinds
    }

    /// Check everything that can be checked without running a tick.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        self.prepare().map(|_| ())
    }

    /// Build the simulation and resolve labels.
    pub fn prepare(&self) -> Result<Prepared, ScenarioError> {
        if self.map.is_empty() {
            return Err(ScenarioError::Invalid("map has no rows".into()));
        }
        let map = WalkabilityMap::from_rows(&self.map)?;
        let mut sim = Simulation::with_kinds(map, self.effective_config(), self.effective_kinds())?;

        let mut labels = BTreeMap::new();
        for placement in &self.placements {
            let (x, y) = placement.at;
            let id = sim.spawn(placement.kind, TilePos::new(x, y))?;
            if let Some(label) = &placement.label {
                if labels.insert(label.clone(), id).is_some() {
                    return Err(ScenarioError::Invalid(format!("duplicate label '{label}'")));
                }
            }
        }

        let known: BTreeSet<&str> = labels.keys().map(String::as_str).collect();
        for timed in &self.orders {
            if let Some(missing) = timed.order.labels().into_iter().find(|l| !known.contains(l)) {
                return Err(ScenarioError::Invalid(format!(
                    "order at tick {} names unknown agent '{missing}'",
                    timed.tick
                )));
            }
        }

        let mut orders = self.orders.clone();
        orders.sort_by_key(|o| o.tick);

        tracing::debug!(
            scenario = %self.name,
            agents = sim.agents().len(),
            orders = orders.len(),
            "scenario prepared"
        );
        Ok(Prepared { sim, labels, orders })
    }
}

impl Prepared {
    /// Apply one order. Rejections are returned rather than raised so a run
    /// can carry on past them.
    pub fn apply(&mut self, order: &ScenarioOrder) -> Result<(), SimError> {
        let id = |label: &str| self.labels.get(label).copied().unwrap_or_default();
        match order {
            ScenarioOrder::Move { agent, to } => self.sim.order_move(id(agent), TilePos::new(to.0, to.1)),
            ScenarioOrder::Chase { agent, target } => self.sim.order_chase(id(agent), id(target)),
            ScenarioOrder::Stop { agent } => self.sim.order_stop(id(agent)),
            ScenarioOrder::Enqueue { structure, kind } => {
                self.sim.enqueue_production(id(structure), *kind).map(|_| ())
            }
            ScenarioOrder::Upgrade { agent } => self.sim.upgrade(id(agent)).map(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUEL: &str = r#"
        Scenario(
            name: "Duel",
            map: [
                "..........",
                "..........",
                "..........",
            ],
            ticks: Some(40),
            config: Some(SimConfig(tick_seconds: 0.25)),
            starting_resources: { Friendly: 500 },
            placements: [
                (label: Some("hero"), kind: Melee, at: (1, 1)),
                (label: Some("foe"), kind: HostileMelee, at: (8, 1)),
                (kind: ResourceNode, at: (5, 0)),
            ],
            orders: [
                (tick: 5, order: Stop(agent: "hero")),
                (tick: 0, order: Move(agent: "hero", to: (4, 1))),
            ],
        )
    "#;

    #[test]
    fn test_parse_from_ron() {
        let scenario = Scenario::from_ron_str(DUEL).unwrap();
        assert_eq!(scenario.name, "Duel");
        assert_eq!(scenario.placements.len(), 3);
        assert_eq!(scenario.ticks, Some(40));
        assert_eq!(
            scenario.effective_config().tick_seconds,
            Fixed::from_num(0.25)
        );
    }

    #[test]
    fn test_prepare_sorts_orders_and_resolves_labels() {
        let prepared = Scenario::from_ron_str(DUEL).unwrap().prepare().unwrap();
        assert_eq!(prepared.labels.len(), 2);
        assert_eq!(prepared.orders[0].tick, 0);
        assert_eq!(prepared.orders[1].tick, 5);
        assert_eq!(prepared.sim.economy(Faction::Friendly).resources, 500);
    }

    #[test]
    fn test_unknown_label_is_invalid() {
        let mut scenario = Scenario::from_ron_str(DUEL).unwrap();
        scenario.orders.push(TimedOrder {
            tick: 1,
            order: ScenarioOrder::Upgrade {
                agent: "nobody".into(),
            },
        });
        assert!(matches!(scenario.validate(), Err(ScenarioError::Invalid(_))));
    }

    #[test]
    fn test_blocked_placement_is_rejected() {
        let mut scenario = Scenario::from_ron_str(DUEL).unwrap();
        scenario.map[1] = "##########".into();
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::Simulation(SimError::InvalidPlacement { .. }))
        ));
    }

    #[test]
    fn test_kind_override() {
        let ron = r#"
            Scenario(
                name: "Slow",
                map: ["...."],
                kinds: {
                    Melee: (faction: Friendly, max_health: 7, speed: Some(0.5), solid: true),
                },
            )
        "#;
        let scenario = Scenario::from_ron_str(ron).unwrap();
        let kinds = scenario.effective_kinds();
        let melee = kinds.get(AgentKind::Melee).unwrap();
        assert_eq!(melee.max_health, 7);
        assert_eq!(melee.speed, Some(Fixed::from_num(0.5)));
        assert_eq!(kinds.get(AgentKind::Heavy).unwrap().max_health, 150);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Scenario::load("/definitely/not/here.ron"),
            Err(ScenarioError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("duel.ron");
        std::fs::write(&path, DUEL).unwrap();
        assert_eq!(Scenario::load(&path).unwrap().name, "Duel");

        std::fs::write(&path, "Scenario(").unwrap();
        assert!(matches!(Scenario::load(&path), Err(ScenarioError::ParseError(_))));
    }
}
