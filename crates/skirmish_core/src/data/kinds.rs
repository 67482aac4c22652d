//! Kind profiles: the capability table behind every [`AgentKind`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::agent::{AgentKind, Faction};
use crate::economy::{Stat, StatDelta};
use crate::error::{Result, SimError};
use crate::grid::TilePos;
use crate::math::{fixed_decimal, option_fixed_decimal, Fixed};
use crate::production::QueueGating;

fn default_cooldown() -> Fixed {
    Fixed::ONE
}

fn default_footprint() -> (u32, u32) {
    (1, 1)
}

fn default_body_size() -> Fixed {
    Fixed::from_num(0.8)
}

fn default_max_level() -> u8 {
    1
}

/// Data-driven definition of one agent kind.
///
/// Distances are in tiles, times in seconds.
///
/// # Example RON
///
/// ```ron
/// KindProfile(
///     faction: Hostile,
///     max_health: 40,
///     damage: 5,
///     attack_range: 1.0,
///     vision_range: Some(5.0),
///     speed: Some(4.0),
///     solid: true,
///     autonomous: true,
///     loot: [
///         StatDelta(faction: Friendly, stat: MobDrop, amount: 5),
///         StatDelta(faction: Friendly, stat: UnitsKilled, amount: 1),
///     ],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindProfile {
    /// Allegiance of agents of this kind.
    pub faction: Faction,

    /// Maximum (and starting) health.
    pub max_health: u32,

    /// Damage per strike. Zero means the kind never attacks.
    #[serde(default)]
    pub damage: u32,

    /// Attack sensor reach.
    #[serde(default, with = "fixed_decimal")]
    pub attack_range: Fixed,

    /// Vision sensor reach. Only autonomous kinds usually carry one.
    #[serde(default, with = "option_fixed_decimal")]
    pub vision_range: Option<Fixed>,

    /// Movement speed. `None` marks a stationary structure.
    #[serde(default, with = "option_fixed_decimal")]
    pub speed: Option<Fixed>,

    /// Seconds between strikes.
    #[serde(default = "default_cooldown", with = "fixed_decimal")]
    pub attack_cooldown: Fixed,

    /// Production cost in [`Stat::Resources`].
    #[serde(default)]
    pub cost: u32,

    /// Production time.
    #[serde(default, with = "fixed_decimal")]
    pub build_time: Fixed,

    /// Structure footprint in tiles (width, height).
    #[serde(default = "default_footprint")]
    pub footprint: (u32, u32),

    /// Body collider edge length.
    #[serde(default = "default_body_size", with = "fixed_decimal")]
    pub body_size: Fixed,

    /// Solid bodies are pushed apart; trigger bodies only report overlap.
    #[serde(default)]
    pub solid: bool,

    /// Highest upgrade level.
    #[serde(default = "default_max_level")]
    pub max_level: u8,

    /// Upgrade cost in [`Stat::MobDrop`].
    #[serde(default)]
    pub upgrade_cost: u32,

    /// Health added to max and current per upgrade.
    #[serde(default)]
    pub upgrade_health: u32,

    /// Build-queue gating, for producing structures.
    #[serde(default)]
    pub queue: Option<QueueGating>,

    /// Kinds the build queue accepts.
    #[serde(default)]
    pub produces: Vec<AgentKind>,

    /// Stat changes paid out once when an agent of this kind dies.
    #[serde(default)]
    pub loot: Vec<StatDelta>,

    /// Acts on its own: chases what it sees, otherwise heads for the base.
    #[serde(default)]
    pub autonomous: bool,

    /// Non-combat harvester; never auto-targets resource nodes.
    #[serde(default)]
    pub gatherer: bool,

    /// Destroying it loses the game for its faction.
    #[serde(default)]
    pub defeat_on_destroy: bool,
}

impl KindProfile {
    /// Minimal profile; every optional capability off.
    #[must_use]
    pub fn new(faction: Faction, max_health: u32) -> Self {
        Self {
            faction,
            max_health,
            damage: 0,
            attack_range: Fixed::ZERO,
            vision_range: None,
            speed: None,
            attack_cooldown: default_cooldown(),
            cost: 0,
            build_time: Fixed::ZERO,
            footprint: default_footprint(),
            body_size: default_body_size(),
            solid: false,
            max_level: default_max_level(),
            upgrade_cost: 0,
            upgrade_health: 0,
            queue: None,
            produces: Vec::new(),
            loot: Vec::new(),
            autonomous: false,
            gatherer: false,
            defeat_on_destroy: false,
        }
    }

    fn unit(faction: Faction, max_health: u32, speed: f64) -> Self {
        Self {
            speed: Some(Fixed::from_num(speed)),
            solid: true,
            ..Self::new(faction, max_health)
        }
    }

    fn armed(mut self, damage: u32, range: f64, cooldown: f64) -> Self {
        self.damage = damage;
        self.attack_range = Fixed::from_num(range);
        self.attack_cooldown = Fixed::from_num(cooldown);
        self
    }

    fn priced(mut self, cost: u32, build_time: f64) -> Self {
        self.cost = cost;
        self.build_time = Fixed::from_num(build_time);
        self
    }

    fn hostile(mut self, drop: i64) -> Self {
        self.vision_range = Some(Fixed::from_num(5));
        self.autonomous = true;
        self.loot = vec![
            StatDelta::new(Faction::Friendly, Stat::MobDrop, drop),
            StatDelta::new(Faction::Friendly, Stat::UnitsKilled, 1),
        ];
        self
    }

    fn friendly_loss(mut self) -> Self {
        self.loot = vec![StatDelta::new(Faction::Friendly, Stat::UnitsLost, 1)];
        self
    }

    /// Whether agents of this kind move.
    #[must_use]
    pub const fn is_mobile(&self) -> bool {
        self.speed.is_some()
    }

    /// Whether agents of this kind deal damage.
    #[must_use]
    pub fn can_attack(&self) -> bool {
        self.damage > 0 && self.attack_range > Fixed::ZERO
    }

    /// Tiles covered when anchored at `anchor` (top-left).
    #[must_use]
    pub fn footprint_tiles(&self, anchor: TilePos) -> Vec<TilePos> {
        let (w, h) = self.footprint;
        (0..h as i32)
            .flat_map(|dy| (0..w as i32).map(move |dx| anchor.offset(dx, dy)))
            .collect()
    }
}

/// Capability table for all kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindTable {
    profiles: BTreeMap<AgentKind, KindProfile>,
}

impl KindTable {
    /// The built-in table.
    #[must_use]
    pub fn standard() -> Self {
        use AgentKind as K;
        use Faction::{Friendly, Hostile, Neutral};

        let mut base = KindProfile::new(Friendly, 1000);
        base.footprint = (2, 2);
        base.max_level = 5;
        base.upgrade_cost = 10;
        base.upgrade_health = 50;
        base.queue = Some(QueueGating::Progress);
        base.produces = vec![K::Gatherer];
        base.defeat_on_destroy = true;

        let mut barracks = KindProfile::new(Friendly, 500);
        barracks.footprint = (2, 2);
        barracks.queue = Some(QueueGating::Admission);
        barracks.produces = vec![K::Melee, K::Ranged, K::Heavy];
        barracks.build_time = Fixed::from_num(10);
        barracks.cost = 150;

        let mut tower = KindProfile::new(Friendly, 300).armed(10, 4.0, 1.5);
        tower.max_level = 5;
        tower.upgrade_cost = 25;
        tower.upgrade_health = 50;

        let mut node = KindProfile::new(Neutral, 100);
        node.loot = vec![StatDelta::new(Friendly, Stat::Resources, 50)];

        let mut gatherer = KindProfile::unit(Friendly, 30, 4.0)
            .armed(2, 1.0, 1.0)
            .priced(20, 3.0)
            .friendly_loss();
        gatherer.gatherer = true;

        let profiles = BTreeMap::from([
            (K::Gatherer, gatherer),
            (
                K::Melee,
                KindProfile::unit(Friendly, 60, 5.0)
                    .armed(8, 1.0, 1.0)
                    .priced(40, 5.0)
                    .friendly_loss(),
            ),
            (
                K::Ranged,
                KindProfile::unit(Friendly, 40, 5.0)
                    .armed(6, 3.0, 1.2)
                    .priced(50, 6.0)
                    .friendly_loss(),
            ),
            (
                K::Heavy,
                KindProfile::unit(Friendly, 150, 3.0)
                    .armed(15, 1.0, 2.0)
                    .priced(100, 10.0)
                    .friendly_loss(),
            ),
            (
                K::HostileMelee,
                KindProfile::unit(Hostile, 40, 4.0).armed(5, 1.0, 1.0).hostile(5),
            ),
            (
                K::HostileRanged,
                KindProfile::unit(Hostile, 30, 4.0).armed(5, 3.0, 1.0).hostile(10),
            ),
            (
                K::HostileSpecial,
                KindProfile::unit(Hostile, 60, 5.0).armed(8, 2.0, 1.0).hostile(15),
            ),
            (
                K::HostileHeavy,
                KindProfile::unit(Hostile, 200, 2.5).armed(20, 1.0, 2.0).hostile(20),
            ),
            (K::BaseCenter, base),
            (K::Barracks, barracks),
            (K::Tower, tower),
            (K::ResourceNode, node),
        ]);

        Self { profiles }
    }

    /// Parse a full table from RON: a map from kind to profile.
    pub fn from_ron_str(ron: &str) -> Result<Self> {
        let profiles: BTreeMap<AgentKind, KindProfile> =
            ron::from_str(ron).map_err(|e| SimError::DataParse {
                what: "kind table".into(),
                message: e.to_string(),
            })?;
        Ok(Self { profiles })
    }

    /// Replace entries with those from `overrides`.
    pub fn merge(&mut self, overrides: Self) {
        self.profiles.extend(overrides.profiles);
    }

    /// Profile for a kind.
    pub fn get(&self, kind: AgentKind) -> Result<&KindProfile> {
        self.profiles.get(&kind).ok_or(SimError::UnknownKind(kind))
    }

    /// Insert or replace one profile.
    pub fn insert(&mut self, kind: AgentKind, profile: KindProfile) {
        self.profiles.insert(kind, profile);
    }

    /// Iterate over all profiles in kind order.
    pub fn iter(&self) -> impl Iterator<Item = (AgentKind, &KindProfile)> {
        self.profiles.iter().map(|(k, p)| (*k, p))
    }
}

impl Default for KindTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_covers_every_kind() {
        let table = KindTable::standard();
        for kind in AgentKind::ALL {
            assert!(table.get(kind).is_ok(), "{kind:?} missing");
        }
    }

    #[test]
    fn test_structures_are_immobile_and_units_solid() {
        let table = KindTable::standard();
        let base = table.get(AgentKind::BaseCenter).unwrap();
        assert!(!base.is_mobile());
        assert_eq!(base.queue, Some(QueueGating::Progress));

        let melee = table.get(AgentKind::Melee).unwrap();
        assert!(melee.is_mobile());
        assert!(melee.solid);
        assert!(melee.can_attack());

        assert!(!table.get(AgentKind::ResourceNode).unwrap().can_attack());
    }

    #[test]
    fn test_footprint_tiles() {
        let table = KindTable::standard();
        let tiles = table
            .get(AgentKind::Barracks)
            .unwrap()
            .footprint_tiles(TilePos::new(4, 6));
        assert_eq!(
            tiles,
            vec![
                TilePos::new(4, 6),
                TilePos::new(5, 6),
                TilePos::new(4, 7),
                TilePos::new(5, 7)
            ]
        );
    }

    #[test]
    fn test_parse_override_with_defaults() {
        let ron = r"{
            HostileMelee: (
                faction: Hostile,
                max_health: 12,
                damage: 3,
                attack_range: 1.5,
                speed: Some(2.0),
                solid: true,
                autonomous: true,
            ),
        }";
        let overrides = KindTable::from_ron_str(ron).unwrap();
        let parsed = overrides.get(AgentKind::HostileMelee).unwrap();
        assert_eq!(parsed.max_health, 12);
        assert_eq!(parsed.attack_range, Fixed::from_num(1.5));
        assert_eq!(parsed.attack_cooldown, Fixed::ONE);
        assert_eq!(parsed.footprint, (1, 1));
        assert!(parsed.loot.is_empty());

        let mut table = KindTable::standard();
        table.merge(overrides);
        assert_eq!(table.get(AgentKind::HostileMelee).unwrap().max_health, 12);
        assert_eq!(table.get(AgentKind::Melee).unwrap().max_health, 60);
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = KindTable::from_ron_str("{ Melee: (nonsense) }").unwrap_err();
        assert!(matches!(err, SimError::DataParse { .. }));
    }
}
