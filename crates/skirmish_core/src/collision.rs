//! Collider registry and pairwise overlap resolution.
//!
//! Colliders are axis-aligned boxes in world space. An agent's tile-space
//! position maps to world space through a fixed tile size, and each box
//! adds its own offset from the tile center. Solid bodies that overlap are
//! pushed apart, one axis at a time and never onto impassable tiles.
//! Overlaps involving a trigger (vision or attack sensor, or a
//! non-solid structure body) are reported to both owners instead.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::agent::{AgentId, Faction};
use crate::grid::{tile_center_world, TilePos, WalkabilityMap};
use crate::math::{fixed_serde, signum, Fixed, Vec2Fixed};

/// Registry-assigned collider identifier, increasing with registration.
pub type ColliderId = u32;

/// Filter group for pairwise checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ColliderLayer {
    /// The agent's physical extent.
    Body,
    /// Sight sensor.
    Vision,
    /// Weapon reach sensor.
    Attack,
}

/// Whether overlaps are physically resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColliderKind {
    /// Pushed out of other solid bodies.
    Solid,
    /// Reports overlap only.
    Trigger,
}

/// Canonical order in which colliders are paired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PairOrdering {
    /// Registration order.
    Registration,
    /// By owning agent id, then registration order.
    #[default]
    AgentId,
}

/// One axis-aligned box owned by an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collider {
    /// Owning agent.
    pub owner: AgentId,
    /// Filter layer.
    pub layer: ColliderLayer,
    /// Solid or trigger.
    pub kind: ColliderKind,
    /// Owner's faction, carried as the collision tag.
    pub faction: Faction,
    /// Half width and half height in world units.
    pub half_extents: Vec2Fixed,
    /// World-space offset from the owner's tile center.
    pub offset: Vec2Fixed,
    /// World-space center, refreshed by [`ColliderRegistry::sync`].
    pub center: Vec2Fixed,
}

impl Collider {
    /// Body box of `size` tiles, centered on the owner's tile.
    #[must_use]
    pub fn body(owner: AgentId, faction: Faction, solid: bool, size: Fixed, tile_size: Fixed) -> Self {
        let half = size * tile_size / Fixed::from_num(2);
        Self {
            owner,
            layer: ColliderLayer::Body,
            kind: if solid {
                ColliderKind::Solid
            } else {
                ColliderKind::Trigger
            },
            faction,
            half_extents: Vec2Fixed::new(half, half),
            offset: Vec2Fixed::ZERO,
            center: Vec2Fixed::ZERO,
        }
    }

    /// Trigger body covering a `width` x `height` footprint anchored at the
    /// owner's tile.
    #[must_use]
    pub fn footprint(owner: AgentId, faction: Faction, footprint: (u32, u32), tile_size: Fixed) -> Self {
        let two = Fixed::from_num(2);
        let w = Fixed::from_num(footprint.0);
        let h = Fixed::from_num(footprint.1);
        Self {
            owner,
            layer: ColliderLayer::Body,
            kind: ColliderKind::Trigger,
            faction,
            half_extents: Vec2Fixed::new(w * tile_size / two, h * tile_size / two),
            offset: Vec2Fixed::new(
                (w - Fixed::ONE) * tile_size / two,
                (h - Fixed::ONE) * tile_size / two,
            ),
            center: Vec2Fixed::ZERO,
        }
    }

    /// Square sensor reaching `range` tiles from the owner's tile center.
    #[must_use]
    pub fn sensor(
        owner: AgentId,
        faction: Faction,
        layer: ColliderLayer,
        range: Fixed,
        tile_size: Fixed,
    ) -> Self {
        let half = range * tile_size;
        Self {
            owner,
            layer,
            kind: ColliderKind::Trigger,
            faction,
            half_extents: Vec2Fixed::new(half, half),
            offset: Vec2Fixed::ZERO,
            center: Vec2Fixed::ZERO,
        }
    }

    /// Penetration depth per axis, `None` unless the boxes strictly overlap.
    #[must_use]
    pub fn penetration(&self, other: &Self) -> Option<Vec2Fixed> {
        let dx = (other.center.x - self.center.x).abs();
        let dy = (other.center.y - self.center.y).abs();
        let pen_x = self.half_extents.x + other.half_extents.x - dx;
        let pen_y = self.half_extents.y + other.half_extents.y - dy;
        (pen_x > Fixed::ZERO && pen_y > Fixed::ZERO).then_some(Vec2Fixed::new(pen_x, pen_y))
    }
}

/// Which layer pairs are checked against each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerMatrix {
    pairs: Vec<(ColliderLayer, ColliderLayer)>,
}

impl LayerMatrix {
    /// Matrix from an explicit pair list. Order within a pair is irrelevant.
    #[must_use]
    pub fn new(pairs: Vec<(ColliderLayer, ColliderLayer)>) -> Self {
        Self { pairs }
    }

    /// Whether colliders on `a` and `b` interact.
    #[must_use]
    pub fn interacts(&self, a: ColliderLayer, b: ColliderLayer) -> bool {
        self.pairs
            .iter()
            .any(|&(x, y)| (x == a && y == b) || (x == b && y == a))
    }
}

impl Default for LayerMatrix {
    /// Bodies meet bodies and both kinds of sensor; sensors ignore sensors.
    fn default() -> Self {
        Self::new(vec![
            (ColliderLayer::Body, ColliderLayer::Body),
            (ColliderLayer::Body, ColliderLayer::Vision),
            (ColliderLayer::Body, ColliderLayer::Attack),
        ])
    }
}

/// Overlap report delivered to one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionNotice {
    /// Agent being told.
    pub receiver: AgentId,
    /// Receiver's collider.
    pub own_collider: ColliderId,
    /// Receiver's collider layer.
    pub own_layer: ColliderLayer,
    /// The other agent.
    pub other: AgentId,
    /// Other agent's collider.
    pub other_collider: ColliderId,
    /// Other collider's layer.
    pub other_layer: ColliderLayer,
    /// Other collider's faction tag.
    pub other_faction: Faction,
}

/// Read/write access to agent positions for solid resolution.
pub trait BodyPositions {
    /// Tile-space position of `agent`.
    fn body_position(&self, agent: AgentId) -> Option<Vec2Fixed>;
    /// Move `agent` to a new tile-space position.
    fn set_body_position(&mut self, agent: AgentId, position: Vec2Fixed);
}

/// Everything one `resolve_all` pass produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveReport {
    /// Trigger overlaps, two per overlapping pair.
    pub notices: Vec<CollisionNotice>,
    /// Agents whose position was pushed, in push order.
    pub displaced: Vec<AgentId>,
}

/// All registered colliders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColliderRegistry {
    colliders: BTreeMap<ColliderId, Collider>,
    next_id: ColliderId,
    layers: LayerMatrix,
    ordering: PairOrdering,
    #[serde(with = "fixed_serde")]
    tile_size: Fixed,
    #[serde(with = "fixed_serde")]
    push_strength: Fixed,
}

impl ColliderRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new(tile_size: Fixed, push_strength: Fixed, ordering: PairOrdering) -> Self {
        Self {
            colliders: BTreeMap::new(),
            next_id: 1,
            layers: LayerMatrix::default(),
            ordering,
            tile_size,
            push_strength,
        }
    }

    /// Replace the layer filter.
    #[must_use]
    pub fn with_layers(mut self, layers: LayerMatrix) -> Self {
        self.layers = layers;
        self
    }

    /// World units per tile.
    #[must_use]
    pub const fn tile_size(&self) -> Fixed {
        self.tile_size
    }

    /// Add a collider.
    pub fn register(&mut self, collider: Collider) -> ColliderId {
        let id = self.next_id;
        self.next_id += 1;
        self.colliders.insert(id, collider);
        id
    }

    /// Remove a collider.
    pub fn unregister(&mut self, id: ColliderId) -> Option<Collider> {
        self.colliders.remove(&id)
    }

    /// Remove every collider owned by `agent`. Returns how many.
    pub fn unregister_owner(&mut self, agent: AgentId) -> usize {
        let before = self.colliders.len();
        self.colliders.retain(|_, c| c.owner != agent);
        before - self.colliders.len()
    }

    /// Look up a collider.
    #[must_use]
    pub fn get(&self, id: ColliderId) -> Option<&Collider> {
        self.colliders.get(&id)
    }

    /// Number of registered colliders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.colliders.len()
    }

    /// Check if no colliders are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colliders.is_empty()
    }

    /// Move `agent`'s colliders to follow its tile-space position.
    pub fn sync(&mut self, agent: AgentId, position: Vec2Fixed) {
        let center = tile_center_world(position, self.tile_size);
        for collider in self.colliders.values_mut().filter(|c| c.owner == agent) {
            collider.center = center + collider.offset;
        }
    }

    fn pair_order(&self) -> Vec<ColliderId> {
        let mut ids: Vec<ColliderId> = self.colliders.keys().copied().collect();
        if self.ordering == PairOrdering::AgentId {
            ids.sort_by_key(|id| (self.colliders[id].owner, *id));
        }
        ids
    }

    /// Check every interacting pair once.
    ///
    /// Pairs are visited as `(i, j)` with `i < j` in [`PairOrdering`]; when
    /// both are solid, `j` is pushed away from `i` along the axis of least
    /// penetration. A push that would land on an impassable tile is
    /// dropped.
    pub fn resolve_all<B: BodyPositions>(
        &mut self,
        map: &WalkabilityMap,
        positions: &mut B,
    ) -> ResolveReport {
        let order = self.pair_order();
        let mut report = ResolveReport::default();

        for (i, &first_id) in order.iter().enumerate() {
            for &second_id in &order[i + 1..] {
                let (Some(&a), Some(&b)) = (self.colliders.get(&first_id), self.colliders.get(&second_id))
                else {
                    continue;
                };
                if a.owner == b.owner || !self.layers.interacts(a.layer, b.layer) {
                    continue;
                }
                let Some(penetration) = a.penetration(&b) else {
                    continue;
                };

                if a.kind == ColliderKind::Solid && b.kind == ColliderKind::Solid {
                    if self.push_apart(&a, &b, penetration, map, positions) {
                        report.displaced.push(b.owner);
                    }
                } else {
                    tracing::trace!(a = a.owner, b = b.owner, "trigger overlap");
                    report.notices.push(CollisionNotice {
                        receiver: a.owner,
                        own_collider: first_id,
                        own_layer: a.layer,
                        other: b.owner,
                        other_collider: second_id,
                        other_layer: b.layer,
                        other_faction: b.faction,
                    });
                    report.notices.push(CollisionNotice {
                        receiver: b.owner,
                        own_collider: second_id,
                        own_layer: b.layer,
                        other: a.owner,
                        other_collider: first_id,
                        other_layer: a.layer,
                        other_faction: a.faction,
                    });
                }
            }
        }

        report
    }

    /// Push `b` off `a`. Returns whether `b` moved.
    fn push_apart<B: BodyPositions>(
        &mut self,
        a: &Collider,
        b: &Collider,
        penetration: Vec2Fixed,
        map: &WalkabilityMap,
        positions: &mut B,
    ) -> bool {
        let away = |from: Fixed, to: Fixed| match signum(to - from) {
            0 => Fixed::ONE,
            s => Fixed::from_num(s),
        };
        let world_delta = if penetration.x <= penetration.y {
            Vec2Fixed::new(penetration.x * away(a.center.x, b.center.x), Fixed::ZERO)
        } else {
            Vec2Fixed::new(Fixed::ZERO, penetration.y * away(a.center.y, b.center.y))
        }
        .scale(self.push_strength);

        if world_delta == Vec2Fixed::ZERO {
            return false;
        }
        let Some(position) = positions.body_position(b.owner) else {
            return false;
        };

        let tile_delta = Vec2Fixed::new(
            world_delta.x / self.tile_size,
            world_delta.y / self.tile_size,
        );
        let moved = position + tile_delta;
        if !map.is_passable(TilePos::containing(moved)) {
            tracing::trace!(agent = b.owner, "push rolled back at wall");
            return false;
        }

        positions.set_body_position(b.owner, moved);
        for collider in self.colliders.values_mut().filter(|c| c.owner == b.owner) {
            collider.center = collider.center + world_delta;
        }
        true
    }
}
