//! Combat arbiter: target bookkeeping and the attack cooldown.
//!
//! Collision notices feed two slots. The attack slot holds something inside
//! weapon reach and is re-derived every tick from the bodies the attack
//! sensor touched during that tick's collision pass: the current target is
//! kept while it stays in reach, otherwise the lowest id in reach takes
//! over. The chase slot holds the first body the vision sensor saw and is
//! kept until that agent dies.
//!
//! Each tick the arbiter turns those slots into a [`Verdict`] the
//! simulation acts on. Damage is never applied here; a [`Verdict::Strike`]
//! becomes a damage notification addressed to the target.

use serde::{Deserialize, Serialize};

use crate::agent::{AgentId, Faction};
use crate::behavior::Direction;
use crate::collision::{ColliderLayer, CollisionNotice};
use crate::grid::TilePos;
use crate::math::{fixed_serde, Fixed};
use crate::movement::PlayerOrder;

/// Resolves stored target ids against live agents.
pub trait TargetLookup {
    /// Tile of a live target. `None` once it is destroyed or gone.
    fn target_tile(&self, id: AgentId) -> Option<TilePos>;
}

/// Static facts about the agent doing the observing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observer {
    /// Observer's faction.
    pub faction: Faction,
    /// Harvesters leave resource nodes alone unless told otherwise.
    pub gatherer: bool,
}

/// Per-tick inputs to [`CombatArbiter::arbitrate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arbitration {
    /// Arbiter owner's tile.
    pub tile: TilePos,
    /// Seconds between strikes.
    pub cooldown: Fixed,
    /// Tick length.
    pub dt: Fixed,
    /// Acts without player orders.
    pub autonomous: bool,
    /// Player order in flight, if any.
    pub order: Option<PlayerOrder>,
    /// Where autonomous agents head when nothing else is going on.
    pub home: Option<TilePos>,
}

/// What the owner should do this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Deal damage now. Movement is suspended.
    Strike {
        /// Agent to damage.
        target: AgentId,
        /// Facing toward the target.
        facing: Direction,
    },
    /// Target in reach, cooling down. Movement is suspended.
    Engaged {
        /// Agent being fought.
        target: AgentId,
        /// Facing toward the target.
        facing: Direction,
    },
    /// Start a route toward a chase target's current tile.
    Pursue {
        /// Agent being chased.
        target: AgentId,
        /// Its tile when the chase began.
        tile: TilePos,
    },
    /// Start a route toward home.
    ReturnHome(TilePos),
    /// No combat concern; movement proceeds.
    Free,
}

/// Attack and chase slots plus the strike timer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatArbiter {
    attack_target: Option<AgentId>,
    #[serde(default)]
    in_reach: Vec<AgentId>,
    chase_target: Option<AgentId>,
    #[serde(with = "fixed_serde")]
    attack_timer: Fixed,
    chasing: bool,
    heading_home: bool,
}

impl CombatArbiter {
    /// Empty arbiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current attack target.
    #[must_use]
    pub const fn attack_target(&self) -> Option<AgentId> {
        self.attack_target
    }

    /// Current chase target.
    #[must_use]
    pub const fn chase_target(&self) -> Option<AgentId> {
        self.chase_target
    }

    /// Seconds accumulated toward the next strike.
    #[must_use]
    pub const fn attack_timer(&self) -> Fixed {
        self.attack_timer
    }

    /// Whether a route toward the chase target is in flight.
    #[must_use]
    pub const fn is_chasing(&self) -> bool {
        self.chasing
    }

    /// Whether a route toward home has been issued.
    #[must_use]
    pub const fn is_heading_home(&self) -> bool {
        self.heading_home
    }

    /// Bodies the attack sensor touched in the latest collision pass.
    #[must_use]
    pub fn in_reach(&self) -> &[AgentId] {
        &self.in_reach
    }

    /// Forget last pass's contacts. Called before notices are fed in.
    pub fn begin_pass(&mut self) {
        self.in_reach.clear();
    }

    /// Record a collision notice.
    ///
    /// Only sensor-versus-body overlaps against a targetable faction count.
    /// Attack contacts are collected for this tick's arbitration; the first
    /// body seen fills the chase slot. Returns whether anything was recorded.
    pub fn observe(&mut self, notice: &CollisionNotice, observer: Observer) -> bool {
        if notice.other_layer != ColliderLayer::Body || !observer.faction.targets(notice.other_faction) {
            return false;
        }

        match notice.own_layer {
            ColliderLayer::Attack => {
                let ordered = self.chase_target == Some(notice.other);
                if observer.gatherer && notice.other_faction == Faction::Neutral && !ordered {
                    return false;
                }
                if self.in_reach.contains(&notice.other) {
                    return false;
                }
                tracing::trace!(agent = notice.receiver, target = notice.other, "in reach");
                self.in_reach.push(notice.other);
                true
            }
            ColliderLayer::Vision if self.chase_target.is_none() => {
                tracing::trace!(agent = notice.receiver, target = notice.other, "chase target acquired");
                self.chase_target = Some(notice.other);
                true
            }
            _ => false,
        }
    }

    /// Decide this tick's action.
    pub fn arbitrate<L: TargetLookup>(&mut self, input: Arbitration, lookup: &L) -> Verdict {
        if self.attack_timer <= input.cooldown {
            self.attack_timer += input.dt;
        }
        if input.order == Some(PlayerOrder::Move) {
            self.attack_target = None;
            self.chase_target = None;
            self.chasing = false;
            self.heading_home = false;
            return Verdict::Free;
        }

        self.refresh_attack_target(input.order == Some(PlayerOrder::Chase));
        if let Some(target) = self.attack_target {
            match lookup.target_tile(target) {
                Some(target_tile) => {
                    let facing = Direction::toward(input.tile, target_tile).unwrap_or(Direction::South);
                    if self.attack_timer > input.cooldown {
                        self.attack_timer = Fixed::ZERO;
                        return Verdict::Strike { target, facing };
                    }
                    return Verdict::Engaged { target, facing };
                }
                None => self.drop_attack_target(),
            }
        }

        let chase_tile = self.chase_target.and_then(|target| {
            let tile = lookup.target_tile(target);
            if tile.is_none() {
                self.chase_target = None;
            }
            tile.map(|tile| (target, tile))
        });

        if let Some((target, tile)) = chase_tile {
            if !self.chasing && (input.autonomous || input.order == Some(PlayerOrder::Chase)) {
                self.chasing = true;
                self.heading_home = false;
                return Verdict::Pursue { target, tile };
            }
            return Verdict::Free;
        }

        if input.autonomous && input.order.is_none() && !self.chasing && !self.heading_home {
            if let Some(home) = input.home {
                self.heading_home = true;
                return Verdict::ReturnHome(home);
            }
        }

        Verdict::Free
    }

    /// Keep the current attack target while it is still in reach, otherwise
    /// take the lowest id in reach. Under a chase order only the chase
    /// target qualifies.
    fn refresh_attack_target(&mut self, chase_only: bool) {
        let chase = self.chase_target;
        let eligible = |id: &AgentId| !chase_only || chase == Some(*id);
        let keep = self
            .attack_target
            .filter(|target| self.in_reach.contains(target) && eligible(target));
        let next = keep.or_else(|| self.in_reach.iter().copied().filter(eligible).min());
        if next.is_none() {
            self.drop_attack_target();
        } else if next != self.attack_target {
            tracing::trace!(target = next, "attack target acquired");
            self.attack_target = next;
        }
    }

    fn drop_attack_target(&mut self) {
        if self.attack_target.take().is_some() {
            self.attack_timer = Fixed::ZERO;
        }
    }

    /// Point the chase slot at `target` and start a fresh pursuit.
    pub fn set_chase_target(&mut self, target: AgentId) {
        self.chase_target = Some(target);
        self.chasing = false;
    }

    /// The route the arbiter asked for has ended or been dropped.
    pub fn on_route_finished(&mut self) {
        self.chasing = false;
    }

    /// Forget both targets.
    pub fn clear_targets(&mut self) {
        self.attack_target = None;
        self.in_reach.clear();
        self.chase_target = None;
        self.chasing = false;
    }
}
