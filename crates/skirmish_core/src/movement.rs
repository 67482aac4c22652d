//! Path-follow controller for mobile agents.
//!
//! A follower walks a route one tile at a time. Before stepping toward the
//! next tile it must hold that tile's reservation; a tile held by someone
//! else means either a detour through an equally good neighbour or a stall
//! until the next tick. Reservations are released as soon as the tile is
//! reached, so a follower holds at most the tile it is moving into.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::behavior::Direction;
use crate::grid::{TilePos, WalkabilityMap};
use crate::math::{signum, Fixed, Vec2Fixed};
use crate::pathfinding::Pathfinder;
use crate::reservation::ReservationTable;

/// Where a follower is in its route lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FollowPhase {
    /// No goal.
    #[default]
    Idle,
    /// Goal set; route is fetched on the next advance.
    PathRequested,
    /// Walking the stored route.
    Advancing,
}

/// What one call to [`PathFollower::advance`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepOutcome {
    /// No translation this tick.
    Idle,
    /// Next tile is held by another agent and no detour exists.
    Stalled,
    /// Translated toward the committed tile.
    Moved(Direction),
    /// Translation would have entered an impassable tile and was reverted.
    Blocked,
    /// Reached the last tile of the route.
    Arrived,
    /// Steering off an impassable tile.
    Nudged(Direction),
    /// The pathfinder had no route; the goal was dropped.
    Unreachable,
}

/// Shared world state a follower reads and mutates while advancing.
pub struct MovementContext<'a, P: Pathfinder> {
    /// Static walkability.
    pub walkability: &'a WalkabilityMap,
    /// Tile reservations.
    pub reservations: &'a mut ReservationTable,
    /// Route oracle.
    pub pathfinder: &'a mut P,
    /// Tiles per second while escaping an impassable tile.
    pub nudge_speed: Fixed,
    /// Ring cap for the escape search.
    pub nudge_radius: u32,
}

/// Player order a route belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerOrder {
    /// Walk to a tile. Engagement is suspended until arrival.
    Move,
    /// Go after one target and fight it when in reach.
    Chase,
}

/// Per-unit route state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathFollower {
    phase: FollowPhase,
    goal: Option<TilePos>,
    path: VecDeque<TilePos>,
    committed: Option<TilePos>,
    visited: Vec<TilePos>,
    order: Option<PlayerOrder>,
    nudge: Option<TilePos>,
}

impl PathFollower {
    /// Idle follower.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> FollowPhase {
        self.phase
    }

    /// Current goal.
    #[must_use]
    pub const fn goal(&self) -> Option<TilePos> {
        self.goal
    }

    /// Tile currently reserved and being moved into.
    #[must_use]
    pub const fn committed(&self) -> Option<TilePos> {
        self.committed
    }

    /// Remaining route, head first.
    #[must_use]
    pub fn path(&self) -> &VecDeque<TilePos> {
        &self.path
    }

    /// Reserved tiles not yet released.
    #[must_use]
    pub fn visited(&self) -> &[TilePos] {
        &self.visited
    }

    /// Player order in flight, cleared on arrival or cancel.
    #[must_use]
    pub const fn order(&self) -> Option<PlayerOrder> {
        self.order
    }

    /// Whether any player order is in flight.
    #[must_use]
    pub const fn has_order(&self) -> bool {
        self.order.is_some()
    }

    /// Mark or clear the player order.
    pub fn set_order(&mut self, order: Option<PlayerOrder>) {
        self.order = order;
    }

    /// Whether a goal is pending or being walked.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.phase != FollowPhase::Idle
    }

    /// Set a new goal.
    ///
    /// Reservations from the previous route are released now; the route
    /// itself is fetched on the next [`advance`](Self::advance).
    pub fn request_path(&mut self, agent: AgentId, goal: TilePos, reservations: &mut ReservationTable) {
        self.release_all(agent, reservations);
        self.path.clear();
        self.goal = Some(goal);
        self.phase = FollowPhase::PathRequested;
        tracing::debug!(agent, %goal, "path requested");
    }

    /// Drop the current route and fetch a new one to the same goal.
    ///
    /// Does nothing unless a route is being walked.
    pub fn repath(&mut self, agent: AgentId, reservations: &mut ReservationTable) -> bool {
        if self.phase != FollowPhase::Advancing {
            return false;
        }
        let Some(goal) = self.goal else {
            return false;
        };
        tracing::debug!(agent, %goal, "repath");
        self.request_path(agent, goal, reservations);
        true
    }

    /// Stop moving and release every reservation.
    pub fn cancel(&mut self, agent: AgentId, reservations: &mut ReservationTable) {
        self.release_all(agent, reservations);
        self.path.clear();
        self.goal = None;
        self.order = None;
        self.phase = FollowPhase::Idle;
    }

    fn release_all(&mut self, agent: AgentId, reservations: &mut ReservationTable) {
        for tile in self.visited.drain(..) {
            reservations.release(tile, agent);
        }
        self.committed = None;
    }

    /// Advance one tick.
    pub fn advance<P: Pathfinder>(
        &mut self,
        agent: AgentId,
        position: &mut Vec2Fixed,
        speed: Fixed,
        dt: Fixed,
        ctx: &mut MovementContext<'_, P>,
    ) -> StepOutcome {
        let current = TilePos::containing(*position);

        if !ctx.walkability.is_passable(current) {
            return self.nudge_out(current, position, dt, ctx);
        }
        self.nudge = None;

        match self.phase {
            FollowPhase::Idle => return StepOutcome::Idle,
            FollowPhase::PathRequested => {
                if let Some(outcome) = self.fetch_route(agent, current, ctx) {
                    return outcome;
                }
            }
            FollowPhase::Advancing => {}
        }

        let target = match self.committed {
            Some(tile) => tile,
            None => match self.commit_next(agent, current, ctx) {
                Some(tile) => tile,
                None if self.path.is_empty() => {
                    self.cancel(agent, ctx.reservations);
                    return StepOutcome::Arrived;
                }
                None => {
                    tracing::debug!(agent, tile = %current, "stalled on reserved tile");
                    return StepOutcome::Stalled;
                }
            },
        };

        let anchor = target.anchor();
        let dx = signum(anchor.x - position.x);
        let dy = signum(anchor.y - position.y);
        let step = speed * dt;
        let moved = Vec2Fixed::new(
            approach(position.x, anchor.x, dx, step),
            approach(position.y, anchor.y, dy, step),
        );
        if !ctx.walkability.is_passable(TilePos::containing(moved)) {
            return StepOutcome::Blocked;
        }
        *position = moved;

        if reached(*position, anchor, dx, dy) {
            self.path.pop_front();
            ctx.reservations.release(target, agent);
            self.visited.retain(|&t| t != target);
            self.committed = None;
            if self.path.is_empty() {
                self.cancel(agent, ctx.reservations);
                return StepOutcome::Arrived;
            }
        }

        Direction::from_signs(dx, dy).map_or(StepOutcome::Idle, StepOutcome::Moved)
    }

    /// Ask the pathfinder for a route. `Some` ends this tick's advance.
    fn fetch_route<P: Pathfinder>(
        &mut self,
        agent: AgentId,
        current: TilePos,
        ctx: &mut MovementContext<'_, P>,
    ) -> Option<StepOutcome> {
        let Some(goal) = self.goal else {
            self.phase = FollowPhase::Idle;
            return Some(StepOutcome::Idle);
        };
        let Some(route) = ctx.pathfinder.create_path(ctx.walkability, current, goal, agent) else {
            tracing::debug!(agent, %goal, "goal unreachable");
            self.cancel(agent, ctx.reservations);
            return Some(StepOutcome::Unreachable);
        };

        self.path = route.into();
        if self.path.front() == Some(&current) {
            self.path.pop_front();
        }
        if self.path.is_empty() {
            self.cancel(agent, ctx.reservations);
            return Some(StepOutcome::Arrived);
        }
        self.phase = FollowPhase::Advancing;
        None
    }

    /// Reserve the route head, or a detour next to it.
    fn commit_next<P: Pathfinder>(
        &mut self,
        agent: AgentId,
        current: TilePos,
        ctx: &mut MovementContext<'_, P>,
    ) -> Option<TilePos> {
        let candidate = *self.path.front()?;
        let tile = match ctx.reservations.owner_of(candidate) {
            Some(owner) if owner != agent => {
                let detour = ctx.pathfinder.check_equal_neighbours(
                    ctx.walkability,
                    ctx.reservations,
                    current,
                    candidate,
                )?;
                tracing::trace!(agent, blocked = %candidate, %detour, "detour");
                detour
            }
            _ => candidate,
        };

        if !ctx.reservations.try_reserve(tile, agent) {
            return None;
        }
        if tile != candidate {
            self.splice_detour(agent, tile, ctx);
        }
        if !self.visited.contains(&tile) {
            self.visited.push(tile);
        }
        self.committed = Some(tile);
        Some(tile)
    }

    /// Put `detour` at the route head. If the rest of the route is no
    /// longer one step away, reroute from the detour so every step lands on
    /// the tile reserved for it.
    fn splice_detour<P: Pathfinder>(&mut self, agent: AgentId, detour: TilePos, ctx: &mut MovementContext<'_, P>) {
        let rejoins = self.path.get(1).map_or(true, |next| next.chebyshev(detour) <= 1);
        if rejoins {
            if let Some(head) = self.path.front_mut() {
                *head = detour;
            }
            return;
        }

        let reroute = self
            .goal
            .and_then(|goal| ctx.pathfinder.create_path(ctx.walkability, detour, goal, agent));
        match reroute {
            Some(route) => {
                self.path = route.into();
                if self.path.front() == Some(&detour) {
                    self.path.pop_front();
                }
                self.path.push_front(detour);
            }
            // Keep the blocked tile next so the route stays connected.
            None => self.path.push_front(detour),
        }
        tracing::debug!(agent, %detour, "rerouted after detour");
    }

    fn nudge_out<P: Pathfinder>(
        &mut self,
        current: TilePos,
        position: &mut Vec2Fixed,
        dt: Fixed,
        ctx: &MovementContext<'_, P>,
    ) -> StepOutcome {
        let target = match self.nudge {
            Some(tile) if ctx.walkability.is_passable(tile) => tile,
            _ => match ctx.walkability.nearest_passable(current, ctx.nudge_radius) {
                Some(tile) => tile,
                None => return StepOutcome::Blocked,
            },
        };
        self.nudge = Some(target);

        let anchor = target.anchor();
        let dx = signum(anchor.x - position.x);
        let dy = signum(anchor.y - position.y);
        let step = ctx.nudge_speed * dt;
        position.x = approach(position.x, anchor.x, dx, step);
        position.y = approach(position.y, anchor.y, dy, step);

        Direction::from_signs(dx, dy).map_or(StepOutcome::Idle, StepOutcome::Nudged)
    }
}

/// Move `from` by `step` in direction `sign`, never past `to`.
fn approach(from: Fixed, to: Fixed, sign: i32, step: Fixed) -> Fixed {
    match sign {
        1 => (from + step).min(to).max(from),
        -1 => (from - step).max(to).min(from),
        _ => from,
    }
}

/// Reached-or-passed test along the axes being travelled.
fn reached(position: Vec2Fixed, target: Vec2Fixed, dx: i32, dy: i32) -> bool {
    let axis = |pos: Fixed, target: Fixed, sign: i32| match sign {
        1 => pos >= target,
        -1 => pos <= target,
        _ => true,
    };
    axis(position.x, target.x, dx) && axis(position.y, target.y, dy)
}
