//! Core simulation loop.
//!
//! The simulation runs at a fixed tick length and advances every agent in
//! one cooperative pass. Agents never touch each other directly: damage,
//! spawns and payouts travel through the [`NotificationBus`] and land at the
//! start of the next tick.
//!
//! # Determinism
//!
//! - No floating-point math (uses fixed-point via [`Fixed`])
//! - No system randomness or wall-clock time
//! - Consistent iteration order (sorted agent ids, ordered collider pairs)
//! - Same inputs always produce the same [`Simulation::state_hash`]
//!
//! # Example
//!
//! ```
//! use skirmish_core::prelude::*;
//!
//! let map = WalkabilityMap::new(16, 16).unwrap();
//! let mut sim = Simulation::new(map, SimConfig::default()).unwrap();
//!
//! let unit = sim.spawn(AgentKind::Melee, TilePos::new(2, 2)).unwrap();
//! sim.order_move(unit, TilePos::new(6, 2)).unwrap();
//!
//! for _ in 0..200 {
//!     sim.tick();
//! }
//! assert_eq!(sim.agent(unit).unwrap().tile(), TilePos::new(6, 2));
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::agent::{Agent, AgentId, AgentKind, AgentRecord, AgentStats, Faction, Health, Role, StructureRole};
use crate::behavior::BehaviorState;
use crate::collision::{Collider, ColliderLayer, ColliderRegistry, CollisionNotice};
use crate::combat::{Arbitration, CombatArbiter, Observer, Verdict};
use crate::data::{KindTable, SimConfig};
use crate::directory::AgentDirectory;
use crate::economy::{Economies, FactionEconomy, Stat};
use crate::error::{Result, SimError};
use crate::grid::{CellType, TilePos, WalkabilityMap};
use crate::math::Fixed;
use crate::movement::{MovementContext, PathFollower, PlayerOrder, StepOutcome};
use crate::notification::{Notification, NotificationBus, Outcome};
use crate::pathfinding::{GridPathfinder, Pathfinder};
use crate::production::{BuildQueue, ProductionError, ProgressHandle, QueueTick};
use crate::reservation::ReservationTable;

/// Ring cap when looking for a free tile next to a structure or target.
const APPROACH_SEARCH_RADIUS: u32 = 8;

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickEvents {
    /// Notifications delivered at the start of the tick, in order.
    pub notifications: Vec<Notification>,
    /// Agents created this tick.
    pub spawned: Vec<AgentId>,
    /// Agents that entered the destroyed state this tick.
    pub destroyed: Vec<AgentId>,
    /// Agents removed from the directory this tick.
    pub removed: Vec<AgentId>,
    /// Trigger overlaps reported by collision resolution.
    pub notices: Vec<CollisionNotice>,
    /// Units that waited on a reserved tile.
    pub stalls: Vec<AgentId>,
}

/// The unit simulation.
///
/// Owns every agent together with the shared grid state (walkability,
/// reservations, colliders) and the per-faction economies.
///
/// # Tick order
///
/// 1. Deliver pending notifications, including ones published meanwhile
/// 2. Sync colliders, resolve overlaps, feed trigger notices to arbiters
/// 3. Per agent, by ascending id: build queue, combat, path advance, state
/// 4. Count down removal timers
/// 5. Re-sync colliders for the next tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Simulation<P = GridPathfinder> {
    tick: u64,
    config: SimConfig,
    kinds: KindTable,
    agents: AgentDirectory,
    walkability: WalkabilityMap,
    reservations: ReservationTable,
    colliders: ColliderRegistry,
    pathfinder: P,
    bus: NotificationBus,
    economies: Economies,
    home_base: Option<AgentId>,
    outcomes: BTreeMap<Faction, Outcome>,
}

impl Simulation<GridPathfinder> {
    /// Create a simulation with the standard kind table and grid A*.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn new(map: WalkabilityMap, config: SimConfig) -> Result<Self> {
        Self::with_kinds(map, config, KindTable::standard())
    }

    /// Create a simulation with a custom kind table.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn with_kinds(map: WalkabilityMap, config: SimConfig, kinds: KindTable) -> Result<Self> {
        Self::with_pathfinder(map, config, kinds, GridPathfinder::new())
    }
}

impl<P: Pathfinder> Simulation<P> {
    /// Create a simulation around any pathfinder.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn with_pathfinder(
        map: WalkabilityMap,
        config: SimConfig,
        kinds: KindTable,
        pathfinder: P,
    ) -> Result<Self> {
        config.validate()?;
        let mut economies = Economies::default();
        for &delta in &config.starting_stats {
            economies.apply(delta);
        }
        Ok(Self {
            tick: 0,
            reservations: ReservationTable::new(map.width(), map.height()),
            colliders: ColliderRegistry::new(config.tile_size, config.push_strength, config.pair_ordering),
            walkability: map,
            config,
            kinds,
            agents: AgentDirectory::new(),
            pathfinder,
            bus: NotificationBus::new(),
            economies,
            home_base: None,
            outcomes: BTreeMap::new(),
        })
    }

    /// Ticks completed so far.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Simulation tunables.
    #[must_use]
    pub const fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Capability table.
    #[must_use]
    pub const fn kinds(&self) -> &KindTable {
        &self.kinds
    }

    /// All agents.
    #[must_use]
    pub const fn agents(&self) -> &AgentDirectory {
        &self.agents
    }

    /// One agent, live or awaiting removal.
    #[must_use]
    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(id)
    }

    /// Static walkability.
    #[must_use]
    pub const fn walkability(&self) -> &WalkabilityMap {
        &self.walkability
    }

    /// Tile reservations.
    #[must_use]
    pub const fn reservations(&self) -> &ReservationTable {
        &self.reservations
    }

    /// Collider registry.
    #[must_use]
    pub const fn colliders(&self) -> &ColliderRegistry {
        &self.colliders
    }

    /// Route oracle.
    #[must_use]
    pub const fn pathfinder(&self) -> &P {
        &self.pathfinder
    }

    /// Counters for every faction.
    #[must_use]
    pub const fn economies(&self) -> &Economies {
        &self.economies
    }

    /// Counters for one faction.
    #[must_use]
    pub fn economy(&self, faction: Faction) -> FactionEconomy {
        self.economies.get(faction)
    }

    /// Structure autonomous agents fall back to.
    #[must_use]
    pub const fn home_base(&self) -> Option<AgentId> {
        self.home_base
    }

    /// Recorded result for a faction.
    #[must_use]
    pub fn outcome(&self, faction: Faction) -> Option<Outcome> {
        self.outcomes.get(&faction).copied()
    }

    /// Notifications waiting for the next tick.
    #[must_use]
    pub const fn pending_notifications(&self) -> &NotificationBus {
        &self.bus
    }

    /// Place a new agent. Units stand on `tile`; structures anchor their
    /// footprint's top-left corner there.
    ///
    /// # Errors
    ///
    /// Returns an error if the kind has no profile or the tiles are not open.
    pub fn spawn(&mut self, kind: AgentKind, tile: TilePos) -> Result<AgentId> {
        let profile = self.kinds.get(kind)?;
        let invalid = SimError::InvalidPlacement { kind, tile };

        let footprint = if profile.is_mobile() {
            if !self.walkability.is_passable(tile) {
                return Err(invalid);
            }
            Vec::new()
        } else {
            let tiles = profile.footprint_tiles(tile);
            if !tiles.iter().all(|&t| self.walkability.cell(t) == Some(CellType::Open)) {
                return Err(invalid);
            }
            tiles
        };

        let id = self.agents.allocate_id();
        let faction = profile.faction;
        let tile_size = self.config.tile_size;

        let role = if profile.is_mobile() {
            Role::Unit(PathFollower::new())
        } else {
            self.walkability.claim_footprint(id, &footprint);
            Role::Structure(StructureRole {
                footprint,
                queue: profile.queue.map(BuildQueue::new),
            })
        };

        let mut colliders = Vec::new();
        let body = if profile.is_mobile() {
            Collider::body(id, faction, profile.solid, profile.body_size, tile_size)
        } else {
            Collider::footprint(id, faction, profile.footprint, tile_size)
        };
        colliders.push(self.colliders.register(body));
        if profile.can_attack() {
            let attack = Collider::sensor(id, faction, ColliderLayer::Attack, profile.attack_range, tile_size);
            colliders.push(self.colliders.register(attack));
        }
        if let Some(range) = profile.vision_range {
            let vision = Collider::sensor(id, faction, ColliderLayer::Vision, range, tile_size);
            colliders.push(self.colliders.register(vision));
        }

        if profile.defeat_on_destroy && self.home_base.is_none() {
            self.home_base = Some(id);
        }

        let agent = Agent {
            id,
            kind,
            faction,
            health: Health::new(profile.max_health),
            level: 1,
            position: tile.anchor(),
            stats: AgentStats::from(profile),
            state: BehaviorState::Idle,
            role,
            combat: profile.can_attack().then(CombatArbiter::new),
            colliders,
            selected: false,
            removal_timer: None,
        };
        self.colliders.sync(id, agent.position);
        self.agents.insert(agent);

        tracing::debug!(agent = id, ?kind, %tile, "spawned");
        Ok(id)
    }

    /// Walk to `goal`. Cancels the current route and targets first.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent is missing, destroyed or immobile.
    pub fn order_move(&mut self, id: AgentId, goal: TilePos) -> Result<()> {
        let agent = self.agents.live_mut(id)?;
        let kind = agent.kind;
        let Role::Unit(follower) = &mut agent.role else {
            return Err(SimError::Unsupported {
                agent: id,
                kind,
                action: "move",
            });
        };
        follower.request_path(id, goal, &mut self.reservations);
        follower.set_order(Some(PlayerOrder::Move));
        if let Some(combat) = agent.combat.as_mut() {
            combat.clear_targets();
        }
        self.pathfinder.delete_path(id);
        Ok(())
    }

    /// Chase `target`. Gatherers may only chase resource nodes; everyone
    /// else only what their faction can attack.
    ///
    /// # Errors
    ///
    /// Returns an error if either agent is missing or destroyed, or the
    /// chaser cannot go after this target.
    pub fn order_chase(&mut self, id: AgentId, target: AgentId) -> Result<()> {
        let target_faction = self.agents.live(target)?.faction;
        let agent = self.agents.live(id)?;
        let kind = agent.kind;
        let gatherer = self.kinds.get(kind)?.gatherer;
        let allowed = if gatherer {
            target_faction == Faction::Neutral
        } else {
            agent.faction.targets(target_faction)
        };
        let unsupported = SimError::Unsupported {
            agent: id,
            kind,
            action: "chase that target",
        };
        if !allowed || agent.follower().is_none() || agent.combat.is_none() {
            return Err(unsupported);
        }

        let agent = self.agents.live_mut(id)?;
        if let Role::Unit(follower) = &mut agent.role {
            follower.cancel(id, &mut self.reservations);
            follower.set_order(Some(PlayerOrder::Chase));
        }
        if let Some(combat) = agent.combat.as_mut() {
            combat.clear_targets();
            combat.set_chase_target(target);
        }
        self.pathfinder.delete_path(id);
        Ok(())
    }

    /// Stop moving and forget targets.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent is missing or destroyed.
    pub fn order_stop(&mut self, id: AgentId) -> Result<()> {
        let agent = self.agents.live_mut(id)?;
        if let Role::Unit(follower) = &mut agent.role {
            follower.cancel(id, &mut self.reservations);
        }
        if let Some(combat) = agent.combat.as_mut() {
            combat.clear_targets();
        }
        agent.state.transition(BehaviorState::Idle);
        self.pathfinder.delete_path(id);
        Ok(())
    }

    /// Queue `kind` at a producing structure. The unit appears on the
    /// nearest free tile diagonally below the footprint.
    ///
    /// # Errors
    ///
    /// Returns an error if the structure cannot produce `kind`, has no free
    /// tile to spawn on, or its admission-gated queue cannot be paid for.
    pub fn enqueue_production(&mut self, structure: AgentId, kind: AgentKind) -> Result<ProgressHandle> {
        let agent = self.agents.live(structure)?;
        let (faction, anchor, producer_kind) = (agent.faction, agent.tile(), agent.kind);
        let producer = self.kinds.get(producer_kind)?;
        if agent.structure().and_then(|s| s.queue.as_ref()).is_none() {
            return Err(ProductionError::NoQueue.into());
        }
        if !producer.produces.contains(&kind) {
            return Err(ProductionError::CannotProduce(kind).into());
        }
        let footprint = producer.footprint;
        let unit = self.kinds.get(kind)?;
        let (build_time, cost) = (unit.build_time, unit.cost);

        let spawn_tile = self
            .approach_tile(anchor, footprint)
            .ok_or(SimError::InvalidPlacement { kind, tile: anchor })?;

        let economy = self.economies.get_mut(faction);
        let agent = self.agents.get_mut(structure).ok_or(SimError::AgentNotFound(structure))?;
        let Role::Structure(StructureRole { queue: Some(queue), .. }) = &mut agent.role else {
            return Err(ProductionError::NoQueue.into());
        };
        let handle = queue.enqueue(kind, spawn_tile, build_time, cost, economy)?;
        tracing::debug!(structure, ?kind, handle = handle.0, "production queued");
        Ok(handle)
    }

    /// Drop a queued order. Returns whether it was found.
    ///
    /// # Errors
    ///
    /// Returns an error if the structure is missing, destroyed or has no
    /// queue.
    pub fn cancel_production(&mut self, structure: AgentId, handle: ProgressHandle) -> Result<bool> {
        let faction = self.agents.live(structure)?.faction;
        let economy = self.economies.get_mut(faction);
        let agent = self.agents.get_mut(structure).ok_or(SimError::AgentNotFound(structure))?;
        let Role::Structure(StructureRole { queue: Some(queue), .. }) = &mut agent.role else {
            return Err(ProductionError::NoQueue.into());
        };
        Ok(queue.cancel(handle, economy).is_some())
    }

    /// Raise an agent one level, paying in mob drop.
    ///
    /// Returns `Ok(false)` at max level.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent is missing or destroyed, or the
    /// faction cannot pay.
    pub fn upgrade(&mut self, id: AgentId) -> Result<bool> {
        let agent = self.agents.live(id)?;
        let (faction, level) = (agent.faction, agent.level);
        let profile = self.kinds.get(agent.kind)?;
        if level >= profile.max_level {
            return Ok(false);
        }
        let (cost, bonus) = (profile.upgrade_cost, profile.upgrade_health);

        let economy = self.economies.get_mut(faction);
        if !economy.spend(Stat::MobDrop, cost) {
            return Err(ProductionError::InsufficientResources {
                required: cost,
                available: economy.mob_drop,
            }
            .into());
        }

        let agent = self.agents.live_mut(id)?;
        agent.level += 1;
        agent.health.raise_max(bonus);
        tracing::debug!(agent = id, level = agent.level, "upgraded");
        Ok(true)
    }

    /// Publish a notification for the next tick.
    pub fn notify(&mut self, notification: Notification) {
        self.bus.publish(notification);
    }

    /// Queue a selection toggle.
    pub fn select(&mut self, id: AgentId, selected: bool) {
        let notification = if selected {
            Notification::Selected { agent: id }
        } else {
            Notification::Deselected { agent: id }
        };
        self.bus.publish(notification);
    }

    /// Advance the simulation by one tick.
    pub fn tick(&mut self) -> TickEvents {
        let mut events = TickEvents::default();
        let dt = self.config.tick_seconds;

        // 1. Notifications
        while let Some(notification) = self.bus.pop() {
            self.deliver(&notification, &mut events);
            events.notifications.push(notification);
        }

        // 2. Collision
        self.sync_colliders();
        let report = self.colliders.resolve_all(&self.walkability, &mut self.agents);
        for combat in self.agents.iter_mut().filter_map(|a| a.combat.as_mut()) {
            combat.begin_pass();
        }
        for notice in &report.notices {
            self.observe(notice);
        }
        let mut displaced = report.displaced;
        displaced.sort_unstable();
        displaced.dedup();
        for id in displaced {
            self.repath_if_displaced(id);
        }
        events.notices = report.notices;

        // 3. Agents
        let home = self.home_tile();
        for id in self.agents.sorted_ids() {
            self.update_agent(id, home, dt, &mut events);
        }

        // 4. Removal
        self.tick_removals(dt, &mut events);

        // 5. Colliders for next tick
        self.sync_colliders();

        self.tick += 1;
        tracing::debug!(tick = self.tick, hash = self.state_hash(), "tick complete");
        events
    }

    fn deliver(&mut self, notification: &Notification, events: &mut TickEvents) {
        match notification {
            Notification::Damage { target, amount, source, .. } => {
                let Some(agent) = self.agents.get_mut(*target) else {
                    return;
                };
                if agent.is_destroyed() {
                    return;
                }
                let dealt = agent.health.apply_damage(*amount);
                tracing::trace!(target, dealt, ?source, remaining = agent.health.current, "damage");
                if agent.health.is_dead() {
                    self.kill(*target, events);
                }
            }
            Notification::SpawnUnit { kind, tile, faction } => {
                let tile = self
                    .walkability
                    .nearest_passable(*tile, APPROACH_SEARCH_RADIUS)
                    .unwrap_or(*tile);
                match self.spawn(*kind, tile) {
                    Ok(id) => events.spawned.push(id),
                    Err(error) => tracing::warn!(?kind, ?faction, %error, "spawn dropped"),
                }
            }
            Notification::StatDelta(delta) => {
                self.economies.apply(*delta);
            }
            Notification::DeathPayout { deltas, .. } => {
                for &delta in deltas {
                    self.economies.apply(delta);
                }
            }
            Notification::Destroyed { .. } => {}
            Notification::GameOutcome { faction, outcome } => {
                tracing::info!(?faction, ?outcome, tick = self.tick, "game over");
                self.outcomes.insert(*faction, *outcome);
            }
            Notification::Selected { agent } | Notification::Deselected { agent } => {
                let selected = matches!(notification, Notification::Selected { .. });
                if let Some(agent) = self.agents.get_mut(*agent).filter(|a| !a.is_destroyed()) {
                    agent.selected = selected;
                }
            }
            Notification::Repath { agent } => {
                if let Some(agent) = self.agents.get_mut(*agent).filter(|a| !a.is_destroyed()) {
                    let id = agent.id;
                    if let Role::Unit(follower) = &mut agent.role {
                        follower.repath(id, &mut self.reservations);
                    }
                }
            }
        }
    }

    /// Enter the terminal state and tear down everything the agent holds.
    fn kill(&mut self, id: AgentId, events: &mut TickEvents) {
        let Some(agent) = self.agents.get_mut(id) else {
            return;
        };
        if !agent.state.transition(BehaviorState::Destroyed) {
            return;
        }
        agent.health.set_current(0);
        if let Role::Unit(follower) = &mut agent.role {
            follower.cancel(id, &mut self.reservations);
        }
        if let Some(combat) = agent.combat.as_mut() {
            combat.clear_targets();
        }
        agent.colliders.clear();
        agent.selected = false;
        agent.removal_timer = Some(self.config.removal_delay);
        let (kind, faction) = (agent.kind, agent.faction);

        self.pathfinder.delete_path(id);
        self.colliders.unregister_owner(id);
        self.walkability.release_footprint(id);
        if self.home_base == Some(id) {
            self.home_base = None;
        }

        let (loot, defeat) = self
            .kinds
            .get(kind)
            .map(|p| (p.loot.clone(), p.defeat_on_destroy))
            .unwrap_or_default();
        self.bus.publish(Notification::DeathPayout {
            agent: id,
            kind,
            deltas: loot,
        });
        self.bus.publish(Notification::Destroyed { agent: id, kind, faction });
        if defeat {
            self.bus.publish(Notification::GameOutcome {
                faction,
                outcome: Outcome::Defeat,
            });
        }

        tracing::debug!(agent = id, ?kind, "destroyed");
        events.destroyed.push(id);
    }

    fn sync_colliders(&mut self) {
        for agent in self.agents.iter().filter(|a| !a.is_destroyed()) {
            self.colliders.sync(agent.id, agent.position);
        }
    }

    fn observe(&mut self, notice: &CollisionNotice) {
        let Some(agent) = self.agents.get_mut(notice.receiver) else {
            return;
        };
        if agent.is_destroyed() {
            return;
        }
        let observer = Observer {
            faction: agent.faction,
            gatherer: self.kinds.get(agent.kind).is_ok_and(|p| p.gatherer),
        };
        if let Some(combat) = agent.combat.as_mut() {
            combat.observe(notice, observer);
        }
    }

    /// Repath a unit pushed more than a tile away from where it was headed.
    fn repath_if_displaced(&mut self, id: AgentId) {
        let Some(agent) = self.agents.get_mut(id) else {
            return;
        };
        let tile = agent.tile();
        if let Role::Unit(follower) = &mut agent.role {
            if follower.committed().is_some_and(|c| c.chebyshev(tile) > 1) {
                follower.repath(id, &mut self.reservations);
            }
        }
    }

    fn update_agent(&mut self, id: AgentId, home: Option<TilePos>, dt: Fixed, events: &mut TickEvents) {
        if self.agents.is_destroyed(id) {
            return;
        }
        self.advance_queue(id, dt);
        let suspended = self.arbitrate(id, home, dt);
        if !suspended {
            self.advance_movement(id, dt, events);
        }
    }

    fn advance_queue(&mut self, id: AgentId, dt: Fixed) {
        let Some(agent) = self.agents.get_mut(id) else {
            return;
        };
        let faction = agent.faction;
        let Role::Structure(StructureRole { queue: Some(queue), .. }) = &mut agent.role else {
            return;
        };
        match queue.tick(dt, self.economies.get_mut(faction)) {
            QueueTick::Completed(order) => {
                tracing::debug!(structure = id, kind = ?order.kind, "production complete");
                self.bus.publish(Notification::SpawnUnit {
                    kind: order.kind,
                    tile: order.spawn_tile,
                    faction,
                });
            }
            QueueTick::Stalled(handle) => {
                tracing::trace!(structure = id, handle = handle.0, "production waiting for funds");
            }
            QueueTick::Advanced { .. } | QueueTick::Empty => {}
        }
    }

    /// Run the combat arbiter. Returns whether movement is suspended.
    fn arbitrate(&mut self, id: AgentId, home: Option<TilePos>, dt: Fixed) -> bool {
        let Some(agent) = self.agents.get_mut(id) else {
            return false;
        };
        let Some(mut arbiter) = agent.combat.take() else {
            return false;
        };
        let autonomous = self.kinds.get(agent.kind).is_ok_and(|p| p.autonomous);
        let input = Arbitration {
            tile: agent.tile(),
            cooldown: agent.stats.attack_cooldown,
            dt,
            autonomous,
            order: agent.follower().and_then(PathFollower::order),
            home: home.filter(|_| autonomous),
        };
        let (kind, damage) = (agent.kind, agent.stats.damage);

        let verdict = arbiter.arbitrate(input, &self.agents);

        let Some(agent) = self.agents.get_mut(id) else {
            return false;
        };
        agent.combat = Some(arbiter);

        match verdict {
            Verdict::Strike { target, facing } => {
                self.bus.publish(Notification::Damage {
                    target,
                    amount: damage,
                    source: Some(id),
                    source_kind: Some(kind),
                });
                agent.state.transition(BehaviorState::Attacking(facing));
                true
            }
            Verdict::Engaged { facing, .. } => {
                agent.state.transition(BehaviorState::Attacking(facing));
                true
            }
            Verdict::Pursue { tile, .. } | Verdict::ReturnHome(tile) => {
                let goal = self.walkability.nearest_passable(tile, APPROACH_SEARCH_RADIUS);
                match (&mut agent.role, goal) {
                    (Role::Unit(follower), Some(goal)) => {
                        follower.request_path(id, goal, &mut self.reservations);
                    }
                    _ => {
                        if let Some(combat) = agent.combat.as_mut() {
                            combat.on_route_finished();
                        }
                    }
                }
                false
            }
            Verdict::Free => false,
        }
    }

    fn advance_movement(&mut self, id: AgentId, dt: Fixed, events: &mut TickEvents) {
        let Some(agent) = self.agents.get_mut(id) else {
            return;
        };
        let next = match (&mut agent.role, agent.stats.speed) {
            (Role::Unit(follower), Some(speed)) => {
                let mut ctx = MovementContext {
                    walkability: &self.walkability,
                    reservations: &mut self.reservations,
                    pathfinder: &mut self.pathfinder,
                    nudge_speed: self.config.nudge_speed,
                    nudge_radius: self.config.nudge_search_radius,
                };
                match follower.advance(id, &mut agent.position, speed, dt, &mut ctx) {
                    StepOutcome::Moved(direction) | StepOutcome::Nudged(direction) => {
                        BehaviorState::Moving(direction)
                    }
                    StepOutcome::Stalled => {
                        events.stalls.push(id);
                        BehaviorState::Idle
                    }
                    StepOutcome::Arrived | StepOutcome::Unreachable => {
                        if let Some(combat) = agent.combat.as_mut() {
                            combat.on_route_finished();
                        }
                        BehaviorState::Idle
                    }
                    StepOutcome::Idle | StepOutcome::Blocked => BehaviorState::Idle,
                }
            }
            _ => BehaviorState::Idle,
        };
        agent.state.transition(next);
    }

    fn tick_removals(&mut self, dt: Fixed, events: &mut TickEvents) {
        let mut expired = Vec::new();
        for agent in self.agents.iter_mut() {
            if let Some(timer) = agent.removal_timer.as_mut() {
                *timer -= dt;
                if *timer <= Fixed::ZERO {
                    expired.push(agent.id);
                }
            }
        }
        for id in expired {
            self.agents.remove(id);
            tracing::debug!(agent = id, "removed");
            events.removed.push(id);
        }
    }

    /// Free tile diagonally past a footprint's bottom-right corner.
    fn approach_tile(&self, anchor: TilePos, footprint: (u32, u32)) -> Option<TilePos> {
        let corner = anchor.offset(footprint.0 as i32, footprint.1 as i32);
        self.walkability.nearest_passable(corner, APPROACH_SEARCH_RADIUS)
    }

    fn home_tile(&self) -> Option<TilePos> {
        let base = self.agents.get(self.home_base?)?;
        if base.is_destroyed() {
            return None;
        }
        let footprint = self.kinds.get(base.kind).ok()?.footprint;
        self.approach_tile(base.tile(), footprint)
    }

    /// Hash of everything that must match between two identical runs.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.tick.hash(&mut hasher);

        self.agents.len().hash(&mut hasher);
        for agent in self.agents.iter() {
            agent.id.hash(&mut hasher);
            agent.position.x.to_bits().hash(&mut hasher);
            agent.position.y.to_bits().hash(&mut hasher);
            agent.health.hash(&mut hasher);
            agent.state.hash(&mut hasher);
            agent.level.hash(&mut hasher);
        }

        for (tile, owner) in self.reservations.iter() {
            tile.hash(&mut hasher);
            owner.hash(&mut hasher);
        }

        hasher.finish()
    }

    /// Persisted records of every live agent as a RON document.
    ///
    /// # Errors
    ///
    /// Returns an error if RON encoding fails.
    pub fn export_records(&self) -> Result<String> {
        let records: BTreeMap<AgentId, AgentRecord> = self
            .agents
            .iter()
            .filter(|a| !a.is_destroyed())
            .map(|a| (a.id, a.save()))
            .collect();
        ron::ser::to_string_pretty(&records, ron::ser::PrettyConfig::default())
            .map_err(|e| SimError::Snapshot(format!("failed to encode records: {e}")))
    }

    /// Load records produced by [`export_records`](Self::export_records).
    /// Returns how many agents were updated. An agent loaded at zero health
    /// dies on the spot, with the usual payout delivered next tick.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or names an agent that
    /// is missing, destroyed or of another kind.
    pub fn import_records(&mut self, ron: &str) -> Result<usize> {
        let records: BTreeMap<AgentId, AgentRecord> = ron::from_str(ron).map_err(|e| SimError::DataParse {
            what: "agent records".into(),
            message: e.to_string(),
        })?;
        for (&id, record) in &records {
            let agent = self.agents.get_mut(id).ok_or(SimError::AgentNotFound(id))?;
            agent.load(record)?;
            if agent.health.is_dead() {
                self.kill(id, &mut TickEvents::default());
            }
        }
        Ok(records.len())
    }
}

impl<P: Pathfinder + Serialize + DeserializeOwned> Simulation<P> {
    /// Encode the whole simulation.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| SimError::Snapshot(format!("failed to encode simulation: {e}")))
    }

    /// Decode a simulation produced by [`snapshot`](Self::snapshot).
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes do not decode.
    pub fn restore(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(|e| SimError::Snapshot(format!("failed to decode simulation: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::economy::StatDelta;

    fn config() -> SimConfig {
        SimConfig {
            tick_seconds: Fixed::from_num(0.25),
            ..SimConfig::default()
        }
    }

    fn open_sim(size: u32) -> Simulation {
        Simulation::new(WalkabilityMap::new(size, size).unwrap(), config()).unwrap()
    }

    fn damage(target: AgentId, amount: u32) -> Notification {
        Notification::Damage {
            target,
            amount,
            source: None,
            source_kind: None,
        }
    }

    #[test]
    fn test_simulation_new() {
        let sim = open_sim(8);
        assert_eq!(sim.current_tick(), 0);
        assert!(sim.agents().is_empty());
        assert_eq!(sim.economy(Faction::Friendly).resources, 100);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad = SimConfig {
            tick_seconds: Fixed::ZERO,
            ..SimConfig::default()
        };
        assert!(Simulation::new(WalkabilityMap::new(4, 4).unwrap(), bad).is_err());
    }

    #[test]
    fn test_spawn_structure_claims_footprint() {
        let mut sim = open_sim(10);
        let base = sim.spawn(AgentKind::BaseCenter, TilePos::new(2, 2)).unwrap();
        for tile in [(2, 2), (3, 2), (2, 3), (3, 3)] {
            assert_eq!(
                sim.walkability().cell(TilePos::new(tile.0, tile.1)),
                Some(CellType::Footprint(base))
            );
        }
        assert_eq!(sim.home_base(), Some(base));

        let overlap = sim.spawn(AgentKind::Barracks, TilePos::new(3, 3));
        assert!(matches!(overlap, Err(SimError::InvalidPlacement { .. })));
        let on_base = sim.spawn(AgentKind::Melee, TilePos::new(2, 3));
        assert!(matches!(on_base, Err(SimError::InvalidPlacement { .. })));
    }

    #[test]
    fn test_ids_never_reused() {
        let mut sim = open_sim(8);
        let a = sim.spawn(AgentKind::Melee, TilePos::new(1, 1)).unwrap();
        sim.notify(damage(a, 1000));
        for _ in 0..20 {
            sim.tick();
        }
        assert!(sim.agent(a).is_none());
        let b = sim.spawn(AgentKind::Melee, TilePos::new(1, 1)).unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_move_order_arrives_and_releases() {
        let mut sim = open_sim(16);
        let unit = sim.spawn(AgentKind::Melee, TilePos::new(2, 2)).unwrap();
        sim.order_move(unit, TilePos::new(7, 4)).unwrap();

        let mut moved = false;
        for _ in 0..60 {
            sim.tick();
            moved |= matches!(sim.agent(unit).unwrap().state, BehaviorState::Moving(_));
        }
        let agent = sim.agent(unit).unwrap();
        assert!(moved);
        assert_eq!(agent.tile(), TilePos::new(7, 4));
        assert_eq!(agent.state, BehaviorState::Idle);
        assert!(!agent.follower().unwrap().has_order());
        assert_eq!(sim.reservations().reserved_count(), 0);
    }

    #[test]
    fn test_orders_to_bad_agents_fail() {
        let mut sim = open_sim(8);
        let tower = sim.spawn(AgentKind::Tower, TilePos::new(1, 1)).unwrap();
        assert!(matches!(sim.order_move(99, TilePos::new(0, 0)), Err(SimError::AgentNotFound(99))));
        assert!(matches!(
            sim.order_move(tower, TilePos::new(0, 0)),
            Err(SimError::Unsupported { action: "move", .. })
        ));
    }

    #[test]
    fn test_chase_rules() {
        let mut sim = open_sim(12);
        let gatherer = sim.spawn(AgentKind::Gatherer, TilePos::new(1, 1)).unwrap();
        let melee = sim.spawn(AgentKind::Melee, TilePos::new(2, 1)).unwrap();
        let node = sim.spawn(AgentKind::ResourceNode, TilePos::new(8, 8)).unwrap();
        let hostile = sim.spawn(AgentKind::HostileMelee, TilePos::new(10, 1)).unwrap();

        assert!(sim.order_chase(gatherer, hostile).is_err());
        assert!(sim.order_chase(melee, gatherer).is_err());
        sim.order_chase(gatherer, node).unwrap();
        sim.order_chase(melee, hostile).unwrap();
        assert_eq!(sim.agent(gatherer).unwrap().chase_target(), Some(node));
        assert!(sim.agent(melee).unwrap().follower().unwrap().has_order());
    }

    #[test]
    fn test_death_is_final_and_pays_once() {
        let mut sim = open_sim(8);
        let hostile = sim.spawn(AgentKind::HostileRanged, TilePos::new(4, 4)).unwrap();
        sim.notify(damage(hostile, 25));
        sim.notify(damage(hostile, 25));
        sim.notify(damage(hostile, 25));

        let events = sim.tick();
        assert_eq!(events.destroyed, vec![hostile]);
        let agent = sim.agent(hostile).unwrap();
        assert_eq!(agent.health.current, 0);
        assert_eq!(agent.state, BehaviorState::Destroyed);
        assert!(sim.colliders().is_empty());

        let payouts = events
            .notifications
            .iter()
            .filter(|n| matches!(n, Notification::DeathPayout { .. }))
            .count();
        assert_eq!(payouts, 1);
        let economy = sim.economy(Faction::Friendly);
        assert_eq!(economy.mob_drop, 10);
        assert_eq!(economy.units_killed, 1);

        // Removal after the delay (2 s at 0.25 s per tick).
        let mut removed_at = None;
        for tick in 0..10 {
            if sim.tick().removed.contains(&hostile) {
                removed_at = Some(tick);
                break;
            }
        }
        assert_eq!(removed_at, Some(6));
    }

    #[test]
    fn test_base_loss_is_defeat() {
        let mut sim = open_sim(10);
        let base = sim.spawn(AgentKind::BaseCenter, TilePos::new(3, 3)).unwrap();
        sim.notify(damage(base, 5000));
        sim.tick();
        assert_eq!(sim.outcome(Faction::Friendly), Some(Outcome::Defeat));
        assert_eq!(sim.home_base(), None);
        assert!(sim.walkability().is_passable(TilePos::new(4, 4)));
    }

    #[test]
    fn test_upgrade_costs_mob_drop() {
        let mut sim = open_sim(10);
        let tower = sim.spawn(AgentKind::Tower, TilePos::new(3, 3)).unwrap();
        assert!(matches!(
            sim.upgrade(tower),
            Err(SimError::Production(ProductionError::InsufficientResources { required: 25, .. }))
        ));

        sim.notify(Notification::StatDelta(StatDelta::new(Faction::Friendly, Stat::MobDrop, 200)));
        sim.tick();
        assert!(sim.upgrade(tower).unwrap());
        let agent = sim.agent(tower).unwrap();
        assert_eq!(agent.level, 2);
        assert_eq!(agent.health.max, 350);
        assert_eq!(sim.economy(Faction::Friendly).mob_drop, 175);

        for _ in 0..3 {
            assert!(sim.upgrade(tower).unwrap());
        }
        assert!(!sim.upgrade(tower).unwrap());
        assert_eq!(sim.agent(tower).unwrap().level, 5);
    }

    #[test]
    fn test_production_spawns_next_to_structure() {
        let mut sim = open_sim(12);
        let base = sim.spawn(AgentKind::BaseCenter, TilePos::new(2, 2)).unwrap();
        assert!(matches!(
            sim.enqueue_production(base, AgentKind::Heavy),
            Err(SimError::Production(ProductionError::CannotProduce(AgentKind::Heavy)))
        ));
        sim.enqueue_production(base, AgentKind::Gatherer).unwrap();

        let mut spawned = Vec::new();
        for _ in 0..20 {
            spawned.extend(sim.tick().spawned);
        }
        assert_eq!(spawned.len(), 1);
        let gatherer = sim.agent(spawned[0]).unwrap();
        assert_eq!(gatherer.kind, AgentKind::Gatherer);
        assert_eq!(gatherer.tile(), TilePos::new(4, 4));
        assert_eq!(sim.economy(Faction::Friendly).resources, 80);
    }

    #[test]
    fn test_selection_ignored_when_destroyed() {
        let mut sim = open_sim(8);
        let unit = sim.spawn(AgentKind::Melee, TilePos::new(1, 1)).unwrap();
        sim.select(unit, true);
        sim.tick();
        assert!(sim.agent(unit).unwrap().selected);

        sim.notify(damage(unit, 999));
        sim.select(unit, true);
        sim.tick();
        assert!(!sim.agent(unit).unwrap().selected);
    }

    #[test]
    fn test_in_range_sorted_by_distance_then_id() {
        let mut sim = open_sim(12);
        let far = sim.spawn(AgentKind::Melee, TilePos::new(5, 0)).unwrap();
        let near_b = sim.spawn(AgentKind::Melee, TilePos::new(0, 2)).unwrap();
        let near_a = sim.spawn(AgentKind::Melee, TilePos::new(2, 0)).unwrap();
        sim.spawn(AgentKind::Melee, TilePos::new(9, 9)).unwrap();

        let hits = sim.agents().in_range(TilePos::new(0, 0).anchor(), Fixed::from_num(5));
        assert_eq!(hits, vec![near_b, near_a, far]);
    }

    #[test]
    fn test_hostile_heads_for_base() {
        let mut sim = open_sim(16);
        let base = sim.spawn(AgentKind::BaseCenter, TilePos::new(2, 2)).unwrap();
        let hostile = sim.spawn(AgentKind::HostileHeavy, TilePos::new(14, 14)).unwrap();
        sim.tick();
        let agent = sim.agent(hostile).unwrap();
        assert!(agent.combat.as_ref().unwrap().is_heading_home());
        assert_eq!(agent.follower().unwrap().goal(), Some(TilePos::new(4, 4)));
        assert!(sim.agent(base).is_some());
    }

    #[test]
    fn test_snapshot_restore_continues_identically() {
        let mut sim = open_sim(16);
        sim.spawn(AgentKind::BaseCenter, TilePos::new(1, 1)).unwrap();
        sim.spawn(AgentKind::HostileMelee, TilePos::new(12, 12)).unwrap();
        let unit = sim.spawn(AgentKind::Ranged, TilePos::new(5, 5)).unwrap();
        sim.order_move(unit, TilePos::new(10, 3)).unwrap();
        for _ in 0..5 {
            sim.tick();
        }

        let bytes = sim.snapshot().unwrap();
        let mut restored = Simulation::<GridPathfinder>::restore(&bytes).unwrap();
        assert_eq!(restored.state_hash(), sim.state_hash());
        for _ in 0..30 {
            sim.tick();
            restored.tick();
            assert_eq!(restored.state_hash(), sim.state_hash());
        }
        assert!(Simulation::<GridPathfinder>::restore(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_records_round_trip_health() {
        let mut sim = open_sim(8);
        let unit = sim.spawn(AgentKind::Heavy, TilePos::new(2, 2)).unwrap();
        sim.notify(damage(unit, 40));
        sim.tick();
        let doc = sim.export_records().unwrap();

        let mut fresh = open_sim(8);
        let same = fresh.spawn(AgentKind::Heavy, TilePos::new(2, 2)).unwrap();
        assert_eq!(same, unit);
        assert_eq!(fresh.import_records(&doc).unwrap(), 1);
        assert_eq!(fresh.agent(same).unwrap().health.current, 110);

        let mut other = open_sim(8);
        other.spawn(AgentKind::Melee, TilePos::new(2, 2)).unwrap();
        assert!(other.import_records(&doc).is_err());
        assert!(other.import_records("not ron").is_err());
    }

    #[test]
    fn test_zero_health_record_kills() {
        let mut sim = open_sim(8);
        let unit = sim.spawn(AgentKind::Melee, TilePos::new(2, 2)).unwrap();
        sim.order_move(unit, TilePos::new(6, 2)).unwrap();
        sim.tick();
        assert!(!sim.reservations().tiles_held_by(unit).is_empty());

        let doc = format!("{{{unit}: (kind: Melee, current_health: 0)}}");
        assert_eq!(sim.import_records(&doc).unwrap(), 1);
        let agent = sim.agent(unit).unwrap();
        assert_eq!(agent.state, BehaviorState::Destroyed);
        assert!(sim.reservations().tiles_held_by(unit).is_empty());

        let events = sim.tick();
        let payouts = events
            .notifications
            .iter()
            .filter(|n| matches!(n, Notification::DeathPayout { agent, .. } if *agent == unit))
            .count();
        assert_eq!(payouts, 1);
        assert_eq!(sim.economy(Faction::Friendly).units_lost, 1);
        assert!(sim.import_records(&doc).is_err());
    }
}
