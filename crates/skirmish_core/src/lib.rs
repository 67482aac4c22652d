//! # Skirmish Core
//!
//! Deterministic tile-grid unit simulation.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No system randomness
//! - No floating-point math (uses fixed-point)
//!
//! Agents move on a tile grid, claim tiles through a shared reservation
//! table before stepping onto them, bump into each other through a collider
//! registry, pick targets from sensor overlaps, and talk to each other only
//! through queued notifications.
//!
//! ## Crate Structure
//!
//! - [`simulation`] - Core simulation loop
//! - [`reservation`] - Tile reservation table
//! - [`collision`] - Collider registry and overlap resolution
//! - [`movement`] - Path-follow controller
//! - [`combat`] - Target selection and attack cooldown
//! - [`behavior`] - Behaviour state machine
//! - [`production`] - Structure build queues
//! - [`data`] - Kind table and simulation config
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod agent;
pub mod behavior;
pub mod collision;
pub mod combat;
pub mod data;
pub mod directory;
pub mod economy;
pub mod error;
pub mod grid;
pub mod math;
pub mod movement;
pub mod notification;
pub mod pathfinding;
pub mod production;
pub mod reservation;
pub mod simulation;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::agent::{Agent, AgentId, AgentKind, AgentRecord, Faction, Health, Role};
    pub use crate::behavior::{BehaviorState, Direction};
    pub use crate::collision::{ColliderLayer, CollisionNotice, PairOrdering};
    pub use crate::data::{KindProfile, KindTable, SimConfig};
    pub use crate::directory::AgentDirectory;
    pub use crate::economy::{FactionEconomy, Stat, StatDelta};
    pub use crate::error::{Result, SimError};
    pub use crate::grid::{TilePos, WalkabilityMap};
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::movement::{PathFollower, PlayerOrder};
    pub use crate::notification::{Notification, Outcome};
    pub use crate::pathfinding::{GridPathfinder, Pathfinder};
    pub use crate::production::{ProductionError, ProgressHandle, QueueGating};
    pub use crate::reservation::ReservationTable;
    pub use crate::simulation::{Simulation, TickEvents};
}
