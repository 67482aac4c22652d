//! Structure build queues.
//!
//! Each producing structure owns a FIFO of orders. Two gating variants
//! exist:
//!
//! - [`QueueGating::Admission`]: the cost is checked and paid at enqueue
//!   time; once accepted an order always finishes.
//! - [`QueueGating::Progress`]: enqueue always succeeds; every tick the head
//!   order only advances while its cost is affordable, and the cost is paid
//!   when it completes. Progress freezes while funds are short and resumes
//!   once they recover.
//!
//! Cost is always drawn from [`Stat::Resources`].

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::AgentKind;
use crate::economy::{FactionEconomy, Stat};
use crate::grid::TilePos;
use crate::math::{fixed_serde, Fixed};

/// How a queue gates production on resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueGating {
    /// Validate and pay at enqueue.
    Admission,
    /// Re-check the head order every tick; pay on completion.
    Progress,
}

/// Handle a presentation layer can use to track one order's progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProgressHandle(pub u32);

/// Errors that can occur during production operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProductionError {
    /// Cannot afford the unit cost.
    #[error("Insufficient resources: need {required}, have {available}")]
    InsufficientResources {
        /// Amount required.
        required: u32,
        /// Amount available.
        available: i64,
    },
    /// The structure cannot produce this kind.
    #[error("Structure cannot produce {0:?}")]
    CannotProduce(AgentKind),
    /// The agent has no build queue.
    #[error("Agent has no build queue")]
    NoQueue,
}

/// One pending production order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOrder {
    /// Kind to spawn.
    pub kind: AgentKind,
    /// Where the new agent should appear.
    pub spawn_tile: TilePos,
    /// Cost in resources.
    pub cost: u32,
    /// Total build time in seconds.
    #[serde(with = "fixed_serde")]
    pub total: Fixed,
    /// Remaining build time in seconds.
    #[serde(with = "fixed_serde")]
    pub remaining: Fixed,
    /// Progress-bar handle.
    pub handle: ProgressHandle,
}

impl BuildOrder {
    /// Completion fraction in `[0, 1]`.
    #[must_use]
    pub fn progress(&self) -> Fixed {
        if self.total <= Fixed::ZERO {
            return Fixed::ONE;
        }
        ((self.total - self.remaining) / self.total).clamp(Fixed::ZERO, Fixed::ONE)
    }

    /// Whether the build timer has run out.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.remaining <= Fixed::ZERO
    }
}

/// Outcome of advancing a queue by one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueTick {
    /// Nothing queued.
    Empty,
    /// Head order advanced.
    Advanced {
        /// Head order's handle.
        handle: ProgressHandle,
        /// Head order's completion fraction.
        progress: Fixed,
    },
    /// Head order frozen for lack of funds.
    Stalled(ProgressHandle),
    /// Head order finished and was popped.
    Completed(BuildOrder),
}

/// FIFO of pending production orders for one structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildQueue {
    gating: QueueGating,
    orders: VecDeque<BuildOrder>,
    next_handle: u32,
}

impl BuildQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new(gating: QueueGating) -> Self {
        Self {
            gating,
            orders: VecDeque::new(),
            next_handle: 1,
        }
    }

    /// The gating variant.
    #[must_use]
    pub const fn gating(&self) -> QueueGating {
        self.gating
    }

    /// Check if the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Number of queued orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// The order currently in production.
    #[must_use]
    pub fn current(&self) -> Option<&BuildOrder> {
        self.orders.front()
    }

    /// All orders, head first.
    pub fn orders(&self) -> impl Iterator<Item = &BuildOrder> {
        self.orders.iter()
    }

    /// Queue an order.
    ///
    /// Admission-gated queues charge `cost` here and refuse the order when
    /// the faction cannot pay. Progress-gated queues always accept.
    pub fn enqueue(
        &mut self,
        kind: AgentKind,
        spawn_tile: TilePos,
        build_time: Fixed,
        cost: u32,
        economy: &mut FactionEconomy,
    ) -> Result<ProgressHandle, ProductionError> {
        if self.gating == QueueGating::Admission && !economy.spend(Stat::Resources, cost) {
            return Err(ProductionError::InsufficientResources {
                required: cost,
                available: economy.resources,
            });
        }

        let handle = ProgressHandle(self.next_handle);
        self.next_handle += 1;
        self.orders.push_back(BuildOrder {
            kind,
            spawn_tile,
            cost,
            total: build_time,
            remaining: build_time,
            handle,
        });
        Ok(handle)
    }

    /// Advance the head order by `dt` seconds.
    pub fn tick(&mut self, dt: Fixed, economy: &mut FactionEconomy) -> QueueTick {
        let gating = self.gating;
        let Some(head) = self.orders.front_mut() else {
            return QueueTick::Empty;
        };

        if gating == QueueGating::Progress && !economy.can_afford(Stat::Resources, head.cost) {
            return QueueTick::Stalled(head.handle);
        }

        head.remaining -= dt;
        if !head.is_complete() {
            return QueueTick::Advanced {
                handle: head.handle,
                progress: head.progress(),
            };
        }

        if gating == QueueGating::Progress {
            economy.spend(Stat::Resources, head.cost);
        }
        match self.orders.pop_front() {
            Some(done) => QueueTick::Completed(done),
            None => QueueTick::Empty,
        }
    }

    /// Remove an order. Admission-gated orders are refunded.
    pub fn cancel(
        &mut self,
        handle: ProgressHandle,
        economy: &mut FactionEconomy,
    ) -> Option<BuildOrder> {
        let index = self.orders.iter().position(|o| o.handle == handle)?;
        let order = self.orders.remove(index)?;
        if self.gating == QueueGating::Admission {
            economy.apply(Stat::Resources, i64::from(order.cost));
        }
        Some(order)
    }
}
