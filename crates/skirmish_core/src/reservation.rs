//! Grid reservation table.
//!
//! A dense tile -> owner map that keeps two mobile agents from moving into
//! the same cell at once. Correctness rests on two rules rather than on
//! locking: a reservation is only granted when the tile is free (or already
//! ours), and a release is only honoured when it comes from the owner.

use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::grid::TilePos;

/// Dense, bounds-checked tile reservation table.
///
/// At most one agent id is recorded per tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationTable {
    width: u32,
    height: u32,
    owners: Vec<Option<AgentId>>,
}

impl ReservationTable {
    /// Create an empty table covering `width` x `height` tiles.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            owners: vec![None; (width as usize) * (height as usize)],
        }
    }

    #[inline]
    fn index(&self, tile: TilePos) -> Option<usize> {
        if tile.x < 0 || tile.y < 0 {
            return None;
        }
        let (x, y) = (tile.x as u32, tile.y as u32);
        (x < self.width && y < self.height).then(|| (y as usize) * (self.width as usize) + (x as usize))
    }

    /// Reserve `tile` for `agent`.
    ///
    /// Succeeds when the tile is free or already held by `agent`. Fails for
    /// tiles held by someone else and for out-of-bounds tiles.
    pub fn try_reserve(&mut self, tile: TilePos, agent: AgentId) -> bool {
        let Some(index) = self.index(tile) else {
            return false;
        };
        match self.owners[index] {
            None => {
                self.owners[index] = Some(agent);
                tracing::trace!(agent, %tile, "reserved");
                true
            }
            Some(owner) => owner == agent,
        }
    }

    /// Release `tile` if `agent` holds it.
    ///
    /// Returns whether an entry was cleared. Releasing someone else's tile
    /// is a no-op.
    pub fn release(&mut self, tile: TilePos, agent: AgentId) -> bool {
        let Some(index) = self.index(tile) else {
            return false;
        };
        if self.owners[index] == Some(agent) {
            self.owners[index] = None;
            tracing::trace!(agent, %tile, "released");
            true
        } else {
            false
        }
    }

    /// Current owner of `tile`, if any.
    #[must_use]
    pub fn owner_of(&self, tile: TilePos) -> Option<AgentId> {
        self.index(tile).and_then(|i| self.owners[i])
    }

    /// Every tile held by `agent`, in row-major order.
    #[must_use]
    pub fn tiles_held_by(&self, agent: AgentId) -> Vec<TilePos> {
        self.iter()
            .filter(|&(_, owner)| owner == agent)
            .map(|(tile, _)| tile)
            .collect()
    }

    /// Number of reserved tiles.
    #[must_use]
    pub fn reserved_count(&self) -> usize {
        self.owners.iter().filter(|o| o.is_some()).count()
    }

    /// Iterate over reserved tiles and their owners in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (TilePos, AgentId)> + '_ {
        let width = self.width as usize;
        self.owners.iter().enumerate().filter_map(move |(i, owner)| {
            owner.map(|o| (TilePos::new((i % width) as i32, (i / width) as i32), o))
        })
    }
}
