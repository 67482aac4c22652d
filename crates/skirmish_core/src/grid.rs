//! Tile coordinates and the static walkability map.
//!
//! Agent positions are continuous tile-space coordinates: `(10.0, 4.0)` is
//! the top-left corner of tile `(10, 4)` and everything up to `(11.0, 5.0)`
//! belongs to it. The walkability map is the arena-style dense grid that
//! movement, collision resolution and structure placement consult.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::error::{Result, SimError};
use crate::math::{Fixed, Vec2Fixed};

/// Integer tile coordinate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct TilePos {
    /// Column.
    pub x: i32,
    /// Row (grows downward on screen).
    pub y: i32,
}

impl TilePos {
    /// Create a tile coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The tile that contains a continuous position.
    #[must_use]
    pub fn containing(position: Vec2Fixed) -> Self {
        Self::new(
            position.x.floor().to_num::<i32>(),
            position.y.floor().to_num::<i32>(),
        )
    }

    /// Continuous position of this tile's anchor corner.
    #[must_use]
    pub fn anchor(self) -> Vec2Fixed {
        Vec2Fixed::from_ints(self.x, self.y)
    }

    /// Tile shifted by an offset.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Chebyshev (king-move) distance.
    #[must_use]
    pub fn chebyshev(self, other: Self) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    /// Per-axis sign of the step from `self` toward `other`.
    #[must_use]
    pub fn step_toward(self, other: Self) -> (i32, i32) {
        ((other.x - self.x).signum(), (other.y - self.y).signum())
    }
}

impl fmt::Display for TilePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Direction offsets for 8-directional neighbourhoods, in a fixed order.
pub const NEIGHBOURS: [(i32, i32); 8] = [
    (1, 0),   // East
    (1, 1),   // Southeast
    (0, 1),   // South
    (-1, 1),  // Southwest
    (-1, 0),  // West
    (-1, -1), // Northwest
    (0, -1),  // North
    (1, -1),  // Northeast
];

/// One cell of the walkability map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CellType {
    /// Passable ground.
    #[default]
    Open,
    /// Impassable terrain.
    Blocked,
    /// Covered by a structure's footprint.
    Footprint(AgentId),
}

impl CellType {
    /// Whether a mobile agent may stand here.
    #[must_use]
    pub const fn is_passable(self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Dense, bounds-checked walkability grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkabilityMap {
    width: u32,
    height: u32,
    /// Row-major cell data.
    cells: Vec<CellType>,
}

impl WalkabilityMap {
    /// Create a map with every cell open.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(SimError::InvalidState(format!(
                "walkability map must be non-empty, got {width}x{height}"
            )));
        }
        let cell_count = (width as usize) * (height as usize);
        Ok(Self {
            width,
            height,
            cells: vec![CellType::Open; cell_count],
        })
    }

    /// Build a map from ASCII rows: `#` is blocked, anything else is open.
    ///
    /// All rows must have the same length.
    pub fn from_rows<S: AsRef<str>>(rows: &[S]) -> Result<Self> {
        let height = rows.len() as u32;
        let width = rows.first().map_or(0, |r| r.as_ref().chars().count()) as u32;
        let mut map = Self::new(width, height)?;
        for (y, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.chars().count() as u32 != width {
                return Err(SimError::DataParse {
                    what: "map rows".into(),
                    message: format!("row {y} has length {}, expected {width}", row.len()),
                });
            }
            for (x, ch) in row.chars().enumerate() {
                if ch == '#' {
                    map.set_blocked(TilePos::new(x as i32, y as i32), true);
                }
            }
        }
        Ok(map)
    }

    /// Grid width in tiles.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in tiles.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    fn index(&self, tile: TilePos) -> Option<usize> {
        if tile.x < 0 || tile.y < 0 {
            return None;
        }
        let (x, y) = (tile.x as u32, tile.y as u32);
        if x < self.width && y < self.height {
            Some((y as usize) * (self.width as usize) + (x as usize))
        } else {
            None
        }
    }

    /// Check if a tile is within bounds.
    #[must_use]
    pub fn in_bounds(&self, tile: TilePos) -> bool {
        self.index(tile).is_some()
    }

    /// Cell at a tile, `None` when out of bounds.
    #[must_use]
    pub fn cell(&self, tile: TilePos) -> Option<CellType> {
        self.index(tile).map(|i| self.cells[i])
    }

    /// Whether a tile is in bounds and open. Out-of-bounds tiles are walls.
    #[must_use]
    pub fn is_passable(&self, tile: TilePos) -> bool {
        self.cell(tile).is_some_and(CellType::is_passable)
    }

    /// Mark terrain blocked or open. Footprint cells are left alone.
    ///
    /// Returns `false` if the tile is out of bounds or owned by a structure.
    pub fn set_blocked(&mut self, tile: TilePos, blocked: bool) -> bool {
        let Some(index) = self.index(tile) else {
            return false;
        };
        match self.cells[index] {
            CellType::Footprint(_) => false,
            _ => {
                self.cells[index] = if blocked {
                    CellType::Blocked
                } else {
                    CellType::Open
                };
                true
            }
        }
    }

    /// Claim a structure footprint. All tiles must be open; nothing changes
    /// otherwise.
    pub fn claim_footprint(&mut self, owner: AgentId, tiles: &[TilePos]) -> bool {
        if !tiles.iter().all(|&t| self.is_passable(t)) {
            return false;
        }
        for &tile in tiles {
            if let Some(index) = self.index(tile) {
                self.cells[index] = CellType::Footprint(owner);
            }
        }
        true
    }

    /// Restore every cell claimed by `owner` to open. Returns how many.
    pub fn release_footprint(&mut self, owner: AgentId) -> usize {
        let mut released = 0;
        for cell in &mut self.cells {
            if *cell == CellType::Footprint(owner) {
                *cell = CellType::Open;
                released += 1;
            }
        }
        released
    }

    /// Nearest passable tile to `origin` by expanding square rings.
    ///
    /// `origin` itself counts when passable. Ring `r` is scanned clockwise
    /// from its top-left corner so ties always resolve the same way. Gives
    /// up after `max_radius` rings.
    #[must_use]
    pub fn nearest_passable(&self, origin: TilePos, max_radius: u32) -> Option<TilePos> {
        if self.is_passable(origin) {
            return Some(origin);
        }
        for r in 1..=(max_radius as i32) {
            let ring = (-r..r)
                .map(|i| origin.offset(i, -r))
                .chain((-r..r).map(|i| origin.offset(r, i)))
                .chain((-r..r).map(|i| origin.offset(-i, r)))
                .chain((-r..r).map(|i| origin.offset(-r, -i)));
            for tile in ring {
                if self.is_passable(tile) {
                    return Some(tile);
                }
            }
        }
        None
    }

    /// Converts a continuous position to its tile only when that tile is
    /// passable.
    #[must_use]
    pub fn passable_tile_at(&self, position: Vec2Fixed) -> Option<TilePos> {
        let tile = TilePos::containing(position);
        self.is_passable(tile).then_some(tile)
    }
}

/// World-space center of a tile for a given tile size.
#[must_use]
pub fn tile_center_world(position: Vec2Fixed, tile_size: Fixed) -> Vec2Fixed {
    let half = Fixed::from_num(0.5);
    Vec2Fixed::new(
        (position.x + half) * tile_size,
        (position.y + half) * tile_size,
    )
}
