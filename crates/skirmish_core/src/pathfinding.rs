//! Pathfinder service and the default grid A* implementation.
//!
//! The simulation treats pathfinding as a best-effort oracle behind the
//! [`Pathfinder`] trait. "No route" is an ordinary answer, never an error:
//! the asking agent simply does not move.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap};

use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::grid::{TilePos, WalkabilityMap, NEIGHBOURS};
use crate::reservation::ReservationTable;

/// Route oracle consulted by the path-follow controller.
pub trait Pathfinder {
    /// Route from `start` to `goal` as a tile sequence excluding `start`.
    ///
    /// `None` or an empty route means no movement.
    fn create_path(
        &mut self,
        map: &WalkabilityMap,
        start: TilePos,
        goal: TilePos,
        requester: AgentId,
    ) -> Option<Vec<TilePos>>;

    /// A free tile that can stand in for `blocked` as the next step from
    /// `from`.
    fn check_equal_neighbours(
        &self,
        map: &WalkabilityMap,
        reservations: &ReservationTable,
        from: TilePos,
        blocked: TilePos,
    ) -> Option<TilePos>;

    /// Forget any route kept for `requester`.
    fn delete_path(&mut self, requester: AgentId);

    /// Whether a body may stand on `tile`.
    fn valid_tile(&self, map: &WalkabilityMap, tile: TilePos) -> bool {
        map.is_passable(tile)
    }
}

/// A node in the A* open set priority queue.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct AStarNode {
    tile: TilePos,
    f_score: u32,
    /// Tie-breaker for determinism: lower coordinates first.
    tie_breaker: u64,
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap, so compare reversed for min-heap behaviour.
        match other.f_score.cmp(&self.f_score) {
            Ordering::Equal => other.tie_breaker.cmp(&self.tie_breaker),
            ord => ord,
        }
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[inline]
fn tie_breaker(tile: TilePos) -> u64 {
    (u64::from(tile.y as u32) << 32) | u64::from(tile.x as u32)
}

/// Diagonal steps may not cut a blocked corner.
#[inline]
fn is_step_valid(map: &WalkabilityMap, from: TilePos, dx: i32, dy: i32) -> bool {
    if dx != 0 && dy != 0 {
        map.is_passable(from.offset(dx, 0)) && map.is_passable(from.offset(0, dy))
    } else {
        true
    }
}

/// 8-directional A* over the walkability map.
///
/// Uniform step cost with a Chebyshev heuristic. Keeps the last route per
/// requester until [`Pathfinder::delete_path`] is called.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridPathfinder {
    routes: BTreeMap<AgentId, Vec<TilePos>>,
    /// Node expansions before giving up. `None` means unbounded.
    max_expansions: Option<usize>,
}

impl GridPathfinder {
    /// Create a pathfinder with unbounded search.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap node expansions per request.
    #[must_use]
    pub fn with_max_expansions(mut self, max_expansions: usize) -> Self {
        self.max_expansions = Some(max_expansions);
        self
    }

    /// Last route handed to `requester`, if still kept.
    #[must_use]
    pub fn route_for(&self, requester: AgentId) -> Option<&[TilePos]> {
        self.routes.get(&requester).map(Vec::as_slice)
    }

    /// Find a route without recording it.
    #[must_use]
    pub fn find_path(&self, map: &WalkabilityMap, start: TilePos, goal: TilePos) -> Option<Vec<TilePos>> {
        if !map.is_passable(goal) {
            return None;
        }
        if start == goal {
            return Some(Vec::new());
        }

        let mut open_set = BinaryHeap::new();
        let mut came_from: HashMap<TilePos, TilePos> = HashMap::new();
        let mut g_score: HashMap<TilePos, u32> = HashMap::new();
        let mut expansions = 0usize;

        g_score.insert(start, 0);
        open_set.push(AStarNode {
            tile: start,
            f_score: start.chebyshev(goal),
            tie_breaker: tie_breaker(start),
        });

        while let Some(current) = open_set.pop() {
            if current.tile == goal {
                return Some(reconstruct_path(&came_from, start, goal));
            }

            expansions += 1;
            if self.max_expansions.is_some_and(|cap| expansions > cap) {
                return None;
            }

            let current_g = g_score.get(&current.tile).copied().unwrap_or(u32::MAX);
            for &(dx, dy) in &NEIGHBOURS {
                let next = current.tile.offset(dx, dy);
                if !map.is_passable(next) || !is_step_valid(map, current.tile, dx, dy) {
                    continue;
                }

                let tentative_g = current_g.saturating_add(1);
                if tentative_g < g_score.get(&next).copied().unwrap_or(u32::MAX) {
                    came_from.insert(next, current.tile);
                    g_score.insert(next, tentative_g);
                    open_set.push(AStarNode {
                        tile: next,
                        f_score: tentative_g + next.chebyshev(goal),
                        tie_breaker: tie_breaker(next),
                    });
                }
            }
        }

        None
    }
}

/// Walk `came_from` back from the goal. The start tile is left out.
fn reconstruct_path(
    came_from: &HashMap<TilePos, TilePos>,
    start: TilePos,
    goal: TilePos,
) -> Vec<TilePos> {
    let mut path = vec![goal];
    let mut current = goal;
    while let Some(&prev) = came_from.get(&current) {
        if prev == start {
            break;
        }
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}

impl Pathfinder for GridPathfinder {
    fn create_path(
        &mut self,
        map: &WalkabilityMap,
        start: TilePos,
        goal: TilePos,
        requester: AgentId,
    ) -> Option<Vec<TilePos>> {
        let path = self.find_path(map, start, goal)?;
        tracing::trace!(requester, %start, %goal, len = path.len(), "path created");
        self.routes.insert(requester, path.clone());
        Some(path)
    }

    fn check_equal_neighbours(
        &self,
        map: &WalkabilityMap,
        reservations: &ReservationTable,
        from: TilePos,
        blocked: TilePos,
    ) -> Option<TilePos> {
        NEIGHBOURS.iter().find_map(|&(dx, dy)| {
            let candidate = from.offset(dx, dy);
            let usable = candidate != blocked
                && candidate.chebyshev(blocked) == 1
                && map.is_passable(candidate)
                && reservations.owner_of(candidate).is_none()
                && is_step_valid(map, from, dx, dy);
            usable.then_some(candidate)
        })
    }

    fn delete_path(&mut self, requester: AgentId) {
        self.routes.remove(&requester);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(width: u32, height: u32) -> WalkabilityMap {
        WalkabilityMap::new(width, height).unwrap()
    }

    #[test]
    fn test_simple_path_excludes_start() {
        let map = open(10, 10);
        let path = GridPathfinder::new()
            .find_path(&map, TilePos::new(0, 0), TilePos::new(3, 0))
            .unwrap();
        assert_eq!(
            path,
            vec![TilePos::new(1, 0), TilePos::new(2, 0), TilePos::new(3, 0)]
        );
    }

    #[test]
    fn test_path_around_obstacle() {
        let map = WalkabilityMap::from_rows(&[
            ".....", //
            "..#..",
            "..#..",
            "..#..",
            ".....",
        ])
        .unwrap();
        let path = GridPathfinder::new()
            .find_path(&map, TilePos::new(0, 2), TilePos::new(4, 2))
            .unwrap();
        assert_eq!(path.last(), Some(&TilePos::new(4, 2)));
        assert!(path.iter().all(|&t| map.is_passable(t)));
        let mut prev = TilePos::new(0, 2);
        for &tile in &path {
            assert_eq!(prev.chebyshev(tile), 1);
            prev = tile;
        }
    }

    #[test]
    fn test_no_corner_cutting() {
        let map = WalkabilityMap::from_rows(&[
            ".#", //
            "..",
        ])
        .unwrap();
        let path = GridPathfinder::new()
            .find_path(&map, TilePos::new(0, 0), TilePos::new(1, 1))
            .unwrap();
        assert_eq!(path, vec![TilePos::new(0, 1), TilePos::new(1, 1)]);
    }

    #[test]
    fn test_no_path_exists() {
        let map = WalkabilityMap::from_rows(&[
            "..#..", //
            "..#..",
            "..#..",
        ])
        .unwrap();
        assert!(GridPathfinder::new()
            .find_path(&map, TilePos::new(0, 0), TilePos::new(4, 0))
            .is_none());
    }

    #[test]
    fn test_blocked_goal_and_same_tile() {
        let map = WalkabilityMap::from_rows(&["..#"]).unwrap();
        let finder = GridPathfinder::new();
        assert!(finder
            .find_path(&map, TilePos::new(0, 0), TilePos::new(2, 0))
            .is_none());
        assert_eq!(
            finder.find_path(&map, TilePos::new(1, 0), TilePos::new(1, 0)),
            Some(Vec::new())
        );
    }

    #[test]
    fn test_expansion_cap_gives_up() {
        let map = open(64, 64);
        let capped = GridPathfinder::new().with_max_expansions(5);
        assert!(capped
            .find_path(&map, TilePos::new(0, 0), TilePos::new(60, 60))
            .is_none());
    }

    #[test]
    fn test_determinism() {
        let map = open(32, 32);
        let finder = GridPathfinder::new();
        let a = finder.find_path(&map, TilePos::new(1, 1), TilePos::new(20, 27));
        let b = finder.find_path(&map, TilePos::new(1, 1), TilePos::new(20, 27));
        assert_eq!(a, b);
    }

    #[test]
    fn test_routes_are_kept_until_deleted() {
        let map = open(8, 8);
        let mut finder = GridPathfinder::new();
        finder.create_path(&map, TilePos::new(0, 0), TilePos::new(2, 2), 7);
        assert_eq!(finder.route_for(7).map(<[TilePos]>::len), Some(2));
        finder.delete_path(7);
        assert!(finder.route_for(7).is_none());
    }

    #[test]
    fn test_equal_neighbour_skips_reserved_and_walls() {
        let map = WalkabilityMap::from_rows(&[
            "...", //
            "...",
            "...",
        ])
        .unwrap();
        let mut reservations = ReservationTable::new(3, 3);
        let finder = GridPathfinder::new();
        let from = TilePos::new(0, 1);
        let blocked = TilePos::new(1, 1);

        // First candidate in neighbour order adjacent to both tiles.
        assert_eq!(
            finder.check_equal_neighbours(&map, &reservations, from, blocked),
            Some(TilePos::new(1, 2))
        );

        reservations.try_reserve(TilePos::new(1, 2), 42);
        assert_eq!(
            finder.check_equal_neighbours(&map, &reservations, from, blocked),
            Some(TilePos::new(0, 2))
        );

        reservations.try_reserve(TilePos::new(0, 2), 42);
        reservations.try_reserve(TilePos::new(0, 0), 42);
        reservations.try_reserve(TilePos::new(1, 0), 42);
        assert_eq!(
            finder.check_equal_neighbours(&map, &reservations, from, blocked),
            None
        );
    }
}
