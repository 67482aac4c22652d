//! Test fixtures and helpers.
//!
//! Pre-built maps and simulations for consistent testing. Everything here
//! panics on bad input: fixtures are only ever built from literals.

use fixed::types::I32F32;
use skirmish_core::prelude::*;

/// Tick length used by fixtures. Exact in binary fixed-point, unlike 0.05.
pub const TEST_TICK_SECONDS: f64 = 0.25;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Default config with the fixture tick length.
#[must_use]
pub fn test_config() -> SimConfig {
    SimConfig {
        tick_seconds: fixed_f(TEST_TICK_SECONDS),
        ..SimConfig::default()
    }
}

/// Fully open square map.
///
/// # Panics
///
/// Panics if `size` is zero.
#[must_use]
pub fn open_map(size: u32) -> WalkabilityMap {
    WalkabilityMap::new(size, size).expect("fixture map size must be non-zero")
}

/// Map from ASCII rows (`#` blocked).
///
/// # Panics
///
/// Panics if the rows are ragged or empty.
#[must_use]
pub fn map_from_rows(rows: &[&str]) -> WalkabilityMap {
    WalkabilityMap::from_rows(rows).expect("fixture rows must be rectangular")
}

/// A horizontal one-tile corridor of `length` tiles at `y = 1`, walled above
/// and below.
#[must_use]
pub fn corridor_map(length: usize) -> WalkabilityMap {
    let wall = "#".repeat(length);
    let floor = ".".repeat(length);
    map_from_rows(&[wall.as_str(), floor.as_str(), wall.as_str()])
}

/// Two open rooms joined by a one-tile gap in a vertical wall at
/// `x = width / 2`.
///
/// The gap sits on the middle row.
#[must_use]
pub fn choke_map(width: usize, height: usize) -> WalkabilityMap {
    let wall_x = width / 2;
    let gap_y = height / 2;
    let rows: Vec<String> = (0..height)
        .map(|y| {
            (0..width)
                .map(|x| if x == wall_x && y != gap_y { '#' } else { '.' })
                .collect()
        })
        .collect();
    let refs: Vec<&str> = rows.iter().map(String::as_str).collect();
    map_from_rows(&refs)
}

/// Simulation over `map` with the fixture config and standard kinds.
///
/// # Panics
///
/// Panics if the fixture config fails validation.
#[must_use]
pub fn simulation(map: WalkabilityMap) -> Simulation {
    Simulation::new(map, test_config()).expect("fixture config must validate")
}

/// Simulation over `map` with a custom kind table.
///
/// # Panics
///
/// Panics if the fixture config fails validation.
#[must_use]
pub fn simulation_with_kinds(map: WalkabilityMap, kinds: KindTable) -> Simulation {
    Simulation::with_kinds(map, test_config(), kinds).expect("fixture config must validate")
}

/// Place `kind` at `(x, y)`.
///
/// # Panics
///
/// Panics if the placement is rejected.
pub fn place(sim: &mut Simulation, kind: AgentKind, x: i32, y: i32) -> AgentId {
    sim.spawn(kind, TilePos::new(x, y))
        .unwrap_or_else(|e| panic!("fixture placement of {kind:?} at ({x}, {y}) failed: {e}"))
}

/// Damage with no attacker.
#[must_use]
pub fn damage(target: AgentId, amount: u32) -> Notification {
    Notification::Damage {
        target,
        amount,
        source: None,
        source_kind: None,
    }
}

/// Run `ticks` ticks and collect every event.
pub fn run_ticks(sim: &mut Simulation, ticks: u64) -> Vec<TickEvents> {
    (0..ticks).map(|_| sim.tick()).collect()
}

/// A crowd of friendly melee units in the left room of a [`choke_map`],
/// all ordered to the far side of the right room.
///
/// # Panics
///
/// Panics if the map is too small for `units` agents.
#[must_use]
pub fn crowd_through_choke(units: usize) -> Simulation {
    let (width, height) = (32usize, 16usize);
    let mut sim = simulation(choke_map(width, height));
    let left_room = (width / 2) as i32;
    let goal = TilePos::new(width as i32 - 2, (height / 2) as i32);

    let mut placed = 0;
    'rows: for y in 1..height as i32 - 1 {
        for x in 1..left_room - 1 {
            if placed == units {
                break 'rows;
            }
            let unit = place(&mut sim, AgentKind::Melee, x, y);
            sim.order_move(unit, goal)
                .unwrap_or_else(|e| panic!("fixture move order failed: {e}"));
            placed += 1;
        }
    }
    assert_eq!(placed, units, "left room too small for {units} units");
    sim
}

/// A friendly base with towers and a handful of hostiles closing in.
#[must_use]
pub fn skirmish() -> Simulation {
    let mut sim = simulation(open_map(24));
    place(&mut sim, AgentKind::BaseCenter, 2, 2);
    place(&mut sim, AgentKind::Tower, 6, 2);
    place(&mut sim, AgentKind::Tower, 2, 6);
    for (i, kind) in [
        AgentKind::HostileMelee,
        AgentKind::HostileRanged,
        AgentKind::HostileSpecial,
        AgentKind::HostileHeavy,
    ]
    .into_iter()
    .enumerate()
    {
        place(&mut sim, kind, 20, 14 + i as i32 * 2);
    }
    let defender = place(&mut sim, AgentKind::Melee, 8, 8);
    sim.order_move(defender, TilePos::new(12, 12))
        .unwrap_or_else(|e| panic!("fixture move order failed: {e}"));
    sim
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corridor_shape() {
        let map = corridor_map(6);
        assert_eq!((map.width(), map.height()), (6, 3));
        assert!(map.is_passable(TilePos::new(3, 1)));
        assert!(!map.is_passable(TilePos::new(3, 0)));
        assert!(!map.is_passable(TilePos::new(3, 2)));
    }

    #[test]
    fn test_choke_has_single_gap() {
        let map = choke_map(10, 7);
        let open: Vec<i32> = (0..7)
            .filter(|&y| map.is_passable(TilePos::new(5, y)))
            .collect();
        assert_eq!(open, vec![3]);
    }

    #[test]
    fn test_crowd_fixture_places_units() {
        let sim = crowd_through_choke(12);
        assert_eq!(sim.agents().len(), 12);
    }

    #[test]
    fn test_skirmish_has_home_base() {
        let sim = skirmish();
        assert!(sim.home_base().is_some());
    }
}
