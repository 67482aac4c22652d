//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the simulation
//! produces identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! Two simulations started from the same state and fed the same orders must
//! hash identically after every tick. Sources of non-determinism include:
//!
//! - **Floating-point math**: all positions and timers use
//!   [`skirmish_core::math::Fixed`].
//!
//! - **HashMap iteration order**: agents are updated in ascending id order
//!   and collider pairs in a canonical order.
//!
//! - **Shared grid state**: reservation contention is settled by update
//!   order, so update order must never depend on anything else.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: individual systems (reservations, movement, combat)
//! 2. **Property tests**: random orders must still produce identical runs
//! 3. **Snapshot tests**: a restored snapshot continues exactly like the original
//! 4. **Parallel tests**: running N simulations on threads all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use skirmish_core::pathfinding::GridPathfinder;
use skirmish_core::simulation::Simulation;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the simulation was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a state machine multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `ticks` - Number of steps per run
/// * `setup` - Function to create the initial state
/// * `step` - Function to advance the state by one tick
/// * `hash` - Function to compute a state hash
///
/// # Example
///
/// ```
/// use skirmish_test_utils::determinism::verify_determinism;
/// use skirmish_test_utils::fixtures::skirmish;
///
/// let result = verify_determinism(
///     3,
///     40,
///     skirmish,
///     |sim| { sim.tick(); },
///     |sim| sim.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();
        for _ in 0..ticks {
            step(&mut state);
        }
        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Run the same simulation setup on `runs` scoped threads and compare
/// final hashes.
///
/// # Panics
///
/// Panics if a worker thread panics.
pub fn verify_parallel_determinism<F>(setup: F, runs: usize, ticks: u64) -> DeterminismResult
where
    F: Fn() -> Simulation + Sync,
{
    let hashes: Vec<u64> = thread::scope(|s| {
        let handles: Vec<_> = (0..runs)
            .map(|_| {
                s.spawn(|| {
                    let mut sim = setup();
                    for _ in 0..ticks {
                        sim.tick();
                    }
                    sim.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("simulation thread panicked"))
            .collect()
    });

    DeterminismResult {
        is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
        hashes,
        ticks,
    }
}

/// Compare two runs tick by tick and report the first tick whose hashes
/// differ.
///
/// # Returns
///
/// `None` if the runs never diverge, `Some(0)` if they already differ
/// before the first tick.
pub fn find_first_divergence<F>(setup: F, ticks: u64) -> Option<u64>
where
    F: Fn() -> Simulation,
{
    let mut first = setup();
    let mut second = setup();

    if first.state_hash() != second.state_hash() {
        return Some(0);
    }

    for tick in 1..=ticks {
        first.tick();
        second.tick();
        if first.state_hash() != second.state_hash() {
            return Some(tick);
        }
    }

    None
}

/// Run `warmup` ticks, snapshot, restore, then run both copies for `ticks`
/// more ticks. True if every post-restore hash matches.
pub fn verify_snapshot_determinism<F>(setup: F, warmup: u64, ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    let mut original = setup();
    for _ in 0..warmup {
        original.tick();
    }

    let Ok(bytes) = original.snapshot() else {
        return false;
    };
    let Ok(mut restored) = Simulation::<GridPathfinder>::restore(&bytes) else {
        return false;
    };

    if restored.state_hash() != original.state_hash() {
        return false;
    }
    for _ in 0..ticks {
        original.tick();
        restored.tick();
        if restored.state_hash() != original.state_hash() {
            return false;
        }
    }
    true
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for determinism testing.
///
/// Orders refer to agents by slot: an index into whatever id list the test
/// spawned, taken modulo its length.
pub mod strategies {
    use proptest::prelude::*;
    use skirmish_core::agent::AgentId;
    use skirmish_core::grid::TilePos;
    use skirmish_core::notification::Notification;
    use skirmish_core::simulation::Simulation;

    /// A player or system input applied between ticks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum SimOrder {
        /// Walk to a tile.
        Move {
            /// Agent slot.
            slot: usize,
            /// Goal tile.
            tile: TilePos,
        },
        /// Chase another agent.
        Chase {
            /// Chaser slot.
            slot: usize,
            /// Target slot.
            target: usize,
        },
        /// Stop and forget targets.
        Stop {
            /// Agent slot.
            slot: usize,
        },
        /// Publish damage.
        Damage {
            /// Target slot.
            slot: usize,
            /// Health points.
            amount: u32,
        },
    }

    impl SimOrder {
        /// Apply to `sim`. Rejected orders are ignored: random sequences
        /// routinely name dead or immobile agents.
        pub fn apply(self, sim: &mut Simulation, ids: &[AgentId]) {
            if ids.is_empty() {
                return;
            }
            let pick = |slot: usize| ids[slot % ids.len()];
            match self {
                Self::Move { slot, tile } => {
                    let _ = sim.order_move(pick(slot), tile);
                }
                Self::Chase { slot, target } => {
                    let _ = sim.order_chase(pick(slot), pick(target));
                }
                Self::Stop { slot } => {
                    let _ = sim.order_stop(pick(slot));
                }
                Self::Damage { slot, amount } => {
                    sim.notify(Notification::Damage {
                        target: pick(slot),
                        amount,
                        source: None,
                        source_kind: None,
                    });
                }
            }
        }
    }

    /// Generate a tile inside a `size` x `size` map.
    pub fn arb_tile(size: i32) -> impl Strategy<Value = TilePos> {
        (0..size, 0..size).prop_map(|(x, y)| TilePos::new(x, y))
    }

    /// Generate damage values (1-100).
    pub fn arb_damage() -> impl Strategy<Value = u32> {
        1u32..100u32
    }

    /// Generate any order against a `size` x `size` map.
    pub fn arb_order(size: i32) -> impl Strategy<Value = SimOrder> {
        prop_oneof![
            4 => (any::<usize>(), arb_tile(size)).prop_map(|(slot, tile)| SimOrder::Move { slot, tile }),
            2 => (any::<usize>(), any::<usize>()).prop_map(|(slot, target)| SimOrder::Chase { slot, target }),
            1 => any::<usize>().prop_map(|slot| SimOrder::Stop { slot }),
            1 => (any::<usize>(), arb_damage()).prop_map(|(slot, amount)| SimOrder::Damage { slot, amount }),
        ]
    }

    /// Generate a schedule of `(tick, order)` pairs, sorted by tick.
    pub fn arb_schedule(
        size: i32,
        max_tick: u64,
        max_len: usize,
    ) -> impl Strategy<Value = Vec<(u64, SimOrder)>> {
        proptest::collection::vec((0..max_tick, arb_order(size)), 0..max_len).prop_map(|mut v| {
            v.sort_by_key(|(tick, _)| *tick);
            v
        })
    }
}

#[cfg(test)]
mod tests {
    use super::strategies::*;
    use super::*;
    use crate::fixtures::{crowd_through_choke, open_map, place, simulation, skirmish};
    use proptest::prelude::*;
    use skirmish_core::prelude::*;

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 100, || 0u64, |n| *n += 1, |n| *n);

        assert!(result.is_deterministic);
        assert_eq!(result.hashes, vec![100, 100, 100]);
    }

    #[test]
    #[should_panic(expected = "non-deterministic")]
    fn test_assert_deterministic_reports_mismatch() {
        let result = DeterminismResult {
            is_deterministic: false,
            hashes: vec![1, 2],
            ticks: 5,
        };
        result.assert_deterministic();
    }

    #[test]
    fn test_skirmish_is_deterministic() {
        let result = verify_determinism(
            3,
            120,
            skirmish,
            |sim| {
                sim.tick();
            },
            |sim| sim.state_hash(),
        );
        result.assert_deterministic();
    }

    #[test]
    fn test_crowd_never_diverges() {
        assert_eq!(find_first_divergence(|| crowd_through_choke(24), 150), None);
    }

    #[test]
    fn test_parallel_runs_match() {
        verify_parallel_determinism(|| crowd_through_choke(16), 4, 80).assert_deterministic();
    }

    #[test]
    fn test_snapshot_mid_battle() {
        assert!(verify_snapshot_determinism(skirmish, 40, 80));
    }

    #[test]
    fn test_compute_hash_stable() {
        assert_eq!(compute_hash(&(1u32, 2u32)), compute_hash(&(1u32, 2u32)));
        assert_ne!(compute_hash(&1u32), compute_hash(&2u32));
    }

    fn scheduled_run(schedule: &[(u64, SimOrder)], ticks: u64) -> u64 {
        let mut sim = simulation(open_map(12));
        let ids = vec![
            place(&mut sim, AgentKind::Melee, 1, 1),
            place(&mut sim, AgentKind::Ranged, 3, 1),
            place(&mut sim, AgentKind::Gatherer, 1, 3),
            place(&mut sim, AgentKind::HostileMelee, 10, 10),
            place(&mut sim, AgentKind::ResourceNode, 6, 6),
        ];
        let mut next = 0;
        for tick in 0..ticks {
            while next < schedule.len() && schedule[next].0 == tick {
                schedule[next].1.apply(&mut sim, &ids);
                next += 1;
            }
            sim.tick();
        }
        sim.state_hash()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_random_orders_are_deterministic(schedule in arb_schedule(12, 40, 16)) {
            prop_assert_eq!(scheduled_run(&schedule, 50), scheduled_run(&schedule, 50));
        }
    }
}
