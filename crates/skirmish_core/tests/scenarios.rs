//! Behavioural scenarios driven through the public simulation API.

use skirmish_core::prelude::*;
use skirmish_core::behavior::Direction;
use skirmish_test_utils::fixtures::{
    corridor_map, damage, fixed, map_from_rows, open_map, place, simulation, simulation_with_kinds,
};

/// A 20x20 map with only row 10 open.
fn single_row_map() -> WalkabilityMap {
    let wall = "#".repeat(20);
    let floor = ".".repeat(20);
    let rows: Vec<&str> = (0..20)
        .map(|y| if y == 10 { floor.as_str() } else { wall.as_str() })
        .collect();
    map_from_rows(&rows)
}

/// Row 20 and column 20 open between 18 and 22, everything else blocked.
fn plus_map() -> WalkabilityMap {
    let rows: Vec<String> = (0..24)
        .map(|y| {
            (0..24)
                .map(|x| {
                    let on_row = y == 20 && (18..=22).contains(&x);
                    let on_col = x == 20 && (18..=22).contains(&y);
                    if on_row || on_col {
                        '.'
                    } else {
                        '#'
                    }
                })
                .collect()
        })
        .collect();
    let refs: Vec<&str> = rows.iter().map(String::as_str).collect();
    map_from_rows(&refs)
}

fn kinds_with(kind: AgentKind, edit: impl FnOnce(&mut KindProfile)) -> KindTable {
    let mut kinds = KindTable::standard();
    let mut profile = kinds.get(kind).unwrap().clone();
    edit(&mut profile);
    kinds.insert(kind, profile);
    kinds
}

#[test]
fn test_reservation_taken_before_midpoint_and_released_on_arrival() {
    let kinds = kinds_with(AgentKind::Melee, |p| p.speed = Some(fixed(1)));
    let mut sim = simulation_with_kinds(single_row_map(), kinds);
    let a = place(&mut sim, AgentKind::Melee, 10, 10);
    sim.order_move(a, TilePos::new(15, 10)).unwrap();
    let next = TilePos::new(11, 10);

    let mut history = Vec::new();
    for _ in 0..4 {
        sim.tick();
        let agent = sim.agent(a).unwrap();
        history.push((agent.position.x, sim.reservations().owner_of(next)));
    }

    // 0.25 tiles per tick: held through the midpoint, released on reaching 11.
    assert_eq!(history[0], (fixed(10) + Fixed::from_num(0.25), Some(a)));
    assert_eq!(history[1], (fixed(10) + Fixed::from_num(0.5), Some(a)));
    assert_eq!(history[2], (fixed(10) + Fixed::from_num(0.75), Some(a)));
    assert_eq!(history[3], (fixed(11), None));
    assert_eq!(sim.agent(a).unwrap().state, BehaviorState::Moving(Direction::East));

    for _ in 0..40 {
        sim.tick();
    }
    assert_eq!(sim.agent(a).unwrap().tile(), TilePos::new(15, 10));
    assert_eq!(sim.reservations().reserved_count(), 0);
}

#[test]
fn test_second_agent_stalls_on_contested_tile() {
    let kinds = kinds_with(AgentKind::Melee, |p| p.speed = Some(fixed(1)));
    let mut sim = simulation_with_kinds(plus_map(), kinds);
    let b = place(&mut sim, AgentKind::Melee, 19, 20);
    let c = place(&mut sim, AgentKind::Melee, 20, 19);
    sim.order_move(b, TilePos::new(21, 20)).unwrap();
    sim.order_move(c, TilePos::new(20, 21)).unwrap();
    let contested = TilePos::new(20, 20);
    let c_start = sim.agent(c).unwrap().position;

    // B updates first and holds the crossing until it stands on it.
    for _ in 0..3 {
        let events = sim.tick();
        assert_eq!(events.stalls, vec![c]);
        assert_eq!(sim.reservations().owner_of(contested), Some(b));
        assert_eq!(sim.agent(c).unwrap().position, c_start);
        assert_eq!(sim.agent(c).unwrap().state, BehaviorState::Idle);
    }

    let events = sim.tick();
    assert!(events.stalls.is_empty());
    assert_eq!(sim.reservations().owner_of(contested), Some(c));
    assert_ne!(sim.agent(c).unwrap().position, c_start);

    for _ in 0..80 {
        sim.tick();
    }
    assert_eq!(sim.agent(b).unwrap().tile(), TilePos::new(21, 20));
    assert_eq!(sim.agent(c).unwrap().tile(), TilePos::new(20, 21));
    assert_eq!(sim.reservations().reserved_count(), 0);
}

#[test]
fn test_contention_in_corridor_keeps_one_owner_per_tile() {
    let map = map_from_rows(&["##########", "..........", "##########"]);
    let mut sim = simulation(map);
    let lead = place(&mut sim, AgentKind::Heavy, 2, 1);
    let tail = place(&mut sim, AgentKind::Melee, 1, 1);
    sim.order_move(lead, TilePos::new(9, 1)).unwrap();
    sim.order_move(tail, TilePos::new(8, 1)).unwrap();

    for _ in 0..80 {
        sim.tick();
        let lead_tiles = sim.reservations().tiles_held_by(lead);
        let tail_tiles = sim.reservations().tiles_held_by(tail);
        assert!(lead_tiles.len() <= 1 && tail_tiles.len() <= 1);
        assert!(lead_tiles.iter().all(|t| !tail_tiles.contains(t)));
        for id in [lead, tail] {
            assert!(sim.walkability().is_passable(sim.agent(id).unwrap().tile()));
        }
    }
    assert_eq!(sim.agent(lead).unwrap().tile(), TilePos::new(9, 1));
    assert_eq!(sim.agent(tail).unwrap().tile(), TilePos::new(8, 1));
}

#[test]
fn test_admission_queue_rejects_unaffordable_third_order() {
    let kinds = kinds_with(AgentKind::Melee, |p| p.cost = 40);
    let mut sim = simulation_with_kinds(open_map(16), kinds);
    let barracks = place(&mut sim, AgentKind::Barracks, 2, 2);
    assert_eq!(sim.economy(Faction::Friendly).resources, 100);

    sim.enqueue_production(barracks, AgentKind::Melee).unwrap();
    sim.enqueue_production(barracks, AgentKind::Melee).unwrap();
    let third = sim.enqueue_production(barracks, AgentKind::Melee);
    assert!(matches!(
        third,
        Err(SimError::Production(ProductionError::InsufficientResources {
            required: 40,
            available: 20
        }))
    ));
    assert_eq!(sim.economy(Faction::Friendly).resources, 20);
}

#[test]
fn test_admission_cancel_refunds() {
    let mut sim = simulation(open_map(16));
    let barracks = place(&mut sim, AgentKind::Barracks, 2, 2);
    let handle = sim.enqueue_production(barracks, AgentKind::Melee).unwrap();
    assert_eq!(sim.economy(Faction::Friendly).resources, 60);
    assert!(sim.cancel_production(barracks, handle).unwrap());
    assert!(!sim.cancel_production(barracks, handle).unwrap());
    assert_eq!(sim.economy(Faction::Friendly).resources, 100);
}

#[test]
fn test_progress_queue_freezes_until_funded() {
    let kinds = kinds_with(AgentKind::Gatherer, |p| {
        p.cost = 150;
        p.build_time = fixed(1);
    });
    let mut sim = simulation_with_kinds(open_map(16), kinds);
    let base = place(&mut sim, AgentKind::BaseCenter, 2, 2);
    sim.enqueue_production(base, AgentKind::Gatherer).unwrap();

    let head_remaining = |sim: &Simulation| {
        sim.agent(base)
            .and_then(|a| a.structure())
            .and_then(|s| s.queue.as_ref())
            .and_then(|q| q.current())
            .map(|o| o.remaining)
    };

    for _ in 0..12 {
        let events = sim.tick();
        assert!(events.spawned.is_empty());
    }
    assert_eq!(head_remaining(&sim), Some(fixed(1)));
    assert_eq!(sim.economy(Faction::Friendly).resources, 100);

    sim.notify(Notification::StatDelta(StatDelta::new(
        Faction::Friendly,
        Stat::Resources,
        60,
    )));
    let mut spawned = Vec::new();
    for _ in 0..8 {
        spawned.extend(sim.tick().spawned);
    }
    assert_eq!(spawned.len(), 1);
    assert_eq!(sim.agent(spawned[0]).unwrap().kind, AgentKind::Gatherer);
    assert_eq!(sim.economy(Faction::Friendly).resources, 10);
    assert_eq!(head_remaining(&sim), None);
}

#[test]
fn test_health_clamps_and_death_fires_once() {
    let kinds = kinds_with(AgentKind::Melee, |p| p.max_health = 50);
    let mut sim = simulation_with_kinds(open_map(8), kinds);
    let d = place(&mut sim, AgentKind::Melee, 3, 3);

    sim.notify(damage(d, 30));
    sim.tick();
    assert_eq!(sim.agent(d).unwrap().health.current, 20);

    sim.notify(damage(d, 30));
    sim.notify(damage(d, 30));
    let mut all = Vec::new();
    let first = sim.tick();
    assert_eq!(first.destroyed, vec![d]);
    let agent = sim.agent(d).unwrap();
    assert_eq!(agent.health.current, 0);
    assert_eq!(agent.state, BehaviorState::Destroyed);
    all.push(first);

    sim.notify(damage(d, 30));
    for _ in 0..4 {
        all.push(sim.tick());
    }

    let destroyed_transitions: usize = all.iter().map(|e| e.destroyed.len()).sum();
    let destroyed_notices = all
        .iter()
        .flat_map(|e| &e.notifications)
        .filter(|n| matches!(n, Notification::Destroyed { agent, .. } if *agent == d))
        .count();
    let payouts = all
        .iter()
        .flat_map(|e| &e.notifications)
        .filter(|n| matches!(n, Notification::DeathPayout { agent, .. } if *agent == d))
        .count();
    assert_eq!(destroyed_transitions, 1);
    assert_eq!(destroyed_notices, 1);
    assert_eq!(payouts, 1);
    assert_eq!(sim.economy(Faction::Friendly).units_lost, 1);
    assert_eq!(sim.reservations().reserved_count(), 0);
}

#[test]
fn test_attack_target_suspends_pursuit() {
    let mut sim = simulation(corridor_map(24));
    let gatherer = place(&mut sim, AgentKind::Gatherer, 15, 1);
    let e = place(&mut sim, AgentKind::HostileMelee, 10, 1);

    let mut engaged_at = None;
    for tick in 0..20 {
        sim.tick();
        if sim.agent(e).unwrap().attack_target().is_some() {
            engaged_at = Some(tick);
            break;
        }
    }
    assert!(engaged_at.is_some(), "never engaged");

    let agent = sim.agent(e).unwrap();
    assert_eq!(agent.chase_target(), Some(gatherer));
    assert_eq!(agent.attack_target(), Some(gatherer));
    let frozen = agent.position;
    let route = agent.follower().unwrap().path().clone();

    for _ in 0..4 {
        sim.tick();
        let agent = sim.agent(e).unwrap();
        assert_eq!(agent.attack_target(), Some(gatherer));
        assert_eq!(agent.position, frozen);
        assert_eq!(agent.follower().unwrap().path(), &route);
        assert!(matches!(agent.state, BehaviorState::Attacking(Direction::East)));
    }
}

#[test]
fn test_move_order_overrides_engagement() {
    let mut sim = simulation(open_map(16));
    let melee = place(&mut sim, AgentKind::Melee, 5, 5);
    place(&mut sim, AgentKind::ResourceNode, 6, 5);

    sim.tick();
    assert!(sim.agent(melee).unwrap().attack_target().is_some());

    sim.order_move(melee, TilePos::new(5, 12)).unwrap();
    for _ in 0..30 {
        sim.tick();
    }
    assert_eq!(sim.agent(melee).unwrap().tile(), TilePos::new(5, 12));
}

#[test]
fn test_target_walking_out_of_reach_stops_damage() {
    let kinds = kinds_with(AgentKind::HostileMelee, |p| {
        p.max_health = 100_000;
        p.vision_range = None;
    });
    let mut sim = simulation_with_kinds(open_map(40), kinds);
    let melee = place(&mut sim, AgentKind::Melee, 5, 5);
    let hostile = place(&mut sim, AgentKind::HostileMelee, 6, 5);

    for _ in 0..8 {
        sim.tick();
    }
    assert_eq!(sim.agent(melee).unwrap().attack_target(), Some(hostile));

    let far = TilePos::new(35, 35);
    sim.order_move(hostile, far).unwrap();
    for _ in 0..200 {
        sim.tick();
        if sim.agent(hostile).unwrap().tile() == far {
            break;
        }
    }
    assert_eq!(sim.agent(hostile).unwrap().tile(), far);

    let health = sim.agent(hostile).unwrap().health.current;
    for _ in 0..100 {
        sim.tick();
    }
    assert_eq!(sim.agent(melee).unwrap().attack_target(), None);
    assert_eq!(sim.agent(hostile).unwrap().health.current, health);
}

#[test]
fn test_move_order_wins_over_sighted_enemy() {
    let mut sim = simulation(open_map(40));
    place(&mut sim, AgentKind::Melee, 5, 5);
    let hostile = place(&mut sim, AgentKind::HostileMelee, 8, 5);
    let far = TilePos::new(35, 35);

    sim.order_move(hostile, far).unwrap();
    sim.tick();
    let agent = sim.agent(hostile).unwrap();
    assert_eq!(agent.follower().unwrap().goal(), Some(far));
    assert_eq!(agent.follower().unwrap().order(), Some(PlayerOrder::Move));
    assert_eq!(agent.chase_target(), None);

    for _ in 0..400 {
        sim.tick();
    }
    let agent = sim.agent(hostile).unwrap();
    assert_eq!(agent.tile(), far);
    assert!(!agent.is_destroyed());
}

#[test]
fn test_killing_resource_node_pays_resources() {
    let mut sim = simulation(open_map(16));
    let melee = place(&mut sim, AgentKind::Melee, 5, 5);
    let node = place(&mut sim, AgentKind::ResourceNode, 6, 5);

    let mut destroyed = false;
    for _ in 0..200 {
        destroyed |= sim.tick().destroyed.contains(&node);
        if destroyed {
            break;
        }
    }
    assert!(destroyed);
    sim.tick();
    assert_eq!(sim.economy(Faction::Friendly).resources, 150);
    assert!(sim.walkability().is_passable(TilePos::new(6, 5)));
    assert_eq!(sim.agent(melee).unwrap().attack_target(), None);
}

#[test]
fn test_gatherer_ignores_node_until_ordered() {
    let mut sim = simulation(open_map(16));
    let gatherer = place(&mut sim, AgentKind::Gatherer, 5, 5);
    let node = place(&mut sim, AgentKind::ResourceNode, 6, 5);

    for _ in 0..4 {
        sim.tick();
    }
    assert_eq!(sim.agent(gatherer).unwrap().attack_target(), None);

    sim.order_chase(gatherer, node).unwrap();
    for _ in 0..8 {
        sim.tick();
    }
    let agent = sim.agent(gatherer).unwrap();
    assert_eq!(agent.chase_target(), Some(node));
    assert_eq!(agent.attack_target(), Some(node));
}

#[test]
fn test_hostiles_march_on_base_and_win() {
    let mut sim = simulation(open_map(20));
    let base = place(&mut sim, AgentKind::BaseCenter, 2, 2);
    for y in [12, 14, 16] {
        place(&mut sim, AgentKind::HostileHeavy, 16, y);
    }

    let mut outcome_tick = None;
    for tick in 0..4000 {
        sim.tick();
        if sim.outcome(Faction::Friendly).is_some() {
            outcome_tick = Some(tick);
            break;
        }
    }
    assert!(outcome_tick.is_some(), "base never fell");
    assert_eq!(sim.outcome(Faction::Friendly), Some(Outcome::Defeat));
    assert!(sim.agent(base).map_or(true, |a| a.is_destroyed()));
}
