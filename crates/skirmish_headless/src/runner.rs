//! Scenario runner and JSON reports.
//!
//! Runs a prepared scenario to completion and condenses the result into a
//! serialisable [`RunReport`]. Batches run in parallel using rayon; every
//! simulation is independent, so thread scheduling cannot affect results.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::result::Result;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use skirmish_core::prelude::*;

use crate::scenario::{Scenario, ScenarioError, DEFAULT_TICKS};

/// Final state of one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReport {
    /// Agent id.
    pub id: AgentId,
    /// Kind.
    pub kind: AgentKind,
    /// Faction.
    pub faction: Faction,
    /// Tile it stands on.
    pub tile: (i32, i32),
    /// Current health.
    pub health: u32,
    /// Maximum health.
    pub max_health: u32,
    /// Upgrade level.
    pub level: u8,
    /// Behaviour state, debug-formatted.
    pub state: String,
}

impl From<&Agent> for AgentReport {
    fn from(agent: &Agent) -> Self {
        let tile = agent.tile();
        Self {
            id: agent.id,
            kind: agent.kind,
            faction: agent.faction,
            tile: (tile.x, tile.y),
            health: agent.health.current,
            max_health: agent.health.max,
            level: agent.level,
            state: format!("{:?}", agent.state),
        }
    }
}

/// Counters for a tick where something happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickCounters {
    /// Tick index.
    pub tick: u64,
    /// Units that waited on a reserved tile.
    pub stalls: usize,
    /// Agents destroyed.
    pub deaths: usize,
    /// Agents spawned.
    pub spawns: usize,
}

impl TickCounters {
    fn is_quiet(&self) -> bool {
        self.stalls == 0 && self.deaths == 0 && self.spawns == 0
    }
}

/// Summary of one scenario run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Scenario name.
    pub scenario: String,
    /// Ticks completed.
    pub ticks: u64,
    /// Final state hash.
    pub state_hash: u64,
    /// Recorded outcomes.
    pub outcomes: BTreeMap<Faction, Outcome>,
    /// Final economy per faction.
    pub economies: BTreeMap<Faction, FactionEconomy>,
    /// Agents still present at the end.
    pub agents: Vec<AgentReport>,
    /// Ticks with stalls, deaths or spawns.
    pub counters: Vec<TickCounters>,
    /// Total stalls.
    pub total_stalls: usize,
    /// Total deaths.
    pub total_deaths: usize,
    /// Total spawns.
    pub total_spawns: usize,
    /// Orders the simulation refused, with the reason.
    pub rejected_orders: Vec<String>,
}

/// Run a scenario for `ticks` ticks (or the scenario's own count).
pub fn run_scenario(scenario: &Scenario, ticks: Option<u64>) -> Result<RunReport, ScenarioError> {
    let ticks = ticks.or(scenario.ticks).unwrap_or(DEFAULT_TICKS);
    let mut prepared = scenario.prepare()?;
    let orders = std::mem::take(&mut prepared.orders);
    let mut pending = orders.iter().peekable();

    info!(scenario = %scenario.name, ticks, "running scenario");

    let mut counters = Vec::new();
    let mut rejected_orders = Vec::new();
    for tick in 0..ticks {
        while let Some(timed) = pending.next_if(|o| o.tick <= tick) {
            if let Err(error) = prepared.apply(&timed.order) {
                warn!(tick, order = ?timed.order, %error, "order rejected");
                rejected_orders.push(format!("tick {tick}: {error}"));
            }
        }

        let events = prepared.sim.tick();
        let counter = TickCounters {
            tick,
            stalls: events.stalls.len(),
            deaths: events.destroyed.len(),
            spawns: events.spawned.len(),
        };
        if !counter.is_quiet() {
            counters.push(counter);
        }
    }

    let sim = &prepared.sim;
    let report = RunReport {
        scenario: scenario.name.clone(),
        ticks: sim.current_tick(),
        state_hash: sim.state_hash(),
        outcomes: [Faction::Friendly, Faction::Hostile, Faction::Neutral]
            .into_iter()
            .filter_map(|f| sim.outcome(f).map(|o| (f, o)))
            .collect(),
        economies: sim.economies().iter().map(|(f, e)| (f, *e)).collect(),
        agents: sim.agents().iter().map(AgentReport::from).collect(),
        total_stalls: counters.iter().map(|c| c.stalls).sum(),
        total_deaths: counters.iter().map(|c| c.deaths).sum(),
        total_spawns: counters.iter().map(|c| c.spawns).sum(),
        counters,
        rejected_orders,
    };
    debug!(hash = report.state_hash, agents = report.agents.len(), "scenario finished");
    Ok(report)
}

/// Load a scenario file and run it.
pub fn run_file(path: &Path, ticks: Option<u64>) -> Result<RunReport, ScenarioError> {
    let scenario = Scenario::load(path)?;
    run_scenario(&scenario, ticks)
}

/// Result of one file in a batch.
#[derive(Debug)]
pub struct BatchEntry {
    /// Scenario file.
    pub path: PathBuf,
    /// Its report, or why it could not run.
    pub result: Result<RunReport, ScenarioError>,
}

/// Run several scenario files in parallel. Results keep input order.
pub fn run_batch(paths: &[PathBuf], ticks: Option<u64>) -> Vec<BatchEntry> {
    info!(scenarios = paths.len(), "running batch");
    paths
        .par_iter()
        .map(|path| BatchEntry {
            path: path.clone(),
            result: run_file(path, ticks),
        })
        .collect()
}
