//! Faction stat counters: spendable resources, loot and kill tallies.
//!
//! Build-queue admission and progress read-modify-write these counters, as do
//! death payouts. Everything runs inside one tick step, so there is never
//! more than one writer at a time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::agent::Faction;

/// Kills needed for each bonus gold piece.
pub const KILLS_PER_GOLD: i64 = 10;

/// A tracked faction statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stat {
    /// Spendable production currency.
    Resources,
    /// Drops from destroyed hostiles; pays for upgrades.
    MobDrop,
    /// Bonus currency paid every [`KILLS_PER_GOLD`] kills.
    Gold,
    /// Hostiles destroyed.
    UnitsKilled,
    /// Own units lost.
    UnitsLost,
}

/// A signed change to one faction's stat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatDelta {
    /// Faction whose counter changes.
    pub faction: Faction,
    /// Counter to change.
    pub stat: Stat,
    /// Signed amount.
    pub amount: i64,
}

impl StatDelta {
    /// Create a stat delta.
    #[must_use]
    pub const fn new(faction: Faction, stat: Stat, amount: i64) -> Self {
        Self {
            faction,
            stat,
            amount,
        }
    }
}

/// Counters for one faction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FactionEconomy {
    /// Spendable production currency.
    pub resources: i64,
    /// Upgrade currency.
    pub mob_drop: i64,
    /// Bonus currency.
    pub gold: i64,
    /// Hostiles destroyed.
    pub units_killed: i64,
    /// Own units lost.
    pub units_lost: i64,
}

impl FactionEconomy {
    /// Current value of a stat.
    #[must_use]
    pub const fn get(&self, stat: Stat) -> i64 {
        match stat {
            Stat::Resources => self.resources,
            Stat::MobDrop => self.mob_drop,
            Stat::Gold => self.gold,
            Stat::UnitsKilled => self.units_killed,
            Stat::UnitsLost => self.units_lost,
        }
    }

    fn slot(&mut self, stat: Stat) -> &mut i64 {
        match stat {
            Stat::Resources => &mut self.resources,
            Stat::MobDrop => &mut self.mob_drop,
            Stat::Gold => &mut self.gold,
            Stat::UnitsKilled => &mut self.units_killed,
            Stat::UnitsLost => &mut self.units_lost,
        }
    }

    /// Add a signed amount to a stat, returning the new value.
    ///
    /// Crossing a multiple of [`KILLS_PER_GOLD`] on the kill counter pays
    /// one gold per multiple crossed.
    pub fn apply(&mut self, stat: Stat, amount: i64) -> i64 {
        let before = self.get(stat);
        let after = before.saturating_add(amount);
        *self.slot(stat) = after;
        if stat == Stat::UnitsKilled {
            let bonus = after.div_euclid(KILLS_PER_GOLD) - before.div_euclid(KILLS_PER_GOLD);
            if bonus > 0 {
                self.gold = self.gold.saturating_add(bonus);
            }
        }
        after
    }

    /// Check if the faction can afford a cost in `stat`.
    #[must_use]
    pub fn can_afford(&self, stat: Stat, cost: u32) -> bool {
        self.get(stat) >= i64::from(cost)
    }

    /// Spend `cost` of `stat` if available.
    ///
    /// Returns true if the transaction succeeded.
    pub fn spend(&mut self, stat: Stat, cost: u32) -> bool {
        if self.can_afford(stat, cost) {
            self.apply(stat, -i64::from(cost));
            true
        } else {
            false
        }
    }
}

/// Economies for every faction, keyed deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Economies {
    factions: BTreeMap<Faction, FactionEconomy>,
}

impl Economies {
    /// Counters for a faction (zeroed if never touched).
    #[must_use]
    pub fn get(&self, faction: Faction) -> FactionEconomy {
        self.factions.get(&faction).copied().unwrap_or_default()
    }

    /// Mutable counters for a faction.
    pub fn get_mut(&mut self, faction: Faction) -> &mut FactionEconomy {
        self.factions.entry(faction).or_default()
    }

    /// Apply a delta to its faction.
    pub fn apply(&mut self, delta: StatDelta) -> i64 {
        self.get_mut(delta.faction).apply(delta.stat, delta.amount)
    }

    /// Iterate over factions that have counters.
    pub fn iter(&self) -> impl Iterator<Item = (Faction, &FactionEconomy)> {
        self.factions.iter().map(|(f, e)| (*f, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spend_and_afford() {
        let mut economy = FactionEconomy {
            resources: 100,
            ..Default::default()
        };
        assert!(economy.can_afford(Stat::Resources, 100));
        assert!(economy.spend(Stat::Resources, 40));
        assert!(economy.spend(Stat::Resources, 40));
        assert!(!economy.spend(Stat::Resources, 40));
        assert_eq!(economy.resources, 20);
    }

    #[test]
    fn test_gold_every_tenth_kill() {
        let mut economy = FactionEconomy::default();
        for _ in 0..9 {
            economy.apply(Stat::UnitsKilled, 1);
        }
        assert_eq!(economy.gold, 0);
        economy.apply(Stat::UnitsKilled, 1);
        assert_eq!(economy.gold, 1);
        economy.apply(Stat::UnitsKilled, 25);
        assert_eq!(economy.units_killed, 35);
        assert_eq!(economy.gold, 3);
    }

    #[test]
    fn test_economies_are_per_faction() {
        let mut economies = Economies::default();
        economies.apply(StatDelta::new(Faction::Friendly, Stat::MobDrop, 5));
        economies.apply(StatDelta::new(Faction::Hostile, Stat::UnitsLost, 1));
        assert_eq!(economies.get(Faction::Friendly).mob_drop, 5);
        assert_eq!(economies.get(Faction::Hostile).mob_drop, 0);
        assert_eq!(economies.get(Faction::Neutral), FactionEconomy::default());
        assert_eq!(economies.iter().count(), 2);
    }
}
