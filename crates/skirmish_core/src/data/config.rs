//! Simulation tuning.

use serde::{Deserialize, Serialize};

use crate::agent::Faction;
use crate::collision::PairOrdering;
use crate::economy::{Stat, StatDelta};
use crate::error::{Result, SimError};
use crate::math::{fixed_decimal, Fixed};

/// Tunables for one simulation.
///
/// Every field has a default, so a RON file only needs the values it
/// changes:
///
/// ```ron
/// SimConfig(
///     tick_seconds: 0.1,
///     pair_ordering: Registration,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seconds simulated per tick.
    #[serde(with = "fixed_decimal")]
    pub tick_seconds: Fixed,

    /// World units per tile, used for collider geometry.
    #[serde(with = "fixed_decimal")]
    pub tile_size: Fixed,

    /// Seconds a destroyed agent lingers before removal.
    #[serde(with = "fixed_decimal")]
    pub removal_delay: Fixed,

    /// Tiles per second when escaping an impassable tile.
    #[serde(with = "fixed_decimal")]
    pub nudge_speed: Fixed,

    /// Ring cap for the escape search.
    pub nudge_search_radius: u32,

    /// Fraction of penetration depth removed per solid resolution.
    #[serde(with = "fixed_decimal")]
    pub push_strength: Fixed,

    /// Canonical order for pairwise collision checks.
    pub pair_ordering: PairOrdering,

    /// Stat balances credited when the simulation is created.
    pub starting_stats: Vec<StatDelta>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_seconds: Fixed::from_num(0.05),
            tile_size: Fixed::from_num(32),
            removal_delay: Fixed::from_num(2),
            nudge_speed: Fixed::from_num(2),
            nudge_search_radius: 4,
            push_strength: Fixed::from_num(0.5),
            pair_ordering: PairOrdering::AgentId,
            starting_stats: vec![StatDelta::new(Faction::Friendly, Stat::Resources, 100)],
        }
    }
}

impl SimConfig {
    /// Parse from RON and validate.
    pub fn from_ron_str(ron: &str) -> Result<Self> {
        let config: Self = ron::from_str(ron).map_err(|e| SimError::DataParse {
            what: "simulation config".into(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or break the simulation.
    pub fn validate(&self) -> Result<()> {
        if self.tick_seconds <= Fixed::ZERO {
            return Err(SimError::InvalidState("tick_seconds must be positive".into()));
        }
        if self.tile_size <= Fixed::ZERO {
            return Err(SimError::InvalidState("tile_size must be positive".into()));
        }
        if self.push_strength < Fixed::ZERO || self.push_strength > Fixed::ONE {
            return Err(SimError::InvalidState(
                "push_strength must be within [0, 1]".into(),
            ));
        }
        if self.removal_delay < Fixed::ZERO || self.nudge_speed <= Fixed::ZERO {
            return Err(SimError::InvalidState(
                "removal_delay must be non-negative and nudge_speed positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_ron_keeps_defaults() {
        let config = SimConfig::from_ron_str("(tick_seconds: 1.0, pair_ordering: Registration)")
            .unwrap();
        assert_eq!(config.tick_seconds, Fixed::ONE);
        assert_eq!(config.pair_ordering, PairOrdering::Registration);
        assert_eq!(config.tile_size, Fixed::from_num(32));
        assert_eq!(config.nudge_search_radius, 4);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(SimConfig::from_ron_str("(tick_seconds: 0.0)").is_err());
        assert!(SimConfig::from_ron_str("(push_strength: 1.5)").is_err());
        assert!(SimConfig::from_ron_str("(tick_seconds: \"fast\")").is_err());
    }
}
