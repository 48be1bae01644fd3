//! Guard rails applied before any order is placed

use rust_decimal::Decimal;

use crate::common::errors::{EngineError, Result};
use crate::common::types::VenueBalance;
use crate::config::types::EngineConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionLimits {
    pub max_risk_multiple: Decimal,
    pub min_venue_margin: Decimal,
    pub rung_balance_threshold: Decimal,
    pub rungs_below_threshold: usize,
    pub rungs_at_or_above_threshold: usize,
}

impl From<&EngineConfig> for ExecutionLimits {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_risk_multiple: config.max_risk_multiple,
            min_venue_margin: config.min_venue_margin,
            rung_balance_threshold: config.rung_balance_threshold,
            rungs_below_threshold: config.rungs_below_threshold,
            rungs_at_or_above_threshold: config.rungs_at_or_above_threshold,
        }
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl ExecutionLimits {
    /// Ladder size for a balance tier
    pub fn rung_count(&self, balance: Decimal) -> usize {
        if balance >= self.rung_balance_threshold {
            self.rungs_at_or_above_threshold
        } else {
            self.rungs_below_threshold
        }
    }

    pub fn check_risk_appetite(&self, notional: Decimal, balance: Decimal) -> Result<()> {
        let ceiling = balance * self.max_risk_multiple;
        if notional > ceiling {
            return Err(EngineError::precondition("over_risk_appetite")
                .with("notional", notional)
                .with("ceiling", ceiling));
        }
        Ok(())
    }

    pub fn check_margin(&self, balance: &VenueBalance) -> Result<()> {
        if balance.available_margin < self.min_venue_margin {
            return Err(EngineError::precondition("insufficient_margin")
                .with("available_margin", balance.available_margin)
                .with("min_venue_margin", self.min_venue_margin));
        }
        Ok(())
    }
}
