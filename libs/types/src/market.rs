//! Market definitions and overridable risk fields

use serde::{Deserialize, Serialize};

use crate::errors::RiskError;
use crate::ids::Symbol;
use crate::numeric::{self, Pips, PIP_SCALE};

/// Risk fields a wallet-level override may replace as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverridableMarketFields {
    pub initial_margin_fraction: Pips,
    pub maintenance_margin_fraction: Pips,
    pub incremental_initial_margin_fraction: Pips,
    pub baseline_position_size: Pips,
    pub incremental_position_size: Pips,
    pub maximum_position_size: Pips,
    pub minimum_position_size: Pips,
}

impl OverridableMarketFields {
    /// Reject fields the margin math cannot work with.
    pub fn validate(&self) -> Result<(), RiskError> {
        let fraction_ok = |f: Pips| (0..=PIP_SCALE).contains(&f);
        let invalid = |reason: &str| -> Result<(), RiskError> {
            Err(RiskError::InvalidMarketParameters {
                reason: reason.to_string(),
            })
        };

        if !fraction_ok(self.initial_margin_fraction)
            || !fraction_ok(self.maintenance_margin_fraction)
            || !fraction_ok(self.incremental_initial_margin_fraction)
        {
            return invalid("margin fractions must lie in [0, 1]");
        }
        if self.maintenance_margin_fraction > self.initial_margin_fraction {
            return invalid("maintenance margin fraction exceeds initial margin fraction");
        }
        if self.incremental_position_size <= 0 {
            return invalid("incremental position size must be positive");
        }
        if self.minimum_position_size < 0
            || self.minimum_position_size > self.baseline_position_size
            || self.baseline_position_size > self.maximum_position_size
        {
            return invalid("position sizes must satisfy 0 <= minimum <= baseline <= maximum");
        }
        Ok(())
    }

    /// Tiered initial margin fraction for a position of `position_size`.
    ///
    /// Flat up to the baseline size, then one increment per whole
    /// `incremental_position_size` beyond it.
    pub fn initial_margin_fraction_for(&self, position_size: Pips) -> Result<Pips, RiskError> {
        let size = numeric::abs(position_size)?;
        if size <= self.baseline_position_size {
            return Ok(self.initial_margin_fraction);
        }
        let excess = numeric::sub(size, self.baseline_position_size)?;
        let steps = excess
            .checked_div(self.incremental_position_size)
            .ok_or(RiskError::DivisionByZero)?;
        let increment = self
            .incremental_initial_margin_fraction
            .checked_mul(steps)
            .ok_or(RiskError::ArithmeticOverflow)?;
        numeric::add(self.initial_margin_fraction, increment)
    }
}

/// Market for one base asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub base_symbol: Symbol,
    pub is_active: bool,
    /// Latest validated index price; zero until the first publish
    pub index_price: Pips,
    pub index_price_timestamp: i64,
    /// Frozen when the market is deactivated; the settlement price for
    /// every subsequent liquidation in the market
    pub index_price_at_deactivation: Option<Pips>,
    pub fields: OverridableMarketFields,
}

impl Market {
    pub fn new(base_symbol: Symbol, fields: OverridableMarketFields) -> Self {
        Self {
            base_symbol,
            is_active: true,
            index_price: 0,
            index_price_timestamp: 0,
            index_price_at_deactivation: None,
            fields,
        }
    }

    pub fn has_price(&self) -> bool {
        self.index_price_timestamp > 0
    }
}
