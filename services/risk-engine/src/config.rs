//! Engine configuration and distinguished wallets

use serde::{Deserialize, Serialize};
use types::errors::{MarginRequirement, RiskError};
use types::ids::{WalletId, WalletRole};
use types::numeric::{Pips, PIP_SCALE};

/// Where mark prices come from when valuing positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PricingMode {
    /// Latest validated index price recorded on the market
    IndexPrice,
    /// Live read from a [`PriceFeed`](crate::oracle::PriceFeed) at call time
    OracleFeed,
}

/// Risk engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskEngineConfig {
    /// Collateral asset
    pub quote_asset_symbol: String,
    /// Allowed deviation of a supplied liquidation quote from the formula
    pub liquidation_quote_tolerance: Pips,
    /// Maximum deactivated-market liquidation fee as a fraction of the quote
    pub maximum_liquidation_fee_fraction: Pips,
    /// Requirement re-checked on a deleverage counterparty
    pub deleverage_counterparty_requirement: MarginRequirement,
    pub pricing: PricingMode,
}

impl Default for RiskEngineConfig {
    fn default() -> Self {
        Self {
            quote_asset_symbol: "USD".to_string(),
            liquidation_quote_tolerance: 1,
            maximum_liquidation_fee_fraction: 20_000_000,
            deleverage_counterparty_requirement: MarginRequirement::Initial,
            pricing: PricingMode::IndexPrice,
        }
    }
}

impl RiskEngineConfig {
    /// Load from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, RiskError> {
        let config: Self = serde_json::from_str(json).map_err(|e| RiskError::Config {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RiskError> {
        if self.quote_asset_symbol.is_empty() {
            return Err(RiskError::Config {
                reason: "quote asset symbol is empty".to_string(),
            });
        }
        if self.liquidation_quote_tolerance < 0 {
            return Err(RiskError::Config {
                reason: "liquidation quote tolerance is negative".to_string(),
            });
        }
        if !(0..=PIP_SCALE).contains(&self.maximum_liquidation_fee_fraction) {
            return Err(RiskError::Config {
                reason: "maximum liquidation fee fraction must lie in [0, 1]".to_string(),
            });
        }
        Ok(())
    }
}

/// Venue-owned wallets with special liquidation rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletRoles {
    pub insurance_fund: WalletId,
    pub exit_fund: WalletId,
    /// Receives deactivated-market liquidation fees
    pub fee_wallet: WalletId,
}

impl WalletRoles {
    pub fn role_of(&self, wallet: WalletId) -> WalletRole {
        if wallet == self.insurance_fund {
            WalletRole::InsuranceFund
        } else if wallet == self.exit_fund {
            WalletRole::ExitFund
        } else {
            WalletRole::Trader
        }
    }
}
