//! Read-only engine state shared by the margin, liquidation and
//! deleveraging paths for the duration of one operation

use std::collections::HashSet;

use types::errors::RiskError;
use types::ids::{Symbol, WalletId, WalletRole};
use types::market::OverridableMarketFields;
use types::numeric::Pips;

use crate::config::{RiskEngineConfig, WalletRoles};
use crate::funding::FundingBook;
use crate::markets::MarketRegistry;
use crate::oracle::{self, PriceFeed};

#[derive(Clone, Copy)]
pub struct RiskContext<'a> {
    pub config: &'a RiskEngineConfig,
    pub roles: &'a WalletRoles,
    pub markets: &'a MarketRegistry,
    pub funding: &'a FundingBook,
    pub exited: &'a HashSet<WalletId>,
    pub feed: Option<&'a dyn PriceFeed>,
}

impl<'a> RiskContext<'a> {
    pub fn role_of(&self, wallet: WalletId) -> WalletRole {
        self.roles.role_of(wallet)
    }

    pub fn is_exited(&self, wallet: WalletId) -> bool {
        self.exited.contains(&wallet)
    }

    pub fn mark_price(&self, symbol: Symbol) -> Result<Pips, RiskError> {
        let market = self.markets.market(symbol)?;
        oracle::mark_price(market, self.config.pricing, self.feed, self.markets)
    }

    /// Risk fields governing `wallet` in `symbol`, honouring its role.
    pub fn fields_for(
        &self,
        symbol: Symbol,
        wallet: WalletId,
    ) -> Result<OverridableMarketFields, RiskError> {
        self.markets
            .resolve_for_role(symbol, wallet, self.role_of(wallet))
    }

    pub fn symbol_name(&self, symbol: Symbol) -> String {
        self.markets.name(symbol)
    }
}
