//! Market and override resolution
//!
//! Holds market definitions supplied by governance, per-wallet overrides of
//! their risk fields, and the symbol table that names them. The engine
//! writes only the index price fields and the deactivation snapshot.

use std::collections::HashMap;

use tracing::info;
use types::errors::RiskError;
use types::ids::{Symbol, SymbolTable, WalletId, WalletRole};
use types::market::{Market, OverridableMarketFields};
use types::numeric::Pips;

#[derive(Debug, Clone, Default)]
pub struct MarketRegistry {
    symbols: SymbolTable,
    markets: HashMap<Symbol, Market>,
    overrides: HashMap<(Symbol, WalletId), OverridableMarketFields>,
}

impl MarketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn intern(&mut self, name: &str) -> Symbol {
        self.symbols.intern(name)
    }

    /// Display name for error messages and logs.
    pub fn name(&self, symbol: Symbol) -> String {
        self.symbols.name(symbol).to_string()
    }

    // ── Governance ──

    pub fn add_market(
        &mut self,
        base_symbol: &str,
        fields: OverridableMarketFields,
    ) -> Result<Symbol, RiskError> {
        fields.validate()?;
        let symbol = self.symbols.intern(base_symbol);
        if self.markets.contains_key(&symbol) {
            return Err(RiskError::MarketAlreadyExists {
                symbol: base_symbol.to_string(),
            });
        }
        self.markets.insert(symbol, Market::new(symbol, fields));
        info!(symbol = base_symbol, "Market added");
        Ok(symbol)
    }

    /// Replace the market's fields for one wallet (no field-level merge).
    pub fn set_override(
        &mut self,
        symbol: Symbol,
        wallet: WalletId,
        fields: OverridableMarketFields,
    ) -> Result<(), RiskError> {
        self.market(symbol)?;
        fields.validate()?;
        self.overrides.insert((symbol, wallet), fields);
        info!(symbol = %self.symbols.name(symbol), %wallet, "Market override set");
        Ok(())
    }

    pub fn remove_override(&mut self, symbol: Symbol, wallet: WalletId) -> bool {
        self.overrides.remove(&(symbol, wallet)).is_some()
    }

    /// Freeze the current index price and stop the market trading.
    pub fn deactivate(&mut self, symbol: Symbol) -> Result<Pips, RiskError> {
        let name = self.name(symbol);
        let market = self.market_mut(symbol)?;
        if !market.is_active {
            return Err(RiskError::InactiveMarket { symbol: name });
        }
        if !market.has_price() {
            return Err(RiskError::MissingPrice { symbol: name });
        }
        market.is_active = false;
        market.index_price_at_deactivation = Some(market.index_price);
        Ok(market.index_price)
    }

    pub fn activate(&mut self, symbol: Symbol) -> Result<(), RiskError> {
        let name = self.name(symbol);
        let market = self.market_mut(symbol)?;
        if market.is_active {
            return Err(RiskError::MarketIsActive { symbol: name });
        }
        market.is_active = true;
        market.index_price_at_deactivation = None;
        Ok(())
    }

    // ── Lookup ──

    pub fn market(&self, symbol: Symbol) -> Result<&Market, RiskError> {
        self.markets.get(&symbol).ok_or_else(|| RiskError::MarketNotFound {
            symbol: self.name(symbol),
        })
    }

    pub(crate) fn market_mut(&mut self, symbol: Symbol) -> Result<&mut Market, RiskError> {
        let name = self.symbols.name(symbol).to_string();
        self.markets
            .get_mut(&symbol)
            .ok_or(RiskError::MarketNotFound { symbol: name })
    }

    pub fn active_market(&self, symbol: Symbol) -> Result<&Market, RiskError> {
        let market = self.market(symbol)?;
        if !market.is_active {
            return Err(RiskError::InactiveMarket {
                symbol: self.name(symbol),
            });
        }
        Ok(market)
    }

    /// Effective risk fields for a wallet: its override if present, else
    /// the market default.
    pub fn resolve(
        &self,
        symbol: Symbol,
        wallet: WalletId,
    ) -> Result<OverridableMarketFields, RiskError> {
        let market = self.market(symbol)?;
        Ok(self
            .overrides
            .get(&(symbol, wallet))
            .copied()
            .unwrap_or(market.fields))
    }

    /// As [`resolve`](Self::resolve), except the exit fund always gets the
    /// market default.
    pub fn resolve_for_role(
        &self,
        symbol: Symbol,
        wallet: WalletId,
        role: WalletRole,
    ) -> Result<OverridableMarketFields, RiskError> {
        match role {
            WalletRole::ExitFund => Ok(self.market(symbol)?.fields),
            WalletRole::Trader | WalletRole::InsuranceFund => self.resolve(symbol, wallet),
        }
    }
}
