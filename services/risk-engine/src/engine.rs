//! Risk Engine: orchestrator
//!
//! Owns the ledger, market registry, funding book and exited-wallet set,
//! and runs every operation as one staged transaction: funding is settled,
//! margin is checked and positions are moved on a [`LedgerTxn`], and the
//! writes are committed only if the whole operation succeeds.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};
use types::balance::Balance;
use types::errors::RiskError;
use types::ids::{Symbol, WalletId};
use types::market::{Market, OverridableMarketFields};
use types::numeric::{self, Pips};
use types::risk::{
    DeleverageArguments, IndexPrice, LiquidationType, PositionLiquidationArguments,
    TradeSettlement, WalletLiquidationArguments,
};

use crate::config::{RiskEngineConfig, WalletRoles};
use crate::context::RiskContext;
use crate::deleveraging;
use crate::events::{RiskEvent, RiskEventType};
use crate::funding::{self, FundingBook, FundingHistory};
use crate::ledger::{BalanceView, Ledger, LedgerTxn, OpenPositionSet};
use crate::liquidation;
use crate::margin::{self, AccountSnapshot, MarginSummary};
use crate::markets::MarketRegistry;
use crate::oracle::{self, PriceFeed};
use crate::validator;

/// Engine behind the single-writer lock callers share between threads
pub type SharedRiskEngine = Arc<Mutex<RiskEngine>>;

/// Risk engine service
pub struct RiskEngine {
    config: RiskEngineConfig,
    roles: WalletRoles,
    ledger: Ledger,
    markets: MarketRegistry,
    funding: FundingBook,
    exited_wallets: HashSet<WalletId>,
    feed: Option<Box<dyn PriceFeed>>,
}

impl RiskEngine {
    pub fn new(config: RiskEngineConfig, roles: WalletRoles) -> Result<Self, RiskError> {
        config.validate()?;
        if roles.insurance_fund == roles.exit_fund {
            return Err(RiskError::Config {
                reason: "insurance fund and exit fund must be distinct wallets".to_string(),
            });
        }
        let mut markets = MarketRegistry::new();
        let quote_symbol = markets.intern(&config.quote_asset_symbol);
        Ok(Self {
            config,
            roles,
            ledger: Ledger::new(quote_symbol),
            markets,
            funding: FundingBook::new(),
            exited_wallets: HashSet::new(),
            feed: None,
        })
    }

    /// Attach the live price source used by [`PricingMode::OracleFeed`](crate::config::PricingMode).
    pub fn with_price_feed(mut self, feed: Box<dyn PriceFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn into_shared(self) -> SharedRiskEngine {
        Arc::new(Mutex::new(self))
    }

    pub fn config(&self) -> &RiskEngineConfig {
        &self.config
    }

    pub fn roles(&self) -> &WalletRoles {
        &self.roles
    }

    pub fn quote_symbol(&self) -> Symbol {
        self.ledger.quote_symbol()
    }

    /// Interned handle for a known symbol.
    pub fn symbol(&self, name: &str) -> Result<Symbol, RiskError> {
        self.markets.symbols().resolve(name)
    }

    // ── Transactions ─────────────────────────────────────────────────────

    /// Run `op` on a fresh transaction and commit its writes on success.
    fn transact<T>(
        &mut self,
        op: impl FnOnce(&RiskContext<'_>, &mut LedgerTxn<'_>) -> Result<T, RiskError>,
    ) -> Result<T, RiskError> {
        let (value, writes) = {
            let ctx = RiskContext {
                config: &self.config,
                roles: &self.roles,
                markets: &self.markets,
                funding: &self.funding,
                exited: &self.exited_wallets,
                feed: self.feed.as_deref(),
            };
            let mut txn = self.ledger.begin();
            match op(&ctx, &mut txn) {
                Ok(value) => (value, txn.into_writes()),
                Err(err) => {
                    if err.is_fatal() {
                        error!(%err, "Operation aborted, transaction discarded");
                    }
                    return Err(err);
                }
            }
        };
        if writes.is_empty() {
            debug!("Operation staged no ledger writes");
        } else {
            self.ledger.apply(writes);
        }
        Ok(value)
    }

    /// Run `op` on a transaction that is always discarded.
    fn inspect<T>(
        &self,
        op: impl FnOnce(&RiskContext<'_>, &mut LedgerTxn<'_>) -> Result<T, RiskError>,
    ) -> Result<T, RiskError> {
        let ctx = RiskContext {
            config: &self.config,
            roles: &self.roles,
            markets: &self.markets,
            funding: &self.funding,
            exited: &self.exited_wallets,
            feed: self.feed.as_deref(),
        };
        let mut txn = self.ledger.begin();
        op(&ctx, &mut txn)
    }

    // ── Governance ───────────────────────────────────────────────────────

    pub fn add_market(
        &mut self,
        base_symbol: &str,
        fields: OverridableMarketFields,
    ) -> Result<Symbol, RiskError> {
        if base_symbol == self.config.quote_asset_symbol {
            return Err(RiskError::InvalidMarketParameters {
                reason: format!("{base_symbol} is the quote asset"),
            });
        }
        self.markets.add_market(base_symbol, fields)
    }

    pub fn set_market_override(
        &mut self,
        symbol: Symbol,
        wallet: WalletId,
        fields: OverridableMarketFields,
    ) -> Result<(), RiskError> {
        self.markets.set_override(symbol, wallet, fields)
    }

    pub fn remove_market_override(&mut self, symbol: Symbol, wallet: WalletId) -> bool {
        self.markets.remove_override(symbol, wallet)
    }

    /// Freeze the market at its latest index price.
    pub fn deactivate_market(&mut self, symbol: Symbol) -> Result<Vec<RiskEvent>, RiskError> {
        let index_price = self.markets.deactivate(symbol)?;
        info!(
            symbol = %self.markets.name(symbol),
            index_price = %numeric::to_decimal(index_price),
            "Market deactivated"
        );
        Ok(vec![RiskEvent::for_market(RiskEventType::MarketDeactivated {
            symbol,
            index_price,
        })])
    }

    pub fn activate_market(&mut self, symbol: Symbol) -> Result<Vec<RiskEvent>, RiskError> {
        self.markets.activate(symbol)?;
        info!(symbol = %self.markets.name(symbol), "Market activated");
        Ok(vec![RiskEvent::for_market(RiskEventType::MarketActivated { symbol })])
    }

    // ── Prices and funding ───────────────────────────────────────────────

    /// Record an already signature-validated index price for `symbol`.
    pub fn publish_index_price(
        &mut self,
        symbol: Symbol,
        record: &IndexPrice,
    ) -> Result<(), RiskError> {
        oracle::ingest_index_price(&mut self.markets, symbol, record)
    }

    pub fn publish_funding_multiplier(
        &mut self,
        symbol: Symbol,
        index_price: Pips,
        funding_rate: Pips,
        timestamp: i64,
    ) -> Result<Vec<RiskEvent>, RiskError> {
        self.markets.active_market(symbol)?;
        let name = self.markets.name(symbol);
        let multiplier =
            self.funding
                .publish(symbol, &name, index_price, funding_rate, timestamp)?;
        Ok(vec![RiskEvent::for_market(
            RiskEventType::FundingMultiplierPublished {
                symbol,
                timestamp,
                multiplier,
            },
        )])
    }

    /// Settle all outstanding funding of `wallet` into its collateral.
    pub fn settle_funding(&mut self, wallet: WalletId) -> Result<Vec<RiskEvent>, RiskError> {
        let amount = self.transact(|ctx, txn| {
            funding::settle_wallet(txn, ctx.funding, wallet, &OpenPositionSet::new())
        })?;
        Ok(vec![RiskEvent::for_wallet(
            wallet,
            RiskEventType::FundingSettled { amount },
        )])
    }

    // ── Collateral and trades ────────────────────────────────────────────

    pub fn deposit_collateral(&mut self, wallet: WalletId, amount: Pips) -> Result<(), RiskError> {
        self.transact(|ctx, txn| validator::deposit(ctx, txn, wallet, amount))
    }

    pub fn withdraw_collateral(
        &mut self,
        wallet: WalletId,
        amount: Pips,
    ) -> Result<MarginSummary, RiskError> {
        self.transact(|ctx, txn| validator::withdraw(ctx, txn, wallet, amount))
    }

    pub fn settle_trade(
        &mut self,
        trade: &TradeSettlement,
    ) -> Result<[Option<MarginSummary>; 2], RiskError> {
        self.transact(|ctx, txn| validator::settle_trade(ctx, txn, trade))
    }

    // ── Wallet exit ──────────────────────────────────────────────────────

    /// Freeze a trader wallet; it can then only be liquidated via the exit
    /// flows or withdraw.
    pub fn exit_wallet(&mut self, wallet: WalletId) -> Result<Vec<RiskEvent>, RiskError> {
        if self.roles.role_of(wallet).is_fund() {
            return Err(RiskError::InvalidCounterparty {
                wallet: wallet.to_string(),
                reason: "funds cannot exit".to_string(),
            });
        }
        if !self.exited_wallets.insert(wallet) {
            return Err(RiskError::WalletExited {
                wallet: wallet.to_string(),
            });
        }
        info!(%wallet, "Wallet exited");
        Ok(vec![RiskEvent::for_wallet(wallet, RiskEventType::WalletExited)])
    }

    pub fn clear_wallet_exit(&mut self, wallet: WalletId) -> Result<Vec<RiskEvent>, RiskError> {
        if !self.exited_wallets.contains(&wallet) {
            return Err(RiskError::WalletNotExited {
                wallet: wallet.to_string(),
            });
        }
        if !self.ledger.open_positions(wallet).is_empty() {
            return Err(RiskError::WalletHasOpenPositions {
                wallet: wallet.to_string(),
            });
        }
        self.exited_wallets.remove(&wallet);
        info!(%wallet, "Wallet exit cleared");
        Ok(vec![RiskEvent::for_wallet(wallet, RiskEventType::WalletExitCleared)])
    }

    pub fn is_exited(&self, wallet: WalletId) -> bool {
        self.exited_wallets.contains(&wallet)
    }

    // ── Liquidation and deleveraging ─────────────────────────────────────

    pub fn liquidate_wallet(
        &mut self,
        args: &WalletLiquidationArguments,
    ) -> Result<Vec<RiskEvent>, RiskError> {
        let outcome = self
            .transact(|ctx, txn| liquidation::liquidate_wallet(ctx, txn, args))
            .inspect_err(|e| {
                warn!(wallet = %args.liquidating_wallet, error = %e, "Wallet liquidation rejected")
            })?;
        Ok(vec![RiskEvent::for_wallet(
            args.liquidating_wallet,
            RiskEventType::LiquidationExecuted {
                liquidation_type: args.liquidation_type,
                counterparty: outcome.counterparty,
                positions: outcome.closed,
                fee_quantity: outcome.fee_quantity,
            },
        )])
    }

    pub fn liquidate_position_in_deactivated_market(
        &mut self,
        args: &PositionLiquidationArguments,
    ) -> Result<Vec<RiskEvent>, RiskError> {
        let outcome = self
            .transact(|ctx, txn| {
                liquidation::liquidate_position_in_deactivated_market(ctx, txn, args)
            })
            .inspect_err(|e| {
                warn!(wallet = %args.liquidating_wallet, error = %e, "Position liquidation rejected")
            })?;
        Ok(vec![RiskEvent::for_wallet(
            args.liquidating_wallet,
            RiskEventType::LiquidationExecuted {
                liquidation_type: LiquidationType::PositionInDeactivatedMarket,
                counterparty: None,
                positions: outcome.closed,
                fee_quantity: outcome.fee_quantity,
            },
        )])
    }

    pub fn deleverage(&mut self, args: &DeleverageArguments) -> Result<Vec<RiskEvent>, RiskError> {
        let outcome = self
            .transact(|ctx, txn| deleveraging::deleverage(ctx, txn, args))
            .inspect_err(|e| {
                warn!(wallet = %args.liquidating_wallet, error = %e, "Deleverage rejected")
            })?;
        Ok(vec![RiskEvent::for_wallet(
            args.liquidating_wallet,
            RiskEventType::DeleverageExecuted {
                deleverage_type: args.deleverage_type,
                counterparty: outcome.counterparty,
                position: outcome.closed,
            },
        )])
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// Margin of `wallet` with outstanding funding applied (not committed).
    pub fn margin_summary(&self, wallet: WalletId) -> Result<MarginSummary, RiskError> {
        self.inspect(|ctx, txn| {
            funding::settle_wallet(txn, ctx.funding, wallet, &OpenPositionSet::new())?;
            margin::evaluate(ctx, &AccountSnapshot::load(&*txn, wallet))
        })
    }

    pub fn total_account_value(&self, wallet: WalletId) -> Result<Pips, RiskError> {
        Ok(self.margin_summary(wallet)?.total_account_value)
    }

    pub fn initial_margin_requirement(&self, wallet: WalletId) -> Result<Pips, RiskError> {
        Ok(self.margin_summary(wallet)?.initial_margin_requirement)
    }

    pub fn maintenance_margin_requirement(&self, wallet: WalletId) -> Result<Pips, RiskError> {
        Ok(self.margin_summary(wallet)?.maintenance_margin_requirement)
    }

    pub fn is_liquidatable(&self, wallet: WalletId) -> Result<bool, RiskError> {
        Ok(self.margin_summary(wallet)?.is_liquidatable())
    }

    pub fn balance(&self, wallet: WalletId, symbol: Symbol) -> Balance {
        self.ledger.load(wallet, symbol)
    }

    pub fn collateral(&self, wallet: WalletId) -> Pips {
        self.ledger.collateral(wallet)
    }

    pub fn open_positions(&self, wallet: WalletId) -> OpenPositionSet {
        self.ledger.open_positions(wallet)
    }

    pub fn market(&self, symbol: Symbol) -> Result<&Market, RiskError> {
        self.markets.market(symbol)
    }

    pub fn funding_history(&self, symbol: Symbol) -> Option<&FundingHistory> {
        self.funding.history(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> OverridableMarketFields {
        OverridableMarketFields {
            initial_margin_fraction: 10_000_000,
            maintenance_margin_fraction: 5_000_000,
            incremental_initial_margin_fraction: 1_000_000,
            baseline_position_size: 1_000_000_000,
            incremental_position_size: 500_000_000,
            maximum_position_size: 10_000_000_000,
            minimum_position_size: 1_000_000,
        }
    }

    fn engine() -> (RiskEngine, Symbol) {
        let roles = WalletRoles {
            insurance_fund: WalletId::new(),
            exit_fund: WalletId::new(),
            fee_wallet: WalletId::new(),
        };
        let mut engine = RiskEngine::new(RiskEngineConfig::default(), roles).unwrap();
        let eth = engine.add_market("ETH", fields()).unwrap();
        engine
            .publish_index_price(
                eth,
                &IndexPrice {
                    base_symbol: eth,
                    price: 10_000_000_000,
                    timestamp: 1,
                },
            )
            .unwrap();
        (engine, eth)
    }

    #[test]
    fn test_new_rejects_shared_fund_wallet() {
        let fund = WalletId::new();
        let roles = WalletRoles {
            insurance_fund: fund,
            exit_fund: fund,
            fee_wallet: WalletId::new(),
        };
        assert!(matches!(
            RiskEngine::new(RiskEngineConfig::default(), roles),
            Err(RiskError::Config { .. })
        ));
    }

    #[test]
    fn test_add_market_rejects_quote_asset() {
        let (mut engine, _) = engine();
        assert!(matches!(
            engine.add_market("USD", fields()),
            Err(RiskError::InvalidMarketParameters { .. })
        ));
        assert_eq!(engine.symbol("ETH").unwrap(), engine.symbol("ETH").unwrap());
        assert!(engine.symbol("BTC").is_err());
    }

    #[test]
    fn test_deposit_and_withdraw() {
        let (mut engine, _) = engine();
        let wallet = WalletId::new();
        engine.deposit_collateral(wallet, 1_000).unwrap();
        let summary = engine.withdraw_collateral(wallet, 400).unwrap();
        assert_eq!(summary.total_account_value, 600);
        assert_eq!(engine.collateral(wallet), 600);
    }

    #[test]
    fn test_rejected_withdrawal_leaves_no_trace() {
        let (mut engine, _) = engine();
        let wallet = WalletId::new();
        engine.deposit_collateral(wallet, 1_000).unwrap();
        let err = engine.withdraw_collateral(wallet, 1_001).unwrap_err();
        assert!(matches!(err, RiskError::MarginNotMet { .. }));
        assert_eq!(engine.collateral(wallet), 1_000);
    }

    #[test]
    fn test_exit_and_clear() {
        let (mut engine, _) = engine();
        let wallet = WalletId::new();
        engine.exit_wallet(wallet).unwrap();
        assert!(engine.is_exited(wallet));
        assert!(matches!(
            engine.exit_wallet(wallet),
            Err(RiskError::WalletExited { .. })
        ));
        assert!(matches!(
            engine.deposit_collateral(wallet, 1),
            Err(RiskError::WalletExited { .. })
        ));

        let events = engine.clear_wallet_exit(wallet).unwrap();
        assert_eq!(events[0].event_type, RiskEventType::WalletExitCleared);
        assert!(!engine.is_exited(wallet));
        assert!(matches!(
            engine.clear_wallet_exit(wallet),
            Err(RiskError::WalletNotExited { .. })
        ));
    }

    #[test]
    fn test_funds_cannot_exit() {
        let (mut engine, _) = engine();
        let fund = engine.roles().insurance_fund;
        assert!(matches!(
            engine.exit_wallet(fund),
            Err(RiskError::InvalidCounterparty { .. })
        ));
    }

    #[test]
    fn test_deactivate_and_activate_events() {
        let (mut engine, eth) = engine();
        let events = engine.deactivate_market(eth).unwrap();
        assert_eq!(
            events[0].event_type,
            RiskEventType::MarketDeactivated {
                symbol: eth,
                index_price: 10_000_000_000,
            }
        );
        assert_eq!(
            engine.market(eth).unwrap().index_price_at_deactivation,
            Some(10_000_000_000)
        );
        assert!(matches!(
            engine.publish_funding_multiplier(eth, 1, 1, 3_600_000),
            Err(RiskError::InactiveMarket { .. })
        ));

        engine.activate_market(eth).unwrap();
        assert_eq!(engine.market(eth).unwrap().index_price_at_deactivation, None);
    }

    #[test]
    fn test_unsupported_liquidation_type() {
        let (mut engine, _) = engine();
        let args = WalletLiquidationArguments {
            liquidation_type: LiquidationType::PositionInDeactivatedMarket,
            liquidating_wallet: WalletId::new(),
            liquidation_quote_quantities: Vec::new(),
        };
        assert!(matches!(
            engine.liquidate_wallet(&args),
            Err(RiskError::UnsupportedLiquidationType { .. })
        ));
    }
}
