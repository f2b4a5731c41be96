//! Shared venue fixture for the scenario tests

#![allow(dead_code)]

use risk_engine::{RiskEngine, RiskEngineConfig, WalletRoles};
use types::ids::{Symbol, WalletId};
use types::market::OverridableMarketFields;
use types::numeric::{self, Pips, PIP_SCALE};
use types::risk::{IndexPrice, TradeSettlement};

/// One whole unit of base or quote asset
pub const UNIT: Pips = PIP_SCALE;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// 10% initial, 5% maintenance, 100 unit maximum
pub fn eth_fields() -> OverridableMarketFields {
    OverridableMarketFields {
        initial_margin_fraction: 10_000_000,
        maintenance_margin_fraction: 5_000_000,
        incremental_initial_margin_fraction: 1_000_000,
        baseline_position_size: 10 * UNIT,
        incremental_position_size: 5 * UNIT,
        maximum_position_size: 100 * UNIT,
        minimum_position_size: 1_000_000,
    }
}

pub struct Venue {
    pub engine: RiskEngine,
    pub eth: Symbol,
    pub insurance_fund: WalletId,
    pub exit_fund: WalletId,
    pub fee_wallet: WalletId,
    price_timestamp: i64,
}

impl Venue {
    /// ETH market priced at 100.
    pub fn new() -> Self {
        Self::with_config(RiskEngineConfig::default())
    }

    pub fn with_config(config: RiskEngineConfig) -> Self {
        init_tracing();
        let roles = WalletRoles {
            insurance_fund: WalletId::new(),
            exit_fund: WalletId::new(),
            fee_wallet: WalletId::new(),
        };
        let mut engine = RiskEngine::new(config, roles).unwrap();
        let eth = engine.add_market("ETH", eth_fields()).unwrap();
        let mut venue = Self {
            engine,
            eth,
            insurance_fund: roles.insurance_fund,
            exit_fund: roles.exit_fund,
            fee_wallet: roles.fee_wallet,
            price_timestamp: 0,
        };
        venue.set_price(100 * UNIT);
        venue
    }

    pub fn set_price(&mut self, price: Pips) {
        self.price_timestamp += 1;
        self.engine
            .publish_index_price(
                self.eth,
                &IndexPrice {
                    base_symbol: self.eth,
                    price,
                    timestamp: self.price_timestamp,
                },
            )
            .unwrap();
    }

    pub fn trader(&mut self, deposit: Pips) -> WalletId {
        let wallet = WalletId::new();
        if deposit > 0 {
            self.engine.deposit_collateral(wallet, deposit).unwrap();
        }
        wallet
    }

    pub fn fund(&mut self, wallet: WalletId, deposit: Pips) {
        self.engine.deposit_collateral(wallet, deposit).unwrap();
    }

    /// Trade `quantity` from `short` to `long` at `price`.
    pub fn open(&mut self, long: WalletId, short: WalletId, quantity: Pips, price: Pips) {
        self.engine
            .settle_trade(&self.trade(long, short, quantity, price))
            .unwrap();
    }

    pub fn trade(
        &self,
        buy: WalletId,
        sell: WalletId,
        quantity: Pips,
        price: Pips,
    ) -> TradeSettlement {
        TradeSettlement {
            buy_wallet: buy,
            sell_wallet: sell,
            base_symbol: self.eth,
            base_quantity: quantity,
            quote_quantity: numeric::multiply_by_fraction(quantity, price, PIP_SCALE).unwrap(),
        }
    }

    pub fn position(&self, wallet: WalletId) -> Pips {
        self.engine.balance(wallet, self.eth).quantity
    }

    pub fn collateral(&self, wallet: WalletId) -> Pips {
        self.engine.collateral(wallet)
    }
}
