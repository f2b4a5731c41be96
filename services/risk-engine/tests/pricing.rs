//! Oracle-feed pricing
//!
//! With `PricingMode::OracleFeed` margin is valued from the attached feed
//! at call time, not from the recorded index price.

mod common;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use common::{eth_fields, init_tracing, UNIT};
use risk_engine::oracle::PriceFeed;
use risk_engine::{PricingMode, RiskEngine, RiskEngineConfig, WalletRoles};
use types::errors::RiskError;
use types::ids::{Symbol, WalletId};
use types::numeric::Pips;
use types::risk::{IndexPrice, TradeSettlement};

struct SharedFeed(Arc<AtomicI64>);

impl PriceFeed for SharedFeed {
    fn latest_price(&self, _symbol: Symbol) -> Option<Pips> {
        Some(self.0.load(Ordering::SeqCst))
    }
}

fn feed_config() -> RiskEngineConfig {
    RiskEngineConfig {
        pricing: PricingMode::OracleFeed,
        ..RiskEngineConfig::default()
    }
}

fn roles() -> WalletRoles {
    WalletRoles {
        insurance_fund: WalletId::new(),
        exit_fund: WalletId::new(),
        fee_wallet: WalletId::new(),
    }
}

fn setup(engine: &mut RiskEngine) -> Symbol {
    let eth = engine.add_market("ETH", eth_fields()).unwrap();
    engine
        .publish_index_price(
            eth,
            &IndexPrice {
                base_symbol: eth,
                price: 100 * UNIT,
                timestamp: 1,
            },
        )
        .unwrap();
    eth
}

fn one_unit_at_100(eth: Symbol, long: WalletId, short: WalletId) -> TradeSettlement {
    TradeSettlement {
        buy_wallet: long,
        sell_wallet: short,
        base_symbol: eth,
        base_quantity: UNIT,
        quote_quantity: 100 * UNIT,
    }
}

#[test]
fn test_margin_follows_feed_not_index_price() {
    init_tracing();
    let price = Arc::new(AtomicI64::new(100 * UNIT));
    let mut engine = RiskEngine::new(feed_config(), roles())
        .unwrap()
        .with_price_feed(Box::new(SharedFeed(Arc::clone(&price))));
    let eth = setup(&mut engine);

    let long = WalletId::new();
    let short = WalletId::new();
    engine.deposit_collateral(long, 10 * UNIT).unwrap();
    engine.deposit_collateral(short, 1_000 * UNIT).unwrap();
    engine.settle_trade(&one_unit_at_100(eth, long, short)).unwrap();
    assert!(!engine.is_liquidatable(long).unwrap());

    // index price stays at 100; only the feed moves
    price.store(94 * UNIT, Ordering::SeqCst);
    let summary = engine.margin_summary(long).unwrap();
    assert_eq!(summary.total_account_value, 4 * UNIT);
    assert_eq!(summary.maintenance_margin_requirement, 470_000_000);
    assert!(summary.is_liquidatable());
    assert_eq!(engine.market(eth).unwrap().index_price, 100 * UNIT);
}

#[test]
fn test_feed_mode_without_feed_rejects_valuation() {
    init_tracing();
    let mut engine = RiskEngine::new(feed_config(), roles()).unwrap();
    let eth = setup(&mut engine);

    let long = WalletId::new();
    let short = WalletId::new();
    engine.deposit_collateral(long, 10 * UNIT).unwrap();
    engine.deposit_collateral(short, 1_000 * UNIT).unwrap();
    let err = engine
        .settle_trade(&one_unit_at_100(eth, long, short))
        .unwrap_err();
    assert!(matches!(err, RiskError::Config { .. }));
    assert_eq!(engine.balance(long, eth).quantity, 0);
}
