//! Auto-deleveraging scenarios

mod common;

use common::{Venue, UNIT};
use risk_engine::{RiskEngineConfig, RiskEventType};
use types::errors::{MarginRequirement, RiskError};
use types::ids::WalletId;
use types::risk::{DeleverageArguments, DeleverageType};

/// Long one ETH at 100 on 10 of collateral, short side well funded, price
/// then drops to 94 (TAV 4, MMR 4.7, bankruptcy quote 90).
fn distressed_long(venue: &mut Venue) -> (WalletId, WalletId) {
    let long = venue.trader(10 * UNIT);
    let short = venue.trader(1_000 * UNIT);
    venue.open(long, short, UNIT, 100 * UNIT);
    venue.set_price(94 * UNIT);
    (long, short)
}

fn acquisition(
    venue: &Venue,
    liquidating: WalletId,
    counterparty: WalletId,
    quantity: i64,
    quote: i64,
) -> DeleverageArguments {
    DeleverageArguments {
        deleverage_type: DeleverageType::InMaintenanceAcquisition,
        liquidating_wallet: liquidating,
        counterparty_wallet: counterparty,
        base_symbol: venue.eth,
        liquidation_base_quantity: quantity,
        liquidation_quote_quantity: quote,
        liquidation_quote_quantities: vec![90 * UNIT],
    }
}

#[test]
fn test_rejected_while_insurance_fund_can_acquire() {
    let mut venue = Venue::new();
    let (long, short) = distressed_long(&mut venue);
    venue.fund(venue.insurance_fund, 100 * UNIT);

    let err = venue
        .engine
        .deleverage(&acquisition(&venue, long, short, UNIT, 90 * UNIT))
        .unwrap_err();
    assert_eq!(err, RiskError::InsuranceFundCanAcquire);
    assert_eq!(venue.position(long), UNIT);
}

#[test]
fn test_partial_acquisition_against_counterparty() {
    let mut venue = Venue::new();
    let (long, short) = distressed_long(&mut venue);

    // unfunded insurance fund fails initial margin on the simulated take-over
    let events = venue
        .engine
        .deleverage(&acquisition(&venue, long, short, UNIT / 2, 45 * UNIT))
        .unwrap();

    assert_eq!(venue.position(long), UNIT / 2);
    assert_eq!(venue.position(short), -UNIT / 2);
    assert_eq!(venue.collateral(long), -45 * UNIT);
    assert_eq!(venue.collateral(short), 1_055 * UNIT);
    assert_eq!(venue.position(venue.insurance_fund), 0);

    match &events[0].event_type {
        RiskEventType::DeleverageExecuted {
            counterparty,
            position,
            ..
        } => {
            assert_eq!(*counterparty, short);
            assert_eq!(position.quantity, UNIT / 2);
            assert_eq!(position.quote_quantity, 45 * UNIT);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn test_maximum_position_size_forces_deleverage() {
    let mut venue = Venue::new();
    let (long, short) = distressed_long(&mut venue);
    venue.fund(venue.insurance_fund, 10_000 * UNIT);

    let mut capped = common::eth_fields();
    capped.baseline_position_size = UNIT / 2;
    capped.maximum_position_size = UNIT / 2;
    venue
        .engine
        .set_market_override(venue.eth, venue.insurance_fund, capped)
        .unwrap();

    venue
        .engine
        .deleverage(&acquisition(&venue, long, short, UNIT, 90 * UNIT))
        .unwrap();
    assert_eq!(venue.position(long), 0);
    assert_eq!(venue.collateral(long), 0);

    // lifting the cap hands the fund back first refusal
    venue.set_price(100 * UNIT);
    let (long, short) = distressed_long(&mut venue);
    assert!(venue.engine.remove_market_override(venue.eth, venue.insurance_fund));
    let err = venue
        .engine
        .deleverage(&acquisition(&venue, long, short, UNIT, 90 * UNIT))
        .unwrap_err();
    assert_eq!(err, RiskError::InsuranceFundCanAcquire);
}

#[test]
fn test_quote_is_pro_rated_bankruptcy_quote() {
    let mut venue = Venue::new();
    let (long, short) = distressed_long(&mut venue);

    let err = venue
        .engine
        .deleverage(&acquisition(&venue, long, short, UNIT / 4, 23 * UNIT))
        .unwrap_err();
    assert_eq!(
        err,
        RiskError::InvalidLiquidationPrice {
            symbol: "ETH".to_string(),
            expected: 2_250_000_000,
            supplied: 23 * UNIT,
        }
    );
}

#[test]
fn test_counterparty_must_offset() {
    let mut venue = Venue::new();
    let (long, short) = distressed_long(&mut venue);
    let other_long = venue.trader(1_000 * UNIT);
    venue.open(other_long, short, UNIT, 94 * UNIT);

    let err = venue
        .engine
        .deleverage(&acquisition(&venue, long, other_long, UNIT, 90 * UNIT))
        .unwrap_err();
    assert!(matches!(err, RiskError::InvalidCounterparty { .. }));

    for counterparty in [long, venue.insurance_fund, venue.exit_fund] {
        let err = venue
            .engine
            .deleverage(&acquisition(&venue, long, counterparty, UNIT, 90 * UNIT))
            .unwrap_err();
        assert!(matches!(err, RiskError::InvalidCounterparty { .. }));
    }
}

#[test]
fn test_quantity_bounds() {
    let mut venue = Venue::new();
    let (long, short) = distressed_long(&mut venue);
    for quantity in [0, -UNIT, 2 * UNIT] {
        let err = venue
            .engine
            .deleverage(&acquisition(&venue, long, short, quantity, 90 * UNIT))
            .unwrap_err();
        assert!(matches!(err, RiskError::InvalidDeleverageQuantity { .. }));
    }
}

#[test]
fn test_healthy_wallet_cannot_be_deleveraged() {
    let mut venue = Venue::new();
    let (long, short) = distressed_long(&mut venue);
    venue.set_price(100 * UNIT);
    let err = venue
        .engine
        .deleverage(&acquisition(&venue, long, short, UNIT, 90 * UNIT))
        .unwrap_err();
    assert!(matches!(err, RiskError::MaintenanceMarginMet { .. }));
}

#[test]
fn test_exit_acquisition_requires_exit() {
    let mut venue = Venue::new();
    let (long, short) = distressed_long(&mut venue);
    // cost 100 against mark 94 leaves the exit value at 94 and equity at 4
    let mut args = acquisition(&venue, long, short, UNIT, 94 * UNIT);
    args.deleverage_type = DeleverageType::ExitAcquisition;
    args.liquidation_quote_quantities = vec![94 * UNIT];

    let err = venue.engine.deleverage(&args).unwrap_err();
    assert!(matches!(err, RiskError::WalletNotExited { .. }));

    venue.engine.exit_wallet(long).unwrap();
    venue.engine.deleverage(&args).unwrap();
    assert_eq!(venue.position(long), 0);
}

// ── Fund closures ──

/// Insurance fund long one ETH bought at 200 while the index is 100.
fn insurance_fund_position(venue: &mut Venue) {
    let insurance_fund = venue.insurance_fund;
    venue.fund(insurance_fund, 200 * UNIT);
    let seller = venue.trader(100 * UNIT);
    venue.open(insurance_fund, seller, UNIT, 200 * UNIT);
}

fn closure(
    venue: &Venue,
    deleverage_type: DeleverageType,
    liquidating: WalletId,
    counterparty: WalletId,
    quantity: i64,
    quote: i64,
) -> DeleverageArguments {
    DeleverageArguments {
        deleverage_type,
        liquidating_wallet: liquidating,
        counterparty_wallet: counterparty,
        base_symbol: venue.eth,
        liquidation_base_quantity: quantity,
        liquidation_quote_quantity: quote,
        liquidation_quote_quantities: Vec::new(),
    }
}

#[test]
fn test_insurance_fund_closure_at_cost_basis() {
    let mut venue = Venue::new();
    insurance_fund_position(&mut venue);
    let short = venue.trader(1_000 * UNIT);
    let buyer = venue.trader(1_000 * UNIT);
    venue.open(buyer, short, UNIT, 100 * UNIT);

    let insurance_fund = venue.insurance_fund;
    venue
        .engine
        .deleverage(&closure(
            &venue,
            DeleverageType::InsuranceFundClosure,
            insurance_fund,
            short,
            UNIT / 2,
            100 * UNIT,
        ))
        .unwrap();
    assert_eq!(venue.position(insurance_fund), UNIT / 2);
    assert_eq!(venue.engine.balance(insurance_fund, venue.eth).cost_basis, 100 * UNIT);
    assert_eq!(venue.position(short), -UNIT / 2);
}

#[test]
fn test_closure_must_target_its_fund() {
    let mut venue = Venue::new();
    let (long, short) = distressed_long(&mut venue);
    let err = venue
        .engine
        .deleverage(&closure(
            &venue,
            DeleverageType::InsuranceFundClosure,
            long,
            short,
            UNIT,
            90 * UNIT,
        ))
        .unwrap_err();
    assert!(matches!(err, RiskError::UnsupportedLiquidationType { .. }));
}

#[test]
fn test_counterparty_must_stay_margined() {
    let mut venue = Venue::new();
    insurance_fund_position(&mut venue);
    // short at 100 with exactly the initial margin
    let short = venue.trader(10 * UNIT);
    let buyer = venue.trader(1_000 * UNIT);
    venue.open(buyer, short, UNIT, 100 * UNIT);

    // paying the fund's 200 cost basis leaves the short at -90
    let insurance_fund = venue.insurance_fund;
    let args = closure(
        &venue,
        DeleverageType::InsuranceFundClosure,
        insurance_fund,
        short,
        UNIT,
        200 * UNIT,
    );
    let err = venue.engine.deleverage(&args).unwrap_err();
    assert_eq!(
        err,
        RiskError::MarginNotMet {
            wallet: short.to_string(),
            requirement: MarginRequirement::Initial,
            account_value: -90 * UNIT,
            required: 0,
        }
    );
    assert_eq!(venue.position(insurance_fund), UNIT);
    assert_eq!(venue.position(short), -UNIT);
}

#[test]
fn test_counterparty_requirement_is_configurable() {
    // after paying 100 for half a unit the short holds -0.5 at 100 with
    // TAV 3: above maintenance (2.5), below initial (5)
    let run = |requirement: MarginRequirement| {
        let mut venue = Venue::with_config(RiskEngineConfig {
            deleverage_counterparty_requirement: requirement,
            ..RiskEngineConfig::default()
        });
        insurance_fund_position(&mut venue);
        let short = venue.trader(53 * UNIT);
        let buyer = venue.trader(1_000 * UNIT);
        venue.open(buyer, short, UNIT, 100 * UNIT);
        let insurance_fund = venue.insurance_fund;
        let args = closure(
            &venue,
            DeleverageType::InsuranceFundClosure,
            insurance_fund,
            short,
            UNIT / 2,
            100 * UNIT,
        );
        venue.engine.deleverage(&args).map(|_| venue.position(short))
    };

    assert!(matches!(
        run(MarginRequirement::Initial),
        Err(RiskError::MarginNotMet {
            requirement: MarginRequirement::Initial,
            ..
        })
    ));
    assert_eq!(run(MarginRequirement::Maintenance).unwrap(), -UNIT / 2);
}

#[test]
fn test_exit_fund_closure_at_exit_fund_bankruptcy_price() {
    let mut venue = Venue::new();
    let exit_fund = venue.exit_fund;
    let seller = venue.trader(100 * UNIT);
    venue.open(exit_fund, seller, UNIT, 100 * UNIT);
    let short = venue.trader(10 * UNIT);
    let buyer = venue.trader(1_000 * UNIT);
    venue.open(buyer, short, UNIT, 100 * UNIT);
    venue.set_price(94 * UNIT);

    // exit fund TAV -6, MMR 4.7 at market defaults: closes at 100
    venue
        .engine
        .deleverage(&closure(
            &venue,
            DeleverageType::ExitFundClosure,
            exit_fund,
            short,
            UNIT,
            100 * UNIT,
        ))
        .unwrap();
    assert_eq!(venue.position(exit_fund), 0);
    assert_eq!(venue.collateral(exit_fund), 0);
    assert_eq!(venue.position(short), 0);
    assert_eq!(venue.collateral(short), 10 * UNIT);
}
