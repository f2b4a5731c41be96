//! Liquidation engine
//!
//! Validates caller-supplied quote quantities against the bankruptcy, exit
//! and deactivation-price formulas and moves positions to the liquidation
//! counterparty. Nothing here commits: every write is staged on the
//! caller's [`LedgerTxn`].

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use types::errors::{MarginRequirement, RiskError};
use types::ids::{Symbol, WalletId, WalletRole};
use types::numeric::{self, Pips, PIP_SCALE};
use types::risk::{LiquidationType, PositionLiquidationArguments, WalletLiquidationArguments};

use crate::context::RiskContext;
use crate::funding;
use crate::ledger::{BalanceView, LedgerTxn, OpenPositionSet};
use crate::margin::{self, AccountSnapshot, MarginSummary, PositionValuation};

/// One position closed out by a liquidation or deleverage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub symbol: Symbol,
    /// Signed quantity removed from the liquidating wallet
    pub quantity: Pips,
    pub quote_quantity: Pips,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationOutcome {
    pub counterparty: Option<WalletId>,
    pub closed: Vec<ClosedPosition>,
    pub fee_quantity: Pips,
}

// ── Quote formulas ───────────────────────────────────────────────────────

/// Quote quantity at which closing the position consumes its share of the
/// wallet's remaining equity.
///
/// `abs(notional - sign(position) * notional * mmf * TAV / TMMR)`: a long
/// sells at a discount and a short buys at a premium while equity is
/// positive, and the reverse once it is negative.
pub fn bankruptcy_quote(
    valuation: &PositionValuation,
    summary: &MarginSummary,
) -> Result<Pips, RiskError> {
    let penalty = if summary.maintenance_margin_requirement == 0 {
        0
    } else {
        numeric::multiply_by_fraction(
            numeric::multiply_by_fraction(
                valuation.notional,
                valuation.maintenance_margin_fraction,
                PIP_SCALE,
            )?,
            summary.total_account_value,
            summary.maintenance_margin_requirement,
        )?
    };
    let signed_penalty = if valuation.quantity < 0 {
        numeric::neg(penalty)?
    } else {
        penalty
    };
    numeric::abs(numeric::sub(valuation.notional, signed_penalty)?)
}

/// Signed value an exiting wallet realizes for a position: the worse of
/// its cost basis and the mark value.
pub fn exit_value(valuation: &PositionValuation) -> Pips {
    valuation.cost_basis.min(valuation.notional)
}

pub fn exit_quote(valuation: &PositionValuation) -> Result<Pips, RiskError> {
    numeric::abs(exit_value(valuation))
}

/// Account value of an exiting wallet if every position closed at its exit
/// value.
pub fn exit_account_value(
    collateral: Pips,
    valuations: &[PositionValuation],
) -> Result<Pips, RiskError> {
    valuations
        .iter()
        .try_fold(collateral, |total, v| numeric::add(total, exit_value(v)))
}

/// Quote for closing at the frozen or current mark price with no penalty.
pub fn index_quote(quantity: Pips, price: Pips) -> Result<Pips, RiskError> {
    numeric::abs(margin::position_notional(quantity, price)?)
}

/// Expected whole-wallet quotes, one per position in open-position order.
///
/// Exiting wallets close at exit values while those keep the account
/// non-negative, otherwise at bankruptcy quotes like a wallet in
/// maintenance.
pub fn expected_wallet_quotes(
    collateral: Pips,
    valuations: &[PositionValuation],
    summary: &MarginSummary,
    exited: bool,
) -> Result<Vec<Pips>, RiskError> {
    let use_exit = exited && exit_account_value(collateral, valuations)? >= 0;
    valuations
        .iter()
        .map(|v| {
            if use_exit {
                exit_quote(v)
            } else {
                bankruptcy_quote(v, summary)
            }
        })
        .collect()
}

/// Reject a supplied quote further than the configured tolerance from the
/// formula value.
pub fn validate_quote_quantity(
    ctx: &RiskContext<'_>,
    symbol: Symbol,
    expected: Pips,
    supplied: Pips,
) -> Result<(), RiskError> {
    let outside = supplied < 0
        || numeric::abs(numeric::sub(supplied, expected)?)? > ctx.config.liquidation_quote_tolerance;
    if outside {
        warn!(
            symbol = %ctx.symbol_name(symbol),
            expected = %numeric::to_decimal(expected),
            supplied = %numeric::to_decimal(supplied),
            "Liquidation quote outside tolerance"
        );
        return Err(RiskError::InvalidLiquidationPrice {
            symbol: ctx.symbol_name(symbol),
            expected,
            supplied,
        });
    }
    Ok(())
}

/// Check `quotes` against the expected whole-wallet quotes.
pub fn validate_wallet_quotes(
    ctx: &RiskContext<'_>,
    valuations: &[PositionValuation],
    expected: &[Pips],
    quotes: &[Pips],
) -> Result<(), RiskError> {
    if quotes.len() != valuations.len() {
        return Err(RiskError::LiquidationQuoteCountMismatch {
            expected: valuations.len(),
            received: quotes.len(),
        });
    }
    for ((valuation, &expected), &supplied) in valuations.iter().zip(expected).zip(quotes) {
        validate_quote_quantity(ctx, valuation.symbol, expected, supplied)?;
    }
    Ok(())
}

// ── Insurance fund capacity ──────────────────────────────────────────────

/// The insurance fund may hold `snapshot` only within its resolved maximum
/// position sizes and its initial margin requirement.
pub fn validate_insurance_fund_capacity(
    ctx: &RiskContext<'_>,
    snapshot: &AccountSnapshot,
) -> Result<MarginSummary, RiskError> {
    for (&symbol, balance) in &snapshot.positions {
        let maximum = ctx.fields_for(symbol, snapshot.wallet)?.maximum_position_size;
        if numeric::abs(balance.quantity)? > maximum {
            return Err(RiskError::MaximumPositionSizeExceeded {
                symbol: ctx.symbol_name(symbol),
                position: balance.quantity,
                maximum,
            });
        }
    }
    margin::validate_requirement(ctx, snapshot, MarginRequirement::Initial)
}

// ── Operations ───────────────────────────────────────────────────────────

/// Settle funding for the liquidating wallet and for the counterparty on
/// every market it is about to receive.
pub(crate) fn settle_participants(
    ctx: &RiskContext<'_>,
    txn: &mut LedgerTxn<'_>,
    liquidating: WalletId,
    counterparty: Option<WalletId>,
) -> Result<(), RiskError> {
    funding::settle_wallet(txn, ctx.funding, liquidating, &OpenPositionSet::new())?;
    if let Some(counterparty) = counterparty {
        let incoming = txn.open_positions(liquidating);
        funding::settle_wallet(txn, ctx.funding, counterparty, &incoming)?;
    }
    Ok(())
}

pub(crate) fn reject_fund(ctx: &RiskContext<'_>, wallet: WalletId) -> Result<(), RiskError> {
    if ctx.role_of(wallet).is_fund() {
        return Err(RiskError::CannotLiquidateFund {
            wallet: wallet.to_string(),
        });
    }
    Ok(())
}

/// Close every position of a wallet against the insurance fund (or the
/// exit fund during system recovery).
pub fn liquidate_wallet(
    ctx: &RiskContext<'_>,
    txn: &mut LedgerTxn<'_>,
    args: &WalletLiquidationArguments,
) -> Result<LiquidationOutcome, RiskError> {
    let wallet = args.liquidating_wallet;
    reject_fund(ctx, wallet)?;

    let exit_fund_open = !txn.open_positions(ctx.roles.exit_fund).is_empty();
    let counterparty = match args.liquidation_type {
        LiquidationType::WalletInMaintenance => {
            if exit_fund_open {
                return Err(RiskError::ExitFundHasOpenPositions);
            }
            ctx.roles.insurance_fund
        }
        LiquidationType::WalletInMaintenanceDuringSystemRecovery => {
            if !exit_fund_open {
                return Err(RiskError::ExitFundHasNoOpenPositions);
            }
            ctx.roles.exit_fund
        }
        LiquidationType::WalletExited => {
            if !ctx.is_exited(wallet) {
                return Err(RiskError::WalletNotExited {
                    wallet: wallet.to_string(),
                });
            }
            ctx.roles.insurance_fund
        }
        LiquidationType::PositionInDeactivatedMarket => {
            return Err(RiskError::UnsupportedLiquidationType {
                reason: "deactivated-market positions are liquidated one at a time".to_string(),
            });
        }
    };

    settle_participants(ctx, txn, wallet, Some(counterparty))?;

    let snapshot = AccountSnapshot::load(&*txn, wallet);
    if snapshot.positions.is_empty() {
        return Err(RiskError::NoOpenPosition {
            wallet: wallet.to_string(),
            symbol: "*".to_string(),
        });
    }
    let valuations = margin::value_positions(ctx, &snapshot)?;
    let summary = margin::summarize(snapshot.collateral, &valuations)?;
    let exited = args.liquidation_type == LiquidationType::WalletExited;
    if !exited && !summary.is_liquidatable() {
        return Err(RiskError::MaintenanceMarginMet {
            wallet: wallet.to_string(),
        });
    }

    let expected =
        expected_wallet_quotes(snapshot.collateral, &valuations, &summary, exited)?;
    validate_wallet_quotes(ctx, &valuations, &expected, &args.liquidation_quote_quantities)?;

    let mut closed = Vec::with_capacity(valuations.len());
    for (valuation, &quote) in valuations.iter().zip(&args.liquidation_quote_quantities) {
        // deactivated markets close only at their frozen price
        ctx.markets.active_market(valuation.symbol)?;
        txn.set_for_liquidation(wallet, Some(counterparty), valuation.symbol, 0, quote)?;
        closed.push(ClosedPosition {
            symbol: valuation.symbol,
            quantity: valuation.quantity,
            quote_quantity: quote,
        });
    }

    if ctx.role_of(counterparty) == WalletRole::InsuranceFund {
        validate_insurance_fund_capacity(ctx, &AccountSnapshot::load(&*txn, counterparty))?;
    }

    info!(
        %wallet,
        %counterparty,
        liquidation_type = ?args.liquidation_type,
        positions = closed.len(),
        account_value = %numeric::to_decimal(summary.total_account_value),
        margin_ratio = %summary.margin_ratio(),
        "Wallet liquidated"
    );
    Ok(LiquidationOutcome {
        counterparty: Some(counterparty),
        closed,
        fee_quantity: 0,
    })
}

/// Close one position in a deactivated market at the frozen price,
/// charging at most the configured fee fraction to the fee wallet.
pub fn liquidate_position_in_deactivated_market(
    ctx: &RiskContext<'_>,
    txn: &mut LedgerTxn<'_>,
    args: &PositionLiquidationArguments,
) -> Result<LiquidationOutcome, RiskError> {
    let wallet = args.liquidating_wallet;
    let symbol = args.base_symbol;
    reject_fund(ctx, wallet)?;

    let market = ctx.markets.market(symbol)?;
    let Some(price) = market.index_price_at_deactivation.filter(|_| !market.is_active) else {
        return Err(RiskError::MarketIsActive {
            symbol: ctx.symbol_name(symbol),
        });
    };

    let touched: OpenPositionSet = std::iter::once(symbol).collect();
    funding::settle_wallet(txn, ctx.funding, wallet, &touched)?;

    let position = txn.balance(wallet, symbol).quantity;
    if position == 0 {
        return Err(RiskError::NoOpenPosition {
            wallet: wallet.to_string(),
            symbol: ctx.symbol_name(symbol),
        });
    }

    let expected = index_quote(position, price)?;
    validate_quote_quantity(ctx, symbol, expected, args.liquidation_quote_quantity)?;

    let maximum = numeric::multiply_by_fraction(
        args.liquidation_quote_quantity,
        ctx.config.maximum_liquidation_fee_fraction,
        PIP_SCALE,
    )?;
    if args.fee_quantity < 0 || args.fee_quantity > maximum {
        return Err(RiskError::InvalidLiquidationFee {
            fee: args.fee_quantity,
            maximum,
        });
    }

    txn.set_for_liquidation(wallet, None, symbol, 0, args.liquidation_quote_quantity)?;
    if args.fee_quantity > 0 {
        txn.adjust_collateral(wallet, numeric::neg(args.fee_quantity)?)?;
        txn.adjust_collateral(ctx.roles.fee_wallet, args.fee_quantity)?;
    }

    debug!(
        %wallet,
        symbol = %ctx.symbol_name(symbol),
        price = %numeric::to_decimal(price),
        fee = %numeric::to_decimal(args.fee_quantity),
        "Deactivated-market position closed"
    );
    Ok(LiquidationOutcome {
        counterparty: None,
        closed: vec![ClosedPosition {
            symbol,
            quantity: position,
            quote_quantity: args.liquidation_quote_quantity,
        }],
        fee_quantity: args.fee_quantity,
    })
}

// ── Tests ────────────────────────────────────────────────────────────────
