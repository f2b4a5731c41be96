//! Deleveraging (ADL) engine
//!
//! Forced partial closure of a position against a healthy trader holding
//! the offsetting side. The acquisition flows are only open once the
//! insurance fund has been shown unable to absorb the whole wallet; the
//! closure flows wind down the funds' own positions.

use tracing::{debug, info};
use types::errors::RiskError;
use types::ids::{Symbol, WalletId};
use types::numeric::{self, Pips};
use types::risk::{DeleverageArguments, DeleverageType};

use crate::context::RiskContext;
use crate::funding;
use crate::ledger::{BalanceView, LedgerTxn};
use crate::liquidation::{self, ClosedPosition};
use crate::margin::{self, AccountSnapshot, MarginSummary, PositionValuation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleverageOutcome {
    pub counterparty: WalletId,
    pub closed: ClosedPosition,
    pub counterparty_margin: MarginSummary,
}

/// `full_quote` pro-rated to `quantity` out of `position`.
pub fn partial_quote(full_quote: Pips, quantity: Pips, position: Pips) -> Result<Pips, RiskError> {
    numeric::multiply_by_fraction(full_quote, quantity, numeric::abs(position)?)
}

/// Require the insurance fund to be unable to take every position of the
/// liquidating wallet at `quotes`.
///
/// The fund's account is simulated with each position and quote moved in;
/// it cannot acquire when some resolved maximum position size is exceeded
/// or the result is below its initial margin requirement.
pub fn validate_insurance_fund_cannot_acquire(
    ctx: &RiskContext<'_>,
    view: &dyn BalanceView,
    valuations: &[PositionValuation],
    quotes: &[Pips],
) -> Result<(), RiskError> {
    let mut simulated = AccountSnapshot::load(view, ctx.roles.insurance_fund);
    for (valuation, &quote) in valuations.iter().zip(quotes) {
        // the fund pays for longs and is paid for shorts
        let quote_delta = if valuation.quantity > 0 {
            numeric::neg(quote)?
        } else {
            quote
        };
        simulated.transfer_in(valuation.symbol, valuation.quantity, quote_delta)?;
    }

    match liquidation::validate_insurance_fund_capacity(ctx, &simulated) {
        Ok(_) => Err(RiskError::InsuranceFundCanAcquire),
        Err(
            reason @ (RiskError::MaximumPositionSizeExceeded { .. }
            | RiskError::MarginNotMet { .. }),
        ) => {
            debug!(%reason, "Insurance fund cannot acquire");
            Ok(())
        }
        Err(other) => Err(other),
    }
}

fn find_valuation(
    ctx: &RiskContext<'_>,
    wallet: WalletId,
    symbol: Symbol,
    valuations: &[PositionValuation],
) -> Result<(usize, PositionValuation), RiskError> {
    valuations
        .iter()
        .position(|v| v.symbol == symbol)
        .map(|i| (i, valuations[i]))
        .ok_or_else(|| RiskError::NoOpenPosition {
            wallet: wallet.to_string(),
            symbol: ctx.symbol_name(symbol),
        })
}

/// Whole-position quote the liquidating side would settle `symbol` at.
fn full_position_quote(
    ctx: &RiskContext<'_>,
    txn: &mut LedgerTxn<'_>,
    args: &DeleverageArguments,
) -> Result<Pips, RiskError> {
    let wallet = args.liquidating_wallet;
    match args.deleverage_type {
        DeleverageType::InMaintenanceAcquisition | DeleverageType::ExitAcquisition => {
            let exited = args.deleverage_type == DeleverageType::ExitAcquisition;
            let incoming = txn.open_positions(wallet);
            funding::settle_wallet(txn, ctx.funding, ctx.roles.insurance_fund, &incoming)?;

            let snapshot = AccountSnapshot::load(&*txn, wallet);
            let valuations = margin::value_positions(ctx, &snapshot)?;
            let summary = margin::summarize(snapshot.collateral, &valuations)?;
            if !exited && !summary.is_liquidatable() {
                return Err(RiskError::MaintenanceMarginMet {
                    wallet: wallet.to_string(),
                });
            }
            let expected = liquidation::expected_wallet_quotes(
                snapshot.collateral,
                &valuations,
                &summary,
                exited,
            )?;
            liquidation::validate_wallet_quotes(
                ctx,
                &valuations,
                &expected,
                &args.liquidation_quote_quantities,
            )?;
            validate_insurance_fund_cannot_acquire(
                ctx,
                &*txn,
                &valuations,
                &args.liquidation_quote_quantities,
            )?;
            let (index, _) = find_valuation(ctx, wallet, args.base_symbol, &valuations)?;
            Ok(expected[index])
        }
        DeleverageType::InsuranceFundClosure => {
            Ok(numeric::abs(txn.balance(wallet, args.base_symbol).cost_basis)?)
        }
        DeleverageType::ExitFundClosure => {
            let snapshot = AccountSnapshot::load(&*txn, wallet);
            let valuations = margin::value_positions(ctx, &snapshot)?;
            let summary = margin::summarize(snapshot.collateral, &valuations)?;
            let (_, valuation) = find_valuation(ctx, wallet, args.base_symbol, &valuations)?;
            liquidation::bankruptcy_quote(&valuation, &summary)
        }
    }
}

fn validate_roles(ctx: &RiskContext<'_>, args: &DeleverageArguments) -> Result<(), RiskError> {
    let wallet = args.liquidating_wallet;
    let counterparty = args.counterparty_wallet;
    if counterparty == wallet || ctx.role_of(counterparty).is_fund() {
        return Err(RiskError::InvalidCounterparty {
            wallet: counterparty.to_string(),
            reason: "must be a trader wallet other than the liquidating wallet".to_string(),
        });
    }
    if ctx.is_exited(counterparty) {
        return Err(RiskError::InvalidCounterparty {
            wallet: counterparty.to_string(),
            reason: "wallet has exited".to_string(),
        });
    }

    match args.deleverage_type {
        DeleverageType::InMaintenanceAcquisition => liquidation::reject_fund(ctx, wallet),
        DeleverageType::ExitAcquisition => {
            liquidation::reject_fund(ctx, wallet)?;
            if !ctx.is_exited(wallet) {
                return Err(RiskError::WalletNotExited {
                    wallet: wallet.to_string(),
                });
            }
            Ok(())
        }
        DeleverageType::InsuranceFundClosure if wallet != ctx.roles.insurance_fund => {
            Err(RiskError::UnsupportedLiquidationType {
                reason: "insurance fund closure must liquidate the insurance fund".to_string(),
            })
        }
        DeleverageType::ExitFundClosure if wallet != ctx.roles.exit_fund => {
            Err(RiskError::UnsupportedLiquidationType {
                reason: "exit fund closure must liquidate the exit fund".to_string(),
            })
        }
        DeleverageType::InsuranceFundClosure | DeleverageType::ExitFundClosure => Ok(()),
    }
}

/// Close `liquidation_base_quantity` of the liquidating wallet's position
/// against the counterparty's offsetting position.
pub fn deleverage(
    ctx: &RiskContext<'_>,
    txn: &mut LedgerTxn<'_>,
    args: &DeleverageArguments,
) -> Result<DeleverageOutcome, RiskError> {
    validate_roles(ctx, args)?;
    let wallet = args.liquidating_wallet;
    let counterparty = args.counterparty_wallet;
    let symbol = args.base_symbol;
    ctx.markets.active_market(symbol)?;

    liquidation::settle_participants(ctx, txn, wallet, Some(counterparty))?;

    let position = txn.balance(wallet, symbol).quantity;
    if position == 0 {
        return Err(RiskError::NoOpenPosition {
            wallet: wallet.to_string(),
            symbol: ctx.symbol_name(symbol),
        });
    }
    let quantity = args.liquidation_base_quantity;
    if quantity <= 0 || quantity > numeric::abs(position)? {
        return Err(RiskError::InvalidDeleverageQuantity {
            quantity,
            reason: format!("must lie in (0, {}]", numeric::abs(position)?),
        });
    }
    let offsetting = txn.balance(counterparty, symbol).quantity;
    if offsetting.signum() != -position.signum() || numeric::abs(offsetting)? < quantity {
        return Err(RiskError::InvalidCounterparty {
            wallet: counterparty.to_string(),
            reason: format!("position {offsetting} does not offset {quantity}"),
        });
    }

    let full_quote = full_position_quote(ctx, txn, args)?;
    let expected = partial_quote(full_quote, quantity, position)?;
    liquidation::validate_quote_quantity(ctx, symbol, expected, args.liquidation_quote_quantity)?;

    let moved = if position > 0 { quantity } else { numeric::neg(quantity)? };
    let new_quantity = numeric::sub(position, moved)?;
    txn.set_for_liquidation(
        wallet,
        Some(counterparty),
        symbol,
        new_quantity,
        args.liquidation_quote_quantity,
    )?;

    let counterparty_margin = margin::validate_requirement(
        ctx,
        &AccountSnapshot::load(&*txn, counterparty),
        ctx.config.deleverage_counterparty_requirement,
    )?;

    info!(
        %wallet,
        %counterparty,
        symbol = %ctx.symbol_name(symbol),
        deleverage_type = ?args.deleverage_type,
        quantity = %numeric::to_decimal(moved),
        quote = %numeric::to_decimal(args.liquidation_quote_quantity),
        "Position deleveraged"
    );
    Ok(DeleverageOutcome {
        counterparty,
        closed: ClosedPosition {
            symbol,
            quantity: moved,
            quote_quantity: args.liquidation_quote_quantity,
        },
        counterparty_margin,
    })
}
