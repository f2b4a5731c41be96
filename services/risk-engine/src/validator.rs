//! Trade and transfer post-conditions
//!
//! The matching and custody collaborators hand settled trades and
//! collateral movements to the engine; each is applied to the caller's
//! transaction and then checked so a failure aborts the whole operation.

use tracing::{debug, warn};
use types::errors::{MarginRequirement, RiskError};
use types::ids::{Symbol, WalletId, WalletRole};
use types::numeric::{self, Pips};
use types::risk::TradeSettlement;

use crate::context::RiskContext;
use crate::funding;
use crate::ledger::{BalanceView, LedgerTxn, OpenPositionSet};
use crate::margin::{self, AccountSnapshot, MarginSummary};

/// Whether moving from `old` to `new` adds exposure (opens, grows or
/// flips the position).
pub fn increases_exposure(old: Pips, new: Pips) -> bool {
    new != 0 && (old == 0 || old.signum() != new.signum() || new.unsigned_abs() > old.unsigned_abs())
}

fn reject_exited(ctx: &RiskContext<'_>, wallet: WalletId) -> Result<(), RiskError> {
    if ctx.is_exited(wallet) {
        return Err(RiskError::WalletExited {
            wallet: wallet.to_string(),
        });
    }
    Ok(())
}

fn require_positive(amount: Pips, what: &str) -> Result<(), RiskError> {
    if amount <= 0 {
        return Err(RiskError::InvalidAmount {
            reason: format!("{what} must be positive, got {amount}"),
        });
    }
    Ok(())
}

/// Post-trade checks for one side of a trade.
fn validate_trade_side(
    ctx: &RiskContext<'_>,
    txn: &LedgerTxn<'_>,
    wallet: WalletId,
    symbol: Symbol,
    old_position: Pips,
) -> Result<Option<MarginSummary>, RiskError> {
    // the exit fund is the unbounded backstop
    if ctx.role_of(wallet) == WalletRole::ExitFund {
        return Ok(None);
    }

    let new_position = txn.balance(wallet, symbol).quantity;
    let snapshot = AccountSnapshot::load(txn, wallet);
    if increases_exposure(old_position, new_position) {
        let maximum = ctx.fields_for(symbol, wallet)?.maximum_position_size;
        if numeric::abs(new_position)? > maximum {
            return Err(RiskError::MaximumPositionSizeExceeded {
                symbol: ctx.symbol_name(symbol),
                position: new_position,
                maximum,
            });
        }
        margin::validate_requirement(ctx, &snapshot, MarginRequirement::Initial).map(Some)
    } else {
        margin::validate_maintenance_after_reduction(ctx, &snapshot).map(Some)
    }
}

/// Apply a matched trade and check both counterparties' margin.
///
/// Returns the buyer's and seller's post-trade margin (`None` for the exit
/// fund, which carries no requirement).
pub fn settle_trade(
    ctx: &RiskContext<'_>,
    txn: &mut LedgerTxn<'_>,
    trade: &TradeSettlement,
) -> Result<[Option<MarginSummary>; 2], RiskError> {
    require_positive(trade.base_quantity, "base quantity")?;
    require_positive(trade.quote_quantity, "quote quantity")?;
    if trade.buy_wallet == trade.sell_wallet {
        return Err(RiskError::InvalidCounterparty {
            wallet: trade.buy_wallet.to_string(),
            reason: "self-trade".to_string(),
        });
    }
    let symbol = trade.base_symbol;
    let market = ctx.markets.active_market(symbol)?;
    if trade.base_quantity < market.fields.minimum_position_size {
        return Err(RiskError::InvalidAmount {
            reason: format!(
                "base quantity {} below minimum {}",
                trade.base_quantity, market.fields.minimum_position_size
            ),
        });
    }
    reject_exited(ctx, trade.buy_wallet)?;
    reject_exited(ctx, trade.sell_wallet)?;

    let touched: OpenPositionSet = std::iter::once(symbol).collect();
    funding::settle_wallet(txn, ctx.funding, trade.buy_wallet, &touched)?;
    funding::settle_wallet(txn, ctx.funding, trade.sell_wallet, &touched)?;

    let buy_before = txn.balance(trade.buy_wallet, symbol).quantity;
    let sell_before = txn.balance(trade.sell_wallet, symbol).quantity;
    txn.apply_delta(
        trade.buy_wallet,
        symbol,
        trade.base_quantity,
        numeric::neg(trade.quote_quantity)?,
    )?;
    txn.apply_delta(
        trade.sell_wallet,
        symbol,
        numeric::neg(trade.base_quantity)?,
        trade.quote_quantity,
    )?;

    let buy = validate_trade_side(ctx, txn, trade.buy_wallet, symbol, buy_before)
        .inspect_err(|e| warn!(wallet = %trade.buy_wallet, error = %e, "Trade rejected"))?;
    let sell = validate_trade_side(ctx, txn, trade.sell_wallet, symbol, sell_before)
        .inspect_err(|e| warn!(wallet = %trade.sell_wallet, error = %e, "Trade rejected"))?;

    debug!(
        buy_wallet = %trade.buy_wallet,
        sell_wallet = %trade.sell_wallet,
        symbol = %ctx.symbol_name(symbol),
        base = trade.base_quantity,
        quote = trade.quote_quantity,
        "Trade settled"
    );
    Ok([buy, sell])
}

/// Credit collateral from the custody collaborator.
pub fn deposit(
    ctx: &RiskContext<'_>,
    txn: &mut LedgerTxn<'_>,
    wallet: WalletId,
    amount: Pips,
) -> Result<(), RiskError> {
    require_positive(amount, "deposit")?;
    reject_exited(ctx, wallet)?;
    txn.adjust_collateral(wallet, amount)
}

/// Debit collateral; the wallet must still meet initial margin afterwards.
pub fn withdraw(
    ctx: &RiskContext<'_>,
    txn: &mut LedgerTxn<'_>,
    wallet: WalletId,
    amount: Pips,
) -> Result<MarginSummary, RiskError> {
    require_positive(amount, "withdrawal")?;
    funding::settle_wallet(txn, ctx.funding, wallet, &OpenPositionSet::new())?;
    txn.adjust_collateral(wallet, numeric::neg(amount)?)?;
    margin::validate_requirement(
        ctx,
        &AccountSnapshot::load(&*txn, wallet),
        MarginRequirement::Initial,
    )
}
