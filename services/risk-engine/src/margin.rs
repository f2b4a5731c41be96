//! Margin calculator
//!
//! Total account value and initial/maintenance margin requirements across a
//! wallet's open positions. All arithmetic is scaled-integer pips; every
//! product goes through [`numeric::multiply_by_fraction`].

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::balance::Balance;
use types::errors::{MarginRequirement, RiskError};
use types::ids::{Symbol, WalletId};
use types::numeric::{self, Pips, PIP_SCALE};

use crate::context::RiskContext;
use crate::ledger::BalanceView;

// ── Account snapshot ─────────────────────────────────────────────────────

/// Collateral and open positions of one wallet, detached from the ledger
/// so hypothetical transfers can be valued without staging writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub wallet: WalletId,
    pub collateral: Pips,
    pub positions: BTreeMap<Symbol, Balance>,
}

impl AccountSnapshot {
    pub fn load<V: BalanceView + ?Sized>(view: &V, wallet: WalletId) -> Self {
        let positions = view
            .open_positions(wallet)
            .iter()
            .map(|symbol| (symbol, view.balance(wallet, symbol)))
            .collect();
        Self {
            wallet,
            collateral: view.collateral(wallet),
            positions,
        }
    }

    pub fn position(&self, symbol: Symbol) -> Pips {
        self.positions.get(&symbol).map_or(0, |b| b.quantity)
    }

    /// Move a position and quote amount into this snapshot.
    pub fn transfer_in(
        &mut self,
        symbol: Symbol,
        quantity_delta: Pips,
        quote_delta: Pips,
    ) -> Result<(), RiskError> {
        let balance = self.positions.entry(symbol).or_default();
        balance.quantity = numeric::add(balance.quantity, quantity_delta)?;
        if balance.quantity == 0 {
            self.positions.remove(&symbol);
        }
        self.collateral = numeric::add(self.collateral, quote_delta)?;
        Ok(())
    }
}

// ── Valuation ────────────────────────────────────────────────────────────

/// One open position valued at its mark price
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionValuation {
    pub symbol: Symbol,
    pub quantity: Pips,
    pub cost_basis: Pips,
    pub mark_price: Pips,
    /// Signed quote value of the position at the mark price
    pub notional: Pips,
    pub maintenance_margin_fraction: Pips,
    pub initial_margin_fraction: Pips,
}

impl PositionValuation {
    pub fn maintenance_margin(&self) -> Result<Pips, RiskError> {
        margin_for(self.notional, self.maintenance_margin_fraction)
    }

    pub fn initial_margin(&self) -> Result<Pips, RiskError> {
        margin_for(self.notional, self.initial_margin_fraction)
    }
}

/// Account value and margin requirements for one wallet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginSummary {
    pub total_account_value: Pips,
    pub initial_margin_requirement: Pips,
    pub maintenance_margin_requirement: Pips,
}

impl MarginSummary {
    pub fn required(&self, requirement: MarginRequirement) -> Pips {
        match requirement {
            MarginRequirement::Initial => self.initial_margin_requirement,
            MarginRequirement::Maintenance => self.maintenance_margin_requirement,
        }
    }

    pub fn meets(&self, requirement: MarginRequirement) -> bool {
        self.total_account_value >= self.required(requirement)
    }

    /// Undercollateralized: below the maintenance requirement.
    pub fn is_liquidatable(&self) -> bool {
        !self.meets(MarginRequirement::Maintenance)
    }

    /// `total_account_value / maintenance_margin_requirement` for display.
    ///
    /// Returns `Decimal::MAX` when there is no requirement (no positions).
    pub fn margin_ratio(&self) -> Decimal {
        if self.maintenance_margin_requirement == 0 {
            return Decimal::MAX;
        }
        Decimal::from(self.total_account_value) / Decimal::from(self.maintenance_margin_requirement)
    }
}

/// Signed quote value of `quantity` at `price`.
pub fn position_notional(quantity: Pips, price: Pips) -> Result<Pips, RiskError> {
    numeric::multiply_by_fraction(quantity, price, PIP_SCALE)
}

/// Unsigned margin on a notional at `fraction`.
pub fn margin_for(notional: Pips, fraction: Pips) -> Result<Pips, RiskError> {
    numeric::abs(numeric::multiply_by_fraction(notional, fraction, PIP_SCALE)?)
}

/// Value every open position in the snapshot, in open-position order.
pub fn value_positions(
    ctx: &RiskContext<'_>,
    snapshot: &AccountSnapshot,
) -> Result<Vec<PositionValuation>, RiskError> {
    snapshot
        .positions
        .iter()
        .filter(|(_, balance)| balance.is_open())
        .map(|(&symbol, balance)| -> Result<PositionValuation, RiskError> {
            let mark_price = ctx.mark_price(symbol)?;
            let fields = ctx.fields_for(symbol, snapshot.wallet)?;
            Ok(PositionValuation {
                symbol,
                quantity: balance.quantity,
                cost_basis: balance.cost_basis,
                mark_price,
                notional: position_notional(balance.quantity, mark_price)?,
                maintenance_margin_fraction: fields.maintenance_margin_fraction,
                initial_margin_fraction: fields.initial_margin_fraction_for(balance.quantity)?,
            })
        })
        .collect()
}

pub fn summarize(
    collateral: Pips,
    valuations: &[PositionValuation],
) -> Result<MarginSummary, RiskError> {
    let mut summary = MarginSummary {
        total_account_value: collateral,
        ..MarginSummary::default()
    };
    for valuation in valuations {
        summary.total_account_value =
            numeric::add(summary.total_account_value, valuation.notional)?;
        summary.initial_margin_requirement =
            numeric::add(summary.initial_margin_requirement, valuation.initial_margin()?)?;
        summary.maintenance_margin_requirement = numeric::add(
            summary.maintenance_margin_requirement,
            valuation.maintenance_margin()?,
        )?;
    }
    Ok(summary)
}

pub fn evaluate(
    ctx: &RiskContext<'_>,
    snapshot: &AccountSnapshot,
) -> Result<MarginSummary, RiskError> {
    summarize(snapshot.collateral, &value_positions(ctx, snapshot)?)
}

// ── Checks ───────────────────────────────────────────────────────────────

/// Require `total_account_value >= requirement`, else `MarginNotMet`.
pub fn validate_requirement(
    ctx: &RiskContext<'_>,
    snapshot: &AccountSnapshot,
    requirement: MarginRequirement,
) -> Result<MarginSummary, RiskError> {
    let summary = evaluate(ctx, snapshot)?;
    if !summary.meets(requirement) {
        return Err(RiskError::MarginNotMet {
            wallet: snapshot.wallet.to_string(),
            requirement,
            account_value: summary.total_account_value,
            required: summary.required(requirement),
        });
    }
    Ok(summary)
}

/// Require the wallet to be liquidatable, else `MaintenanceMarginMet`.
pub fn validate_in_maintenance(
    ctx: &RiskContext<'_>,
    snapshot: &AccountSnapshot,
) -> Result<MarginSummary, RiskError> {
    let summary = evaluate(ctx, snapshot)?;
    if !summary.is_liquidatable() {
        return Err(RiskError::MaintenanceMarginMet {
            wallet: snapshot.wallet.to_string(),
        });
    }
    Ok(summary)
}

/// Maintenance check after a position-reducing change; a wallet left below
/// maintenance is `MarginStillDeficient`.
pub fn validate_maintenance_after_reduction(
    ctx: &RiskContext<'_>,
    snapshot: &AccountSnapshot,
) -> Result<MarginSummary, RiskError> {
    let summary = evaluate(ctx, snapshot)?;
    if summary.is_liquidatable() {
        return Err(RiskError::MarginStillDeficient {
            wallet: snapshot.wallet.to_string(),
            account_value: summary.total_account_value,
            required: summary.maintenance_margin_requirement,
        });
    }
    Ok(summary)
}

// ── Tests ────────────────────────────────────────────────────────────────
