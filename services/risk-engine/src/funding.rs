//! Funding accrual
//!
//! Hourly funding multipliers are published per market into an
//! append-only, gapless sequence packed four to a quartet. A wallet's
//! outstanding funding is settled lazily: the multipliers published since
//! its last settlement are summed, scaled by its signed position, and
//! added to collateral.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use types::errors::RiskError;
use types::ids::{Symbol, WalletId};
use types::numeric::{self, Pips, PIP_SCALE};

use crate::ledger::{BalanceView, LedgerTxn, OpenPositionSet};

/// Funding period in milliseconds
pub const FUNDING_PERIOD_MS: i64 = 60 * 60 * 1000;

/// Four consecutive hourly funding multipliers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingMultiplierQuartet {
    pub values: [Pips; 4],
}

/// Published multipliers for one market
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingHistory {
    first_timestamp: Option<i64>,
    quartets: Vec<FundingMultiplierQuartet>,
    count: usize,
}

impl FundingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn quartets(&self) -> &[FundingMultiplierQuartet] {
        &self.quartets
    }

    /// Timestamp of the most recent publish.
    pub fn last_timestamp(&self) -> Option<i64> {
        let first = self.first_timestamp?;
        Some(first + (self.count as i64 - 1) * FUNDING_PERIOD_MS)
    }

    /// Timestamp the next publish must carry, if any has happened yet.
    pub fn next_timestamp(&self) -> Option<i64> {
        self.last_timestamp().map(|last| last + FUNDING_PERIOD_MS)
    }

    fn multiplier(&self, hour: usize) -> Pips {
        self.quartets[hour / 4].values[hour % 4]
    }

    fn append(&mut self, multiplier: Pips) {
        if self.count % 4 == 0 {
            self.quartets.push(FundingMultiplierQuartet::default());
        }
        let hour = self.count;
        self.quartets[hour / 4].values[hour % 4] = multiplier;
        self.count += 1;
    }

    /// Append `index_price × funding_rate` for the hour at `timestamp`.
    ///
    /// The first publish must sit on an hour boundary; every later one
    /// exactly one period after the previous.
    pub fn publish(
        &mut self,
        symbol_name: &str,
        index_price: Pips,
        funding_rate: Pips,
        timestamp: i64,
    ) -> Result<Pips, RiskError> {
        match self.next_timestamp() {
            Some(expected) if timestamp != expected => {
                return Err(RiskError::FundingPublishOutOfSequence {
                    symbol: symbol_name.to_string(),
                    expected,
                    received: timestamp,
                });
            }
            None if timestamp <= 0 || timestamp % FUNDING_PERIOD_MS != 0 => {
                let expected = (timestamp.div_euclid(FUNDING_PERIOD_MS) + 1) * FUNDING_PERIOD_MS;
                return Err(RiskError::FundingPublishOutOfSequence {
                    symbol: symbol_name.to_string(),
                    expected,
                    received: timestamp,
                });
            }
            _ => {}
        }
        if index_price <= 0 {
            return Err(RiskError::InvalidAmount {
                reason: format!("index price {index_price} must be positive"),
            });
        }

        let multiplier = numeric::multiply_by_fraction(index_price, funding_rate, PIP_SCALE)?;
        if self.first_timestamp.is_none() {
            self.first_timestamp = Some(timestamp);
        }
        self.append(multiplier);
        Ok(multiplier)
    }

    /// Sum of the multipliers published strictly after `since`.
    pub fn aggregate_multiplier_since(&self, since: i64) -> Result<Pips, RiskError> {
        let (Some(first), Some(last)) = (self.first_timestamp, self.last_timestamp()) else {
            return Ok(0);
        };
        if since >= last {
            return Ok(0);
        }
        let start = if since < first {
            0
        } else {
            ((since - first) / FUNDING_PERIOD_MS + 1) as usize
        };
        numeric::sum((start..self.count).map(|hour| self.multiplier(hour)))
    }
}

/// Funding histories for every market
#[derive(Debug, Clone, Default)]
pub struct FundingBook {
    histories: HashMap<Symbol, FundingHistory>,
}

impl FundingBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self, symbol: Symbol) -> Option<&FundingHistory> {
        self.histories.get(&symbol)
    }

    pub fn publish(
        &mut self,
        symbol: Symbol,
        symbol_name: &str,
        index_price: Pips,
        funding_rate: Pips,
        timestamp: i64,
    ) -> Result<Pips, RiskError> {
        self.histories
            .entry(symbol)
            .or_default()
            .publish(symbol_name, index_price, funding_rate, timestamp)
    }

    pub fn last_timestamp(&self, symbol: Symbol) -> Option<i64> {
        self.histories.get(&symbol)?.last_timestamp()
    }
}

/// Settle one position's outstanding funding into collateral.
///
/// Returns the amount credited (negative when paid). A no-op once the
/// wallet is current, so repeated calls without a publish are idempotent.
pub fn settle(
    txn: &mut LedgerTxn<'_>,
    book: &FundingBook,
    wallet: WalletId,
    symbol: Symbol,
) -> Result<Pips, RiskError> {
    let Some(history) = book.history(symbol) else {
        return Ok(0);
    };
    let Some(last) = history.last_timestamp() else {
        return Ok(0);
    };
    let balance = txn.balance(wallet, symbol);
    if balance.last_funding_update >= last {
        return Ok(0);
    }

    let mut payment = 0;
    if balance.quantity != 0 {
        let aggregate = history.aggregate_multiplier_since(balance.last_funding_update)?;
        payment = numeric::multiply_by_fraction(balance.quantity, aggregate, PIP_SCALE)?;
        txn.adjust_collateral(wallet, payment)?;
        debug!(
            %wallet,
            position = balance.quantity,
            aggregate,
            payment,
            "Funding settled"
        );
    }
    txn.set_last_funding_update(wallet, symbol, last);
    Ok(payment)
}

/// Settle every open position of `wallet` plus any `extra` symbols the
/// operation is about to touch.
pub fn settle_wallet(
    txn: &mut LedgerTxn<'_>,
    book: &FundingBook,
    wallet: WalletId,
    extra: &OpenPositionSet,
) -> Result<Pips, RiskError> {
    let symbols = txn.open_positions(wallet).merge(extra);
    let mut total = 0;
    for symbol in symbols.iter() {
        total = numeric::add(total, settle(txn, book, wallet, symbol)?)?;
    }
    Ok(total)
}
