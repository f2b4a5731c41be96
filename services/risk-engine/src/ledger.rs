//! Position ledger
//!
//! Per-wallet, per-asset balances plus the per-wallet index of open
//! positions. All mutation goes through a [`LedgerTxn`]: writes are staged
//! in a write-set over the committed ledger and land together on
//! [`Ledger::apply`], so a balance write and the matching index update are
//! never observable apart, and a rejected operation leaves no trace.

use std::collections::HashMap;

use types::balance::Balance;
use types::errors::RiskError;
use types::ids::{Symbol, WalletId};
use types::numeric::{self, Pips};

// ── Open-position index ─────────────────────────────────────────────────

/// Deduplicated set of base-asset symbols ordered by `Symbol`'s stable hash
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenPositionSet(Vec<Symbol>);

impl OpenPositionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert keeping order; returns false if already present.
    pub fn insert(&mut self, symbol: Symbol) -> bool {
        match self.0.binary_search(&symbol) {
            Ok(_) => false,
            Err(at) => {
                self.0.insert(at, symbol);
                true
            }
        }
    }

    /// Remove; returns false if absent.
    pub fn remove(&mut self, symbol: Symbol) -> bool {
        match self.0.binary_search(&symbol) {
            Ok(at) => {
                self.0.remove(at);
                true
            }
            Err(_) => false,
        }
    }

    pub fn contains(&self, symbol: Symbol) -> bool {
        self.0.binary_search(&symbol).is_ok()
    }

    /// Ordered union in a single linear pass.
    pub fn merge(&self, other: &OpenPositionSet) -> OpenPositionSet {
        let (a, b) = (&self.0, &other.0);
        let mut merged = Vec::with_capacity(a.len() + b.len());
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                std::cmp::Ordering::Less => {
                    merged.push(a[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    merged.push(b[j]);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    merged.push(a[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        merged.extend_from_slice(&a[i..]);
        merged.extend_from_slice(&b[j..]);
        OpenPositionSet(merged)
    }

    pub fn iter(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.0.iter().copied()
    }

    pub fn as_slice(&self) -> &[Symbol] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Symbol> for OpenPositionSet {
    fn from_iter<I: IntoIterator<Item = Symbol>>(iter: I) -> Self {
        let mut set = OpenPositionSet::new();
        for symbol in iter {
            set.insert(symbol);
        }
        set
    }
}

// ── Read access ─────────────────────────────────────────────────────────

/// Read access shared by the committed ledger and an open transaction
pub trait BalanceView {
    /// Balance for a (wallet, asset) pair; zero if never written.
    fn balance(&self, wallet: WalletId, symbol: Symbol) -> Balance;

    fn open_positions(&self, wallet: WalletId) -> OpenPositionSet;

    fn quote_symbol(&self) -> Symbol;

    /// Quote-asset balance.
    fn collateral(&self, wallet: WalletId) -> Pips {
        self.balance(wallet, self.quote_symbol()).quantity
    }
}

// ── Committed ledger ────────────────────────────────────────────────────

/// Committed balances and open-position indexes
#[derive(Debug, Clone)]
pub struct Ledger {
    quote_symbol: Symbol,
    balances: HashMap<(WalletId, Symbol), Balance>,
    open_positions: HashMap<WalletId, OpenPositionSet>,
}

/// Staged writes produced by a transaction
#[derive(Debug, Default)]
pub struct LedgerWrites {
    balances: HashMap<(WalletId, Symbol), Balance>,
    open_positions: HashMap<WalletId, OpenPositionSet>,
}

impl LedgerWrites {
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty() && self.open_positions.is_empty()
    }
}

impl Ledger {
    pub fn new(quote_symbol: Symbol) -> Self {
        Self {
            quote_symbol,
            balances: HashMap::new(),
            open_positions: HashMap::new(),
        }
    }

    /// Read a balance; an untouched pair reads as zero without being stored.
    pub fn load(&self, wallet: WalletId, symbol: Symbol) -> Balance {
        self.balances
            .get(&(wallet, symbol))
            .copied()
            .unwrap_or_default()
    }

    /// Start a transaction over the committed state.
    pub fn begin(&self) -> LedgerTxn<'_> {
        LedgerTxn {
            base: self,
            balances: HashMap::new(),
            open_positions: HashMap::new(),
        }
    }

    /// Commit a transaction's writes.
    pub fn apply(&mut self, writes: LedgerWrites) {
        self.balances.extend(writes.balances);
        for (wallet, set) in writes.open_positions {
            if set.is_empty() {
                self.open_positions.remove(&wallet);
            } else {
                self.open_positions.insert(wallet, set);
            }
        }
    }
}

impl BalanceView for Ledger {
    fn balance(&self, wallet: WalletId, symbol: Symbol) -> Balance {
        self.load(wallet, symbol)
    }

    fn open_positions(&self, wallet: WalletId) -> OpenPositionSet {
        self.open_positions.get(&wallet).cloned().unwrap_or_default()
    }

    fn quote_symbol(&self) -> Symbol {
        self.quote_symbol
    }
}

// ── Transaction ─────────────────────────────────────────────────────────

/// Write-set over a committed [`Ledger`]
#[derive(Debug)]
pub struct LedgerTxn<'a> {
    base: &'a Ledger,
    balances: HashMap<(WalletId, Symbol), Balance>,
    open_positions: HashMap<WalletId, OpenPositionSet>,
}

impl<'a> LedgerTxn<'a> {
    pub fn into_writes(self) -> LedgerWrites {
        LedgerWrites {
            balances: self.balances,
            open_positions: self.open_positions,
        }
    }

    /// Stage a balance write, keeping the open-position index in step.
    fn write(&mut self, wallet: WalletId, symbol: Symbol, balance: Balance) {
        if symbol != self.base.quote_symbol {
            let was_open = self.balance(wallet, symbol).is_open();
            if was_open != balance.is_open() {
                let mut set = self.open_positions(wallet);
                if balance.is_open() {
                    set.insert(symbol);
                } else {
                    set.remove(symbol);
                }
                self.open_positions.insert(wallet, set);
            }
        }
        self.balances.insert((wallet, symbol), balance);
    }

    /// Add a signed amount to a wallet's quote balance.
    pub fn adjust_collateral(&mut self, wallet: WalletId, delta: Pips) -> Result<(), RiskError> {
        let quote = self.base.quote_symbol;
        let mut balance = self.balance(wallet, quote);
        balance.quantity = numeric::add(balance.quantity, delta)?;
        self.write(wallet, quote, balance);
        Ok(())
    }

    pub fn set_last_funding_update(&mut self, wallet: WalletId, symbol: Symbol, timestamp: i64) {
        let mut balance = self.balance(wallet, symbol);
        if balance.last_funding_update != timestamp {
            balance.last_funding_update = timestamp;
            self.write(wallet, symbol, balance);
        }
    }

    /// Apply a trade leg: `quantity_delta` to the base position and
    /// `quote_delta` to collateral (negative when quote is paid).
    ///
    /// Cost basis grows by the quote paid when the position grows, scales by
    /// `new / old` when it shrinks, is reset at zero, and on a flip becomes
    /// the flipped share of this leg's quote.
    pub fn apply_delta(
        &mut self,
        wallet: WalletId,
        symbol: Symbol,
        quantity_delta: Pips,
        quote_delta: Pips,
    ) -> Result<(), RiskError> {
        if symbol == self.base.quote_symbol {
            return Err(RiskError::InvalidAmount {
                reason: "position delta applied to the quote asset".to_string(),
            });
        }

        let mut balance = self.balance(wallet, symbol);
        let old = balance.quantity;
        let new = numeric::add(old, quantity_delta)?;

        if quantity_delta != 0 {
            balance.cost_basis = if old == 0 || old.signum() == quantity_delta.signum() {
                numeric::add(balance.cost_basis, numeric::neg(quote_delta)?)?
            } else if new == 0 {
                0
            } else if new.signum() == old.signum() {
                numeric::multiply_by_fraction(balance.cost_basis, new, old)?
            } else {
                numeric::multiply_by_fraction(numeric::neg(quote_delta)?, new, quantity_delta)?
            };
        }
        balance.quantity = new;

        self.write(wallet, symbol, balance);
        self.adjust_collateral(wallet, quote_delta)
    }

    /// Move part or all of `liquidating`'s position to `counterparty` for
    /// an unsigned `quote_quantity`, leaving `new_quantity` behind.
    ///
    /// The quote moves in the opposite direction to the position, so the
    /// pair nets to zero. With no counterparty (deactivated markets) only
    /// the liquidating side is written.
    pub fn set_for_liquidation(
        &mut self,
        liquidating: WalletId,
        counterparty: Option<WalletId>,
        symbol: Symbol,
        new_quantity: Pips,
        quote_quantity: Pips,
    ) -> Result<(), RiskError> {
        let position = self.balance(liquidating, symbol).quantity;
        let shrinks = new_quantity == 0
            || (new_quantity.signum() == position.signum()
                && numeric::abs(new_quantity)? < numeric::abs(position)?);
        if position == 0 || !shrinks {
            return Err(RiskError::InvalidAmount {
                reason: format!("cannot move position {position} to {new_quantity}"),
            });
        }
        if quote_quantity < 0 {
            return Err(RiskError::InvalidAmount {
                reason: "negative liquidation quote quantity".to_string(),
            });
        }

        let moved = numeric::sub(position, new_quantity)?;
        let signed_quote = if moved > 0 {
            quote_quantity
        } else {
            numeric::neg(quote_quantity)?
        };

        self.apply_delta(liquidating, symbol, numeric::neg(moved)?, signed_quote)?;
        if let Some(counterparty) = counterparty {
            self.apply_delta(counterparty, symbol, moved, numeric::neg(signed_quote)?)?;
        }
        Ok(())
    }
}

impl BalanceView for LedgerTxn<'_> {
    fn balance(&self, wallet: WalletId, symbol: Symbol) -> Balance {
        self.balances
            .get(&(wallet, symbol))
            .copied()
            .unwrap_or_else(|| self.base.load(wallet, symbol))
    }

    fn open_positions(&self, wallet: WalletId) -> OpenPositionSet {
        self.open_positions
            .get(&wallet)
            .cloned()
            .unwrap_or_else(|| self.base.open_positions(wallet))
    }

    fn quote_symbol(&self) -> Symbol {
        self.base.quote_symbol
    }
}
