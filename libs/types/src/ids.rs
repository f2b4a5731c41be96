//! Identifier types for wallets and asset symbols
//!
//! Wallets use UUID v7. Asset symbols are interned into a [`SymbolTable`];
//! the resulting [`Symbol`] is a small copyable handle whose ordering is a
//! stable hash of the symbol text rather than its lexical order.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::errors::RiskError;

/// Unique identifier for a wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletId(Uuid);

impl WalletId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for WalletId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role a wallet plays in liquidation and deleveraging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WalletRole {
    /// Ordinary trading wallet
    Trader,
    /// Counterparty of first resort for liquidations
    InsuranceFund,
    /// Counterparty of last resort; unbounded position size
    ExitFund,
}

impl WalletRole {
    pub fn is_fund(&self) -> bool {
        !matches!(self, WalletRole::Trader)
    }
}

/// Interned asset symbol
///
/// Ordering is by `(sort_key, id)`: the sort key is derived from the symbol
/// text alone, and the id only separates the (unlikely) case of two symbols
/// sharing a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol {
    sort_key: u64,
    id: u32,
}

impl Symbol {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn sort_key(&self) -> u64 {
        self.sort_key
    }
}

/// Stable 64-bit key for a symbol: the first 8 bytes of its SHA-256 digest.
pub fn symbol_sort_key(symbol: &str) -> u64 {
    let digest = Sha256::digest(symbol.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Side table mapping symbol text to interned handles and back
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    by_name: HashMap<String, Symbol>,
    names: Vec<String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `name`, returning the existing handle if already present.
    pub fn intern(&mut self, name: &str) -> Symbol {
        if let Some(symbol) = self.by_name.get(name) {
            return *symbol;
        }
        let symbol = Symbol {
            sort_key: symbol_sort_key(name),
            id: self.names.len() as u32,
        };
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), symbol);
        symbol
    }

    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.by_name.get(name).copied()
    }

    /// Like [`lookup`](Self::lookup) but fails with `UnknownSymbol`.
    pub fn resolve(&self, name: &str) -> Result<Symbol, RiskError> {
        self.lookup(name).ok_or_else(|| RiskError::UnknownSymbol {
            symbol: name.to_string(),
        })
    }

    /// Display name of an interned symbol.
    pub fn name(&self, symbol: Symbol) -> &str {
        self.names
            .get(symbol.id as usize)
            .map(String::as_str)
            .unwrap_or("?")
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
