//! Per-wallet, per-asset balance record

use serde::{Deserialize, Serialize};

use crate::numeric::Pips;

/// Balance for one (wallet, asset) pair
///
/// For the quote asset `quantity` is collateral and the other fields are
/// unused. For a base asset `quantity` is the signed position size and
/// `cost_basis` the signed quote value paid at entry (positive for longs,
/// negative for shorts). `cost_basis` is zero whenever `quantity` is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub quantity: Pips,
    pub cost_basis: Pips,
    /// Timestamp (ms) of the last funding payment settled into this position
    pub last_funding_update: i64,
}

impl Balance {
    pub fn is_open(&self) -> bool {
        self.quantity != 0
    }
}
