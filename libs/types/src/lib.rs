//! Types library for the perpetual-futures risk engine
//!
//! Shared, dependency-light definitions used by the engine and its
//! collaborators (matching, custody, governance, oracle ingestion).
//!
//! # Modules
//! - `numeric`: Fixed-point pip arithmetic
//! - `ids`: Wallet identifiers, wallet roles, interned symbols
//! - `balance`: Per-wallet, per-asset balance record
//! - `market`: Markets and overridable risk fields
//! - `risk`: Liquidation, deleverage, price and trade records
//! - `errors`: Error taxonomy

pub mod numeric;
pub mod ids;
pub mod balance;
pub mod market;
pub mod risk;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::balance::*;
    pub use crate::errors::*;
    pub use crate::ids::*;
    pub use crate::market::*;
    pub use crate::numeric::{Pips, PIP_SCALE};
    pub use crate::risk::*;
}
