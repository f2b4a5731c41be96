//! Error types for the risk engine
//!
//! Comprehensive error taxonomy using thiserror. Every operation validates
//! before it writes, so any of these errors means nothing was changed.

use thiserror::Error;

use crate::numeric::Pips;

/// Margin requirement being checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum MarginRequirement {
    Initial,
    Maintenance,
}

impl std::fmt::Display for MarginRequirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarginRequirement::Initial => write!(f, "initial"),
            MarginRequirement::Maintenance => write!(f, "maintenance"),
        }
    }
}

/// Top-level risk engine error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    // ── Arithmetic (fatal) ──
    #[error("Arithmetic overflow")]
    ArithmeticOverflow,

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    // ── Prices (recoverable by resubmitting) ──
    #[error("Stale price for {symbol}: received {received}, last recorded {last}")]
    StalePrice {
        symbol: String,
        received: i64,
        last: i64,
    },

    #[error("Price mismatch: expected {expected}, received {received}")]
    PriceMismatch { expected: String, received: String },

    #[error("No index price published for {symbol}")]
    MissingPrice { symbol: String },

    #[error("Funding publish out of sequence for {symbol}: expected {expected}, received {received}")]
    FundingPublishOutOfSequence {
        symbol: String,
        expected: i64,
        received: i64,
    },

    // ── Margin outcomes ──
    #[error("{requirement} margin requirement not met for {wallet}: account value {account_value}, required {required}")]
    MarginNotMet {
        wallet: String,
        requirement: MarginRequirement,
        account_value: Pips,
        required: Pips,
    },

    #[error("Maintenance margin still deficient for {wallet}: account value {account_value}, required {required}")]
    MarginStillDeficient {
        wallet: String,
        account_value: Pips,
        required: Pips,
    },

    #[error("Maintenance margin requirement met for {wallet}")]
    MaintenanceMarginMet { wallet: String },

    // ── Liquidation / deleverage rejections ──
    #[error("Invalid liquidation price for {symbol}: expected quote {expected}, supplied {supplied}")]
    InvalidLiquidationPrice {
        symbol: String,
        expected: Pips,
        supplied: Pips,
    },

    #[error("Expected {expected} liquidation quote quantities, received {received}")]
    LiquidationQuoteCountMismatch { expected: usize, received: usize },

    #[error("Invalid liquidation fee {fee}: maximum {maximum}")]
    InvalidLiquidationFee { fee: Pips, maximum: Pips },

    #[error("Unsupported liquidation type: {reason}")]
    UnsupportedLiquidationType { reason: String },

    #[error("Insurance fund can acquire the liquidating wallet's positions")]
    InsuranceFundCanAcquire,

    #[error("Wallet {wallet} has no open position in {symbol}")]
    NoOpenPosition { wallet: String, symbol: String },

    #[error("Funds cannot be liquidated: {wallet}")]
    CannotLiquidateFund { wallet: String },

    #[error("Invalid counterparty {wallet}: {reason}")]
    InvalidCounterparty { wallet: String, reason: String },

    #[error("Invalid deleverage quantity {quantity}: {reason}")]
    InvalidDeleverageQuantity { quantity: Pips, reason: String },

    #[error("Exit fund has open positions")]
    ExitFundHasOpenPositions,

    #[error("Exit fund has no open positions")]
    ExitFundHasNoOpenPositions,

    #[error("Maximum position size exceeded in {symbol}: position {position}, maximum {maximum}")]
    MaximumPositionSizeExceeded {
        symbol: String,
        position: Pips,
        maximum: Pips,
    },

    // ── Wallet state ──
    #[error("Wallet {wallet} has exited")]
    WalletExited { wallet: String },

    #[error("Wallet {wallet} has not exited")]
    WalletNotExited { wallet: String },

    #[error("Wallet {wallet} still has open positions")]
    WalletHasOpenPositions { wallet: String },

    // ── Markets ──
    #[error("Market not found: {symbol}")]
    MarketNotFound { symbol: String },

    #[error("Market already exists: {symbol}")]
    MarketAlreadyExists { symbol: String },

    #[error("Market inactive: {symbol}")]
    InactiveMarket { symbol: String },

    #[error("Market still active: {symbol}")]
    MarketIsActive { symbol: String },

    #[error("Invalid market parameters: {reason}")]
    InvalidMarketParameters { reason: String },

    #[error("Unknown symbol: {symbol}")]
    UnknownSymbol { symbol: String },

    #[error("Configuration error: {reason}")]
    Config { reason: String },
}

impl RiskError {
    /// Errors that must abort the whole operation rather than be branched on.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RiskError::ArithmeticOverflow | RiskError::DivisionByZero)
    }
}
