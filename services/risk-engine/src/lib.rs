//! Risk Engine Service
//!
//! Margin, funding, liquidation and auto-deleveraging for a
//! cross-margined perpetual-futures venue. Positions and collateral live in
//! a [`ledger::Ledger`]; every state change runs through
//! [`engine::RiskEngine`] as a single all-or-nothing transaction.

pub mod config;
pub mod context;
pub mod deleveraging;
pub mod engine;
pub mod events;
pub mod funding;
pub mod ledger;
pub mod liquidation;
pub mod margin;
pub mod markets;
pub mod oracle;
pub mod validator;

pub use config::{PricingMode, RiskEngineConfig, WalletRoles};
pub use engine::{RiskEngine, SharedRiskEngine};
pub use events::{RiskEvent, RiskEventType};
