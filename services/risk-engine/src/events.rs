//! Risk event definitions
//!
//! Events describing accepted state transitions. The engine returns them to
//! its caller and never emits them itself.

use serde::{Deserialize, Serialize};
use types::ids::{Symbol, WalletId};
use types::numeric::Pips;
use types::risk::{DeleverageType, LiquidationType};
use uuid::Uuid;

use crate::liquidation::ClosedPosition;

/// Risk event returned by the risk engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskEvent {
    pub event_id: Uuid,
    pub wallet: Option<WalletId>,
    pub event_type: RiskEventType,
}

/// Risk event type classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskEventType {
    LiquidationExecuted {
        liquidation_type: LiquidationType,
        counterparty: Option<WalletId>,
        positions: Vec<ClosedPosition>,
        fee_quantity: Pips,
    },
    DeleverageExecuted {
        deleverage_type: DeleverageType,
        counterparty: WalletId,
        position: ClosedPosition,
    },
    FundingMultiplierPublished {
        symbol: Symbol,
        timestamp: i64,
        multiplier: Pips,
    },
    FundingSettled {
        amount: Pips,
    },
    MarketDeactivated {
        symbol: Symbol,
        index_price: Pips,
    },
    MarketActivated {
        symbol: Symbol,
    },
    WalletExited,
    WalletExitCleared,
}

impl RiskEvent {
    pub fn new(wallet: Option<WalletId>, event_type: RiskEventType) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            wallet,
            event_type,
        }
    }

    pub fn for_wallet(wallet: WalletId, event_type: RiskEventType) -> Self {
        Self::new(Some(wallet), event_type)
    }

    pub fn for_market(event_type: RiskEventType) -> Self {
        Self::new(None, event_type)
    }
}
