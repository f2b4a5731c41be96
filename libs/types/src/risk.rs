//! Liquidation and deleverage argument types

use serde::{Deserialize, Serialize};

use crate::ids::{Symbol, WalletId};
use crate::numeric::Pips;

/// Liquidation flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiquidationType {
    /// Wallet below maintenance margin; insurance fund takes the positions
    WalletInMaintenance,
    /// As above while the exit fund holds positions; exit fund takes them
    WalletInMaintenanceDuringSystemRecovery,
    /// Wallet has exited; insurance fund takes the positions
    WalletExited,
    /// Single position in a deactivated market, closed at the frozen price
    PositionInDeactivatedMarket,
}

/// Deleverage flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeleverageType {
    /// Wallet in maintenance the insurance fund cannot absorb
    InMaintenanceAcquisition,
    /// Exited wallet the insurance fund cannot absorb
    ExitAcquisition,
    /// Wind down an insurance fund position at cost basis
    InsuranceFundClosure,
    /// Wind down an exit fund position at its bankruptcy price
    ExitFundClosure,
}

/// Whole-wallet liquidation
///
/// `liquidation_quote_quantities` holds one unsigned quote quantity per open
/// position of the liquidating wallet, in open-position index order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletLiquidationArguments {
    pub liquidation_type: LiquidationType,
    pub liquidating_wallet: WalletId,
    pub liquidation_quote_quantities: Vec<Pips>,
}

/// Liquidation of one position in a deactivated market
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionLiquidationArguments {
    pub liquidating_wallet: WalletId,
    pub base_symbol: Symbol,
    pub liquidation_quote_quantity: Pips,
    pub fee_quantity: Pips,
}

/// Forced partial closure of a position against a counterparty wallet
///
/// `liquidation_base_quantity` is unsigned; its direction follows the
/// liquidating wallet's position. For the acquisition flows
/// `liquidation_quote_quantities` must carry the whole-wallet quotes the
/// insurance fund would have received; the closure flows ignore it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleverageArguments {
    pub deleverage_type: DeleverageType,
    pub liquidating_wallet: WalletId,
    pub counterparty_wallet: WalletId,
    pub base_symbol: Symbol,
    pub liquidation_base_quantity: Pips,
    pub liquidation_quote_quantity: Pips,
    pub liquidation_quote_quantities: Vec<Pips>,
}

/// Already signature-validated index price record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPrice {
    pub base_symbol: Symbol,
    pub price: Pips,
    pub timestamp: i64,
}

/// Trade as handed over by the matching collaborator
///
/// `quote_quantity` is the unsigned quote paid by the buyer to the seller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeSettlement {
    pub buy_wallet: WalletId,
    pub sell_wallet: WalletId,
    pub base_symbol: Symbol,
    pub base_quantity: Pips,
    pub quote_quantity: Pips,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SymbolTable;

    #[test]
    fn test_liquidation_arguments_serialization() {
        let args = WalletLiquidationArguments {
            liquidation_type: LiquidationType::WalletExited,
            liquidating_wallet: WalletId::new(),
            liquidation_quote_quantities: vec![1, 2],
        };
        let json = serde_json::to_string(&args).unwrap();
        let back: WalletLiquidationArguments = serde_json::from_str(&json).unwrap();
        assert_eq!(args, back);
    }

    #[test]
    fn test_index_price_copy() {
        let mut table = SymbolTable::new();
        let price = IndexPrice {
            base_symbol: table.intern("ETH"),
            price: 10,
            timestamp: 1,
        };
        let copy = price;
        assert_eq!(price, copy);
    }
}
