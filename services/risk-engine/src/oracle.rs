//! Price ingestion and mark-price sourcing
//!
//! Index prices arrive already signature-validated; ingestion only checks
//! that they belong to the expected market and move forward in time.

use tracing::{debug, warn};
use types::errors::RiskError;
use types::ids::Symbol;
use types::market::Market;
use types::numeric::{self, Pips};
use types::risk::IndexPrice;

use crate::config::PricingMode;
use crate::markets::MarketRegistry;

/// Live price source for the on-chain-feed pricing mode
pub trait PriceFeed: Send + Sync {
    fn latest_price(&self, symbol: Symbol) -> Option<Pips>;
}

/// Record a validated index price on its market.
///
/// A timestamp older than the last recorded one is `StalePrice`; the same
/// timestamp is accepted only if it carries the same price.
pub fn ingest_index_price(
    markets: &mut MarketRegistry,
    expected_symbol: Symbol,
    record: &IndexPrice,
) -> Result<(), RiskError> {
    if record.base_symbol != expected_symbol {
        return Err(RiskError::PriceMismatch {
            expected: markets.name(expected_symbol),
            received: markets.name(record.base_symbol),
        });
    }
    if record.price <= 0 {
        return Err(RiskError::InvalidAmount {
            reason: format!("index price {} must be positive", record.price),
        });
    }

    let name = markets.name(expected_symbol);
    let market = markets.market_mut(expected_symbol)?;
    if !market.is_active {
        return Err(RiskError::InactiveMarket { symbol: name });
    }
    if record.timestamp < market.index_price_timestamp {
        warn!(
            symbol = %name,
            received = record.timestamp,
            last = market.index_price_timestamp,
            "Rejecting stale index price"
        );
        return Err(RiskError::StalePrice {
            symbol: name,
            received: record.timestamp,
            last: market.index_price_timestamp,
        });
    }
    if record.timestamp == market.index_price_timestamp {
        if record.price != market.index_price {
            return Err(RiskError::PriceMismatch {
                expected: market.index_price.to_string(),
                received: record.price.to_string(),
            });
        }
        return Ok(());
    }

    market.index_price = record.price;
    market.index_price_timestamp = record.timestamp;
    debug!(
        symbol = %name,
        price = %numeric::to_decimal(record.price),
        timestamp = record.timestamp,
        "Index price recorded"
    );
    Ok(())
}

/// Price used to value a position in `market`.
///
/// Deactivated markets always use the frozen deactivation price.
pub fn mark_price(
    market: &Market,
    pricing: PricingMode,
    feed: Option<&dyn PriceFeed>,
    markets: &MarketRegistry,
) -> Result<Pips, RiskError> {
    if let Some(price) = market.index_price_at_deactivation {
        return Ok(price);
    }
    let missing = || RiskError::MissingPrice {
        symbol: markets.name(market.base_symbol),
    };
    match pricing {
        PricingMode::IndexPrice => {
            if market.has_price() {
                Ok(market.index_price)
            } else {
                Err(missing())
            }
        }
        PricingMode::OracleFeed => {
            let feed = feed.ok_or_else(|| RiskError::Config {
                reason: "oracle feed pricing selected but no feed attached".to_string(),
            })?;
            feed.latest_price(market.base_symbol)
                .filter(|p| *p > 0)
                .ok_or_else(missing)
        }
    }
}
