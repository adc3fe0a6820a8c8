pub mod bybit;
pub mod paper;
pub mod synthetic;

pub use bybit::{BybitClient, BybitSettings};
pub use paper::PaperBalance;
pub use synthetic::SyntheticMarket;

use async_trait::async_trait;

use crate::error::BotError;
use crate::models::Candle;
use crate::Result;

/// Market data seam, one implementation per venue
#[async_trait]
pub trait MarketDataGateway: Send + Sync {
    /// Most recent `limit` candles, ascending by timestamp
    async fn get_candles(&self, limit: usize) -> Result<Vec<Candle>>;

    /// Last traded price
    async fn get_last_price(&self) -> Result<f64>;

    /// Free quote-currency balance
    async fn get_quote_balance(&self) -> Result<f64>;
}

/// Reject candle sequences that are empty or not strictly ascending
pub fn validate_candle_order(candles: &[Candle]) -> Result<()> {
    if candles.is_empty() {
        return Err(BotError::data_fetch("empty candle history"));
    }

    for pair in candles.windows(2) {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(BotError::data_fetch(format!(
                "candles out of order at {} -> {}",
                pair[0].timestamp, pair[1].timestamp
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candle_at(minute: i64) -> Candle {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Candle {
            timestamp: start + Duration::minutes(minute),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
        }
    }

    #[test]
    fn test_validate_ascending() {
        let candles = vec![candle_at(0), candle_at(1), candle_at(5)];
        assert!(validate_candle_order(&candles).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty() {
        assert!(matches!(
            validate_candle_order(&[]),
            Err(BotError::DataFetch(_))
        ));
    }

    #[test]
    fn test_validate_rejects_duplicates_and_descending() {
        let duplicate = vec![candle_at(0), candle_at(0)];
        assert!(validate_candle_order(&duplicate).is_err());

        let descending = vec![candle_at(2), candle_at(1)];
        assert!(validate_candle_order(&descending).is_err());
    }
}
