use async_trait::async_trait;

use super::MarketDataGateway;
use crate::models::Candle;
use crate::Result;

/// Dry-run account wrapper
///
/// Delegates prices and candles to the wrapped feed but reports a fixed
/// quote balance instead of asking any venue.
pub struct PaperBalance<M> {
    inner: M,
    balance: f64,
}

impl<M: MarketDataGateway> PaperBalance<M> {
    pub fn new(inner: M, balance: f64) -> Self {
        Self { inner, balance }
    }
}

#[async_trait]
impl<M: MarketDataGateway> MarketDataGateway for PaperBalance<M> {
    async fn get_candles(&self, limit: usize) -> Result<Vec<Candle>> {
        self.inner.get_candles(limit).await
    }

    async fn get_last_price(&self) -> Result<f64> {
        self.inner.get_last_price().await
    }

    async fn get_quote_balance(&self) -> Result<f64> {
        Ok(self.balance)
    }
}
