use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use super::MarketDataGateway;
use crate::models::Candle;
use crate::Result;

const HISTORY_CAPACITY: usize = 1000;

struct FeedState {
    rng: StdRng,
    candles: VecDeque<Candle>,
    next_timestamp: DateTime<Utc>,
    last_close: f64,
}

/// Offline random-walk market
///
/// Every `get_candles` call advances the walk by one candle, so each loop
/// cycle sees a fresh bar. Seeded for reproducible runs.
pub struct SyntheticMarket {
    state: Mutex<FeedState>,
    interval: Duration,
    volatility: f64,
    balance: f64,
}

impl SyntheticMarket {
    /// # Arguments
    /// * `seed` - RNG seed
    /// * `start_price` - First close
    /// * `interval_minutes` - Spacing between candles
    /// * `balance` - Quote balance reported to the bot
    pub fn new(seed: u64, start_price: f64, interval_minutes: i64, balance: f64) -> Self {
        let interval = Duration::minutes(interval_minutes.clamp(1, 43_200));

        Self {
            state: Mutex::new(FeedState {
                rng: StdRng::seed_from_u64(seed),
                candles: VecDeque::with_capacity(HISTORY_CAPACITY),
                next_timestamp: Utc::now() - interval * HISTORY_CAPACITY as i32,
                last_close: start_price,
            }),
            interval,
            volatility: 0.004, // ~0.4% per bar
            balance,
        }
    }

    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = volatility;
        self
    }

    fn next_candle(&self, state: &mut FeedState) -> Candle {
        let open = state.last_close;
        let change = state.rng.gen_range(-self.volatility..=self.volatility);
        let close = (open * (1.0 + change)).max(0.01);
        let wick = state.rng.gen_range(0.0..=self.volatility / 2.0);
        let volume = state.rng.gen_range(10.0..100.0);

        let candle = Candle {
            timestamp: state.next_timestamp,
            open,
            high: open.max(close) * (1.0 + wick),
            low: open.min(close) * (1.0 - wick),
            close,
            volume,
        };

        state.next_timestamp += self.interval;
        state.last_close = close;
        candle
    }

    fn push_candle(&self, state: &mut FeedState) {
        let candle = self.next_candle(state);
        state.candles.push_back(candle);
        while state.candles.len() > HISTORY_CAPACITY {
            state.candles.pop_front();
        }
    }
}

#[async_trait]
impl MarketDataGateway for SyntheticMarket {
    async fn get_candles(&self, limit: usize) -> Result<Vec<Candle>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        // Backfill on first use, then one new bar per call
        while state.candles.len() < limit.min(HISTORY_CAPACITY) {
            self.push_candle(&mut state);
        }
        self.push_candle(&mut state);

        let skip = state.candles.len().saturating_sub(limit);
        Ok(state.candles.iter().skip(skip).cloned().collect())
    }

    async fn get_last_price(&self) -> Result<f64> {
        Ok(self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_close)
    }

    async fn get_quote_balance(&self) -> Result<f64> {
        Ok(self.balance)
    }
}
