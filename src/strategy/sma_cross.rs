use super::{Strategy, StrategyOutput};
use crate::indicators::calculate_sma;
use crate::models::{Candle, Signal};

/// Fast/slow simple moving average crossover on closing prices
///
/// BUY while the fast average is above the slow one, SELL while it is below,
/// `Hold` when they are equal or either cannot be computed yet. `fast < slow`
/// is the convention but is not enforced.
#[derive(Debug, Clone)]
pub struct SmaCrossStrategy {
    fast_period: usize,
    slow_period: usize,
}

impl SmaCrossStrategy {
    pub fn new(fast_period: usize, slow_period: usize) -> Self {
        Self {
            fast_period,
            slow_period,
        }
    }

    fn extract_closes(candles: &[Candle]) -> Vec<f64> {
        candles.iter().map(|c| c.close).collect()
    }
}

impl Default for SmaCrossStrategy {
    fn default() -> Self {
        Self::new(5, 20)
    }
}

impl Strategy for SmaCrossStrategy {
    fn evaluate(&self, candles: &[Candle]) -> StrategyOutput {
        let closes = Self::extract_closes(candles);
        let fast = calculate_sma(&closes, self.fast_period);
        let slow = calculate_sma(&closes, self.slow_period);

        let signal = match (fast, slow) {
            (Some(f), Some(s)) if f > s => Signal::Buy,
            (Some(f), Some(s)) if f < s => Signal::Sell,
            _ => Signal::Hold,
        };

        StrategyOutput { signal, fast, slow }
    }

    fn name(&self) -> &str {
        "SmaCrossStrategy"
    }

    fn min_candles_required(&self) -> usize {
        self.fast_period.max(self.slow_period)
    }
}
