// Trading strategy module
pub mod sma_cross;

pub use sma_cross::SmaCrossStrategy;

use crate::models::{Candle, Signal};
use serde::Serialize;

/// Signal plus the diagnostic values it was derived from
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StrategyOutput {
    pub signal: Signal,
    pub fast: Option<f64>,
    pub slow: Option<f64>,
}

/// Base trait for signal strategies
///
/// Implementations must be pure: same candles in, same output out, and the
/// input slice is never modified.
pub trait Strategy: Send + Sync {
    /// Derive a signal from an ascending candle history
    fn evaluate(&self, candles: &[Candle]) -> StrategyOutput;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum candles required before the strategy can emit anything but `Hold`
    fn min_candles_required(&self) -> usize;
}
