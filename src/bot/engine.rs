use std::sync::Arc;

use crate::api::{validate_candle_order, MarketDataGateway};
use crate::config::PriceSource;
use crate::error::BotError;
use crate::execution::{
    EntryOutcome, ExecutionGateway, ExitOutcome, ExitReason, Position, PositionManager,
    RiskParams, StepOutcome,
};
use crate::state::{CycleUpdate, StateStore};
use crate::strategy::Strategy;
use crate::Result;

/// One decision cycle: fetch, evaluate, manage the position, publish
///
/// Nothing is published to the store unless the cycle gets as far as the
/// position step, so a failed fetch leaves the previous cycle's view intact.
pub struct TradingEngine {
    strategy: Box<dyn Strategy>,
    market: Arc<dyn MarketDataGateway>,
    executor: Arc<dyn ExecutionGateway>,
    positions: PositionManager,
    store: StateStore,
    max_candles: usize,
    price_source: PriceSource,
}

impl TradingEngine {
    pub fn new(
        strategy: Box<dyn Strategy>,
        market: Arc<dyn MarketDataGateway>,
        executor: Arc<dyn ExecutionGateway>,
        risk: RiskParams,
        store: StateStore,
    ) -> Self {
        let max_candles = strategy.min_candles_required().max(200);
        Self {
            strategy,
            market,
            executor,
            positions: PositionManager::new(risk),
            store,
            max_candles,
            price_source: PriceSource::LastClose,
        }
    }

    pub fn with_max_candles(mut self, max_candles: usize) -> Self {
        self.max_candles = max_candles.max(1);
        self
    }

    pub fn with_price_source(mut self, price_source: PriceSource) -> Self {
        self.price_source = price_source;
        self
    }

    pub fn position(&self) -> &Position {
        self.positions.position()
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// e.g. `SmaCrossStrategy via dry-run`
    pub fn describe(&self) -> String {
        format!("{} via {}", self.strategy.name(), self.executor.label())
    }

    pub async fn run_cycle(&mut self, close_requested: bool) -> Result<StepOutcome> {
        let candles = self.market.get_candles(self.max_candles).await?;
        validate_candle_order(&candles)?;

        let output = self.strategy.evaluate(&candles);

        let price = match self.price_source {
            PriceSource::LastClose => candles
                .last()
                .map(|c| c.close)
                .ok_or_else(|| BotError::data_fetch("no candles returned"))?,
            PriceSource::Ticker => self.market.get_last_price().await?,
        };
        if !(price > 0.0 && price.is_finite()) {
            return Err(BotError::data_fetch(format!("invalid price {}", price)));
        }

        let balance = self.market.get_quote_balance().await?;

        tracing::debug!(
            signal = %output.signal,
            fast = ?output.fast,
            slow = ?output.slow,
            price = %price,
            balance = %balance,
            "Cycle evaluated"
        );

        let step = self
            .positions
            .step(
                self.executor.as_ref(),
                output.signal,
                price,
                balance,
                close_requested,
            )
            .await;

        self.record(&step);

        self.store.commit_cycle(CycleUpdate {
            candles,
            output,
            price,
            balance,
            position: *self.positions.position(),
            realized_pnl: self.positions.realized_pnl(),
        });

        Ok(step)
    }

    fn record(&self, step: &StepOutcome) {
        match &step.exit {
            ExitOutcome::Closed {
                reason,
                exit_price,
                pnl,
                ..
            } => self.store.log(format!(
                "Closed LONG at {:.2} | PnL {:.2} ({})",
                exit_price,
                pnl,
                reason_label(*reason)
            )),
            ExitOutcome::CloseFailed { reason, detail } => self.store.log(format!(
                "Close failed ({}): {}",
                reason_label(*reason),
                detail
            )),
            ExitOutcome::NoPosition | ExitOutcome::Held => {}
        }

        match &step.entry {
            EntryOutcome::Opened { position, .. } => self.store.log(format!(
                "Opened LONG: qty={} entry={:.2} SL={:.2} TP={:.2}",
                position.quantity, position.entry_price, position.stop_loss, position.take_profit
            )),
            EntryOutcome::OpenFailed { detail, .. } => {
                self.store.log(format!("Open failed: {}", detail))
            }
            EntryOutcome::NotEligible | EntryOutcome::NoBuySignal | EntryOutcome::ZeroQuantity => {}
        }
    }
}

fn reason_label(reason: ExitReason) -> &'static str {
    match reason {
        ExitReason::StopLoss => "stop loss",
        ExitReason::TakeProfit => "take profit",
        ExitReason::Manual => "manual",
    }
}
