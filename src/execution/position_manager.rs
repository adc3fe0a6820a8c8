use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use super::gateway::ExecutionGateway;
use crate::models::{OrderSide, Signal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PositionSide {
    #[serde(rename = "NONE")]
    Flat,
    #[serde(rename = "LONG")]
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Manual, // Operator-requested close
}

/// The single position slot
///
/// `Long` implies `quantity > 0` and `stop_loss < entry_price < take_profit`;
/// `Flat` implies every numeric field is zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub side: PositionSide,
    pub entry_price: f64,
    pub quantity: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

impl Position {
    pub fn flat() -> Self {
        Self {
            side: PositionSide::Flat,
            entry_price: 0.0,
            quantity: 0.0,
            stop_loss: 0.0,
            take_profit: 0.0,
        }
    }

    pub fn is_long(&self) -> bool {
        self.side == PositionSide::Long
    }

    /// Mark-to-market P&L; zero when flat
    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        if self.is_long() {
            (current_price - self.entry_price) * self.quantity
        } else {
            0.0
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::flat()
    }
}

/// Sizing and protective-level parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskParams {
    pub spend_fraction: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub qty_precision: u32,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            spend_fraction: 0.1,  // 10% of quote balance per entry
            stop_loss_pct: 0.03,  // -3% from entry
            take_profit_pct: 0.05, // +5% from entry
            qty_precision: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExitOutcome {
    NoPosition,
    Held,
    Closed {
        reason: ExitReason,
        exit_price: f64,
        quantity: f64,
        pnl: f64,
        detail: String,
    },
    CloseFailed {
        reason: ExitReason,
        detail: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    /// Position was long when the cycle started
    NotEligible,
    NoBuySignal,
    ZeroQuantity,
    Opened {
        position: Position,
        detail: String,
    },
    OpenFailed {
        quantity: f64,
        detail: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub exit: ExitOutcome,
    pub entry: EntryOutcome,
}

/// Position state machine: `Flat` <-> `Long`
///
/// Transitions only commit after the execution gateway reports success. A
/// rejected order leaves the position and realized P&L exactly as they were.
#[derive(Debug, Clone)]
pub struct PositionManager {
    position: Position,
    realized_pnl: f64,
    risk: RiskParams,
}

impl PositionManager {
    pub fn new(risk: RiskParams) -> Self {
        Self {
            position: Position::flat(),
            realized_pnl: 0.0,
            risk,
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    /// Quantity to buy for a given balance and price, floored to `qty_precision`
    pub fn calculate_order_quantity(&self, balance: f64, price: f64) -> f64 {
        if !(balance > 0.0 && price > 0.0 && balance.is_finite() && price.is_finite()) {
            return 0.0;
        }

        let raw = balance * self.risk.spend_fraction / price;
        Decimal::from_f64(raw)
            .map(|d| d.round_dp_with_strategy(self.risk.qty_precision, RoundingStrategy::ToZero))
            .and_then(|d| d.to_f64())
            .map(|q| q.max(0.0))
            .unwrap_or(0.0)
    }

    /// Stop-loss and take-profit levels for an entry price
    pub fn protective_levels(&self, entry_price: f64) -> (f64, f64) {
        let stop_loss = entry_price * (1.0 - self.risk.stop_loss_pct);
        let take_profit = entry_price * (1.0 + self.risk.take_profit_pct);
        (stop_loss, take_profit)
    }

    /// Which protective level, if any, the price has crossed
    pub fn exit_trigger(&self, current_price: f64) -> Option<ExitReason> {
        if !self.position.is_long() {
            return None;
        }

        if current_price <= self.position.stop_loss {
            Some(ExitReason::StopLoss)
        } else if current_price >= self.position.take_profit {
            Some(ExitReason::TakeProfit)
        } else {
            None
        }
    }

    /// Close the position if a protective level was hit or a close was requested
    pub async fn evaluate_exit(
        &mut self,
        gateway: &dyn ExecutionGateway,
        current_price: f64,
        close_requested: bool,
    ) -> ExitOutcome {
        if !self.position.is_long() {
            return ExitOutcome::NoPosition;
        }

        let reason = match self.exit_trigger(current_price) {
            Some(reason) => reason,
            None if close_requested => ExitReason::Manual,
            None => return ExitOutcome::Held,
        };

        let quantity = self.position.quantity;
        let outcome = gateway.place_order(OrderSide::Sell, quantity).await;

        if !outcome.success {
            tracing::warn!(
                reason = ?reason,
                price = %current_price,
                "Close failed: {}",
                outcome.detail
            );
            return ExitOutcome::CloseFailed {
                reason,
                detail: outcome.detail,
            };
        }

        let pnl = (current_price - self.position.entry_price) * quantity;
        self.realized_pnl += pnl;
        self.position = Position::flat();

        tracing::info!(
            reason = ?reason,
            price = %current_price,
            pnl = %pnl,
            "Closed LONG at {:.2} | PnL {:.2}",
            current_price,
            pnl
        );

        ExitOutcome::Closed {
            reason,
            exit_price: current_price,
            quantity,
            pnl,
            detail: outcome.detail,
        }
    }

    /// Open a long position on a BUY signal when flat
    pub async fn evaluate_entry(
        &mut self,
        gateway: &dyn ExecutionGateway,
        signal: Signal,
        current_price: f64,
        balance: f64,
    ) -> EntryOutcome {
        if self.position.is_long() {
            return EntryOutcome::NotEligible;
        }

        // SELL is informational only; exits are driven by protective levels
        if signal != Signal::Buy {
            return EntryOutcome::NoBuySignal;
        }

        let quantity = self.calculate_order_quantity(balance, current_price);
        if quantity <= 0.0 {
            tracing::debug!(balance = %balance, price = %current_price, "Order quantity rounds to zero");
            return EntryOutcome::ZeroQuantity;
        }

        let outcome = gateway.place_order(OrderSide::Buy, quantity).await;

        if !outcome.success {
            tracing::warn!(quantity, price = %current_price, "Open failed: {}", outcome.detail);
            return EntryOutcome::OpenFailed {
                quantity,
                detail: outcome.detail,
            };
        }

        let (stop_loss, take_profit) = self.protective_levels(current_price);
        self.position = Position {
            side: PositionSide::Long,
            entry_price: current_price,
            quantity,
            stop_loss,
            take_profit,
        };

        tracing::info!(
            quantity,
            entry = %current_price,
            "Opened LONG: qty={} entry={:.2} SL={:.2} TP={:.2}",
            quantity,
            current_price,
            stop_loss,
            take_profit
        );

        EntryOutcome::Opened {
            position: self.position,
            detail: outcome.detail,
        }
    }

    /// Exit evaluation, then entry evaluation
    ///
    /// A position that was long at the start of the step is never reopened in
    /// the same step, whether the close succeeded or not.
    pub async fn step(
        &mut self,
        gateway: &dyn ExecutionGateway,
        signal: Signal,
        current_price: f64,
        balance: f64,
        close_requested: bool,
    ) -> StepOutcome {
        let was_long = self.position.is_long();

        let exit = self
            .evaluate_exit(gateway, current_price, close_requested)
            .await;

        let entry = if was_long {
            EntryOutcome::NotEligible
        } else {
            self.evaluate_entry(gateway, signal, current_price, balance)
                .await
        };

        StepOutcome { exit, entry }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::gateway::{DryRunExecutor, OrderOutcome};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StubExecutor {
        fills: bool,
        orders: Mutex<Vec<(OrderSide, f64)>>,
    }

    impl StubExecutor {
        fn filling() -> Self {
            Self {
                fills: true,
                orders: Mutex::new(Vec::new()),
            }
        }

        fn rejecting() -> Self {
            Self {
                fills: false,
                orders: Mutex::new(Vec::new()),
            }
        }

        fn orders(&self) -> Vec<(OrderSide, f64)> {
            self.orders.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ExecutionGateway for StubExecutor {
        async fn place_order(&self, side: OrderSide, quantity: f64) -> OrderOutcome {
            self.orders.lock().unwrap().push((side, quantity));
            if self.fills {
                OrderOutcome::filled("order-1")
            } else {
                OrderOutcome::rejected("insufficient balance")
            }
        }

        fn label(&self) -> &str {
            "stub"
        }
    }

    fn manager() -> PositionManager {
        PositionManager::new(RiskParams::default())
    }

    fn long_position(entry: f64, quantity: f64, stop_loss: f64, take_profit: f64) -> Position {
        Position {
            side: PositionSide::Long,
            entry_price: entry,
            quantity,
            stop_loss,
            take_profit,
        }
    }

    #[test]
    fn test_starts_flat() {
        let pm = manager();
        assert_eq!(*pm.position(), Position::flat());
        assert_eq!(pm.realized_pnl(), 0.0);
        assert_eq!(pm.exit_trigger(50.0), None);
    }

    #[test]
    fn test_order_quantity_floors_to_precision() {
        let pm = manager();
        assert_eq!(pm.calculate_order_quantity(1000.0, 100.0), 1.0);
        // 100 / 30000 = 0.0033333...
        assert_eq!(pm.calculate_order_quantity(1000.0, 30000.0), 0.003333);
        // 100 / 0.7 = 142.857142857...
        let quantity = pm.calculate_order_quantity(1000.0, 0.7);
        assert!((quantity - 142.857142).abs() < 1e-9);
        assert!(quantity <= 100.0 / 0.7);
    }

    #[test]
    fn test_order_quantity_degenerate_inputs() {
        let pm = manager();
        assert_eq!(pm.calculate_order_quantity(0.0, 100.0), 0.0);
        assert_eq!(pm.calculate_order_quantity(-5.0, 100.0), 0.0);
        assert_eq!(pm.calculate_order_quantity(1000.0, 0.0), 0.0);
        assert_eq!(pm.calculate_order_quantity(1000.0, f64::NAN), 0.0);
        // 0.1 / 1e9 floors below the 6-decimal step
        assert_eq!(pm.calculate_order_quantity(1.0, 1_000_000_000.0), 0.0);
    }

    #[tokio::test]
    async fn test_buy_opens_long_with_protective_levels() {
        let mut pm = manager();
        let executor = StubExecutor::filling();

        let outcome = pm
            .evaluate_entry(&executor, Signal::Buy, 100.0, 1000.0)
            .await;

        assert!(matches!(outcome, EntryOutcome::Opened { .. }));
        let position = pm.position();
        assert_eq!(position.side, PositionSide::Long);
        assert_eq!(position.entry_price, 100.0);
        assert_eq!(position.quantity, 1.0);
        assert!((position.stop_loss - 97.0).abs() < 1e-9);
        assert!((position.take_profit - 105.0).abs() < 1e-9);
        assert!(position.stop_loss < position.entry_price);
        assert!(position.entry_price < position.take_profit);
        assert_eq!(executor.orders(), vec![(OrderSide::Buy, 1.0)]);
    }

    #[tokio::test]
    async fn test_non_buy_signals_do_not_open() {
        let mut pm = manager();
        let executor = StubExecutor::filling();

        let outcome = pm
            .evaluate_entry(&executor, Signal::Sell, 100.0, 1000.0)
            .await;
        assert_eq!(outcome, EntryOutcome::NoBuySignal);

        let outcome = pm
            .evaluate_entry(&executor, Signal::Hold, 100.0, 1000.0)
            .await;
        assert_eq!(outcome, EntryOutcome::NoBuySignal);

        assert!(executor.orders().is_empty());
        assert!(!pm.position().is_long());
    }

    #[tokio::test]
    async fn test_zero_quantity_skips_order() {
        let mut pm = manager();
        let executor = StubExecutor::filling();

        let outcome = pm.evaluate_entry(&executor, Signal::Buy, 100.0, 0.0).await;

        assert_eq!(outcome, EntryOutcome::ZeroQuantity);
        assert!(executor.orders().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_buy_stays_flat() {
        let mut pm = manager();
        let executor = StubExecutor::rejecting();

        let outcome = pm
            .evaluate_entry(&executor, Signal::Buy, 100.0, 1000.0)
            .await;

        assert!(matches!(outcome, EntryOutcome::OpenFailed { quantity, .. } if quantity == 1.0));
        assert_eq!(*pm.position(), Position::flat());
        assert_eq!(pm.realized_pnl(), 0.0);
    }

    #[tokio::test]
    async fn test_stop_loss_close_realizes_pnl() {
        let mut pm = manager();
        pm.position = long_position(100.0, 1.0, 97.0, 105.0);
        let executor = StubExecutor::filling();

        let outcome = pm.evaluate_exit(&executor, 96.0, false).await;

        match outcome {
            ExitOutcome::Closed { reason, pnl, .. } => {
                assert_eq!(reason, ExitReason::StopLoss);
                assert_eq!(pnl, -4.0);
            }
            other => panic!("expected close, got {:?}", other),
        }
        assert_eq!(pm.realized_pnl(), -4.0);
        assert_eq!(*pm.position(), Position::flat());
        assert_eq!(executor.orders(), vec![(OrderSide::Sell, 1.0)]);
    }

    #[tokio::test]
    async fn test_take_profit_close() {
        let mut pm = manager();
        pm.position = long_position(100.0, 2.0, 97.0, 105.0);
        let executor = StubExecutor::filling();

        let outcome = pm.evaluate_exit(&executor, 105.0, false).await;

        assert!(matches!(
            outcome,
            ExitOutcome::Closed { reason: ExitReason::TakeProfit, .. }
        ));
        assert_eq!(pm.realized_pnl(), 10.0);
    }

    #[tokio::test]
    async fn test_hold_between_levels() {
        let mut pm = manager();
        pm.position = long_position(100.0, 1.0, 97.0, 105.0);
        let executor = StubExecutor::filling();

        let outcome = pm.evaluate_exit(&executor, 101.0, false).await;

        assert_eq!(outcome, ExitOutcome::Held);
        assert!(executor.orders().is_empty());
        assert!(pm.position().is_long());
    }

    #[tokio::test]
    async fn test_rejected_close_leaves_position_untouched() {
        let mut pm = manager();
        let before = long_position(100.0, 1.0, 97.0, 105.0);
        pm.position = before;
        pm.realized_pnl = 12.5;
        let executor = StubExecutor::rejecting();

        let outcome = pm.evaluate_exit(&executor, 90.0, false).await;

        assert!(matches!(
            outcome,
            ExitOutcome::CloseFailed { reason: ExitReason::StopLoss, .. }
        ));
        assert_eq!(*pm.position(), before);
        assert_eq!(pm.realized_pnl(), 12.5);
    }

    #[tokio::test]
    async fn test_manual_close_request() {
        let mut pm = manager();
        pm.position = long_position(100.0, 1.0, 97.0, 105.0);
        let executor = StubExecutor::filling();

        let outcome = pm.evaluate_exit(&executor, 102.0, true).await;

        assert!(matches!(
            outcome,
            ExitOutcome::Closed { reason: ExitReason::Manual, .. }
        ));
        assert!((pm.realized_pnl() - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_close_request_while_flat_is_ignored() {
        let mut pm = manager();
        let executor = StubExecutor::filling();

        let outcome = pm.evaluate_exit(&executor, 100.0, true).await;

        assert_eq!(outcome, ExitOutcome::NoPosition);
        assert!(executor.orders().is_empty());
    }

    #[tokio::test]
    async fn test_step_never_reopens_in_same_cycle() {
        let mut pm = manager();
        pm.position = long_position(100.0, 1.0, 97.0, 105.0);
        let executor = StubExecutor::filling();

        // Stop loss hit and BUY signal in the same step
        let outcome = pm.step(&executor, Signal::Buy, 96.0, 1000.0, false).await;

        assert!(matches!(outcome.exit, ExitOutcome::Closed { .. }));
        assert_eq!(outcome.entry, EntryOutcome::NotEligible);
        assert_eq!(*pm.position(), Position::flat());
        assert_eq!(executor.orders(), vec![(OrderSide::Sell, 1.0)]);

        // Next step may open again
        let outcome = pm.step(&executor, Signal::Buy, 96.0, 1000.0, false).await;
        assert!(matches!(outcome.entry, EntryOutcome::Opened { .. }));
        assert!(pm.position().is_long());
    }

    #[tokio::test]
    async fn test_step_after_failed_close_does_not_enter() {
        let mut pm = manager();
        pm.position = long_position(100.0, 1.0, 97.0, 105.0);
        let executor = StubExecutor::rejecting();

        let outcome = pm.step(&executor, Signal::Buy, 96.0, 1000.0, false).await;

        assert!(matches!(outcome.exit, ExitOutcome::CloseFailed { .. }));
        assert_eq!(outcome.entry, EntryOutcome::NotEligible);
        assert_eq!(executor.orders().len(), 1);
    }

    #[tokio::test]
    async fn test_sell_signal_does_not_close() {
        let mut pm = manager();
        pm.position = long_position(100.0, 1.0, 97.0, 105.0);
        let executor = StubExecutor::filling();

        let outcome = pm.step(&executor, Signal::Sell, 99.0, 1000.0, false).await;

        assert_eq!(outcome.exit, ExitOutcome::Held);
        assert!(pm.position().is_long());
        assert!(executor.orders().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_transitions_match_live_success() {
        let mut dry = manager();
        let mut live = manager();
        let dry_executor = DryRunExecutor::new();
        let live_executor = StubExecutor::filling();

        for (signal, price) in [
            (Signal::Buy, 100.0),
            (Signal::Hold, 101.0),
            (Signal::Buy, 106.0),
            (Signal::Buy, 106.0),
            (Signal::Sell, 95.0),
        ] {
            dry.step(&dry_executor, signal, price, 1000.0, false).await;
            live.step(&live_executor, signal, price, 1000.0, false).await;
            assert_eq!(dry.position(), live.position());
            assert_eq!(dry.realized_pnl(), live.realized_pnl());
        }
    }

    #[test]
    fn test_unrealized_pnl() {
        let position = long_position(100.0, 2.0, 97.0, 105.0);
        assert_eq!(position.unrealized_pnl(110.0), 20.0);
        assert_eq!(position.unrealized_pnl(95.0), -10.0);
        assert_eq!(Position::flat().unrealized_pnl(95.0), 0.0);
    }
}
