use async_trait::async_trait;
use serde::Serialize;

use crate::error::BotError;
use crate::models::OrderSide;
use crate::Result;

/// Result of an order submission, reported as a value rather than an error
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderOutcome {
    pub success: bool,
    pub detail: String,
}

impl OrderOutcome {
    pub fn filled(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: detail.into(),
        }
    }

    pub fn rejected(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: detail.into(),
        }
    }

    pub fn into_result(self) -> Result<String> {
        if self.success {
            Ok(self.detail)
        } else {
            Err(BotError::Order(self.detail))
        }
    }
}

/// Order submission seam
///
/// The position state machine only sees `OrderOutcome`s; whether they came
/// from a venue or from the dry-run executor is invisible to it.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    async fn place_order(&self, side: OrderSide, quantity: f64) -> OrderOutcome;

    /// Short label for logs
    fn label(&self) -> &str;
}

/// Simulated execution: every order fills immediately, nothing leaves the process
#[derive(Debug, Clone, Default)]
pub struct DryRunExecutor;

impl DryRunExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExecutionGateway for DryRunExecutor {
    async fn place_order(&self, side: OrderSide, quantity: f64) -> OrderOutcome {
        tracing::info!(side = %side, quantity, "[DRY_RUN] Place {} qty={}", side, quantity);
        OrderOutcome::filled(format!("dry-run {} qty={}", side, quantity))
    }

    fn label(&self) -> &str {
        "dry-run"
    }
}
