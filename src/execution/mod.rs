// Order execution and position lifecycle
pub mod gateway;
pub mod position_manager;

pub use gateway::{DryRunExecutor, ExecutionGateway, OrderOutcome};
pub use position_manager::{
    EntryOutcome, ExitOutcome, ExitReason, Position, PositionManager, PositionSide, RiskParams,
    StepOutcome,
};
