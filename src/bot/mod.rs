pub mod controller;
pub mod engine;

pub use controller::{BotController, LoopTiming};
pub use engine::TradingEngine;
