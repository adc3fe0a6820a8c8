// Core modules
pub mod api;
pub mod bot;
pub mod config;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod state;
pub mod strategy;

// Re-export commonly used types
pub use bot::{BotController, LoopTiming, TradingEngine};
pub use config::BotConfig;
pub use error::BotError;
pub use models::*;
pub use strategy::Strategy;

// Error handling
pub type Result<T> = std::result::Result<T, BotError>;
