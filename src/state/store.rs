use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};

use super::ring::BoundedRing;
use crate::execution::Position;
use crate::models::{Candle, LogEntry, Signal, SignalRecord};
use crate::strategy::StrategyOutput;

pub const LOG_CAPACITY: usize = 500;
pub const SIGNAL_CAPACITY: usize = 50;

/// Live aggregate, only ever touched under the store's lock
#[derive(Debug)]
struct BotState {
    running: bool,
    candles: Vec<Candle>,
    fast: Option<f64>,
    slow: Option<f64>,
    last_signal: Option<Signal>,
    balance: f64,
    position: Position,
    realized_pnl: f64,
    logs: BoundedRing<LogEntry>,
    signals: BoundedRing<SignalRecord>,
    cycles: u64,
    last_cycle_at: Option<DateTime<Utc>>,
}

impl BotState {
    fn new() -> Self {
        Self {
            running: false,
            candles: Vec::new(),
            fast: None,
            slow: None,
            last_signal: None,
            balance: 0.0,
            position: Position::flat(),
            realized_pnl: 0.0,
            logs: BoundedRing::new(LOG_CAPACITY),
            signals: BoundedRing::new(SIGNAL_CAPACITY),
            cycles: 0,
            last_cycle_at: None,
        }
    }
}

/// Immutable copy of the bot state handed to readers
#[derive(Debug, Clone, Serialize)]
pub struct BotSnapshot {
    pub running: bool,
    pub candles: Vec<Candle>,
    pub fast: Option<f64>,
    pub slow: Option<f64>,
    pub last_signal: Option<Signal>,
    pub balance: f64,
    pub position: Position,
    pub realized_pnl: f64,
    pub logs: Vec<LogEntry>,
    pub signals: Vec<SignalRecord>,
    pub cycles: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

/// Everything one decision cycle publishes, applied in a single write
#[derive(Debug, Clone)]
pub struct CycleUpdate {
    pub candles: Vec<Candle>,
    pub output: StrategyOutput,
    pub price: f64,
    pub balance: f64,
    pub position: Position,
    pub realized_pnl: f64,
}

/// Single-writer, many-reader state store
///
/// Cloning yields another handle to the same state. Writes are crate-private
/// so only the trading engine and its controller mutate it; everyone else
/// gets `snapshot()`.
#[derive(Debug, Clone)]
pub struct StateStore {
    inner: Arc<RwLock<BotState>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(BotState::new())),
        }
    }

    pub fn snapshot(&self) -> BotSnapshot {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);

        BotSnapshot {
            running: state.running,
            candles: state.candles.clone(),
            fast: state.fast,
            slow: state.slow,
            last_signal: state.last_signal,
            balance: state.balance,
            position: state.position,
            realized_pnl: state.realized_pnl,
            logs: state.logs.to_vec(),
            signals: state.signals.to_vec(),
            cycles: state.cycles,
            last_cycle_at: state.last_cycle_at,
        }
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .running = running;
    }

    /// Append to the log ring and echo through tracing
    pub(crate) fn log(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{}", message);

        let entry = LogEntry {
            time: Utc::now(),
            message,
        };
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .logs
            .push(entry);
    }

    pub(crate) fn commit_cycle(&self, update: CycleUpdate) {
        let now = Utc::now();
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        state.candles = update.candles;
        state.fast = update.output.fast;
        state.slow = update.output.slow;
        state.last_signal = Some(update.output.signal);

        if update.output.signal != Signal::Hold {
            state.signals.push(SignalRecord {
                time: now,
                signal: update.output.signal,
                price: update.price,
            });
        }

        state.balance = update.balance;
        state.position = update.position;
        state.realized_pnl = update.realized_pnl;
        state.cycles += 1;
        state.last_cycle_at = Some(now);
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
