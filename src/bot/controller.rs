use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use super::engine::TradingEngine;
use crate::config::BotConfig;
use crate::error::BotError;
use crate::state::{BotSnapshot, StateStore};
use crate::Result;

/// Pacing of the decision loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopTiming {
    pub interval: Duration,
    pub error_cooldown: Duration,
}

impl LoopTiming {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            interval: config.loop_interval(),
            error_cooldown: config.error_cooldown(),
        }
    }
}

impl Default for LoopTiming {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            error_cooldown: Duration::from_secs(2),
        }
    }
}

/// Lifecycle of the current run
///
/// The flag, the shutdown sender and the task handle change together, under
/// one lock, so `start` and `stop` always observe a consistent run.
#[derive(Default)]
struct RunState {
    running: bool,
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

/// Pending operator request to close the open position
#[derive(Debug, Default)]
struct CloseRequest(AtomicBool);

impl CloseRequest {
    fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Claim the request for the cycle about to run
    ///
    /// A request only applies to a position that was already open when the
    /// cycle began. Anything pending when the cycle starts flat is stale and
    /// is dropped here.
    fn take(&self, was_long: bool) -> bool {
        self.0.swap(false, Ordering::SeqCst) && was_long
    }

    /// Re-arm a claimed request whose position survived the cycle
    fn restore(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Owns the background decision loop
///
/// At most one loop runs per controller. Each run gets its own shutdown
/// channel, so a loop left over from a previous run never outlives its stop
/// even if `start` is called again straight away.
pub struct BotController {
    engine: Arc<AsyncMutex<TradingEngine>>,
    store: StateStore,
    timing: LoopTiming,
    label: String,
    run: Mutex<RunState>,
    close_request: Arc<CloseRequest>,
}

impl BotController {
    pub fn new(engine: TradingEngine, timing: LoopTiming) -> Self {
        let store = engine.store().clone();
        let label = engine.describe();

        Self {
            engine: Arc::new(AsyncMutex::new(engine)),
            store,
            timing,
            label,
            run: Mutex::new(RunState::default()),
            close_request: Arc::new(CloseRequest::default()),
        }
    }

    fn run_state(&self) -> MutexGuard<'_, RunState> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the loop; `Ok(false)` when it is already running
    pub fn start(&self) -> Result<bool> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| BotError::Runtime(e.to_string()))?;

        let mut run = self.run_state();
        if run.running {
            tracing::debug!("Start ignored, loop already running");
            return Ok(false);
        }

        self.store.set_running(true);
        self.store.log(format!("Starting bot: {}", self.label));

        let (tx, rx) = watch::channel(false);
        let handle = runtime.spawn(run_loop(
            self.engine.clone(),
            self.store.clone(),
            self.close_request.clone(),
            self.timing,
            rx,
        ));

        run.running = true;
        run.shutdown_tx = Some(tx);
        run.task = Some(handle);

        Ok(true)
    }

    /// Signal the loop to exit; `false` when it was not running
    ///
    /// Does not wait. A cycle already in flight completes first.
    pub fn stop(&self) -> bool {
        let mut run = self.run_state();
        if !run.running {
            return false;
        }

        run.running = false;
        if let Some(tx) = run.shutdown_tx.take() {
            let _ = tx.send(true);
        }

        self.store.set_running(false);
        self.store.log("Bot stopped");
        true
    }

    /// Stop and wait for the loop task to finish
    pub async fn shutdown(&self) {
        self.stop();

        let task = self.run_state().task.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!("Loop task ended abnormally: {}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.run_state().running
    }

    pub fn snapshot(&self) -> BotSnapshot {
        self.store.snapshot()
    }

    /// Ask the next cycle to close the open position
    ///
    /// Returns `false`, dropping the request, when there is nothing to close.
    pub fn request_close(&self) -> bool {
        if !self.store.snapshot().position.is_long() {
            self.store.log("Close requested with no open position, ignored");
            return false;
        }

        self.close_request.request();
        self.store.log("Close requested, will close on next cycle");
        true
    }
}

impl Drop for BotController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Decision loop for one run
///
/// The inter-cycle sleep is raced against the shutdown signal, so a stop
/// takes effect once any in-flight cycle finishes instead of after a full
/// interval.
async fn run_loop(
    engine: Arc<AsyncMutex<TradingEngine>>,
    store: StateStore,
    close_request: Arc<CloseRequest>,
    timing: LoopTiming,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let pause = {
            let mut engine = engine.lock().await;
            // A stop may have landed while a previous run held the engine
            if *shutdown.borrow() {
                break;
            }

            let close = close_request.take(engine.position().is_long());
            let result = engine.run_cycle(close).await;
            if close && engine.position().is_long() {
                close_request.restore();
            }

            match result {
                Ok(_) => timing.interval,
                Err(e) => {
                    if !e.is_recoverable() {
                        tracing::error!("Unexpected cycle failure: {}", e);
                    }
                    store.log(format!("Error in main loop: {}", e));
                    timing.error_cooldown
                }
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    tracing::debug!("Decision loop exited");
}
