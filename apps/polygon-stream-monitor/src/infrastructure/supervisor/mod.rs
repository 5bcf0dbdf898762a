//! Stream Supervisor
//!
//! Runs one stream worker per asset class, health-checks them on a fixed
//! interval, and restarts workers whose connections have died. Reconnect
//! policy lives entirely here: connections never retry themselves, and a
//! restart is a cancel of the old worker followed by a fresh spawn with no
//! carried state.
//!
//! Equity-style classes are additionally gated by a local trading window;
//! crypto and other always-on classes stream around the clock.

mod hours;
mod worker;

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::application::ports::{AnomalyCallback, TickHandler};
use crate::domain::entitlement::Entitlement;
use crate::domain::market::{AssetClass, Symbol};
use crate::infrastructure::config::MonitorConfig;
use crate::infrastructure::polygon::ConnectionState;

pub use hours::TradingWindow;
pub use worker::{StreamWorker, WorkerError};

/// Factory for per-worker tick handlers; invoked at every (re)spawn so a
/// restarted worker gets a fresh handler instance.
pub type TickHandlerFactory = dyn Fn() -> Box<dyn TickHandler> + Send + Sync;

/// Factory for per-worker anomaly callbacks.
pub type AnomalyCallbackFactory = dyn Fn() -> Box<dyn AnomalyCallback> + Send + Sync;

/// One supervised asset class.
struct WorkerEntry {
    entitlement: Entitlement,
    symbols: Vec<Symbol>,
    /// Whether this class should be running; cleared only on shutdown.
    expected: bool,
    worker: Option<StreamWorker>,
}

// =============================================================================
// Stream Supervisor
// =============================================================================

/// Owns the registry of asset class → stream worker.
pub struct StreamSupervisor {
    config: Arc<MonitorConfig>,
    workers: HashMap<AssetClass, WorkerEntry>,
    tick_handler_factories: Vec<Arc<TickHandlerFactory>>,
    anomaly_callback_factories: Vec<Arc<AnomalyCallbackFactory>>,
}

impl StreamSupervisor {
    /// Create a supervisor over the given configuration.
    #[must_use]
    pub fn new(config: Arc<MonitorConfig>) -> Self {
        Self {
            config,
            workers: HashMap::new(),
            tick_handler_factories: Vec::new(),
            anomaly_callback_factories: Vec::new(),
        }
    }

    /// Register a tick-handler factory applied to every worker. This is the
    /// integration point the dashboard/alerting layer consumes.
    pub fn on_tick(&mut self, factory: impl Fn() -> Box<dyn TickHandler> + Send + Sync + 'static) {
        self.tick_handler_factories.push(Arc::new(factory));
    }

    /// Register an anomaly-callback factory applied to every worker.
    pub fn on_anomaly(
        &mut self,
        factory: impl Fn() -> Box<dyn AnomalyCallback> + Send + Sync + 'static,
    ) {
        self.anomaly_callback_factories.push(Arc::new(factory));
    }

    /// Start a worker for one asset class.
    ///
    /// A class whose entitlement blocks streaming is reported once and
    /// skipped; other classes keep running. Trading-hours-bound classes
    /// outside the window are registered but deferred until the window
    /// opens.
    pub fn start(&mut self, asset_class: AssetClass, symbols: Vec<Symbol>) {
        let entitlement = match self.config.entitlements.resolve(asset_class) {
            Ok(entitlement) => entitlement,
            Err(error) => {
                tracing::warn!(asset_class = %asset_class, %error, "skipping asset class");
                return;
            }
        };

        tracing::info!(
            asset_class = %asset_class,
            tier = %entitlement.tier,
            endpoint = %entitlement.endpoint,
            "asset class enabled"
        );

        let mut entry = WorkerEntry {
            entitlement,
            symbols,
            expected: true,
            worker: None,
        };

        if self.window_allows(asset_class) {
            let worker = self.spawn_worker(&entry);
            entry.worker = worker;
        } else {
            tracing::info!(asset_class = %asset_class, "market closed, worker deferred");
        }

        self.workers.insert(asset_class, entry);
    }

    /// Start every asset class that has configured symbols.
    pub fn start_all(&mut self) {
        for asset_class in AssetClass::ALL {
            if let Some(symbols) = self.config.symbols.get(&asset_class)
                && !symbols.is_empty()
            {
                self.start(asset_class, symbols.clone());
            }
        }
    }

    /// Number of workers currently spawned.
    #[must_use]
    pub fn active_workers(&self) -> usize {
        self.workers
            .values()
            .filter(|entry| entry.worker.is_some())
            .count()
    }

    /// Connection state of one class's worker, if it has one.
    #[must_use]
    pub fn worker_state(&self, asset_class: AssetClass) -> Option<ConnectionState> {
        self.workers
            .get(&asset_class)?
            .worker
            .as_ref()
            .map(StreamWorker::state)
    }

    /// Run the health loop until cancelled, then shut every worker down.
    ///
    /// The loop only observes and restarts; tick data never passes through
    /// the supervisor.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.supervisor.health_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so freshly started
        // workers get a full interval to come up.
        interval.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => self.health_check(),
            }
        }

        self.shutdown().await;
    }

    /// Restart every expected worker whose connection has died.
    fn health_check(&mut self) {
        let window_open = self.config.supervisor.trading_window.is_open_now();
        let mut respawn = Vec::new();

        for (asset_class, entry) in &mut self.workers {
            if !entry.expected {
                continue;
            }

            let needs_worker = match &entry.worker {
                Some(worker) => worker.is_finished(),
                None => true,
            };
            if !needs_worker {
                continue;
            }

            if asset_class.trading_hours_bound() && !window_open {
                // Outside the session a dead equity worker is normal; drop
                // the handle and wait for the window to reopen.
                entry.worker = None;
                continue;
            }

            if entry.worker.take().is_some() {
                tracing::warn!(asset_class = %asset_class, "stream worker died, restarting");
            } else {
                tracing::info!(asset_class = %asset_class, "starting deferred stream worker");
            }
            respawn.push(*asset_class);
        }

        for asset_class in respawn {
            let worker = match self.workers.get(&asset_class) {
                Some(entry) => self.spawn_worker(entry),
                None => continue,
            };
            if let Some(entry) = self.workers.get_mut(&asset_class) {
                entry.worker = worker;
            }
        }
    }

    /// Instantiate handlers/callbacks from the registered factories and
    /// spawn a worker. Spawn failures are logged and retried on the next
    /// health tick.
    fn spawn_worker(&self, entry: &WorkerEntry) -> Option<StreamWorker> {
        let extra_handlers: Vec<Box<dyn TickHandler>> = self
            .tick_handler_factories
            .iter()
            .map(|factory| factory())
            .collect();
        let callbacks: Vec<Box<dyn AnomalyCallback>> = self
            .anomaly_callback_factories
            .iter()
            .map(|factory| factory())
            .collect();

        match StreamWorker::spawn(
            &self.config,
            &entry.entitlement,
            &entry.symbols,
            extra_handlers,
            callbacks,
        ) {
            Ok(worker) => Some(worker),
            Err(error) => {
                tracing::error!(
                    asset_class = %entry.entitlement.asset_class,
                    %error,
                    "failed to start stream worker"
                );
                None
            }
        }
    }

    /// Gate for trading-hours-bound classes.
    fn window_allows(&self, asset_class: AssetClass) -> bool {
        !asset_class.trading_hours_bound()
            || self.config.supervisor.trading_window.is_open_now()
    }

    /// Signal all workers to close and wait for them, bounded by the
    /// configured shutdown timeout; stragglers are aborted.
    async fn shutdown(&mut self) {
        tracing::info!("stopping all streams");
        let timeout = self.config.supervisor.shutdown_timeout;

        let mut pending = Vec::new();
        for (_, mut entry) in self.workers.drain() {
            entry.expected = false;
            if let Some(worker) = entry.worker.take() {
                pending.push(worker.shutdown(timeout));
            }
        }

        let results = futures::future::join_all(pending).await;
        let aborted = results.iter().filter(|clean| !**clean).count();
        if aborted > 0 {
            tracing::warn!(aborted, "some workers were aborted during shutdown");
        }
        tracing::info!("all streams stopped");
    }
}

impl std::fmt::Debug for StreamSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSupervisor")
            .field("workers", &self.workers.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
