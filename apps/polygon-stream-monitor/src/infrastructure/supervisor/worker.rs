//! Stream Worker
//!
//! One worker per asset class: it wires the persistence session, the
//! anomaly detector, and the stream connection together, then runs the
//! connection as a spawned task until it ends or the worker is cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::dispatch::Dispatcher;
use crate::application::ports::{AnomalyCallback, TickHandler, TickSink};
use crate::application::services::{AnomalyService, TickRecorder};
use crate::domain::anomaly::AnomalyDetector;
use crate::domain::channels::{ChannelBuilder, ChannelError};
use crate::domain::entitlement::Entitlement;
use crate::domain::market::{AssetClass, Symbol};
use crate::infrastructure::config::MonitorConfig;
use crate::infrastructure::polygon::{
    ConnectionState, ConnectionStatus, StreamConnection, StreamConnectionConfig,
};
use crate::infrastructure::store::{MarketStore, StoreError};

// =============================================================================
// Errors
// =============================================================================

/// Worker startup failures.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The subscription request was rejected before any I/O.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The worker's storage session could not be opened.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// =============================================================================
// Stream Worker
// =============================================================================

/// A running stream connection plus the handles to observe and stop it.
///
/// Each worker owns its storage session exclusively: the session is opened
/// here at spawn time and moves into the worker's handlers, never shared
/// across workers.
pub struct StreamWorker {
    asset_class: AssetClass,
    status: Arc<ConnectionStatus>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl StreamWorker {
    /// Build the pipeline for one asset class and spawn its connection.
    ///
    /// Handler registration order is fixed: the tick recorder first, the
    /// anomaly service second, then any externally registered handlers.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError`] when channel validation fails or the storage
    /// session cannot be opened. No task is spawned on failure.
    pub fn spawn(
        config: &MonitorConfig,
        entitlement: &Entitlement,
        symbols: &[Symbol],
        extra_handlers: Vec<Box<dyn TickHandler>>,
        anomaly_callbacks: Vec<Box<dyn AnomalyCallback>>,
    ) -> Result<Self, WorkerError> {
        let asset_class = entitlement.asset_class;
        let tokens = ChannelBuilder::build(entitlement, symbols, None)?;

        let store: Arc<dyn TickSink> = Arc::new(MarketStore::open(&config.storage.db_path)?);

        let detector = AnomalyDetector::new(config.detector.config_for(asset_class));
        let mut anomaly_service = AnomalyService::new(detector, Arc::clone(&store));
        for callback in anomaly_callbacks {
            anomaly_service.add_callback(callback);
        }

        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Box::new(TickRecorder::new(store)));
        dispatcher.register(Box::new(anomaly_service));
        for handler in extra_handlers {
            dispatcher.register(handler);
        }

        let cancel = CancellationToken::new();
        let connection = StreamConnection::new(
            StreamConnectionConfig {
                asset_class,
                endpoint: entitlement.endpoint.clone(),
                api_key: config.credential.as_str().to_string(),
                tokens,
                connect_timeout: config.connection.connect_timeout,
            },
            dispatcher,
            cancel.clone(),
        );
        let status = connection.status();

        let handle = tokio::spawn(async move {
            // The connection logs its own failure; the worker just ends.
            let _ = connection.run().await;
        });

        tracing::info!(asset_class = %asset_class, symbols = symbols.len(), "stream worker started");

        Ok(Self {
            asset_class,
            status,
            cancel,
            handle,
        })
    }

    /// Asset class this worker serves.
    #[must_use]
    pub const fn asset_class(&self) -> AssetClass {
        self.asset_class
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.status.get()
    }

    /// Whether the worker's task has ended (its connection settled in
    /// `Disconnected` on the way out).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Whether the connection is currently subscribed or streaming.
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.handle.is_finished() && self.status.is_live()
    }

    /// Cancel the worker and wait for it to stop.
    ///
    /// Returns `true` when the task ended within `timeout`; stragglers are
    /// aborted and reported as `false`.
    pub async fn shutdown(mut self, timeout: Duration) -> bool {
        self.cancel.cancel();
        if tokio::time::timeout(timeout, &mut self.handle).await.is_ok() {
            true
        } else {
            tracing::warn!(asset_class = %self.asset_class, "worker did not stop in time, aborting");
            self.handle.abort();
            false
        }
    }
}

impl std::fmt::Debug for StreamWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamWorker")
            .field("asset_class", &self.asset_class)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
