//! Application Services
//!
//! The two handlers every stream worker registers on its connection, in
//! this order:
//!
//! 1. [`TickRecorder`]: appends each tick to the durable store
//! 2. [`AnomalyService`]: feeds the detector, notifies anomaly callbacks,
//!    and persists detected events

use std::sync::Arc;

use crate::domain::anomaly::AnomalyDetector;
use crate::domain::market::Tick;

use super::ports::{AnomalyCallback, HandlerError, TickHandler, TickSink};

// =============================================================================
// Tick Recorder
// =============================================================================

/// Writes every tick to the sink, unconditionally.
///
/// Reconnects replay overlapping data; this path deliberately does not
/// deduplicate (at-least-once ingestion). Failures surface as
/// [`HandlerError`] and are logged by the dispatcher.
pub struct TickRecorder {
    sink: Arc<dyn TickSink>,
}

impl TickRecorder {
    /// Create a recorder writing to the given sink.
    #[must_use]
    pub fn new(sink: Arc<dyn TickSink>) -> Self {
        Self { sink }
    }
}

impl TickHandler for TickRecorder {
    fn name(&self) -> &'static str {
        "tick-recorder"
    }

    fn on_tick(&mut self, tick: &Tick) -> Result<(), HandlerError> {
        self.sink.record_tick(tick)
    }
}

// =============================================================================
// Anomaly Service
// =============================================================================

/// Runs the anomaly detector over the tick stream.
///
/// On detection the registered callbacks are invoked synchronously in
/// registration order (each failure captured and logged), then the event is
/// persisted.
pub struct AnomalyService {
    detector: AnomalyDetector,
    sink: Arc<dyn TickSink>,
    callbacks: Vec<Box<dyn AnomalyCallback>>,
}

impl AnomalyService {
    /// Create a service around a configured detector.
    #[must_use]
    pub fn new(detector: AnomalyDetector, sink: Arc<dyn TickSink>) -> Self {
        Self {
            detector,
            sink,
            callbacks: Vec::new(),
        }
    }

    /// Register an anomaly callback; callbacks run in registration order.
    pub fn add_callback(&mut self, callback: Box<dyn AnomalyCallback>) {
        self.callbacks.push(callback);
    }
}

impl TickHandler for AnomalyService {
    fn name(&self) -> &'static str {
        "anomaly-detector"
    }

    fn on_tick(&mut self, tick: &Tick) -> Result<(), HandlerError> {
        let Some(event) = self.detector.observe(tick) else {
            return Ok(());
        };

        tracing::warn!(
            symbol = %event.symbol,
            asset_class = %event.asset_class,
            multiplier = event.multiplier,
            "volume spike detected"
        );

        for callback in &mut self.callbacks {
            if let Err(error) = callback.on_anomaly(&event) {
                tracing::error!(symbol = %event.symbol, %error, "anomaly callback failed");
            }
        }

        self.sink.record_anomaly(&event)
    }
}

// =============================================================================
// Tests
// =============================================================================
