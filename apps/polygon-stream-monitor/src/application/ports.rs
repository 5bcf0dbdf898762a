//! Port Interfaces
//!
//! Contracts between the streaming pipeline and its collaborators, in the
//! Hexagonal Architecture sense.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`TickSink`]: durable recording of ticks and anomaly events
//!
//! ## Driver Ports (Inbound)
//!
//! - [`TickHandler`]: per-tick callbacks registered on a stream connection
//! - [`AnomalyCallback`]: per-anomaly callbacks registered on the detector
//!   service (consumed by the external alerting/dashboard layer)

use thiserror::Error;

use crate::domain::market::{AnomalyEvent, Tick};

/// Failure inside a registered handler or sink.
///
/// Handlers are isolated from each other: the dispatch layer logs these and
/// keeps going, so a failing handler can never starve its siblings or take
/// the connection down.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    /// Wrap any displayable error.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Receives every tick decoded from a stream connection, in arrival order.
pub trait TickHandler: Send + Sync {
    /// Stable name used in log lines when this handler fails.
    fn name(&self) -> &'static str;

    /// Process one tick.
    ///
    /// # Errors
    ///
    /// Implementations report failures instead of panicking; the dispatcher
    /// records the error and continues with the remaining handlers.
    fn on_tick(&mut self, tick: &Tick) -> Result<(), HandlerError>;
}

/// Receives every detected anomaly, synchronously, in registration order.
pub trait AnomalyCallback: Send + Sync {
    /// Handle one anomaly event.
    ///
    /// # Errors
    ///
    /// Failures are captured per callback and never interrupt detection.
    fn on_anomaly(&mut self, event: &AnomalyEvent) -> Result<(), HandlerError>;
}

impl<F> AnomalyCallback for F
where
    F: FnMut(&AnomalyEvent) -> Result<(), HandlerError> + Send + Sync,
{
    fn on_anomaly(&mut self, event: &AnomalyEvent) -> Result<(), HandlerError> {
        self(event)
    }
}

/// Durable storage for the streaming write path.
///
/// Implemented by the SQLite store; a separate trait keeps the dispatch
/// pipeline testable without a database.
pub trait TickSink: Send + Sync {
    /// Append one tick (at-least-once: duplicates across reconnects are
    /// expected and tolerated).
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the write fails; callers log and move on.
    fn record_tick(&self, tick: &Tick) -> Result<(), HandlerError>;

    /// Append one anomaly event.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the write fails; callers log and move on.
    fn record_anomaly(&self, event: &AnomalyEvent) -> Result<(), HandlerError>;
}
