//! Application Layer - Use cases and port definitions.
//!
//! Defines how the domain interacts with external systems: the port
//! contracts, the ordered tick fan-out, and the services a stream worker
//! wires together.

/// Ordered tick handler fan-out.
pub mod dispatch;

/// Port interfaces for handlers, callbacks, and durable sinks.
pub mod ports;

/// Tick recording and anomaly detection services.
pub mod services;
