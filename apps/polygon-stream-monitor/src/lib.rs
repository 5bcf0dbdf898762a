#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Polygon Stream Monitor - Multi-Asset Market Data Ingestion
//!
//! Maintains one WebSocket connection per Polygon.io asset-class cluster,
//! normalizes inbound market data into ticks, flags volume spikes against
//! a rolling per-symbol baseline, and persists both ticks and anomaly
//! events to SQLite.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: pure market data logic
//!   - `market`: asset classes, tiers, ticks, anomaly events
//!   - `entitlement`: tier → endpoint/channel resolution
//!   - `channels`: subscription token building
//!   - `anomaly`: sliding-window volume spike detection
//!
//! - **Application**: ports and services
//!   - `ports`: handler/callback/sink contracts
//!   - `dispatch`: ordered handler fan-out with per-handler error capture
//!   - `services`: tick recording and anomaly detection services
//!
//! - **Infrastructure**: adapters
//!   - `polygon`: WebSocket protocol, codec, connection state machine
//!   - `store`: SQLite tick/anomaly logs
//!   - `supervisor`: per-asset-class workers, health loop, restart policy
//!   - `config`: environment configuration
//!   - `telemetry`: tracing setup
//!
//! # Data Flow
//!
//! ```text
//! Polygon stocks WS ──┐
//!                     │    ┌────────────┐    ┌─────────────────┐
//! Polygon crypto WS ──┼───►│ Dispatcher │───►│ Tick Recorder   │──► SQLite
//!                     │    │ (per class)│    ├─────────────────┤
//! Polygon ...    WS ──┘    └────────────┘    │ Anomaly Service │──► SQLite
//!                                            └─────────────────┘
//!                    Supervisor health loop observes and restarts workers
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core market data types and business logic.
pub mod domain;

/// Application layer - Ports, dispatch, and services.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::anomaly::{AnomalyDetector, DetectorConfig};
pub use domain::channels::{ChannelBuilder, ChannelError};
pub use domain::entitlement::{
    ChannelSpec, DataKind, Entitlement, EntitlementError, Entitlements, channel_catalog,
    default_channel,
};
pub use domain::market::{
    AnomalyEvent, AnomalyKind, AnomalyStatus, AssetClass, SubscriptionTier, Symbol, Tick,
};

// Application ports and services
pub use application::dispatch::Dispatcher;
pub use application::ports::{AnomalyCallback, HandlerError, TickHandler, TickSink};
pub use application::services::{AnomalyService, TickRecorder};

// Infrastructure config
pub use infrastructure::config::{ConfigError, Credential, MonitorConfig};

// Polygon protocol (for integration tests)
pub use infrastructure::polygon::{
    ConnectionError, ConnectionState, ConnectionStatus, FeedMessage, FeedRequest, JsonCodec,
    StreamConnection, StreamConnectionConfig,
};

// Storage
pub use infrastructure::store::{
    AnomalyRecord, CleanupReport, MarketStore, StoreError, StoreStats, TickRecord,
};

// Supervision
pub use infrastructure::supervisor::{StreamSupervisor, StreamWorker, TradingWindow, WorkerError};
