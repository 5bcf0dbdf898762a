//! Core Market Data Types
//!
//! Canonical internal representations shared by every layer: asset classes,
//! subscription tiers, normalized ticks, and detected anomaly events.
//! These types are codec-agnostic; the wire-format mapping lives in the
//! infrastructure layer.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A trading symbol (ticker or pair, e.g. `AAPL` or `BTC-USD`).
pub type Symbol = String;

// =============================================================================
// Asset Classes
// =============================================================================

/// Category of tradable instrument.
///
/// Each asset class is multiplexed over a single upstream WebSocket cluster,
/// so exactly one stream worker exists per class.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    /// Listed equities (wire name `stocks`).
    #[serde(rename = "stocks")]
    Equities,
    /// Cryptocurrency pairs.
    Crypto,
    /// Foreign exchange pairs.
    Forex,
    /// Index values.
    Indices,
    /// Listed options.
    Options,
    /// Futures contracts.
    Futures,
}

impl AssetClass {
    /// All asset classes, in a fixed iteration order.
    pub const ALL: [Self; 6] = [
        Self::Equities,
        Self::Crypto,
        Self::Forex,
        Self::Indices,
        Self::Options,
        Self::Futures,
    ];

    /// The upstream cluster path segment and storage identifier.
    #[must_use]
    pub const fn wire_name(&self) -> &'static str {
        match self {
            Self::Equities => "stocks",
            Self::Crypto => "crypto",
            Self::Forex => "forex",
            Self::Indices => "indices",
            Self::Options => "options",
            Self::Futures => "futures",
        }
    }

    /// Environment-variable suffix (`POLYGON_TIER_STOCKS`, ...).
    #[must_use]
    pub fn env_suffix(&self) -> String {
        self.wire_name().to_uppercase()
    }

    /// Parse from the wire/storage name.
    #[must_use]
    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "stocks" => Some(Self::Equities),
            "crypto" => Some(Self::Crypto),
            "forex" => Some(Self::Forex),
            "indices" => Some(Self::Indices),
            "options" => Some(Self::Options),
            "futures" => Some(Self::Futures),
            _ => None,
        }
    }

    /// Whether streaming for this class only makes sense inside an exchange
    /// trading window. Crypto, forex, and futures trade around the clock.
    #[must_use]
    pub const fn trading_hours_bound(&self) -> bool {
        matches!(self, Self::Equities | Self::Indices | Self::Options)
    }
}

impl std::fmt::Display for AssetClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

// =============================================================================
// Subscription Tiers
// =============================================================================

/// Account entitlement level for one asset class.
///
/// Totally ordered: a channel requiring `Realtime` is available on
/// `Realtime` and `RealtimePlus`, but not on `Delayed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum SubscriptionTier {
    /// No streaming access at all.
    #[default]
    None,
    /// Delayed streaming data.
    Delayed,
    /// Real-time streaming data.
    Realtime,
    /// Real-time streaming data plus depth-of-book extras.
    RealtimePlus,
}

impl SubscriptionTier {
    /// Whether this tier grants WebSocket access at all.
    #[must_use]
    pub const fn has_streaming_access(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Canonical configuration name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Delayed => "delayed",
            Self::Realtime => "realtime",
            Self::RealtimePlus => "realtime-plus",
        }
    }
}

impl std::str::FromStr for SubscriptionTier {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "delayed" => Ok(Self::Delayed),
            "realtime" => Ok(Self::Realtime),
            "realtime-plus" => Ok(Self::RealtimePlus),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Ticks
// =============================================================================

/// One normalized market observation.
///
/// Created once per decoded data message and never mutated afterwards.
/// Aggregate messages populate the OHLC fields; trades and quotes carry
/// only a price and (for trades) a size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Observation time reported by the upstream feed.
    pub timestamp: DateTime<Utc>,
    /// Trading symbol.
    pub symbol: Symbol,
    /// Asset class of the stream that produced this tick.
    pub asset_class: AssetClass,
    /// Last/close price.
    pub price: Decimal,
    /// Traded volume (fractional for crypto).
    pub volume: f64,
    /// Bar open price, when present.
    pub open: Option<Decimal>,
    /// Bar high price, when present.
    pub high: Option<Decimal>,
    /// Bar low price, when present.
    pub low: Option<Decimal>,
    /// Volume-weighted average price, when present.
    pub vwap: Option<Decimal>,
    /// Original payload, retained for auditing.
    pub raw: String,
}

// =============================================================================
// Anomaly Events
// =============================================================================

/// Kind of detected anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Volume significantly above the rolling average.
    VolumeSpike,
}

impl AnomalyKind {
    /// Storage identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::VolumeSpike => "volume_spike",
        }
    }
}

/// Lifecycle status of an anomaly event.
///
/// The `Detected -> Resolved` transition is driven by an external consumer;
/// the storage layer only has to support recording it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyStatus {
    /// Freshly detected, still open.
    Detected,
    /// Closed by a downstream consumer.
    Resolved,
}

impl AnomalyStatus {
    /// Storage identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Detected => "detected",
            Self::Resolved => "resolved",
        }
    }
}

/// A detected deviation from a symbol's recent baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    /// When the anomaly was first observed.
    pub start_time: DateTime<Utc>,
    /// When the anomaly was resolved; `None` while still open.
    pub end_time: Option<DateTime<Utc>>,
    /// Trading symbol.
    pub symbol: Symbol,
    /// Asset class of the originating stream.
    pub asset_class: AssetClass,
    /// What kind of deviation was observed.
    pub kind: AnomalyKind,
    /// Ratio of the current value to the rolling average.
    pub multiplier: f64,
    /// Observed value that triggered the event.
    pub current_value: f64,
    /// Rolling average it was compared against.
    pub average_value: f64,
    /// Lifecycle status.
    pub status: AnomalyStatus,
    /// JSON blob with detection context.
    pub details: String,
}

// =============================================================================
// Tests
// =============================================================================
