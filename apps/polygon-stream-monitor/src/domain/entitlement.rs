//! Entitlement Resolution
//!
//! Maps an asset class and its configured subscription tier to the upstream
//! endpoint and the set of channels that tier is allowed to subscribe to.
//!
//! Resolution is a pure function of configuration loaded once at process
//! start; nothing here performs I/O or holds mutable state.
//!
//! # Endpoints
//!
//! The upstream host is a function of the tier, not the asset class:
//! delayed-tier accounts stream from `wss://delayed.polygon.io`, real-time
//! tiers from `wss://socket.polygon.io`. Crypto is the one documented
//! exception — see [`Entitlements::resolve`].

use std::collections::HashMap;

use thiserror::Error;

use super::market::{AssetClass, SubscriptionTier};

/// Host serving delayed-tier streams.
const DELAYED_HOST: &str = "wss://delayed.polygon.io";

/// Host serving real-time streams.
const REALTIME_HOST: &str = "wss://socket.polygon.io";

// =============================================================================
// Channel Catalog
// =============================================================================

/// What kind of data a channel carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    /// Minute aggregate bars.
    Aggregates,
    /// Explicit minute aggregate bars.
    MinuteAggregates,
    /// Second aggregate bars.
    SecondAggregates,
    /// Individual trades.
    Trades,
    /// Bid/ask quotes.
    Quotes,
    /// Level 2 order book data.
    Level2,
    /// Index values.
    IndexValues,
}

/// One subscribable channel: a short wire code, the data kind it carries,
/// and the minimum tier required to use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSpec {
    /// Wire prefix, e.g. `A` or `XT`.
    pub code: &'static str,
    /// Data kind behind the code.
    pub kind: DataKind,
    /// Minimum tier at which the upstream accepts this channel.
    pub min_tier: SubscriptionTier,
}

/// The full channel catalog for an asset class.
#[must_use]
pub const fn channel_catalog(asset_class: AssetClass) -> &'static [ChannelSpec] {
    use DataKind::{
        Aggregates, IndexValues, Level2, MinuteAggregates, Quotes, SecondAggregates, Trades,
    };
    use SubscriptionTier::{Delayed, Realtime, RealtimePlus};

    match asset_class {
        AssetClass::Equities => &[
            ChannelSpec { code: "A", kind: Aggregates, min_tier: Delayed },
            ChannelSpec { code: "AM", kind: MinuteAggregates, min_tier: Delayed },
            ChannelSpec { code: "AS", kind: SecondAggregates, min_tier: Realtime },
            ChannelSpec { code: "T", kind: Trades, min_tier: Realtime },
            ChannelSpec { code: "Q", kind: Quotes, min_tier: Realtime },
        ],
        AssetClass::Crypto => &[
            ChannelSpec { code: "XA", kind: Aggregates, min_tier: Delayed },
            ChannelSpec { code: "XAS", kind: SecondAggregates, min_tier: Realtime },
            ChannelSpec { code: "XT", kind: Trades, min_tier: Realtime },
            ChannelSpec { code: "XQ", kind: Quotes, min_tier: Realtime },
            ChannelSpec { code: "XL2", kind: Level2, min_tier: RealtimePlus },
        ],
        AssetClass::Forex => &[
            ChannelSpec { code: "C", kind: Quotes, min_tier: Delayed },
            ChannelSpec { code: "CA", kind: Aggregates, min_tier: Delayed },
        ],
        AssetClass::Indices => &[
            ChannelSpec { code: "V", kind: IndexValues, min_tier: Delayed },
            ChannelSpec { code: "A", kind: Aggregates, min_tier: Delayed },
        ],
        AssetClass::Options => &[
            ChannelSpec { code: "A", kind: Aggregates, min_tier: Delayed },
            ChannelSpec { code: "T", kind: Trades, min_tier: Realtime },
            ChannelSpec { code: "Q", kind: Quotes, min_tier: Realtime },
        ],
        AssetClass::Futures => &[
            ChannelSpec { code: "A", kind: Aggregates, min_tier: Delayed },
            ChannelSpec { code: "T", kind: Trades, min_tier: Realtime },
            ChannelSpec { code: "Q", kind: Quotes, min_tier: Realtime },
        ],
    }
}

/// The channel code used when a subscription does not name any.
#[must_use]
pub const fn default_channel(asset_class: AssetClass) -> &'static str {
    match asset_class {
        AssetClass::Equities => "A",
        AssetClass::Crypto => "XA",
        AssetClass::Forex => "C",
        AssetClass::Indices => "V",
        AssetClass::Options | AssetClass::Futures => "A",
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Structural entitlement failure.
///
/// Non-retryable without reconfiguration: callers must skip the asset class
/// for the process lifetime instead of retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntitlementError {
    /// The configured tier grants no WebSocket access at all.
    #[error("streaming is not available for {asset_class} on the {tier} tier")]
    StreamingDisabled {
        /// Asset class that was requested.
        asset_class: AssetClass,
        /// Tier it resolved to.
        tier: SubscriptionTier,
    },
}

// =============================================================================
// Entitlements
// =============================================================================

/// Per-asset-class subscription tiers and endpoint overrides.
///
/// Loaded once at startup and passed by reference to every component that
/// needs it; read-only for the process lifetime.
#[derive(Debug, Clone, Default)]
pub struct Entitlements {
    tiers: HashMap<AssetClass, SubscriptionTier>,
    endpoint_overrides: HashMap<AssetClass, String>,
}

/// A resolved entitlement: endpoint plus the channels the tier unlocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entitlement {
    /// Asset class this entitlement applies to.
    pub asset_class: AssetClass,
    /// Resolved subscription tier.
    pub tier: SubscriptionTier,
    /// WebSocket endpoint to connect to.
    pub endpoint: String,
    /// Channels available at this tier, in catalog order.
    pub channels: Vec<ChannelSpec>,
}

impl Entitlement {
    /// Look up an available channel by code.
    #[must_use]
    pub fn channel(&self, code: &str) -> Option<&ChannelSpec> {
        self.channels.iter().find(|spec| spec.code == code)
    }

    /// Whether the given channel code is available at this tier.
    #[must_use]
    pub fn allows(&self, code: &str) -> bool {
        self.channel(code).is_some()
    }
}

impl Entitlements {
    /// Build entitlements from resolved tiers and optional endpoint overrides.
    #[must_use]
    pub fn new(
        tiers: HashMap<AssetClass, SubscriptionTier>,
        endpoint_overrides: HashMap<AssetClass, String>,
    ) -> Self {
        Self {
            tiers,
            endpoint_overrides,
        }
    }

    /// The tier resolved for an asset class; classes with missing
    /// configuration resolve to [`SubscriptionTier::None`].
    #[must_use]
    pub fn tier(&self, asset_class: AssetClass) -> SubscriptionTier {
        self.tiers.get(&asset_class).copied().unwrap_or_default()
    }

    /// Resolve the endpoint and available channels for an asset class.
    ///
    /// # Errors
    ///
    /// Returns [`EntitlementError::StreamingDisabled`] when the resolved tier
    /// has no WebSocket access. This is a structural block on the asset
    /// class, not a transient failure.
    pub fn resolve(&self, asset_class: AssetClass) -> Result<Entitlement, EntitlementError> {
        let tier = self.tier(asset_class);
        if !tier.has_streaming_access() {
            return Err(EntitlementError::StreamingDisabled { asset_class, tier });
        }

        let endpoint = self
            .endpoint_overrides
            .get(&asset_class)
            .cloned()
            .unwrap_or_else(|| Self::endpoint_for(asset_class, tier));

        let channels = channel_catalog(asset_class)
            .iter()
            .filter(|spec| spec.min_tier <= tier)
            .copied()
            .collect();

        Ok(Entitlement {
            asset_class,
            tier,
            endpoint,
            channels,
        })
    }

    /// Default endpoint for an asset class at a given tier.
    fn endpoint_for(asset_class: AssetClass, tier: SubscriptionTier) -> String {
        let host = match tier {
            // Upstream serves delayed-tier crypto from the real-time cluster.
            // Deliberately a single special case, not a rule.
            SubscriptionTier::Delayed if asset_class == AssetClass::Crypto => REALTIME_HOST,
            SubscriptionTier::Delayed => DELAYED_HOST,
            _ => REALTIME_HOST,
        };
        format!("{host}/{}", asset_class.wire_name())
    }
}

// =============================================================================
// Tests
// =============================================================================
