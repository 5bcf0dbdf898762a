//! Polygon WebSocket Message Types
//!
//! Wire format types for the Polygon.io streaming clusters. All clusters
//! share one JSON protocol: outbound requests are single objects with an
//! `action` and a `params` string, inbound frames are arrays of objects
//! discriminated by an `ev` field.
//!
//! # Outbound
//!
//! ```json
//! {"action":"auth","params":"<api key>"}
//! {"action":"subscribe","params":"A.AAPL,A.MSFT"}
//! {"action":"unsubscribe","params":"A.AAPL"}
//! ```
//!
//! # Inbound
//!
//! - `status`: connection/auth/subscription acknowledgments
//! - `A` / `AM` / `AS` / `XA` / `XAS` / `CA`: OHLCV aggregate bars
//! - `T` / `XT`: individual trades
//! - `Q` / `XQ`: bid/ask quotes
//!
//! Equity payloads carry the symbol in `sym`; crypto payloads use `pair`.
//! Timestamps are epoch milliseconds (`s`/`e` bar boundaries, `t` for
//! trades and quotes).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::market::{AssetClass, Tick};

// =============================================================================
// Outbound Requests
// =============================================================================

/// Action verb for an outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedAction {
    /// Authenticate the connection.
    Auth,
    /// Subscribe to channel tokens.
    Subscribe,
    /// Unsubscribe from channel tokens.
    Unsubscribe,
}

/// One outbound control request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRequest {
    /// Verb.
    pub action: FeedAction,
    /// Credential or comma-joined channel tokens.
    pub params: String,
}

impl FeedRequest {
    /// Authentication request carrying the API key.
    #[must_use]
    pub fn auth(api_key: &str) -> Self {
        Self {
            action: FeedAction::Auth,
            params: api_key.to_string(),
        }
    }

    /// Subscribe to the given tokens in one request.
    #[must_use]
    pub fn subscribe(tokens: &[String]) -> Self {
        Self {
            action: FeedAction::Subscribe,
            params: tokens.join(","),
        }
    }

    /// Unsubscribe from the given tokens in one request.
    #[must_use]
    pub fn unsubscribe(tokens: &[String]) -> Self {
        Self {
            action: FeedAction::Unsubscribe,
            params: tokens.join(","),
        }
    }
}

// =============================================================================
// Inbound Messages
// =============================================================================

/// Connection lifecycle acknowledgment.
///
/// ```json
/// {"ev":"status","status":"auth_success","message":"authenticated"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    /// Discriminator (always `status`).
    #[serde(rename = "ev", default)]
    pub event: String,
    /// Status code: `connected`, `auth_success`, `auth_failed`, `success`, ...
    #[serde(default)]
    pub status: String,
    /// Human-readable detail.
    #[serde(default)]
    pub message: String,
}

/// OHLCV aggregate bar.
///
/// ```json
/// {"ev":"XA","pair":"BTC-USD","o":42001.5,"h":42050.0,"l":41980.2,
///  "c":42030.8,"v":951.6,"vw":42015.1,"s":1610144640000,"e":1610144700000}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateMessage {
    /// Discriminator (`A`, `AM`, `AS`, `XA`, `XAS`, `CA`).
    #[serde(rename = "ev", default)]
    pub event: String,
    /// Symbol (`sym` for equities, `pair` for crypto).
    #[serde(rename = "sym", alias = "pair", default)]
    pub symbol: String,
    /// Open price.
    #[serde(rename = "o", default)]
    pub open: Decimal,
    /// High price.
    #[serde(rename = "h", default)]
    pub high: Decimal,
    /// Low price.
    #[serde(rename = "l", default)]
    pub low: Decimal,
    /// Close price.
    #[serde(rename = "c", default)]
    pub close: Decimal,
    /// Volume over the bar (fractional for crypto).
    #[serde(rename = "v", default)]
    pub volume: f64,
    /// Volume-weighted average price.
    #[serde(rename = "vw", default)]
    pub vwap: Option<Decimal>,
    /// Trades in the bar, when the cluster reports it.
    #[serde(rename = "n", default)]
    pub trade_count: Option<i64>,
    /// Bar start, epoch milliseconds.
    #[serde(rename = "s", default)]
    pub start_ms: i64,
    /// Bar end, epoch milliseconds.
    #[serde(rename = "e", default)]
    pub end_ms: i64,
}

/// Individual trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeMessage {
    /// Discriminator (`T`, `XT`).
    #[serde(rename = "ev", default)]
    pub event: String,
    /// Symbol or pair.
    #[serde(rename = "sym", alias = "pair", default)]
    pub symbol: String,
    /// Trade price.
    #[serde(rename = "p", default)]
    pub price: Decimal,
    /// Trade size.
    #[serde(rename = "s", default)]
    pub size: f64,
    /// Trade time, epoch milliseconds.
    #[serde(rename = "t", default)]
    pub timestamp_ms: i64,
    /// Exchange identifier.
    #[serde(rename = "x", default)]
    pub exchange: Option<i64>,
    /// Condition codes.
    #[serde(rename = "c", default)]
    pub conditions: Vec<i64>,
}

/// Bid/ask quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteMessage {
    /// Discriminator (`Q`, `XQ`).
    #[serde(rename = "ev", default)]
    pub event: String,
    /// Symbol or pair.
    #[serde(rename = "sym", alias = "pair", default)]
    pub symbol: String,
    /// Bid price.
    #[serde(rename = "bp", default)]
    pub bid_price: Decimal,
    /// Bid size.
    #[serde(rename = "bs", default)]
    pub bid_size: f64,
    /// Ask price.
    #[serde(rename = "ap", default)]
    pub ask_price: Decimal,
    /// Ask size.
    #[serde(rename = "as", default)]
    pub ask_size: f64,
    /// Quote time, epoch milliseconds.
    #[serde(rename = "t", default)]
    pub timestamp_ms: i64,
}

// =============================================================================
// Tick Normalization
// =============================================================================

/// Millisecond timestamp to UTC, falling back to "now" for absent or
/// nonsensical values (some clusters omit bar boundaries on replays).
fn timestamp_from_millis(ms: i64) -> DateTime<Utc> {
    if ms > 0 {
        DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
    } else {
        Utc::now()
    }
}

impl AggregateMessage {
    /// Normalize into a [`Tick`], stamped with the bar's start time.
    #[must_use]
    pub fn to_tick(&self, asset_class: AssetClass) -> Tick {
        Tick {
            timestamp: timestamp_from_millis(self.start_ms),
            symbol: self.symbol.clone(),
            asset_class,
            price: self.close,
            volume: self.volume,
            open: Some(self.open),
            high: Some(self.high),
            low: Some(self.low),
            vwap: self.vwap,
            raw: serde_json::to_string(self).unwrap_or_default(),
        }
    }
}

impl TradeMessage {
    /// Normalize into a [`Tick`]; trades carry no bar fields.
    #[must_use]
    pub fn to_tick(&self, asset_class: AssetClass) -> Tick {
        Tick {
            timestamp: timestamp_from_millis(self.timestamp_ms),
            symbol: self.symbol.clone(),
            asset_class,
            price: self.price,
            volume: self.size,
            open: None,
            high: None,
            low: None,
            vwap: None,
            raw: serde_json::to_string(self).unwrap_or_default(),
        }
    }
}

impl QuoteMessage {
    /// Normalize into a [`Tick`] at the bid/ask midpoint.
    ///
    /// Quotes carry no traded volume; the zero volume keeps them out of the
    /// anomaly detector while still landing in the tick log.
    #[must_use]
    pub fn to_tick(&self, asset_class: AssetClass) -> Tick {
        Tick {
            timestamp: timestamp_from_millis(self.timestamp_ms),
            symbol: self.symbol.clone(),
            asset_class,
            price: (self.bid_price + self.ask_price) / Decimal::TWO,
            volume: 0.0,
            open: None,
            high: None,
            low: None,
            vwap: None,
            raw: serde_json::to_string(self).unwrap_or_default(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_request_wire_format() {
        let json = serde_json::to_string(&FeedRequest::auth("my_key")).unwrap();
        assert_eq!(json, r#"{"action":"auth","params":"my_key"}"#);
    }

    #[test]
    fn subscribe_request_joins_tokens_with_commas() {
        let tokens = vec!["XA.BTC-USD".to_string(), "XA.ETH-USD".to_string()];
        let json = serde_json::to_string(&FeedRequest::subscribe(&tokens)).unwrap();
        assert_eq!(
            json,
            r#"{"action":"subscribe","params":"XA.BTC-USD,XA.ETH-USD"}"#
        );
    }

    #[test]
    fn unsubscribe_request_wire_format() {
        let tokens = vec!["A.AAPL".to_string()];
        let json = serde_json::to_string(&FeedRequest::unsubscribe(&tokens)).unwrap();
        assert!(json.contains(r#""action":"unsubscribe""#));
    }

    #[test]
    fn status_message_decodes() {
        let msg: StatusMessage =
            serde_json::from_str(r#"{"ev":"status","status":"auth_success","message":"authenticated"}"#)
                .unwrap();
        assert_eq!(msg.status, "auth_success");
        assert_eq!(msg.message, "authenticated");
    }

    #[test]
    fn crypto_aggregate_uses_pair_for_the_symbol() {
        let msg: AggregateMessage = serde_json::from_str(
            r#"{"ev":"XA","pair":"BTC-USD","o":42001.5,"h":42050.0,"l":41980.2,
                "c":42030.8,"v":951.6,"vw":42015.1,"s":1610144640000,"e":1610144700000}"#,
        )
        .unwrap();

        assert_eq!(msg.symbol, "BTC-USD");
        assert_eq!(msg.volume, 951.6);
        assert_eq!(msg.start_ms, 1_610_144_640_000);
    }

    #[test]
    fn equity_aggregate_uses_sym_for_the_symbol() {
        let msg: AggregateMessage = serde_json::from_str(
            r#"{"ev":"A","sym":"AAPL","o":190.1,"h":190.5,"l":189.9,"c":190.3,
                "v":4110,"vw":190.2,"n":85,"s":1610144868000,"e":1610144869000}"#,
        )
        .unwrap();

        assert_eq!(msg.symbol, "AAPL");
        assert_eq!(msg.trade_count, Some(85));
    }

    #[test]
    fn missing_numeric_fields_default_to_zero() {
        let msg: AggregateMessage =
            serde_json::from_str(r#"{"ev":"XA","pair":"BTC-USD"}"#).unwrap();
        assert_eq!(msg.close, Decimal::ZERO);
        assert_eq!(msg.volume, 0.0);
        assert!(msg.vwap.is_none());
    }

    #[test]
    fn aggregate_tick_carries_the_bar() {
        let msg: AggregateMessage = serde_json::from_str(
            r#"{"ev":"XA","pair":"ETH-USD","o":2000.0,"h":2010.0,"l":1995.0,
                "c":2005.0,"v":12.5,"vw":2004.1,"s":1610144640000}"#,
        )
        .unwrap();

        let tick = msg.to_tick(AssetClass::Crypto);
        assert_eq!(tick.symbol, "ETH-USD");
        assert_eq!(tick.asset_class, AssetClass::Crypto);
        assert_eq!(tick.price, msg.close);
        assert_eq!(tick.volume, 12.5);
        assert_eq!(tick.open, Some(msg.open));
        assert_eq!(tick.timestamp.timestamp_millis(), 1_610_144_640_000);
        assert!(tick.raw.contains("ETH-USD"));
    }

    #[test]
    fn trade_tick_uses_price_and_size() {
        let msg: TradeMessage = serde_json::from_str(
            r#"{"ev":"T","sym":"MSFT","p":114.125,"s":100,"t":1536036818784,"x":4,"c":[0,12]}"#,
        )
        .unwrap();

        let tick = msg.to_tick(AssetClass::Equities);
        assert_eq!(tick.price, msg.price);
        assert_eq!(tick.volume, 100.0);
        assert!(tick.open.is_none());
    }

    #[test]
    fn quote_tick_sits_at_the_midpoint() {
        let msg: QuoteMessage = serde_json::from_str(
            r#"{"ev":"Q","sym":"AAPL","bp":100.0,"bs":2,"ap":101.0,"as":3,"t":1536036818784}"#,
        )
        .unwrap();

        let tick = msg.to_tick(AssetClass::Equities);
        assert_eq!(tick.price, Decimal::new(1005, 1));
        assert_eq!(tick.volume, 0.0);
    }

    #[test]
    fn zero_timestamp_falls_back_to_now() {
        let msg: AggregateMessage =
            serde_json::from_str(r#"{"ev":"XA","pair":"BTC-USD","c":1.0,"v":1.0}"#).unwrap();
        let before = Utc::now();
        let tick = msg.to_tick(AssetClass::Crypto);
        assert!(tick.timestamp >= before);
    }
}
