//! Stream Codec
//!
//! Decodes inbound Polygon WebSocket frames. A frame is a JSON array of
//! message objects (occasionally a bare object); every object carries an
//! `ev` discriminator identifying status vs. data kind.
//!
//! Decoding is two-level on purpose: a frame that is not valid JSON fails
//! as a whole, while a single malformed object inside an otherwise valid
//! frame only fails that object. The connection logs item failures and
//! keeps streaming — a lone bad message must never take the socket down.

use serde_json::Value;

use super::messages::{AggregateMessage, QuoteMessage, StatusMessage, TradeMessage};

// =============================================================================
// Errors
// =============================================================================

/// Codec failures.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON parsing failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame is neither a JSON array nor an object.
    #[error("invalid frame: expected JSON array or object, got: {0}")]
    InvalidFrame(String),

    /// A message object has no `ev` discriminator.
    #[error("message without an 'ev' discriminator")]
    MissingDiscriminator,
}

// =============================================================================
// Decoded Messages
// =============================================================================

/// One classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    /// Connection lifecycle acknowledgment; drives state, never persisted.
    Status(StatusMessage),
    /// OHLCV aggregate bar.
    Aggregate(AggregateMessage),
    /// Individual trade.
    Trade(TradeMessage),
    /// Bid/ask quote.
    Quote(QuoteMessage),
    /// Recognized frame, unrecognized discriminator (e.g. forex `C` rows or
    /// book depth the subscription never asked for).
    Unknown {
        /// The discriminator that was not recognized.
        event: String,
    },
}

/// JSON codec for the Polygon streaming clusters.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one frame into its classified messages.
    ///
    /// The outer `Result` fails only when the frame itself is undecodable;
    /// each inner `Result` fails independently for malformed items.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when the frame is not a JSON array or object.
    pub fn decode(&self, text: &str) -> Result<Vec<Result<FeedMessage, CodecError>>, CodecError> {
        let trimmed = text.trim();

        let values: Vec<Value> = if trimmed.starts_with('[') {
            serde_json::from_str(trimmed)?
        } else if trimmed.starts_with('{') {
            vec![serde_json::from_str(trimmed)?]
        } else {
            let preview = &trimmed[..trimmed.len().min(50)];
            return Err(CodecError::InvalidFrame(preview.to_string()));
        };

        Ok(values.into_iter().map(Self::classify).collect())
    }

    /// Classify one message object by its `ev` discriminator.
    fn classify(value: Value) -> Result<FeedMessage, CodecError> {
        let event = value
            .get("ev")
            .and_then(Value::as_str)
            .ok_or(CodecError::MissingDiscriminator)?
            .to_string();

        match event.as_str() {
            "status" => Ok(FeedMessage::Status(serde_json::from_value(value)?)),
            "A" | "AM" | "AS" | "XA" | "XAS" | "CA" => {
                Ok(FeedMessage::Aggregate(serde_json::from_value(value)?))
            }
            "T" | "XT" => Ok(FeedMessage::Trade(serde_json::from_value(value)?)),
            "Q" | "XQ" => Ok(FeedMessage::Quote(serde_json::from_value(value)?)),
            _ => Ok(FeedMessage::Unknown { event }),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
