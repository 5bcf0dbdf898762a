//! Polygon WebSocket Adapters
//!
//! The wire protocol for Polygon.io's streaming clusters: message types,
//! the frame codec, and the connection state machine. One connection exists
//! per asset class; the upstream multiplexes a whole class over one socket.

pub mod codec;
pub mod connection;
pub mod messages;

pub use codec::{CodecError, FeedMessage, JsonCodec};
pub use connection::{
    ConnectionError, ConnectionState, ConnectionStatus, StreamConnection, StreamConnectionConfig,
};
pub use messages::{AggregateMessage, FeedAction, FeedRequest, QuoteMessage, StatusMessage, TradeMessage};
