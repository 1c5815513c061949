//! Error types for the `oracle-feed-rs` crate.
//!
//! All fallible operations in this crate return [`Result<T>`], which is an
//! alias for `std::result::Result<T, FeedError>`.
//!
//! [`FeedError`] covers:
//! - **Transport errors**: WebSocket handshake, I/O and protocol failures
//! - **Protocol errors**: Malformed JSON frames, JSON-RPC error responses,
//!   undecodable price payloads
//! - **Lifecycle errors**: Not connected, aborted connects, exhausted
//!   reconnect budget, cancelled or timed-out subscriptions
//! - **Configuration errors**: Malformed URLs and invalid arguments
//!
//! The error is `Clone` so that a single in-flight connection attempt can
//! report the same outcome to every caller waiting on it. Foreign source
//! errors are therefore held behind an [`Arc`].

use std::sync::Arc;

/// All possible errors produced by the `oracle-feed-rs` client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FeedError {
    /// A WebSocket-level error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[source] Arc<tokio_tungstenite::tungstenite::Error>),

    /// Failed to serialize a request or deserialize a frame / config.
    #[error("JSON error: {0}")]
    Json(#[source] Arc<serde_json::Error>),

    /// Reading a configuration file failed.
    #[error("I/O error: {0}")]
    Io(#[source] Arc<std::io::Error>),

    /// An error building or parsing a URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// The server answered a request with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Server-provided message.
        message: String,
    },

    /// A price payload or acknowledgment could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The operation needs an open socket and there is none.
    #[error("not connected")]
    NotConnected,

    /// A connection attempt completed after `disconnect()` and was discarded.
    #[error("connection attempt aborted by disconnect")]
    ConnectionAborted,

    /// Automatic reconnection gave up.
    #[error("reconnect attempts exhausted after {0} tries")]
    ReconnectExhausted(u32),

    /// A pending subscribe was superseded or torn down before its
    /// acknowledgment arrived.
    #[error("subscription for {0} was cancelled before acknowledgment")]
    SubscriptionCancelled(String),

    /// No acknowledgment arrived within the configured subscribe timeout.
    #[error("subscription for {address} not acknowledged within {timeout_ms} ms")]
    SubscribeTimeout {
        /// Resource address that was being subscribed.
        address: String,
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// The caller provided an invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Arc::new(err))
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(Arc::new(err))
    }
}

impl From<std::io::Error> for FeedError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FeedError>;
