//! Constants for the oracle price feed client.
//!
//! Contains the default endpoint, default timing values, JSON-RPC method
//! names and the binary price payload layout. These are used internally by
//! [`PriceFeedManager`](crate::ws::manager::PriceFeedManager) and the
//! decoder, but are also exported for advanced usage.

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// Default JSON-RPC WebSocket endpoint.
pub const DEFAULT_WS_URL: &str = "wss://api.mainnet-beta.solana.com";

// ---------------------------------------------------------------------------
// Timing defaults (milliseconds)
// ---------------------------------------------------------------------------

/// Fixed backoff between automatic reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 2_000;

/// Automatic reconnect attempts before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Minimum spacing between throttled deliveries to a consumer.
pub const DEFAULT_THROTTLE_INTERVAL_MS: u64 = 50;

/// Readings kept by a [`PriceHistory`](crate::history::PriceHistory) by default.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

// ---------------------------------------------------------------------------
// JSON-RPC
// ---------------------------------------------------------------------------

/// JSON-RPC protocol version sent on every request.
pub const JSONRPC_VERSION: &str = "2.0";

/// Subscribe to change notifications for one account.
pub const METHOD_ACCOUNT_SUBSCRIBE: &str = "accountSubscribe";

/// Cancel an account subscription by its confirmed id.
pub const METHOD_ACCOUNT_UNSUBSCRIBE: &str = "accountUnsubscribe";

/// Method name carried by server-pushed account notifications.
pub const METHOD_ACCOUNT_NOTIFICATION: &str = "accountNotification";

// ---------------------------------------------------------------------------
// Price payload layout (little-endian, offsets from start of decoded bytes)
// ---------------------------------------------------------------------------

/// Payload layout of a binary price account.
pub mod layout {
    /// Offset of the signed 64-bit raw price.
    pub const PRICE_OFFSET: usize = 8;
    /// Offset of the signed 64-bit raw confidence.
    pub const CONFIDENCE_OFFSET: usize = 16;
    /// Offset of the signed 32-bit decimal exponent.
    pub const EXPONENT_OFFSET: usize = 24;
    /// Smallest payload that contains every field.
    pub const MIN_PAYLOAD_LEN: usize = 28;
}
