//! WebSocket price feed.
//!
//! The feed speaks JSON-RPC 2.0 over a single socket:
//!
//! ## [`manager`]: Connection Manager
//!
//! Owns the socket, reconnects up to a bounded number of times after an
//! unexpected close, re-issues every registered subscription on each new
//! connection, and dispatches inbound frames to handlers in arrival order.
//!
//! ## [`registry`]: Subscriptions
//!
//! Tracks one subscription per account address and correlates
//! acknowledgments to pending requests.
//!
//! ## [`decoder`]: Price Payloads
//!
//! Account notifications carry a base64 blob holding a little-endian price,
//! confidence, and exponent. Decoded with native `from_le_bytes()`.
//!
//! ## [`throttle`]: Update Throttle
//!
//! Coalesces bursts of readings so consumers see at most one per interval.
//!
//! ## Limits
//!
//! - One socket per manager
//! - One subscription per address; re-subscribing replaces the params
//! - Subscription ids are only valid for the connection that issued them

pub mod decoder;
pub mod handlers;
pub mod manager;
pub mod messages;
pub mod registry;
pub mod throttle;
