//! Shared enum types that map directly to JSON-RPC string values.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encoding the server should use for account data in notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Encoding {
    /// Base-58 (slow, small accounts only).
    #[serde(rename = "base58")]
    Base58,
    /// Base-64; the only encoding the price decoder understands.
    #[default]
    #[serde(rename = "base64")]
    Base64,
    /// Base-64 of zstd-compressed data.
    #[serde(rename = "base64+zstd")]
    Base64Zstd,
    /// Server-side parsed JSON, where a parser exists.
    #[serde(rename = "jsonParsed")]
    JsonParsed,
}

// ---------------------------------------------------------------------------
// Commitment
// ---------------------------------------------------------------------------

/// How finalized the state reported in a notification must be.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    /// Most recent block seen by the node.
    Processed,
    /// Voted on by a supermajority.
    #[default]
    Confirmed,
    /// Rooted.
    Finalized,
}

// ---------------------------------------------------------------------------
// Connection status
// ---------------------------------------------------------------------------

/// Lifecycle state of the managed socket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No socket, and none being opened.
    #[default]
    Disconnected,
    /// A handshake is in flight.
    Connecting,
    /// Socket open; requests can be sent.
    Connected,
}

impl ConnectionStatus {
    /// `true` only for [`ConnectionStatus::Connected`].
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Feed type
// ---------------------------------------------------------------------------

/// Kind of account payload. Only price accounts are decoded today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum FeedType {
    /// Aggregate price account (price, confidence, exponent).
    Price,
}
