//! Configuration for the price feed client.
//!
//! [`FeedConfig`] carries everything the connection manager needs that is
//! supplied from outside the core: the endpoint, reconnect and throttle
//! timing, and the list of known price accounts. It deserializes from JSON
//! with every field optional:
//!
//! ```
//! use oracle_feed_rs::config::FeedConfig;
//!
//! let config = FeedConfig::from_json_str(r#"{
//!     "url": "wss://api.devnet.solana.com",
//!     "reconnect_delay_ms": 1000,
//!     "feeds": [{ "name": "SOL/USD", "address": "J83w4HKfqxwcq3BEMMkPFSppX3gqekLyLJBexebFVkix" }]
//! }"#).unwrap();
//!
//! assert_eq!(config.max_reconnect_attempts, 5);
//! assert_eq!(config.feeds[0].name, "SOL/USD");
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::{
    DEFAULT_HISTORY_CAPACITY, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY_MS,
    DEFAULT_THROTTLE_INTERVAL_MS, DEFAULT_WS_URL,
};
use crate::error::{FeedError, Result};
use crate::types::SubscribeParams;

/// A subscribable price account with a display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedDescriptor {
    /// Display name (e.g. `"BTC/USD"`).
    pub name: String,
    /// Resource address of the price account.
    pub address: String,
}

impl FeedDescriptor {
    /// Create a new descriptor.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// Configuration for the [`PriceFeedManager`](crate::ws::manager::PriceFeedManager).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub url: String,
    /// Delay before each automatic reconnect attempt (milliseconds).
    pub reconnect_delay_ms: u64,
    /// Automatic reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Minimum spacing between throttled deliveries (milliseconds).
    pub throttle_interval_ms: u64,
    /// How long `subscribe()` waits for an acknowledgment. `None` waits
    /// indefinitely.
    pub subscribe_timeout_ms: Option<u64>,
    /// Readings kept per feed by a [`PriceHistory`](crate::history::PriceHistory).
    pub history_capacity: usize,
    /// Parameters used when subscribing to configured feeds.
    pub default_params: SubscribeParams,
    /// Known price accounts.
    pub feeds: Vec<FeedDescriptor>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_owned(),
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            throttle_interval_ms: DEFAULT_THROTTLE_INTERVAL_MS,
            subscribe_timeout_ms: None,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            default_params: SubscribeParams::default(),
            feeds: Vec::new(),
        }
    }
}

impl FeedConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "Loaded feed config");
        Self::from_json_str(&json)
    }

    /// Check the endpoint and numeric bounds.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(FeedError::InvalidArgument(format!(
                "url scheme must be ws or wss, got {}",
                url.scheme()
            )));
        }
        if self.history_capacity == 0 {
            return Err(FeedError::InvalidArgument(
                "history_capacity must be at least 1".into(),
            ));
        }
        if let Some(feed) = self.feeds.iter().find(|f| f.address.is_empty()) {
            return Err(FeedError::InvalidArgument(format!(
                "feed {:?} has an empty address",
                feed.name
            )));
        }
        Ok(())
    }

    /// Reconnect backoff as a [`Duration`].
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Throttle window as a [`Duration`].
    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_interval_ms)
    }

    /// Subscribe timeout as a [`Duration`], if one is set.
    pub fn subscribe_timeout(&self) -> Option<Duration> {
        self.subscribe_timeout_ms.map(Duration::from_millis)
    }

    /// Look up a configured feed by display name.
    pub fn feed(&self, name: &str) -> Option<&FeedDescriptor> {
        self.feeds.iter().find(|f| f.name == name)
    }
}
