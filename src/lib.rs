//! # oracle-feed-rs
//!
//! A Rust client for live oracle price accounts streamed over a JSON-RPC
//! WebSocket (`accountSubscribe` / `accountNotification`).
//!
//! ## Quick Start
//!
//! ```no_run
//! use oracle_feed_rs::{PriceFeedManagerBuilder, SubscribeParams};
//!
//! #[tokio::main]
//! async fn main() -> oracle_feed_rs::Result<()> {
//!     let manager = PriceFeedManagerBuilder::new("wss://api.mainnet-beta.solana.com").build();
//!
//!     let address = "H6ARHf6YXhGYeQfUzQNGk6rDNnLBQKrenN712K4AQJEG";
//!     let _updates = manager.on_price_update(address, |reading| {
//!         println!("price = {}", reading.price());
//!     });
//!     manager.subscribe(address, SubscribeParams::default()).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod history;
pub mod types;
pub mod ws;

/// Re-export the manager types at crate root for convenience.
pub use ws::manager::{FeedMessage, PriceFeedManager, PriceFeedManagerBuilder};
/// Re-export the error type and Result alias.
pub use error::{FeedError, Result};

pub use config::{FeedConfig, FeedDescriptor};
pub use history::PriceHistory;
pub use types::{ConnectionStatus, PriceReading, SubscribeParams};
