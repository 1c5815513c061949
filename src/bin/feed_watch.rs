//! Binary to connect to a price feed WebSocket, subscribe to every
//! configured feed and print throttled readings for inspecting live data.
//!
//! # Usage
//!
//! ```sh
//! export ORACLE_FEED_CONFIG="config/feeds.example.json"   # optional
//! export ORACLE_FEED_WATCH_SECS=30                        # optional
//! cargo run --bin feed_watch --features cli
//! ```

use std::collections::HashMap;
use std::env;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use oracle_feed_rs::config::FeedConfig;
use oracle_feed_rs::history::PriceHistory;
use oracle_feed_rs::ws::manager::{PriceFeedManager, PriceFeedManagerBuilder};
use tokio::time;

type Histories = Arc<Mutex<HashMap<String, PriceHistory>>>;

#[tokio::main]
async fn main() -> oracle_feed_rs::error::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match env::var("ORACLE_FEED_CONFIG") {
        Ok(path) => {
            println!("Loading config from {path}…");
            FeedConfig::from_file(path)?
        }
        Err(_) => FeedConfig::default(),
    };
    let watch_secs = env::var("ORACLE_FEED_WATCH_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(30);

    if config.feeds.is_empty() {
        eprintln!("No feeds configured; set ORACLE_FEED_CONFIG to a config with a `feeds` list");
        return Ok(());
    }

    let capacity = config.history_capacity;
    let feeds = config.feeds.clone();
    let manager = PriceFeedManagerBuilder::from_config(config).build();

    println!("Connecting to {}…", manager.config().url);
    manager.connect().await?;

    let histories: Histories = Arc::default();
    let mut registrations = Vec::with_capacity(feeds.len());
    for feed in &feeds {
        let name = feed.name.clone();
        let sink = histories.clone();
        registrations.push(manager.on_price_update(feed.address.clone(), move |reading| {
            println!(
                "{name:>12}  {:>16.6} ± {:<12.6} (expo {})",
                reading.price(),
                reading.confidence(),
                reading.exponent()
            );
            sink.lock()
                .unwrap_or_else(|e| e.into_inner())
                .entry(name.clone())
                .or_insert_with(|| PriceHistory::new(capacity))
                .push(reading.clone());
        }));

        println!("Subscribing to {} ({})…", feed.name, feed.address);
        match manager.subscribe_default(feed.address.clone()).await {
            Ok(id) => println!("  confirmed as subscription {id}"),
            Err(e) => eprintln!("  subscribe failed: {e}"),
        }
    }

    println!("Listening for updates for {watch_secs} seconds…\n");

    let deadline = time::sleep(Duration::from_secs(watch_secs));
    tokio::pin!(deadline);
    let mut status = manager.status_changes();

    loop {
        tokio::select! {
            _ = &mut deadline => {
                println!("\n{watch_secs} seconds elapsed, disconnecting…");
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                println!("[status] {current}");
                if let Some(err) = manager.last_error() {
                    println!("[status] last error: {err}");
                }
            }
        }
    }

    for registration in &registrations {
        registration.remove();
    }
    manager.disconnect().await?;
    print_summary(&manager, &histories);
    println!("Done.");

    Ok(())
}

fn print_summary(manager: &PriceFeedManager, histories: &Histories) {
    let histories = histories.lock().unwrap_or_else(|e| e.into_inner());
    println!("\nSummary ({}):", manager.status());
    for (name, history) in histories.iter() {
        match history.latest() {
            Some(latest) => println!(
                "{name:>12}  {} readings, last {:.6} at {}",
                history.len(),
                latest.price(),
                latest.timestamp().format("%H:%M:%S%.3f")
            ),
            None => println!("{name:>12}  no readings"),
        }
    }
}
