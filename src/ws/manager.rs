//! Connection manager for the price feed WebSocket.
//!
//! Owns one JSON-RPC socket, the [`SubscriptionRegistry`] of desired price
//! accounts, and the collection of message handlers. Provides idempotent
//! connect, bounded auto-reconnect with automatic re-subscription, and
//! in-order dispatch of every inbound frame.
//!
//! # Architecture
//!
//! ```text
//!            ┌──────────────────────────────────────┐
//!            │           PriceFeedManager            │
//!            │ connect / subscribe / unsubscribe /   │
//!            │ disconnect / on_message               │
//!            └──┬─────────────────────────────┬──────┘
//!               │ writer half                  │ registry + handlers
//!               ▼                              ▲
//!        session task (one per connection) ────┘
//!        read frame → correlate ack → decode → dispatch
//!        on close: wait reconnect_delay → reconnect (≤ max attempts)
//! ```
//!
//! All frames are read by a single session task, so handlers observe them in
//! arrival order. Acknowledgment correlation and payload decoding finish
//! before the handlers for that frame run.
//!
//! # Quick Start
//!
//! ```no_run
//! use oracle_feed_rs::ws::manager::PriceFeedManagerBuilder;
//! use oracle_feed_rs::types::SubscribeParams;
//!
//! # #[tokio::main]
//! # async fn main() -> oracle_feed_rs::error::Result<()> {
//! let manager = PriceFeedManagerBuilder::new("wss://api.mainnet-beta.solana.com")
//!     .reconnect_delay_ms(2_000)
//!     .max_reconnect_attempts(5)
//!     .throttle_interval_ms(50)
//!     .build();
//!
//! manager.connect().await?;
//!
//! let address = "H6ARHf6YXhGYeQfUzQNGk6rDNnLBQKrenN712K4AQJEG";
//! let updates = manager.on_price_update(address, |reading| {
//!     println!("{:.4} ± {:.4}", reading.price(), reading.confidence());
//! });
//!
//! let subscription_id = manager.subscribe(address, SubscribeParams::default()).await?;
//! println!("confirmed as {subscription_id}");
//!
//! // ...
//! updates.remove();
//! manager.disconnect().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::config::{FeedConfig, FeedDescriptor};
use crate::error::{FeedError, Result};
use crate::types::{ConnectionStatus, PriceReading, SubscribeParams};
use crate::ws::decoder::decode_price_data;
use crate::ws::handlers::{HandlerRegistration, HandlerSet};
use crate::ws::messages::{self, InboundMessage};
use crate::ws::registry::{Correlation, Subscription, SubscriptionRegistry};
use crate::ws::throttle::UpdateThrottle;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WriterHalf = SplitSink<WsStream, Message>;
type ReaderHalf = SplitStream<WsStream>;

/// Outcome of one connection attempt, shared by every caller awaiting it.
type ConnectAttempt = Shared<BoxFuture<'static, Result<()>>>;

// ---------------------------------------------------------------------------
// Dispatched message
// ---------------------------------------------------------------------------

/// One inbound frame, as delivered to handlers.
#[derive(Debug, Clone)]
pub struct FeedMessage {
    /// The parsed JSON-RPC envelope.
    pub envelope: InboundMessage,
    /// Resource address the frame belongs to, when it carries a known
    /// subscription id.
    pub address: Option<String>,
    /// Decoded price for account notifications with a valid payload.
    pub reading: Option<PriceReading>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`PriceFeedManager`] with custom configuration.
///
/// # Example
///
/// ```no_run
/// use oracle_feed_rs::ws::manager::PriceFeedManagerBuilder;
///
/// let manager = PriceFeedManagerBuilder::new("ws://127.0.0.1:8900")
///     .reconnect_delay_ms(500)
///     .subscribe_timeout_ms(10_000)
///     .feed("SOL/USD", "H6ARHf6YXhGYeQfUzQNGk6rDNnLBQKrenN712K4AQJEG")
///     .build();
/// ```
pub struct PriceFeedManagerBuilder {
    config: FeedConfig,
}

impl PriceFeedManagerBuilder {
    /// Create a new builder for the given endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            config: FeedConfig {
                url: url.into(),
                ..FeedConfig::default()
            },
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: FeedConfig) -> Self {
        Self { config }
    }

    /// Set the reconnect delay in milliseconds. Default: 2,000.
    pub fn reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.config.reconnect_delay_ms = ms;
        self
    }

    /// Set the number of automatic reconnect attempts. Default: 5.
    pub fn max_reconnect_attempts(mut self, n: u32) -> Self {
        self.config.max_reconnect_attempts = n;
        self
    }

    /// Set the throttle window for [`PriceFeedManager::on_price_update`]. Default: 50.
    pub fn throttle_interval_ms(mut self, ms: u64) -> Self {
        self.config.throttle_interval_ms = ms;
        self
    }

    /// Bound how long `subscribe()` waits for an acknowledgment. Default: none.
    pub fn subscribe_timeout_ms(mut self, ms: u64) -> Self {
        self.config.subscribe_timeout_ms = Some(ms);
        self
    }

    /// Set the params used by [`PriceFeedManager::subscribe_default`].
    pub fn default_params(mut self, params: SubscribeParams) -> Self {
        self.config.default_params = params;
        self
    }

    /// Add a known feed.
    pub fn feed(mut self, name: impl Into<String>, address: impl Into<String>) -> Self {
        self.config.feeds.push(FeedDescriptor::new(name, address));
        self
    }

    /// Build the [`PriceFeedManager`].
    pub fn build(self) -> PriceFeedManager {
        PriceFeedManager::new(self.config)
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State touched only while holding the async lock.
struct Inner {
    writer: Option<WriterHalf>,
    registry: SubscriptionRegistry,
    next_request_id: u64,
    /// Consecutive automatic reconnect attempts since the last successful connect.
    retry_count: u32,
    /// Bumped by `disconnect()`; work started under an older value is discarded.
    generation: u64,
    pending_connect: Option<ConnectAttempt>,
}

impl Inner {
    fn next_request_id(&mut self) -> u64 {
        self.next_request_id += 1;
        self.next_request_id
    }

    async fn send_text(&mut self, text: String) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(FeedError::NotConnected)?;
        writer.send(Message::Text(text.into())).await?;
        Ok(())
    }
}

struct ManagerShared {
    config: FeedConfig,
    inner: Mutex<Inner>,
    handlers: Arc<HandlerSet>,
    status: watch::Sender<ConnectionStatus>,
    last_error: StdMutex<Option<String>>,
    closed: AtomicBool,
    /// Session task of the live connection. Outside `inner` so `Drop` can
    /// always reach it.
    session: StdMutex<Option<JoinHandle<()>>>,
}

impl ManagerShared {
    fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status.send_replace(status);
    }

    fn record_error(&self, message: String) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(message);
    }

    fn clear_error(&self) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Install `session` as the live session task, aborting the previous one.
    /// Once the manager is dropped, new sessions are aborted on arrival.
    fn replace_session(&self, session: Option<JoinHandle<()>>) {
        let mut slot = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = std::mem::replace(&mut *slot, session) {
            previous.abort();
        }
        if self.closed.load(Ordering::Acquire) {
            if let Some(session) = slot.take() {
                session.abort();
            }
        }
    }

    fn is_current(&self, inner: &Inner, generation: u64) -> bool {
        inner.generation == generation && !self.closed.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// PriceFeedManager
// ---------------------------------------------------------------------------

/// Manager for one price feed WebSocket connection and its subscriptions.
///
/// Use [`PriceFeedManagerBuilder`] for ergonomic construction. The manager is
/// an explicitly owned value; wrap it in an [`Arc`] to share it between
/// tasks. Dropping it stops the background session.
pub struct PriceFeedManager {
    shared: Arc<ManagerShared>,
}

impl PriceFeedManager {
    /// Create a new manager with explicit configuration.
    ///
    /// Prefer [`PriceFeedManagerBuilder`] for a more ergonomic API.
    pub fn new(config: FeedConfig) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            shared: Arc::new(ManagerShared {
                config,
                inner: Mutex::new(Inner {
                    writer: None,
                    registry: SubscriptionRegistry::new(),
                    next_request_id: 0,
                    retry_count: 0,
                    generation: 0,
                    pending_connect: None,
                }),
                handlers: Arc::new(HandlerSet::default()),
                status,
                last_error: StdMutex::new(None),
                closed: AtomicBool::new(false),
                session: StdMutex::new(None),
            }),
        }
    }

    /// Open the socket.
    ///
    /// Resolves immediately when already connected. While an attempt is in
    /// flight every caller awaits that same attempt. On success all
    /// registered subscriptions are re-issued. A failure is returned to the
    /// caller and does not trigger automatic reconnection.
    pub async fn connect(&self) -> Result<()> {
        let attempt = {
            let mut inner = self.shared.inner.lock().await;
            if self.shared.status().is_connected() {
                return Ok(());
            }
            Self::start_attempt(&self.shared, &mut inner)
        };
        attempt.await
    }

    /// Close the socket and forget every subscription.
    ///
    /// Cancels scheduled reconnects and pending throttled deliveries. A
    /// connection attempt still in flight is discarded when it completes.
    /// Pending `subscribe()` calls resolve with
    /// [`FeedError::SubscriptionCancelled`].
    pub async fn disconnect(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        inner.generation += 1;
        inner.pending_connect = None;
        self.shared.replace_session(None);
        let dropped = inner.registry.len();
        inner.registry.clear();
        let writer = inner.writer.take();
        self.shared.set_status(ConnectionStatus::Disconnected);
        drop(inner);

        self.shared.handlers.cancel_throttles();

        if let Some(mut writer) = writer {
            if let Err(e) = writer.send(Message::Close(None)).await {
                tracing::debug!(error = %e, "Close frame not sent");
            }
            if let Err(e) = writer.close().await {
                tracing::debug!(error = %e, "Socket close failed");
            }
        }

        tracing::info!(
            dropped_subscriptions = dropped,
            "Disconnected from price feed WebSocket"
        );
        Ok(())
    }

    /// Subscribe to account updates for `address`.
    ///
    /// Connects first if needed. Resolves with the server-confirmed
    /// subscription id once the matching acknowledgment arrives. Subscribing
    /// an address again replaces its params; only the newest request's
    /// acknowledgment counts and the earlier caller gets
    /// [`FeedError::SubscriptionCancelled`].
    ///
    /// Without a configured `subscribe_timeout_ms` this waits indefinitely.
    pub async fn subscribe(
        &self,
        address: impl Into<String>,
        params: SubscribeParams,
    ) -> Result<u64> {
        let address = address.into();
        if address.is_empty() {
            return Err(FeedError::InvalidArgument("address must not be empty".into()));
        }

        self.connect().await?;

        let ack = {
            let mut inner = self.shared.inner.lock().await;
            if !self.shared.status().is_connected() {
                return Err(FeedError::NotConnected);
            }
            let request_id = inner.next_request_id();
            let frame = messages::account_subscribe(request_id, &address, &params)?;
            let ack = inner.registry.register(address.clone(), params, request_id);
            if let Err(e) = inner.send_text(frame).await {
                inner.registry.remove(&address);
                tracing::warn!(address = %address, error = %e, "Subscribe not sent");
                return Err(e);
            }

            tracing::debug!(
                address = %address,
                request_id,
                params = ?params,
                "Subscribe sent"
            );
            ack
        };

        let outcome = match self.shared.config.subscribe_timeout_ms {
            Some(timeout_ms) => tokio::time::timeout(Duration::from_millis(timeout_ms), ack)
                .await
                .map_err(|_| FeedError::SubscribeTimeout {
                    address: address.clone(),
                    timeout_ms,
                })?,
            None => ack.await,
        };
        outcome.unwrap_or_else(|_| Err(FeedError::SubscriptionCancelled(address)))
    }

    /// [`subscribe`](Self::subscribe) with the configured default params.
    pub async fn subscribe_default(&self, address: impl Into<String>) -> Result<u64> {
        self.subscribe(address, self.shared.config.default_params)
            .await
    }

    /// Cancel the subscription for `address`.
    ///
    /// Does nothing when not connected, when the address is unknown, or
    /// when it has not been acknowledged yet. Otherwise sends
    /// `accountUnsubscribe` with the confirmed id and forgets the address
    /// without waiting for a reply.
    pub async fn unsubscribe(&self, address: &str) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        if !self.shared.status().is_connected() {
            return Ok(());
        }
        let Some(subscription_id) = inner
            .registry
            .get(address)
            .and_then(|s| s.subscription_id)
        else {
            tracing::debug!(address, "Unsubscribe ignored: no confirmed subscription");
            return Ok(());
        };

        let request_id = inner.next_request_id();
        let frame = messages::account_unsubscribe(request_id, subscription_id)?;
        inner.registry.remove(address);
        inner.send_text(frame).await?;

        tracing::debug!(address, subscription_id, request_id, "Unsubscribe sent");
        Ok(())
    }

    /// Register a handler for every inbound message.
    pub fn on_message(
        &self,
        handler: impl Fn(&FeedMessage) + Send + Sync + 'static,
    ) -> HandlerRegistration {
        self.shared.handlers.insert(Arc::new(handler), None)
    }

    /// Register a throttled handler for decoded readings of one address.
    ///
    /// The handler runs at most once per `throttle_interval_ms` and only
    /// sees the newest reading of each burst.
    pub fn on_price_update(
        &self,
        address: impl Into<String>,
        handler: impl Fn(&PriceReading) + Send + Sync + 'static,
    ) -> HandlerRegistration {
        let address = address.into();
        let throttle = UpdateThrottle::new(
            self.shared.config.throttle_interval(),
            move |reading: PriceReading| handler(&reading),
        );
        let gate = throttle.clone();
        self.shared.handlers.insert(
            Arc::new(move |message: &FeedMessage| {
                if message.address.as_deref() != Some(address.as_str()) {
                    return;
                }
                if let Some(reading) = &message.reading {
                    gate.push(reading.clone());
                }
            }),
            Some(throttle),
        )
    }

    /// `true` while the socket is open.
    pub fn is_connected(&self) -> bool {
        self.shared.status().is_connected()
    }

    /// Current lifecycle state.
    pub fn status(&self) -> ConnectionStatus {
        self.shared.status()
    }

    /// Watch lifecycle changes.
    pub fn status_changes(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    /// Human-readable description of the most recent connection failure.
    ///
    /// Cleared on every successful connect.
    pub fn last_error(&self) -> Option<String> {
        self.shared
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Snapshot of the registry.
    pub async fn subscriptions(&self) -> Vec<Subscription> {
        let inner = self.shared.inner.lock().await;
        inner.registry.iter().cloned().collect()
    }

    /// Number of registered addresses.
    pub async fn subscription_count(&self) -> usize {
        self.shared.inner.lock().await.registry.len()
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.shared.handlers.len()
    }

    /// Get the configuration.
    pub fn config(&self) -> &FeedConfig {
        &self.shared.config
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    /// Join the in-flight attempt, or start one.
    fn start_attempt(shared: &Arc<ManagerShared>, inner: &mut Inner) -> ConnectAttempt {
        if let Some(pending) = &inner.pending_connect {
            return pending.clone();
        }

        shared.set_status(ConnectionStatus::Connecting);
        let task = tokio::spawn(Self::establish(shared.clone(), inner.generation));
        let attempt = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(error = %e, "Connection task failed");
                    Err(FeedError::ConnectionAborted)
                }
            }
        }
        .boxed()
        .shared();

        inner.pending_connect = Some(attempt.clone());
        attempt
    }

    /// Perform the handshake and, on success, install the new connection.
    ///
    /// Boxed: the session task it spawns may spawn it again.
    fn establish(shared: Arc<ManagerShared>, generation: u64) -> BoxFuture<'static, Result<()>> {
        async move {
            let outcome = connect_async(shared.config.url.as_str()).await;

            let mut inner = shared.inner.lock().await;
            if !shared.is_current(&inner, generation) {
                drop(inner);
                if let Ok((mut ws, _)) = outcome {
                    if let Err(e) = ws.close(None).await {
                        tracing::debug!(error = %e, "Closing superseded socket failed");
                    }
                }
                tracing::debug!("Discarding connection attempt superseded by disconnect");
                return Err(FeedError::ConnectionAborted);
            }
            inner.pending_connect = None;

            let ws = match outcome {
                Ok((ws, _resp)) => ws,
                Err(e) => {
                    let err = FeedError::from(e);
                    tracing::warn!(
                        url = %shared.config.url,
                        error = %err,
                        "WebSocket connect failed"
                    );
                    shared.record_error(err.to_string());
                    shared.set_status(ConnectionStatus::Disconnected);
                    return Err(err);
                }
            };

            let (write, read) = ws.split();
            inner.writer = Some(write);
            inner.retry_count = 0;
            shared.clear_error();
            shared.set_status(ConnectionStatus::Connected);

            tracing::info!(url = %shared.config.url, "Connected to price feed WebSocket");

            Self::resubscribe_all(&mut inner).await;

            let session = tokio::spawn(Self::run_session(shared.clone(), read, generation));
            shared.replace_session(Some(session));
            Ok(())
        }
        .boxed()
    }

    /// Re-issue every registered subscription on the current writer.
    async fn resubscribe_all(inner: &mut Inner) {
        let counter = &mut inner.next_request_id;
        let plan = inner.registry.reissue_all(|| {
            *counter += 1;
            *counter
        });
        if plan.is_empty() {
            return;
        }

        tracing::info!(count = plan.len(), "Re-subscribing registered addresses");
        for (address, params, request_id) in plan {
            let sent = match messages::account_subscribe(request_id, &address, &params) {
                Ok(frame) => inner.send_text(frame).await,
                Err(e) => Err(e),
            };
            match sent {
                Ok(()) => tracing::debug!(address = %address, request_id, "Re-subscribe sent"),
                Err(e) => tracing::error!(
                    address = %address,
                    error = %e,
                    "Failed to resubscribe after connect"
                ),
            }
        }
    }

    /// Read frames until the socket closes, then run the reconnect policy.
    async fn run_session(shared: Arc<ManagerShared>, read: ReaderHalf, generation: u64) {
        Self::read_frames(&shared, read).await;

        loop {
            let attempt_no = {
                let mut inner = shared.inner.lock().await;
                if !shared.is_current(&inner, generation) {
                    return;
                }
                inner.writer = None;
                shared.set_status(ConnectionStatus::Disconnected);

                let max_attempts = shared.config.max_reconnect_attempts;
                if inner.retry_count >= max_attempts {
                    let err = FeedError::ReconnectExhausted(inner.retry_count);
                    tracing::error!(
                        attempts = inner.retry_count,
                        "Reconnect attempts exhausted; waiting for an explicit connect()"
                    );
                    shared.record_error(err.to_string());
                    return;
                }
                inner.retry_count += 1;
                inner.retry_count
            };

            let delay = shared.config.reconnect_delay();
            tracing::info!(
                attempt = attempt_no,
                max_attempts = shared.config.max_reconnect_attempts,
                delay_ms = shared.config.reconnect_delay_ms,
                "Attempting reconnect..."
            );
            tokio::time::sleep(delay).await;

            let attempt = {
                let mut inner = shared.inner.lock().await;
                if !shared.is_current(&inner, generation) || shared.status().is_connected() {
                    return;
                }
                Self::start_attempt(&shared, &mut inner)
            };

            match attempt.await {
                Ok(()) => {
                    tracing::info!(attempt = attempt_no, "Reconnected successfully");
                    return;
                }
                Err(e) => {
                    tracing::warn!(attempt = attempt_no, error = %e, "Reconnection failed");
                }
            }
        }
    }

    async fn read_frames(shared: &Arc<ManagerShared>, mut read: ReaderHalf) {
        while let Some(frame) = read.next().await {
            match frame {
                Ok(Message::Text(text)) => Self::handle_text(shared, text.as_str()).await,
                Ok(Message::Binary(data)) => {
                    tracing::debug!(len = data.len(), "Ignoring binary frame");
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(Message::Close(frame)) => {
                    tracing::info!(frame = ?frame, "WebSocket closed by server");
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket error");
                    shared.record_error(FeedError::from(e).to_string());
                    return;
                }
            }
        }
        tracing::info!("WebSocket stream ended");
    }

    /// Correlate, decode and dispatch one text frame.
    async fn handle_text(shared: &Arc<ManagerShared>, text: &str) {
        let envelope = match InboundMessage::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed frame");
                return;
            }
        };

        let address = {
            let mut inner = shared.inner.lock().await;
            if let Some(request_id) = envelope.id {
                let correlation = match (&envelope.result, &envelope.error) {
                    (_, Some(error)) => inner.registry.reject(request_id, error),
                    (Some(result), None) => inner.registry.acknowledge(request_id, result),
                    (None, None) => Correlation::Unmatched,
                };
                match correlation {
                    Correlation::Confirmed {
                        address,
                        subscription_id,
                    } => tracing::info!(
                        address = %address,
                        request_id,
                        subscription_id,
                        "Subscription confirmed"
                    ),
                    Correlation::Rejected { address } => tracing::warn!(
                        address = %address,
                        request_id,
                        "Subscription rejected"
                    ),
                    Correlation::Unmatched => {
                        if let Some(error) = &envelope.error {
                            tracing::warn!(
                                request_id,
                                code = error.code,
                                message = %error.message,
                                "RPC error response"
                            );
                        }
                    }
                }
            }
            envelope
                .subscription_id()
                .and_then(|id| inner.registry.address_for(id))
                .map(str::to_owned)
        };

        let reading = if envelope.is_account_notification() {
            let reading = envelope.account_data().and_then(decode_price_data);
            if reading.is_none() {
                tracing::debug!(
                    address = ?address,
                    "Account notification without a decodable price"
                );
            }
            reading
        } else {
            None
        };

        shared.handlers.dispatch(&FeedMessage {
            envelope,
            address,
            reading,
        });
    }
}

impl Drop for PriceFeedManager {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.replace_session(None);
        if let Ok(mut inner) = self.shared.inner.try_lock() {
            inner.generation += 1;
        }
        self.shared.handlers.cancel_throttles();
    }
}
