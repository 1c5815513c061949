//! Local JSON-RPC WebSocket server for driving the manager in tests.
//!
//! Records every inbound text frame, optionally acknowledges
//! `accountSubscribe` requests with increasing subscription ids (starting at
//! 100), and lets a test push frames, close the live socket, refuse new
//! handshakes or stall them.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

pub const FIRST_SUBSCRIPTION_ID: u64 = 100;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

struct ServerState {
    auto_ack: bool,
    refuse: AtomicBool,
    accepts: AtomicUsize,
    accept_times: Mutex<Vec<Instant>>,
    handshakes: AtomicUsize,
    handshake_delay_ms: AtomicU64,
    next_subscription_id: AtomicU64,
    requests: mpsc::UnboundedSender<Value>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
}

pub struct MockServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    requests: tokio::sync::Mutex<mpsc::UnboundedReceiver<Value>>,
    task: JoinHandle<()>,
}

impl MockServer {
    /// Server that acknowledges every subscribe.
    pub async fn start() -> Self {
        Self::spawn(true).await
    }

    /// Server that leaves acknowledgments to the test.
    pub async fn start_manual() -> Self {
        Self::spawn(false).await
    }

    async fn spawn(auto_ack: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(ServerState {
            auto_ack,
            refuse: AtomicBool::new(false),
            accepts: AtomicUsize::new(0),
            accept_times: Mutex::new(Vec::new()),
            handshakes: AtomicUsize::new(0),
            handshake_delay_ms: AtomicU64::new(0),
            next_subscription_id: AtomicU64::new(FIRST_SUBSCRIPTION_ID),
            requests: tx,
            outbound: Mutex::new(None),
        });

        let accept_state = state.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_state.accepts.fetch_add(1, Ordering::SeqCst);
                accept_state.accept_times.lock().unwrap().push(Instant::now());
                if accept_state.refuse.load(Ordering::SeqCst) {
                    drop(stream);
                    continue;
                }
                tokio::spawn(serve_connection(stream, accept_state.clone()));
            }
        });

        Self {
            addr,
            state,
            requests: tokio::sync::Mutex::new(rx),
            task,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// TCP connections accepted, including refused ones.
    pub fn accept_count(&self) -> usize {
        self.state.accepts.load(Ordering::SeqCst)
    }

    /// When each TCP connection was accepted, in order.
    pub fn accept_times(&self) -> Vec<Instant> {
        self.state.accept_times.lock().unwrap().clone()
    }

    /// Completed WebSocket handshakes.
    pub fn handshake_count(&self) -> usize {
        self.state.handshakes.load(Ordering::SeqCst)
    }

    /// Drop new TCP connections before the handshake.
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Hold each new connection for `delay` before answering the handshake.
    pub fn delay_handshakes(&self, delay: Duration) {
        self.state
            .handshake_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Next recorded request; panics after two seconds.
    pub async fn next_request(&self) -> Value {
        self.try_next_request(REQUEST_TIMEOUT)
            .await
            .expect("no request received within timeout")
    }

    pub async fn try_next_request(&self, wait: Duration) -> Option<Value> {
        let mut rx = self.requests.lock().await;
        tokio::time::timeout(wait, rx.recv()).await.ok().flatten()
    }

    /// Push a JSON frame on the live connection.
    pub async fn send(&self, frame: Value) {
        self.send_message(Message::Text(frame.to_string().into()))
            .await;
    }

    /// Push an arbitrary text frame on the live connection.
    pub async fn send_raw(&self, text: &str) {
        self.send_message(Message::Text(text.to_owned().into()))
            .await;
    }

    /// Close the live connection from the server side.
    pub async fn close_connection(&self) {
        self.send_message(Message::Close(None)).await;
    }

    async fn send_message(&self, message: Message) {
        let tx = wait_for(REQUEST_TIMEOUT, || {
            self.state
                .outbound
                .lock()
                .unwrap()
                .as_ref()
                .filter(|tx| !tx.is_closed())
                .cloned()
        })
        .await
        .expect("no live connection");
        tx.send(message).unwrap();
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_connection(stream: TcpStream, state: Arc<ServerState>) {
    let delay_ms = state.handshake_delay_ms.load(Ordering::SeqCst);
    if delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
    let Ok(ws) = accept_async(stream).await else {
        return;
    };
    let (mut write, mut read) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    *state.outbound.lock().unwrap() = Some(out_tx);
    state.handshakes.fetch_add(1, Ordering::SeqCst);

    loop {
        tokio::select! {
            inbound = read.next() => {
                let Some(Ok(message)) = inbound else { break };
                let Message::Text(text) = message else { continue };
                let Ok(request) = serde_json::from_str::<Value>(text.as_str()) else {
                    continue;
                };

                let ack = (state.auto_ack
                    && request["method"] == "accountSubscribe")
                    .then(|| {
                        let id = state.next_subscription_id.fetch_add(1, Ordering::SeqCst);
                        json!({"jsonrpc": "2.0", "id": request["id"], "result": id})
                    });
                let _ = state.requests.send(request);
                if let Some(ack) = ack {
                    if write.send(Message::Text(ack.to_string().into())).await.is_err() {
                        break;
                    }
                }
            }
            outbound = out_rx.recv() => {
                let Some(message) = outbound else { break };
                let closing = matches!(message, Message::Close(_));
                if write.send(message).await.is_err() || closing {
                    break;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Poll `check` every 10 ms until it yields a value or `limit` elapses.
pub async fn wait_for<T>(limit: Duration, mut check: impl FnMut() -> Option<T>) -> Option<T> {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if let Some(value) = check() {
            return Some(value);
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait until `condition` holds, panicking with `what` after `limit`.
pub async fn wait_until(limit: Duration, what: &str, mut condition: impl FnMut() -> bool) {
    if wait_for(limit, || condition().then_some(())).await.is_none() {
        panic!("timed out waiting for {what}");
    }
}

/// Price account bytes with the layout the decoder expects.
pub fn price_payload(raw_price: i64, raw_confidence: i64, exponent: i32) -> Vec<u8> {
    let mut buf = vec![0u8; 8];
    buf.extend_from_slice(&raw_price.to_le_bytes());
    buf.extend_from_slice(&raw_confidence.to_le_bytes());
    buf.extend_from_slice(&exponent.to_le_bytes());
    buf
}

/// An `accountNotification` frame for `subscription` carrying a price.
pub fn price_notification(subscription: u64, raw_price: i64, raw_confidence: i64, exponent: i32) -> Value {
    let data = BASE64.encode(price_payload(raw_price, raw_confidence, exponent));
    json!({
        "jsonrpc": "2.0",
        "method": "accountNotification",
        "params": {
            "subscription": subscription,
            "result": {
                "context": {"slot": 1},
                "value": {"data": [data, "base64"], "lamports": 1, "owner": "oracle"}
            }
        }
    })
}
