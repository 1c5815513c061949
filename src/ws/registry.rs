//! Subscription registry: desired subscriptions and acknowledgment correlation.
//!
//! Each resource address has at most one [`Subscription`]. A subscribe
//! request records the entry with its request id as the *pending* id and
//! hands back a [`oneshot`] receiver; the matching acknowledgment fills in
//! the confirmed subscription id and completes the receiver directly. No
//! polling is involved.
//!
//! Re-subscribing an address overwrites its parameters and pending id, so
//! only the newest request's acknowledgment is honored. The earlier waiter
//! is dropped and its caller sees
//! [`FeedError::SubscriptionCancelled`](crate::error::FeedError::SubscriptionCancelled).

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{FeedError, Result};
use crate::types::SubscribeParams;
use crate::ws::messages::RpcError;

/// Completion handle for one pending subscribe.
pub type AckReceiver = oneshot::Receiver<Result<u64>>;

/// A tracked subscription for one resource address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Resource address.
    pub address: String,
    /// Parameters of the most recent subscribe request.
    pub params: SubscribeParams,
    /// Request id awaiting acknowledgment.
    pub pending_request: Option<u64>,
    /// Server-assigned id, valid for the current connection only.
    pub subscription_id: Option<u64>,
}

/// Outcome of feeding a response into the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    /// The response confirmed the subscription for `address`.
    Confirmed {
        address: String,
        subscription_id: u64,
    },
    /// The response rejected the subscription for `address`; the entry is gone.
    Rejected { address: String },
    /// No pending subscribe carries this request id.
    Unmatched,
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<String, Subscription>,
    /// Pending request id → address.
    pending: HashMap<u64, String>,
    /// Pending request id → completion handle.
    waiters: HashMap<u64, oneshot::Sender<Result<u64>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or overwrite) the subscription for `address` as pending on
    /// `request_id`.
    pub fn register(
        &mut self,
        address: impl Into<String>,
        params: SubscribeParams,
        request_id: u64,
    ) -> AckReceiver {
        let address = address.into();
        if let Some(previous) = self.entries.get(&address).and_then(|s| s.pending_request) {
            self.pending.remove(&previous);
            if let Some(tx) = self.waiters.remove(&previous) {
                let _ = tx.send(Err(FeedError::SubscriptionCancelled(address.clone())));
            }
        }

        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id, address.clone());
        self.waiters.insert(request_id, tx);
        self.entries.insert(
            address.clone(),
            Subscription {
                address,
                params,
                pending_request: Some(request_id),
                subscription_id: None,
            },
        );
        rx
    }

    /// Match an acknowledgment `{id, result}` against the pending entries.
    pub fn acknowledge(&mut self, request_id: u64, result: &Value) -> Correlation {
        let Some(address) = self.pending.remove(&request_id) else {
            return Correlation::Unmatched;
        };
        let waiter = self.waiters.remove(&request_id);

        let Some(subscription_id) = result.as_u64() else {
            tracing::warn!(
                address = %address,
                request_id,
                result = %result,
                "Subscribe acknowledged with a non-integer result"
            );
            self.entries.remove(&address);
            if let Some(tx) = waiter {
                let _ = tx.send(Err(FeedError::Decode(format!(
                    "expected integer subscription id, got {result}"
                ))));
            }
            return Correlation::Rejected { address };
        };

        if let Some(entry) = self.entries.get_mut(&address) {
            entry.pending_request = None;
            entry.subscription_id = Some(subscription_id);
        }
        if let Some(tx) = waiter {
            let _ = tx.send(Ok(subscription_id));
        }
        Correlation::Confirmed {
            address,
            subscription_id,
        }
    }

    /// Match an error response `{id, error}` against the pending entries.
    pub fn reject(&mut self, request_id: u64, error: &RpcError) -> Correlation {
        let Some(address) = self.pending.remove(&request_id) else {
            return Correlation::Unmatched;
        };
        self.entries.remove(&address);
        if let Some(tx) = self.waiters.remove(&request_id) {
            let _ = tx.send(Err(FeedError::Rpc {
                code: error.code,
                message: error.message.clone(),
            }));
        }
        Correlation::Rejected { address }
    }

    /// Give every entry a fresh pending id for a new connection.
    ///
    /// Confirmed ids from the old connection are discarded. Callers still
    /// waiting on an earlier request are carried over to the new one.
    /// Returns `(address, params, request_id)` for each request to send.
    pub fn reissue_all(
        &mut self,
        mut next_request_id: impl FnMut() -> u64,
    ) -> Vec<(String, SubscribeParams, u64)> {
        let mut plan = Vec::with_capacity(self.entries.len());
        let mut pending = HashMap::with_capacity(self.entries.len());
        let mut waiters = HashMap::with_capacity(self.entries.len());

        for entry in self.entries.values_mut() {
            let request_id = next_request_id();
            if let Some(tx) = entry
                .pending_request
                .and_then(|old| self.waiters.remove(&old))
            {
                waiters.insert(request_id, tx);
            }
            entry.pending_request = Some(request_id);
            entry.subscription_id = None;
            pending.insert(request_id, entry.address.clone());
            plan.push((entry.address.clone(), entry.params, request_id));
        }

        self.pending = pending;
        self.waiters = waiters;
        plan
    }

    /// Forget `address`. A caller still waiting on it is cancelled.
    pub fn remove(&mut self, address: &str) -> Option<Subscription> {
        let entry = self.entries.remove(address)?;
        if let Some(id) = entry.pending_request {
            self.pending.remove(&id);
            self.waiters.remove(&id);
        }
        Some(entry)
    }

    /// Forget everything. All pending callers are cancelled.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.pending.clear();
        self.waiters.clear();
    }

    pub fn get(&self, address: &str) -> Option<&Subscription> {
        self.entries.get(address)
    }

    /// Address owning a confirmed subscription id.
    pub fn address_for(&self, subscription_id: u64) -> Option<&str> {
        self.entries
            .values()
            .find(|s| s.subscription_id == Some(subscription_id))
            .map(|s| s.address.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
