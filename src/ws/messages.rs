//! JSON-RPC 2.0 frames exchanged over the feed socket.
//!
//! Outbound requests are built with [`account_subscribe`] and
//! [`account_unsubscribe`]. Every inbound text frame is parsed into an
//! [`InboundMessage`], a loose envelope that covers all three shapes the
//! server sends:
//!
//! ```text
//! acknowledgment:  {"jsonrpc":"2.0","id":1,"result":777}
//! error:           {"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"..."}}
//! notification:    {"jsonrpc":"2.0","method":"accountNotification",
//!                   "params":{"subscription":777,"result":{"value":{"data":["<b64>","base64"]}}}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{
    JSONRPC_VERSION, METHOD_ACCOUNT_NOTIFICATION, METHOD_ACCOUNT_SUBSCRIBE,
    METHOD_ACCOUNT_UNSUBSCRIBE,
};
use crate::error::Result;
use crate::types::SubscribeParams;

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// JSON-RPC 2.0 request envelope.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest<'a, P> {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Request id used to correlate the acknowledgment.
    pub id: u64,
    /// Method name.
    pub method: &'a str,
    /// Positional parameters.
    pub params: P,
}

impl<'a, P: Serialize> RpcRequest<'a, P> {
    /// Create a request.
    pub fn new(id: u64, method: &'a str, params: P) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        }
    }

    /// Serialize to the text frame sent on the wire.
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Build an `accountSubscribe` frame: `params: [address, {encoding, commitment}]`.
pub fn account_subscribe(id: u64, address: &str, params: &SubscribeParams) -> Result<String> {
    RpcRequest::new(id, METHOD_ACCOUNT_SUBSCRIBE, (address, params)).to_frame()
}

/// Build an `accountUnsubscribe` frame: `params: [subscription_id]`.
pub fn account_unsubscribe(id: u64, subscription_id: u64) -> Result<String> {
    RpcRequest::new(id, METHOD_ACCOUNT_UNSUBSCRIBE, [subscription_id]).to_frame()
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RpcError {
    /// Error code.
    pub code: i64,
    /// Error message.
    #[serde(default)]
    pub message: String,
    /// Additional error data.
    #[serde(default)]
    pub data: Option<Value>,
}

/// `params` of a server notification.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NotificationParams {
    /// Confirmed subscription id the notification belongs to.
    #[serde(default)]
    pub subscription: Option<u64>,
    /// Notification body (`{context, value}` for account notifications).
    #[serde(default)]
    pub result: Value,
}

/// Any frame received from the server.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Present on responses to our requests.
    #[serde(default)]
    pub id: Option<u64>,
    /// Present on server-pushed notifications.
    #[serde(default)]
    pub method: Option<String>,
    /// Success payload of a response.
    #[serde(default)]
    pub result: Option<Value>,
    /// Failure payload of a response.
    #[serde(default)]
    pub error: Option<RpcError>,
    /// Notification parameters.
    #[serde(default)]
    pub params: Option<NotificationParams>,
}

impl InboundMessage {
    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// `true` for an `accountNotification` push.
    pub fn is_account_notification(&self) -> bool {
        self.method.as_deref() == Some(METHOD_ACCOUNT_NOTIFICATION)
    }

    /// Subscription id of a notification.
    pub fn subscription_id(&self) -> Option<u64> {
        self.params.as_ref().and_then(|p| p.subscription)
    }

    /// The `params.result.value.data` wrapper of an account notification.
    pub fn account_data(&self) -> Option<&Value> {
        self.params
            .as_ref()
            .and_then(|p| p.result.pointer("/value/data"))
    }
}
