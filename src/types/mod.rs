//! Request and value types shared across the crate.
//!
//! ## Organization
//!
//! - [`enums`]: Encoding, commitment, connection status and feed type
//! - [`reading`]: The immutable [`PriceReading`]
//!
//! Both are re-exported at the module root.

pub mod enums;
pub mod reading;

pub use enums::*;
pub use reading::PriceReading;

use serde::{Deserialize, Serialize};

/// Options sent with every `accountSubscribe` request.
///
/// Serializes as the second positional parameter:
/// `{"encoding":"base64","commitment":"confirmed"}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscribeParams {
    /// Encoding of the account data in notifications.
    pub encoding: Encoding,
    /// Commitment level for reported state.
    pub commitment: Commitment,
}

impl SubscribeParams {
    /// Create params with an explicit encoding and commitment.
    pub fn new(encoding: Encoding, commitment: Commitment) -> Self {
        Self {
            encoding,
            commitment,
        }
    }
}
