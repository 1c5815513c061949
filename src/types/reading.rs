//! The decoded price reading delivered to consumers.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One decoded price reading.
///
/// `price == raw_price × 10^exponent` and
/// `confidence == raw_confidence × 10^exponent`. Fields are private so a
/// reading can't be altered after it is built; use the accessors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceReading {
    price: f64,
    confidence: f64,
    exponent: i32,
    raw_price: i64,
    raw_confidence: i64,
    timestamp: DateTime<Utc>,
    #[serde(skip)]
    raw_payload: Bytes,
}

impl PriceReading {
    /// Build a reading from raw magnitudes, stamping it with the current time.
    pub fn new(raw_price: i64, raw_confidence: i64, exponent: i32, raw_payload: Bytes) -> Self {
        Self::with_timestamp(raw_price, raw_confidence, exponent, raw_payload, Utc::now())
    }

    /// Build a reading with an explicit capture time.
    pub fn with_timestamp(
        raw_price: i64,
        raw_confidence: i64,
        exponent: i32,
        raw_payload: Bytes,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let scale = 10f64.powi(exponent);
        Self {
            price: raw_price as f64 * scale,
            confidence: raw_confidence as f64 * scale,
            exponent,
            raw_price,
            raw_confidence,
            timestamp,
            raw_payload,
        }
    }

    /// Human-readable price.
    pub fn price(&self) -> f64 {
        self.price
    }

    /// Human-readable confidence interval.
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Decimal exponent applied to the raw magnitudes.
    pub fn exponent(&self) -> i32 {
        self.exponent
    }

    /// Raw price magnitude as stored on-chain.
    pub fn raw_price(&self) -> i64 {
        self.raw_price
    }

    /// Raw confidence magnitude as stored on-chain.
    pub fn raw_confidence(&self) -> i64 {
        self.raw_confidence
    }

    /// Wall-clock time the reading was decoded.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The decoded (not base64) payload bytes.
    pub fn raw_payload(&self) -> &Bytes {
        &self.raw_payload
    }
}
