//! Binary price payload decoder.
//!
//! Account notifications carry the account data as a base64 string wrapped
//! in an array (`["<base64>", "base64"]`). The decoded bytes hold, in
//! little-endian order:
//!
//! | Offset | Size | Field          |
//! |--------|------|----------------|
//! | 8      | 8    | raw price (i64)      |
//! | 16     | 8    | raw confidence (i64) |
//! | 24     | 4    | exponent (i32)       |
//!
//! Decoding never fails loudly: [`decode_price_data`] returns `None` for an
//! absent, malformed or short payload. Use [`decode_price_bytes`] when the
//! reason matters.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde_json::Value;

use crate::constants::layout::{CONFIDENCE_OFFSET, EXPONENT_OFFSET, MIN_PAYLOAD_LEN, PRICE_OFFSET};
use crate::error::{FeedError, Result};
use crate::types::{FeedType, PriceReading};

/// Read a little-endian `i64` from `data` at `offset`.
#[inline(always)]
fn read_i64_le(data: &[u8], offset: usize) -> i64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[offset..offset + 8]);
    i64::from_le_bytes(buf)
}

/// Read a little-endian `i32` from `data` at `offset`.
#[inline(always)]
fn read_i32_le(data: &[u8], offset: usize) -> i32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[offset..offset + 4]);
    i32::from_le_bytes(buf)
}

/// Decode the `data` wrapper of an account notification.
///
/// Returns `None` when the wrapper is not an array, its first element is not
/// a string, the base64 is invalid, or the payload is too short.
pub fn decode_price_data(data: &Value) -> Option<PriceReading> {
    let encoded = data.as_array()?.first()?.as_str()?;
    match decode_base64_payload(encoded) {
        Ok(reading) => Some(reading),
        Err(e) => {
            tracing::debug!(error = %e, "Discarding undecodable price payload");
            None
        }
    }
}

/// Decode a base64 string holding a price account.
pub fn decode_base64_payload(encoded: &str) -> Result<PriceReading> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| FeedError::Decode(format!("invalid base64: {e}")))?;
    decode_price_bytes(bytes)
}

/// Decode raw price account bytes.
pub fn decode_price_bytes(bytes: impl Into<Bytes>) -> Result<PriceReading> {
    let bytes = bytes.into();
    if bytes.len() < MIN_PAYLOAD_LEN {
        return Err(FeedError::Decode(format!(
            "price payload too short: {} bytes (need ≥ {MIN_PAYLOAD_LEN})",
            bytes.len()
        )));
    }

    let raw_price = read_i64_le(&bytes, PRICE_OFFSET);
    let raw_confidence = read_i64_le(&bytes, CONFIDENCE_OFFSET);
    let exponent = read_i32_le(&bytes, EXPONENT_OFFSET);

    Ok(PriceReading::new(raw_price, raw_confidence, exponent, bytes))
}

/// Classify a payload.
///
/// Always reports [`FeedType::Price`]: this version has no multi-format
/// dispatch, so the input is not inspected.
pub fn detect_feed_type(_bytes: &[u8]) -> FeedType {
    FeedType::Price
}
