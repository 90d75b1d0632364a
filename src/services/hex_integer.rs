//! Hex-encoded integer field used for `device_id`.
//!
//! Input may be a JSON integer, which passes through untouched, or a base-16
//! string such as `"0x1A"`. Output is the stored integer as-is, so a value
//! written as `"0x1A"` reads back as `26`.

use serde::{Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

pub const INVALID_HEX_MESSAGE: &str = "Device ID is not a valid hex number";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HexIntegerError {
    #[error("Device ID is not a valid hex number")]
    InvalidFormat,
    /// A well-formed numeral whose magnitude does not fit in an `i128`.
    #[error("Device ID is out of range")]
    TooLarge,
}

/// Decode a `device_id` input value. `null` decodes to `None`.
///
/// No range check is applied here beyond what an `i128` holds; the storage
/// layer decides what fits.
pub fn decode(value: &Value) -> Result<Option<i128>, HexIntegerError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => number
            .as_i64()
            .map(i128::from)
            .or_else(|| number.as_u64().map(i128::from))
            .map(Some)
            .ok_or(HexIntegerError::InvalidFormat),
        Value::String(text) => parse_hex(text).map(Some),
        _ => Err(HexIntegerError::InvalidFormat),
    }
}

/// Representation of a stored value. Not re-encoded as hex.
pub fn encode(value: u64) -> u64 {
    value
}

/// `serialize_with` adapter for an optional stored `device_id`.
pub fn serialize<S>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    value.map(encode).serialize(serializer)
}

/// Parse a base-16 numeral.
///
/// Accepts surrounding whitespace, an optional sign, an optional `0x`/`0X`
/// prefix and single underscores between digits.
pub fn parse_hex(input: &str) -> Result<i128, HexIntegerError> {
    let trimmed = input.trim();
    let (negative, unsigned) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let digits = match unsigned.get(..2) {
        Some("0x") | Some("0X") => {
            let rest = &unsigned[2..];
            rest.strip_prefix('_').unwrap_or(rest)
        }
        _ => unsigned,
    };

    if digits.is_empty()
        || digits.starts_with('_')
        || digits.ends_with('_')
        || digits.contains("__")
    {
        return Err(HexIntegerError::InvalidFormat);
    }

    let mut magnitude: Option<i128> = Some(0);
    for c in digits.chars().filter(|c| *c != '_') {
        let digit = c.to_digit(16).ok_or(HexIntegerError::InvalidFormat)?;
        // Keep scanning after overflow so a bad digit still wins.
        magnitude = magnitude
            .and_then(|m| m.checked_mul(16))
            .and_then(|m| m.checked_add(i128::from(digit)));
    }

    let magnitude = magnitude.ok_or(HexIntegerError::TooLarge)?;
    Ok(if negative { -magnitude } else { magnitude })
}
