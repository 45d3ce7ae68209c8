//! Scalar value codec
//!
//! Converts a single JSON scalar between the external wire encoding and the
//! internal backend encoding. Every conversion is total: an input that does not
//! fit the requested rule is logged and handed back unchanged, so one odd field
//! never aborts the transcode of a larger object.

use serde_json::{Number, Value as JsonValue};
use thiserror::Error;
use tracing::warn;

/// Conversion rule applied to a template leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Pass the value through untouched
    None,
    /// Render as a string
    Text,
    /// Integer, parsed from decimal or hex strings
    Integer,
    /// Decimal string
    IntegerStr,
    /// Hex string without the `0x` prefix
    HexNumber,
    /// Hex string with the `0x` prefix
    Hex0xNumber,
    /// Hash rendered without the `0x` prefix
    HexHashNumber,
    /// Hash rendered with the `0x` prefix
    Hex0xHashNumber,
}

#[derive(Debug, Error)]
enum CodecError {
    #[error("unsupported input shape")]
    UnsupportedShape,
    #[error("invalid decimal literal {0:?}")]
    InvalidDecimal(String),
    #[error("invalid hex literal {0:?}")]
    InvalidHex(String),
    #[error("{0} does not fit a JSON number")]
    OutOfRange(i128),
}

/// Convert `value` according to `value_type`.
///
/// Failures are logged at `warn` and return a clone of the input.
pub fn convert_value(value: &JsonValue, value_type: ValueType) -> JsonValue {
    let converted = match value_type {
        ValueType::None => Ok(value.clone()),
        ValueType::Text => Ok(to_text(value)),
        ValueType::Integer => to_integer(value),
        ValueType::IntegerStr => to_integer_str(value),
        ValueType::HexNumber => to_hex_number(value),
        ValueType::Hex0xNumber => to_hex_0x_number(value),
        ValueType::HexHashNumber => to_hex_hash_number(value),
        ValueType::Hex0xHashNumber => to_hex_0x_hash_number(value),
    };

    match converted {
        Ok(v) => v,
        Err(e) => {
            warn!("Value conversion failed: {}, value: {:?}:{}", e, value_type, value);
            value.clone()
        }
    }
}

fn to_text(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::String(_) => value.clone(),
        other => JsonValue::String(other.to_string()),
    }
}

fn to_integer(value: &JsonValue) -> Result<JsonValue, CodecError> {
    match value {
        JsonValue::Number(n) => integral(n).map(|_| value.clone()),
        JsonValue::String(s) => {
            let parsed = if has_hex_prefix(s) {
                parse_hex(s)?
            } else {
                match parse_decimal(s) {
                    Ok(v) => v,
                    Err(_) => parse_hex(s)?,
                }
            };
            number_value(parsed)
        }
        _ => Err(CodecError::UnsupportedShape),
    }
}

fn to_integer_str(value: &JsonValue) -> Result<JsonValue, CodecError> {
    let parsed = match value {
        JsonValue::Number(n) => integral(n)?,
        JsonValue::String(s) if has_hex_prefix(s) => parse_hex(s)?,
        JsonValue::String(s) => parse_decimal(s)?,
        _ => return Err(CodecError::UnsupportedShape),
    };
    Ok(JsonValue::String(parsed.to_string()))
}

fn to_hex_number(value: &JsonValue) -> Result<JsonValue, CodecError> {
    match value {
        JsonValue::Number(n) => {
            let v = integral(n)?;
            Ok(JsonValue::String(format_hex(v).replacen("0x", "", 1)))
        }
        JsonValue::String(s) => {
            check_hex(s)?;
            Ok(JsonValue::String(s.replacen("0x", "", 1)))
        }
        _ => Err(CodecError::UnsupportedShape),
    }
}

fn to_hex_0x_number(value: &JsonValue) -> Result<JsonValue, CodecError> {
    match value {
        JsonValue::Number(n) => Ok(JsonValue::String(format_hex(integral(n)?))),
        JsonValue::String(s) if has_hex_prefix(s) => Ok(value.clone()),
        JsonValue::String(s) => Ok(JsonValue::String(format_hex(parse_decimal(s)?))),
        _ => Err(CodecError::UnsupportedShape),
    }
}

fn to_hex_hash_number(value: &JsonValue) -> Result<JsonValue, CodecError> {
    match value {
        JsonValue::Number(n) => Ok(JsonValue::String(format!("{:x}", integral(n)?.unsigned_abs()))),
        JsonValue::String(s) => match s.split_once("0x") {
            Some((_, digits)) if has_hex_prefix(s) => Ok(JsonValue::String(digits.to_string())),
            _ => Ok(value.clone()),
        },
        _ => Err(CodecError::UnsupportedShape),
    }
}

fn to_hex_0x_hash_number(value: &JsonValue) -> Result<JsonValue, CodecError> {
    match value {
        JsonValue::Number(n) => Ok(JsonValue::String(format_hex(integral(n)?))),
        JsonValue::String(s) if has_hex_prefix(s) => Ok(value.clone()),
        JsonValue::String(s) => {
            check_hex(s)?;
            let rendered = match s.strip_prefix('-') {
                Some(digits) => format!("-0x{}", digits),
                None => format!("0x{}", s),
            };
            Ok(JsonValue::String(rendered))
        }
        _ => Err(CodecError::UnsupportedShape),
    }
}

fn has_hex_prefix(s: &str) -> bool {
    s.starts_with("0x") || s.starts_with("-0x")
}

fn integral(n: &Number) -> Result<i128, CodecError> {
    if let Some(v) = n.as_i64() {
        Ok(v as i128)
    } else if let Some(v) = n.as_u64() {
        Ok(v as i128)
    } else {
        Err(CodecError::UnsupportedShape)
    }
}

fn number_value(v: i128) -> Result<JsonValue, CodecError> {
    if let Ok(small) = i64::try_from(v) {
        Ok(JsonValue::from(small))
    } else if let Ok(big) = u64::try_from(v) {
        Ok(JsonValue::from(big))
    } else {
        Err(CodecError::OutOfRange(v))
    }
}

fn parse_decimal(s: &str) -> Result<i128, CodecError> {
    s.trim()
        .parse::<i128>()
        .map_err(|_| CodecError::InvalidDecimal(s.to_string()))
}

fn split_hex(s: &str) -> (bool, &str) {
    let trimmed = s.trim();
    let (negative, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let digits = rest
        .strip_prefix("0x")
        .or_else(|| rest.strip_prefix("0X"))
        .unwrap_or(rest);
    (negative, digits)
}

fn parse_hex(s: &str) -> Result<i128, CodecError> {
    let (negative, digits) = split_hex(s);
    if digits.starts_with(['+', '-']) {
        return Err(CodecError::InvalidHex(s.to_string()));
    }
    let magnitude =
        i128::from_str_radix(digits, 16).map_err(|_| CodecError::InvalidHex(s.to_string()))?;
    Ok(if negative { -magnitude } else { magnitude })
}

/// Hashes are wider than any native integer, so only the digits are checked.
fn check_hex(s: &str) -> Result<(), CodecError> {
    let (_, digits) = split_hex(s);
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(CodecError::InvalidHex(s.to_string()))
    }
}

fn format_hex(v: i128) -> String {
    if v < 0 {
        format!("-0x{:x}", v.unsigned_abs())
    } else {
        format!("0x{:x}", v)
    }
}
